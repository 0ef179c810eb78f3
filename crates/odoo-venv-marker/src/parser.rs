//! Predicate parser.
//!
//! Grammar (loosest binding first):
//!
//! ```text
//! expr       := and_expr ("or" and_expr)*
//! and_expr   := unary ("and" unary)*
//! unary      := "not" unary | primary
//! primary    := "(" expr ")" | comparison
//! comparison := operand op operand
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">=" | "~=" | "===" | "in" | "not in"
//! operand    := variable | quoted string | bare version literal
//! ```
//!
//! Comparisons on `odoo_version` against a version literal become
//! [`Expr::VersionCompare`]; everything else is a marker comparison.

use crate::context::Variable;
use crate::version::DottedVersion;
use crate::{CompareOp, Expr, MarkerComparison, MarkerOp, Operand, PredicateError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Literal(String),
    Op(CompareOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
    In,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    offset: usize,
}

/// Parse a non-empty predicate into an expression tree.
pub fn parse_expr(input: &str) -> Result<Expr, PredicateError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(parser.error_at(extra.offset, "unexpected trailing input"));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, PredicateError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '(' || c == ')' {
            let token = if c == '(' { Token::LParen } else { Token::RParen };
            tokens.push(Spanned { token, offset });
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let mut value = String::new();
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    Some((_, q)) if *q == c => break,
                    Some((_, ch)) => value.push(*ch),
                    None => {
                        return Err(PredicateError::new(input, offset, "unterminated string"))
                    }
                }
                j += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(value),
                offset,
            });
            i = j + 1;
            continue;
        }

        if "<>=!~".contains(c) {
            let mut op = String::new();
            let mut j = i;
            while let Some((_, ch)) = chars.get(j) {
                if !"<>=!~".contains(*ch) {
                    break;
                }
                op.push(*ch);
                j += 1;
            }
            let parsed = CompareOp::from_symbol(&op).ok_or_else(|| {
                PredicateError::new(input, offset, format!("unknown operator '{}'", op))
            })?;
            tokens.push(Spanned {
                token: Token::Op(parsed),
                offset,
            });
            i = j;
            continue;
        }

        if c.is_ascii_digit() {
            let mut literal = String::new();
            let mut j = i;
            while let Some((_, ch)) = chars.get(j) {
                if !(ch.is_ascii_alphanumeric() || "._*+-".contains(*ch)) {
                    break;
                }
                literal.push(*ch);
                j += 1;
            }
            tokens.push(Spanned {
                token: Token::Literal(literal),
                offset,
            });
            i = j;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut word = String::new();
            let mut j = i;
            while let Some((_, ch)) = chars.get(j) {
                if !(ch.is_ascii_alphanumeric() || *ch == '_') {
                    break;
                }
                word.push(*ch);
                j += 1;
            }
            let token = match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned { token, offset });
            i = j;
            continue;
        }

        return Err(PredicateError::new(
            input,
            offset,
            format!("unexpected character '{}'", c),
        ));
    }

    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|t| &t.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn end_offset(&self) -> usize {
        self.input.len()
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> PredicateError {
        PredicateError::new(self.input, offset, message)
    }

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        let mut items = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut items = vec![self.parse_unary()?];
        while self.eat(&Token::And) {
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            match self.next() {
                Some(Spanned {
                    token: Token::RParen,
                    ..
                }) => return Ok(inner),
                Some(other) => return Err(self.error_at(other.offset, "expected ')'")),
                None => return Err(self.error_at(self.end_offset(), "expected ')'")),
            }
        }
        self.parse_comparison()
    }

    fn parse_operand(&mut self) -> Result<(Operand, usize), PredicateError> {
        match self.next() {
            Some(Spanned {
                token: Token::Ident(name),
                offset,
            }) => match Variable::from_name(&name) {
                Some(var) => Ok((Operand::Variable(var), offset)),
                None => Err(self.error_at(offset, format!("unknown variable '{}'", name))),
            },
            Some(Spanned {
                token: Token::Str(s),
                offset,
            }) => Ok((Operand::Literal(s), offset)),
            Some(Spanned {
                token: Token::Literal(s),
                offset,
            }) => Ok((Operand::Literal(s), offset)),
            Some(other) => Err(self.error_at(other.offset, "expected a variable or a value")),
            None => Err(self.error_at(self.end_offset(), "expected a variable or a value")),
        }
    }

    fn parse_marker_op(&mut self) -> Result<MarkerOp, PredicateError> {
        match self.next() {
            Some(Spanned {
                token: Token::Op(op),
                ..
            }) => Ok(MarkerOp::Compare(op)),
            Some(Spanned {
                token: Token::In, ..
            }) => Ok(MarkerOp::In),
            Some(Spanned {
                token: Token::Not,
                offset,
            }) => {
                if self.eat(&Token::In) {
                    Ok(MarkerOp::NotIn)
                } else {
                    Err(self.error_at(offset, "expected 'in' after 'not'"))
                }
            }
            Some(other) => Err(self.error_at(other.offset, "expected a comparison operator")),
            None => Err(self.error_at(self.end_offset(), "expected a comparison operator")),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, PredicateError> {
        let (lhs, lhs_offset) = self.parse_operand()?;
        let op = self.parse_marker_op()?;
        let (rhs, _) = self.parse_operand()?;

        let (variable, literal, flipped) = match (&lhs, &rhs) {
            (Operand::Variable(v), Operand::Literal(l)) => (Some(*v), Some(l.clone()), false),
            (Operand::Literal(l), Operand::Variable(v)) => (Some(*v), Some(l.clone()), true),
            (Operand::Variable(_), Operand::Variable(_)) => (None, None, false),
            (Operand::Literal(_), Operand::Literal(_)) => {
                return Err(self.error_at(lhs_offset, "comparison needs at least one variable"))
            }
        };

        if let (Some(Variable::OdooVersion), Some(literal), MarkerOp::Compare(cmp)) =
            (variable, literal, op)
        {
            if cmp != CompareOp::ArbitraryEqual {
                let version: DottedVersion = literal.parse().map_err(|_| {
                    self.error_at(
                        lhs_offset,
                        format!("'{}' is not a dotted version", literal),
                    )
                })?;
                let op = if flipped { cmp.flipped() } else { cmp };
                return Ok(Expr::VersionCompare { op, version });
            }
        }

        Ok(Expr::Marker(MarkerComparison { lhs, op, rhs }))
    }
}
