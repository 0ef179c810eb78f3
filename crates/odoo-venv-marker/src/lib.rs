//! When-predicates for odoo-venv.
//!
//! A predicate gates an extra command or a requirement line. It mixes
//! comparisons on the target Odoo version (`odoo_version >= 16.0`) with
//! standard dependency environment markers (`sys_platform == 'linux'`,
//! `python_version < '3.8'`), combined with `and`, `or`, `not` and
//! parentheses.
//!
//! Predicates are parsed once into an [`Expr`] tree and evaluated many times
//! against a [`MarkerContext`].

mod context;
mod parser;
mod version;

pub use context::{MarkerContext, Variable};
pub use parser::parse_expr;
pub use version::{DottedVersion, VersionError};

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Comparison operators shared by version and marker comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// `~=`
    Compatible,
    /// `===`
    ArbitraryEqual,
}

impl CompareOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "==" => CompareOp::Equal,
            "!=" => CompareOp::NotEqual,
            "<" => CompareOp::Less,
            "<=" => CompareOp::LessEqual,
            ">" => CompareOp::Greater,
            ">=" => CompareOp::GreaterEqual,
            "~=" => CompareOp::Compatible,
            "===" => CompareOp::ArbitraryEqual,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Compatible => "~=",
            CompareOp::ArbitraryEqual => "===",
        }
    }

    /// Operator to use when the operands are swapped.
    pub fn flipped(&self) -> Self {
        match self {
            CompareOp::Less => CompareOp::Greater,
            CompareOp::LessEqual => CompareOp::GreaterEqual,
            CompareOp::Greater => CompareOp::Less,
            CompareOp::GreaterEqual => CompareOp::LessEqual,
            other => *other,
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal | CompareOp::ArbitraryEqual => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::LessEqual => ordering != Ordering::Greater,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::GreaterEqual => ordering != Ordering::Less,
            CompareOp::Compatible => ordering != Ordering::Less,
        }
    }
}

/// Operator of a marker comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Compare(CompareOp),
    In,
    NotIn,
}

/// One side of a marker comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(Variable),
    Literal(String),
}

impl Operand {
    fn resolve<'a>(&'a self, ctx: &'a MarkerContext) -> &'a str {
        match self {
            Operand::Variable(var) => ctx.get(*var),
            Operand::Literal(s) => s,
        }
    }
}

/// A standard environment-marker comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerComparison {
    pub lhs: Operand,
    pub op: MarkerOp,
    pub rhs: Operand,
}

impl MarkerComparison {
    fn evaluate(&self, ctx: &MarkerContext) -> bool {
        let lhs = self.lhs.resolve(ctx);
        let rhs = self.rhs.resolve(ctx);

        match self.op {
            MarkerOp::In => rhs.contains(lhs),
            MarkerOp::NotIn => !rhs.contains(lhs),
            MarkerOp::Compare(CompareOp::ArbitraryEqual) => lhs == rhs,
            MarkerOp::Compare(op) => {
                match (lhs.parse::<DottedVersion>(), rhs.parse::<DottedVersion>()) {
                    (Ok(a), Ok(b)) => compare_versions(&a, op, &b),
                    // Non-version values fall back to plain string comparison
                    _ => match op {
                        CompareOp::Compatible => false,
                        _ => op.holds(lhs.cmp(rhs)),
                    },
                }
            }
        }
    }
}

/// Parsed predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `odoo_version <op> <dotted version>`
    VersionCompare { op: CompareOp, version: DottedVersion },
    /// Any other environment-marker comparison.
    Marker(MarkerComparison),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn evaluate(&self, ctx: &MarkerContext) -> bool {
        match self {
            Expr::VersionCompare { op, version } => {
                match ctx.odoo_version.parse::<DottedVersion>() {
                    Ok(actual) => compare_versions(&actual, *op, version),
                    Err(_) => op.holds(ctx.odoo_version.as_str().cmp(version.to_string().as_str())),
                }
            }
            Expr::Marker(m) => m.evaluate(ctx),
            Expr::And(items) => items.iter().all(|e| e.evaluate(ctx)),
            Expr::Or(items) => items.iter().any(|e| e.evaluate(ctx)),
            Expr::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Whether this expression references `odoo_version`.
    pub fn references_odoo_version(&self) -> bool {
        match self {
            Expr::VersionCompare { .. } => true,
            Expr::Marker(m) => [&m.lhs, &m.rhs]
                .iter()
                .any(|o| matches!(o, Operand::Variable(Variable::OdooVersion))),
            Expr::And(items) | Expr::Or(items) => items.iter().any(|e| e.references_odoo_version()),
            Expr::Not(inner) => inner.references_odoo_version(),
        }
    }
}

fn compare_versions(actual: &DottedVersion, op: CompareOp, expected: &DottedVersion) -> bool {
    match op {
        CompareOp::Compatible => actual.is_compatible_with(expected),
        _ => op.holds(actual.cmp(expected)),
    }
}

/// Error for a predicate that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid predicate '{input}': {message} (at offset {offset})")]
pub struct PredicateError {
    pub input: String,
    pub offset: usize,
    pub message: String,
}

impl PredicateError {
    pub fn new(input: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            offset,
            message: message.into(),
        }
    }
}

/// A `when` clause: its source text plus the parsed tree.
///
/// An empty clause has no tree and always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Option<Expr>,
}

impl Predicate {
    /// Predicate that always holds.
    pub fn always() -> Self {
        Self {
            source: String::new(),
            expr: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self, PredicateError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::always());
        }
        Ok(Self {
            source: trimmed.to_string(),
            expr: Some(parse_expr(trimmed)?),
        })
    }

    pub fn evaluate(&self, ctx: &MarkerContext) -> bool {
        self.expr.as_ref().map_or(true, |e| e.evaluate(ctx))
    }

    pub fn is_always(&self) -> bool {
        self.expr.is_none()
    }

    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::always()
    }
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Predicate::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse and evaluate a predicate in one go.
///
/// Empty input evaluates to `true`.
pub fn evaluate(predicate: &str, ctx: &MarkerContext) -> Result<bool, PredicateError> {
    Ok(Predicate::parse(predicate)?.evaluate(ctx))
}
