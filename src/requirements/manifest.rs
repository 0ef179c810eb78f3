//! Addon manifests
//!
//! A manifest (`__manifest__.py`, or `__openerp__.py` for old addons) is a
//! single Python dict literal. Only literals are accepted: strings, numbers,
//! booleans, `None`, lists, tuples and dicts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const MANIFEST_NAMES: [&str; 2] = ["__manifest__.py", "__openerp__.py"];

/// Error for a manifest that is not a plain dict literal
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct ManifestError {
    pub line: usize,
    pub message: String,
}

/// Python literal value
#[derive(Debug, Clone, PartialEq)]
pub enum PyValue {
    Str(String),
    Number(String),
    Bool(bool),
    None,
    List(Vec<PyValue>),
    Dict(BTreeMap<String, PyValue>),
}

impl PyValue {
    pub fn get(&self, key: &str) -> Option<&PyValue> {
        match self {
            PyValue::Dict(map) => map.get(key),
            _ => None,
        }
    }
}

/// A manifest found under an addons path
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFile {
    /// Addon technical name (the directory holding the manifest)
    pub addon: String,
    pub path: PathBuf,
}

/// Find addon manifests below `addons_path`, sorted by path.
///
/// Hidden directories are skipped. When a directory has both manifest names,
/// `__manifest__.py` wins.
pub fn find_manifests(addons_path: &Path) -> Vec<ManifestFile> {
    let mut found: Vec<ManifestFile> = Vec::new();

    let walker = WalkDir::new(addons_path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !MANIFEST_NAMES.contains(&file_name.as_ref()) {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let addon = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // sort_by_file_name visits __manifest__.py before __openerp__.py
        if found.last().is_some_and(|m| m.path.parent() == Some(dir)) {
            continue;
        }
        found.push(ManifestFile {
            addon,
            path: entry.path().to_path_buf(),
        });
    }

    found
}

/// Names listed under `external_dependencies["python"]`.
pub fn external_python_dependencies(contents: &str) -> Result<Vec<String>, ManifestError> {
    let manifest = parse_literal(contents)?;
    if !matches!(manifest, PyValue::Dict(_)) {
        return Err(ManifestError {
            line: 1,
            message: "manifest is not a dict".to_string(),
        });
    }

    let Some(python) = manifest
        .get("external_dependencies")
        .and_then(|deps| deps.get("python"))
    else {
        return Ok(Vec::new());
    };

    match python {
        PyValue::List(items) => Ok(items
            .iter()
            .filter_map(|item| match item {
                PyValue::Str(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect()),
        _ => Err(ManifestError {
            line: 1,
            message: "external_dependencies['python'] is not a list".to_string(),
        }),
    }
}

/// Parse a single Python literal expression.
pub fn parse_literal(source: &str) -> Result<PyValue, ManifestError> {
    let mut parser = LiteralParser {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let value = parser.value()?;
    parser.skip_trivia();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing content"));
    }
    Ok(value)
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl LiteralParser {
    fn error(&self, message: &str) -> ManifestError {
        ManifestError {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Whitespace, newlines, comments and line continuations.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '\\' {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ManifestError> {
        self.skip_trivia();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(&format!("expected '{}', found end of input", expected))),
        }
    }

    fn value(&mut self) -> Result<PyValue, ManifestError> {
        self.skip_trivia();
        match self.peek() {
            Some('{') => self.dict(),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('\'' | '"') => self.strings(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(c) => Err(self.error(&format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self) -> Result<PyValue, ManifestError> {
        self.expect('{')?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(PyValue::Dict(map));
            }
            let key = match self.value()? {
                PyValue::Str(s) => s,
                _ => return Err(self.error("dict keys must be strings")),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_trivia();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(PyValue::Dict(map)),
                _ => return Err(self.error("expected ',' or '}' in dict")),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<PyValue, ManifestError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(PyValue::List(items));
            }
            items.push(self.value()?);

            self.skip_trivia();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(PyValue::List(items)),
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn strings(&mut self) -> Result<PyValue, ManifestError> {
        let mut out = self.string()?;
        loop {
            let save = (self.pos, self.line);
            self.skip_trivia();
            match self.peek() {
                Some('\'' | '"') => out.push_str(&self.string()?),
                _ => {
                    (self.pos, self.line) = save;
                    return Ok(PyValue::Str(out));
                }
            }
        }
    }

    fn string(&mut self) -> Result<String, ManifestError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let triple = self.peek() == Some(quote) && self.chars.get(self.pos + 1) == Some(&quote);
        if triple {
            self.pos += 2;
        }

        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated string literal"))?;
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.chars.get(self.pos + 1) == Some(&quote) {
                    self.pos += 2;
                    return Ok(out);
                }
                out.push(c);
            } else if c == '\\' {
                let escaped = self
                    .bump()
                    .ok_or_else(|| self.error("unterminated string literal"))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    '\n' => {}
                    other => out.push(other),
                }
            } else if c == '\n' && !triple {
                return Err(self.error("newline in string literal"));
            } else {
                out.push(c);
            }
        }
    }

    fn number(&mut self) -> Result<PyValue, ManifestError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_') {
                self.bump();
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.chars().any(|c| c.is_ascii_digit()) {
            Ok(PyValue::Number(text))
        } else {
            Err(self.error(&format!("invalid number '{}'", text)))
        }
    }

    fn word(&mut self) -> Result<PyValue, ManifestError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(PyValue::Bool(true)),
            "False" => Ok(PyValue::Bool(false)),
            "None" => Ok(PyValue::None),
            // String prefixes: r'..', u'..', b'..'
            "r" | "u" | "b" | "R" | "U" | "B" | "rb" | "br"
                if matches!(self.peek(), Some('\'' | '"')) =>
            {
                self.strings()
            }
            _ => Err(self.error(&format!("'{}' is not a literal", word))),
        }
    }
}
