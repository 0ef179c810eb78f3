//! Requirement lines
//!
//! One `RequirementEntry` per installable line, tagged with where it came
//! from. The tag is only used in diagnostics.

use serde::Serialize;
use std::fmt;

use odoo_venv_marker::{MarkerContext, Predicate};

/// Where a requirement entry was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementSource {
    /// `<odoo_dir>/requirements.txt`
    OdooRequirements,
    /// `requirements.txt` at the root of an addons path
    AddonRequirements,
    /// `external_dependencies["python"]` of an addon manifest
    AddonManifestExternalDependency,
    /// `extra_requirements_file`
    ExtraRequirementsFile,
    /// `extra_requirement` option
    ExtraRequirement,
}

impl RequirementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementSource::OdooRequirements => "odoo-requirements",
            RequirementSource::AddonRequirements => "addon-requirements",
            RequirementSource::AddonManifestExternalDependency => {
                "addon-manifest-external-dependency"
            }
            RequirementSource::ExtraRequirementsFile => "extra-requirements-file",
            RequirementSource::ExtraRequirement => "extra-requirement",
        }
    }
}

impl fmt::Display for RequirementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single installable line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementEntry {
    /// Text written to the resolved requirements file
    pub spec: String,

    /// Normalized package name; `None` for pip options and lines that could
    /// not be parsed (those are passed through untouched)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub source: RequirementSource,

    /// Addon (or addons path) the line came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon: Option<String>,
}

impl RequirementEntry {
    /// Build an entry from a single requirement line.
    ///
    /// Returns `None` for blank lines, comments and lines whose environment
    /// marker does not hold in `ctx`.
    pub fn parse(
        line: &str,
        source: RequirementSource,
        addon: Option<&str>,
        ctx: &MarkerContext,
    ) -> Option<Self> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return None;
        }

        let verbatim = |spec: &str| RequirementEntry {
            spec: spec.to_string(),
            name: None,
            source,
            addon: addon.map(str::to_string),
        };

        if line.starts_with('-') {
            return Some(verbatim(line));
        }

        let (requirement, marker) = match line.split_once(';') {
            Some((req, marker)) => (req.trim(), Some(marker.trim())),
            None => (line, None),
        };

        if let Some(marker) = marker {
            match Predicate::parse(marker) {
                Ok(predicate) => {
                    if !predicate.evaluate(ctx) {
                        tracing::debug!("Skipping '{}' ({}): marker is false", requirement, source);
                        return None;
                    }
                }
                Err(e) => {
                    // Kept as written, but still named so ignores and dedupe apply
                    tracing::debug!("Keeping '{}' verbatim: {}", line, e);
                    return Some(RequirementEntry {
                        name: requirement_name(requirement).map(normalize_name),
                        ..verbatim(line)
                    });
                }
            }
        }

        match requirement_name(requirement) {
            Some(name) => Some(RequirementEntry {
                spec: requirement.to_string(),
                name: Some(normalize_name(name)),
                source,
                addon: addon.map(str::to_string),
            }),
            None => Some(verbatim(line)),
        }
    }
}

/// Drop a trailing ` # comment`. A `#` not preceded by whitespace belongs to
/// the line (URL fragments such as `#egg=`).
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}

/// Extract the project name of a PEP 508 requirement.
///
/// Accepts `name`, `name[extras]`, and either followed by a version specifier,
/// a `@ url` or a parenthesized specifier. Anything else is not a
/// requirement we understand.
pub fn requirement_name(requirement: &str) -> Option<&str> {
    let requirement = requirement.trim();
    let first = requirement.chars().next()?;
    if !first.is_ascii_alphanumeric() {
        return None;
    }

    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
        .unwrap_or(requirement.len());
    let name = &requirement[..end];
    let mut rest = requirement[end..].trim_start();

    if let Some(after) = rest.strip_prefix('[') {
        let close = after.find(']')?;
        rest = after[close + 1..].trim_start();
    }

    match rest.chars().next() {
        None => Some(name),
        Some('<' | '>' | '=' | '!' | '~' | '@' | '(') => Some(name),
        Some(_) => None,
    }
}

/// PEP 503 normalization: lowercase, runs of `-`, `_` and `.` become `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Join `\`-continued lines of a requirements file.
pub fn logical_lines(contents: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in contents.lines() {
        match raw.strip_suffix('\\') {
            Some(head) => {
                current.push_str(head);
                current.push(' ');
            }
            None => {
                current.push_str(raw);
                lines.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.trim().is_empty() {
        lines.push(current);
    }
    lines
}
