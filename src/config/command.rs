//! Extra commands declared in presets
//!
//! An extra command runs at one provisioning stage, optionally gated by a
//! `when` predicate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use odoo_venv_marker::Predicate;

use super::preset::PresetError;

/// Provisioning stage an extra command is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Right after the virtual environment is created
    AfterVenv,
    /// After the resolved requirements are installed
    AfterRequirements,
    /// After Odoo itself is installed in editable mode
    AfterOdooInstall,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [
        Stage::AfterVenv,
        Stage::AfterRequirements,
        Stage::AfterOdooInstall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AfterVenv => "after_venv",
            Stage::AfterRequirements => "after_requirements",
            Stage::AfterOdooInstall => "after_odoo_install",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!(
                    "unknown stage '{}' (valid: after_venv, after_requirements, after_odoo_install)",
                    s
                )
            })
    }
}

/// The command itself: a shell string or an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// Run through `sh -c`
    Shell(String),
    /// Run directly, no shell involved
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Shell(s) => s.trim().is_empty(),
            CommandSpec::Argv(argv) => argv.is_empty() || argv[0].trim().is_empty(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(s) => f.write_str(s),
            CommandSpec::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

/// `[[<preset>.extra_commands]]` entry as written in the preset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtraCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub command: CommandSpec,

    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,

    /// Extra environment variables; non-string values are stringified
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, toml::Value>,
}

/// A validated extra command, tagged with the layer that declared it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraCommand {
    pub name: String,
    pub command: CommandSpec,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Predicate::is_always")]
    pub when: Predicate,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Layer (preset name or "cli") the command came from
    pub origin: String,
}

impl ExtraCommand {
    /// Validate a raw entry. The `when` clause is parsed here so a malformed
    /// predicate is rejected when the preset is loaded.
    pub fn from_raw(layer: &str, index: usize, raw: &RawExtraCommand) -> Result<Self, PresetError> {
        let name = raw
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}.extra_commands[{}]", layer, index));

        if raw.command.is_empty() {
            return Err(PresetError::InvalidCommand {
                preset: layer.to_string(),
                command: name,
                reason: "'command' must not be empty".to_string(),
            });
        }

        let when = match raw.when.as_deref() {
            Some(source) => Predicate::parse(source).map_err(|e| PresetError::InvalidPredicate {
                preset: layer.to_string(),
                command: name.clone(),
                source: e,
            })?,
            None => Predicate::always(),
        };

        let env = raw
            .env
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();

        Ok(Self {
            name,
            command: raw.command.clone(),
            stage: raw.stage,
            when,
            env,
            origin: layer.to_string(),
        })
    }
}
