//! Preset store (presets.toml)
//!
//! A preset file holds a `schema_version` plus one table per named preset.
//! Loading validates every preset up front: unknown stages, empty commands
//! and malformed `when` predicates are rejected before anything runs.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use odoo_venv_marker::PredicateError;

use super::command::{ExtraCommand, RawExtraCommand};
use super::defaults::BUILTIN_PRESETS;
use super::effective::ConfigOrigin;

/// Error types for preset operations
#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("Malformed preset file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("Preset '{name}' not found (available: {available})")]
    NotFound { name: String, available: String },

    #[error("Preset '{preset}', command '{command}': {source}")]
    InvalidPredicate {
        preset: String,
        command: String,
        #[source]
        source: PredicateError,
    },

    #[error("Preset '{preset}', command '{command}': {reason}")]
    InvalidCommand {
        preset: String,
        command: String,
        reason: String,
    },
}

/// List-valued options a layer may ask to replace instead of extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKey {
    AddonsPath,
    ExtraRequirement,
    Ignore,
    ExtraCommands,
}

/// One preset table as written in the file. Every option is optional; an
/// absent option leaves the merged value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPreset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_odoo: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_odoo_requirements: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_addons_dirs_requirements: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_addons_manifests_requirements: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_requirements_file: Option<String>,

    #[serde(
        default,
        deserialize_with = "list_or_csv",
        skip_serializing_if = "Option::is_none"
    )]
    pub addons_path: Option<Vec<String>>,

    #[serde(
        default,
        deserialize_with = "list_or_csv",
        skip_serializing_if = "Option::is_none"
    )]
    pub extra_requirement: Option<Vec<String>>,

    #[serde(
        default,
        deserialize_with = "list_or_csv",
        skip_serializing_if = "Option::is_none"
    )]
    pub ignore: Option<Vec<String>>,

    /// List options this layer replaces rather than extends
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace: Vec<ListKey>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_commands: Vec<RawExtraCommand>,

    /// Keys this version does not know about
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

/// Accept `["a", "b"]` as well as the older `"a,b"` form.
fn list_or_csv<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<ListOrCsv>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(s) => split_csv(&s),
    }))
}

/// Split a comma-separated option value, dropping blanks.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

impl RawPreset {
    /// Key-by-key overlay: every option set in `other` replaces ours.
    ///
    /// Used to apply a user preset on top of the built-in preset of the same
    /// name. This is not the layer merge (lists are replaced here).
    pub fn overlay(mut self, other: RawPreset) -> RawPreset {
        take(&mut self.description, other.description);
        take(&mut self.python_version, other.python_version);
        take(&mut self.install_odoo, other.install_odoo);
        take(&mut self.install_odoo_requirements, other.install_odoo_requirements);
        take(
            &mut self.install_addons_dirs_requirements,
            other.install_addons_dirs_requirements,
        );
        take(
            &mut self.install_addons_manifests_requirements,
            other.install_addons_manifests_requirements,
        );
        take(&mut self.extra_requirements_file, other.extra_requirements_file);
        take(&mut self.addons_path, other.addons_path);
        take(&mut self.extra_requirement, other.extra_requirement);
        take(&mut self.ignore, other.ignore);
        if !other.replace.is_empty() {
            self.replace = other.replace;
        }
        if !other.extra_commands.is_empty() {
            self.extra_commands = other.extra_commands;
        }
        self.unknown.extend(other.unknown);
        self
    }

    pub fn replaces(&self, key: ListKey) -> bool {
        self.replace.contains(&key)
    }
}

fn take<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

/// A validated preset
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub options: RawPreset,
    pub commands: Vec<ExtraCommand>,
    pub origin: ConfigOrigin,
    /// File that (last) defined this preset
    pub path: Option<String>,
    /// SHA-256 of that file
    pub digest: Option<String>,
}

impl Preset {
    /// Validate a raw preset: parse every `when` clause and check commands.
    pub fn from_raw(name: &str, options: RawPreset, origin: ConfigOrigin) -> Result<Self, PresetError> {
        for key in options.unknown.keys() {
            tracing::warn!("Preset '{}': ignoring unknown option '{}'", name, key);
        }

        let commands = options
            .extra_commands
            .iter()
            .enumerate()
            .map(|(i, raw)| ExtraCommand::from_raw(name, i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            options,
            commands,
            origin,
            path: None,
            digest: None,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.options.description.as_deref()
    }
}

/// Hex SHA-256 of a preset file's bytes.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// All presets known to one invocation, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PresetStore {
    /// `schema_version` of the file the store was read from
    pub schema_version: Option<String>,
    presets: BTreeMap<String, Preset>,
}

impl PresetStore {
    /// Load and validate a preset file.
    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let (document, digest) = Self::read_document(path)?;
        Self::from_document(document, path, &digest)
    }

    /// Read a preset file as a raw TOML document, with the SHA-256 digest of
    /// its bytes.
    pub fn read_document(path: &Path) -> Result<(toml::Table, String), PresetError> {
        let file_error = |reason: String| PresetError::File {
            path: path.display().to_string(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| file_error(e.to_string()))?;
        let digest = content_digest(&bytes);
        let contents = String::from_utf8(bytes).map_err(|e| file_error(format!("invalid UTF-8: {}", e)))?;
        let document =
            toml::from_str(&contents).map_err(|e| file_error(format!("TOML parse error: {}", e)))?;
        Ok((document, digest))
    }

    /// Validate a document read from `path` as user presets.
    pub fn from_document(document: toml::Table, path: &Path, digest: &str) -> Result<Self, PresetError> {
        let label = path.display().to_string();
        let mut store = Self::from_table(document, &label, ConfigOrigin::User)?;
        for preset in store.presets.values_mut() {
            preset.path = Some(label.clone());
            preset.digest = Some(digest.to_string());
        }
        Ok(store)
    }

    /// Presets embedded in the binary.
    pub fn builtin() -> Result<Self, PresetError> {
        Self::parse(BUILTIN_PRESETS, "<builtin>", ConfigOrigin::Builtin)
    }

    /// Built-in presets with the user file (if it exists) laid over them.
    pub fn load_layered(user_path: Option<&Path>) -> Result<Self, PresetError> {
        let builtin = Self::builtin()?;
        match user_path {
            Some(path) if path.exists() => Ok(builtin.overlay(Self::load(path)?)?),
            Some(path) => {
                tracing::debug!("No user preset file at {}", path.display());
                Ok(builtin)
            }
            None => Ok(builtin),
        }
    }

    /// Parse a preset document.
    ///
    /// `label` names the source in error messages.
    pub fn parse(contents: &str, label: &str, origin: ConfigOrigin) -> Result<Self, PresetError> {
        let file_error = |reason: String| PresetError::File {
            path: label.to_string(),
            reason,
        };

        let table: toml::Table =
            toml::from_str(contents).map_err(|e| file_error(format!("TOML parse error: {}", e)))?;
        Self::from_table(table, label, origin)
    }

    fn from_table(table: toml::Table, label: &str, origin: ConfigOrigin) -> Result<Self, PresetError> {
        let file_error = |reason: String| PresetError::File {
            path: label.to_string(),
            reason,
        };

        let mut schema_version = None;
        let mut presets = BTreeMap::new();

        for (key, value) in table {
            if key == "schema_version" {
                match value {
                    toml::Value::String(v) => schema_version = Some(v),
                    other => {
                        return Err(file_error(format!(
                            "schema_version must be a string, got {}",
                            other.type_str()
                        )))
                    }
                }
                continue;
            }

            if !value.is_table() {
                return Err(file_error(format!(
                    "preset '{}' must be a table, got {}",
                    key,
                    value.type_str()
                )));
            }

            let raw: RawPreset = value
                .try_into()
                .map_err(|e: toml::de::Error| file_error(format!("preset '{}': {}", key, e)))?;
            let preset = Preset::from_raw(&key, raw, origin.clone())?;
            presets.insert(key, preset);
        }

        Ok(Self {
            schema_version,
            presets,
        })
    }

    /// Lay `other` over this store: presets with the same name are overlaid
    /// key by key, new names are added.
    pub fn overlay(mut self, other: PresetStore) -> Result<Self, PresetError> {
        for (name, preset) in other.presets {
            let merged = match self.presets.remove(&name) {
                Some(base) => {
                    let options = base.options.overlay(preset.options);
                    let mut merged = Preset::from_raw(&name, options, preset.origin)?;
                    merged.path = preset.path;
                    merged.digest = preset.digest;
                    merged
                }
                None => preset,
            };
            self.presets.insert(name, merged);
        }
        if other.schema_version.is_some() {
            self.schema_version = other.schema_version;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Look up a preset, failing with `PresetError::NotFound`.
    pub fn require(&self, name: &str) -> Result<&Preset, PresetError> {
        self.presets.get(name).ok_or_else(|| PresetError::NotFound {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    /// Preset names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(|k| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.values()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
schema_version = "1.1.0"

[common]
ignore = ["setuptools"]

[demo]
description = "Demo preset"
extra_requirement = ["ipython"]

[[demo.extra_commands]]
name = "hello"
command = "echo hello"
stage = "after_venv"
when = "odoo_version >= 16.0"
"#;

    #[test]
    fn test_parse_presets() {
        let store = PresetStore::parse(SAMPLE, "sample", ConfigOrigin::User).unwrap();
        assert_eq!(store.schema_version.as_deref(), Some("1.1.0"));
        assert_eq!(store.names(), vec!["common", "demo"]);

        let demo = store.get("demo").unwrap();
        assert_eq!(demo.description(), Some("Demo preset"));
        assert_eq!(demo.commands.len(), 1);
        assert_eq!(demo.commands[0].when.as_str(), "odoo_version >= 16.0");
    }

    #[test]
    fn test_builtin_presets_are_valid() {
        let store = PresetStore::builtin().unwrap();
        assert!(store.contains("common"));
        assert!(store.iter().all(|p| p.origin == ConfigOrigin::Builtin));
    }

    #[test]
    fn test_malformed_toml() {
        let err = PresetStore::parse("[demo\nfoo = 1", "broken.toml", ConfigOrigin::User).unwrap_err();
        assert!(matches!(err, PresetError::File { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_non_table_preset_rejected() {
        let err = PresetStore::parse("demo = 3", "x", ConfigOrigin::User).unwrap_err();
        assert!(err.to_string().contains("must be a table"));
    }

    #[test]
    fn test_invalid_predicate_fails_at_load() {
        let src = r#"
[demo]
[[demo.extra_commands]]
name = "bad"
command = "true"
stage = "after_venv"
when = "odoo_version >>> 16"
"#;
        let err = PresetStore::parse(src, "x", ConfigOrigin::User).unwrap_err();
        assert!(matches!(err, PresetError::InvalidPredicate { .. }));
    }

    #[test]
    fn test_replace_non_list_key_rejected() {
        let err = PresetStore::parse("[demo]\nreplace = [\"description\"]", "x", ConfigOrigin::User)
            .unwrap_err();
        assert!(matches!(err, PresetError::File { .. }));
    }

    #[test]
    fn test_csv_list_accepted() {
        let store =
            PresetStore::parse("[demo]\nextra_requirement = \"ipython, debugpy,\"", "x", ConfigOrigin::User)
                .unwrap();
        let demo = store.get("demo").unwrap();
        assert_eq!(
            demo.options.extra_requirement,
            Some(vec!["ipython".to_string(), "debugpy".to_string()])
        );
    }

    #[test]
    fn test_unknown_keys_are_kept_aside() {
        let store = PresetStore::parse("[demo]\nfavourite_color = \"blue\"", "x", ConfigOrigin::User)
            .unwrap();
        assert!(store.get("demo").unwrap().options.unknown.contains_key("favourite_color"));
    }

    #[test]
    fn test_require_missing_preset() {
        let store = PresetStore::parse(SAMPLE, "sample", ConfigOrigin::User).unwrap();
        let err = store.require("nope").unwrap_err();
        assert!(matches!(err, PresetError::NotFound { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_overlay_user_over_builtin() {
        let builtin = PresetStore::parse(
            "[dev]\ndescription = \"tools\"\nextra_requirement = [\"ipython\"]\ninstall_odoo = false",
            "<builtin>",
            ConfigOrigin::Builtin,
        )
        .unwrap();
        let user = PresetStore::parse(
            "[dev]\nextra_requirement = [\"pudb\"]\n[mine]\ninstall_odoo = true",
            "user",
            ConfigOrigin::User,
        )
        .unwrap();

        let store = builtin.overlay(user).unwrap();
        let dev = store.get("dev").unwrap();
        assert_eq!(dev.options.description.as_deref(), Some("tools"));
        assert_eq!(dev.options.extra_requirement, Some(vec!["pudb".to_string()]));
        assert_eq!(dev.options.install_odoo, Some(false));
        assert_eq!(dev.origin, ConfigOrigin::User);
        assert!(store.contains("mine"));
    }

    #[test]
    fn test_load_records_digest() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, "{}", SAMPLE).unwrap();

        let store = PresetStore::load(temp.path()).unwrap();
        let demo = store.get("demo").unwrap();
        assert_eq!(demo.digest.as_ref().map(|d| d.len()), Some(64));
        assert_eq!(demo.path.as_deref(), Some(temp.path().display().to_string().as_str()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PresetStore::load(Path::new("/nonexistent/presets.toml")).unwrap_err();
        assert!(matches!(err, PresetError::File { .. }));
    }
}
