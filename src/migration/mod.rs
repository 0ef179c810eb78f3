//! Preset file schema migrations
//!
//! The preset file carries a `schema_version`. Migrations form an ordered
//! registry keyed by `from_version`; running the registry over a document
//! brings it to the latest version, applying every step once, in order.
//!
//! The read-transform-write cycle on disk takes no lock: two invocations
//! migrating the same file at the same time may race.

mod steps;

pub use steps::{csv_lists_to_arrays, fold_legacy_ignores, LEGACY_IGNORE_KEYS};

use std::fs;
use std::path::{Path, PathBuf};

use odoo_venv_marker::DottedVersion;
use serde::Serialize;
use toml::{Table, Value};

use crate::config::{content_digest, PresetError, PresetStore, BUILTIN_PRESETS};

/// Key holding the schema version in the preset file
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Error types for migrations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Migration {from} -> {to} failed: {reason}")]
    Step {
        from: DottedVersion,
        to: DottedVersion,
        reason: String,
    },

    #[error("Unsupported preset schema version '{version}' (latest known: {latest})")]
    UnsupportedSchemaVersion { version: String, latest: String },

    #[error("Cannot migrate preset file {path}: {reason}")]
    File { path: String, reason: String },

    /// The file could not be read as a preset document
    #[error(transparent)]
    Preset(#[from] PresetError),
}

/// Document transform for one step
pub type Transform = fn(Table) -> Result<Table, String>;

/// One schema upgrade
#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub from_version: DottedVersion,
    pub to_version: DottedVersion,
    pub description: &'static str,
    pub transform: Transform,
}

impl MigrationStep {
    pub fn new(from: &[u64], to: &[u64], description: &'static str, transform: Transform) -> Self {
        Self {
            from_version: DottedVersion::new(from.to_vec()),
            to_version: DottedVersion::new(to.to_vec()),
            description,
            transform,
        }
    }
}

/// Ordered set of migration steps
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    /// Registry over `steps`, sorted by `from_version` whatever the order
    /// they were given in.
    pub fn new(mut steps: Vec<MigrationStep>) -> Self {
        steps.sort_by(|a, b| a.from_version.cmp(&b.from_version));
        Self { steps }
    }

    /// Migrations shipped with this version.
    pub fn builtin() -> Self {
        Self::new(vec![
            MigrationStep::new(
                &[0, 1, 0],
                &[1, 0, 0],
                "comma-separated list options become arrays",
                csv_lists_to_arrays,
            ),
            MigrationStep::new(
                &[1, 0, 0],
                &[1, 1, 0],
                "per-source ignore options fold into 'ignore'",
                fold_legacy_ignores,
            ),
        ])
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Version assumed for documents without `schema_version`.
    pub fn initial_version(&self) -> Option<&DottedVersion> {
        self.steps.first().map(|s| &s.from_version)
    }

    /// Version every migrated document ends up at.
    pub fn latest_version(&self) -> Option<&DottedVersion> {
        self.steps.iter().map(|s| &s.to_version).max()
    }
}

/// Result of migrating a document
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub document: Table,
    /// Versions reached, one per applied step
    pub applied: Vec<String>,
}

/// Bring `document` to the latest schema version.
///
/// The chain starts at the step whose `from_version` is the document's
/// version and runs every later step in ascending order. A version that is
/// neither a step's starting point nor the latest one is rejected. An
/// already current document comes back unchanged with nothing applied.
pub fn migrate(document: Table, registry: &MigrationRegistry) -> Result<Migrated, MigrationError> {
    let (Some(initial), Some(latest)) = (registry.initial_version(), registry.latest_version()) else {
        return Ok(Migrated {
            document,
            applied: Vec::new(),
        });
    };

    let current = match document.get(SCHEMA_VERSION_KEY) {
        None => initial.clone(),
        Some(Value::String(v)) => {
            v.parse::<DottedVersion>()
                .map_err(|_| MigrationError::UnsupportedSchemaVersion {
                    version: v.clone(),
                    latest: latest.to_string(),
                })?
        }
        Some(other) => {
            return Err(MigrationError::UnsupportedSchemaVersion {
                version: other.to_string(),
                latest: latest.to_string(),
            })
        }
    };

    // Only versions the registry can start from (or the latest) are accepted
    let known = &current == latest || registry.steps().iter().any(|s| s.from_version == current);
    if !known {
        return Err(MigrationError::UnsupportedSchemaVersion {
            version: current.to_string(),
            latest: latest.to_string(),
        });
    }

    let mut document = document;
    let mut applied = Vec::new();
    for step in registry.steps().iter().filter(|s| s.from_version >= current) {
        tracing::info!(
            "Migrating presets {} -> {}: {}",
            step.from_version,
            step.to_version,
            step.description
        );
        document = (step.transform)(document).map_err(|reason| MigrationError::Step {
            from: step.from_version.clone(),
            to: step.to_version.clone(),
            reason,
        })?;
        document.insert(
            SCHEMA_VERSION_KEY.to_string(),
            Value::String(step.to_version.to_string()),
        );
        applied.push(step.to_version.to_string());
    }

    Ok(Migrated { document, applied })
}

/// What `migrate_file` did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileMigration {
    pub path: String,
    pub applied: Vec<String>,
    /// Copy of the previous file, when it was rewritten
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    /// Migrated document, whether or not it was written back
    #[serde(skip)]
    pub document: Table,
    /// Digest of the file as it stands on disk afterwards
    #[serde(skip)]
    pub digest: String,
}

impl FileMigration {
    /// Presets of the migrated document.
    ///
    /// In a dry run this is what the file would hold once migrated.
    pub fn presets(&self) -> Result<PresetStore, PresetError> {
        PresetStore::from_document(self.document.clone(), Path::new(&self.path), &self.digest)
    }
}

/// Path of the backup written before a file is rewritten.
pub fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("toml.bak")
}

/// Migrate the preset file at `path` in place.
///
/// The file is rewritten only when at least one step ran and all of them
/// succeeded: the previous contents go to `<name>.toml.bak`, the new
/// contents are written to a temporary file and renamed over the original.
/// With `dry_run` nothing is written.
pub fn migrate_file(
    path: &Path,
    registry: &MigrationRegistry,
    dry_run: bool,
) -> Result<FileMigration, MigrationError> {
    let file_error = |reason: String| MigrationError::File {
        path: path.display().to_string(),
        reason,
    };

    let (document, digest) = PresetStore::read_document(path)?;

    let migrated = migrate(document, registry)?;
    let mut report = FileMigration {
        path: path.display().to_string(),
        applied: migrated.applied,
        backup: None,
        document: migrated.document,
        digest,
    };

    if report.applied.is_empty() || dry_run {
        return Ok(report);
    }

    let rendered = toml::to_string(&report.document)
        .map_err(|e| file_error(format!("cannot serialize migrated document: {}", e)))?;

    let backup = backup_path(path);
    fs::copy(path, &backup).map_err(|e| file_error(format!("cannot write backup: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    fs::write(&temp_path, &rendered).map_err(|e| file_error(e.to_string()))?;
    fs::rename(&temp_path, path).map_err(|e| file_error(e.to_string()))?;

    report.digest = content_digest(rendered.as_bytes());
    tracing::info!(
        "Migrated {} to schema {} (backup: {})",
        path.display(),
        report.applied.last().map(String::as_str).unwrap_or_default(),
        backup.display()
    );
    report.backup = Some(backup.display().to_string());
    Ok(report)
}

/// Create the user preset file from the built-in presets if it is missing.
///
/// Returns whether the file was created.
pub fn ensure_presets_file(path: &Path) -> Result<bool, MigrationError> {
    if path.exists() {
        return Ok(false);
    }
    let file_error = |e: std::io::Error| MigrationError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(file_error)?;
    }
    fs::write(path, BUILTIN_PRESETS).map_err(file_error)?;
    tracing::info!("Initialized preset file {}", path.display());
    Ok(true)
}

/// Built-in presets with the user file at `path` laid over them.
///
/// The user file is created from the built-in presets when missing and
/// migrated to the current schema first. With `dry_run` nothing is written,
/// and the presets come from the migrated document held in memory.
pub fn load_user_presets(
    path: &Path,
    registry: &MigrationRegistry,
    dry_run: bool,
) -> Result<PresetStore, MigrationError> {
    if !dry_run {
        ensure_presets_file(path)?;
    }
    if !path.exists() {
        return Ok(PresetStore::builtin()?);
    }
    let migration = migrate_file(path, registry, dry_run)?;
    Ok(PresetStore::builtin()?.overlay(migration.presets()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(src: &str) -> Table {
        toml::from_str(src).unwrap()
    }

    fn set_flag(mut doc: Table) -> Result<Table, String> {
        doc.insert("touched".to_string(), Value::Boolean(true));
        Ok(doc)
    }

    fn fail(_: Table) -> Result<Table, String> {
        Err("boom".to_string())
    }

    #[test]
    fn test_registry_sorted() {
        let registry = MigrationRegistry::new(vec![
            MigrationStep::new(&[2, 0, 0], &[3, 0, 0], "second", set_flag),
            MigrationStep::new(&[1, 0, 0], &[2, 0, 0], "first", set_flag),
        ]);
        let descriptions: Vec<_> = registry.steps().iter().map(|s| s.description).collect();
        assert_eq!(descriptions, vec!["first", "second"]);
        assert_eq!(registry.latest_version().unwrap().to_string(), "3.0.0");
    }

    #[test]
    fn test_builtin_registry() {
        let registry = MigrationRegistry::builtin();
        assert_eq!(registry.steps().len(), 2);
        assert_eq!(registry.initial_version().unwrap().to_string(), "0.1.0");
        assert_eq!(registry.latest_version().unwrap().to_string(), "1.1.0");
    }

    #[test]
    fn test_missing_version_applies_everything() {
        let migrated = migrate(
            doc("[dev]\nignore_from_odoo_requirements = \"a,b\""),
            &MigrationRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(migrated.applied, vec!["1.0.0", "1.1.0"]);
        assert_eq!(migrated.document["schema_version"].as_str(), Some("1.1.0"));
        let ignore = migrated.document["dev"]["ignore"].as_array().unwrap();
        assert_eq!(ignore.len(), 2);
    }

    #[test]
    fn test_current_document_unchanged() {
        let original = doc("schema_version = \"1.1.0\"\n[dev]\nignore = [\"x\"]");
        let migrated = migrate(original.clone(), &MigrationRegistry::builtin()).unwrap();
        assert!(migrated.applied.is_empty());
        assert_eq!(migrated.document, original);
    }

    #[test]
    fn test_future_version_rejected() {
        let err = migrate(doc("schema_version = \"9.0.0\""), &MigrationRegistry::builtin()).unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedSchemaVersion { .. }));
        assert!(err.to_string().contains("9.0.0"));
    }

    #[test]
    fn test_version_between_steps_rejected() {
        let original = doc("schema_version = \"1.0.5\"\n[common]\nignore_from_odoo_requirements = [\"x\"]");
        let err = migrate(original, &MigrationRegistry::builtin()).unwrap_err();
        match err {
            MigrationError::UnsupportedSchemaVersion { version, latest } => {
                assert_eq!(version, "1.0.5");
                assert_eq!(latest, "1.1.0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_padded_version_accepted() {
        let migrated = migrate(doc("schema_version = \"1.0\""), &MigrationRegistry::builtin()).unwrap();
        assert_eq!(migrated.applied, vec!["1.1.0"]);
    }

    #[test]
    fn test_garbage_version_rejected() {
        let err = migrate(doc("schema_version = 3"), &MigrationRegistry::builtin()).unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedSchemaVersion { .. }));
    }

    #[test]
    fn test_failing_step_identified() {
        let registry = MigrationRegistry::new(vec![
            MigrationStep::new(&[1, 0, 0], &[2, 0, 0], "ok", set_flag),
            MigrationStep::new(&[2, 0, 0], &[3, 0, 0], "broken", fail),
        ]);
        let err = migrate(doc("schema_version = \"1.0.0\""), &registry).unwrap_err();
        match err {
            MigrationError::Step { from, to, reason } => {
                assert_eq!(from.to_string(), "2.0.0");
                assert_eq!(to.to_string(), "3.0.0");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_skipped_versions_applied_in_order() {
        let registry = MigrationRegistry::builtin();
        let migrated = migrate(doc("schema_version = \"1.0.0\""), &registry).unwrap();
        assert_eq!(migrated.applied, vec!["1.1.0"]);
    }

    #[test]
    fn test_ensure_presets_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/presets.toml");
        assert!(ensure_presets_file(&path).unwrap());
        assert!(!ensure_presets_file(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), BUILTIN_PRESETS);
    }
}
