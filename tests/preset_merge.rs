//! Preset store and merge tests
//!
//! Layer order, list concatenation, scalar precedence and load-time
//! validation, exercised through preset files on disk.

use std::io::Write;

use odoo_venv::config::{merge, ConfigOrigin, PresetError, PresetStore, RawPreset, Stage};
use tempfile::NamedTempFile;

const PRESETS: &str = r#"
schema_version = "1.1.0"

[common]
ignore = ["setuptools"]
install_odoo_requirements = true
extra_requirement = ["wheel"]

[[common.extra_commands]]
name = "common-hook"
command = "echo common"
stage = "after_venv"

[a]
python_version = "3.10"
extra_requirement = ["alpha"]
addons_path = ["/srv/a"]

[[a.extra_commands]]
name = "a-hook"
command = ["echo", "a"]
stage = "after_venv"

[b]
python_version = "3.11"
install_odoo = false
extra_requirement = ["beta"]
addons_path = ["/srv/b"]

[[b.extra_commands]]
name = "b-hook"
command = "echo b"
stage = "after_venv"
when = "odoo_version >= 16.0"
"#;

fn store() -> PresetStore {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", PRESETS).unwrap();
    PresetStore::load(file.path()).unwrap()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_cli_scalars_are_final() {
    let store = store();
    let cli = RawPreset {
        python_version: Some("3.12".to_string()),
        install_odoo: Some(true),
        ..Default::default()
    };

    for requested in [vec![], names(&["a"]), names(&["a", "b"]), names(&["b", "a"])] {
        let config = merge(&store, &requested, &cli).unwrap();
        assert_eq!(config.python_version.as_deref(), Some("3.12"), "{:?}", requested);
        assert!(config.install_odoo, "{:?}", requested);
    }
}

#[test]
fn test_later_preset_wins() {
    let store = store();
    let config = merge(&store, &names(&["a", "b"]), &RawPreset::default()).unwrap();
    assert_eq!(config.python_version.as_deref(), Some("3.11"));
    assert!(!config.install_odoo);

    let config = merge(&store, &names(&["b", "a"]), &RawPreset::default()).unwrap();
    assert_eq!(config.python_version.as_deref(), Some("3.10"));
    // a does not set install_odoo, so b's value survives
    assert!(!config.install_odoo);
}

#[test]
fn test_lists_concatenate_in_layer_order() {
    let store = store();
    let config = merge(&store, &names(&["a", "b"]), &RawPreset::default()).unwrap();

    assert_eq!(config.extra_requirement, vec!["wheel", "alpha", "beta"]);
    assert_eq!(config.addons_path, vec!["/srv/a", "/srv/b"]);
    assert_eq!(config.ignore, vec!["setuptools"]);
}

#[test]
fn test_commands_in_declaration_order_with_origin() {
    let store = store();
    let config = merge(&store, &names(&["b", "a"]), &RawPreset::default()).unwrap();

    let commands: Vec<_> = config
        .commands_for(Stage::AfterVenv)
        .into_iter()
        .map(|c| (c.name.clone(), c.origin.clone()))
        .collect();
    assert_eq!(
        commands,
        vec![
            ("common-hook".to_string(), "common".to_string()),
            ("b-hook".to_string(), "b".to_string()),
            ("a-hook".to_string(), "a".to_string()),
        ]
    );
}

#[test]
fn test_unknown_preset_fails_fast() {
    let err = merge(&store(), &names(&["a", "missing"]), &RawPreset::default()).unwrap_err();
    assert!(matches!(err, PresetError::NotFound { ref name, .. } if name == "missing"));
}

#[test]
fn test_provenance_recorded() {
    let store = store();
    let config = merge(&store, &names(&["a"]), &RawPreset::default()).unwrap();

    assert_eq!(config.layers(), vec!["common", "a", "cli"]);
    let a = &config.sources[1];
    assert_eq!(a.origin, ConfigOrigin::User);
    assert_eq!(a.digest.as_ref().map(|d| d.len()), Some(64));
    assert_eq!(config.sources[2].origin, ConfigOrigin::Cli);
}

#[test]
fn test_malformed_predicate_rejected_at_load() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "[bad]\n[[bad.extra_commands]]\nname = \"x\"\ncommand = \"true\"\nstage = \"after_venv\"\nwhen = \"odoo_version >>> 16\"\n"
    )
    .unwrap();

    let err = PresetStore::load(file.path()).unwrap_err();
    assert!(matches!(err, PresetError::InvalidPredicate { .. }));
}

#[test]
fn test_unknown_stage_rejected_at_load() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "[bad]\n[[bad.extra_commands]]\ncommand = \"true\"\nstage = \"before_everything\"\n"
    )
    .unwrap();

    let err = PresetStore::load(file.path()).unwrap_err();
    assert!(matches!(err, PresetError::File { .. }));
}

#[test]
fn test_user_file_overlays_builtin() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[dev]\nextra_requirement = [\"pudb\"]\n[mine]\ndescription = \"mine\"\n").unwrap();

    let store = PresetStore::load_layered(Some(file.path())).unwrap();
    assert!(store.contains("common"));
    assert!(store.contains("mine"));
    let dev = store.get("dev").unwrap();
    assert_eq!(dev.options.extra_requirement, Some(vec!["pudb".to_string()]));
    // Description comes from the built-in preset
    assert!(dev.description().is_some());
}

#[test]
fn test_missing_user_file_falls_back_to_builtin() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = PresetStore::load_layered(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(store.names(), PresetStore::builtin().unwrap().names());
}
