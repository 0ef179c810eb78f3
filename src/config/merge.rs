//! Preset merge
//!
//! Layers are merged in a fixed order:
//! 1. `common` (when the store defines it)
//! 2. Requested presets, in the order given
//! 3. Command-line overrides
//!
//! Each layer only touches the options it sets. See [`EffectiveConfig`] for
//! the per-field policy.

use super::defaults::COMMON_PRESET;
use super::effective::{ConfigOrigin, EffectiveConfig};
use super::preset::{Preset, PresetError, PresetStore, RawPreset};

/// Name of the command-line layer in provenance records.
pub const CLI_LAYER: &str = "cli";

/// Merge `common`, the requested presets and the CLI overrides.
///
/// Every requested name is checked before anything is merged, so an unknown
/// preset fails without side effects. Asking for `common` explicitly does not
/// merge it twice.
pub fn merge(
    store: &PresetStore,
    requested: &[String],
    cli_overrides: &RawPreset,
) -> Result<EffectiveConfig, PresetError> {
    let layers = requested
        .iter()
        .filter(|name| name.as_str() != COMMON_PRESET)
        .map(|name| store.require(name))
        .collect::<Result<Vec<_>, _>>()?;

    let cli = Preset::from_raw(CLI_LAYER, cli_overrides.clone(), ConfigOrigin::Cli)?;

    let mut config = EffectiveConfig::default();
    if let Some(common) = store.get(COMMON_PRESET) {
        tracing::debug!("Merging preset '{}'", COMMON_PRESET);
        config.apply(common);
    }
    for preset in layers {
        tracing::debug!("Merging preset '{}' ({:?})", preset.name, preset.origin);
        config.apply(preset);
    }
    config.apply(&cli);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"
schema_version = "1.1.0"

[common]
ignore = ["setuptools"]
python_version = "3.10"

[a]
extra_requirement = ["foo", "bar"]
install_odoo = false

[b]
extra_requirement = ["foo", "baz"]
python_version = "3.12"

[wipe]
ignore = []
replace = ["ignore"]
"#;

    fn store() -> PresetStore {
        PresetStore::parse(STORE, "test", ConfigOrigin::User).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_common_always_first() {
        let config = merge(&store(), &names(&["a"]), &RawPreset::default()).unwrap();
        assert_eq!(config.layers(), vec!["common", "a", "cli"]);
        assert_eq!(config.ignore, vec!["setuptools"]);
    }

    #[test]
    fn test_later_preset_wins_scalars() {
        let config = merge(&store(), &names(&["a", "b"]), &RawPreset::default()).unwrap();
        assert_eq!(config.python_version.as_deref(), Some("3.12"));
        assert!(!config.install_odoo);
        assert_eq!(config.extra_requirement, vec!["foo", "bar", "foo", "baz"]);
    }

    #[test]
    fn test_cli_overrides_last() {
        let cli = RawPreset {
            install_odoo: Some(true),
            extra_requirement: Some(names(&["debugpy"])),
            ..Default::default()
        };
        let config = merge(&store(), &names(&["a"]), &cli).unwrap();
        assert!(config.install_odoo);
        assert_eq!(config.extra_requirement, vec!["foo", "bar", "debugpy"]);
    }

    #[test]
    fn test_unknown_preset_fails() {
        let err = merge(&store(), &names(&["a", "nope"]), &RawPreset::default()).unwrap_err();
        match err {
            PresetError::NotFound { name, available } => {
                assert_eq!(name, "nope");
                assert!(available.contains("common"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_explicit_common_not_merged_twice() {
        let config = merge(&store(), &names(&["common"]), &RawPreset::default()).unwrap();
        assert_eq!(config.ignore, vec!["setuptools"]);
        assert_eq!(config.layers(), vec!["common", "cli"]);
    }

    #[test]
    fn test_replace_clears_earlier_layers() {
        let config = merge(&store(), &names(&["wipe"]), &RawPreset::default()).unwrap();
        assert!(config.ignore.is_empty());
    }

    #[test]
    fn test_store_without_common() {
        let store = PresetStore::parse("[solo]\ninstall_odoo = false", "x", ConfigOrigin::User).unwrap();
        let config = merge(&store, &names(&["solo"]), &RawPreset::default()).unwrap();
        assert!(!config.install_odoo);
        assert_eq!(config.layers(), vec!["solo", "cli"]);
    }
}
