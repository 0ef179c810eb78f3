//! Built-in defaults (lowest layer)
//!
//! Hardcoded option defaults, the embedded preset file and the Odoo to
//! Python version table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedded built-in preset file.
pub const BUILTIN_PRESETS: &str = include_str!("../../assets/presets.toml");

/// Name of the preset merged into every invocation.
pub const COMMON_PRESET: &str = "common";

/// Default user preset file, relative to `$HOME`.
pub const USER_PRESETS_RELATIVE: &str = ".local/share/odoo-venv/presets.toml";

/// Environment variable overriding the user preset file location.
pub const PRESETS_ENV_VAR: &str = "ODOO_VENV_PRESETS";

/// Default Python version per Odoo series.
///
/// Same versions as the OCA CI matrix, with a few adjustments (12.0 needs 3.7
/// for gevent).
pub const ODOO_PYTHON_VERSIONS: &[(&str, &str)] = &[
    ("12.0", "3.7"),
    ("13.0", "3.7"),
    ("14.0", "3.8"),
    ("15.0", "3.8"),
    ("16.0", "3.10"),
    ("17.0", "3.10"),
    ("18.0", "3.12"),
    ("19.0", "3.12"),
];

/// Oldest Python the environment backend can create.
pub const MIN_SUPPORTED_PYTHON: &str = "3.7";

/// Look up the default Python version for an Odoo series.
pub fn python_for_odoo(odoo_version: &str) -> Option<&'static str> {
    ODOO_PYTHON_VERSIONS
        .iter()
        .find(|(odoo, _)| *odoo == odoo_version)
        .map(|(_, python)| *python)
}

/// Default location of the user preset file.
///
/// `ODOO_VENV_PRESETS` wins over `$HOME/.local/share/odoo-venv/presets.toml`.
pub fn default_presets_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(PRESETS_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(USER_PRESETS_RELATIVE))
}

/// Replace a leading `~` with `$HOME`.
///
/// Paths without it, or with `HOME` unset, come back unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    expand_home_in(path, std::env::var_os("HOME").map(PathBuf::from))
}

fn expand_home_in(path: &Path, home: Option<PathBuf>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Built-in default values for scalar options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Install Odoo itself in editable mode (default: true)
    pub install_odoo: bool,

    /// Install Odoo's own requirements.txt (default: true)
    pub install_odoo_requirements: bool,

    /// Install requirements.txt found at the root of addons paths (default: false)
    pub install_addons_dirs_requirements: bool,

    /// Install external dependencies declared in addon manifests (default: false)
    pub install_addons_manifests_requirements: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            install_odoo: true,
            install_odoo_requirements: true,
            install_addons_dirs_requirements: false,
            install_addons_manifests_requirements: false,
        }
    }
}
