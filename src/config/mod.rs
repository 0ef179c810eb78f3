//! Preset configuration
//!
//! Options are resolved from several layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. The `common` preset
//! 3. Requested presets, in order
//! 4. CLI flags
//!
//! Built-in presets ship with the binary; the user preset file
//! (~/.local/share/odoo-venv/presets.toml) is laid over them.

mod command;
mod defaults;
mod effective;
mod merge;
mod preset;

pub use command::{CommandSpec, ExtraCommand, RawExtraCommand, Stage};
pub use defaults::{
    default_presets_path, expand_home, python_for_odoo, BuiltinDefaults, BUILTIN_PRESETS, COMMON_PRESET,
    MIN_SUPPORTED_PYTHON, ODOO_PYTHON_VERSIONS, PRESETS_ENV_VAR,
};
pub use effective::{ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{merge, CLI_LAYER};
pub use preset::{content_digest, split_csv, ListKey, Preset, PresetError, PresetStore, RawPreset};
