//! Effective configuration with full provenance
//!
//! The effective config is the single merged configuration for one
//! invocation, plus the list of layers that contributed to it.

use serde::{Deserialize, Serialize};

use super::command::{ExtraCommand, Stage};
use super::defaults::BuiltinDefaults;
use super::preset::{ListKey, Preset};

/// Origin of a configuration layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSource {
    /// Preset name, or "cli" for command-line overrides
    pub layer: String,

    /// Origin of this layer
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration for one invocation.
///
/// Merge policy per field:
/// - scalars (`description`, `python_version`, `install_*`,
///   `extra_requirements_file`): replace, last layer wins
/// - lists (`addons_path`, `extra_requirement`, `ignore`): concatenate in
///   layer order, unless the layer lists the key under `replace`
/// - `extra_commands`: appended in declaration order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EffectiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,

    pub install_odoo: bool,

    pub install_odoo_requirements: bool,

    pub install_addons_dirs_requirements: bool,

    pub install_addons_manifests_requirements: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_requirements_file: Option<String>,

    pub addons_path: Vec<String>,

    pub extra_requirement: Vec<String>,

    pub ignore: Vec<String>,

    pub extra_commands: Vec<ExtraCommand>,

    /// Contributing layers in precedence order (lowest first)
    pub sources: Vec<ConfigSource>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            description: None,
            python_version: None,
            install_odoo: defaults.install_odoo,
            install_odoo_requirements: defaults.install_odoo_requirements,
            install_addons_dirs_requirements: defaults.install_addons_dirs_requirements,
            install_addons_manifests_requirements: defaults.install_addons_manifests_requirements,
            extra_requirements_file: None,
            addons_path: Vec::new(),
            extra_requirement: Vec::new(),
            ignore: Vec::new(),
            extra_commands: Vec::new(),
            sources: Vec::new(),
        }
    }
}

impl EffectiveConfig {
    /// Merge one layer on top of the current state.
    pub fn apply(&mut self, layer: &Preset) {
        let options = &layer.options;

        replace_option(&mut self.description, &options.description);
        replace_option(&mut self.python_version, &options.python_version);
        replace_option(&mut self.extra_requirements_file, &options.extra_requirements_file);
        replace_scalar(&mut self.install_odoo, options.install_odoo);
        replace_scalar(&mut self.install_odoo_requirements, options.install_odoo_requirements);
        replace_scalar(
            &mut self.install_addons_dirs_requirements,
            options.install_addons_dirs_requirements,
        );
        replace_scalar(
            &mut self.install_addons_manifests_requirements,
            options.install_addons_manifests_requirements,
        );

        extend_list(
            &mut self.addons_path,
            options.addons_path.as_deref(),
            options.replaces(ListKey::AddonsPath),
        );
        extend_list(
            &mut self.extra_requirement,
            options.extra_requirement.as_deref(),
            options.replaces(ListKey::ExtraRequirement),
        );
        extend_list(
            &mut self.ignore,
            options.ignore.as_deref(),
            options.replaces(ListKey::Ignore),
        );

        if options.replaces(ListKey::ExtraCommands) {
            self.extra_commands.clear();
        }
        self.extra_commands.extend(layer.commands.iter().cloned());

        self.sources.push(ConfigSource {
            layer: layer.name.clone(),
            origin: layer.origin.clone(),
            path: layer.path.clone(),
            digest: layer.digest.clone(),
        });
    }

    /// Commands attached to `stage`, in declaration order.
    pub fn commands_for(&self, stage: Stage) -> Vec<&ExtraCommand> {
        self.extra_commands
            .iter()
            .filter(|c| c.stage == stage)
            .collect()
    }

    /// Names of the layers merged so far.
    pub fn layers(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.layer.as_str()).collect()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn replace_option<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *target = value.clone();
    }
}

fn replace_scalar<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn extend_list(target: &mut Vec<String>, items: Option<&[String]>, replace: bool) {
    match items {
        Some(items) => {
            if replace {
                target.clear();
            }
            target.extend(items.iter().cloned());
        }
        None if replace => target.clear(),
        None => {}
    }
}
