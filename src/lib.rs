//! odoo-venv - Odoo development environment provisioning
//!
//! This crate resolves layered presets into one effective configuration,
//! gathers and filters Python requirements from an Odoo checkout and its
//! addons, and runs user-declared lifecycle commands while a virtual
//! environment is created.

pub mod backend;
pub mod config;
pub mod lifecycle;
pub mod migration;
pub mod provision;
pub mod requirements;

pub use backend::{Backend, BackendError, UvBackend};
pub use config::{merge, EffectiveConfig, ExtraCommand, PresetError, PresetStore, RawPreset, Stage};
pub use lifecycle::{run_stage, CommandError, CommandRunner, ShellRunner, StageContext};
pub use migration::{migrate, migrate_file, MigrationError, MigrationRegistry};
pub use odoo_venv_marker::{evaluate, MarkerContext, Predicate, PredicateError};
pub use provision::{ProvisionError, ProvisionRequest, Provisioner};
pub use requirements::{collect, CollectOptions, IgnoreSet, RequirementEntry, RequirementError};
