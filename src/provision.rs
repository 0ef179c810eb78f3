//! Provisioning pipeline
//!
//! Drives one `create` invocation end to end:
//! - Resolve the Python version
//! - Collect and resolve requirements (before any side effect)
//! - Create the environment, then run `after_venv` commands
//! - Install requirements, then run `after_requirements` commands
//! - Install Odoo, then run `after_odoo_install` commands (both only when
//!   `install_odoo` is set)
//!
//! Any failure aborts the run; later stages are not attempted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use odoo_venv_marker::{DottedVersion, MarkerContext};
use regex_lite::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::backend::{Backend, BackendError};
use crate::config::{python_for_odoo, EffectiveConfig, PresetError, Stage, MIN_SUPPORTED_PYTHON};
use crate::lifecycle::{run_stage, CommandError, CommandRunner, StageContext, StageReport};
use crate::migration::MigrationError;
use crate::requirements::{collect, render, CollectOptions, RequirementEntry, RequirementError};

/// File the resolved requirements are written to, inside the venv.
pub const REQUIREMENTS_FILE_NAME: &str = "odoo-venv-requirements.txt";

/// Provisioning errors
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Preset(#[from] PresetError),

    #[error(transparent)]
    Requirement(#[from] RequirementError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("environment backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("cannot determine a Python version for Odoo {odoo_version}; pass --python-version")]
    UnknownPython { odoo_version: String },

    #[error("Python {version} is not supported (minimum: {minimum})")]
    UnsupportedPython { version: String, minimum: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProvisionError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::Preset(_) | ProvisionError::Migration(MigrationError::Preset(_)) => 2,
            ProvisionError::Migration(_) => 3,
            ProvisionError::Requirement(_) => 4,
            ProvisionError::UnknownPython { .. } | ProvisionError::UnsupportedPython { .. } => 5,
            ProvisionError::Backend(_) => 6,
            ProvisionError::Command(_) => 7,
            ProvisionError::Io(_) => 1,
        }
    }
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// What to provision
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub odoo_version: String,
    pub odoo_dir: PathBuf,
    pub venv_dir: PathBuf,
    /// Explicit `--python-version`, wins over everything else
    pub python_version: Option<String>,
    pub dry_run: bool,
}

/// What a run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisionReport {
    pub python_version: String,
    pub requirements: Vec<RequirementEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements_file: Option<PathBuf>,
    pub odoo_installed: bool,
    /// Commands run per stage, in stage order
    pub commands_run: Vec<(Stage, Vec<String>)>,
    pub commands_skipped: Vec<(Stage, Vec<String>)>,
}

impl ProvisionReport {
    fn record(&mut self, stage: Stage, report: StageReport) {
        self.commands_run.push((stage, report.ran));
        self.commands_skipped.push((stage, report.skipped));
    }
}

/// `MIN_PY_VERSION = (3, 10)` from `<odoo_dir>/odoo/__init__.py`.
pub fn python_from_odoo_source(odoo_dir: &Path) -> Option<String> {
    let contents = fs::read_to_string(odoo_dir.join("odoo").join("__init__.py")).ok()?;
    let re = Regex::new(r"MIN_PY_VERSION\s*=\s*\((\d+),\s*(\d+)").ok()?;
    let caps = re.captures(&contents)?;
    Some(format!("{}.{}", caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Pick the Python version: explicit flag, then preset option, then the
/// built-in table, then what the Odoo sources declare.
pub fn resolve_python_version(
    explicit: Option<&str>,
    config: &EffectiveConfig,
    odoo_version: &str,
    odoo_dir: &Path,
) -> ProvisionResult<String> {
    let version = explicit
        .map(str::to_string)
        .or_else(|| config.python_version.clone())
        .or_else(|| python_for_odoo(odoo_version).map(str::to_string))
        .or_else(|| python_from_odoo_source(odoo_dir))
        .ok_or_else(|| ProvisionError::UnknownPython {
            odoo_version: odoo_version.to_string(),
        })?;

    let unsupported = || ProvisionError::UnsupportedPython {
        version: version.clone(),
        minimum: MIN_SUPPORTED_PYTHON.to_string(),
    };
    let parsed: DottedVersion = version.parse().map_err(|_| unsupported())?;
    let minimum: DottedVersion = MIN_SUPPORTED_PYTHON.parse().map_err(|_| unsupported())?;
    if parsed.truncate(2) < minimum {
        return Err(unsupported());
    }
    Ok(version)
}

/// Runs the provisioning stages against a backend
pub struct Provisioner<'a> {
    backend: &'a dyn Backend,
    runner: &'a dyn CommandRunner,
}

impl<'a> Provisioner<'a> {
    pub fn new(backend: &'a dyn Backend, runner: &'a dyn CommandRunner) -> Self {
        Self { backend, runner }
    }

    /// Provision the environment described by `request` and `config`.
    pub fn run(&self, request: &ProvisionRequest, config: &EffectiveConfig) -> ProvisionResult<ProvisionReport> {
        let python_version = resolve_python_version(
            request.python_version.as_deref(),
            config,
            &request.odoo_version,
            &request.odoo_dir,
        )?;
        tracing::info!("Using Python {}", python_version);

        let marker = MarkerContext::host(&request.odoo_version, &python_version);
        let options = CollectOptions::from_config(&request.odoo_dir, config);
        let requirements = collect(&options, &marker)?;

        let mut stage_ctx = StageContext::new(marker, &request.venv_dir);
        stage_ctx.dry_run = request.dry_run;

        let mut report = ProvisionReport {
            python_version: python_version.clone(),
            requirements,
            ..Default::default()
        };

        tracing::info!("Creating virtual environment at {}", request.venv_dir.display());
        self.backend.create_venv(&request.venv_dir, &python_version)?;
        self.stage(Stage::AfterVenv, config, &stage_ctx, &mut report)?;

        if report.requirements.is_empty() {
            tracing::info!("No requirements to install");
        } else {
            let path = request.venv_dir.join(REQUIREMENTS_FILE_NAME);
            tracing::info!("Installing {} requirement(s)", report.requirements.len());
            for entry in &report.requirements {
                tracing::debug!("  {} ({})", entry.spec, entry.source);
            }
            if !request.dry_run {
                fs::write(&path, render(&report.requirements))?;
            }
            self.backend.install_requirements(&request.venv_dir, &path)?;
            report.requirements_file = Some(path);
        }
        self.stage(Stage::AfterRequirements, config, &stage_ctx, &mut report)?;

        if config.install_odoo {
            tracing::info!("Installing Odoo from {} in editable mode", request.odoo_dir.display());
            self.backend.install_odoo(&request.venv_dir, &request.odoo_dir)?;
            report.odoo_installed = true;
            self.stage(Stage::AfterOdooInstall, config, &stage_ctx, &mut report)?;
        }

        Ok(report)
    }

    fn stage(
        &self,
        stage: Stage,
        config: &EffectiveConfig,
        ctx: &StageContext,
        report: &mut ProvisionReport,
    ) -> ProvisionResult<()> {
        let stage_report = run_stage(stage, &config.extra_commands, ctx, self.runner)?;
        report.record(stage, stage_report);
        Ok(())
    }
}
