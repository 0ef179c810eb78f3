//! Lifecycle commands
//!
//! Extra commands run synchronously, one stage at a time, in declaration
//! order. The first failing command stops the stage and is reported to the
//! caller; nothing is retried.

mod runner;

pub use runner::{CommandInvocation, CommandRunner, ShellRunner};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use odoo_venv_marker::MarkerContext;

use crate::config::{ExtraCommand, Stage};

/// Error types for lifecycle commands
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Extra command '{name}' ({stage}) failed with exit code {exit_code}")]
    Failed {
        name: String,
        stage: Stage,
        exit_code: i32,
    },

    #[error("Extra command '{name}' ({stage}) could not be started: {source}")]
    Spawn {
        name: String,
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn command_name(&self) -> &str {
        match self {
            CommandError::Failed { name, .. } | CommandError::Spawn { name, .. } => name,
        }
    }
}

/// What a stage runs against
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Predicate evaluation facts
    pub marker: MarkerContext,
    pub venv_dir: PathBuf,
    /// Log commands instead of running them
    pub dry_run: bool,
}

impl StageContext {
    pub fn new(marker: MarkerContext, venv_dir: &Path) -> Self {
        Self {
            marker,
            venv_dir: venv_dir.to_path_buf(),
            dry_run: false,
        }
    }

    pub fn venv_bin(&self) -> PathBuf {
        self.venv_dir.join("bin")
    }

    pub fn venv_python(&self) -> PathBuf {
        self.venv_bin().join("python")
    }

    /// Variables injected into every command of `stage`.
    pub fn injected_env(&self, stage: Stage) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("ODOO_VERSION".to_string(), self.marker.odoo_version.clone());
        env.insert("ODOO_VENV_STAGE".to_string(), stage.to_string());
        env.insert("VIRTUAL_ENV".to_string(), self.venv_dir.display().to_string());
        env.insert("ODOO_VENV_PYTHON".to_string(), self.venv_python().display().to_string());

        let bin = self.venv_bin().display().to_string();
        let path = match std::env::var("PATH") {
            Ok(current) if !current.is_empty() => format!("{}:{}", bin, current),
            _ => bin,
        };
        env.insert("PATH".to_string(), path);
        env
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Commands that ran (or would have, in dry-run mode)
    pub ran: Vec<String>,
    /// Commands whose `when` clause was false
    pub skipped: Vec<String>,
}

/// Run every command attached to `stage`, in order.
///
/// Commands of other stages are ignored, so the full merged list may be
/// passed in.
pub fn run_stage<'a, I>(
    stage: Stage,
    commands: I,
    ctx: &StageContext,
    runner: &dyn CommandRunner,
) -> Result<StageReport, CommandError>
where
    I: IntoIterator<Item = &'a ExtraCommand>,
{
    let mut report = StageReport::default();

    for command in commands.into_iter().filter(|c| c.stage == stage) {
        if !command.when.evaluate(&ctx.marker) {
            tracing::info!(
                "Skipping {} command '{}': condition '{}' is false",
                stage,
                command.name,
                command.when
            );
            report.skipped.push(command.name.clone());
            continue;
        }

        let mut env = ctx.injected_env(stage);
        env.extend(command.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let invocation = CommandInvocation {
            name: command.name.clone(),
            command: command.command.clone(),
            env,
        };

        if ctx.dry_run {
            tracing::info!("[dry-run] {} command '{}': {}", stage, command.name, command.command);
            report.ran.push(command.name.clone());
            continue;
        }

        tracing::info!("Running {} command '{}' (from {})", stage, command.name, command.origin);
        tracing::debug!("{}", command.command);

        let exit_code = runner.run(&invocation).map_err(|source| CommandError::Spawn {
            name: command.name.clone(),
            stage,
            source,
        })?;

        if exit_code != 0 {
            return Err(CommandError::Failed {
                name: command.name.clone(),
                stage,
                exit_code,
            });
        }
        report.ran.push(command.name.clone());
    }

    Ok(report)
}
