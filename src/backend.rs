//! Environment backends
//!
//! A backend creates the virtual environment and installs packages into it.
//! The pipeline only talks to the `Backend` trait; `UvBackend` drives `uv`.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Error types for backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{step} failed to start '{program}': {source}")]
    Spawn {
        step: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed with exit code {exit_code}: {stderr}")]
    Failed {
        step: &'static str,
        exit_code: i32,
        stderr: String,
    },
}

/// Creates environments and installs packages
pub trait Backend {
    /// Create the virtual environment at `venv_dir` with `python_version`.
    fn create_venv(&self, venv_dir: &Path, python_version: &str) -> Result<(), BackendError>;

    /// Install every line of `requirements_file` into the environment.
    fn install_requirements(&self, venv_dir: &Path, requirements_file: &Path) -> Result<(), BackendError>;

    /// Install the Odoo checkout at `odoo_dir` in editable mode.
    fn install_odoo(&self, venv_dir: &Path, odoo_dir: &Path) -> Result<(), BackendError>;
}

/// Backend driving the `uv` executable
#[derive(Debug, Clone)]
pub struct UvBackend {
    /// `uv` executable (looked up in PATH by default)
    pub program: PathBuf,
    /// Log commands instead of running them
    pub dry_run: bool,
}

impl Default for UvBackend {
    fn default() -> Self {
        Self {
            program: PathBuf::from("uv"),
            dry_run: false,
        }
    }
}

impl UvBackend {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Arguments for `uv venv`.
    pub fn venv_args(venv_dir: &Path, python_version: &str) -> Vec<String> {
        vec![
            "venv".to_string(),
            venv_dir.display().to_string(),
            "--python".to_string(),
            python_version.to_string(),
        ]
    }

    /// Arguments for installing a requirements file.
    pub fn requirements_args(requirements_file: &Path) -> Vec<String> {
        vec![
            "pip".to_string(),
            "install".to_string(),
            "-r".to_string(),
            requirements_file.display().to_string(),
        ]
    }

    /// Arguments for the editable Odoo install.
    pub fn odoo_args(odoo_dir: &Path) -> Vec<String> {
        vec![
            "pip".to_string(),
            "install".to_string(),
            "-e".to_string(),
            format!("file://{}#egg=odoo", odoo_dir.display()),
        ]
    }

    fn run(&self, step: &'static str, args: &[String], venv_dir: Option<&Path>) -> Result<(), BackendError> {
        let program = self.program.display().to_string();
        tracing::debug!("Running: {} {}", program, args.join(" "));
        if self.dry_run {
            tracing::info!("[dry-run] {} {}", program, args.join(" "));
            return Ok(());
        }

        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some(venv_dir) = venv_dir {
            let bin = venv_dir.join("bin");
            let path = match std::env::var("PATH") {
                Ok(current) if !current.is_empty() => format!("{}:{}", bin.display(), current),
                _ => bin.display().to_string(),
            };
            command.env("VIRTUAL_ENV", venv_dir).env("PATH", path);
        }

        let output = command.output().map_err(|source| BackendError::Spawn {
            step,
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BackendError::Failed {
                step,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Backend for UvBackend {
    fn create_venv(&self, venv_dir: &Path, python_version: &str) -> Result<(), BackendError> {
        self.run("venv creation", &Self::venv_args(venv_dir, python_version), None)
    }

    fn install_requirements(&self, venv_dir: &Path, requirements_file: &Path) -> Result<(), BackendError> {
        self.run(
            "requirements install",
            &Self::requirements_args(requirements_file),
            Some(venv_dir),
        )
    }

    fn install_odoo(&self, venv_dir: &Path, odoo_dir: &Path) -> Result<(), BackendError> {
        self.run("odoo install", &Self::odoo_args(odoo_dir), Some(venv_dir))
    }
}
