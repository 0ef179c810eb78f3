//! Test fixtures shared by the integration tests
//!
//! - Scratch Odoo checkouts with addons and requirement files
//! - A backend and a command runner that record calls instead of running
//!   anything

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use odoo_venv::backend::{Backend, BackendError};
use odoo_venv::lifecycle::{CommandInvocation, CommandRunner};
use tempfile::TempDir;

/// A scratch Odoo checkout: `<root>/odoo` plus `<root>/addons`.
pub struct OdooTree {
    pub root: TempDir,
}

impl OdooTree {
    /// Odoo checkout whose requirements.txt holds `requirements`.
    pub fn new(requirements: &str) -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("odoo/odoo")).unwrap();
        fs::write(root.path().join("odoo/requirements.txt"), requirements).unwrap();
        fs::write(
            root.path().join("odoo/odoo/__init__.py"),
            "MIN_PY_VERSION = (3, 10)\n",
        )
        .unwrap();
        fs::create_dir_all(root.path().join("addons")).unwrap();
        Self { root }
    }

    pub fn odoo_dir(&self) -> PathBuf {
        self.root.path().join("odoo")
    }

    pub fn addons_dir(&self) -> PathBuf {
        self.root.path().join("addons")
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.root.path().join("venv")
    }

    /// Write `<addons>/requirements.txt`.
    pub fn addons_requirements(&self, contents: &str) -> &Self {
        fs::write(self.addons_dir().join("requirements.txt"), contents).unwrap();
        self
    }

    /// Add an addon with the given manifest source.
    pub fn addon(&self, name: &str, manifest: &str) -> &Self {
        let dir = self.addons_dir().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("__manifest__.py"), manifest).unwrap();
        self
    }

    /// Write an arbitrary file below the root and return its path.
    pub fn file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }
}

/// Manifest declaring the given external Python dependencies.
pub fn manifest_with_python_deps(deps: &[&str]) -> String {
    let quoted: Vec<String> = deps.iter().map(|d| format!("'{}'", d)).collect();
    format!(
        "{{\n    'name': 'Test addon',\n    'depends': ['base'],\n    'external_dependencies': {{'python': [{}]}},\n}}\n",
        quoted.join(", ")
    )
}

/// One observable side effect of a provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CreateVenv { python_version: String },
    InstallRequirements { contents: String },
    InstallOdoo,
    Command { name: String },
}

/// Records every backend call and command, in order.
#[derive(Default)]
pub struct Recorder {
    pub events: RefCell<Vec<Event>>,
    /// Command name -> exit code; unlisted commands succeed
    pub exit_codes: Vec<(String, i32)>,
    pub invocations: RefCell<Vec<CommandInvocation>>,
}

impl Recorder {
    pub fn failing(name: &str, exit_code: i32) -> Self {
        Self {
            exit_codes: vec![(name.to_string(), exit_code)],
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Command { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Backend for Recorder {
    fn create_venv(&self, venv_dir: &Path, python_version: &str) -> Result<(), BackendError> {
        fs::create_dir_all(venv_dir).unwrap();
        self.events.borrow_mut().push(Event::CreateVenv {
            python_version: python_version.to_string(),
        });
        Ok(())
    }

    fn install_requirements(&self, _venv_dir: &Path, requirements_file: &Path) -> Result<(), BackendError> {
        let contents = fs::read_to_string(requirements_file).unwrap_or_default();
        self.events
            .borrow_mut()
            .push(Event::InstallRequirements { contents });
        Ok(())
    }

    fn install_odoo(&self, _venv_dir: &Path, _odoo_dir: &Path) -> Result<(), BackendError> {
        self.events.borrow_mut().push(Event::InstallOdoo);
        Ok(())
    }
}

impl CommandRunner for Recorder {
    fn run(&self, invocation: &CommandInvocation) -> io::Result<i32> {
        self.events.borrow_mut().push(Event::Command {
            name: invocation.name.clone(),
        });
        self.invocations.borrow_mut().push(invocation.clone());
        Ok(self
            .exit_codes
            .iter()
            .find(|(name, _)| *name == invocation.name)
            .map(|(_, code)| *code)
            .unwrap_or(0))
    }
}
