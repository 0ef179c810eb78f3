//! Evaluation context for predicates.
//!
//! Holds the target Odoo version plus the environment-marker facts of the
//! interpreter the environment is being built for.

use serde::{Deserialize, Serialize};

/// Variables a predicate may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    OdooVersion,
    PythonVersion,
    PythonFullVersion,
    SysPlatform,
    PlatformSystem,
    PlatformMachine,
    PlatformRelease,
    PlatformVersion,
    PlatformPythonImplementation,
    ImplementationName,
    ImplementationVersion,
    OsName,
    Extra,
}

impl Variable {
    pub fn from_name(name: &str) -> Option<Self> {
        let var = match name {
            "odoo_version" => Variable::OdooVersion,
            "python_version" => Variable::PythonVersion,
            "python_full_version" => Variable::PythonFullVersion,
            "sys_platform" => Variable::SysPlatform,
            "platform_system" => Variable::PlatformSystem,
            "platform_machine" => Variable::PlatformMachine,
            "platform_release" => Variable::PlatformRelease,
            "platform_version" => Variable::PlatformVersion,
            "platform_python_implementation" => Variable::PlatformPythonImplementation,
            "implementation_name" => Variable::ImplementationName,
            "implementation_version" => Variable::ImplementationVersion,
            "os_name" => Variable::OsName,
            "extra" => Variable::Extra,
            _ => return None,
        };
        Some(var)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variable::OdooVersion => "odoo_version",
            Variable::PythonVersion => "python_version",
            Variable::PythonFullVersion => "python_full_version",
            Variable::SysPlatform => "sys_platform",
            Variable::PlatformSystem => "platform_system",
            Variable::PlatformMachine => "platform_machine",
            Variable::PlatformRelease => "platform_release",
            Variable::PlatformVersion => "platform_version",
            Variable::PlatformPythonImplementation => "platform_python_implementation",
            Variable::ImplementationName => "implementation_name",
            Variable::ImplementationVersion => "implementation_version",
            Variable::OsName => "os_name",
            Variable::Extra => "extra",
        }
    }
}

/// Facts a predicate is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerContext {
    pub odoo_version: String,
    /// Major.minor, e.g. "3.10"
    pub python_version: String,
    pub python_full_version: String,
    pub sys_platform: String,
    pub platform_system: String,
    pub platform_machine: String,
    #[serde(default)]
    pub platform_release: String,
    #[serde(default)]
    pub platform_version: String,
    pub platform_python_implementation: String,
    pub implementation_name: String,
    pub implementation_version: String,
    pub os_name: String,
    /// Extra being installed; empty for a plain requirements list
    #[serde(default)]
    pub extra: String,
}

impl MarkerContext {
    /// Context for the machine we are running on, targeting the given Odoo
    /// and Python versions.
    ///
    /// `python_version` may be "3.10" or a full "3.10.12"; `python_version`
    /// keeps only major.minor while `python_full_version` keeps what was given.
    pub fn host(odoo_version: &str, python_version: &str) -> Self {
        let (sys_platform, platform_system, os_name) = match std::env::consts::OS {
            "macos" => ("darwin", "Darwin", "posix"),
            "windows" => ("win32", "Windows", "nt"),
            "linux" => ("linux", "Linux", "posix"),
            other => (other, other, "posix"),
        };
        let machine = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => "arm64",
            (_, arch) => arch,
        };

        Self {
            odoo_version: odoo_version.to_string(),
            python_version: major_minor(python_version),
            python_full_version: python_version.to_string(),
            sys_platform: sys_platform.to_string(),
            platform_system: platform_system.to_string(),
            platform_machine: machine.to_string(),
            platform_release: String::new(),
            platform_version: String::new(),
            platform_python_implementation: "CPython".to_string(),
            implementation_name: "cpython".to_string(),
            implementation_version: python_version.to_string(),
            os_name: os_name.to_string(),
            extra: String::new(),
        }
    }

    /// Look up the value of a variable.
    pub fn get(&self, var: Variable) -> &str {
        match var {
            Variable::OdooVersion => &self.odoo_version,
            Variable::PythonVersion => &self.python_version,
            Variable::PythonFullVersion => &self.python_full_version,
            Variable::SysPlatform => &self.sys_platform,
            Variable::PlatformSystem => &self.platform_system,
            Variable::PlatformMachine => &self.platform_machine,
            Variable::PlatformRelease => &self.platform_release,
            Variable::PlatformVersion => &self.platform_version,
            Variable::PlatformPythonImplementation => &self.platform_python_implementation,
            Variable::ImplementationName => &self.implementation_name,
            Variable::ImplementationVersion => &self.implementation_version,
            Variable::OsName => &self.os_name,
            Variable::Extra => &self.extra,
        }
    }
}

fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}
