//! Process execution for extra commands

use std::collections::BTreeMap;
use std::io;
use std::process::Command;

use crate::config::CommandSpec;

/// A fully resolved command, ready to be spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub command: CommandSpec,
    /// Variables added on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandInvocation {
    /// Program and arguments: `sh -c <string>` for shell commands.
    pub fn argv(&self) -> Vec<String> {
        match &self.command {
            CommandSpec::Shell(script) => vec!["sh".to_string(), "-c".to_string(), script.clone()],
            CommandSpec::Argv(argv) => argv.clone(),
        }
    }
}

/// Runs one command to completion and reports its exit code.
///
/// A process killed by a signal has no exit code; runners report it as -1.
pub trait CommandRunner {
    fn run(&self, invocation: &CommandInvocation) -> io::Result<i32>;
}

/// Spawns real processes, inheriting stdio
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, invocation: &CommandInvocation) -> io::Result<i32> {
        let argv = invocation.argv();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let status = Command::new(program)
            .args(args)
            .envs(&invocation.env)
            .status()?;

        Ok(status.code().unwrap_or(-1))
    }
}
