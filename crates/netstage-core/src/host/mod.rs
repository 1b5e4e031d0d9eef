//! Host command execution
//!
//! Every mutation and probe of live network state goes through a
//! `CommandRunner`. Production uses `SystemRunner`; tests and dry runs use
//! `SimulatedHost`, which models links, routes and INPUT rules in memory.

pub mod commands;
pub mod introspect;
pub mod simulated;
pub mod system;

use crate::errors::{NetStageError, Result};
use std::fmt;

pub use simulated::SimulatedHost;
pub use system::SystemRunner;

/// One external command with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether running the command changes host state
    ///
    /// `ip` object queries (`show`, `list`, bare object) and `iptables -L/-S`
    /// are read-only; everything else is treated as a mutation.
    pub fn is_mutating(&self) -> bool {
        match self.program.as_str() {
            "ip" => {
                let mut words = self.args.iter().filter(|a| !a.starts_with('-'));
                let _object = words.next();
                !matches!(
                    words.next().map(String::as_str),
                    None | Some("show" | "list" | "ls" | "get")
                )
            }
            "iptables" => !self
                .args
                .iter()
                .any(|a| matches!(a.as_str(), "-L" | "-S" | "--list" | "--list-rules")),
            _ => true,
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external commands against the host network stack
pub trait CommandRunner {
    /// Run a command to completion
    ///
    /// # Errors
    ///
    /// Returns `HostCommandSpawn` only when the command could not be started.
    /// A non-zero exit is reported through `CommandOutput::status`.
    fn run(&self, command: &HostCommand) -> Result<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        (**self).run(command)
    }
}

/// Run a command and return its stdout, failing on non-zero exit
///
/// # Errors
///
/// Returns `HostCommandFailed` carrying stderr when the command exits non-zero.
pub fn run_checked(runner: &dyn CommandRunner, command: &HostCommand) -> Result<String> {
    tracing::debug!(command = %command, "running host command");
    let output = runner.run(command)?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(NetStageError::HostCommandFailed {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }
}
