//! External command execution.
//!
//! Every command carries its own working directory; nothing here changes
//! the process-wide current directory. [`CommandRunner`] is the seam the
//! installer and compiler run through, so tests can record commands
//! instead of spawning them.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A program invocation bound to a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    label: String,
}

impl ShellCommand {
    pub fn new(program: &str, cwd: &Path) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            label: program.to_string(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        self.label.push(' ');
        self.label.push_str(&arg);
        self.args.push(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// A command line handed to the platform shell.
    pub fn shell(line: &str, cwd: &Path) -> Self {
        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            program: shell.to_string(),
            args: vec![flag.to_string(), line.to_string()],
            cwd: cwd.to_path_buf(),
            label: line.to_string(),
        }
    }

    /// Human-readable form: the shell line, or program and arguments.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {})", self.label, self.cwd.display())
    }
}

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandStatus {
    pub const SUCCESS: CommandStatus = CommandStatus { code: Some(0) };

    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

pub trait CommandRunner {
    /// Run to completion. `Err` only when the program could not be started.
    fn run(&self, command: &ShellCommand) -> Result<CommandStatus>;

    /// Run and log a warning on a non-zero exit instead of failing.
    fn run_lenient(&self, command: &ShellCommand) -> Result<CommandStatus> {
        let status = self.run(command)?;
        if !status.success() {
            tracing::warn!(command = %command, %status, "command failed, continuing");
        }
        Ok(status)
    }
}

/// Spawns real processes with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ShellCommand) -> Result<CommandStatus> {
        tracing::info!(command = %command, "running");
        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .status()
            .with_context(|| format!("Failed to execute '{}'", command.label()))?;
        Ok(CommandStatus {
            code: status.code(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    type Hook = Box<dyn Fn(&ShellCommand) -> CommandStatus>;

    /// Records every command; `respond` decides the outcome and may
    /// fake side effects such as a clone creating a directory.
    pub struct RecordingRunner {
        pub commands: RefCell<Vec<ShellCommand>>,
        respond: Hook,
    }

    impl RecordingRunner {
        pub fn succeeding() -> Self {
            Self::with(|_| CommandStatus::SUCCESS)
        }

        pub fn with(respond: impl Fn(&ShellCommand) -> CommandStatus + 'static) -> Self {
            Self {
                commands: RefCell::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        pub fn labels(&self) -> Vec<String> {
            self.commands
                .borrow()
                .iter()
                .map(|c| c.label().to_string())
                .collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, command: &ShellCommand) -> Result<CommandStatus> {
            self.commands.borrow_mut().push(command.clone());
            Ok((self.respond)(command))
        }
    }
}
