//! External command execution.
//!
//! Every tool the migration drives (`ovftool`, `qemu-img`, `qm`, ...) is
//! reached through the [`ToolRunner`] trait so the pipeline can be exercised
//! without a real ESXi or Proxmox host.

use std::ffi::OsString;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::error::{Error, Result};

/// Tools that must be installed before the migration touches anything.
pub const REQUIRED_TOOLS: &[&str] = &["ovftool", "qemu-img", "qm", "virt-customize", "lvcreate", "ssh"];

/// Upper bound on stderr bytes carried into an error message.
const MAX_STDERR_BYTES: u64 = 1024;

/// A program invocation with its arguments.
///
/// Arguments registered through [`ToolCommand::secret_arg`] are replaced by
/// their masked form when the command is displayed or logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    /// Index and display form of every secret argument.
    masked: Vec<(usize, String)>,
}

impl ToolCommand {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            masked: Vec::new(),
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

    /// Append a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Append an argument that carries a secret.
    ///
    /// `arg` is passed to the program unchanged while `shown` stands in for
    /// it whenever the command is displayed.
    pub fn secret_arg(mut self, arg: impl Into<String>, shown: impl Into<String>) -> Self {
        self.masked.push((self.args.len(), shown.into()));
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn shown(&self, index: usize) -> &str {
        self.masked
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, shown)| shown.as_str())
            .unwrap_or(self.args[index].as_str())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for index in 0..self.args.len() {
            let arg = self.shown(index);
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes external tools on behalf of the migration.
pub trait ToolRunner {
    /// Whether `program` can be found on the search path.
    fn is_available(&self, program: &str) -> bool;

    /// Run the command to completion, failing on a non-zero exit status.
    fn run(&mut self, cmd: &ToolCommand) -> Result<()>;

    /// Run the command and capture its standard output.
    fn output(&mut self, cmd: &ToolCommand) -> Result<String>;
}

/// Verify every tool in `tools` is installed, reporting all missing ones at once.
pub fn check_prerequisites(runner: &dyn ToolRunner, tools: &[&str]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|tool| !runner.is_available(tool))
        .map(|tool| tool.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingTools { names: missing })
    }
}

/// [`ToolRunner`] backed by [`std::process::Command`].
///
/// Standard input is inherited so tools such as `ssh` can ask the operator
/// for a password. Standard error is captured and its tail is attached to
/// the error when the tool fails.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(cmd: &ToolCommand) -> Command {
        let mut command = Command::new(cmd.program());
        command.args(cmd.get_args().iter().map(OsString::from));
        command
    }

    fn finish(cmd: &ToolCommand, status: ExitStatus, stderr: std::fs::File) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        let tail = last_utf8_content(stderr);
        let message = if tail.trim().is_empty() {
            status.to_string()
        } else {
            format!("{}\n{}", status, tail.trim_end())
        };
        Err(Error::command(cmd.program(), message))
    }
}

impl ToolRunner for SystemRunner {
    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn run(&mut self, cmd: &ToolCommand) -> Result<()> {
        let stderr = tempfile::tempfile()?;
        let mut command = Self::command(cmd);
        command.stderr(stderr.try_clone()?);
        tracing::debug!("exec: {cmd}");
        let status = command
            .status()
            .map_err(|e| Error::command(cmd.program(), e.to_string()))?;
        Self::finish(cmd, status, stderr)
    }

    fn output(&mut self, cmd: &ToolCommand) -> Result<String> {
        let mut stdout = tempfile::tempfile()?;
        let stderr = tempfile::tempfile()?;
        let mut command = Self::command(cmd);
        command.stdout(stdout.try_clone()?);
        command.stderr(stderr.try_clone()?);
        tracing::debug!("exec: {cmd}");
        let status = command
            .status()
            .map_err(|e| Error::command(cmd.program(), e.to_string()))?;
        Self::finish(cmd, status, stderr)?;

        stdout.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Read at most the last [`MAX_STDERR_BYTES`] of `f` as lossy UTF-8.
fn last_utf8_content(mut f: std::fs::File) -> String {
    let size = f
        .metadata()
        .map(|m| m.len())
        .unwrap_or_else(|e| {
            tracing::warn!("failed to fstat: {e}");
            0
        })
        .min(MAX_STDERR_BYTES);

    let mut buf = Vec::with_capacity(size as usize);
    match f
        .seek(SeekFrom::End(-(size as i64)))
        .and_then(|_| f.read_to_end(&mut buf))
    {
        Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => {
            tracing::warn!("failed seek+read: {e}");
            "<failed to read stderr>".to_string()
        }
    }
}
