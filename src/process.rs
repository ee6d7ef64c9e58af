//! External-tool invocation shared by all pipeline stages.
//!
//! Every stage drives its tool through [`Cmd`]: a blocking call with an
//! explicit working directory and an explicit binary path. Nothing is
//! discovered through `PATH` or the process environment.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// How an external tool invocation failed.
///
/// Stages map this into their own taxonomy variant: `Spawn` becomes
/// `ToolNotFound`, `Exit` becomes the stage's `*Failed` variant.
#[derive(Debug)]
pub enum CmdFailure {
    /// The binary could not be spawned at all.
    Spawn { tool: String, source: io::Error },
    /// The tool ran and exited non-zero.
    Exit { tool: String, status: ExitStatus },
}

/// Builder for a single blocking external-tool call.
pub struct Cmd {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    quiet: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            current_dir: None,
            quiet: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().as_os_str().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Discard the tool's stdout and stderr.
    ///
    /// Used for read-only probes whose chatter is not part of the build
    /// output.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// The tool name used in failure reports.
    pub fn tool(&self) -> String {
        self.program.display().to_string()
    }

    /// Run to completion, succeeding only on exit code zero.
    pub fn run(self) -> Result<(), CmdFailure> {
        let tool = self.tool();
        let mut command = self.into_command();
        let status = command
            .status()
            .map_err(|source| CmdFailure::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !status.success() {
            return Err(CmdFailure::Exit { tool, status });
        }
        Ok(())
    }

    /// Run to completion, capturing stdout. Stderr passes through.
    pub fn run_capture(self) -> Result<String, CmdFailure> {
        let tool = self.tool();
        let mut command = self.into_command();
        command.stdout(Stdio::piped());
        let child = command.spawn().map_err(|source| CmdFailure::Spawn {
            tool: tool.clone(),
            source,
        })?;
        let output = child
            .wait_with_output()
            .map_err(|source| CmdFailure::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(CmdFailure::Exit {
                tool,
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn into_command(self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        if self.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        command
    }
}
