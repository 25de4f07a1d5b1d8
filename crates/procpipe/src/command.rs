//! Command builder for spawning child processes.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::default_backend;
use crate::child::Child;
use crate::drain::drain_pipes;
use crate::error::Result;
use crate::lowering::{lower_command, SpawnMode};
use crate::status::{ExitStatus, Output};
use crate::stdio::Stdio;

/// Options that affect process creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions {
    /// Place the child in a new process group, with the child as leader.
    pub new_process_group: bool,
    /// Redirect the child's stderr into whatever stdout is attached to.
    pub merge_stderr_into_stdout: bool,
}

/// Options for a bounded wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    /// How long to wait before escalating; `None` waits forever.
    pub timeout: Option<Duration>,
    /// How long after a terminate signal to wait before killing.
    pub kill_grace: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            kill_grace: Duration::from_millis(200),
        }
    }
}

/// A builder for launching one child process.
///
/// There is no shell involved: arguments are passed to the program verbatim
/// and nothing is quoted, split, or expanded. The environment is inherited
/// by default; [`env_clear`](Command::env_clear) starts from an empty one.
///
/// # Examples
///
/// ```no_run
/// use procpipe::Command;
///
/// # fn main() -> procpipe::Result<()> {
/// let output = Command::new("echo").arg("hello").output()?;
/// assert!(output.status.success());
/// println!("{}", String::from_utf8_lossy(&output.stdout));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) argv: Vec<OsString>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) inherit_env: bool,
    pub(crate) env_delta: BTreeMap<OsString, Option<OsString>>,
    pub(crate) stdin: Option<Stdio>,
    pub(crate) stdout: Option<Stdio>,
    pub(crate) stderr: Option<Stdio>,
    pub(crate) opts: SpawnOptions,
}

impl Command {
    /// Creates a command running `program`, which becomes `argv[0]`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            argv: vec![program.as_ref().to_os_string()],
            cwd: None,
            inherit_env: true,
            env_delta: BTreeMap::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            opts: SpawnOptions::default(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.argv.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.argv.push(arg.as_ref().to_os_string());
        }
        self
    }

    /// Sets the child's working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets or overrides an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env_delta.insert(
            key.as_ref().to_os_string(),
            Some(value.as_ref().to_os_string()),
        );
        self
    }

    /// Removes an environment variable from the child.
    pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Self {
        self.env_delta.insert(key.as_ref().to_os_string(), None);
        self
    }

    /// Stops inheriting the parent environment; only variables set through
    /// [`env`](Command::env) reach the child.
    pub fn env_clear(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Configures the child's stdin.
    pub fn stdin(mut self, stdio: Stdio) -> Self {
        self.stdin = Some(stdio);
        self
    }

    /// Configures the child's stdout.
    pub fn stdout(mut self, stdio: Stdio) -> Self {
        self.stdout = Some(stdio);
        self
    }

    /// Configures the child's stderr.
    pub fn stderr(mut self, stdio: Stdio) -> Self {
        self.stderr = Some(stdio);
        self
    }

    /// Sets the spawn options.
    pub fn options(mut self, opts: SpawnOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Spawns the child without waiting for it.
    pub fn spawn(&self) -> Result<Child> {
        let spec = lower_command(self, SpawnMode::Spawn, None)?;
        let spawned = default_backend().spawn(&spec)?;
        Ok(Child::from_spawned(spawned))
    }

    /// Spawns the child and waits for its exit status.
    ///
    /// Any pipes the configuration created are drained first so the child
    /// cannot stall on pipe back-pressure while it runs to completion.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut child = self.spawn()?;

        if let Some(mut stdin) = child.take_stdin() {
            stdin.close();
        }

        let mut stdout = child.take_stdout();
        let mut stderr = child.take_stderr();
        if stdout.is_some() || stderr.is_some() {
            drain_pipes(stdout.as_mut(), stderr.as_mut())?;
        }

        child.wait()
    }

    /// Spawns the child, captures stdout and stderr, and waits.
    ///
    /// Streams with no explicit selection default to pipes; the two pipes
    /// are drained concurrently before the wait.
    pub fn output(&self) -> Result<Output> {
        let spec = lower_command(self, SpawnMode::Output, None)?;
        let spawned = default_backend().spawn(&spec)?;
        let mut child = Child::from_spawned(spawned);

        if let Some(mut stdin) = child.take_stdin() {
            stdin.close();
        }

        let mut stdout = child.take_stdout();
        let mut stderr = child.take_stderr();
        let drained = drain_pipes(stdout.as_mut(), stderr.as_mut())?;

        let status = child.wait()?;
        Ok(Output {
            status,
            stdout: drained.stdout,
            stderr: drained.stderr,
        })
    }
}
