//! Portable exit status and captured output.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusKind {
    Exited,
    Other,
}

/// The exit status of a finished process.
///
/// A process either exited normally with a code in `0..=255`, or ended some
/// other way (a signal on Unix). The raw wait status is retained for
/// platform-specific inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    kind: StatusKind,
    code: i32,
    native: u32,
}

impl ExitStatus {
    /// Status for a process that exited normally with `code`.
    pub fn exited(code: i32, native: u32) -> Self {
        Self {
            kind: StatusKind::Exited,
            code,
            native,
        }
    }

    /// Status for a process that ended without a normal exit.
    pub fn other(native: u32) -> Self {
        Self {
            kind: StatusKind::Other,
            code: 0,
            native,
        }
    }

    /// Was termination successful? Signal termination is not considered a
    /// success, and success is defined as a zero exit code.
    pub fn success(&self) -> bool {
        self.kind == StatusKind::Exited && self.code == 0
    }

    /// Returns the exit code of the process, if any.
    ///
    /// Returns `None` if the process was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        match self.kind {
            StatusKind::Exited => Some(self.code),
            StatusKind::Other => None,
        }
    }

    /// The raw OS wait status.
    pub fn native(&self) -> u32 {
        self.native
    }
}

#[cfg(unix)]
impl ExitStatus {
    /// Creates an `ExitStatus` from a raw `waitpid` status value.
    pub fn from_raw(raw: i32) -> Self {
        if libc::WIFEXITED(raw) {
            Self::exited(libc::WEXITSTATUS(raw), raw as u32)
        } else {
            Self::other(raw as u32)
        }
    }

    /// If the process was terminated by a signal, returns that signal.
    pub fn signal(&self) -> Option<i32> {
        let raw = self.native as i32;
        if libc::WIFSIGNALED(raw) {
            Some(libc::WTERMSIG(raw))
        } else {
            None
        }
    }

    /// Returns the underlying raw wait status.
    pub fn into_raw(self) -> i32 {
        self.native as i32
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatusKind::Exited => write!(f, "exit code: {}", self.code),
            StatusKind::Other => {
                #[cfg(unix)]
                if let Some(sig) = self.signal() {
                    return write!(f, "signal: {sig}");
                }
                write!(f, "ended: {:#x}", self.native)
            }
        }
    }
}

/// The output of a finished process.
///
/// Returned by `Command::output` and `Pipeline::output`.
#[derive(Debug)]
pub struct Output {
    /// The exit status of the process.
    pub status: ExitStatus,
    /// The data that the process wrote to stdout.
    pub stdout: Vec<u8>,
    /// The data that the process wrote to stderr.
    pub stderr: Vec<u8>,
}
