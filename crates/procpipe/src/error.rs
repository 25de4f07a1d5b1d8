//! Error taxonomy shared by every fallible operation in the crate.

use std::fmt;
use std::io;

/// Classification of a failure.
///
/// Domain-level failures (validation, timeout) carry no OS error; syscall
/// failures carry the captured `errno` as their [`Error::source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The command has no argv entries.
    EmptyArgv,
    /// Stdio selection is inconsistent with the stream it is attached to.
    InvalidStdio,
    /// The pipeline has no stages or its handle was misused.
    InvalidPipeline,
    /// Pipe creation or configuration failed.
    PipeFailed,
    /// Process creation failed.
    SpawnFailed,
    /// A wait operation failed.
    WaitFailed,
    /// A read from a pipe failed.
    ReadFailed,
    /// A write to a pipe failed.
    WriteFailed,
    /// Opening a redirection file failed.
    OpenFailed,
    /// Closing a descriptor failed.
    CloseFailed,
    /// Duplicating a descriptor failed.
    DupFailed,
    /// Changing the working directory failed.
    ChdirFailed,
    /// Delivering a signal failed.
    KillFailed,
    /// The child did not finish within the requested timeout.
    Timeout,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EmptyArgv => "empty argv",
            ErrorKind::InvalidStdio => "invalid stdio configuration",
            ErrorKind::InvalidPipeline => "invalid pipeline",
            ErrorKind::PipeFailed => "pipe creation failed",
            ErrorKind::SpawnFailed => "spawn failed",
            ErrorKind::WaitFailed => "wait failed",
            ErrorKind::ReadFailed => "read failed",
            ErrorKind::WriteFailed => "write failed",
            ErrorKind::OpenFailed => "open failed",
            ErrorKind::CloseFailed => "close failed",
            ErrorKind::DupFailed => "dup failed",
            ErrorKind::ChdirFailed => "chdir failed",
            ErrorKind::KillFailed => "kill failed",
            ErrorKind::Timeout => "timed out",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every fallible procpipe operation.
///
/// Carries the [`ErrorKind`], a short static context naming the operation
/// that failed, and the underlying OS error when one exists.
#[derive(Debug, thiserror::Error)]
#[error("{kind} ({context})")]
pub struct Error {
    kind: ErrorKind,
    context: &'static str,
    #[source]
    source: Option<io::Error>,
}

impl Error {
    /// Domain-level error with no OS cause.
    pub(crate) fn new(kind: ErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: None,
        }
    }

    /// Capture the calling thread's current `errno` as the cause.
    pub(crate) fn last_os(kind: ErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: Some(io::Error::last_os_error()),
        }
    }

    /// Wrap an explicit errno value, e.g. one received over the error pipe
    /// or returned by `posix_spawn`.
    pub(crate) fn from_raw_os(kind: ErrorKind, errno: i32, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: Some(io::Error::from_raw_os_error(errno)),
        }
    }

    /// Wrap an arbitrary `io::Error` as the cause.
    pub(crate) fn from_io(kind: ErrorKind, context: &'static str, source: io::Error) -> Self {
        Self {
            kind,
            context,
            source: Some(source),
        }
    }

    /// The failure classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Short name of the operation that failed.
    pub fn context(&self) -> &'static str {
        self.context
    }

    /// The underlying OS errno, if this error was caused by a syscall.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.as_ref().and_then(io::Error::raw_os_error)
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
