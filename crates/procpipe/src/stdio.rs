//! Stdio selection for a child's standard streams.

use std::os::fd::RawFd;
use std::path::PathBuf;

/// POSIX file permission bits applied when a redirection file is created.
pub type FilePerms = libc::mode_t;

/// File open modes for stdio redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only.
    Read,
    /// Write-only; create and truncate.
    WriteTruncate,
    /// Write-only; create and append.
    WriteAppend,
    /// Read/write; create if missing.
    ReadWrite,
}

/// File redirection for a stdio stream.
///
/// When `mode` is absent the stream direction picks the default: [`OpenMode::Read`]
/// for stdin, [`OpenMode::WriteTruncate`] for stdout and stderr.
#[derive(Debug, Clone)]
pub struct FileSpec {
    /// Path to the file.
    pub path: PathBuf,
    /// Optional open mode.
    pub mode: Option<OpenMode>,
    /// Optional permission bits for newly created files.
    pub perms: Option<FilePerms>,
}

impl FileSpec {
    /// File redirection at `path` with direction-based defaults.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: None,
            perms: None,
        }
    }

    /// Set the open mode.
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the permission bits used when the file is created.
    pub fn perms(mut self, perms: FilePerms) -> Self {
        self.perms = Some(perms);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) enum StdioInner {
    Inherit,
    Null,
    Piped,
    Fd(RawFd),
    File(FileSpec),
}

/// Describes what a child's stdin, stdout, or stderr is attached to.
///
/// # Examples
///
/// ```no_run
/// use procpipe::{Command, Stdio};
///
/// # fn main() -> procpipe::Result<()> {
/// let mut child = Command::new("cat")
///     .stdin(Stdio::piped())
///     .stdout(Stdio::piped())
///     .spawn()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Stdio(pub(crate) StdioInner);

impl Stdio {
    /// Inherit the parent's stream.
    pub fn inherit() -> Self {
        Stdio(StdioInner::Inherit)
    }

    /// Attach to `/dev/null`.
    pub fn null() -> Self {
        Stdio(StdioInner::Null)
    }

    /// Create a pipe and expose the parent end on the child handle.
    pub fn piped() -> Self {
        Stdio(StdioInner::Piped)
    }

    /// Duplicate an existing descriptor into place.
    ///
    /// The descriptor is borrowed, not owned; the caller keeps it open until
    /// the child has been spawned.
    pub fn fd(fd: RawFd) -> Self {
        Stdio(StdioInner::Fd(fd))
    }

    /// Redirect to a file with direction-based open-mode defaults.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Stdio(StdioInner::File(FileSpec::new(path)))
    }
}

impl From<FileSpec> for Stdio {
    fn from(spec: FileSpec) -> Self {
        Stdio(StdioInner::File(spec))
    }
}
