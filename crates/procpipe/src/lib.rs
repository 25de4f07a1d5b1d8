//! Synchronous process execution for Unix.
//!
//! procpipe launches child processes without a shell, wires their standard
//! streams, composes them into pipelines, captures output without
//! deadlocking on pipe back-pressure, and bounds waits with a
//! terminate-then-kill escalation policy. Every entry point returns a
//! [`Result`]; nothing panics on OS failures.
//!
//! # Overview
//!
//! The main types are:
//!
//! - [`Command`]: a builder for configuring and spawning one process
//! - [`Pipeline`]: commands chained with `|` through anonymous pipes
//! - [`Child`] / [`PipelineChild`]: handles to running processes
//! - [`Stdio`]: how a standard stream is wired (inherit, null, pipe, file, fd)
//! - [`ExitStatus`] / [`Output`]: what came back
//!
//! # Examples
//!
//! Capture a command's output:
//!
//! ```no_run
//! use procpipe::Command;
//!
//! # fn main() -> procpipe::Result<()> {
//! let output = Command::new("echo").arg("Hello, world!").output()?;
//! println!("stdout: {}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```
//!
//! Compose a pipeline and aggregate its statuses:
//!
//! ```no_run
//! use procpipe::Command;
//!
//! # fn main() -> procpipe::Result<()> {
//! let status = (Command::new("cat").arg("/etc/hosts") | Command::new("wc").arg("-l"))
//!     .pipefail(true)
//!     .status()?;
//! assert!(status.success());
//! # Ok(())
//! # }
//! ```
//!
//! Bound a wait with graceful escalation:
//!
//! ```no_run
//! use std::time::Duration;
//! use procpipe::{Command, ErrorKind, WaitOptions};
//!
//! # fn main() -> procpipe::Result<()> {
//! let mut child = Command::new("sleep").arg("60").spawn()?;
//! let result = child.wait_with(WaitOptions {
//!     timeout: Some(Duration::from_millis(100)),
//!     kill_grace: Duration::from_millis(200),
//! });
//! assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[cfg(not(unix))]
compile_error!("procpipe only supports Unix platforms");

mod backend;
mod child;
mod clock;
mod command;
mod drain;
mod error;
mod fd;
mod lowering;
mod pipe;
mod pipeline;
mod posix;
mod status;
mod stdio;
mod wait;

pub use child::Child;
pub use command::{Command, SpawnOptions, WaitOptions};
pub use error::{Error, ErrorKind, Result};
pub use pipe::{PipeReader, PipeWriter};
pub use pipeline::{Pipeline, PipelineChild, PipelineStatus};
pub use status::{ExitStatus, Output};
pub use stdio::{FilePerms, FileSpec, OpenMode, Stdio};
