//! Owning byte-stream endpoints around pipe descriptors.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::error::{Error, ErrorKind, Result};

const READ_CHUNK: usize = 8192;

/// The reading end of a pipe, typically a child's stdout or stderr.
///
/// Dropping the reader closes the descriptor. The endpoint is move-only;
/// there is never more than one owner of the underlying fd.
#[derive(Debug)]
pub struct PipeReader {
    fd: Option<OwnedFd>,
}

impl PipeReader {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Close the endpoint now instead of at drop.
    pub fn close(&mut self) {
        self.fd = None;
    }

    /// Read up to `buf.len()` bytes, retrying on `EINTR`.
    ///
    /// Returns the number of bytes read; zero means end of stream.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = match &self.fd {
            Some(fd) => fd.as_raw_fd(),
            None => return Err(Error::new(ErrorKind::InvalidStdio, "read on closed pipe")),
        };
        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::from_io(ErrorKind::ReadFailed, "read", err));
        }
    }

    /// Read until end of stream, appending everything to one buffer.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = self.read_some(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

/// The writing end of a pipe, typically a child's stdin.
#[derive(Debug)]
pub struct PipeWriter {
    fd: Option<OwnedFd>,
}

impl PipeWriter {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }

    /// Close the endpoint now instead of at drop.
    ///
    /// Closing a child's stdin writer is how the child observes end of input.
    pub fn close(&mut self) {
        self.fd = None;
    }

    /// Write up to `buf.len()` bytes, retrying on `EINTR`.
    pub fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = match &self.fd {
            Some(fd) => fd.as_raw_fd(),
            None => return Err(Error::new(ErrorKind::InvalidStdio, "write on closed pipe")),
        };
        loop {
            let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::from_io(ErrorKind::WriteFailed, "write", err));
        }
    }

    /// Write the whole buffer, looping over short writes.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write_some(buf)?;
            if n == 0 {
                return Err(Error::new(ErrorKind::WriteFailed, "zero-length write"));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}
