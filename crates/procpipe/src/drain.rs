//! Concurrent drain of a child's stdout and stderr.
//!
//! Reading the two parent-side pipe ends one after the other can deadlock:
//! while the parent blocks on stdout the child can fill the stderr pipe and
//! stall, and vice versa. Both ends are therefore switched to non-blocking
//! mode and multiplexed through a single `poll` loop, so neither stream can
//! starve the other regardless of payload size.

use std::io;
use std::os::fd::RawFd;

use crate::error::{Error, ErrorKind, Result};
use crate::fd::set_nonblocking;
use crate::pipe::PipeReader;

const BUFFER_SIZE: usize = 8192;

/// Bytes collected from the two streams.
#[derive(Debug, Default)]
pub(crate) struct DrainOutput {
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

struct Target<'a> {
    pipe: &'a mut PipeReader,
    out: Vec<u8>,
    done: bool,
}

/// Drain non-blocking reads from `fd` until `EAGAIN` or end of stream.
/// Returns true once the stream is finished.
fn drain_ready(fd: RawFd, out: &mut Vec<u8>) -> Result<bool> {
    let mut buffer = [0u8; BUFFER_SIZE];
    loop {
        let count = unsafe { libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len()) };
        if count > 0 {
            out.extend_from_slice(&buffer[..count as usize]);
            continue;
        }
        if count == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) => return Ok(false),
            #[allow(unreachable_patterns)] // EWOULDBLOCK aliases EAGAIN on most targets
            Some(libc::EWOULDBLOCK) => return Ok(false),
            _ => return Err(Error::from_io(ErrorKind::ReadFailed, "read", err)),
        }
    }
}

/// Read both streams to completion without blocking on either.
///
/// Either reader may be absent; a reader that is already closed counts as
/// finished. Pipes are closed as their streams end.
pub(crate) fn drain_pipes(
    stdout: Option<&mut PipeReader>,
    stderr: Option<&mut PipeReader>,
) -> Result<DrainOutput> {
    let mut targets: [Option<Target>; 2] = [
        stdout.map(|pipe| Target {
            pipe,
            out: Vec::new(),
            done: false,
        }),
        stderr.map(|pipe| Target {
            pipe,
            out: Vec::new(),
            done: false,
        }),
    ];

    let mut active = 0;
    for target in targets.iter_mut().flatten() {
        match target.pipe.raw_fd() {
            Some(fd) => {
                set_nonblocking(fd)?;
                active += 1;
            }
            None => target.done = true,
        }
    }

    while active > 0 {
        let mut pollfds: [libc::pollfd; 2] = [libc::pollfd {
            fd: -1,
            events: 0,
            revents: 0,
        }; 2];
        // Index into `targets` for each populated pollfd slot.
        let mut slots: [usize; 2] = [0; 2];
        let mut count = 0;
        for (index, target) in targets.iter().enumerate() {
            let target = match target {
                Some(target) if !target.done => target,
                _ => continue,
            };
            if let Some(fd) = target.pipe.raw_fd() {
                pollfds[count] = libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                slots[count] = index;
                count += 1;
            }
        }

        let rv = unsafe { libc::poll(pollfds.as_mut_ptr(), count as libc::nfds_t, -1) };
        if rv == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::from_io(ErrorKind::ReadFailed, "poll", err));
        }

        for slot in 0..count {
            let revents = pollfds[slot].revents;
            if revents & (libc::POLLIN | libc::POLLHUP) == 0 {
                continue;
            }
            let target = match &mut targets[slots[slot]] {
                Some(target) => target,
                None => continue,
            };
            if drain_ready(pollfds[slot].fd, &mut target.out)? {
                target.pipe.close();
                target.done = true;
                active -= 1;
            }
        }
    }

    let mut output = DrainOutput::default();
    let [stdout_target, stderr_target] = targets;
    if let Some(target) = stdout_target {
        output.stdout = target.out;
    }
    if let Some(target) = stderr_target {
        output.stderr = target.out;
    }
    Ok(output)
}
