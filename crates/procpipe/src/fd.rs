//! Descriptor plumbing shared by the backend and the drainer.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{Error, ErrorKind, Result};

const FALLBACK_MAX_FD: i64 = 256;

/// Create an anonymous pipe with both ends close-on-exec.
pub(crate) fn create_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as RawFd; 2];

    #[cfg(target_os = "linux")]
    {
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } == -1 {
            return Err(Error::last_os(ErrorKind::PipeFailed, "pipe2"));
        }
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        Ok((read, write))
    }

    #[cfg(not(target_os = "linux"))]
    {
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(Error::last_os(ErrorKind::PipeFailed, "pipe"));
        }
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        set_cloexec(read.as_raw_fd())?;
        set_cloexec(write.as_raw_fd())?;
        Ok((read, write))
    }
}

/// Set the close-on-exec flag.
pub(crate) fn set_cloexec(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(Error::last_os(ErrorKind::PipeFailed, "fcntl(F_GETFD)"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } == -1 {
        return Err(Error::last_os(ErrorKind::PipeFailed, "fcntl(F_SETFD)"));
    }
    Ok(())
}

/// Switch a descriptor to non-blocking mode.
pub(crate) fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(Error::last_os(ErrorKind::PipeFailed, "fcntl(F_GETFL)"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(Error::last_os(ErrorKind::PipeFailed, "fcntl(F_SETFL)"));
    }
    Ok(())
}

/// Upper bound on the descriptor table, as seen by the calling process.
pub(crate) fn max_open_fds() -> i64 {
    let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if limit < 0 {
        FALLBACK_MAX_FD
    } else {
        limit
    }
}

fn fd_is_open(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}

/// Enumerate the currently open descriptors, sorted ascending.
///
/// On Linux this reads `/proc/self/fd`; the scan itself opens a directory
/// descriptor, so the collected set is re-validated once the scan handle has
/// been dropped. Elsewhere every slot up to `sysconf(_SC_OPEN_MAX)` is probed
/// with `fcntl`.
pub(crate) fn list_open_fds() -> Vec<RawFd> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
            let mut fds: Vec<RawFd> = entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
                .collect();
            // The read_dir handle is gone now; drop the slot it occupied.
            fds.retain(|&fd| fd_is_open(fd));
            fds.sort_unstable();
            return fds;
        }
    }

    let limit = max_open_fds();
    let mut fds = Vec::new();
    for fd in 0..limit as RawFd {
        if fd_is_open(fd) {
            fds.push(fd);
        }
    }
    fds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_ends_are_cloexec() {
        let (read, write) = create_pipe().expect("pipe");
        for fd in [read.as_raw_fd(), write.as_raw_fd()] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(flags >= 0);
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn nonblocking_flag_sticks() {
        let (read, _write) = create_pipe().expect("pipe");
        set_nonblocking(read.as_raw_fd()).expect("nonblocking");
        let flags = unsafe { libc::fcntl(read.as_raw_fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn open_fd_listing_contains_stdio_and_new_pipe() {
        let (read, write) = create_pipe().expect("pipe");
        let fds = list_open_fds();
        assert!(fds.contains(&0));
        assert!(fds.contains(&read.as_raw_fd()));
        assert!(fds.contains(&write.as_raw_fd()));
        let closed = read.as_raw_fd();
        drop(read);
        drop(write);
        assert!(!list_open_fds().contains(&closed));
    }

    #[test]
    fn max_open_fds_is_positive() {
        assert!(max_open_fds() > 0);
    }
}
