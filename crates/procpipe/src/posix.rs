//! POSIX spawn backend.
//!
//! Two strategies realize a [`SpawnSpec`]: a `posix_spawnp` fast path that
//! expresses the whole setup as file actions and spawn attributes, and a
//! fork/exec fallback for specs the fast path cannot express on the current
//! platform. The fallback confines the child to async-signal-safe work
//! between `fork` and `execve`; everything that allocates (path resolution,
//! argv/envp marshalling, file opens) happens in the parent beforehand, and
//! child-side failures travel back over a close-on-exec error pipe.

use std::collections::HashSet;
use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::backend::{Backend, Spawned};
use crate::clock::default_clock;
use crate::error::{Error, ErrorKind, Result};
use crate::fd::{create_pipe, max_open_fds};
#[cfg(not(target_os = "macos"))]
use crate::fd::list_open_fds;
use crate::lowering::{SpawnSpec, StdioSpec};
use crate::status::ExitStatus;
use crate::stdio::{FilePerms, OpenMode};
use crate::wait::{wait_with_timeout, WaitOps};

const EXEC_FAILURE_EXIT_CODE: i32 = 127;
const DEFAULT_FILE_MODE: FilePerms = 0o666;
const DEFAULT_PATH: &[u8] = b"/usr/bin:/bin";

const HAS_SPAWN_CHDIR: bool = cfg!(target_os = "macos");
// POSIX_SPAWN_SETPGROUP is part of base POSIX and present on every target
// this crate builds for.
const HAS_SPAWN_SETPGROUP: bool = true;

/// Which spawn primitive serves a given spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpawnStrategy {
    PosixSpawn,
    ForkExec,
}

/// The fast path cannot change directory without `addchdir_np`, and cannot
/// place the child in a process group without `POSIX_SPAWN_SETPGROUP`.
pub(crate) fn can_use_posix_spawn(spec: &SpawnSpec) -> bool {
    if spec.cwd.is_some() && !HAS_SPAWN_CHDIR {
        return false;
    }
    if (spec.opts.new_process_group || spec.process_group.is_some()) && !HAS_SPAWN_SETPGROUP {
        return false;
    }
    true
}

pub(crate) fn select_spawn_strategy(spec: &SpawnSpec) -> SpawnStrategy {
    if cfg!(feature = "force-fork") {
        return SpawnStrategy::ForkExec;
    }
    if can_use_posix_spawn(spec) {
        SpawnStrategy::PosixSpawn
    } else {
        SpawnStrategy::ForkExec
    }
}

fn nul_error(context: &'static str) -> Error {
    Error::from_io(
        ErrorKind::SpawnFailed,
        context,
        io::Error::from(io::ErrorKind::InvalidInput),
    )
}

fn cstring_from_os(value: &OsStr, context: &'static str) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| nul_error(context))
}

fn cstring_from_path(value: &Path, context: &'static str) -> Result<CString> {
    cstring_from_os(value.as_os_str(), context)
}

fn cstring_vec(values: &[OsString], context: &'static str) -> Result<Vec<CString>> {
    values
        .iter()
        .map(|value| cstring_from_os(value, context))
        .collect()
}

/// Null-terminated pointer array over a `CString` slice. The slice must
/// outlive the returned vector.
fn ptr_vec(values: &[CString]) -> Vec<*mut libc::c_char> {
    let mut ptrs: Vec<*mut libc::c_char> = values
        .iter()
        .map(|value| value.as_ptr() as *mut libc::c_char)
        .collect();
    ptrs.push(std::ptr::null_mut());
    ptrs
}

fn open_flags_for(mode: OpenMode) -> libc::c_int {
    match mode {
        OpenMode::Read => libc::O_RDONLY,
        OpenMode::WriteTruncate => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        OpenMode::WriteAppend => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        OpenMode::ReadWrite => libc::O_RDWR | libc::O_CREAT,
    }
}

fn open_null(read_only: bool) -> Result<OwnedFd> {
    let flags = if read_only { libc::O_RDONLY } else { libc::O_WRONLY } | libc::O_CLOEXEC;
    let fd = unsafe { libc::open(b"/dev/null\0".as_ptr().cast(), flags) };
    if fd == -1 {
        return Err(Error::last_os(ErrorKind::OpenFailed, "open(/dev/null)"));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn open_file(path: &Path, mode: OpenMode, perms: Option<FilePerms>) -> Result<OwnedFd> {
    let path_c = cstring_from_path(path, "open")?;
    let flags = open_flags_for(mode) | libc::O_CLOEXEC;
    let perms = perms.unwrap_or(DEFAULT_FILE_MODE);
    let fd = unsafe { libc::open(path_c.as_ptr(), flags, perms as libc::c_uint) };
    if fd == -1 {
        return Err(Error::last_os(ErrorKind::OpenFailed, "open"));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn find_env_value<'a>(envp: &'a [OsString], key: &[u8]) -> Option<&'a [u8]> {
    envp.iter().find_map(|entry| {
        let bytes = entry.as_bytes();
        bytes
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix(b"="))
    })
}

fn is_executable(path: &Path) -> bool {
    match CString::new(path.as_os_str().as_bytes()) {
        Ok(path_c) => unsafe { libc::access(path_c.as_ptr(), libc::X_OK) == 0 },
        Err(_) => false,
    }
}

/// Resolve argv[0] against `PATH` before fork so the child only needs
/// async-signal-safe syscalls. Relative search directories are interpreted
/// against the child's working directory, not the parent's.
fn resolve_exec_path(argv0: &OsStr, envp: &[OsString], cwd: Option<&Path>) -> OsString {
    if argv0.as_bytes().contains(&b'/') {
        return argv0.to_os_string();
    }

    let path_value: Vec<u8> = find_env_value(envp, b"PATH")
        .map(<[u8]>::to_vec)
        .unwrap_or_else(|| DEFAULT_PATH.to_vec());
    if path_value.is_empty() {
        return argv0.to_os_string();
    }

    for raw_dir in path_value.split(|&byte| byte == b':') {
        let raw_dir: &[u8] = if raw_dir.is_empty() { b"." } else { raw_dir };
        let mut dir = PathBuf::from(OsStr::from_bytes(raw_dir));
        if dir.is_relative() {
            if let Some(cwd) = cwd {
                dir = cwd.join(dir);
            }
        }
        let candidate = dir.join(argv0);
        if is_executable(&candidate) {
            return candidate.into_os_string();
        }
    }

    argv0.to_os_string()
}

fn spawn_error(rc: libc::c_int, context: &'static str) -> Error {
    Error::from_raw_os(ErrorKind::SpawnFailed, rc, context)
}

struct FileActions {
    inner: libc::posix_spawn_file_actions_t,
}

impl FileActions {
    fn new() -> Result<Self> {
        let mut inner = MaybeUninit::uninit();
        let rc = unsafe { libc::posix_spawn_file_actions_init(inner.as_mut_ptr()) };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawn_file_actions_init"));
        }
        Ok(Self {
            inner: unsafe { inner.assume_init() },
        })
    }

    fn add_open(
        &mut self,
        target: RawFd,
        path: &CString,
        flags: libc::c_int,
        mode: FilePerms,
    ) -> Result<()> {
        let rc = unsafe {
            libc::posix_spawn_file_actions_addopen(&mut self.inner, target, path.as_ptr(), flags, mode)
        };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawn_file_actions_addopen"));
        }
        Ok(())
    }

    fn add_dup2(&mut self, source: RawFd, target: RawFd) -> Result<()> {
        let rc =
            unsafe { libc::posix_spawn_file_actions_adddup2(&mut self.inner, source, target) };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawn_file_actions_adddup2"));
        }
        Ok(())
    }

    fn add_close(&mut self, fd: RawFd) -> Result<()> {
        let rc = unsafe { libc::posix_spawn_file_actions_addclose(&mut self.inner, fd) };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawn_file_actions_addclose"));
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn add_chdir(&mut self, path: &CString) -> Result<()> {
        let rc = unsafe {
            libc::posix_spawn_file_actions_addchdir_np(&mut self.inner, path.as_ptr())
        };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawn_file_actions_addchdir_np"));
        }
        Ok(())
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.inner);
        }
    }
}

struct SpawnAttr {
    inner: libc::posix_spawnattr_t,
}

impl SpawnAttr {
    fn new() -> Result<Self> {
        let mut inner = MaybeUninit::uninit();
        let rc = unsafe { libc::posix_spawnattr_init(inner.as_mut_ptr()) };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawnattr_init"));
        }
        Ok(Self {
            inner: unsafe { inner.assume_init() },
        })
    }

    fn set_flags(&mut self, flags: libc::c_short) -> Result<()> {
        let rc = unsafe { libc::posix_spawnattr_setflags(&mut self.inner, flags) };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawnattr_setflags"));
        }
        Ok(())
    }

    fn set_pgroup(&mut self, pgroup: libc::pid_t) -> Result<()> {
        let rc = unsafe { libc::posix_spawnattr_setpgroup(&mut self.inner, pgroup) };
        if rc != 0 {
            return Err(spawn_error(rc, "posix_spawnattr_setpgroup"));
        }
        Ok(())
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(&mut self.inner);
        }
    }
}

/// Parent-side pipe ends collected while a spawn is being prepared.
#[derive(Default)]
struct ParentEnds {
    stdin: Option<OwnedFd>,
    stdout: Option<OwnedFd>,
    stderr: Option<OwnedFd>,
}

fn spawned_from(spec: &SpawnSpec, pid: libc::pid_t, ends: ParentEnds) -> Spawned {
    let pgid = if spec.opts.new_process_group {
        Some(pid)
    } else {
        spec.process_group
    };
    Spawned {
        pid,
        pgid,
        new_process_group: spec.opts.new_process_group || spec.process_group.is_some(),
        stdin: ends.stdin,
        stdout: ends.stdout,
        stderr: ends.stderr,
    }
}

fn spawn_via_posix_spawn(spec: &SpawnSpec) -> Result<Spawned> {
    let argv_c = cstring_vec(&spec.argv, "argv")?;
    let envp_c = cstring_vec(&spec.envp, "envp")?;

    let mut actions = FileActions::new()?;
    let mut attr = SpawnAttr::new()?;
    // Fds already scheduled for closure in the child, so close actions are
    // not added twice.
    let mut closed: HashSet<RawFd> = HashSet::new();
    // Child-side pipe ends; the parent closes them once the spawn returns.
    let mut child_ends: Vec<OwnedFd> = Vec::new();
    let mut parent_ends = ParentEnds::default();

    if let Some(cwd) = &spec.cwd {
        #[cfg(target_os = "macos")]
        {
            let cwd_c = cstring_from_path(cwd, "chdir")?;
            actions.add_chdir(&cwd_c)?;
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = cwd;
            return Err(Error::new(ErrorKind::ChdirFailed, "posix_spawn chdir"));
        }
    }

    let mut flags: libc::c_short = 0;
    if spec.opts.new_process_group || spec.process_group.is_some() {
        flags |= libc::POSIX_SPAWN_SETPGROUP as libc::c_short;
        let pgroup = if spec.opts.new_process_group {
            0
        } else {
            spec.process_group.unwrap_or(0)
        };
        attr.set_pgroup(pgroup)?;
    }
    #[cfg(target_os = "macos")]
    {
        flags |= libc::POSIX_SPAWN_CLOEXEC_DEFAULT as libc::c_short;
    }
    if flags != 0 {
        attr.set_flags(flags)?;
    }

    let setup_stream = |stdio: &StdioSpec,
                            target: RawFd,
                            read_only: bool,
                            parent_end: &mut Option<OwnedFd>,
                            actions: &mut FileActions,
                            closed: &mut HashSet<RawFd>,
                            child_ends: &mut Vec<OwnedFd>|
     -> Result<()> {
        match stdio {
            StdioSpec::Inherit => Ok(()),
            StdioSpec::Null => {
                let flags = if read_only { libc::O_RDONLY } else { libc::O_WRONLY };
                let null_c = CString::new("/dev/null").map_err(|_| nul_error("open"))?;
                actions.add_open(target, &null_c, flags, 0)
            }
            StdioSpec::File { path, mode, perms } => {
                let path_c = cstring_from_path(path, "open")?;
                actions.add_open(
                    target,
                    &path_c,
                    open_flags_for(*mode),
                    perms.unwrap_or(DEFAULT_FILE_MODE),
                )
            }
            StdioSpec::Fd(fd) => {
                if *fd == target {
                    return Ok(());
                }
                actions.add_dup2(*fd, target)
            }
            StdioSpec::Piped => {
                let (read, write) = create_pipe()?;
                let (child, parent) = if read_only { (read, write) } else { (write, read) };
                let child_raw = child.as_raw_fd();
                let parent_raw = parent.as_raw_fd();
                actions.add_dup2(child_raw, target)?;
                actions.add_close(child_raw)?;
                closed.insert(child_raw);
                actions.add_close(parent_raw)?;
                closed.insert(parent_raw);
                child_ends.push(child);
                *parent_end = Some(parent);
                Ok(())
            }
            StdioSpec::DupStdout => Err(Error::new(ErrorKind::InvalidStdio, "dup_stdout")),
        }
    };

    setup_stream(
        &spec.stdin,
        libc::STDIN_FILENO,
        true,
        &mut parent_ends.stdin,
        &mut actions,
        &mut closed,
        &mut child_ends,
    )?;
    setup_stream(
        &spec.stdout,
        libc::STDOUT_FILENO,
        false,
        &mut parent_ends.stdout,
        &mut actions,
        &mut closed,
        &mut child_ends,
    )?;
    if spec.stderr == StdioSpec::DupStdout {
        actions.add_dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO)?;
    } else {
        setup_stream(
            &spec.stderr,
            libc::STDERR_FILENO,
            false,
            &mut parent_ends.stderr,
            &mut actions,
            &mut closed,
            &mut child_ends,
        )?;
    }

    // Without a default-cloexec attribute the kernel will hand every open
    // descriptor to the child; schedule explicit closes for the ones above
    // stderr that the stdio setup has not already claimed.
    #[cfg(not(target_os = "macos"))]
    for fd in list_open_fds() {
        if fd <= libc::STDERR_FILENO || closed.contains(&fd) {
            continue;
        }
        actions.add_close(fd)?;
        closed.insert(fd);
    }

    let argv_ptrs = ptr_vec(&argv_c);
    let envp_ptrs = ptr_vec(&envp_c);

    let mut pid: libc::pid_t = 0;
    let rc = unsafe {
        libc::posix_spawnp(
            &mut pid,
            argv_c[0].as_ptr(),
            &actions.inner,
            &attr.inner,
            argv_ptrs.as_ptr(),
            envp_ptrs.as_ptr(),
        )
    };
    if rc != 0 {
        return Err(spawn_error(rc, "posix_spawnp"));
    }

    drop(child_ends);
    debug!(pid, strategy = "posix_spawn", "spawned child");
    Ok(spawned_from(spec, pid, parent_ends))
}

/// Everything the forked child needs, marshalled before `fork` so the child
/// performs no allocation.
struct ChildSetup {
    error_read_fd: RawFd,
    error_write_fd: RawFd,
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    stderr_fd: RawFd,
    set_pgid: bool,
    pgid: libc::pid_t,
    cwd: Option<CString>,
    exec_path: CString,
    argv: Vec<*mut libc::c_char>,
    envp: Vec<*mut libc::c_char>,
    close_bound: RawFd,
}

unsafe fn child_fail(error_fd: RawFd) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
    let _ = unsafe {
        libc::write(
            error_fd,
            (&errno as *const i32).cast(),
            std::mem::size_of::<i32>(),
        )
    };
    unsafe { libc::_exit(EXEC_FAILURE_EXIT_CODE) }
}

/// Runs in the forked child. Only async-signal-safe calls are permitted
/// here; in particular nothing may allocate or take locks.
unsafe fn child_after_fork(setup: &ChildSetup) -> ! {
    unsafe {
        libc::close(setup.error_read_fd);

        if setup.set_pgid && libc::setpgid(0, setup.pgid) == -1 {
            child_fail(setup.error_write_fd);
        }

        if let Some(cwd) = &setup.cwd {
            if libc::chdir(cwd.as_ptr()) == -1 {
                child_fail(setup.error_write_fd);
            }
        }

        for (source, target) in [
            (setup.stdin_fd, libc::STDIN_FILENO),
            (setup.stdout_fd, libc::STDOUT_FILENO),
            (setup.stderr_fd, libc::STDERR_FILENO),
        ] {
            if source != target && libc::dup2(source, target) == -1 {
                child_fail(setup.error_write_fd);
            }
        }

        // The bound was captured in the parent; consulting sysconf here could
        // observe a narrower limit and leak descriptors above it.
        let mut fd = libc::STDERR_FILENO + 1;
        while fd < setup.close_bound {
            if fd != setup.error_write_fd {
                libc::close(fd);
            }
            fd += 1;
        }

        libc::execve(
            setup.exec_path.as_ptr(),
            setup.argv.as_ptr() as *const *const libc::c_char,
            setup.envp.as_ptr() as *const *const libc::c_char,
        );
        child_fail(setup.error_write_fd)
    }
}

fn reap_after_exec_failure(pid: libc::pid_t) {
    let mut status: libc::c_int = 0;
    loop {
        let rv = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rv != -1 || io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            return;
        }
    }
}

fn spawn_via_fork_exec(spec: &SpawnSpec) -> Result<Spawned> {
    // Library-opened descriptors; dropping this vector on any path closes
    // everything not deliberately moved out.
    let mut prepared: Vec<OwnedFd> = Vec::new();
    let mut parent_ends = ParentEnds::default();

    let open_for_spec = |stdio: &StdioSpec,
                             read_only: bool,
                             inherit_target: RawFd,
                             parent_end: &mut Option<OwnedFd>,
                             prepared: &mut Vec<OwnedFd>|
     -> Result<RawFd> {
        match stdio {
            StdioSpec::Inherit => Ok(inherit_target),
            StdioSpec::Null => {
                let fd = open_null(read_only)?;
                let raw = fd.as_raw_fd();
                prepared.push(fd);
                Ok(raw)
            }
            StdioSpec::File { path, mode, perms } => {
                let fd = open_file(path, *mode, *perms)?;
                let raw = fd.as_raw_fd();
                prepared.push(fd);
                Ok(raw)
            }
            StdioSpec::Fd(fd) => Ok(*fd),
            StdioSpec::Piped => {
                let (read, write) = create_pipe()?;
                let (child, parent) = if read_only { (read, write) } else { (write, read) };
                let raw = child.as_raw_fd();
                prepared.push(child);
                *parent_end = Some(parent);
                Ok(raw)
            }
            StdioSpec::DupStdout => Err(Error::new(ErrorKind::InvalidStdio, "dup_stdout")),
        }
    };

    let stdout_fd = open_for_spec(
        &spec.stdout,
        false,
        libc::STDOUT_FILENO,
        &mut parent_ends.stdout,
        &mut prepared,
    )?;
    let stdin_fd = open_for_spec(
        &spec.stdin,
        true,
        libc::STDIN_FILENO,
        &mut parent_ends.stdin,
        &mut prepared,
    )?;
    let stderr_fd = if spec.stderr == StdioSpec::DupStdout {
        stdout_fd
    } else {
        open_for_spec(
            &spec.stderr,
            false,
            libc::STDERR_FILENO,
            &mut parent_ends.stderr,
            &mut prepared,
        )?
    };

    // Child setup or exec failures come back over this pipe as one errno.
    let (error_read, error_write) = create_pipe()?;

    let exec_path = resolve_exec_path(&spec.argv[0], &spec.envp, spec.cwd.as_deref());
    let exec_path_c = cstring_from_os(&exec_path, "exec path")?;
    let argv_c = cstring_vec(&spec.argv, "argv")?;
    let envp_c = cstring_vec(&spec.envp, "envp")?;
    let cwd_c = match &spec.cwd {
        Some(cwd) => Some(cstring_from_path(cwd, "cwd")?),
        None => None,
    };

    let (set_pgid, pgid) = if spec.opts.new_process_group {
        (true, 0)
    } else if let Some(pgid) = spec.process_group {
        (true, pgid)
    } else {
        (false, 0)
    };

    let setup = ChildSetup {
        error_read_fd: error_read.as_raw_fd(),
        error_write_fd: error_write.as_raw_fd(),
        stdin_fd,
        stdout_fd,
        stderr_fd,
        set_pgid,
        pgid,
        cwd: cwd_c,
        exec_path: exec_path_c,
        argv: ptr_vec(&argv_c),
        envp: ptr_vec(&envp_c),
        close_bound: max_open_fds() as RawFd,
    };

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(Error::last_os(ErrorKind::SpawnFailed, "fork"));
    }
    if pid == 0 {
        // Never returns; execs or exits 127.
        unsafe { child_after_fork(&setup) }
    }

    drop(error_write);

    let mut child_errno: libc::c_int = 0;
    let read_result = loop {
        let rv = unsafe {
            libc::read(
                error_read.as_raw_fd(),
                (&mut child_errno as *mut libc::c_int).cast(),
                std::mem::size_of::<libc::c_int>(),
            )
        };
        if rv >= 0 {
            break rv;
        }
        if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            return Err(Error::last_os(ErrorKind::ReadFailed, "error pipe"));
        }
    };

    if read_result > 0 {
        // Exec failed; the child is exiting with 127. Reap it so no zombie
        // survives a failed spawn.
        reap_after_exec_failure(pid);
        return Err(Error::from_raw_os(ErrorKind::SpawnFailed, child_errno, "exec"));
    }

    drop(prepared);
    debug!(pid, strategy = "fork_exec", "spawned child");
    Ok(spawned_from(spec, pid, parent_ends))
}

fn wait_pid_blocking(pid: libc::pid_t) -> Result<ExitStatus> {
    let mut status: libc::c_int = 0;
    loop {
        let rv = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rv == pid {
            return Ok(ExitStatus::from_raw(status));
        }
        if io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(Error::last_os(ErrorKind::WaitFailed, "waitpid"));
    }
}

fn try_wait_pid(pid: libc::pid_t) -> Result<Option<ExitStatus>> {
    let mut status: libc::c_int = 0;
    loop {
        let rv = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if rv == pid {
            return Ok(Some(ExitStatus::from_raw(status)));
        }
        if rv == 0 {
            return Ok(None);
        }
        if io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(Error::last_os(ErrorKind::WaitFailed, "waitpid"));
    }
}

fn send_signal(spawned: &Spawned, signo: i32) -> Result<()> {
    let target = match spawned.pgid {
        Some(pgid) if spawned.new_process_group => -pgid,
        _ => spawned.pid,
    };
    if unsafe { libc::kill(target, signo) } == -1 {
        return Err(Error::last_os(ErrorKind::KillFailed, "kill"));
    }
    Ok(())
}

struct PidWaitOps {
    pid: libc::pid_t,
    pgid: Option<libc::pid_t>,
    new_process_group: bool,
}

impl PidWaitOps {
    fn target(&self) -> Spawned {
        Spawned {
            pid: self.pid,
            pgid: self.pgid,
            new_process_group: self.new_process_group,
            ..Spawned::default()
        }
    }
}

impl WaitOps for PidWaitOps {
    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        try_wait_pid(self.pid)
    }

    fn wait_blocking(&mut self) -> Result<ExitStatus> {
        wait_pid_blocking(self.pid)
    }

    fn terminate(&mut self) -> Result<()> {
        send_signal(&self.target(), libc::SIGTERM)
    }

    fn kill(&mut self) -> Result<()> {
        send_signal(&self.target(), libc::SIGKILL)
    }
}

/// The production backend.
pub(crate) struct PosixBackend;

impl Backend for PosixBackend {
    fn spawn(&self, spec: &SpawnSpec) -> Result<Spawned> {
        if spec.argv.is_empty() {
            return Err(Error::new(ErrorKind::EmptyArgv, "argv"));
        }
        match select_spawn_strategy(spec) {
            SpawnStrategy::PosixSpawn => spawn_via_posix_spawn(spec),
            SpawnStrategy::ForkExec => spawn_via_fork_exec(spec),
        }
    }

    fn wait(
        &self,
        spawned: &mut Spawned,
        timeout: Option<Duration>,
        kill_grace: Duration,
    ) -> Result<ExitStatus> {
        let mut ops = PidWaitOps {
            pid: spawned.pid,
            pgid: spawned.pgid,
            new_process_group: spawned.new_process_group,
        };
        let clock = default_clock();
        wait_with_timeout(&mut ops, &*clock, timeout, kill_grace)
    }

    fn try_wait(&self, spawned: &mut Spawned) -> Result<Option<ExitStatus>> {
        try_wait_pid(spawned.pid)
    }

    fn terminate(&self, spawned: &Spawned) -> Result<()> {
        send_signal(spawned, libc::SIGTERM)
    }

    fn kill(&self, spawned: &Spawned) -> Result<()> {
        send_signal(spawned, libc::SIGKILL)
    }

    fn signal(&self, spawned: &Spawned, signo: i32) -> Result<()> {
        send_signal(spawned, signo)
    }
}
