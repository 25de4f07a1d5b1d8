//! Handle to a spawned child process.

use crate::backend::{default_backend, Spawned};
use crate::command::WaitOptions;
use crate::error::Result;
use crate::pipe::{PipeReader, PipeWriter};
use crate::status::ExitStatus;

/// A running (or exited but unreaped) child process.
///
/// Piped stdio endpoints are taken out of the handle at most once; whatever
/// is still held when the handle drops is closed. Dropping the handle does
/// not reap the child; call [`wait`](Child::wait) for that.
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
///
/// let mut stdin = child.take_stdin().expect("piped stdin");
/// stdin.write_all(b"stdin_payload")?;
/// stdin.close();
///
/// let mut stdout = child.take_stdout().expect("piped stdout");
/// let data = stdout.read_all()?;
/// let status = child.wait()?;
/// assert!(status.success());
/// assert_eq!(data, b"stdin_payload");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Child {
    spawned: Spawned,
    stdin: Option<PipeWriter>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
}

impl Child {
    pub(crate) fn from_spawned(mut spawned: Spawned) -> Self {
        let stdin = spawned.stdin.take().map(PipeWriter::new);
        let stdout = spawned.stdout.take().map(PipeReader::new);
        let stderr = spawned.stderr.take().map(PipeReader::new);
        Self {
            spawned,
            stdin,
            stdout,
            stderr,
        }
    }

    /// The OS-assigned process id.
    pub fn id(&self) -> u32 {
        self.spawned.pid as u32
    }

    /// Takes the write end of the child's stdin pipe, if piped and not
    /// already taken.
    pub fn take_stdin(&mut self) -> Option<PipeWriter> {
        self.stdin.take()
    }

    /// Takes the read end of the child's stdout pipe, if piped and not
    /// already taken.
    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take()
    }

    /// Takes the read end of the child's stderr pipe, if piped and not
    /// already taken.
    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take()
    }

    /// Waits for the child to exit and reaps it.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        default_backend().wait(&mut self.spawned, None, std::time::Duration::ZERO)
    }

    /// Waits with a timeout and escalation policy.
    ///
    /// A child that misses the timeout is terminated, then killed after the
    /// grace period; the result is a timeout error even when the child exits
    /// during the grace window.
    pub fn wait_with(&mut self, options: WaitOptions) -> Result<ExitStatus> {
        default_backend().wait(&mut self.spawned, options.timeout, options.kill_grace)
    }

    /// Reaps the child if it has already exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        default_backend().try_wait(&mut self.spawned)
    }

    /// Sends the soft termination signal (SIGTERM).
    pub fn terminate(&self) -> Result<()> {
        default_backend().terminate(&self.spawned)
    }

    /// Sends the hard kill signal (SIGKILL).
    pub fn kill(&self) -> Result<()> {
        default_backend().kill(&self.spawned)
    }

    /// Sends an arbitrary signal.
    ///
    /// Valid before or after exit; signalling a fully reaped process reports
    /// the kernel's no-such-process error.
    pub fn signal(&self, signo: i32) -> Result<()> {
        default_backend().signal(&self.spawned, signo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{serialize_overrides, FakeBackend};
    use crate::backend::ScopedBackendOverride;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn child_with_pid(pid: libc::pid_t) -> Child {
        Child::from_spawned(Spawned {
            pid,
            ..Spawned::default()
        })
    }

    #[test]
    fn methods_forward_to_the_backend() {
        let _lock = serialize_overrides();
        let fake = Arc::new(FakeBackend::default());
        let _guard = ScopedBackendOverride::new(fake.clone());

        let mut child = child_with_pid(4242);
        assert_eq!(child.id(), 4242);

        child.wait().expect("wait");
        child.try_wait().expect("try_wait");
        child.terminate().expect("terminate");
        child.kill().expect("kill");
        child.signal(libc::SIGUSR1).expect("signal");

        let state = fake.state.lock();
        assert_eq!(state.wait_calls.len(), 1);
        assert_eq!(state.wait_calls[0].pid, 4242);
        assert_eq!(state.try_wait_pids, vec![4242]);
        assert_eq!(state.terminate_pids, vec![4242]);
        assert_eq!(state.kill_pids, vec![4242]);
        assert_eq!(state.signal_pids, vec![(4242, libc::SIGUSR1)]);
    }

    #[test]
    fn wait_with_passes_timeout_and_grace() {
        let _lock = serialize_overrides();
        let fake = Arc::new(FakeBackend::default());
        let _guard = ScopedBackendOverride::new(fake.clone());

        let mut child = child_with_pid(7);
        let options = WaitOptions {
            timeout: Some(std::time::Duration::from_millis(10)),
            kill_grace: std::time::Duration::from_millis(50),
        };
        child.wait_with(options).expect("wait");

        let state = fake.state.lock();
        assert_eq!(state.wait_calls[0].timeout, options.timeout);
        assert_eq!(state.wait_calls[0].kill_grace, options.kill_grace);
    }

    #[test]
    fn try_wait_reports_running_or_exited() {
        let _lock = serialize_overrides();
        let fake = Arc::new(FakeBackend::default());
        let _guard = ScopedBackendOverride::new(fake.clone());

        let mut child = child_with_pid(5050);
        assert!(child.try_wait().expect("try_wait").is_none());

        fake.state.lock().try_wait_result = Some(ExitStatus::exited(9, 9 << 8));
        let status = child.try_wait().expect("try_wait").expect("status");
        assert_eq!(status.code(), Some(9));
    }

    #[test]
    fn backend_errors_propagate() {
        let _lock = serialize_overrides();
        let fake = Arc::new(FakeBackend::default());
        fake.state.lock().fail_terminate = true;
        let _guard = ScopedBackendOverride::new(fake.clone());

        let child = child_with_pid(9001);
        let err = child.terminate().expect_err("terminate");
        assert_eq!(err.kind(), ErrorKind::KillFailed);
    }

    #[test]
    fn pipes_can_be_taken_once() {
        let (read, _write) = crate::fd::create_pipe().expect("pipe");
        let mut child = Child::from_spawned(Spawned {
            pid: 1,
            stdout: Some(read),
            ..Spawned::default()
        });
        assert!(child.take_stdout().is_some());
        assert!(child.take_stdout().is_none());
        assert!(child.take_stdin().is_none());
    }
}
