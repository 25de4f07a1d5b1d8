//! Timeout and graceful-termination wait policy.
//!
//! The policy is pure: it talks to the child only through [`WaitOps`] and to
//! time only through the clock, so the whole escalation ladder is testable
//! without forking.

use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Error, ErrorKind, Result};
use crate::status::ExitStatus;

/// The primitive wait and signal operations the policy escalates through.
pub(crate) trait WaitOps {
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;
    fn wait_blocking(&mut self) -> Result<ExitStatus>;
    fn terminate(&mut self) -> Result<()>;
    fn kill(&mut self) -> Result<()>;
}

const POLL_STEP: Duration = Duration::from_millis(1);

/// Wait for a child with an optional deadline.
///
/// Without a timeout this is a plain blocking wait. With one, the child is
/// polled until the deadline, then terminated; a child that exits during the
/// grace window still counts as a timeout, because the caller asked for
/// completion within the deadline. Past the grace window the child is killed
/// and reaped before the timeout is reported.
pub(crate) fn wait_with_timeout(
    ops: &mut dyn WaitOps,
    clock: &dyn Clock,
    timeout: Option<Duration>,
    kill_grace: Duration,
) -> Result<ExitStatus> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return ops.wait_blocking(),
    };

    // Poll before the first deadline check so a zero timeout against an
    // already-exited child reports the status instead of escalating.
    let deadline = clock.now() + timeout;
    loop {
        if let Some(status) = ops.try_wait()? {
            return Ok(status);
        }
        if clock.now() >= deadline {
            break;
        }
        clock.sleep(POLL_STEP);
    }

    ops.terminate()?;

    let grace_deadline = clock.now() + kill_grace;
    while clock.now() < grace_deadline {
        if ops.try_wait()?.is_some() {
            return Err(Error::new(ErrorKind::Timeout, "wait"));
        }
        clock.sleep(POLL_STEP);
    }

    ops.kill()?;
    let _ = ops.wait_blocking();
    Err(Error::new(ErrorKind::Timeout, "wait"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct FakeClock {
        now: Mutex<Instant>,
        epoch: Instant,
    }

    impl FakeClock {
        fn new() -> Self {
            let epoch = Instant::now();
            Self {
                now: Mutex::new(epoch),
                epoch,
            }
        }

        fn elapsed(&self) -> Duration {
            *self.now.lock() - self.epoch
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }

        fn sleep(&self, duration: Duration) {
            let mut now = self.now.lock();
            *now += duration;
        }
    }

    #[derive(Default)]
    struct FakeOps {
        immediate_exit: bool,
        exit_after_terminate: bool,
        terminated: bool,
        try_wait_calls: u32,
        terminate_calls: u32,
        kill_calls: u32,
        wait_calls: u32,
    }

    impl WaitOps for FakeOps {
        fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
            self.try_wait_calls += 1;
            if self.immediate_exit || (self.exit_after_terminate && self.terminated) {
                return Ok(Some(ExitStatus::exited(0, 0)));
            }
            Ok(None)
        }

        fn wait_blocking(&mut self) -> Result<ExitStatus> {
            self.wait_calls += 1;
            Ok(ExitStatus::exited(0, 0))
        }

        fn terminate(&mut self) -> Result<()> {
            self.terminate_calls += 1;
            self.terminated = true;
            Ok(())
        }

        fn kill(&mut self) -> Result<()> {
            self.kill_calls += 1;
            Ok(())
        }
    }

    #[test]
    fn no_timeout_is_a_blocking_wait() {
        let clock = FakeClock::new();
        let mut ops = FakeOps::default();
        let status = wait_with_timeout(&mut ops, &clock, None, Duration::from_millis(5))
            .expect("status");
        assert!(status.success());
        assert_eq!(ops.wait_calls, 1);
        assert_eq!(ops.try_wait_calls, 0);
    }

    #[test]
    fn returns_status_before_deadline() {
        let clock = FakeClock::new();
        let mut ops = FakeOps {
            immediate_exit: true,
            ..FakeOps::default()
        };
        let status = wait_with_timeout(
            &mut ops,
            &clock,
            Some(Duration::from_millis(5)),
            Duration::from_millis(5),
        )
        .expect("status");
        assert!(status.success());
        assert_eq!(ops.terminate_calls, 0);
        assert_eq!(ops.kill_calls, 0);
        assert_eq!(ops.wait_calls, 0);
    }

    #[test]
    fn exit_during_grace_still_reports_timeout() {
        let clock = FakeClock::new();
        let mut ops = FakeOps {
            exit_after_terminate: true,
            ..FakeOps::default()
        };
        let err = wait_with_timeout(
            &mut ops,
            &clock,
            Some(Duration::from_millis(3)),
            Duration::from_millis(5),
        )
        .expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(ops.terminate_calls, 1);
        assert_eq!(ops.kill_calls, 0);
        assert_eq!(ops.wait_calls, 0);
        assert!(clock.elapsed() >= Duration::from_millis(3));
    }

    #[test]
    fn escalates_to_kill_and_reaps() {
        let clock = FakeClock::new();
        let mut ops = FakeOps::default();
        let err = wait_with_timeout(
            &mut ops,
            &clock,
            Some(Duration::from_millis(3)),
            Duration::from_millis(4),
        )
        .expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(ops.terminate_calls, 1);
        assert_eq!(ops.kill_calls, 1);
        assert_eq!(ops.wait_calls, 1);
        assert!(clock.elapsed() >= Duration::from_millis(7));
    }

    #[test]
    fn zero_timeout_against_exited_child_returns_status() {
        let clock = FakeClock::new();
        let mut ops = FakeOps {
            immediate_exit: true,
            ..FakeOps::default()
        };
        let status = wait_with_timeout(
            &mut ops,
            &clock,
            Some(Duration::ZERO),
            Duration::from_millis(5),
        )
        .expect("status");
        assert!(status.success());
        assert_eq!(ops.terminate_calls, 0);
        assert_eq!(ops.kill_calls, 0);
    }

    #[test]
    fn zero_timeout_against_running_child_escalates() {
        let clock = FakeClock::new();
        let mut ops = FakeOps {
            exit_after_terminate: true,
            ..FakeOps::default()
        };
        let err = wait_with_timeout(
            &mut ops,
            &clock,
            Some(Duration::ZERO),
            Duration::from_millis(5),
        )
        .expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(ops.terminate_calls, 1);
    }
}
