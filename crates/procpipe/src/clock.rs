//! Monotonic clock with a process-wide override slot for tests.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Time source used by the wait policy.
///
/// The default reads the monotonic clock and sleeps the calling thread; tests
/// install a fake through [`ScopedClockOverride`] to drive the policy
/// deterministically.
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

static CLOCK_OVERRIDE: Mutex<Option<Arc<dyn Clock>>> = Mutex::new(None);

fn system_clock() -> Arc<dyn Clock> {
    static SYSTEM: OnceLock<Arc<dyn Clock>> = OnceLock::new();
    SYSTEM.get_or_init(|| Arc::new(SystemClock)).clone()
}

/// The active clock: the innermost override if one is installed, the system
/// clock otherwise. Visible to all threads.
pub(crate) fn default_clock() -> Arc<dyn Clock> {
    if let Some(clock) = CLOCK_OVERRIDE.lock().clone() {
        return clock;
    }
    system_clock()
}

/// Installs a clock override for the lifetime of the guard; the previous
/// clock is restored on drop, so overrides nest.
pub(crate) struct ScopedClockOverride {
    previous: Option<Arc<dyn Clock>>,
}

impl ScopedClockOverride {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        let previous = CLOCK_OVERRIDE.lock().replace(clock);
        Self { previous }
    }
}

impl Drop for ScopedClockOverride {
    fn drop(&mut self) {
        *CLOCK_OVERRIDE.lock() = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FrozenClock(Instant);

    impl Clock for FrozenClock {
        fn now(&self) -> Instant {
            self.0
        }

        fn sleep(&self, _duration: Duration) {}
    }

    #[test]
    fn override_installs_and_restores() {
        let _lock = crate::backend::test_support::serialize_overrides();
        let frozen: Arc<dyn Clock> = Arc::new(FrozenClock(Instant::now()));
        {
            let _guard = ScopedClockOverride::new(frozen.clone());
            assert!(Arc::ptr_eq(&default_clock(), &frozen));
        }
        assert!(!Arc::ptr_eq(&default_clock(), &frozen));
    }

    #[test]
    fn overrides_nest_and_unwind() {
        let _lock = crate::backend::test_support::serialize_overrides();
        let outer: Arc<dyn Clock> = Arc::new(FrozenClock(Instant::now()));
        let inner: Arc<dyn Clock> = Arc::new(FrozenClock(Instant::now()));
        let _outer_guard = ScopedClockOverride::new(outer.clone());
        {
            let _inner_guard = ScopedClockOverride::new(inner.clone());
            assert!(Arc::ptr_eq(&default_clock(), &inner));
        }
        assert!(Arc::ptr_eq(&default_clock(), &outer));
    }

    #[test]
    fn override_is_visible_across_threads() {
        let _lock = crate::backend::test_support::serialize_overrides();
        let frozen: Arc<dyn Clock> = Arc::new(FrozenClock(Instant::now()));
        let _guard = ScopedClockOverride::new(frozen.clone());
        let observed = std::thread::spawn(default_clock).join().expect("join");
        assert!(Arc::ptr_eq(&observed, &frozen));
    }
}
