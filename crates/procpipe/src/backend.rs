//! Platform abstraction behind the public handles.

use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::lowering::SpawnSpec;
use crate::status::ExitStatus;

/// A live child as the backend sees it: identifiers plus the parent-side
/// ends of any pipes the spawn created.
#[derive(Debug, Default)]
pub(crate) struct Spawned {
    pub(crate) pid: libc::pid_t,
    pub(crate) pgid: Option<libc::pid_t>,
    pub(crate) new_process_group: bool,
    pub(crate) stdin: Option<OwnedFd>,
    pub(crate) stdout: Option<OwnedFd>,
    pub(crate) stderr: Option<OwnedFd>,
}

/// Process-creation and reaping primitives for one platform.
///
/// A single trait-object indirection exists so tests can substitute a
/// recording double; production code always runs the POSIX backend.
pub(crate) trait Backend: Send + Sync {
    fn spawn(&self, spec: &SpawnSpec) -> Result<Spawned>;
    fn wait(
        &self,
        spawned: &mut Spawned,
        timeout: Option<Duration>,
        kill_grace: Duration,
    ) -> Result<ExitStatus>;
    fn try_wait(&self, spawned: &mut Spawned) -> Result<Option<ExitStatus>>;
    fn terminate(&self, spawned: &Spawned) -> Result<()>;
    fn kill(&self, spawned: &Spawned) -> Result<()>;
    fn signal(&self, spawned: &Spawned, signo: i32) -> Result<()>;
}

static BACKEND_OVERRIDE: Mutex<Option<Arc<dyn Backend>>> = Mutex::new(None);

fn posix_backend() -> Arc<dyn Backend> {
    static POSIX: OnceLock<Arc<dyn Backend>> = OnceLock::new();
    POSIX
        .get_or_init(|| Arc::new(crate::posix::PosixBackend))
        .clone()
}

/// The active backend: the innermost override if installed, the platform
/// backend otherwise. Visible to all threads.
pub(crate) fn default_backend() -> Arc<dyn Backend> {
    if let Some(backend) = BACKEND_OVERRIDE.lock().clone() {
        return backend;
    }
    posix_backend()
}

/// Installs a backend override for the lifetime of the guard; the previous
/// backend is restored on drop, so overrides nest.
pub(crate) struct ScopedBackendOverride {
    previous: Option<Arc<dyn Backend>>,
}

impl ScopedBackendOverride {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        let previous = BACKEND_OVERRIDE.lock().replace(backend);
        Self { previous }
    }
}

impl Drop for ScopedBackendOverride {
    fn drop(&mut self) {
        *BACKEND_OVERRIDE.lock() = self.previous.take();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeBackend;
    use super::*;

    #[test]
    fn override_installs_and_restores() {
        let _lock = test_support::serialize_overrides();
        let fake: Arc<dyn Backend> = Arc::new(FakeBackend::default());
        let before = default_backend();
        {
            let _guard = ScopedBackendOverride::new(fake.clone());
            assert!(Arc::ptr_eq(&default_backend(), &fake));
        }
        assert!(Arc::ptr_eq(&default_backend(), &before));
    }

    #[test]
    fn overrides_stack_and_unwind() {
        let _lock = test_support::serialize_overrides();
        let fake_a: Arc<dyn Backend> = Arc::new(FakeBackend::default());
        let fake_b: Arc<dyn Backend> = Arc::new(FakeBackend::default());
        let before = default_backend();
        {
            let _guard_a = ScopedBackendOverride::new(fake_a.clone());
            assert!(Arc::ptr_eq(&default_backend(), &fake_a));
            {
                let _guard_b = ScopedBackendOverride::new(fake_b.clone());
                assert!(Arc::ptr_eq(&default_backend(), &fake_b));
            }
            assert!(Arc::ptr_eq(&default_backend(), &fake_a));
        }
        assert!(Arc::ptr_eq(&default_backend(), &before));
    }

    #[test]
    fn override_is_visible_across_threads() {
        let _lock = test_support::serialize_overrides();
        let fake: Arc<dyn Backend> = Arc::new(FakeBackend::default());
        let _guard = ScopedBackendOverride::new(fake.clone());
        let observed = std::thread::spawn(default_backend).join().expect("join");
        assert!(Arc::ptr_eq(&observed, &fake));
    }
}
