use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
};

#[cfg(feature = "lock_tracking")]
use std::time::{Duration, Instant};
#[cfg(feature = "lock_tracking")]
use tracing::warn;

/// A Mutex which optionally warns when acquiring or holding the lock takes too long
///
/// Every acquisition names its purpose so that slow critical sections can be attributed.
#[derive(Debug)]
pub(crate) struct Mutex<T> {
    inner: std::sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: std::sync::Mutex::new(value),
        }
    }

    /// Acquires the lock for a certain purpose
    ///
    /// Panics if a previous holder panicked while holding the lock.
    pub(crate) fn lock(&self, purpose: &'static str) -> MutexGuard<'_, T> {
        #[cfg(feature = "lock_tracking")]
        let start = Instant::now();
        let guard = self.inner.lock().unwrap();

        #[cfg(feature = "lock_tracking")]
        let acquired = {
            let acquired = Instant::now();
            let elapsed = acquired.duration_since(start);
            if elapsed > SLOW_LOCK {
                warn!("locking for {} took {:?}", purpose, elapsed);
            }
            acquired
        };
        #[cfg(not(feature = "lock_tracking"))]
        let _ = purpose;

        MutexGuard {
            guard,
            #[cfg(feature = "lock_tracking")]
            acquired,
            #[cfg(feature = "lock_tracking")]
            purpose,
        }
    }
}

pub(crate) struct MutexGuard<'a, T> {
    guard: std::sync::MutexGuard<'a, T>,
    #[cfg(feature = "lock_tracking")]
    acquired: Instant,
    #[cfg(feature = "lock_tracking")]
    purpose: &'static str,
}

#[cfg(feature = "lock_tracking")]
impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let held = self.acquired.elapsed();
        if held > SLOW_LOCK {
            warn!("holding the lock for {} took {:?}", self.purpose, held);
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

impl<T: Debug> Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.guard.deref().fmt(f)
    }
}

#[cfg(feature = "lock_tracking")]
const SLOW_LOCK: Duration = Duration::from_millis(1);
