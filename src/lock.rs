//! Input lock over the creation form controls
//!
//! While an operation is in flight the named controls are disabled. The lock
//! is engaged by taking a `LockGuard`; dropping or releasing the guard
//! re-enables the controls. Since the guard cannot be cloned, every
//! engagement is released exactly once.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(test)]
use std::sync::atomic::AtomicUsize;

struct LockInner {
    controls: Vec<String>,
    engaged: AtomicBool,
    #[cfg(test)]
    releases: AtomicUsize,
}

#[derive(Clone)]
pub struct InputLock {
    inner: Arc<LockInner>,
}

impl InputLock {
    pub fn new<I, S>(controls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(LockInner {
                controls: controls.into_iter().map(Into::into).collect(),
                engaged: AtomicBool::new(false),
                #[cfg(test)]
                releases: AtomicUsize::new(0),
            }),
        }
    }

    /// Disables the controls. Returns `None` if they are already disabled,
    /// which is how a second submission is refused.
    pub fn engage(&self) -> Option<LockGuard> {
        self.inner
            .engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        debug!("Input lock engaged over {:?}", self.inner.controls);
        Some(LockGuard { lock: self.clone() })
    }

    pub fn is_engaged(&self) -> bool {
        self.inner.engaged.load(Ordering::Acquire)
    }

    pub fn is_disabled(&self, control: &str) -> bool {
        self.is_engaged() && self.inner.controls.iter().any(|c| c == control)
    }

    #[cfg(test)]
    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::Acquire)
    }
}

/// Proof that the controls are disabled on someone's behalf.
#[must_use = "dropping the guard re-enables the controls immediately"]
pub struct LockGuard {
    lock: InputLock,
}

impl LockGuard {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.inner.engaged.store(false, Ordering::Release);
        #[cfg(test)]
        self.lock.inner.releases.fetch_add(1, Ordering::AcqRel);
        debug!("Input lock released");
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("controls", &self.lock.inner.controls)
            .finish()
    }
}
