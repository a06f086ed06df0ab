use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared at-most-one flag for long-running sessions (downloads, syncs).
///
/// A second [`SessionFlag::try_begin`] while a guard is alive fails instead
/// of queueing.
#[derive(Debug, Clone, Default)]
pub struct SessionFlag {
    active: Arc<AtomicBool>,
}

impl SessionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Option<SessionGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard {
                active: Arc::clone(&self.active),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Clears the owning [`SessionFlag`] when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_fails_until_guard_drops() {
        let flag = SessionFlag::new();
        let guard = flag.try_begin().expect("first session");
        assert!(flag.is_active());
        assert!(flag.clone().try_begin().is_none());

        drop(guard);
        assert!(!flag.is_active());
        assert!(flag.try_begin().is_some());
    }
}
