//! Reentrancy lock.
//!
//! Entry points that move value while mutating the ledger hold this lock
//! for their whole duration. A nested attempt to take it fails at once
//! with `ReentrantCall` instead of deadlocking. The guard releases the
//! lock when dropped, so every exit path, including `?` returns, unlocks.

use keeper_types::{KeeperError, KeeperResult};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReentrancyLock {
    entered: AtomicBool,
}

impl ReentrancyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or fail with `ReentrantCall` if it is held
    pub fn acquire(&self) -> KeeperResult<ReentrancyGuard<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                tracing::warn!("Reentrant call rejected");
                KeeperError::ReentrantCall
            })?;
        Ok(ReentrancyGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Scoped hold on a [`ReentrancyLock`]
#[derive(Debug)]
pub struct ReentrancyGuard<'a> {
    lock: &'a ReentrancyLock,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.lock.entered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_acquire_fails_fast() {
        let lock = ReentrancyLock::new();
        let guard = lock.acquire().unwrap();
        assert!(lock.is_held());
        assert_eq!(lock.acquire().err(), Some(KeeperError::ReentrantCall));
        drop(guard);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(lock: &ReentrancyLock) -> KeeperResult<()> {
            let _guard = lock.acquire()?;
            Err(KeeperError::ReentrantCall)
        }

        let lock = ReentrancyLock::new();
        assert!(failing(&lock).is_err());
        assert!(!lock.is_held());
        assert!(lock.acquire().is_ok());
    }
}
