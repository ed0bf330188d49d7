//! Non-blocking lock for state shared between thread mode and interrupt handlers.
//!
//! Interrupt handlers must never spin on a lock held by the code they preempted, so the only
//! acquisition path that is safe from an ISR is [`SpinLock::try_lock`]. Thread-mode code may use
//! [`SpinLock::lock`], which busy-waits.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contended;

pub struct SpinLock<T> {
    locked: AtomicBool,
    contents: UnsafeCell<T>,
}

// Safety: access to `contents` is serialized through `locked`.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(contents: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            contents: UnsafeCell::new(contents),
        }
    }

    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, Contended> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(Contended);
        }
        Ok(SpinLockGuard {
            locked: &self.locked,
            // Safety: we just won the flag, so nobody else holds a reference.
            contents: unsafe { &mut *self.contents.get() },
        })
    }

    // Thread mode only. Calling this from an ISR that preempted the holder deadlocks.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Ok(guard) = self.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
    }
}

pub struct SpinLockGuard<'a, T: ?Sized> {
    locked: &'a AtomicBool,
    contents: &'a mut T,
}

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// Narrows a guard to a component of the protected value. The lock stays held until the
    /// returned guard is dropped.
    pub fn map<U: ?Sized>(
        mut orig: Self,
        f: impl FnOnce(&mut T) -> &mut U,
    ) -> SpinLockGuard<'a, U> {
        let locked = orig.locked;
        let raw: *mut T = &mut *orig.contents;
        // Safety: `orig` is forgotten below, so this is the only live reference to the contents
        // and the lock is released exactly once, by the mapped guard.
        let contents: &'a mut T = unsafe { &mut *raw };
        core::mem::forget(orig);
        SpinLockGuard {
            locked,
            contents: f(contents),
        }
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.contents
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.contents
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Pattern for acquiring hardware loaned to an ISR through a static.
///
/// # Panics
///
/// If the lock is held when the ISR fires (the interrupt was enabled while the hardware was
/// still being provisioned, or a previous invocation leaked its guard), or if nothing has been
/// donated yet.
pub fn acquire_hw<T: Send>(lock: &SpinLock<Option<T>>) -> SpinLockGuard<'_, T> {
    SpinLockGuard::map(lock.try_lock().expect("HW lock held at ISR entry"), |o| {
        o.as_mut().expect("ISR fired before hardware was donated")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_try_lock_is_contended() {
        let lock = SpinLock::new(5u32);
        let guard = lock.try_lock().unwrap();
        assert_eq!(lock.try_lock().err(), Some(Contended));
        drop(guard);
        assert_eq!(*lock.try_lock().unwrap(), 5);
    }

    #[test]
    fn mapped_guard_keeps_lock_until_dropped() {
        let lock = SpinLock::new(Some((1u8, 2u8)));
        {
            let mut hw = acquire_hw(&lock);
            hw.1 = 7;
            assert!(lock.try_lock().is_err());
        }
        assert_eq!(*lock.lock(), Some((1, 7)));
    }

    #[test]
    #[should_panic(expected = "before hardware was donated")]
    fn acquire_without_donation_panics() {
        let lock: SpinLock<Option<u32>> = SpinLock::new(None);
        let _ = acquire_hw(&lock);
    }
}
