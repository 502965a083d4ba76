//! Spinlock for synchronising with the realtime thread (spec §4.6, §5).
//!
//! Mirrors `spin.h` from the original source: a spinlock is the only
//! synchronisation primitive the realtime thread may take (it must never
//! block on a mutex or page fault), used to protect per-player state.
//! Non-realtime threads use ordinary locks elsewhere and must never call
//! into RT-only code paths; [`rt_not_allowed`] is the assertion hook for
//! that discipline.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    static IS_RT_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Mark the calling thread as the realtime thread.
///
/// Called once by the realtime coordinator before entering its poll loop.
pub fn mark_rt_thread() {
    IS_RT_THREAD.with(|f| f.set(true));
}

/// Assert that the calling thread is not the realtime thread.
///
/// Mirrors `rt_not_allowed()` in `realtime.h`: called at the top of any
/// primitive (allocation, mutex acquisition) that the RT thread must never
/// reach. Aborts rather than returning an error, matching the original's
/// "failure of primitives whose failure would corrupt state" policy (§7).
pub fn rt_not_allowed() {
    let on_rt = IS_RT_THREAD.with(|f| f.get());
    if on_rt {
        panic!("non-realtime-safe operation attempted from the realtime thread");
    }
}

/// A spinlock-guarded value.
///
/// Both the RT thread and non-RT threads may take this lock; it is held only
/// for O(1) work. Unlike [`rt_not_allowed`]-guarded constructs, taking the
/// spinlock itself is legal from the RT thread — that's the entire point of
/// having it.
pub struct Spinlock<T> {
    locked: AtomicBool,
    value: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub fn new(value: T) -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            value: std::cell::UnsafeCell::new(value),
        }
    }

    /// Take the lock, spinning until it is free.
    ///
    /// Pre: lock is not already held by the current thread.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        SpinGuard { lock: self }
    }

    /// Try to take the lock without spinning.
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }
}

pub struct SpinGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<'a, T> Deref for SpinGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<'a, T> DerefMut for SpinGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<'a, T> Drop for SpinGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_excludes_concurrent_writers() {
        let lock = Arc::new(Spinlock::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = Spinlock::new(5);
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }
}
