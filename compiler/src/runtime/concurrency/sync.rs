//! Mutex and condition-variable surface of the runtime contract.
//!
//! Thin facade over `parking_lot`; handles stay opaque to emitted code,
//! and guards release on every exit path by construction.

use std::time::Duration;

pub use parking_lot::MutexGuard;

pub struct RtMutex<T> {
    inner: parking_lot::Mutex<T>,
}

impl<T> RtMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: parking_lot::Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }
}

pub struct RtCondvar {
    inner: parking_lot::Condvar,
}

impl RtCondvar {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::Condvar::new(),
        }
    }

    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.inner.wait(guard);
    }

    /// Returns false when the wait timed out.
    pub fn wait_timeout<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        !self.inner.wait_for(guard, timeout).timed_out()
    }

    pub fn signal(&self) {
        self.inner.notify_one();
    }

    pub fn broadcast(&self) {
        self.inner.notify_all();
    }
}

impl Default for RtCondvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = RtMutex::new(1);
        let guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn condvar_signal_wakes_waiter() {
        let pair = Arc::new((RtMutex::new(false), RtCondvar::new()));
        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                let (mutex, condvar) = &*pair;
                let mut ready = mutex.lock();
                while !*ready {
                    condvar.wait(&mut ready);
                }
                true
            })
        };

        thread::sleep(Duration::from_millis(30));
        let (mutex, condvar) = &*pair;
        *mutex.lock() = true;
        condvar.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn timed_wait_reports_timeout() {
        let mutex = RtMutex::new(());
        let condvar = RtCondvar::new();
        let mut guard = mutex.lock();
        assert!(!condvar.wait_timeout(&mut guard, Duration::from_millis(20)));
    }
}
