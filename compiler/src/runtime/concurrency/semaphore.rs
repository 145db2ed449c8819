//! Counting semaphore.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::RuntimeError;

pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.condvar.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Take a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Block up to `timeout` for a permit.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.condvar.wait_until(&mut permits, deadline).timed_out() {
                return Err(RuntimeError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
        *permits -= 1;
        Ok(())
    }

    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.condvar.notify_one();
    }

    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn permits_count_down_and_up() {
        let semaphore = Semaphore::new(2);
        assert!(semaphore.try_acquire());
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());

        semaphore.release();
        assert_eq!(semaphore.available(), 1);
        assert!(semaphore.try_acquire());
    }

    #[test]
    fn timed_acquire_expires_without_permits() {
        let semaphore = Semaphore::new(0);
        let err = semaphore
            .acquire_timeout(Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
    }

    #[test]
    fn release_wakes_a_blocked_acquire() {
        let semaphore = Arc::new(Semaphore::new(0));
        let waiter = {
            let semaphore = semaphore.clone();
            thread::spawn(move || {
                semaphore.acquire();
                true
            })
        };

        thread::sleep(Duration::from_millis(50));
        semaphore.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn semaphore_bounds_concurrent_workers() {
        let semaphore = Arc::new(Semaphore::new(3));
        let peak = Arc::new(Mutex::new((0usize, 0usize))); // (current, max)

        let mut handles = Vec::new();
        for _ in 0..12 {
            let semaphore = semaphore.clone();
            let peak = peak.clone();
            handles.push(thread::spawn(move || {
                semaphore.acquire();
                {
                    let mut guard = peak.lock();
                    guard.0 += 1;
                    guard.1 = guard.1.max(guard.0);
                }
                thread::sleep(Duration::from_millis(10));
                peak.lock().0 -= 1;
                semaphore.release();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.lock().1 <= 3, "more workers ran than permits allow");
    }
}
