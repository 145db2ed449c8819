//! N-party reusable barrier with leader detection.

use parking_lot::{Condvar, Mutex};

use crate::models::error::RuntimeError;

struct BarrierState {
    waiting: usize,
    generation: u64,
}

pub struct Barrier {
    parties: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    /// Exactly one waiter per generation is the leader.
    pub is_leader: bool,
}

impl Barrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Block until all parties arrive. The last arrival becomes the
    /// leader and releases the generation.
    pub fn wait(&self) -> BarrierWaitResult {
        let mut state = self.state.lock();
        let generation = state.generation;
        state.waiting += 1;

        if state.waiting == self.parties {
            state.waiting = 0;
            state.generation += 1;
            self.condvar.notify_all();
            return BarrierWaitResult { is_leader: true };
        }

        while state.generation == generation {
            self.condvar.wait(&mut state);
        }
        BarrierWaitResult { is_leader: false }
    }

    /// Reset the barrier. Fails while parties are waiting.
    pub fn reset(&self) -> Result<(), RuntimeError> {
        let state = self.state.lock();
        if state.waiting > 0 {
            return Err(RuntimeError::BarrierInUse {
                waiting: state.waiting,
            });
        }
        Ok(())
    }

    pub fn parties(&self) -> usize {
        self.parties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn all_parties_release_with_one_leader() {
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || barrier.wait().is_leader));
        }

        let leaders: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(leaders, 1, "exactly one leader per generation");
    }

    #[test]
    fn barrier_is_reusable_across_generations() {
        let barrier = Arc::new(Barrier::new(2));
        for _ in 0..3 {
            let other = {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.wait())
            };
            barrier.wait();
            other.join().unwrap();
        }
    }

    #[test]
    fn reset_fails_while_parties_wait() {
        let barrier = Arc::new(Barrier::new(2));
        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait())
        };

        thread::sleep(Duration::from_millis(50));
        let err = barrier.reset().unwrap_err();
        assert_eq!(err, RuntimeError::BarrierInUse { waiting: 1 });

        barrier.wait();
        waiter.join().unwrap();
        assert!(barrier.reset().is_ok());
    }
}
