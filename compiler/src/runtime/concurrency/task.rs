//! Tasks: preemptive OS threads with cooperative cancellation.
//!
//! Cancellation is a flag the task polls at its own suspension points;
//! a running task is never killed mid-flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::models::error::RuntimeError;
use crate::runtime::stats;

/// Handed to the task body for cancellation polling.
pub struct TaskContext {
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub struct TaskHandle<T> {
    join: Option<JoinHandle<T>>,
    cancelled: Arc<AtomicBool>,
}

/// Spawn a task on a fresh OS thread.
pub fn spawn<T, F>(body: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&TaskContext) -> T + Send + 'static,
{
    stats::global().record_task_spawned();
    let cancelled = Arc::new(AtomicBool::new(false));
    let context = TaskContext {
        cancelled: cancelled.clone(),
    };

    let join = std::thread::spawn(move || {
        let result = body(&context);
        stats::global().record_task_completed();
        result
    });

    TaskHandle {
        join: Some(join),
        cancelled,
    }
}

impl<T> TaskHandle<T> {
    /// Wait for the task's result.
    pub fn join(mut self) -> Result<T, RuntimeError> {
        match self.join.take() {
            Some(handle) => handle.join().map_err(|_| RuntimeError::TaskCancelled),
            None => Err(RuntimeError::TaskCancelled),
        }
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.join
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawn_and_join_returns_the_result() {
        let handle = spawn(|_ctx| 6 * 7);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn cancellation_is_cooperative() {
        let handle = spawn(|ctx| {
            let mut iterations: u64 = 0;
            while !ctx.is_cancelled() {
                iterations += 1;
                std::thread::sleep(Duration::from_millis(1));
                if iterations > 5_000 {
                    break;
                }
            }
            ctx.is_cancelled()
        });

        std::thread::sleep(Duration::from_millis(20));
        handle.cancel();
        assert!(handle.join().unwrap(), "task must observe the cancel flag");
    }

    #[test]
    fn spawn_updates_runtime_statistics() {
        let before = stats::global().snapshot();
        spawn(|_ctx| ()).join().unwrap();
        let after = stats::global().snapshot();
        assert!(after.tasks_spawned > before.tasks_spawned);
        assert!(after.tasks_completed > before.tasks_completed);
    }
}
