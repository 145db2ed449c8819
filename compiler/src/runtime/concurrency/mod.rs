//! Concurrency primitives supplied by the runtime: tasks, channels,
//! barriers, semaphores, mutexes, condition variables.
//!
//! Tasks ride preemptive OS threads; suspension points are explicit
//! (channel operations, lock acquisition, condvar waits). Timeouts are
//! best-effort at the OS clock's resolution.

pub mod barrier;
pub mod channel;
pub mod semaphore;
pub mod sync;
pub mod task;

pub use barrier::{Barrier, BarrierWaitResult};
pub use channel::Channel;
pub use semaphore::Semaphore;
pub use sync::{RtCondvar, RtMutex};
pub use task::{spawn, TaskContext, TaskHandle};
