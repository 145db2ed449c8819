//! Runtime contract consumed by emitted code.
//!
//! This module supplies semantics, not a particular implementation:
//! slice headers with a stable FFI layout, zone-tracked allocation,
//! 128-bit integer operations, the process-wide atomic statistics bag,
//! concurrency primitives, and the lazily built argv slice. The
//! statistics bag and argv cache are the only process-wide state; both
//! initialize at runtime startup and tear down at shutdown.

pub mod alloc;
pub mod args;
pub mod concurrency;
pub mod int128;
pub mod slice;
pub mod stats;

use tracing::error;

/// Runtime startup: initialize process-wide state.
pub fn init() {
    stats::init();
    let _ = args::args();
}

/// Runtime shutdown: flush and log final state.
pub fn shutdown() {
    stats::shutdown();
}

/// Invariant violation in emitted code: log and terminate the process.
/// Recoverable failures travel through result types instead.
pub fn fatal(message: &str) -> ! {
    error!(message, "fatal runtime error");
    std::process::abort();
}
