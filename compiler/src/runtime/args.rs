//! Process argument cache.
//!
//! Built lazily on first access and stable for the process lifetime
//! afterwards.

use once_cell::sync::Lazy;

static ARGS: Lazy<Vec<String>> = Lazy::new(|| std::env::args().collect());

/// The command-line arguments as a process-lifetime-stable slice.
pub fn args() -> &'static [String] {
    &ARGS
}
