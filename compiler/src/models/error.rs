//! Typed error enums for the compiler's non-diagnostic failure paths.
//!
//! Diagnostics (user-facing findings about the source program) live in
//! `models::diagnostics`; these enums cover environmental and internal
//! failures: I/O, cache plumbing, runtime contract violations.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("source is not valid UTF-8: {path}")]
    InvalidUtf8 { path: PathBuf },

    #[error("byte-order mark is not allowed: {path}")]
    BomNotAllowed { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal compiler error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum FastCheckError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("analysis failed for {path}: {reason}")]
    Analysis { path: PathBuf, reason: String },

    #[error("watch loop error: {0}")]
    Watch(String),

    #[error("worker pool error: {0}")]
    Scheduler(String),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("channel is closed")]
    ChannelClosed,

    #[error("channel is full")]
    ChannelFull,

    #[error("channel is empty")]
    ChannelEmpty,

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("barrier cannot be reset while {waiting} parties are waiting")]
    BarrierInUse { waiting: usize },

    #[error("allocation of {size} bytes failed in zone {zone}")]
    AllocationFailed { size: usize, zone: &'static str },

    #[error("buffer too small: need {required} bytes, have {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("slice index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("task was cancelled")]
    TaskCancelled,

    #[error("division by zero")]
    DivisionByZero,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_errors_render_useful_messages() {
        let err = RuntimeError::BufferTooSmall {
            required: 41,
            provided: 16,
        };
        assert_eq!(err.to_string(), "buffer too small: need 41 bytes, have 16");

        let err = RuntimeError::BarrierInUse { waiting: 3 };
        assert!(err.to_string().contains("3 parties"));
    }

    #[test]
    fn compile_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CompileError::from(io);
        assert!(matches!(err, CompileError::Io(_)));
    }
}
