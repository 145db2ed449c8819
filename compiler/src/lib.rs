//! Vesper compiler core.
//!
//! Pipeline: parser -> AST -> semantic analyzer -> annotated AST ->
//! (fast-check cache | code-gen planner) -> runtime contract. The
//! concrete machine-code backend is an external IR consumer.

pub mod cli;
pub mod models;
pub mod runtime;
pub mod services;
pub mod utils;

pub use models::diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use models::source::{FileId, SourceLocation, Span};
pub use services::fastcheck::{FastCheckConfig, FastCheckEngine};
pub use services::pipeline::{check_source, read_source, PipelineOptions};
