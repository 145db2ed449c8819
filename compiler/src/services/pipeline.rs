//! Single-file front-end pipeline: read, parse, analyze.
//!
//! Strictly sequential per file; the fast-check engine parallelizes at
//! file granularity above this layer.

use std::fs;
use std::path::Path;

use crate::models::ast::AstNode;
use crate::models::diagnostics::{has_errors, Diagnostic};
use crate::models::error::CompileError;
use crate::models::source::FileId;
use crate::services::analyzer::{self, AnalyzerOptions};
use crate::services::parser;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub strict: bool,
    pub no_stdlib: bool,
}

/// Output of parsing and analyzing one compilation unit.
pub struct CheckedUnit {
    pub program: AstNode,
    /// Parse diagnostics followed by analysis diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    pub scopes: crate::models::symbols::ScopeArena,
    pub const_values: rustc_hash::FxHashMap<
        crate::models::ast::NodeId,
        crate::services::analyzer::const_eval::ConstValue,
    >,
}

impl CheckedUnit {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }

    /// Module-level symbol names, in declaration order.
    pub fn module_symbols(&self) -> Vec<String> {
        let root = self.scopes.root();
        self.scopes
            .table(root)
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Display names of the types resolved on module declarations.
    pub fn resolved_type_names(&self) -> Vec<String> {
        let crate::models::ast::AstKind::Program { decls } = &self.program.kind else {
            return Vec::new();
        };
        decls
            .iter()
            .filter_map(|decl| decl.resolved_type.as_ref())
            .map(|ty| ty.display_name())
            .collect()
    }
}

/// Parse and analyze one source string.
pub fn check_source(source: &str, file_id: FileId, options: &PipelineOptions) -> CheckedUnit {
    let (mut program, mut diagnostics) = parser::parse(source, file_id);
    let analysis = analyzer::analyze(
        &mut program,
        &AnalyzerOptions {
            strict: options.strict,
            no_stdlib: options.no_stdlib,
        },
    );
    diagnostics.extend(analysis.diagnostics);
    CheckedUnit {
        program,
        diagnostics,
        scopes: analysis.scopes,
        const_values: analysis.const_values,
    }
}

/// Read a source file: UTF-8, no byte-order mark. `\n` and `\r\n` line
/// endings both pass through untouched.
pub fn read_source(path: &Path) -> Result<String, CompileError> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => CompileError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => CompileError::Io(err),
    })?;

    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Err(CompileError::BomNotAllowed {
            path: path.to_path_buf(),
        });
    }

    String::from_utf8(bytes).map_err(|_| CompileError::InvalidUtf8 {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn check_source_merges_parse_and_analysis_diagnostics() {
        let unit = check_source(
            "let x: i8 = 128;\nenum E { A, }",
            FileId(0),
            &PipelineOptions::default(),
        );
        assert!(unit.has_errors());
        // One parse error (trailing comma) and one analysis error
        // (literal out of range).
        assert!(unit.diagnostics.len() >= 2);
    }

    #[test]
    fn module_symbols_are_in_declaration_order() {
        let unit = check_source(
            "const A: i32 = 1;\nlet b = 2;\nfn c() {}",
            FileId(0),
            &PipelineOptions {
                no_stdlib: true,
                ..Default::default()
            },
        );
        assert!(!unit.has_errors(), "{:?}", unit.diagnostics);
        assert_eq!(unit.module_symbols(), vec!["A", "b", "c"]);
    }

    #[test]
    fn bom_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.vsp");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"let x = 1;");
        fs::write(&path, bytes).unwrap();

        let err = read_source(&path).unwrap_err();
        assert!(matches!(err, CompileError::BomNotAllowed { .. }));
    }

    #[test]
    fn crlf_sources_read_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crlf.vsp");
        fs::write(&path, "let x = 1;\r\nlet y = 2;\r\n").unwrap();

        let source = read_source(&path).unwrap();
        let unit = check_source(&source, FileId(0), &PipelineOptions::default());
        assert!(!unit.has_errors(), "{:?}", unit.diagnostics);
    }
}
