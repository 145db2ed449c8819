//! FFI annotation validation.
//!
//! Per declaration site (parameter or return) at most one transfer
//! annotation may appear, and `borrowed` is valid only on parameters.

use crate::models::ast::{AnnotationKind, AstKind, AstNode};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::ownership::TransferMode;

/// Validate the annotations of a function declaration: each parameter is
/// one declaration site, and the function node itself carries the
/// return-site annotations.
pub fn validate_function_annotations(func: &AstNode, diagnostics: &mut Vec<Diagnostic>) {
    let AstKind::FunctionDecl { params, .. } = &func.kind else {
        return;
    };

    for param in params {
        validate_site(param, false, diagnostics);
    }
    validate_site(func, true, diagnostics);
}

/// Validate one declaration site.
pub fn validate_site(node: &AstNode, is_return: bool, diagnostics: &mut Vec<Diagnostic>) {
    let transfers = node.transfer_annotations();

    if transfers.len() > 1 {
        let (first, _) = transfers[0];
        let (second, span) = transfers[1];
        diagnostics.push(Diagnostic::error(
            DiagnosticCode::ConflictingAnnotations,
            format!(
                "Conflicting FFI transfer annotations `{}` and `{}`",
                first.as_str(),
                second.as_str()
            ),
            span,
        ));
    }

    if is_return {
        if let Some((TransferMode::Borrowed, span)) =
            transfers.iter().find(|(mode, _)| *mode == TransferMode::Borrowed)
        {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::InvalidContext,
                "`borrowed` is not valid on a return type",
                *span,
            ));
        }
    }

    // Misspelled transfer annotations parse as generic tags; surface them
    // here instead of silently carrying unknown metadata into code-gen.
    for annotation in &node.annotations {
        if let AnnotationKind::Tag { name, .. } = &annotation.kind {
            if name.starts_with("transfer") || name == "borrow" {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::UnknownAnnotation,
                    format!("Unknown FFI transfer annotation `{name}`"),
                    annotation.span,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::diagnostics::has_errors;
    use crate::models::source::FileId;
    use crate::services::parser::parse;

    fn first_fn(src: &str) -> (AstNode, Vec<Diagnostic>) {
        let (program, diags) = parse(src, FileId(0));
        assert!(!has_errors(&diags), "parse errors: {diags:?}");
        let AstKind::Program { mut decls } = program.kind else {
            unreachable!()
        };
        (decls.remove(0), Vec::new())
    }

    #[test]
    fn conflicting_transfers_name_the_pair() {
        let (func, mut diags) =
            first_fn("extern fn f(#[transfer_full] #[borrowed] p: *mut u8) -> i32;");
        validate_function_annotations(&func, &mut diags);

        let conflict = diags
            .iter()
            .find(|d| d.code == DiagnosticCode::ConflictingAnnotations)
            .expect("expected a conflict diagnostic");
        assert!(conflict.message.contains("transfer_full"));
        assert!(conflict.message.contains("borrowed"));
    }

    #[test]
    fn borrowed_on_return_is_invalid_context() {
        let (func, mut diags) = first_fn("#[borrowed] extern fn f() -> *const u8;");
        validate_function_annotations(&func, &mut diags);
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::InvalidContext));
    }

    #[test]
    fn single_transfer_per_site_is_clean() {
        let (func, mut diags) = first_fn(
            "#[transfer_full] extern fn dup(#[transfer_none] s: string) -> string;",
        );
        validate_function_annotations(&func, &mut diags);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    }

    #[test]
    fn misspelled_transfer_is_unknown() {
        let (func, mut diags) = first_fn("extern fn f(#[transfer_all] p: *mut u8);");
        validate_function_annotations(&func, &mut diags);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UnknownAnnotation));
    }
}
