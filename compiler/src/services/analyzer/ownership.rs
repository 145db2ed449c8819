//! Ownership context extraction and zone validation.
//!
//! Every allocation-producing declaration gets an `OwnershipContext`
//! derived from its annotations. Zone consistency: a pinned member inside
//! a gc container is fine, but gc-managed data inside a manually managed
//! container would escape the collector's view and is rejected.

use crate::models::ast::{AstKind, AstNode};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::ownership::{MemoryZone, OwnershipContext, OwnershipTag};

/// Derive the context for a variable-like declaration. Without an
/// explicit tag, variables default to gc ownership.
pub fn context_for_declaration(node: &AstNode) -> OwnershipContext {
    let tag = node
        .ownership_annotation()
        .map(|(tag, _)| tag)
        .unwrap_or(OwnershipTag::Gc);
    let mut ctx = OwnershipContext::new(tag, node.location());

    if let AstKind::LetDecl { is_mutable, .. } = &node.kind {
        ctx.is_mutable = *is_mutable;
    }
    ctx
}

/// Derive the context for a parameter. Parameters live in the stack zone
/// unless an explicit ownership tag overrides them, and borrowed transfer
/// marks them as non-owning.
pub fn context_for_parameter(node: &AstNode) -> OwnershipContext {
    match node.ownership_annotation() {
        Some((tag, _)) => {
            let mut ctx = OwnershipContext::new(tag, node.location());
            ctx.is_borrowed = true;
            ctx
        }
        None => OwnershipContext::for_parameter(node.location()),
    }
}

/// Validate the fields of a struct declaration against the struct's own
/// ownership discipline.
pub fn validate_struct_zones(node: &AstNode, diagnostics: &mut Vec<Diagnostic>) {
    let AstKind::StructDecl { name, fields, .. } = &node.kind else {
        return;
    };

    let container_tag = node
        .ownership_annotation()
        .map(|(tag, _)| tag)
        .unwrap_or(OwnershipTag::Gc);
    let container_zone = MemoryZone::for_ownership(container_tag);

    for field in fields {
        let Some((field_tag, span)) = field.ownership_annotation() else {
            continue;
        };
        let field_zone = MemoryZone::for_ownership(field_tag);

        if container_zone == MemoryZone::Manual && field_zone == MemoryZone::Gc {
            let field_name = match &field.kind {
                AstKind::FieldDecl { name, .. } => name.as_str(),
                _ => "<field>",
            };
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::ZoneMismatch,
                format!(
                    "gc-managed field `{field_name}` cannot live inside manually managed struct `{name}`"
                ),
                span,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::diagnostics::has_errors;
    use crate::models::source::FileId;
    use crate::services::parser::parse;

    fn first_decl(src: &str) -> AstNode {
        let (program, diags) = parse(src, FileId(0));
        assert!(!has_errors(&diags), "parse errors: {diags:?}");
        let AstKind::Program { mut decls } = program.kind else {
            unreachable!()
        };
        decls.remove(0)
    }

    #[test]
    fn let_defaults_to_gc_zone() {
        let decl = first_decl("let mut counter = 0;");
        let ctx = context_for_declaration(&decl);
        assert_eq!(ctx.ownership, OwnershipTag::Gc);
        assert_eq!(ctx.memory_zone, MemoryZone::Gc);
        assert!(ctx.is_mutable);
        assert!(!ctx.requires_cleanup);
    }

    #[test]
    fn c_ownership_maps_to_manual_zone_with_cleanup() {
        let decl = first_decl("#[ownership(c)] let raw = 0;");
        let ctx = context_for_declaration(&decl);
        assert_eq!(ctx.memory_zone, MemoryZone::Manual);
        assert!(ctx.requires_cleanup);
    }

    #[test]
    fn untagged_parameter_defaults_to_stack() {
        let decl = first_decl("fn f(x: i32) {}");
        let AstKind::FunctionDecl { params, .. } = &decl.kind else {
            unreachable!()
        };
        let ctx = context_for_parameter(&params[0]);
        assert_eq!(ctx.memory_zone, MemoryZone::Stack);
        assert!(ctx.is_borrowed);
    }

    #[test]
    fn pinned_field_inside_gc_struct_is_allowed() {
        let decl = first_decl(
            "#[ownership(gc)] struct Buffer { #[ownership(pinned)] data: *mut u8, len: usize }",
        );
        let mut diags = Vec::new();
        validate_struct_zones(&decl, &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn gc_field_inside_c_struct_is_zone_mismatch() {
        let decl =
            first_decl("#[ownership(c)] struct Raw { #[ownership(gc)] traced: *mut u8 }");
        let mut diags = Vec::new();
        validate_struct_zones(&decl, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::ZoneMismatch);
    }
}
