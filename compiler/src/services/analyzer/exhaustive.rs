//! Match exhaustiveness over enum scrutinees.

use rustc_hash::FxHashSet;

use crate::models::ast::{MatchArm, MatchPattern};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::source::Span;
use crate::models::types::{TypeDescriptor, TypeKind};

/// Report enum variants not covered by any arm. A wildcard arm covers
/// everything. Non-enum scrutinees are not checked here.
pub fn check_match_exhaustiveness(
    scrutinee_type: &TypeDescriptor,
    arms: &[MatchArm],
    match_span: Span,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let TypeKind::Enum(enum_type) = scrutinee_type.kind() else {
        return;
    };

    if arms
        .iter()
        .any(|arm| matches!(arm.pattern, MatchPattern::Wildcard))
    {
        return;
    }

    let covered: FxHashSet<&str> = arms
        .iter()
        .filter_map(|arm| match &arm.pattern {
            MatchPattern::Variant { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();

    let missing: Vec<&str> = enum_type
        .variants
        .iter()
        .map(|v| v.name.as_str())
        .filter(|name| !covered.contains(name))
        .collect();

    if !missing.is_empty() {
        diagnostics.push(Diagnostic::warning(
            DiagnosticCode::NonExhaustiveMatch,
            format!(
                "Match over `{}` does not cover variants: {}",
                enum_type.name,
                missing.join(", ")
            ),
            match_span,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ast::{AstKind, AstNode, NodeId};
    use crate::models::source::{FileId, SourceLocation};
    use crate::models::types::{EnumType, EnumVariant};

    fn span() -> Span {
        Span::point(SourceLocation::start_of(FileId(0)))
    }

    fn color_enum() -> TypeDescriptor {
        TypeDescriptor::new(TypeKind::Enum(EnumType {
            name: "Color".to_string(),
            variants: ["Red", "Green", "Blue"]
                .into_iter()
                .map(|name| EnumVariant {
                    name: name.to_string(),
                    payload: None,
                    discriminant: None,
                })
                .collect(),
            is_generic: false,
            type_params: Vec::new(),
        }))
    }

    fn arm(pattern: MatchPattern) -> MatchArm {
        MatchArm {
            pattern,
            pattern_span: span(),
            body: AstNode::new(NodeId(0), AstKind::IntLiteral { magnitude: 0 }, span()),
        }
    }

    fn variant(name: &str) -> MatchArm {
        arm(MatchPattern::Variant {
            name: name.to_string(),
            binding: None,
        })
    }

    #[test]
    fn missing_variants_are_reported() {
        let mut diags = Vec::new();
        check_match_exhaustiveness(
            &color_enum(),
            &[variant("Red")],
            span(),
            &mut diags,
        );
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Green"));
        assert!(diags[0].message.contains("Blue"));
    }

    #[test]
    fn wildcard_covers_everything() {
        let mut diags = Vec::new();
        check_match_exhaustiveness(
            &color_enum(),
            &[variant("Red"), arm(MatchPattern::Wildcard)],
            span(),
            &mut diags,
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn full_coverage_is_clean() {
        let mut diags = Vec::new();
        check_match_exhaustiveness(
            &color_enum(),
            &[variant("Red"), variant("Green"), variant("Blue")],
            span(),
            &mut diags,
        );
        assert!(diags.is_empty());
    }
}
