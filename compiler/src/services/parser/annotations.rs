//! Annotation parsing: `#[...]` lists attached to declarations.
//!
//! The legacy `@name` form is recognized only to emit a migration
//! diagnostic; it fails the surrounding declaration.

use crate::models::ast::{
    Annotation, AnnotationKind, AnnotationList, AnnotationValue, ReviewPriority, SecurityTag,
};
use crate::models::diagnostics::DiagnosticCode;
use crate::models::ownership::{OwnershipTag, TransferMode};
use crate::services::lexer::TokenKind;

use super::Parser;

impl Parser {
    /// Zero or more annotations preceding a declaration.
    pub(crate) fn parse_annotation_list(&mut self) -> Result<AnnotationList, ()> {
        let mut list = AnnotationList::new();

        loop {
            match self.current().kind {
                TokenKind::At => {
                    self.error_here(
                        DiagnosticCode::LegacyAnnotation,
                        "Legacy `@name` annotations are no longer supported; use `#[name]`",
                    );
                    return Err(());
                }
                TokenKind::Hash => {
                    list.push(self.parse_annotation()?);
                }
                _ => break,
            }
        }

        Ok(list)
    }

    fn parse_annotation(&mut self) -> Result<Annotation, ()> {
        let start = self.current_span();
        self.advance(); // '#'
        self.expect(TokenKind::LBracket, "to open annotation")?;

        if self.at_eof() {
            self.error_here(
                DiagnosticCode::UnterminatedConstruct,
                "Unterminated annotation",
            );
            return Err(());
        }

        let (name, _) = self.expect_ident("as annotation name")?;

        let kind = match name.as_str() {
            "ownership" => self.parse_ownership_annotation()?,
            "transfer_full" => AnnotationKind::Transfer(TransferMode::Full),
            "transfer_none" => AnnotationKind::Transfer(TransferMode::None),
            "borrowed" => AnnotationKind::Transfer(TransferMode::Borrowed),
            "constant_time" => AnnotationKind::Security(SecurityTag::ConstantTime),
            "volatile_memory" => AnnotationKind::Security(SecurityTag::VolatileMemory),
            "review" => self.parse_review_annotation()?,
            _ => {
                let params = self.parse_tag_params()?;
                AnnotationKind::Tag { name, params }
            }
        };

        // Transfer and security annotations take no parameter list.
        if matches!(
            kind,
            AnnotationKind::Transfer(_) | AnnotationKind::Security(_)
        ) && self.check(&TokenKind::LParen)
        {
            self.error_here(
                DiagnosticCode::UnexpectedToken,
                "This annotation takes no parameters",
            );
            return Err(());
        }

        let end = self.current_span();
        if self.at_eof() {
            self.error_here(
                DiagnosticCode::UnterminatedConstruct,
                "Unterminated annotation (missing `]`)",
            );
            return Err(());
        }
        self.expect(TokenKind::RBracket, "to close annotation")?;

        Ok(Annotation {
            kind,
            span: start.merge(&end),
        })
    }

    /// `ownership(gc | c | pinned)` short form.
    fn parse_ownership_annotation(&mut self) -> Result<AnnotationKind, ()> {
        self.expect(TokenKind::LParen, "after `ownership`")?;
        let (keyword, _) = self.expect_ident("as ownership keyword")?;

        let tag = match OwnershipTag::parse(&keyword) {
            Some(tag) => tag,
            None => {
                self.error_here(
                    DiagnosticCode::UnknownAnnotation,
                    format!("Unknown ownership keyword `{keyword}` (expected gc, c, or pinned)"),
                );
                return Err(());
            }
        };

        self.expect(TokenKind::RParen, "after ownership keyword")?;
        Ok(AnnotationKind::Ownership(tag))
    }

    fn parse_review_annotation(&mut self) -> Result<AnnotationKind, ()> {
        self.expect(TokenKind::LParen, "after `review`")?;
        let (keyword, _) = self.expect_ident("as review priority")?;

        let priority = match ReviewPriority::parse(&keyword) {
            Some(priority) => priority,
            None => {
                self.error_here(
                    DiagnosticCode::UnknownAnnotation,
                    format!("Unknown review priority `{keyword}` (expected low, medium, or high)"),
                );
                return Err(());
            }
        };

        self.expect(TokenKind::RParen, "after review priority")?;
        Ok(AnnotationKind::Review(priority))
    }

    /// Generic tag parameters: either the explicit empty marker `(none)`
    /// or `(name = value, ...)` with no trailing comma.
    fn parse_tag_params(&mut self) -> Result<Vec<(String, AnnotationValue)>, ()> {
        let mut params = Vec::new();
        if !self.eat(&TokenKind::LParen) {
            return Ok(params);
        }

        if self.eat(&TokenKind::KwNone) {
            self.expect(TokenKind::RParen, "after `none`")?;
            return Ok(params);
        }

        loop {
            let (key, _) = self.expect_ident("as annotation parameter name")?;
            self.expect(TokenKind::Assign, "after annotation parameter name")?;
            let value = self.parse_tag_value()?;
            params.push((key, value));

            if self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RParen) {
                    self.error_here(
                        DiagnosticCode::TrailingComma,
                        "Trailing comma is not permitted in annotation parameters",
                    );
                    return Err(());
                }
                continue;
            }
            break;
        }

        self.expect(TokenKind::RParen, "to close annotation parameters")?;
        Ok(params)
    }

    fn parse_tag_value(&mut self) -> Result<AnnotationValue, ()> {
        let value = match &self.current().kind {
            TokenKind::Str { value, .. } => AnnotationValue::Str(value.clone()),
            TokenKind::Int { magnitude } => {
                let magnitude = *magnitude;
                if magnitude > i64::MAX as u128 {
                    self.error_here(
                        DiagnosticCode::InvalidLiteral,
                        "Annotation integer parameter out of range",
                    );
                    return Err(());
                }
                AnnotationValue::Int(magnitude as i64)
            }
            TokenKind::KwTrue => AnnotationValue::Bool(true),
            TokenKind::KwFalse => AnnotationValue::Bool(false),
            TokenKind::Ident(name) => AnnotationValue::Ident(name.clone()),
            other => {
                let message = format!(
                    "Expected string, identifier, integer, or boolean, found {}",
                    other.describe()
                );
                self.error_here(DiagnosticCode::UnexpectedToken, message);
                return Err(());
            }
        };
        self.advance();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::models::ast::{AnnotationKind, AnnotationValue, AstKind, ReviewPriority};
    use crate::models::diagnostics::{has_errors, DiagnosticCode};
    use crate::models::source::FileId;

    fn first_decl_annotations(src: &str) -> Vec<AnnotationKind> {
        let (program, diags) = parse(src, FileId(0));
        assert!(!has_errors(&diags), "unexpected errors: {diags:?}");
        match &program.kind {
            AstKind::Program { decls } => decls[0]
                .annotations
                .iter()
                .map(|a| a.kind.clone())
                .collect(),
            _ => unreachable!(),
        }
    }

    fn error_codes(src: &str) -> Vec<DiagnosticCode> {
        let (_, diags) = parse(src, FileId(0));
        diags.into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn explicit_empty_marker_yields_no_params() {
        let annotations = first_decl_annotations("#[inline(none)] fn f() {}");
        match &annotations[0] {
            AnnotationKind::Tag { name, params } => {
                assert_eq!(name, "inline");
                assert!(params.is_empty());
            }
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn tag_values_cover_all_literal_kinds() {
        let annotations = first_decl_annotations(
            "#[probe(label = \"hot\", target = cache, depth = 3, enabled = true)] fn f() {}",
        );
        match &annotations[0] {
            AnnotationKind::Tag { params, .. } => {
                assert_eq!(params[0].1, AnnotationValue::Str("hot".to_string()));
                assert_eq!(params[1].1, AnnotationValue::Ident("cache".to_string()));
                assert_eq!(params[2].1, AnnotationValue::Int(3));
                assert_eq!(params[3].1, AnnotationValue::Bool(true));
            }
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn review_priority_parses() {
        let annotations = first_decl_annotations("#[review(high)] fn f() {}");
        assert_eq!(annotations[0], AnnotationKind::Review(ReviewPriority::High));
    }

    #[test]
    fn unknown_ownership_keyword_is_reported() {
        let codes = error_codes("#[ownership(heap)] let x = 1;");
        assert!(codes.contains(&DiagnosticCode::UnknownAnnotation));
    }

    #[test]
    fn trailing_comma_in_params_is_reported() {
        let codes = error_codes("#[probe(depth = 3,)] fn f() {}");
        assert!(codes.contains(&DiagnosticCode::TrailingComma));
    }

    #[test]
    fn missing_bracket_is_reported() {
        let codes = error_codes("#[inline fn f() {}");
        assert!(
            codes.contains(&DiagnosticCode::UnexpectedToken)
                || codes.contains(&DiagnosticCode::UnterminatedConstruct)
        );
    }

    #[test]
    fn unterminated_annotation_at_eof_is_reported() {
        let codes = error_codes("#[inline");
        assert!(codes.contains(&DiagnosticCode::UnterminatedConstruct));
    }
}
