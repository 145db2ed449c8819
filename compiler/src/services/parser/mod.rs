//! Recursive-descent parser.
//!
//! One token of lookahead, no backtracking on performance paths. The
//! parser never panics and never aborts: failures become diagnostics and
//! recovery skips to the next top-level delimiter (`;` at module scope,
//! the matching `}` at block scope).

mod annotations;
mod exprs;

use tracing::debug;

use crate::models::ast::{AstKind, AstNode, EnumVariantDecl, NodeId};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::source::{FileId, Span};
use crate::services::lexer::{self, Token, TokenKind};

/// Parse one source file into a `Program` node plus diagnostics.
pub fn parse(source: &str, file_id: FileId) -> (AstNode, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = lexer::tokenize(source, file_id);
    let mut parser = Parser::new(tokens, file_id);
    let program = parser.parse_program();
    diagnostics.extend(parser.diagnostics);
    debug!(
        file = file_id.0,
        diagnostics = diagnostics.len(),
        "parse complete"
    );
    (program, diagnostics)
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    #[allow(dead_code)]
    file_id: FileId,
    pub(crate) diagnostics: Vec<Diagnostic>,
    next_node: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>, file_id: FileId) -> Self {
        Self {
            tokens,
            pos: 0,
            file_id,
            diagnostics: Vec::new(),
            next_node: 0,
        }
    }

    // --- token plumbing ---

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn current_span(&self) -> Span {
        self.current().span
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume `kind` or record an unexpected-token diagnostic.
    pub(crate) fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, ()> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            self.error_here(
                DiagnosticCode::UnexpectedToken,
                format!(
                    "Expected {} {}, found {}",
                    kind.describe(),
                    context,
                    self.current().kind.describe()
                ),
            );
            Err(())
        }
    }

    pub(crate) fn expect_ident(&mut self, context: &str) -> Result<(String, Span), ()> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let span = self.current_span();
                self.advance();
                Ok((name, span))
            }
            other => {
                let message = format!("Expected identifier {}, found {}", context, other.describe());
                self.error_here(DiagnosticCode::UnexpectedToken, message);
                Err(())
            }
        }
    }

    pub(crate) fn error_here(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        let span = self.current_span();
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub(crate) fn node(&mut self, kind: AstKind, span: Span) -> AstNode {
        let id = self.next_id();
        AstNode::new(id, kind, span)
    }

    /// Skip to the next top-level delimiter: a `;` at brace depth zero or
    /// the `}` closing the brace nesting the error occurred in.
    pub(crate) fn recover_to_delimiter(&mut self) {
        let mut depth = 0usize;
        while !self.at_eof() {
            match self.current().kind {
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // --- declarations ---

    fn parse_program(&mut self) -> AstNode {
        let start = self.current_span();
        let mut decls = Vec::new();

        while !self.at_eof() {
            let before = self.pos;
            match self.parse_top_decl() {
                Ok(decl) => decls.push(decl),
                Err(()) => self.recover_to_delimiter(),
            }
            if self.pos == before {
                // Did not consume anything; skip one token so the loop
                // always terminates.
                self.advance();
            }
        }

        let end = self.current_span();
        self.node(AstKind::Program { decls }, start.merge(&end))
    }

    fn parse_top_decl(&mut self) -> Result<AstNode, ()> {
        let annotations = self.parse_annotation_list()?;
        let start = self.current_span();
        let is_public = self.eat(&TokenKind::KwPub);

        let mut decl = match self.current().kind {
            TokenKind::KwImport => self.parse_import()?,
            TokenKind::KwEnum => self.parse_enum(is_public)?,
            TokenKind::KwStruct => self.parse_struct(is_public)?,
            TokenKind::KwConst => self.parse_const(is_public)?,
            TokenKind::KwLet => self.parse_let()?,
            TokenKind::KwExtern | TokenKind::KwFn => self.parse_function(is_public)?,
            _ => {
                let found = self.current().kind.describe();
                self.error_here(
                    DiagnosticCode::UnexpectedToken,
                    format!("Expected a declaration, found {found}"),
                );
                return Err(());
            }
        };

        decl.annotations = annotations;
        decl.span = start.merge(&decl.span);
        Ok(decl)
    }

    fn parse_import(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // import
        let path = match &self.current().kind {
            TokenKind::Str { value, .. } => {
                let path = value.clone();
                self.advance();
                path
            }
            other => {
                let message = format!("Expected import path string, found {}", other.describe());
                self.error_here(DiagnosticCode::UnexpectedToken, message);
                return Err(());
            }
        };
        let end = self.current_span();
        self.expect(TokenKind::Semicolon, "after import path")?;
        Ok(self.node(AstKind::Import { path }, start.merge(&end)))
    }

    /// `enum Name<T> { A, B(Type), C = 4 }` or the explicit empty form
    /// `enum Name { none }`.
    fn parse_enum(&mut self, is_public: bool) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // enum
        let (name, _) = self.expect_ident("after `enum`")?;
        let type_params = self.parse_type_params()?;

        self.expect(TokenKind::LBrace, "to open enum body")?;

        let mut variants = Vec::new();
        if self.eat(&TokenKind::KwNone) {
            // Explicit empty marker; no variants.
        } else if !self.check(&TokenKind::RBrace) {
            loop {
                variants.push(self.parse_enum_variant()?);
                if self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RBrace) {
                        self.error_here(
                            DiagnosticCode::TrailingComma,
                            "Trailing comma is not permitted in enum declarations",
                        );
                        return Err(());
                    }
                    continue;
                }
                break;
            }
        }

        let end = self.current_span();
        self.expect(TokenKind::RBrace, "to close enum body")?;

        Ok(self.node(
            AstKind::EnumDecl {
                name,
                is_public,
                type_params,
                variants,
            },
            start.merge(&end),
        ))
    }

    fn parse_enum_variant(&mut self) -> Result<EnumVariantDecl, ()> {
        let (name, span) = self.expect_ident("as enum variant name")?;

        let mut payload = None;
        let mut value = None;
        if self.eat(&TokenKind::LParen) {
            payload = Some(self.parse_type_expr()?);
            self.expect(TokenKind::RParen, "after variant payload type")?;
        } else if self.eat(&TokenKind::Assign) {
            value = Some(Box::new(self.parse_expr()?));
        }

        Ok(EnumVariantDecl {
            name,
            payload,
            value,
            span,
        })
    }

    /// Type parameter list. Constraints (`T: Trait`) are rejected.
    pub(crate) fn parse_type_params(&mut self) -> Result<Vec<String>, ()> {
        let mut params = Vec::new();
        if !self.eat(&TokenKind::Lt) {
            return Ok(params);
        }

        loop {
            let (name, _) = self.expect_ident("as type parameter")?;
            if self.check(&TokenKind::Colon) {
                self.error_here(
                    DiagnosticCode::UnsupportedConstraint,
                    format!("Type parameter constraints are not supported (on `{name}`)"),
                );
                return Err(());
            }
            params.push(name);
            if self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::Gt) {
                    self.error_here(
                        DiagnosticCode::TrailingComma,
                        "Trailing comma is not permitted in type parameter lists",
                    );
                    return Err(());
                }
                continue;
            }
            break;
        }

        self.expect(TokenKind::Gt, "to close type parameter list")?;
        Ok(params)
    }

    fn parse_struct(&mut self, is_public: bool) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // struct
        let (name, _) = self.expect_ident("after `struct`")?;
        let type_params = self.parse_type_params()?;

        self.expect(TokenKind::LBrace, "to open struct body")?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let annotations = self.parse_annotation_list()?;
            let field_start = self.current_span();
            let field_public = self.eat(&TokenKind::KwPub);
            let (field_name, _) = self.expect_ident("as field name")?;
            self.expect(TokenKind::Colon, "after field name")?;
            let ty = self.parse_type_expr()?;
            let field_end = self.current_span();

            let mut field = self.node(
                AstKind::FieldDecl {
                    name: field_name,
                    is_public: field_public,
                    ty,
                },
                field_start.merge(&field_end),
            );
            field.annotations = annotations;
            fields.push(field);

            if self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    self.error_here(
                        DiagnosticCode::TrailingComma,
                        "Trailing comma is not permitted in struct declarations",
                    );
                    return Err(());
                }
                continue;
            }
            break;
        }

        let end = self.current_span();
        self.expect(TokenKind::RBrace, "to close struct body")?;

        Ok(self.node(
            AstKind::StructDecl {
                name,
                is_public,
                type_params,
                fields,
            },
            start.merge(&end),
        ))
    }

    fn parse_const(&mut self, is_public: bool) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // const
        let (name, _) = self.expect_ident("after `const`")?;
        self.expect(TokenKind::Colon, "after const name")?;
        let ty = self.parse_type_expr()?;
        self.expect(TokenKind::Assign, "in const declaration")?;
        let init = self.parse_expr()?;
        let end = self.current_span();
        self.expect(TokenKind::Semicolon, "after const initializer")?;

        Ok(self.node(
            AstKind::ConstDecl {
                name,
                is_public,
                ty,
                init: Box::new(init),
            },
            start.merge(&end),
        ))
    }

    pub(crate) fn parse_let(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // let
        let is_mutable = self.eat(&TokenKind::KwMut);
        let (name, _) = self.expect_ident("after `let`")?;

        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        self.expect(TokenKind::Assign, "in let declaration")?;
        let init = self.parse_expr()?;
        let end = self.current_span();
        self.expect(TokenKind::Semicolon, "after let initializer")?;

        Ok(self.node(
            AstKind::LetDecl {
                name,
                is_mutable,
                ty,
                init: Box::new(init),
            },
            start.merge(&end),
        ))
    }

    fn parse_function(&mut self, is_public: bool) -> Result<AstNode, ()> {
        let start = self.current_span();
        let is_extern = self.eat(&TokenKind::KwExtern);
        self.expect(TokenKind::KwFn, "to begin function declaration")?;
        let (name, _) = self.expect_ident("as function name")?;
        let type_params = self.parse_type_params()?;

        self.expect(TokenKind::LParen, "to open parameter list")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RParen) {
                        self.error_here(
                            DiagnosticCode::TrailingComma,
                            "Trailing comma is not permitted in parameter lists",
                        );
                        return Err(());
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "to close parameter list")?;

        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        let (body, end) = if self.check(&TokenKind::LBrace) {
            let block = self.parse_block()?;
            let end = block.span;
            (Some(Box::new(block)), end)
        } else {
            let end = self.current_span();
            self.expect(TokenKind::Semicolon, "after bodyless function declaration")?;
            (None, end)
        };

        Ok(self.node(
            AstKind::FunctionDecl {
                name,
                is_public,
                is_extern,
                type_params,
                params,
                return_type,
                body,
            },
            start.merge(&end),
        ))
    }

    fn parse_param(&mut self) -> Result<AstNode, ()> {
        let annotations = self.parse_annotation_list()?;
        let start = self.current_span();
        let (name, _) = self.expect_ident("as parameter name")?;
        self.expect(TokenKind::Colon, "after parameter name")?;
        let ty = self.parse_type_expr()?;
        let end = self.current_span();

        let mut param = self.node(AstKind::Param { name, ty }, start.merge(&end));
        param.annotations = annotations;
        Ok(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ast::AnnotationKind;
    use crate::models::diagnostics::has_errors;
    use crate::models::ownership::{OwnershipTag, TransferMode};

    fn parse_ok(src: &str) -> AstNode {
        let (program, diags) = parse(src, FileId(0));
        assert!(!has_errors(&diags), "unexpected errors: {diags:?}");
        program
    }

    fn parse_err(src: &str) -> Vec<Diagnostic> {
        let (_, diags) = parse(src, FileId(0));
        assert!(has_errors(&diags), "expected errors, got none");
        diags
    }

    fn decls(program: &AstNode) -> &Vec<AstNode> {
        match &program.kind {
            AstKind::Program { decls } => decls,
            other => panic!("expected program, got {other:?}"),
        }
    }

    #[test]
    fn parses_enum_with_variants() {
        let program = parse_ok("enum Color { Red, Green, Blue = 4 }");
        let decls = decls(&program);
        assert_eq!(decls.len(), 1);
        match &decls[0].kind {
            AstKind::EnumDecl { name, variants, .. } => {
                assert_eq!(name, "Color");
                assert_eq!(variants.len(), 3);
                assert!(variants[2].value.is_some());
            }
            other => panic!("expected enum, got {other:?}"),
        }
    }

    #[test]
    fn empty_enum_uses_none_marker() {
        let program = parse_ok("enum Nothing { none }");
        match &decls(&program)[0].kind {
            AstKind::EnumDecl { variants, .. } => assert!(variants.is_empty()),
            other => panic!("expected enum, got {other:?}"),
        }
    }

    #[test]
    fn enum_trailing_comma_is_rejected() {
        let diags = parse_err("enum Color { Red, Green, }");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::TrailingComma));
    }

    #[test]
    fn type_param_constraint_is_rejected() {
        let diags = parse_err("enum Wrap<T: Display> { One(T) }");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UnsupportedConstraint));
    }

    #[test]
    fn parses_generic_enum_with_payload() {
        let program = parse_ok("enum Option<T> { Some(T), None_ }");
        match &decls(&program)[0].kind {
            AstKind::EnumDecl {
                type_params,
                variants,
                ..
            } => {
                assert_eq!(type_params, &vec!["T".to_string()]);
                assert!(variants[0].payload.is_some());
            }
            other => panic!("expected enum, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_with_annotated_params() {
        let program = parse_ok("extern fn write(#[borrowed] buf: *const u8, len: usize) -> i32;");
        match &decls(&program)[0].kind {
            AstKind::FunctionDecl {
                name,
                is_extern,
                params,
                body,
                ..
            } => {
                assert_eq!(name, "write");
                assert!(*is_extern);
                assert!(body.is_none());
                assert_eq!(params.len(), 2);
                assert_eq!(
                    params[0].transfer_annotations(),
                    vec![(TransferMode::Borrowed, params[0].annotations[0].span)]
                );
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn parses_ownership_annotation_on_let() {
        let program = parse_ok("#[ownership(pinned)] let buffer = 0;");
        let decl = &decls(&program)[0];
        assert_eq!(
            decl.ownership_annotation().map(|(tag, _)| tag),
            Some(OwnershipTag::Pinned)
        );
    }

    #[test]
    fn legacy_at_annotation_fails_declaration() {
        let diags = parse_err("@gc let x = 1;");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::LegacyAnnotation));
    }

    #[test]
    fn recovery_continues_after_bad_declaration() {
        let (program, diags) = parse("let = ;\nlet y = 2;", FileId(0));
        assert!(has_errors(&diags));
        // The second declaration still parses.
        assert_eq!(decls(&program).len(), 1);
        match &decls(&program)[0].kind {
            AstKind::LetDecl { name, .. } => assert_eq!(name, "y"),
            other => panic!("expected let, got {other:?}"),
        }
    }

    #[test]
    fn generic_tag_keeps_parameter_order() {
        let program = parse_ok("#[deprecated(since = \"0.3\", note = removal)] fn old() {}");
        let decl = &decls(&program)[0];
        match &decl.annotations[0].kind {
            AnnotationKind::Tag { name, params } => {
                assert_eq!(name, "deprecated");
                assert_eq!(params[0].0, "since");
                assert_eq!(params[1].0, "note");
            }
            other => panic!("expected generic tag, got {other:?}"),
        }
    }
}
