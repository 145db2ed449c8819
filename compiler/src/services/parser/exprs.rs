//! Statements, expressions, and type references.
//!
//! Expressions use precedence climbing with a single token of lookahead.

use crate::models::ast::{
    AstKind, AstNode, BinaryOp, MatchArm, MatchPattern, TypeExpr, TypeExprKind, UnaryOp,
};
use crate::models::diagnostics::DiagnosticCode;
use crate::services::lexer::TokenKind;

use super::Parser;

impl Parser {
    // --- types ---

    pub(crate) fn parse_type_expr(&mut self) -> Result<TypeExpr, ()> {
        let start = self.current_span();

        // Slice: `[]T` or `[]mut T`
        if self.eat(&TokenKind::LBracket) {
            self.expect(TokenKind::RBracket, "in slice type")?;
            let is_mutable = self.eat(&TokenKind::KwMut);
            let element = self.parse_type_expr()?;
            let span = start.merge(&element.span);
            return Ok(TypeExpr {
                kind: TypeExprKind::Slice {
                    element: Box::new(element),
                    is_mutable,
                },
                span,
            });
        }

        // Pointer: `*mut T` or `*const T`
        if self.eat(&TokenKind::Star) {
            let is_mutable = if self.eat(&TokenKind::KwMut) {
                true
            } else if self.eat(&TokenKind::KwConst) {
                false
            } else {
                self.error_here(
                    DiagnosticCode::UnexpectedToken,
                    "Pointer types require `mut` or `const`",
                );
                return Err(());
            };
            let pointee = self.parse_type_expr()?;
            let span = start.merge(&pointee.span);
            return Ok(TypeExpr {
                kind: TypeExprKind::Pointer {
                    pointee: Box::new(pointee),
                    is_mutable,
                },
                span,
            });
        }

        let (name, name_span) = self.expect_ident("as type name")?;
        let mut args = Vec::new();
        let mut span = start.merge(&name_span);

        if self.eat(&TokenKind::Lt) {
            loop {
                args.push(self.parse_type_expr()?);
                if self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::Gt) {
                        self.error_here(
                            DiagnosticCode::TrailingComma,
                            "Trailing comma is not permitted in type argument lists",
                        );
                        return Err(());
                    }
                    continue;
                }
                break;
            }
            span = span.merge(&self.current_span());
            self.expect(TokenKind::Gt, "to close type argument list")?;
        }

        Ok(TypeExpr {
            kind: TypeExprKind::Named { name, args },
            span,
        })
    }

    // --- statements ---

    pub(crate) fn parse_block(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace, "to open block")?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            // Tolerate stray semicolons between statements.
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            let before = self.pos;
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => {
                    self.recover_to_delimiter();
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }

        let end = self.current_span();
        self.expect(TokenKind::RBrace, "to close block")?;
        Ok(self.node(AstKind::Block { statements }, start.merge(&end)))
    }

    fn parse_statement(&mut self) -> Result<AstNode, ()> {
        match self.current().kind {
            TokenKind::KwLet => self.parse_let(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwMatch => self.parse_match(),
            TokenKind::LBrace => self.parse_block(),
            _ => {
                let start = self.current_span();
                let expr = self.parse_expr()?;
                let end = self.current_span();
                self.expect(TokenKind::Semicolon, "after expression statement")?;
                Ok(self.node(
                    AstKind::ExprStmt {
                        expr: Box::new(expr),
                    },
                    start.merge(&end),
                ))
            }
        }
    }

    fn parse_return(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // return
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let end = self.current_span();
        self.expect(TokenKind::Semicolon, "after return")?;
        Ok(self.node(AstKind::Return { value }, start.merge(&end)))
    }

    fn parse_if(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // if
        let condition = self.parse_expr()?;
        let then_block = self.parse_block()?;

        let else_block = if self.eat(&TokenKind::KwElse) {
            if self.check(&TokenKind::KwIf) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(self.parse_block()?))
            }
        } else {
            None
        };

        let end = else_block
            .as_ref()
            .map(|b| b.span)
            .unwrap_or(then_block.span);
        Ok(self.node(
            AstKind::If {
                condition: Box::new(condition),
                then_block: Box::new(then_block),
                else_block,
            },
            start.merge(&end),
        ))
    }

    fn parse_for(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // for
        let (binding, _) = self.expect_ident("as loop binding")?;
        self.expect(TokenKind::KwIn, "in for loop")?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block()?;
        let end = body.span;
        Ok(self.node(
            AstKind::ForIn {
                binding,
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
            start.merge(&end),
        ))
    }

    fn parse_match(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        self.advance(); // match
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::LBrace, "to open match body")?;

        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let pattern_start = self.current_span();
            let pattern = self.parse_pattern()?;
            let pattern_span = pattern_start.merge(&self.current_span());
            self.expect(TokenKind::FatArrow, "after match pattern")?;
            let body = if self.check(&TokenKind::LBrace) {
                self.parse_block()?
            } else {
                self.parse_expr()?
            };
            arms.push(MatchArm {
                pattern,
                pattern_span,
                body,
            });

            if self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    self.error_here(
                        DiagnosticCode::TrailingComma,
                        "Trailing comma is not permitted in match arms",
                    );
                    return Err(());
                }
                continue;
            }
            break;
        }

        let end = self.current_span();
        self.expect(TokenKind::RBrace, "to close match body")?;
        Ok(self.node(
            AstKind::Match {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            start.merge(&end),
        ))
    }

    fn parse_pattern(&mut self) -> Result<MatchPattern, ()> {
        match &self.current().kind {
            TokenKind::Underscore => {
                self.advance();
                Ok(MatchPattern::Wildcard)
            }
            TokenKind::Minus => {
                self.advance();
                match &self.current().kind {
                    TokenKind::Int { magnitude } => {
                        let magnitude = *magnitude;
                        self.advance();
                        Ok(MatchPattern::IntLiteral {
                            negative: true,
                            magnitude,
                        })
                    }
                    other => {
                        let message =
                            format!("Expected integer after `-`, found {}", other.describe());
                        self.error_here(DiagnosticCode::UnexpectedToken, message);
                        Err(())
                    }
                }
            }
            TokenKind::Int { magnitude } => {
                let magnitude = *magnitude;
                self.advance();
                Ok(MatchPattern::IntLiteral {
                    negative: false,
                    magnitude,
                })
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                let binding = if self.eat(&TokenKind::LParen) {
                    let (binding, _) = self.expect_ident("as payload binding")?;
                    self.expect(TokenKind::RParen, "after payload binding")?;
                    Some(binding)
                } else {
                    None
                };
                Ok(MatchPattern::Variant { name, binding })
            }
            other => {
                let message = format!("Expected match pattern, found {}", other.describe());
                self.error_here(DiagnosticCode::UnexpectedToken, message);
                Err(())
            }
        }
    }

    // --- expressions ---

    pub(crate) fn parse_expr(&mut self) -> Result<AstNode, ()> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<AstNode, ()> {
        let target = self.parse_binary(0)?;
        if self.eat(&TokenKind::Assign) {
            let value = self.parse_assign()?;
            let span = target.span.merge(&value.span);
            return Ok(self.node(
                AstKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                span,
            ));
        }
        Ok(target)
    }

    fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        // Higher binds tighter.
        let entry = match kind {
            TokenKind::PipePipe => (BinaryOp::Or, 1),
            TokenKind::AmpAmp => (BinaryOp::And, 2),
            TokenKind::Pipe => (BinaryOp::BitOr, 3),
            TokenKind::Caret => (BinaryOp::BitXor, 4),
            TokenKind::Amp => (BinaryOp::BitAnd, 5),
            TokenKind::EqEq => (BinaryOp::Eq, 6),
            TokenKind::NotEq => (BinaryOp::Ne, 6),
            TokenKind::Lt => (BinaryOp::Lt, 7),
            TokenKind::Le => (BinaryOp::Le, 7),
            TokenKind::Gt => (BinaryOp::Gt, 7),
            TokenKind::Ge => (BinaryOp::Ge, 7),
            TokenKind::Shl => (BinaryOp::Shl, 8),
            TokenKind::Shr => (BinaryOp::Shr, 8),
            TokenKind::Plus => (BinaryOp::Add, 9),
            TokenKind::Minus => (BinaryOp::Sub, 9),
            TokenKind::Star => (BinaryOp::Mul, 10),
            TokenKind::Slash => (BinaryOp::Div, 10),
            TokenKind::Percent => (BinaryOp::Rem, 10),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<AstNode, ()> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, precedence)) = Self::binary_op(&self.current().kind) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(precedence + 1)?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.node(
                AstKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<AstNode, ()> {
        let start = self.current_span();
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.merge(&operand.span);
            return Ok(self.node(
                AstKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<AstNode, ()> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current().kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat(&TokenKind::Comma) {
                                if self.check(&TokenKind::RParen) {
                                    self.error_here(
                                        DiagnosticCode::TrailingComma,
                                        "Trailing comma is not permitted in argument lists",
                                    );
                                    return Err(());
                                }
                                continue;
                            }
                            break;
                        }
                    }
                    let end = self.current_span();
                    self.expect(TokenKind::RParen, "to close argument list")?;
                    let span = expr.span.merge(&end);
                    expr = self.node(
                        AstKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let end = self.current_span();
                    self.expect(TokenKind::RBracket, "to close index")?;
                    let span = expr.span.merge(&end);
                    expr = self.node(
                        AstKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let (field, field_span) = self.expect_ident("after `.`")?;
                    let span = expr.span.merge(&field_span);
                    expr = self.node(
                        AstKind::FieldAccess {
                            object: Box::new(expr),
                            field,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<AstNode, ()> {
        let span = self.current_span();
        let kind = match &self.current().kind {
            TokenKind::Int { magnitude } => AstKind::IntLiteral {
                magnitude: *magnitude,
            },
            TokenKind::Float { value } => AstKind::FloatLiteral { value: *value },
            TokenKind::Str {
                value,
                is_multiline,
            } => AstKind::StringLiteral {
                value: value.clone(),
                is_multiline: *is_multiline,
            },
            TokenKind::Char { value } => AstKind::CharLiteral { value: *value },
            TokenKind::KwTrue => AstKind::BoolLiteral { value: true },
            TokenKind::KwFalse => AstKind::BoolLiteral { value: false },
            TokenKind::Ident(name) => AstKind::Identifier { name: name.clone() },
            TokenKind::KwSizeof => {
                self.advance();
                self.expect(TokenKind::LParen, "after `sizeof`")?;
                let ty = self.parse_type_expr()?;
                let end = self.current_span();
                self.expect(TokenKind::RParen, "after sizeof type")?;
                return Ok(self.node(AstKind::SizeOf { ty }, span.merge(&end)));
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "to close parenthesized expression")?;
                return Ok(inner);
            }
            other => {
                let message = format!("Expected expression, found {}", other.describe());
                self.error_here(DiagnosticCode::InvalidExpression, message);
                return Err(());
            }
        };

        self.advance();
        Ok(self.node(kind, span))
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::models::ast::{AstKind, AstNode, BinaryOp};
    use crate::models::diagnostics::has_errors;
    use crate::models::source::FileId;

    fn parse_expr_stmt(expr: &str) -> AstNode {
        let src = format!("fn probe() {{ {expr}; }}");
        let (program, diags) = parse(&src, FileId(0));
        assert!(!has_errors(&diags), "unexpected errors: {diags:?}");
        let AstKind::Program { mut decls } = program.kind else {
            unreachable!()
        };
        let AstKind::FunctionDecl { body, .. } = decls.remove(0).kind else {
            unreachable!()
        };
        let AstKind::Block { mut statements } = body.unwrap().kind else {
            unreachable!()
        };
        let AstKind::ExprStmt { expr } = statements.remove(0).kind else {
            unreachable!()
        };
        *expr
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse_expr_stmt("1 + 2 * 3");
        let AstKind::Binary { op, rhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, AstKind::Binary {
            op: BinaryOp::Mul,
            ..
        }));
    }

    #[test]
    fn call_and_field_chain() {
        let expr = parse_expr_stmt("config.cache.get(key)[0]");
        assert!(matches!(expr.kind, AstKind::Index { .. }));
    }

    #[test]
    fn sizeof_takes_a_type() {
        let expr = parse_expr_stmt("sizeof([]u8)");
        assert!(matches!(expr.kind, AstKind::SizeOf { .. }));
    }

    #[test]
    fn comparison_binds_looser_than_shift() {
        let expr = parse_expr_stmt("1 << 2 < 16");
        let AstKind::Binary { op, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Lt);
    }

    #[test]
    fn match_with_arms_parses() {
        let src = "fn f() { match code { Ok_ => 1, Err_(payload) => payload, _ => 0 }; }";
        let (_, diags) = parse(src, FileId(0));
        assert!(!has_errors(&diags), "unexpected errors: {diags:?}");
    }

    #[test]
    fn for_in_loop_parses() {
        let src = "fn f(items: []u32) { for item in items { log(item); } }";
        let (_, diags) = parse(src, FileId(0));
        assert!(!has_errors(&diags), "unexpected errors: {diags:?}");
    }
}
