//! Expression analysis with expected-type propagation.
//!
//! Integer literals adopt the expected type when it is
//! integer-compatible and default to `i32` otherwise; every literal is
//! bounds-checked against its resolved type. Identifier resolution marks
//! symbols used and suggests near-miss names for undefined ones.

use crate::models::ast::{AstKind, AstNode, BinaryOp, NodeFlags, UnaryOp};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::source::Span;
use crate::models::symbols::{ScopeId, SymbolKind};
use crate::models::types::{value_fits, TypeDescriptor, TypeKind};
use crate::utils::helpers::best_suggestion;

use super::strings::normalize_multiline;
use super::SemanticAnalyzer;

impl SemanticAnalyzer {
    /// Analyze one expression, writing the resolved type and flags onto
    /// the node. `expected` is the type implied by context, if any.
    pub(crate) fn analyze_expr(
        &mut self,
        node: &mut AstNode,
        expected: Option<&TypeDescriptor>,
        scope: ScopeId,
    ) -> Option<TypeDescriptor> {
        let span = node.span;
        let mut is_const = false;
        let mut has_side_effects = false;
        let mut is_lvalue = false;

        let resolved: Option<TypeDescriptor> = match &mut node.kind {
            AstKind::IntLiteral { magnitude } => {
                is_const = true;
                let magnitude = *magnitude;
                Some(self.int_literal_type(magnitude, false, expected, span))
            }
            AstKind::FloatLiteral { .. } => {
                is_const = true;
                match expected {
                    Some(ty) if ty.is_float() => Some(ty.clone()),
                    _ => Some(self.builtins.f64()),
                }
            }
            AstKind::BoolLiteral { .. } => {
                is_const = true;
                Some(self.builtins.bool())
            }
            AstKind::CharLiteral { value } => {
                is_const = true;
                let value = *value;
                if value > 255 {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::InvalidLiteral,
                        format!("Character literal U+{value:04X} is outside the ASCII range (max 255)"),
                        span,
                    ));
                }
                if self.strict && expected.is_none() {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::TypeAnnotationRequired,
                        "Character literals require an explicit type annotation in strict mode",
                        span,
                    ));
                }
                Some(self.builtins.char())
            }
            AstKind::StringLiteral {
                value,
                is_multiline,
            } => {
                is_const = true;
                if *is_multiline {
                    *value = normalize_multiline(value);
                }
                Some(self.builtins.string())
            }
            AstKind::Identifier { name } => {
                let name = name.clone();
                match self.scopes.mark_used(scope, &name) {
                    Some(found_scope) => {
                        let entry = self
                            .scopes
                            .table(found_scope)
                            .lookup_local(&name)
                            .expect("entry just resolved");
                        is_const = entry.kind == SymbolKind::Const;
                        is_lvalue = matches!(
                            entry.kind,
                            SymbolKind::Variable | SymbolKind::Parameter
                        );
                        entry.ty.clone()
                    }
                    None => {
                        let names = self.scopes.visible_names(scope);
                        let mut diag = Diagnostic::error(
                            DiagnosticCode::UndefinedSymbol,
                            format!("Undefined symbol `{name}`"),
                            span,
                        );
                        if let Some(suggestion) =
                            best_suggestion(&name, names.iter().map(String::as_str))
                        {
                            diag = diag.with_suggestion(suggestion);
                        }
                        self.diagnostics.push(diag);
                        None
                    }
                }
            }
            AstKind::Unary { op, operand } => {
                let op = *op;

                // Fold sign into integer literals so `-128` range-checks
                // as one value, not as `neg(128)`.
                if op == UnaryOp::Neg {
                    if let AstKind::IntLiteral { magnitude } = operand.kind {
                        is_const = true;
                        let ty = self.int_literal_type(magnitude, true, expected, span);
                        operand.resolved_type = Some(ty.clone());
                        operand.flags.set(NodeFlags::CONSTANT_EXPR);
                        Some(ty)
                    } else {
                        let operand_type = self.analyze_expr(operand, expected, scope);
                        is_const = operand.is_constant_expr();
                        self.check_unary(op, operand_type, operand.span)
                    }
                } else {
                    let expected = match op {
                        UnaryOp::Not => Some(self.builtins.bool()),
                        _ => expected.cloned(),
                    };
                    let operand_type = self.analyze_expr(operand, expected.as_ref(), scope);
                    is_const = operand.is_constant_expr();
                    self.check_unary(op, operand_type, operand.span)
                }
            }
            AstKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let operand_expected = if op.is_comparison() || op.is_logical() {
                    if op.is_logical() {
                        Some(self.builtins.bool())
                    } else {
                        None
                    }
                } else {
                    expected.cloned()
                };

                let left = self.analyze_expr(lhs, operand_expected.as_ref(), scope);
                let rhs_expected = left.clone().or(operand_expected);
                let right = self.analyze_expr(rhs, rhs_expected.as_ref(), scope);
                is_const = lhs.is_constant_expr() && rhs.is_constant_expr();

                self.check_binary(op, left, right, span)
            }
            AstKind::Assign { target, value } => {
                has_side_effects = true;
                let target_type = self.analyze_expr(target, None, scope);
                self.check_assign_target(target, scope);
                target.flags.set(NodeFlags::LVALUE);
                let value_type = self.analyze_expr(value, target_type.as_ref(), scope);

                if let (Some(expected), Some(actual)) = (&target_type, &value_type) {
                    if expected != actual {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::TypeMismatch,
                            format!("Type mismatch: cannot assign `{actual}` to `{expected}`"),
                            span,
                        ));
                    }
                }
                Some(self.builtins.void())
            }
            AstKind::Call { callee, args } => {
                has_side_effects = true;
                let callee_type = self.analyze_expr(callee, None, scope);

                match callee_type.as_ref().map(TypeDescriptor::kind) {
                    Some(TypeKind::Function {
                        params,
                        return_type,
                    }) => {
                        let params = params.clone();
                        let return_type = return_type.clone();

                        if args.len() != params.len() {
                            self.diagnostics.push(Diagnostic::error(
                                DiagnosticCode::TypeMismatch,
                                format!(
                                    "Call expects {} argument(s), found {}",
                                    params.len(),
                                    args.len()
                                ),
                                span,
                            ));
                        }
                        for (arg, param_type) in args.iter_mut().zip(params.iter()) {
                            let arg_type = self.analyze_expr(arg, Some(param_type), scope);
                            if let Some(arg_type) = arg_type {
                                if arg_type != *param_type {
                                    self.diagnostics.push(Diagnostic::error(
                                        DiagnosticCode::TypeMismatch,
                                        format!(
                                            "Argument type mismatch: expected `{param_type}`, found `{arg_type}`"
                                        ),
                                        arg.span,
                                    ));
                                }
                            }
                        }
                        // Extra arguments still get analyzed.
                        for arg in args.iter_mut().skip(params.len()) {
                            self.analyze_expr(arg, None, scope);
                        }
                        Some(return_type)
                    }
                    Some(_) => {
                        for arg in args.iter_mut() {
                            self.analyze_expr(arg, None, scope);
                        }
                        let found = callee_type
                            .as_ref()
                            .map(|t| t.display_name())
                            .unwrap_or_default();
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::InvalidOperation,
                            format!("Cannot call a value of type `{found}`"),
                            callee.span,
                        ));
                        None
                    }
                    None => {
                        for arg in args.iter_mut() {
                            self.analyze_expr(arg, None, scope);
                        }
                        None
                    }
                }
            }
            AstKind::FieldAccess { object, field } => {
                let field = field.clone();
                let object_type = self.analyze_expr(object, None, scope);
                is_lvalue = true;

                match object_type.as_ref().map(TypeDescriptor::kind) {
                    Some(TypeKind::Struct(struct_type)) => {
                        match struct_type.fields.lookup_local(&field) {
                            Some(entry) => entry.ty.clone(),
                            None => {
                                let candidates: Vec<String> =
                                    struct_type.fields.names().map(str::to_string).collect();
                                let mut diag = Diagnostic::error(
                                    DiagnosticCode::UndefinedSymbol,
                                    format!(
                                        "Struct `{}` has no field `{field}`",
                                        struct_type.name
                                    ),
                                    span,
                                );
                                if let Some(suggestion) =
                                    best_suggestion(&field, candidates.iter().map(String::as_str))
                                {
                                    diag = diag.with_suggestion(suggestion);
                                }
                                self.diagnostics.push(diag);
                                None
                            }
                        }
                    }
                    Some(_) => {
                        let found = object_type
                            .as_ref()
                            .map(|t| t.display_name())
                            .unwrap_or_default();
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::InvalidOperation,
                            format!("Type `{found}` has no fields"),
                            span,
                        ));
                        None
                    }
                    None => None,
                }
            }
            AstKind::Index { object, index } => {
                is_lvalue = true;
                let object_type = self.analyze_expr(object, None, scope);
                let usize_ty = self.builtins.usize();
                self.analyze_expr(index, Some(&usize_ty), scope);

                match object_type.as_ref().map(TypeDescriptor::kind) {
                    Some(TypeKind::Slice { element, .. }) => Some(element.clone()),
                    Some(_) => {
                        let found = object_type
                            .as_ref()
                            .map(|t| t.display_name())
                            .unwrap_or_default();
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::InvalidOperation,
                            format!("Cannot index a value of type `{found}`"),
                            span,
                        ));
                        None
                    }
                    None => None,
                }
            }
            AstKind::SizeOf { ty } => {
                is_const = true;
                let ty = ty.clone();
                self.resolve_type(&ty, scope);
                Some(self.builtins.usize())
            }
            AstKind::Error => None,
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::InvalidExpression,
                    "Expected an expression",
                    span,
                ));
                None
            }
        };

        if is_const {
            node.flags.set(NodeFlags::CONSTANT_EXPR);
        }
        if has_side_effects {
            node.flags.set(NodeFlags::SIDE_EFFECTS);
        }
        if is_lvalue {
            node.flags.set(NodeFlags::LVALUE);
        }
        node.resolved_type = resolved.clone();
        resolved
    }

    /// Resolve an integer literal's type from context (default `i32`)
    /// and bounds-check the value against it.
    fn int_literal_type(
        &mut self,
        magnitude: u128,
        negative: bool,
        expected: Option<&TypeDescriptor>,
        span: Span,
    ) -> TypeDescriptor {
        let ty = match expected {
            Some(expected) if expected.is_integer() => expected.clone(),
            _ => self.builtins.i32(),
        };

        if let TypeKind::Integer { signed, width } = ty.kind() {
            if !value_fits(*signed, *width, negative, magnitude) {
                let sign = if negative { "-" } else { "" };
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::InvalidLiteral,
                    format!(
                        "Integer literal {sign}{magnitude} exceeds range of type {}",
                        ty.display_name()
                    ),
                    span,
                ));
            }
        }
        ty
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand_type: Option<TypeDescriptor>,
        span: Span,
    ) -> Option<TypeDescriptor> {
        let operand_type = operand_type?;
        match op {
            UnaryOp::Neg => {
                if !operand_type.is_numeric() {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::InvalidOperation,
                        format!("Cannot negate a value of type `{operand_type}`"),
                        span,
                    ));
                    return None;
                }
                Some(operand_type)
            }
            UnaryOp::Not => {
                if !operand_type.is_bool() {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::TypeMismatch,
                        format!("`!` requires `bool`, found `{operand_type}`"),
                        span,
                    ));
                    return None;
                }
                Some(operand_type)
            }
            UnaryOp::BitNot => {
                if !operand_type.is_integer() {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::InvalidOperation,
                        format!("`~` requires an integer, found `{operand_type}`"),
                        span,
                    ));
                    return None;
                }
                Some(operand_type)
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: Option<TypeDescriptor>,
        right: Option<TypeDescriptor>,
        span: Span,
    ) -> Option<TypeDescriptor> {
        if op.is_logical() {
            for side in [&left, &right].into_iter().flatten() {
                if !side.is_bool() {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::TypeMismatch,
                        format!("`{}` requires `bool` operands, found `{side}`", op.symbol()),
                        span,
                    ));
                }
            }
            return Some(self.builtins.bool());
        }

        if op.is_comparison() {
            if let (Some(left), Some(right)) = (&left, &right) {
                if left != right {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::TypeMismatch,
                        format!("Cannot compare `{left}` with `{right}`"),
                        span,
                    ));
                }
            }
            return Some(self.builtins.bool());
        }

        // Arithmetic, bitwise, and shifts. Shift widths may differ from
        // the value operand; everything else must agree.
        let is_shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr);
        if let (Some(left), Some(right)) = (&left, &right) {
            if !is_shift && left != right {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "Operator `{}` requires matching operand types, found `{left}` and `{right}`",
                        op.symbol()
                    ),
                    span,
                ));
            }
        }

        let bitwise = matches!(
            op,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        );
        for side in [&left, &right].into_iter().flatten() {
            let valid = if bitwise {
                side.is_integer()
            } else {
                side.is_numeric()
            };
            if !valid {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::InvalidOperation,
                    format!(
                        "Operator `{}` is not defined for `{side}`",
                        op.symbol()
                    ),
                    span,
                ));
                return None;
            }
        }

        left.or(right)
    }

    fn check_assign_target(&mut self, target: &AstNode, scope: ScopeId) {
        match &target.kind {
            AstKind::Identifier { name } => {
                if let Some(entry) = self.scopes.lookup_chain(scope, name) {
                    if !entry.is_mutable {
                        let name = name.clone();
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::InvalidOperation,
                            format!("Cannot assign to immutable binding `{name}`"),
                            target.span,
                        ));
                    }
                }
            }
            AstKind::Index { object, .. } => {
                if let Some(TypeKind::Slice { is_mutable, .. }) =
                    object.resolved_type.as_ref().map(TypeDescriptor::kind)
                {
                    if !*is_mutable {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::InvalidOperation,
                            "Cannot assign through an immutable slice",
                            target.span,
                        ));
                    }
                }
            }
            AstKind::FieldAccess { .. } => {}
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::InvalidExpression,
                    "Invalid assignment target",
                    target.span,
                ));
            }
        }
    }
}
