//! Constant-expression folding.
//!
//! Folds literals, references to other constants, unary and binary
//! operators over constants, and `sizeof(Type)` (which always produces a
//! `usize`). A const expression with a non-const operand is an error at
//! the declaration that required it.

use crate::models::ast::{AstKind, AstNode, BinaryOp, NodeFlags, UnaryOp};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::source::Span;

/// A folded constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i128),
    /// Magnitudes above `i128::MAX`; only reachable through `u128`
    /// literals and bitwise/arithmetic combinations that stay unsigned.
    Uint(u128),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ConstValue {
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            ConstValue::Int(v) => Some(*v),
            ConstValue::Uint(v) => i128::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            ConstValue::Int(v) if *v >= 0 => Some(*v as u128),
            ConstValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ConstValue::Int(_) | ConstValue::Uint(_) | ConstValue::Float(_)
        )
    }
}

/// Resolves `identifier -> const` references for the evaluator.
pub trait ConstResolver {
    fn resolve_const(&self, name: &str) -> Option<ConstValue>;
    fn resolve_sizeof(&self, node: &AstNode) -> Option<u128>;
}

/// Evaluate a constant expression. Returns `Err` with a diagnostic when
/// the expression is not const or folding overflows.
pub fn evaluate(node: &AstNode, resolver: &dyn ConstResolver) -> Result<ConstValue, Diagnostic> {
    match &node.kind {
        AstKind::IntLiteral { magnitude } => {
            if *magnitude <= i128::MAX as u128 {
                Ok(ConstValue::Int(*magnitude as i128))
            } else {
                Ok(ConstValue::Uint(*magnitude))
            }
        }
        AstKind::FloatLiteral { value } => Ok(ConstValue::Float(*value)),
        AstKind::BoolLiteral { value } => Ok(ConstValue::Bool(*value)),
        AstKind::StringLiteral { value, .. } => Ok(ConstValue::Str(value.clone())),
        AstKind::CharLiteral { value } => Ok(ConstValue::Int(*value as i128)),
        AstKind::Identifier { name } => resolver.resolve_const(name).ok_or_else(|| {
            non_const(
                node.span,
                format!("`{name}` is not a constant"),
            )
        }),
        AstKind::SizeOf { .. } => {
            let size = resolver.resolve_sizeof(node).ok_or_else(|| {
                non_const(node.span, "sizeof operand could not be resolved".to_string())
            })?;
            Ok(ConstValue::Uint(size))
        }
        AstKind::Unary { op, operand } => {
            let value = evaluate(operand, resolver)?;
            apply_unary(*op, value, node.span)
        }
        AstKind::Binary { op, lhs, rhs } => {
            let left = evaluate(lhs, resolver)?;
            let right = evaluate(rhs, resolver)?;
            apply_binary(*op, left, right, node.span)
        }
        _ => Err(non_const(
            node.span,
            "expression is not a constant".to_string(),
        )),
    }
}

/// True when analysis has already flagged every operand constant.
pub fn is_const_candidate(node: &AstNode) -> bool {
    node.flags.has(NodeFlags::CONSTANT_EXPR)
}

fn non_const(span: Span, detail: String) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::InvalidExpression,
        format!("Constant expression required: {detail}"),
        span,
    )
}

fn overflow(span: Span) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::InvalidLiteral,
        "Constant expression overflows during folding",
        span,
    )
}

fn apply_unary(op: UnaryOp, value: ConstValue, span: Span) -> Result<ConstValue, Diagnostic> {
    match (op, value) {
        (UnaryOp::Neg, ConstValue::Int(v)) => {
            v.checked_neg().map(ConstValue::Int).ok_or_else(|| overflow(span))
        }
        (UnaryOp::Neg, ConstValue::Float(v)) => Ok(ConstValue::Float(-v)),
        (UnaryOp::Not, ConstValue::Bool(v)) => Ok(ConstValue::Bool(!v)),
        (UnaryOp::BitNot, ConstValue::Int(v)) => Ok(ConstValue::Int(!v)),
        (UnaryOp::BitNot, ConstValue::Uint(v)) => Ok(ConstValue::Uint(!v)),
        (op, value) => Err(non_const(
            span,
            format!("operator {op:?} is not applicable to {value:?}"),
        )),
    }
}

fn apply_binary(
    op: BinaryOp,
    left: ConstValue,
    right: ConstValue,
    span: Span,
) -> Result<ConstValue, Diagnostic> {
    use ConstValue::*;

    // Comparisons and logical connectives first; they produce bools.
    match op {
        BinaryOp::And | BinaryOp::Or => {
            return match (left, right) {
                (Bool(a), Bool(b)) => Ok(Bool(if op == BinaryOp::And { a && b } else { a || b })),
                (left, right) => Err(non_const(
                    span,
                    format!("logical operator over non-bool constants {left:?}, {right:?}"),
                )),
            };
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            return compare(op, left, right, span);
        }
        _ => {}
    }

    // Float arithmetic.
    if let (Float(a), Float(b)) = (&left, &right) {
        let value = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => {
                return Err(non_const(
                    span,
                    format!("operator {} is not applicable to floats", op.symbol()),
                ))
            }
        };
        return Ok(Float(value));
    }

    // Integer arithmetic; prefer unsigned when both sides are unsigned-
    // representable and either side exceeds i128.
    let wide = matches!(left, Uint(_)) || matches!(right, Uint(_));
    if wide {
        let (Some(a), Some(b)) = (left.as_u128(), right.as_u128()) else {
            return Err(non_const(span, "mixed-sign wide constant arithmetic".to_string()));
        };
        return fold_u128(op, a, b, span).map(|v| {
            if v <= i128::MAX as u128 {
                Int(v as i128)
            } else {
                Uint(v)
            }
        });
    }

    let (Some(a), Some(b)) = (left.as_i128(), right.as_i128()) else {
        return Err(non_const(
            span,
            format!("operator {} requires numeric constants", op.symbol()),
        ));
    };
    fold_i128(op, a, b, span).map(Int)
}

fn compare(
    op: BinaryOp,
    left: ConstValue,
    right: ConstValue,
    span: Span,
) -> Result<ConstValue, Diagnostic> {
    use std::cmp::Ordering;

    let ordering = match (&left, &right) {
        (ConstValue::Float(a), ConstValue::Float(b)) => a.partial_cmp(b),
        (ConstValue::Bool(a), ConstValue::Bool(b)) => Some(a.cmp(b)),
        (ConstValue::Str(a), ConstValue::Str(b)) => Some(a.cmp(b)),
        _ => match (left.as_u128(), right.as_u128()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => match (left.as_i128(), right.as_i128()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        },
    };

    let Some(ordering) = ordering else {
        return Err(non_const(span, "incomparable constants".to_string()));
    };

    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("compare called with non-comparison operator"),
    };
    Ok(ConstValue::Bool(result))
}

fn fold_i128(op: BinaryOp, a: i128, b: i128, span: Span) -> Result<i128, Diagnostic> {
    let checked = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(Diagnostic::error(
                    DiagnosticCode::InvalidOperation,
                    "Division by zero in constant expression",
                    span,
                ));
            }
            a.checked_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(Diagnostic::error(
                    DiagnosticCode::InvalidOperation,
                    "Division by zero in constant expression",
                    span,
                ));
            }
            a.checked_rem(b)
        }
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
        BinaryOp::Shr => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
        _ => None,
    };
    checked.ok_or_else(|| overflow(span))
}

fn fold_u128(op: BinaryOp, a: u128, b: u128, span: Span) -> Result<u128, Diagnostic> {
    let checked = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(Diagnostic::error(
                    DiagnosticCode::InvalidOperation,
                    "Division by zero in constant expression",
                    span,
                ));
            }
            a.checked_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(Diagnostic::error(
                    DiagnosticCode::InvalidOperation,
                    "Division by zero in constant expression",
                    span,
                ));
            }
            a.checked_rem(b)
        }
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
        BinaryOp::Shr => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
        _ => None,
    };
    checked.ok_or_else(|| overflow(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ast::NodeId;
    use crate::models::source::{FileId, SourceLocation, Span};

    struct NoConsts;

    impl ConstResolver for NoConsts {
        fn resolve_const(&self, _name: &str) -> Option<ConstValue> {
            None
        }
        fn resolve_sizeof(&self, _node: &AstNode) -> Option<u128> {
            Some(8)
        }
    }

    struct OneConst;

    impl ConstResolver for OneConst {
        fn resolve_const(&self, name: &str) -> Option<ConstValue> {
            (name == "LIMIT").then_some(ConstValue::Int(64))
        }
        fn resolve_sizeof(&self, _node: &AstNode) -> Option<u128> {
            None
        }
    }

    fn span() -> Span {
        Span::point(SourceLocation::start_of(FileId(0)))
    }

    fn node(kind: AstKind) -> AstNode {
        AstNode::new(NodeId(0), kind, span())
    }

    fn int(magnitude: u128) -> AstNode {
        node(AstKind::IntLiteral { magnitude })
    }

    #[test]
    fn folds_binary_arithmetic() {
        let expr = node(AstKind::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(int(6)),
            rhs: Box::new(int(7)),
        });
        assert_eq!(evaluate(&expr, &NoConsts).unwrap(), ConstValue::Int(42));
    }

    #[test]
    fn folds_const_identifier() {
        let expr = node(AstKind::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(node(AstKind::Identifier {
                name: "LIMIT".to_string(),
            })),
            rhs: Box::new(int(1)),
        });
        assert_eq!(evaluate(&expr, &OneConst).unwrap(), ConstValue::Int(65));
    }

    #[test]
    fn non_const_identifier_is_an_error() {
        let expr = node(AstKind::Identifier {
            name: "runtime_value".to_string(),
        });
        let err = evaluate(&expr, &NoConsts).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::InvalidExpression);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let expr = node(AstKind::Binary {
            op: BinaryOp::Div,
            lhs: Box::new(int(1)),
            rhs: Box::new(int(0)),
        });
        let err = evaluate(&expr, &NoConsts).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::InvalidOperation);
    }

    #[test]
    fn negation_of_literal_folds() {
        let expr = node(AstKind::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(int(128)),
        });
        assert_eq!(evaluate(&expr, &NoConsts).unwrap(), ConstValue::Int(-128));
    }

    #[test]
    fn u128_scale_literals_survive_folding() {
        let expr = node(AstKind::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(int(u128::MAX - 1)),
            rhs: Box::new(int(1)),
        });
        assert_eq!(
            evaluate(&expr, &NoConsts).unwrap(),
            ConstValue::Uint(u128::MAX)
        );
    }

    #[test]
    fn sizeof_resolves_through_resolver() {
        use crate::models::ast::{TypeExpr, TypeExprKind};
        let expr = node(AstKind::SizeOf {
            ty: TypeExpr {
                kind: TypeExprKind::Named {
                    name: "u64".to_string(),
                    args: Vec::new(),
                },
                span: span(),
            },
        });
        assert_eq!(evaluate(&expr, &NoConsts).unwrap(), ConstValue::Uint(8));
    }
}
