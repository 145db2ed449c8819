//! AST nodes, annotations, and node flags.
//!
//! Nodes form trees: every node exclusively owns its children, and child
//! order is semantically meaningful (argument order, field order,
//! statement order). Cross-references into the tree are weak `NodeId`s.
//! Resolved types are filled in by semantic analysis, never by parsing.

use smallvec::SmallVec;

use crate::models::ownership::{OwnershipContext, OwnershipTag, TransferMode};
use crate::models::source::{SourceLocation, Span};
use crate::models::types::TypeDescriptor;

/// Weak handle to an AST node, assigned by the parser in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Bit-packed node facts for quick filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const CONSTANT_EXPR: u8 = 0b0000_0001;
    pub const SIDE_EFFECTS: u8 = 0b0000_0010;
    pub const LVALUE: u8 = 0b0000_0100;
    pub const USED: u8 = 0b0000_1000;
    /// Lexically after a never-typed call; elided during code generation.
    pub const UNREACHABLE: u8 = 0b0001_0000;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn unset(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    pub fn has(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTag {
    ConstantTime,
    VolatileMemory,
}

impl SecurityTag {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "constant_time" => Some(SecurityTag::ConstantTime),
            "volatile_memory" => Some(SecurityTag::VolatileMemory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReviewPriority {
    Low,
    Medium,
    High,
}

impl ReviewPriority {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "low" => Some(ReviewPriority::Low),
            "medium" => Some(ReviewPriority::Medium),
            "high" => Some(ReviewPriority::High),
            _ => None,
        }
    }
}

/// Literal values allowed in annotation parameter lists.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Str(String),
    Ident(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    Ownership(OwnershipTag),
    Transfer(TransferMode),
    Security(SecurityTag),
    Review(ReviewPriority),
    /// Generic semantic tag: name plus ordered `name = value` parameters.
    Tag {
        name: String,
        params: Vec<(String, AnnotationValue)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub span: Span,
}

impl Annotation {
    pub fn as_transfer(&self) -> Option<(TransferMode, Span)> {
        match &self.kind {
            AnnotationKind::Transfer(mode) => Some((*mode, self.span)),
            _ => None,
        }
    }

    pub fn as_ownership(&self) -> Option<(OwnershipTag, Span)> {
        match &self.kind {
            AnnotationKind::Ownership(tag) => Some((*tag, self.span)),
            _ => None,
        }
    }
}

/// Annotation lists are almost always short; keep them inline.
pub type AnnotationList = SmallVec<[Annotation; 2]>;

/// Syntactic reference to a type, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    Named {
        name: String,
        args: Vec<TypeExpr>,
    },
    Slice {
        element: Box<TypeExpr>,
        is_mutable: bool,
    },
    Pointer {
        pointee: Box<TypeExpr>,
        is_mutable: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchPattern {
    /// An enum variant, optionally binding its payload.
    Variant {
        name: String,
        binding: Option<String>,
    },
    IntLiteral {
        negative: bool,
        magnitude: u128,
    },
    Wildcard,
}

#[derive(Debug)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub pattern_span: Span,
    pub body: AstNode,
}

#[derive(Debug)]
pub struct EnumVariantDecl {
    pub name: String,
    pub payload: Option<TypeExpr>,
    /// Explicit `Variant = expr` discriminant.
    pub value: Option<Box<AstNode>>,
    pub span: Span,
}

#[derive(Debug)]
pub enum AstKind {
    Program {
        decls: Vec<AstNode>,
    },
    Import {
        path: String,
    },
    FunctionDecl {
        name: String,
        is_public: bool,
        is_extern: bool,
        type_params: Vec<String>,
        params: Vec<AstNode>,
        return_type: Option<TypeExpr>,
        body: Option<Box<AstNode>>,
    },
    Param {
        name: String,
        ty: TypeExpr,
    },
    StructDecl {
        name: String,
        is_public: bool,
        type_params: Vec<String>,
        fields: Vec<AstNode>,
    },
    FieldDecl {
        name: String,
        is_public: bool,
        ty: TypeExpr,
    },
    EnumDecl {
        name: String,
        is_public: bool,
        type_params: Vec<String>,
        variants: Vec<EnumVariantDecl>,
    },
    ConstDecl {
        name: String,
        is_public: bool,
        ty: TypeExpr,
        init: Box<AstNode>,
    },
    LetDecl {
        name: String,
        is_mutable: bool,
        ty: Option<TypeExpr>,
        init: Box<AstNode>,
    },
    Block {
        statements: Vec<AstNode>,
    },
    ExprStmt {
        expr: Box<AstNode>,
    },
    Return {
        value: Option<Box<AstNode>>,
    },
    If {
        condition: Box<AstNode>,
        then_block: Box<AstNode>,
        else_block: Option<Box<AstNode>>,
    },
    ForIn {
        binding: String,
        iterable: Box<AstNode>,
        body: Box<AstNode>,
    },
    Match {
        scrutinee: Box<AstNode>,
        arms: Vec<MatchArm>,
    },
    IntLiteral {
        magnitude: u128,
    },
    FloatLiteral {
        value: f64,
    },
    StringLiteral {
        value: String,
        is_multiline: bool,
    },
    CharLiteral {
        value: u32,
    },
    BoolLiteral {
        value: bool,
    },
    Identifier {
        name: String,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<AstNode>,
    },
    Assign {
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    Call {
        callee: Box<AstNode>,
        args: Vec<AstNode>,
    },
    FieldAccess {
        object: Box<AstNode>,
        field: String,
    },
    Index {
        object: Box<AstNode>,
        index: Box<AstNode>,
    },
    SizeOf {
        ty: TypeExpr,
    },
    /// Placeholder emitted during error recovery.
    Error,
}

#[derive(Debug)]
pub struct AstNode {
    pub id: NodeId,
    pub kind: AstKind,
    pub span: Span,
    pub annotations: AnnotationList,
    /// Filled during semantic analysis; `None` straight out of the parser.
    pub resolved_type: Option<TypeDescriptor>,
    pub flags: NodeFlags,
    /// Attached by the analyzer to allocation-producing declarations.
    pub ownership: Option<OwnershipContext>,
}

impl AstNode {
    pub fn new(id: NodeId, kind: AstKind, span: Span) -> Self {
        Self {
            id,
            kind,
            span,
            annotations: AnnotationList::new(),
            resolved_type: None,
            flags: NodeFlags::new(),
            ownership: None,
        }
    }

    pub fn location(&self) -> SourceLocation {
        self.span.start
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            AstKind::IntLiteral { .. }
                | AstKind::FloatLiteral { .. }
                | AstKind::StringLiteral { .. }
                | AstKind::CharLiteral { .. }
                | AstKind::BoolLiteral { .. }
        )
    }

    pub fn is_constant_expr(&self) -> bool {
        self.flags.has(NodeFlags::CONSTANT_EXPR)
    }

    pub fn is_unreachable(&self) -> bool {
        self.flags.has(NodeFlags::UNREACHABLE)
    }

    /// All FFI transfer annotations attached to this node.
    pub fn transfer_annotations(&self) -> Vec<(TransferMode, Span)> {
        self.annotations
            .iter()
            .filter_map(Annotation::as_transfer)
            .collect()
    }

    /// The ownership tag, when exactly one ownership annotation exists.
    pub fn ownership_annotation(&self) -> Option<(OwnershipTag, Span)> {
        self.annotations.iter().find_map(Annotation::as_ownership)
    }

    /// Resolved-type shorthand used throughout the analyzer and planner.
    pub fn type_is_never(&self) -> bool {
        self.resolved_type
            .as_ref()
            .map(TypeDescriptor::is_never)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::{FileId, SourceLocation};

    fn span() -> Span {
        Span::point(SourceLocation::start_of(FileId(0)))
    }

    #[test]
    fn node_flags_pack_and_unpack() {
        let mut flags = NodeFlags::new();
        flags.set(NodeFlags::CONSTANT_EXPR);
        flags.set(NodeFlags::LVALUE);

        assert!(flags.has(NodeFlags::CONSTANT_EXPR));
        assert!(flags.has(NodeFlags::LVALUE));
        assert!(!flags.has(NodeFlags::UNREACHABLE));

        flags.unset(NodeFlags::LVALUE);
        assert!(!flags.has(NodeFlags::LVALUE));
    }

    #[test]
    fn transfer_annotations_are_collected_in_order() {
        let mut node = AstNode::new(
            NodeId(0),
            AstKind::Param {
                name: "p".to_string(),
                ty: TypeExpr {
                    kind: TypeExprKind::Named {
                        name: "u8".to_string(),
                        args: Vec::new(),
                    },
                    span: span(),
                },
            },
            span(),
        );
        node.annotations.push(Annotation {
            kind: AnnotationKind::Transfer(TransferMode::Full),
            span: span(),
        });
        node.annotations.push(Annotation {
            kind: AnnotationKind::Transfer(TransferMode::Borrowed),
            span: span(),
        });

        let transfers = node.transfer_annotations();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].0, TransferMode::Full);
        assert_eq!(transfers[1].0, TransferMode::Borrowed);
    }

    #[test]
    fn annotation_list_stays_inline_for_two_entries() {
        let mut list = AnnotationList::new();
        list.push(Annotation {
            kind: AnnotationKind::Ownership(OwnershipTag::Gc),
            span: span(),
        });
        list.push(Annotation {
            kind: AnnotationKind::Security(SecurityTag::ConstantTime),
            span: span(),
        });
        assert!(!list.spilled());
    }
}
