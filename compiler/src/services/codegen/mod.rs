//! Code-generation planner: AST-to-IR lowering.
//!
//! Consumes the analyzed AST and produces a target-independent IR
//! stream; the concrete emission backend is external. Responsibilities:
//! direct literal/expression mapping, two-arm branch lowering for
//! `if/else`, iterator lowering for `for-in` over slices (length loaded
//! once, stride by element size), if-else chains for `match`, FFI calls
//! through the marshaling plan, never-type DCE over the emitted CFG,
//! and const-declaration lowering.

pub mod cfg;
pub mod consts;
pub mod ffi;
pub mod ir;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::models::ast::{AstKind, AstNode, MatchPattern, NodeId, TypeExpr, TypeExprKind, UnaryOp};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::ownership::TransferMode;
use crate::models::types::{size_estimate, BuiltinTypes, TypeDescriptor, TypeKind};
use crate::services::analyzer::const_eval::ConstValue;

use cfg::{apply_never_dce, mark_never_blocks};
use ffi::{plan_call, FfiArg};
use ir::{BlockId, Cfg, Instr, IrFunction, IrModule, ValueId};

/// Declared signature of an `extern fn`, with its transfer annotations.
#[derive(Debug, Clone)]
struct ExternSignature {
    params: Vec<TypeDescriptor>,
    param_transfers: Vec<Option<TransferMode>>,
    return_type: TypeDescriptor,
    return_transfer: Option<TransferMode>,
}

/// Lower an analyzed program to an IR module. Classification failures
/// and internal gaps surface as diagnostics, not panics.
pub fn lower_program(
    program: &AstNode,
    const_values: &FxHashMap<NodeId, ConstValue>,
) -> (IrModule, Vec<Diagnostic>) {
    let mut planner = CodegenPlanner::new(const_values);
    planner.collect_signatures(program);

    let mut functions = Vec::new();
    let mut lowered_consts = Vec::new();

    if let AstKind::Program { decls } = &program.kind {
        for decl in decls {
            match &decl.kind {
                AstKind::FunctionDecl {
                    name,
                    body: Some(_),
                    ..
                } => {
                    functions.push(planner.lower_function(name, decl));
                }
                AstKind::ConstDecl {
                    name, is_public, init, ..
                } => {
                    if let Some(value) = const_values.get(&decl.id) {
                        lowered_consts.push(consts::lower_const(
                            name,
                            *is_public,
                            init.is_literal() || is_negated_literal(init),
                            value,
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    debug!(
        functions = functions.len(),
        consts = lowered_consts.len(),
        diagnostics = planner.diagnostics.len(),
        "lowering complete"
    );
    (
        IrModule {
            functions,
            consts: lowered_consts,
        },
        planner.diagnostics,
    )
}

fn is_negated_literal(node: &AstNode) -> bool {
    matches!(
        &node.kind,
        AstKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } if operand.is_literal()
    )
}

struct CodegenPlanner<'a> {
    builtins: BuiltinTypes,
    const_values: &'a FxHashMap<NodeId, ConstValue>,
    externs: FxHashMap<String, ExternSignature>,
    never_callees: FxHashSet<String>,
    /// User-declared nominal types, for local `sizeof` resolution.
    named_types: FxHashMap<String, TypeDescriptor>,
    diagnostics: Vec<Diagnostic>,
    next_value: u32,
    next_temp: u32,
}

impl<'a> CodegenPlanner<'a> {
    fn new(const_values: &'a FxHashMap<NodeId, ConstValue>) -> Self {
        Self {
            builtins: BuiltinTypes::new(),
            const_values,
            externs: FxHashMap::default(),
            never_callees: FxHashSet::default(),
            named_types: FxHashMap::default(),
            diagnostics: Vec::new(),
            next_value: 0,
            next_temp: 0,
        }
    }

    fn collect_signatures(&mut self, program: &AstNode) {
        let AstKind::Program { decls } = &program.kind else {
            return;
        };

        for decl in decls {
            match &decl.kind {
                AstKind::FunctionDecl {
                    name,
                    is_extern,
                    params,
                    ..
                } => {
                    let Some(TypeKind::Function {
                        params: param_types,
                        return_type,
                    }) = decl.resolved_type.as_ref().map(TypeDescriptor::kind)
                    else {
                        continue;
                    };

                    if return_type.is_never() {
                        self.never_callees.insert(name.clone());
                    }
                    if *is_extern {
                        let param_transfers = params
                            .iter()
                            .map(|p| p.transfer_annotations().first().map(|(mode, _)| *mode))
                            .collect();
                        self.externs.insert(
                            name.clone(),
                            ExternSignature {
                                params: param_types.clone(),
                                param_transfers,
                                return_type: return_type.clone(),
                                return_transfer: decl
                                    .transfer_annotations()
                                    .first()
                                    .map(|(mode, _)| *mode),
                            },
                        );
                    }
                }
                AstKind::StructDecl { name, .. } | AstKind::EnumDecl { name, .. } => {
                    if let Some(descriptor) = &decl.resolved_type {
                        self.named_types.insert(name.clone(), descriptor.clone());
                    }
                }
                _ => {}
            }
        }
    }

    fn lower_function(&mut self, name: &str, decl: &AstNode) -> IrFunction {
        let AstKind::FunctionDecl { params, body, .. } = &decl.kind else {
            return IrFunction {
                name: name.to_string(),
                params: Vec::new(),
                cfg: Cfg::new(),
            };
        };

        let param_names = params
            .iter()
            .filter_map(|p| match &p.kind {
                AstKind::Param { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();

        self.next_value = 0;
        self.next_temp = 0;
        let mut cfg = Cfg::new();
        let mut current = cfg.entry;

        if let Some(body) = body {
            self.lower_block(&mut cfg, &mut current, body);
        }

        mark_never_blocks(&mut cfg, &self.never_callees);
        apply_never_dce(&mut cfg);

        IrFunction {
            name: name.to_string(),
            params: param_names,
            cfg,
        }
    }

    fn value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn temp_local(&mut self, tag: &str) -> String {
        let name = format!("__{tag}{}", self.next_temp);
        self.next_temp += 1;
        name
    }

    // --- statements ---

    fn lower_block(&mut self, cfg: &mut Cfg, current: &mut BlockId, block: &AstNode) {
        let AstKind::Block { statements } = &block.kind else {
            return;
        };
        for stmt in statements {
            self.lower_statement(cfg, current, stmt);
        }
    }

    fn lower_statement(&mut self, cfg: &mut Cfg, current: &mut BlockId, stmt: &AstNode) {
        match &stmt.kind {
            AstKind::LetDecl { name, init, .. } => {
                let value = self.lower_expr(cfg, current, init);
                cfg.push(
                    *current,
                    Instr::StoreLocal {
                        name: name.clone(),
                        src: value,
                    },
                );
            }
            AstKind::ExprStmt { expr } => {
                self.lower_expr(cfg, current, expr);
            }
            AstKind::Return { value } => {
                let value = value.as_ref().map(|v| self.lower_expr(cfg, current, v));
                cfg.push(*current, Instr::Return { value });
                // Anything lowered after a return lands in a fresh,
                // edge-less block.
                *current = cfg.add_block();
            }
            AstKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let cond = self.lower_expr(cfg, current, condition);
                let then_id = cfg.add_block();
                let join = cfg.add_block();
                let else_id = if else_block.is_some() {
                    cfg.add_block()
                } else {
                    join
                };

                cfg.push(
                    *current,
                    Instr::Branch {
                        cond,
                        then_block: then_id,
                        else_block: else_id,
                        hint: None,
                    },
                );
                cfg.add_edge(*current, then_id);
                cfg.add_edge(*current, else_id);

                let mut then_end = then_id;
                self.lower_block(cfg, &mut then_end, then_block);
                cfg.push(then_end, Instr::Jump { target: join });
                cfg.add_edge(then_end, join);

                if let Some(else_block) = else_block {
                    let mut else_end = else_id;
                    if matches!(else_block.kind, AstKind::If { .. }) {
                        self.lower_statement(cfg, &mut else_end, else_block);
                    } else {
                        self.lower_block(cfg, &mut else_end, else_block);
                    }
                    cfg.push(else_end, Instr::Jump { target: join });
                    cfg.add_edge(else_end, join);
                }

                *current = join;
            }
            AstKind::ForIn {
                binding,
                iterable,
                body,
            } => {
                self.lower_for_in(cfg, current, binding, iterable, body);
            }
            AstKind::Match { scrutinee, arms } => {
                self.lower_match(cfg, current, scrutinee, arms);
            }
            AstKind::Block { .. } => {
                self.lower_block(cfg, current, stmt);
            }
            AstKind::Error => {}
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::Internal,
                    "statement kind not lowerable at this position",
                    stmt.span,
                ));
            }
        }
    }

    /// Iterator lowering for `for x in slice`: the length is loaded once
    /// in the preheader and iteration strides by the element size.
    fn lower_for_in(
        &mut self,
        cfg: &mut Cfg,
        current: &mut BlockId,
        binding: &str,
        iterable: &AstNode,
        body: &AstNode,
    ) {
        let element_size = match iterable.resolved_type.as_ref().map(TypeDescriptor::kind) {
            Some(TypeKind::Slice { element, .. }) => size_estimate(element).max(1),
            _ => 8,
        };

        let slice_local = self.temp_local("slice");
        let len_local = self.temp_local("len");
        let idx_local = self.temp_local("idx");

        // Preheader: capture the slice, its length (exactly once), and
        // a zeroed index.
        let slice_value = self.lower_expr(cfg, current, iterable);
        cfg.push(
            *current,
            Instr::StoreLocal {
                name: slice_local.clone(),
                src: slice_value,
            },
        );
        let len_value = self.value();
        cfg.push(
            *current,
            Instr::SliceLen {
                dst: len_value,
                slice: slice_value,
            },
        );
        cfg.push(
            *current,
            Instr::StoreLocal {
                name: len_local.clone(),
                src: len_value,
            },
        );
        let zero = self.value();
        cfg.push(*current, Instr::ConstInt { dst: zero, value: 0 });
        cfg.push(
            *current,
            Instr::StoreLocal {
                name: idx_local.clone(),
                src: zero,
            },
        );

        let header = cfg.add_block();
        let body_block = cfg.add_block();
        let exit = cfg.add_block();

        cfg.push(*current, Instr::Jump { target: header });
        cfg.add_edge(*current, header);

        // Header: idx < len?
        let idx = self.value();
        cfg.push(
            header,
            Instr::LoadLocal {
                dst: idx,
                name: idx_local.clone(),
            },
        );
        let len = self.value();
        cfg.push(
            header,
            Instr::LoadLocal {
                dst: len,
                name: len_local.clone(),
            },
        );
        let cond = self.value();
        cfg.push(
            header,
            Instr::Binary {
                dst: cond,
                op: crate::models::ast::BinaryOp::Lt,
                lhs: idx,
                rhs: len,
            },
        );
        cfg.push(
            header,
            Instr::Branch {
                cond,
                then_block: body_block,
                else_block: exit,
                hint: None,
            },
        );
        cfg.add_edge(header, body_block);
        cfg.add_edge(header, exit);

        // Body: bind the element, run the statements, step the index.
        let mut body_end = body_block;
        let slice = self.value();
        cfg.push(
            body_block,
            Instr::LoadLocal {
                dst: slice,
                name: slice_local,
            },
        );
        let idx_in_body = self.value();
        cfg.push(
            body_block,
            Instr::LoadLocal {
                dst: idx_in_body,
                name: idx_local.clone(),
            },
        );
        let element = self.value();
        cfg.push(
            body_block,
            Instr::SliceElem {
                dst: element,
                slice,
                index: idx_in_body,
                element_size,
            },
        );
        cfg.push(
            body_block,
            Instr::StoreLocal {
                name: binding.to_string(),
                src: element,
            },
        );

        self.lower_block(cfg, &mut body_end, body);

        let step_idx = self.value();
        cfg.push(
            body_end,
            Instr::LoadLocal {
                dst: step_idx,
                name: idx_local.clone(),
            },
        );
        let one = self.value();
        cfg.push(body_end, Instr::ConstInt { dst: one, value: 1 });
        let next = self.value();
        cfg.push(
            body_end,
            Instr::Binary {
                dst: next,
                op: crate::models::ast::BinaryOp::Add,
                lhs: step_idx,
                rhs: one,
            },
        );
        cfg.push(
            body_end,
            Instr::StoreLocal {
                name: idx_local,
                src: next,
            },
        );
        cfg.push(body_end, Instr::Jump { target: header });
        cfg.add_edge(body_end, header);

        *current = exit;
    }

    /// `match` lowers to an if-else chain comparing the scrutinee
    /// against each arm in order.
    fn lower_match(
        &mut self,
        cfg: &mut Cfg,
        current: &mut BlockId,
        scrutinee: &AstNode,
        arms: &[crate::models::ast::MatchArm],
    ) {
        let scrutinee_value = self.lower_expr(cfg, current, scrutinee);
        let join = cfg.add_block();

        let variant_index = |name: &str| -> Option<i128> {
            match scrutinee.resolved_type.as_ref().map(TypeDescriptor::kind) {
                Some(TypeKind::Enum(enum_type)) => enum_type
                    .variants
                    .iter()
                    .position(|v| v.name == name)
                    .map(|index| {
                        enum_type.variants[index]
                            .discriminant
                            .map(|d| d as i128)
                            .unwrap_or(index as i128)
                    }),
                _ => None,
            }
        };

        for arm in arms {
            match &arm.pattern {
                MatchPattern::Wildcard => {
                    let mut arm_end = *current;
                    self.lower_arm_body(cfg, &mut arm_end, &arm.body);
                    cfg.push(arm_end, Instr::Jump { target: join });
                    cfg.add_edge(arm_end, join);
                    *current = join;
                    return;
                }
                pattern => {
                    let expected: i128 = match pattern {
                        MatchPattern::Variant { name, .. } => variant_index(name).unwrap_or(0),
                        MatchPattern::IntLiteral {
                            negative,
                            magnitude,
                        } => {
                            let magnitude = (*magnitude).min(i128::MAX as u128) as i128;
                            if *negative {
                                -magnitude
                            } else {
                                magnitude
                            }
                        }
                        MatchPattern::Wildcard => unreachable!(),
                    };

                    let tag = self.value();
                    cfg.push(
                        *current,
                        Instr::ConstInt {
                            dst: tag,
                            value: expected,
                        },
                    );
                    let cond = self.value();
                    cfg.push(
                        *current,
                        Instr::Binary {
                            dst: cond,
                            op: crate::models::ast::BinaryOp::Eq,
                            lhs: scrutinee_value,
                            rhs: tag,
                        },
                    );

                    let arm_block = cfg.add_block();
                    let next_test = cfg.add_block();
                    cfg.push(
                        *current,
                        Instr::Branch {
                            cond,
                            then_block: arm_block,
                            else_block: next_test,
                            hint: None,
                        },
                    );
                    cfg.add_edge(*current, arm_block);
                    cfg.add_edge(*current, next_test);

                    let mut arm_end = arm_block;
                    self.lower_arm_body(cfg, &mut arm_end, &arm.body);
                    cfg.push(arm_end, Instr::Jump { target: join });
                    cfg.add_edge(arm_end, join);

                    *current = next_test;
                }
            }
        }

        // No wildcard: the last test block falls through to the join.
        cfg.push(*current, Instr::Jump { target: join });
        cfg.add_edge(*current, join);
        *current = join;
    }

    fn lower_arm_body(&mut self, cfg: &mut Cfg, current: &mut BlockId, body: &AstNode) {
        if matches!(body.kind, AstKind::Block { .. }) {
            self.lower_block(cfg, current, body);
        } else {
            self.lower_expr(cfg, current, body);
        }
    }

    // --- expressions ---

    fn lower_expr(&mut self, cfg: &mut Cfg, current: &mut BlockId, node: &AstNode) -> ValueId {
        match &node.kind {
            AstKind::IntLiteral { magnitude } => {
                let dst = self.value();
                let value = (*magnitude).min(i128::MAX as u128) as i128;
                cfg.push(*current, Instr::ConstInt { dst, value });
                dst
            }
            AstKind::FloatLiteral { value } => {
                let dst = self.value();
                cfg.push(*current, Instr::ConstFloat { dst, value: *value });
                dst
            }
            AstKind::BoolLiteral { value } => {
                let dst = self.value();
                cfg.push(*current, Instr::ConstBool { dst, value: *value });
                dst
            }
            AstKind::CharLiteral { value } => {
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::ConstInt {
                        dst,
                        value: *value as i128,
                    },
                );
                dst
            }
            AstKind::StringLiteral { value, .. } => {
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::ConstStr {
                        dst,
                        value: value.clone(),
                    },
                );
                dst
            }
            AstKind::Identifier { name } => {
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::LoadLocal {
                        dst,
                        name: name.clone(),
                    },
                );
                dst
            }
            AstKind::Unary { op, operand } => {
                if *op == UnaryOp::Neg {
                    if let AstKind::IntLiteral { magnitude } = operand.kind {
                        let dst = self.value();
                        let value = -(magnitude.min(1u128 << 127) as i128);
                        cfg.push(*current, Instr::ConstInt { dst, value });
                        return dst;
                    }
                }
                let operand_value = self.lower_expr(cfg, current, operand);
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::Unary {
                        dst,
                        op: *op,
                        operand: operand_value,
                    },
                );
                dst
            }
            AstKind::Binary { op, lhs, rhs } => {
                let lhs_value = self.lower_expr(cfg, current, lhs);
                let rhs_value = self.lower_expr(cfg, current, rhs);
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::Binary {
                        dst,
                        op: *op,
                        lhs: lhs_value,
                        rhs: rhs_value,
                    },
                );
                dst
            }
            AstKind::Assign { target, value } => {
                let src = self.lower_expr(cfg, current, value);
                match &target.kind {
                    AstKind::Identifier { name } => {
                        cfg.push(
                            *current,
                            Instr::StoreLocal {
                                name: name.clone(),
                                src,
                            },
                        );
                    }
                    AstKind::Index { object, index } => {
                        let element_size =
                            match object.resolved_type.as_ref().map(TypeDescriptor::kind) {
                                Some(TypeKind::Slice { element, .. }) => {
                                    size_estimate(element).max(1)
                                }
                                _ => 8,
                            };
                        let slice = self.lower_expr(cfg, current, object);
                        let index = self.lower_expr(cfg, current, index);
                        cfg.push(
                            *current,
                            Instr::StoreElem {
                                slice,
                                index,
                                src,
                                element_size,
                            },
                        );
                    }
                    AstKind::FieldAccess { object, field } => {
                        let object_value = self.lower_expr(cfg, current, object);
                        cfg.push(
                            *current,
                            Instr::StoreField {
                                object: object_value,
                                field: field.clone(),
                                src,
                            },
                        );
                    }
                    _ => {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::Internal,
                            "assignment target survived analysis but is not lowerable",
                            target.span,
                        ));
                    }
                }
                src
            }
            AstKind::Call { callee, args } => self.lower_call(cfg, current, node, callee, args),
            AstKind::FieldAccess { object, field } => {
                let object_value = self.lower_expr(cfg, current, object);
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::LoadField {
                        dst,
                        object: object_value,
                        field: field.clone(),
                    },
                );
                dst
            }
            AstKind::Index { object, index } => {
                let element_size = match object.resolved_type.as_ref().map(TypeDescriptor::kind) {
                    Some(TypeKind::Slice { element, .. }) => size_estimate(element).max(1),
                    _ => 8,
                };
                let slice = self.lower_expr(cfg, current, object);
                let index = self.lower_expr(cfg, current, index);
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::SliceElem {
                        dst,
                        slice,
                        index,
                        element_size,
                    },
                );
                dst
            }
            AstKind::SizeOf { ty } => {
                let size = self
                    .resolve_type_local(ty)
                    .map(|descriptor| size_estimate(&descriptor))
                    .unwrap_or(0);
                let dst = self.value();
                cfg.push(
                    *current,
                    Instr::ConstInt {
                        dst,
                        value: size as i128,
                    },
                );
                dst
            }
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::Internal,
                    "expression kind not lowerable",
                    node.span,
                ));
                let dst = self.value();
                cfg.push(*current, Instr::ConstInt { dst, value: 0 });
                dst
            }
        }
    }

    fn lower_call(
        &mut self,
        cfg: &mut Cfg,
        current: &mut BlockId,
        call: &AstNode,
        callee: &AstNode,
        args: &[AstNode],
    ) -> ValueId {
        let arg_values: Vec<ValueId> = args
            .iter()
            .map(|arg| self.lower_expr(cfg, current, arg))
            .collect();

        let callee_name = match &callee.kind {
            AstKind::Identifier { name } => name.clone(),
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::Internal,
                    "indirect calls are not lowerable yet",
                    callee.span,
                ));
                let dst = self.value();
                cfg.push(*current, Instr::ConstInt { dst, value: 0 });
                return dst;
            }
        };

        let produces_value = call
            .resolved_type
            .as_ref()
            .map(|ty| !ty.is_void() && !ty.is_never())
            .unwrap_or(false);
        let dst = produces_value.then(|| self.value());

        if let Some(signature) = self.externs.get(&callee_name).cloned() {
            let ffi_args: Vec<FfiArg> = args
                .iter()
                .enumerate()
                .map(|(index, arg)| FfiArg {
                    ty: arg
                        .resolved_type
                        .clone()
                        .or_else(|| signature.params.get(index).cloned())
                        .unwrap_or_else(|| self.builtins.void()),
                    transfer: signature.param_transfers.get(index).copied().flatten(),
                })
                .collect();

            match plan_call(
                &ffi_args,
                signature.params.len(),
                &signature.return_type,
                signature.return_transfer,
            ) {
                Ok(plan) => {
                    cfg.push(
                        *current,
                        Instr::FfiCall {
                            dst,
                            callee: callee_name.clone(),
                            args: arg_values,
                            plan: Box::new(plan),
                        },
                    );
                }
                Err(err) => {
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::FfiBoundaryError,
                        format!("Cannot marshal call to `{callee_name}`: {err}"),
                        call.span,
                    ));
                    cfg.push(
                        *current,
                        Instr::Call {
                            dst,
                            callee: callee_name.clone(),
                            args: arg_values,
                        },
                    );
                }
            }
        } else {
            cfg.push(
                *current,
                Instr::Call {
                    dst,
                    callee: callee_name.clone(),
                    args: arg_values,
                },
            );
        }

        // A call that cannot return ends its block; whatever follows
        // starts a successor block that never-DCE will prune.
        let is_never_call = self.never_callees.contains(&callee_name)
            || cfg::is_never_sentinel(&callee_name)
            || call.type_is_never();
        if is_never_call {
            let next = cfg.add_block();
            cfg.add_edge(*current, next);
            *current = next;
        }

        dst.unwrap_or_else(|| self.value())
    }

    fn resolve_type_local(&self, ty: &TypeExpr) -> Option<TypeDescriptor> {
        match &ty.kind {
            TypeExprKind::Named { name, .. } => self
                .builtins
                .get(name)
                .or_else(|| self.named_types.get(name).cloned()),
            TypeExprKind::Slice { element, is_mutable } => {
                let element = self.resolve_type_local(element)?;
                Some(TypeDescriptor::new(TypeKind::Slice {
                    element,
                    is_mutable: *is_mutable,
                }))
            }
            TypeExprKind::Pointer {
                pointee,
                is_mutable,
            } => {
                let pointee = self.resolve_type_local(pointee)?;
                Some(TypeDescriptor::new(TypeKind::Pointer {
                    pointee,
                    is_mutable: *is_mutable,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::FileId;
    use crate::services::pipeline::{check_source, PipelineOptions};

    fn lower(src: &str) -> (IrModule, Vec<Diagnostic>) {
        let unit = check_source(src, FileId(0), &PipelineOptions::default());
        assert!(!unit.has_errors(), "front-end errors: {:?}", unit.diagnostics);
        lower_program(&unit.program, &unit.const_values)
    }

    fn function<'m>(module: &'m IrModule, name: &str) -> &'m IrFunction {
        module
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function {name}"))
    }

    #[test]
    fn code_after_panic_is_unreachable_with_no_successors() {
        let (module, diags) = lower("fn f() { panic(\"x\"); log(\"unreachable\"); }");
        assert!(diags.is_empty(), "{diags:?}");

        let cfg = &function(&module, "f").cfg;
        let entry = cfg.block(cfg.entry);
        assert!(entry.never_terminating);
        assert!(entry.successors.is_empty());

        let dead: Vec<_> = cfg
            .blocks
            .iter()
            .filter(|block| block.is_unreachable)
            .collect();
        assert!(!dead.is_empty(), "expected an unreachable block");
        assert!(dead.iter().all(|block| block.predecessors.is_empty()));
    }

    #[test]
    fn for_in_loads_length_once() {
        let (module, _) = lower("fn total(items: []u32) { for item in items { log(\"t\"); } }");
        let cfg = &function(&module, "total").cfg;

        let len_loads: usize = cfg
            .blocks
            .iter()
            .flat_map(|block| &block.instrs)
            .filter(|instr| matches!(instr, Instr::SliceLen { .. }))
            .count();
        assert_eq!(len_loads, 1, "slice length must be loaded exactly once");

        let strides: Vec<usize> = cfg
            .blocks
            .iter()
            .flat_map(|block| &block.instrs)
            .filter_map(|instr| match instr {
                Instr::SliceElem { element_size, .. } => Some(*element_size),
                _ => None,
            })
            .collect();
        assert_eq!(strides, vec![4], "u32 elements stride by 4 bytes");
    }

    #[test]
    fn extern_calls_carry_marshaling_plans() {
        let (module, diags) = lower(
            "extern fn write(#[borrowed] buf: []u8, fd: i32) -> i32;\n\
             fn f(buf: []u8) { write(buf, 1); }",
        );
        assert!(diags.is_empty(), "{diags:?}");

        let cfg = &function(&module, "f").cfg;
        let plan = cfg
            .blocks
            .iter()
            .flat_map(|block| &block.instrs)
            .find_map(|instr| match instr {
                Instr::FfiCall { plan, .. } => Some(plan),
                _ => None,
            })
            .expect("expected an FFI call");

        assert_eq!(plan.args[0].class, ffi::ParamClass::Slice);
        assert_eq!(plan.args[0].transfer, ffi::ArgTransfer::Borrow);
        assert_eq!(plan.states.last(), Some(&ffi::EmitState::Done));
    }

    #[test]
    fn simple_const_lowers_to_immediate() {
        let (module, _) = lower("pub const LIMIT: i32 = 64;\nconst SCALED: i32 = 8 * 8;");
        assert_eq!(module.consts.len(), 2);
        assert!(matches!(
            module.consts[0],
            consts::ConstLowering::Immediate { .. }
        ));
        assert!(matches!(
            module.consts[1],
            consts::ConstLowering::Static {
                linkage: consts::Linkage::Internal,
                ..
            }
        ));
    }

    #[test]
    fn if_else_lowers_to_two_arm_branch() {
        let (module, _) = lower("fn f(x: bool) { if x { log(\"a\"); } else { log(\"b\"); } }");
        let cfg = &function(&module, "f").cfg;

        let branch = cfg
            .blocks
            .iter()
            .flat_map(|block| &block.instrs)
            .find(|instr| matches!(instr, Instr::Branch { .. }));
        assert!(branch.is_some());
        assert!(cfg.edges_are_symmetric());
    }
}
