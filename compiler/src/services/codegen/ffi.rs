//! FFI marshaling plans: symbolic System V AMD64-like parameter
//! classification.
//!
//! The planner assigns abstract register/stack slots, never encoded
//! bytes. Emission walks `INIT -> PARAM_CLASSIFY -> STACK_ALIGN -> CALL
//! -> RETURN_CLASSIFY -> DONE`; any classification failure lands in
//! `ERROR` and partial state is dropped.

use thiserror::Error;

use crate::models::ownership::TransferMode;
use crate::models::types::{size_estimate, TypeDescriptor, TypeKind};

/// Integer parameter registers, in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rdi,
    Rsi,
    Rdx,
    Rcx,
    R8,
    R9,
}

pub const INT_PARAM_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Number of XMM registers available for float parameters.
pub const XMM_PARAM_COUNT: u8 = 8;

/// Stack slots are 8-byte aligned; frames are 16-byte aligned at the
/// call site.
pub const STACK_SLOT_SIZE: usize = 8;
pub const FRAME_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    IntReg(Reg),
    Xmm(u8),
    Stack { offset: usize, size: usize },
}

/// Marshaling category of one argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Ints, pointers, bools, chars, payload-free enums, floats.
    Direct,
    /// Pointer + length pair.
    Slice,
    /// Converted through `string_to_cstr`; single pointer slot.
    CString,
    /// Tagged union passed by value or by pointer per size.
    Result,
    /// Past the fixed arguments; always on the stack.
    Variadic,
}

/// Caller/callee ownership contract for one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgTransfer {
    /// `transfer_full`: the caller releases ownership.
    Move,
    /// `transfer_none`: the caller retains; the callee must not free.
    Copy,
    /// `borrowed`: pointer for the duration of the call only.
    Borrow,
}

impl ArgTransfer {
    pub fn from_mode(mode: Option<TransferMode>) -> Self {
        match mode {
            Some(TransferMode::Full) => ArgTransfer::Move,
            Some(TransferMode::Borrowed) => ArgTransfer::Borrow,
            Some(TransferMode::None) | None => ArgTransfer::Copy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgPlan {
    pub index: usize,
    pub class: ParamClass,
    pub slots: Vec<Slot>,
    pub transfer: ArgTransfer,
    /// Strings marshal through the runtime C-string conversion; the
    /// resulting buffer's ownership follows `transfer`.
    pub needs_cstr_conversion: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPlan {
    pub class: ParamClass,
    /// Large results come back through a caller-allocated pointer.
    pub by_pointer: bool,
    pub transfer: ArgTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitState {
    Init,
    ParamClassify,
    StackAlign,
    Call,
    ReturnClassify,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarshalPlan {
    pub args: Vec<ArgPlan>,
    pub return_plan: ReturnPlan,
    /// Total stack bytes for overflow and variadic arguments.
    pub stack_bytes: usize,
    /// Padding emitted before the call to restore 16-byte alignment.
    pub alignment_padding: usize,
    /// Caller zeroes the vector-count register (AL) when no vector
    /// arguments are passed variadically.
    pub clears_vector_count: bool,
    /// State trace of the emission walk, ending in `Done`.
    pub states: Vec<EmitState>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FfiPlanError {
    #[error("type `{0}` cannot cross the FFI boundary")]
    UnsupportedType(String),

    #[error("`void` is only valid as a return type")]
    VoidParameter,
}

/// One argument at the call site: its type plus the transfer annotation
/// from the parameter declaration.
#[derive(Debug, Clone)]
pub struct FfiArg {
    pub ty: TypeDescriptor,
    pub transfer: Option<TransferMode>,
}

/// Classify a type for parameter passing.
pub fn classify(ty: &TypeDescriptor) -> Result<ParamClass, FfiPlanError> {
    match ty.kind() {
        TypeKind::Integer { .. }
        | TypeKind::Bool
        | TypeKind::Char
        | TypeKind::Pointer { .. }
        | TypeKind::Float { .. } => Ok(ParamClass::Direct),
        TypeKind::Slice { .. } => Ok(ParamClass::Slice),
        TypeKind::String => Ok(ParamClass::CString),
        TypeKind::Enum(enum_type) => {
            if enum_type.variants.iter().any(|v| v.payload.is_some()) {
                Ok(ParamClass::Result)
            } else {
                Ok(ParamClass::Direct)
            }
        }
        TypeKind::Void => Err(FfiPlanError::VoidParameter),
        _ => Err(FfiPlanError::UnsupportedType(ty.display_name())),
    }
}

/// Build the marshaling plan for one FFI call. `fixed_args` is the
/// declared parameter count; anything beyond it is variadic.
pub fn plan_call(
    args: &[FfiArg],
    fixed_args: usize,
    return_type: &TypeDescriptor,
    return_transfer: Option<TransferMode>,
) -> Result<MarshalPlan, FfiPlanError> {
    let mut states = vec![EmitState::Init, EmitState::ParamClassify];

    let mut int_regs = INT_PARAM_REGS.iter();
    let mut next_xmm: u8 = 0;
    let mut stack_offset: usize = 0;
    let mut plans = Vec::with_capacity(args.len());
    let mut any_variadic_float = false;
    let mut has_variadic = false;

    for (index, arg) in args.iter().enumerate() {
        let is_variadic = index >= fixed_args;
        let class = match classify(&arg.ty) {
            Ok(class) => class,
            Err(err) => {
                states.push(EmitState::Error);
                // Partial slot assignments drop with the locals here.
                return Err(err);
            }
        };

        let (class, slots) = if is_variadic {
            has_variadic = true;
            if arg.ty.is_float() {
                any_variadic_float = true;
            }
            let size = slice_aware_size(&arg.ty, class);
            let slot = Slot::Stack {
                offset: stack_offset,
                size,
            };
            stack_offset += align_up(size, STACK_SLOT_SIZE);
            (ParamClass::Variadic, vec![slot])
        } else {
            let slots = match class {
                ParamClass::Direct if arg.ty.is_float() => match next_xmm {
                    n if n < XMM_PARAM_COUNT => {
                        next_xmm += 1;
                        vec![Slot::Xmm(n)]
                    }
                    _ => vec![take_stack(&mut stack_offset, STACK_SLOT_SIZE)],
                },
                ParamClass::Direct | ParamClass::CString => match int_regs.next() {
                    Some(reg) => vec![Slot::IntReg(*reg)],
                    None => vec![take_stack(&mut stack_offset, STACK_SLOT_SIZE)],
                },
                ParamClass::Slice => {
                    // Pointer and length each take an integer slot; the
                    // stack fallback uses 16 bytes.
                    match (int_regs.next(), int_regs.next()) {
                        (Some(ptr), Some(len)) => {
                            vec![Slot::IntReg(*ptr), Slot::IntReg(*len)]
                        }
                        _ => vec![take_stack(&mut stack_offset, 2 * STACK_SLOT_SIZE)],
                    }
                }
                ParamClass::Result => {
                    let size = size_estimate(&arg.ty);
                    if size <= 2 * STACK_SLOT_SIZE {
                        match (int_regs.next(), int_regs.next()) {
                            (Some(lo), Some(hi)) => vec![Slot::IntReg(*lo), Slot::IntReg(*hi)],
                            _ => vec![take_stack(&mut stack_offset, 2 * STACK_SLOT_SIZE)],
                        }
                    } else {
                        // By pointer.
                        match int_regs.next() {
                            Some(reg) => vec![Slot::IntReg(*reg)],
                            None => vec![take_stack(&mut stack_offset, STACK_SLOT_SIZE)],
                        }
                    }
                }
                ParamClass::Variadic => unreachable!("fixed argument classified variadic"),
            };
            (class, slots)
        };

        plans.push(ArgPlan {
            index,
            class,
            slots,
            transfer: ArgTransfer::from_mode(arg.transfer),
            needs_cstr_conversion: matches!(class, ParamClass::CString)
                || (is_variadic && arg.ty.is_string()),
        });
    }

    states.push(EmitState::StackAlign);
    let alignment_padding = (FRAME_ALIGNMENT - stack_offset % FRAME_ALIGNMENT) % FRAME_ALIGNMENT;

    states.push(EmitState::Call);
    states.push(EmitState::ReturnClassify);

    let return_plan = if return_type.is_void() || return_type.is_never() {
        ReturnPlan {
            class: ParamClass::Direct,
            by_pointer: false,
            transfer: ArgTransfer::Copy,
        }
    } else {
        let class = match classify(return_type) {
            Ok(class) => class,
            Err(err) => {
                states.push(EmitState::Error);
                return Err(err);
            }
        };
        ReturnPlan {
            class,
            by_pointer: matches!(class, ParamClass::Result)
                && size_estimate(return_type) > 2 * STACK_SLOT_SIZE,
            transfer: ArgTransfer::from_mode(return_transfer),
        }
    };

    states.push(EmitState::Done);
    Ok(MarshalPlan {
        args: plans,
        return_plan,
        stack_bytes: stack_offset,
        alignment_padding,
        clears_vector_count: has_variadic && !any_variadic_float,
        states,
    })
}

fn take_stack(offset: &mut usize, size: usize) -> Slot {
    let slot = Slot::Stack {
        offset: *offset,
        size,
    };
    *offset += align_up(size, STACK_SLOT_SIZE);
    slot
}

fn slice_aware_size(ty: &TypeDescriptor, class: ParamClass) -> usize {
    match class {
        ParamClass::Slice => 2 * STACK_SLOT_SIZE,
        _ => size_estimate(ty).max(STACK_SLOT_SIZE).min(2 * STACK_SLOT_SIZE),
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::BuiltinTypes;

    fn arg(ty: TypeDescriptor) -> FfiArg {
        FfiArg { ty, transfer: None }
    }

    fn plan(args: Vec<FfiArg>, ret: &TypeDescriptor) -> MarshalPlan {
        plan_call(&args, args.len(), ret, None).unwrap()
    }

    #[test]
    fn first_six_ints_go_to_registers() {
        let builtins = BuiltinTypes::new();
        let args: Vec<FfiArg> = (0..8).map(|_| arg(builtins.i32())).collect();
        let plan = plan(args, &builtins.void());

        for (index, reg) in INT_PARAM_REGS.iter().enumerate() {
            assert_eq!(plan.args[index].slots, vec![Slot::IntReg(*reg)]);
        }
        assert!(matches!(plan.args[6].slots[0], Slot::Stack { offset: 0, .. }));
        assert!(matches!(plan.args[7].slots[0], Slot::Stack { offset: 8, .. }));
        assert_eq!(plan.stack_bytes, 16);
        assert_eq!(plan.alignment_padding, 0);
    }

    #[test]
    fn floats_use_xmm_registers() {
        let builtins = BuiltinTypes::new();
        let args = vec![arg(builtins.f64()), arg(builtins.i32()), arg(builtins.f64())];
        let plan = plan(args, &builtins.void());

        assert_eq!(plan.args[0].slots, vec![Slot::Xmm(0)]);
        assert_eq!(plan.args[1].slots, vec![Slot::IntReg(Reg::Rdi)]);
        assert_eq!(plan.args[2].slots, vec![Slot::Xmm(1)]);
    }

    #[test]
    fn slice_consumes_two_integer_slots() {
        let builtins = BuiltinTypes::new();
        let slice = TypeDescriptor::new(TypeKind::Slice {
            element: builtins.get("u8").unwrap(),
            is_mutable: false,
        });
        let plan = plan(vec![arg(slice), arg(builtins.i32())], &builtins.void());

        assert_eq!(
            plan.args[0].slots,
            vec![Slot::IntReg(Reg::Rdi), Slot::IntReg(Reg::Rsi)]
        );
        // The next integer argument continues after the pair.
        assert_eq!(plan.args[1].slots, vec![Slot::IntReg(Reg::Rdx)]);
    }

    #[test]
    fn string_marshals_through_cstr_conversion() {
        let builtins = BuiltinTypes::new();
        let plan = plan(vec![arg(builtins.string())], &builtins.void());

        assert_eq!(plan.args[0].class, ParamClass::CString);
        assert!(plan.args[0].needs_cstr_conversion);
        assert_eq!(plan.args[0].slots, vec![Slot::IntReg(Reg::Rdi)]);
    }

    #[test]
    fn variadic_args_land_on_the_stack_and_clear_al() {
        let builtins = BuiltinTypes::new();
        let args = vec![arg(builtins.string()), arg(builtins.i32()), arg(builtins.i32())];
        let plan = plan_call(&args, 1, &builtins.void(), None).unwrap();

        assert_eq!(plan.args[1].class, ParamClass::Variadic);
        assert_eq!(plan.args[2].class, ParamClass::Variadic);
        assert!(matches!(plan.args[1].slots[0], Slot::Stack { .. }));
        assert!(plan.clears_vector_count, "no vector variadic args => AL = 0");

        let args = vec![arg(builtins.string()), arg(builtins.f64())];
        let plan = plan_call(&args, 1, &builtins.void(), None).unwrap();
        assert!(!plan.clears_vector_count);
    }

    #[test]
    fn transfer_annotations_map_to_contracts() {
        let builtins = BuiltinTypes::new();
        let args = vec![
            FfiArg {
                ty: builtins.string(),
                transfer: Some(TransferMode::Full),
            },
            FfiArg {
                ty: builtins.string(),
                transfer: Some(TransferMode::Borrowed),
            },
            FfiArg {
                ty: builtins.string(),
                transfer: None,
            },
        ];
        let plan = plan_call(&args, 3, &builtins.void(), None).unwrap();

        assert_eq!(plan.args[0].transfer, ArgTransfer::Move);
        assert_eq!(plan.args[1].transfer, ArgTransfer::Borrow);
        assert_eq!(plan.args[2].transfer, ArgTransfer::Copy);
    }

    #[test]
    fn state_machine_runs_init_to_done() {
        let builtins = BuiltinTypes::new();
        let plan = plan(vec![arg(builtins.i32())], &builtins.i32());
        assert_eq!(
            plan.states,
            vec![
                EmitState::Init,
                EmitState::ParamClassify,
                EmitState::StackAlign,
                EmitState::Call,
                EmitState::ReturnClassify,
                EmitState::Done,
            ]
        );
    }

    #[test]
    fn unsupported_parameter_type_fails_classification() {
        let builtins = BuiltinTypes::new();
        let err = plan_call(
            &[arg(builtins.void())],
            1,
            &builtins.void(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, FfiPlanError::VoidParameter);
    }
}
