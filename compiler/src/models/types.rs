//! Type descriptors and the read-only `TypeInfo` projection used by
//! code generation.
//!
//! Descriptors are shared, refcounted handles: cloning retains, dropping
//! releases, and storage is returned when the last handle goes away.
//! Primitives compare structurally; structs and enums compare nominally.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::models::symbols::SymbolTable;

/// Machine word size assumed by the size heuristics, in bytes.
pub const WORD_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    W128,
    Size,
}

impl IntWidth {
    pub fn bits(&self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
            IntWidth::W128 => 128,
            IntWidth::Size => (WORD_SIZE * 8) as u32,
        }
    }

    pub fn bytes(&self) -> usize {
        (self.bits() / 8) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    W32,
    W64,
}

impl FloatWidth {
    pub fn bytes(&self) -> usize {
        match self {
            FloatWidth::W32 => 4,
            FloatWidth::W64 => 8,
        }
    }
}

/// One variant of an enum type. A variant may carry an associated payload
/// type or an explicit integer value, but not both.
#[derive(Debug)]
pub struct EnumVariant {
    pub name: String,
    pub payload: Option<TypeDescriptor>,
    pub discriminant: Option<i64>,
}

#[derive(Debug)]
pub struct StructType {
    pub name: String,
    /// Field iteration over this table is insertion-ordered.
    pub fields: SymbolTable,
    pub methods: SymbolTable,
    pub is_generic: bool,
    pub type_params: Vec<String>,
}

#[derive(Debug)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<EnumVariant>,
    pub is_generic: bool,
    pub type_params: Vec<String>,
}

#[derive(Debug)]
pub enum TypeKind {
    Void,
    Bool,
    Char,
    String,
    /// Uninhabited; expressions of this type have no successors in the
    /// code-gen CFG.
    Never,
    Integer {
        signed: bool,
        width: IntWidth,
    },
    Float {
        width: FloatWidth,
    },
    Slice {
        element: TypeDescriptor,
        is_mutable: bool,
    },
    Pointer {
        pointee: TypeDescriptor,
        is_mutable: bool,
    },
    Struct(StructType),
    Enum(EnumType),
    Function {
        params: Vec<TypeDescriptor>,
        return_type: TypeDescriptor,
    },
}

/// Shared handle to a type. `clone` is the retain operation; `drop` is the
/// release. Assigning a descriptor without cloning is impossible by
/// construction, which is the point.
#[derive(Clone)]
pub struct TypeDescriptor {
    inner: Arc<TypeKind>,
}

impl TypeDescriptor {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            inner: Arc::new(kind),
        }
    }

    pub fn kind(&self) -> &TypeKind {
        &self.inner
    }

    /// Live handle count, exposed for leak assertions in tests.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn is_never(&self) -> bool {
        matches!(self.kind(), TypeKind::Never)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind(), TypeKind::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind(), TypeKind::Bool)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind(), TypeKind::Integer { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind(), TypeKind::Float { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind(), TypeKind::String)
    }

    pub fn is_slice(&self) -> bool {
        matches!(self.kind(), TypeKind::Slice { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind(), TypeKind::Pointer { .. })
    }

    /// A function type returning `never` marks the callee as
    /// non-returning for DCE purposes.
    pub fn returns_never(&self) -> bool {
        match self.kind() {
            TypeKind::Function { return_type, .. } => return_type.is_never(),
            _ => false,
        }
    }

    /// Human-readable name used in diagnostics.
    pub fn display_name(&self) -> String {
        match self.kind() {
            TypeKind::Void => "void".to_string(),
            TypeKind::Bool => "bool".to_string(),
            TypeKind::Char => "char".to_string(),
            TypeKind::String => "string".to_string(),
            TypeKind::Never => "never".to_string(),
            TypeKind::Integer { signed, width } => match width {
                IntWidth::Size => {
                    if *signed {
                        "isize".to_string()
                    } else {
                        "usize".to_string()
                    }
                }
                _ => format!("{}{}", if *signed { "i" } else { "u" }, width.bits()),
            },
            TypeKind::Float { width } => match width {
                FloatWidth::W32 => "f32".to_string(),
                FloatWidth::W64 => "f64".to_string(),
            },
            TypeKind::Slice { element, is_mutable } => {
                if *is_mutable {
                    format!("[]mut {}", element.display_name())
                } else {
                    format!("[]{}", element.display_name())
                }
            }
            TypeKind::Pointer {
                pointee,
                is_mutable,
            } => {
                if *is_mutable {
                    format!("*mut {}", pointee.display_name())
                } else {
                    format!("*const {}", pointee.display_name())
                }
            }
            TypeKind::Struct(s) => s.name.clone(),
            TypeKind::Enum(e) => e.name.clone(),
            TypeKind::Function {
                params,
                return_type,
            } => {
                let params = params
                    .iter()
                    .map(|p| p.display_name())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("fn({}) -> {}", params, return_type.display_name())
            }
        }
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeDescriptor({})", self.display_name())
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        match (self.kind(), other.kind()) {
            (TypeKind::Void, TypeKind::Void)
            | (TypeKind::Bool, TypeKind::Bool)
            | (TypeKind::Char, TypeKind::Char)
            | (TypeKind::String, TypeKind::String)
            | (TypeKind::Never, TypeKind::Never) => true,
            (
                TypeKind::Integer {
                    signed: s1,
                    width: w1,
                },
                TypeKind::Integer {
                    signed: s2,
                    width: w2,
                },
            ) => s1 == s2 && w1 == w2,
            (TypeKind::Float { width: w1 }, TypeKind::Float { width: w2 }) => w1 == w2,
            (
                TypeKind::Slice {
                    element: e1,
                    is_mutable: m1,
                },
                TypeKind::Slice {
                    element: e2,
                    is_mutable: m2,
                },
            ) => m1 == m2 && e1 == e2,
            (
                TypeKind::Pointer {
                    pointee: p1,
                    is_mutable: m1,
                },
                TypeKind::Pointer {
                    pointee: p2,
                    is_mutable: m2,
                },
            ) => m1 == m2 && p1 == p2,
            // Nominal comparison for user-defined types.
            (TypeKind::Struct(a), TypeKind::Struct(b)) => a.name == b.name,
            (TypeKind::Enum(a), TypeKind::Enum(b)) => a.name == b.name,
            (
                TypeKind::Function {
                    params: p1,
                    return_type: r1,
                },
                TypeKind::Function {
                    params: p2,
                    return_type: r2,
                },
            ) => p1 == p2 && r1 == r2,
            _ => false,
        }
    }
}

impl Eq for TypeDescriptor {}

/// Whether a literal with the given sign and magnitude fits the integer
/// type described by `signed`/`width`. 128-bit storage cannot overflow a
/// 128-bit literal, so those widths always fit.
pub fn value_fits(signed: bool, width: IntWidth, negative: bool, magnitude: u128) -> bool {
    if magnitude == 0 {
        return true;
    }
    let bits = width.bits();
    if signed {
        if bits == 128 {
            return if negative {
                magnitude <= 1u128 << 127
            } else {
                magnitude <= i128::MAX as u128
            };
        }
        let half = 1u128 << (bits - 1);
        if negative {
            magnitude <= half
        } else {
            magnitude <= half - 1
        }
    } else {
        if negative {
            return false;
        }
        if bits == 128 {
            return true;
        }
        magnitude <= (1u128 << bits) - 1
    }
}

/// Kind tag of the `TypeInfo` projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeInfoKind {
    Void,
    Bool,
    Char,
    String,
    Never,
    Integer,
    Float,
    Slice,
    Pointer,
    Struct,
    Enum,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Char,
    Int { signed: bool, width: IntWidth },
    Float { width: FloatWidth },
}

/// Read-only view of a descriptor consumed by the code-gen planner.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeInfoKind,
    /// Size estimate in bytes; primitives are exact, aggregates are
    /// heuristic (struct = aligned field sum, slice = 3 words,
    /// function/pointer = 1 word).
    pub size_bytes: usize,
    pub primitive: Option<PrimitiveKind>,
    pub descriptor: TypeDescriptor,
}

impl TypeInfo {
    pub fn of(descriptor: &TypeDescriptor) -> Self {
        let (kind, primitive) = match descriptor.kind() {
            TypeKind::Void => (TypeInfoKind::Void, None),
            TypeKind::Bool => (TypeInfoKind::Bool, Some(PrimitiveKind::Bool)),
            TypeKind::Char => (TypeInfoKind::Char, Some(PrimitiveKind::Char)),
            TypeKind::String => (TypeInfoKind::String, None),
            TypeKind::Never => (TypeInfoKind::Never, None),
            TypeKind::Integer { signed, width } => (
                TypeInfoKind::Integer,
                Some(PrimitiveKind::Int {
                    signed: *signed,
                    width: *width,
                }),
            ),
            TypeKind::Float { width } => (
                TypeInfoKind::Float,
                Some(PrimitiveKind::Float { width: *width }),
            ),
            TypeKind::Slice { .. } => (TypeInfoKind::Slice, None),
            TypeKind::Pointer { .. } => (TypeInfoKind::Pointer, None),
            TypeKind::Struct(_) => (TypeInfoKind::Struct, None),
            TypeKind::Enum(_) => (TypeInfoKind::Enum, None),
            TypeKind::Function { .. } => (TypeInfoKind::Function, None),
        };

        Self {
            kind,
            size_bytes: size_estimate(descriptor),
            primitive,
            descriptor: descriptor.clone(),
        }
    }
}

/// Size-in-bytes estimate for a type.
pub fn size_estimate(descriptor: &TypeDescriptor) -> usize {
    match descriptor.kind() {
        TypeKind::Void | TypeKind::Never => 0,
        TypeKind::Bool => 1,
        TypeKind::Char => 4,
        TypeKind::Integer { width, .. } => width.bytes(),
        TypeKind::Float { width } => width.bytes(),
        // Strings and slices are header-shaped values: ptr, len, cap.
        TypeKind::String | TypeKind::Slice { .. } => 3 * WORD_SIZE,
        TypeKind::Pointer { .. } | TypeKind::Function { .. } => WORD_SIZE,
        TypeKind::Struct(s) => {
            let mut offset = 0usize;
            let mut max_align = 1usize;
            s.fields.iterate(|_, entry| {
                if let Some(field_ty) = &entry.ty {
                    let size = size_estimate(field_ty).max(1);
                    let align = size.min(WORD_SIZE).next_power_of_two();
                    max_align = max_align.max(align);
                    offset = align_up(offset, align) + size;
                }
                true
            });
            align_up(offset, max_align)
        }
        TypeKind::Enum(e) => {
            let payload = e
                .variants
                .iter()
                .filter_map(|v| v.payload.as_ref())
                .map(size_estimate)
                .max()
                .unwrap_or(0);
            align_up(WORD_SIZE + payload, WORD_SIZE)
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Fixed table of builtin types, populated once at analyzer
/// initialization. `get` hands out retained handles.
pub struct BuiltinTypes {
    table: FxHashMap<&'static str, TypeDescriptor>,
}

impl BuiltinTypes {
    pub fn new() -> Self {
        let mut table = FxHashMap::default();

        let int = |name: &'static str, signed: bool, width: IntWidth| {
            (name, TypeDescriptor::new(TypeKind::Integer { signed, width }))
        };

        let entries = [
            ("void", TypeDescriptor::new(TypeKind::Void)),
            ("bool", TypeDescriptor::new(TypeKind::Bool)),
            ("char", TypeDescriptor::new(TypeKind::Char)),
            ("string", TypeDescriptor::new(TypeKind::String)),
            ("never", TypeDescriptor::new(TypeKind::Never)),
            int("i8", true, IntWidth::W8),
            int("i16", true, IntWidth::W16),
            int("i32", true, IntWidth::W32),
            int("i64", true, IntWidth::W64),
            int("i128", true, IntWidth::W128),
            int("isize", true, IntWidth::Size),
            int("u8", false, IntWidth::W8),
            int("u16", false, IntWidth::W16),
            int("u32", false, IntWidth::W32),
            int("u64", false, IntWidth::W64),
            int("u128", false, IntWidth::W128),
            int("usize", false, IntWidth::Size),
            (
                "f32",
                TypeDescriptor::new(TypeKind::Float {
                    width: FloatWidth::W32,
                }),
            ),
            (
                "f64",
                TypeDescriptor::new(TypeKind::Float {
                    width: FloatWidth::W64,
                }),
            ),
        ];

        for (name, descriptor) in entries {
            table.insert(name, descriptor);
        }

        Self { table }
    }

    pub fn get(&self, name: &str) -> Option<TypeDescriptor> {
        self.table.get(name).cloned()
    }

    pub fn i32(&self) -> TypeDescriptor {
        self.table["i32"].clone()
    }

    pub fn f64(&self) -> TypeDescriptor {
        self.table["f64"].clone()
    }

    pub fn usize(&self) -> TypeDescriptor {
        self.table["usize"].clone()
    }

    pub fn bool(&self) -> TypeDescriptor {
        self.table["bool"].clone()
    }

    pub fn char(&self) -> TypeDescriptor {
        self.table["char"].clone()
    }

    pub fn string(&self) -> TypeDescriptor {
        self.table["string"].clone()
    }

    pub fn void(&self) -> TypeDescriptor {
        self.table["void"].clone()
    }

    pub fn never(&self) -> TypeDescriptor {
        self.table["never"].clone()
    }
}

impl Default for BuiltinTypes {
    fn default() -> Self {
        Self::new()
    }
}
