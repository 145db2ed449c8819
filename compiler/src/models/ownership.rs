//! Ownership tags, memory zones, and the per-declaration ownership
//! context derived from annotations.
//!
//! Zone enum values are FFI-visible and must stay stable.

use serde::{Deserialize, Serialize};

use crate::models::source::SourceLocation;

/// Ownership discipline declared by `#[ownership(...)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OwnershipTag {
    Gc = 0,
    C = 1,
    Pinned = 2,
}

impl OwnershipTag {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "gc" => Some(OwnershipTag::Gc),
            "c" => Some(OwnershipTag::C),
            "pinned" => Some(OwnershipTag::Pinned),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OwnershipTag::Gc => "gc",
            OwnershipTag::C => "c",
            OwnershipTag::Pinned => "pinned",
        }
    }
}

/// Memory region discipline. Values are part of the runtime ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoryZone {
    /// Traced by the collector.
    Gc = 0,
    /// Explicit free.
    Manual = 1,
    /// GC-unmovable; safe to hand across FFI.
    Pinned = 2,
    /// Scoped to the activation frame.
    Stack = 3,
}

impl MemoryZone {
    /// Zone an ownership tag maps to.
    pub fn for_ownership(tag: OwnershipTag) -> Self {
        match tag {
            OwnershipTag::Gc => MemoryZone::Gc,
            OwnershipTag::C => MemoryZone::Manual,
            OwnershipTag::Pinned => MemoryZone::Pinned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryZone::Gc => "gc",
            MemoryZone::Manual => "manual",
            MemoryZone::Pinned => "pinned",
            MemoryZone::Stack => "stack",
        }
    }
}

/// FFI transfer semantics declared on a parameter or return site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferMode {
    /// Caller releases ownership; the callee frees.
    Full,
    /// Caller retains; the callee must not free.
    None,
    /// Temporary reference, valid only for the call. Parameters only.
    Borrowed,
}

impl TransferMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "transfer_full" => Some(TransferMode::Full),
            "transfer_none" => Some(TransferMode::None),
            "borrowed" => Some(TransferMode::Borrowed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Full => "transfer_full",
            TransferMode::None => "transfer_none",
            TransferMode::Borrowed => "borrowed",
        }
    }
}

/// Derived per-declaration ownership facts, attached to every
/// allocation-producing AST node by the semantic analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipContext {
    pub ownership: OwnershipTag,
    pub memory_zone: MemoryZone,
    pub is_mutable: bool,
    pub is_borrowed: bool,
    /// Manual-zone allocations need an explicit free on every path.
    pub requires_cleanup: bool,
    pub location: SourceLocation,
}

impl OwnershipContext {
    pub fn new(tag: OwnershipTag, location: SourceLocation) -> Self {
        let memory_zone = MemoryZone::for_ownership(tag);
        Self {
            ownership: tag,
            memory_zone,
            is_mutable: false,
            is_borrowed: false,
            requires_cleanup: memory_zone == MemoryZone::Manual,
            location,
        }
    }

    /// Default context for parameters: stack zone, gc discipline.
    pub fn for_parameter(location: SourceLocation) -> Self {
        Self {
            ownership: OwnershipTag::Gc,
            memory_zone: MemoryZone::Stack,
            is_mutable: false,
            is_borrowed: true,
            requires_cleanup: false,
            location,
        }
    }
}
