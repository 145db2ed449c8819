//! Scoped symbol tables.
//!
//! Each table maps unique names to entries and points at its parent scope;
//! the analyzer owns all scopes in a `ScopeArena` and refers to them by
//! index, so AST back-references stay weak (a node id, never an owning
//! pointer). Field tables inside struct descriptors are plain standalone
//! tables with ordered iteration.

use rustc_hash::FxHashMap;

use crate::models::ast::NodeId;
use crate::models::source::SourceLocation;
use crate::models::types::TypeDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Type,
    Field,
    EnumVariant,
    Parameter,
    Const,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Option<TypeDescriptor>,
    pub visibility: Visibility,
    pub is_mutable: bool,
    pub is_used: bool,
    pub is_generic: bool,
    /// Weak back-reference to the declaring AST node.
    pub declaration: Option<NodeId>,
    pub location: SourceLocation,
}

impl SymbolEntry {
    pub fn new(name: impl Into<String>, kind: SymbolKind, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            kind,
            ty: None,
            visibility: Visibility::Private,
            is_mutable: false,
            is_used: false,
            is_generic: false,
            declaration: None,
            location,
        }
    }

    pub fn with_type(mut self, ty: TypeDescriptor) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_declaration(mut self, node: NodeId) -> Self {
        self.declaration = Some(node);
        self
    }

    pub fn mutable(mut self) -> Self {
        self.is_mutable = true;
        self
    }
}

/// Failed insert: the name already exists in this scope.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateSymbol {
    pub name: String,
    pub previous: SourceLocation,
}

/// Index of a scope within the analyzer's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: FxHashMap<String, SymbolEntry>,
    /// Insertion order, so field iteration is deterministic and ordered.
    order: Vec<String>,
    parent: Option<ScopeId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: ScopeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn insert(&mut self, entry: SymbolEntry) -> Result<(), DuplicateSymbol> {
        if let Some(existing) = self.symbols.get(&entry.name) {
            return Err(DuplicateSymbol {
                name: entry.name.clone(),
                previous: existing.location,
            });
        }
        self.order.push(entry.name.clone());
        self.symbols.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn lookup_local(&self, name: &str) -> Option<&SymbolEntry> {
        self.symbols.get(name)
    }

    pub fn lookup_local_mut(&mut self, name: &str) -> Option<&mut SymbolEntry> {
        self.symbols.get_mut(name)
    }

    /// Visit entries in insertion order. The visitor returns `true` to
    /// continue, `false` to stop early.
    pub fn iterate<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &SymbolEntry) -> bool,
    {
        for name in &self.order {
            if let Some(entry) = self.symbols.get(name) {
                if !visitor(name, entry) {
                    break;
                }
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// All scopes of one compilation unit. Scope 0 is the module root.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<SymbolTable>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self {
            scopes: vec![SymbolTable::new()],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(SymbolTable::with_parent(parent));
        id
    }

    pub fn table(&self, id: ScopeId) -> &SymbolTable {
        &self.scopes[id.0]
    }

    pub fn table_mut(&mut self, id: ScopeId) -> &mut SymbolTable {
        &mut self.scopes[id.0]
    }

    pub fn insert(&mut self, scope: ScopeId, entry: SymbolEntry) -> Result<(), DuplicateSymbol> {
        self.table_mut(scope).insert(entry)
    }

    /// Walk the scope chain from `scope` to the root.
    pub fn lookup_chain(&self, scope: ScopeId, name: &str) -> Option<&SymbolEntry> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let table = self.table(id);
            if let Some(entry) = table.lookup_local(name) {
                return Some(entry);
            }
            current = table.parent();
        }
        None
    }

    /// Resolve and mark the entry used in one pass. Returns the scope the
    /// name was found in, if any.
    pub fn mark_used(&mut self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.table(id).lookup_local(name).is_some() {
                if let Some(entry) = self.table_mut(id).lookup_local_mut(name) {
                    entry.is_used = true;
                }
                return Some(id);
            }
            current = self.table(id).parent();
        }
        None
    }

    /// Every name visible from `scope`, nearest scope first. Used for
    /// "did you mean" suggestions.
    pub fn visible_names(&self, scope: ScopeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let table = self.table(id);
            names.extend(table.names().map(str::to_string));
            current = table.parent();
        }
        names
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}
