//! Semantic analysis: symbol resolution, type inference with
//! expected-type propagation, literal bounds checking, annotation and
//! ownership validation, const folding, and exhaustiveness checks.
//!
//! The analyzer never aborts. All findings accumulate as diagnostics and
//! the result carries both the (mutated, type-annotated) AST and the
//! symbol scopes; the driver decides whether errors stop the pipeline.

pub mod annotations;
pub mod const_eval;
pub mod exhaustive;
mod exprs;
pub mod ownership;
pub mod strings;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::models::ast::{AstKind, AstNode, NodeFlags, NodeId, TypeExpr, TypeExprKind};
use crate::models::diagnostics::{Diagnostic, DiagnosticCode};
use crate::models::source::Span;
use crate::models::symbols::{
    ScopeArena, ScopeId, SymbolEntry, SymbolKind, SymbolTable, Visibility,
};
use crate::models::types::{
    size_estimate, BuiltinTypes, EnumType, EnumVariant, StructType, TypeDescriptor, TypeKind,
};
use crate::utils::helpers::best_suggestion;

use const_eval::{ConstResolver, ConstValue};

#[derive(Debug, Clone, Default)]
pub struct AnalyzerOptions {
    /// Strict mode: char literals require explicit type annotations.
    pub strict: bool,
    /// Skip seeding the runtime prelude (`--no-stdlib`).
    pub no_stdlib: bool,
}

/// Result of analyzing one compilation unit.
pub struct Analysis {
    pub diagnostics: Vec<Diagnostic>,
    pub scopes: ScopeArena,
    /// Folded values for const declarations, keyed by declaration node.
    pub const_values: FxHashMap<NodeId, ConstValue>,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Analyze a program in place: resolved types and flags are written onto
/// the AST nodes.
pub fn analyze(program: &mut AstNode, options: &AnalyzerOptions) -> Analysis {
    let mut analyzer = SemanticAnalyzer::new(options);
    analyzer.run(program);
    debug!(
        diagnostics = analyzer.diagnostics.len(),
        scopes = analyzer.scopes.scope_count(),
        "analysis complete"
    );
    Analysis {
        diagnostics: analyzer.diagnostics,
        scopes: analyzer.scopes,
        const_values: analyzer.const_values,
    }
}

pub(crate) struct SemanticAnalyzer {
    pub(crate) builtins: BuiltinTypes,
    pub(crate) scopes: ScopeArena,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Module-level folded constants by name, for const identifier
    /// resolution.
    module_consts: FxHashMap<String, ConstValue>,
    const_values: FxHashMap<NodeId, ConstValue>,
    pub(crate) strict: bool,
    /// Return type of the function body currently being analyzed.
    pub(crate) current_return: Option<TypeDescriptor>,
}

impl SemanticAnalyzer {
    fn new(options: &AnalyzerOptions) -> Self {
        let mut analyzer = Self {
            builtins: BuiltinTypes::new(),
            scopes: ScopeArena::new(),
            diagnostics: Vec::new(),
            module_consts: FxHashMap::default(),
            const_values: FxHashMap::default(),
            strict: options.strict,
            current_return: None,
        };
        if !options.no_stdlib {
            analyzer.seed_prelude();
        }
        analyzer
    }

    /// Runtime intrinsics every program can call.
    fn seed_prelude(&mut self) {
        let root = self.scopes.root();
        let string = self.builtins.string();
        let void = self.builtins.void();
        let never = self.builtins.never();
        let i32_ty = self.builtins.i32();

        let prelude: [(&str, Vec<TypeDescriptor>, TypeDescriptor); 5] = [
            ("log", vec![string.clone()], void.clone()),
            ("panic", vec![string.clone()], never.clone()),
            ("abort", Vec::new(), never.clone()),
            ("exit", vec![i32_ty], never.clone()),
            ("unreachable", Vec::new(), never),
        ];

        for (name, params, return_type) in prelude {
            let descriptor = TypeDescriptor::new(TypeKind::Function {
                params,
                return_type,
            });
            let entry = SymbolEntry::new(
                name,
                SymbolKind::Function,
                crate::models::source::SourceLocation::unknown(),
            )
            .with_type(descriptor)
            .with_visibility(Visibility::Public);
            // The prelude table is fixed; duplicates cannot happen.
            let _ = self.scopes.insert(root, entry);
        }
    }

    fn run(&mut self, program: &mut AstNode) {
        let AstKind::Program { decls } = &mut program.kind else {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticCode::Internal,
                "analyzer invoked on a non-program node",
                program.span,
            ));
            return;
        };

        // Pass 1: collect module-level declarations so bodies can refer
        // to anything declared earlier in the file.
        for decl in decls.iter_mut() {
            self.collect_declaration(decl);
        }

        // Pass 2: analyze function bodies.
        for decl in decls.iter_mut() {
            if matches!(
                decl.kind,
                AstKind::FunctionDecl { body: Some(_), .. }
            ) {
                self.analyze_function_body(decl);
            }
        }
    }

    // --- declaration collection ---

    fn collect_declaration(&mut self, decl: &mut AstNode) {
        match &decl.kind {
            AstKind::EnumDecl { .. } => self.collect_enum(decl),
            AstKind::StructDecl { .. } => self.collect_struct(decl),
            AstKind::FunctionDecl { .. } => self.collect_function(decl),
            AstKind::ConstDecl { .. } => self.collect_const(decl),
            AstKind::LetDecl { .. } => {
                let root = self.scopes.root();
                self.analyze_let(decl, root);
            }
            AstKind::Import { .. } | AstKind::Error => {}
            _ => {}
        }
    }

    fn collect_enum(&mut self, decl: &mut AstNode) {
        let root = self.scopes.root();
        let AstKind::EnumDecl {
            name,
            is_public,
            type_params,
            variants,
        } = &decl.kind
        else {
            return;
        };
        let name = name.clone();
        let is_public = *is_public;
        let is_generic = !type_params.is_empty();
        let type_params = type_params.clone();

        let mut resolved_variants = Vec::with_capacity(variants.len());
        let mut pending = Vec::new();
        for variant in variants {
            let payload = variant
                .payload
                .as_ref()
                .and_then(|ty| self.resolve_type_or_param(ty, root, &type_params));

            let discriminant = match &variant.value {
                Some(expr) => {
                    let resolver = ModuleConstResolver {
                        consts: &self.module_consts,
                        builtins: &self.builtins,
                        scopes: &self.scopes,
                        scope: root,
                    };
                    match const_eval::evaluate(expr, &resolver) {
                        Ok(value) => match value.as_i128().and_then(|v| i64::try_from(v).ok()) {
                            Some(v) => Some(v),
                            None => {
                                pending.push(Diagnostic::error(
                                    DiagnosticCode::InvalidLiteral,
                                    format!(
                                        "Variant `{}` has a non-integer discriminant",
                                        variant.name
                                    ),
                                    variant.span,
                                ));
                                None
                            }
                        },
                        Err(diag) => {
                            pending.push(diag);
                            None
                        }
                    }
                }
                None => None,
            };

            resolved_variants.push(EnumVariant {
                name: variant.name.clone(),
                payload,
                discriminant,
            });
        }
        self.diagnostics.extend(pending);

        let descriptor = TypeDescriptor::new(TypeKind::Enum(EnumType {
            name: name.clone(),
            variants: resolved_variants,
            is_generic,
            type_params,
        }));
        decl.resolved_type = Some(descriptor.clone());

        self.insert_module_symbol(
            decl,
            SymbolEntry::new(name, SymbolKind::Type, decl.location())
                .with_type(descriptor)
                .with_visibility(visibility(is_public))
                .with_declaration(decl.id),
        );
    }

    fn collect_struct(&mut self, decl: &mut AstNode) {
        let root = self.scopes.root();
        ownership::validate_struct_zones(decl, &mut self.diagnostics);

        let AstKind::StructDecl {
            name,
            is_public,
            type_params,
            fields,
        } = &mut decl.kind
        else {
            return;
        };
        let struct_name = name.clone();
        let is_public = *is_public;
        let is_generic = !type_params.is_empty();
        let type_params = type_params.clone();

        let mut field_table = SymbolTable::new();
        let mut pending = Vec::new();
        for field in fields.iter_mut() {
            let AstKind::FieldDecl {
                name: field_name,
                is_public: field_public,
                ty,
            } = &field.kind
            else {
                continue;
            };
            let field_name = field_name.clone();
            let field_public = *field_public;
            let ty = ty.clone();
            let span = field.span;

            let resolved = resolve_in_params(
                &self.builtins,
                &self.scopes,
                root,
                &ty,
                &type_params,
            );
            let resolved = match resolved {
                Ok(descriptor) => {
                    field.resolved_type = Some(descriptor.clone());
                    Some(descriptor)
                }
                Err((unknown, unknown_span)) => {
                    pending.push(unknown_type_diagnostic(unknown, unknown_span));
                    None
                }
            };

            let mut entry = SymbolEntry::new(field_name, SymbolKind::Field, span.start)
                .with_visibility(visibility(field_public))
                .with_declaration(field.id);
            if let Some(descriptor) = resolved {
                entry = entry.with_type(descriptor);
            }
            if let Err(duplicate) = field_table.insert(entry) {
                pending.push(Diagnostic::error(
                    DiagnosticCode::DuplicateSymbol,
                    format!(
                        "Duplicate field `{}` in struct `{}`",
                        duplicate.name, struct_name
                    ),
                    span,
                ));
            }
        }
        self.diagnostics.extend(pending);

        let descriptor = TypeDescriptor::new(TypeKind::Struct(StructType {
            name: struct_name.clone(),
            fields: field_table,
            methods: SymbolTable::new(),
            is_generic,
            type_params,
        }));
        decl.resolved_type = Some(descriptor.clone());

        self.insert_module_symbol(
            decl,
            SymbolEntry::new(struct_name, SymbolKind::Type, decl.location())
                .with_type(descriptor)
                .with_visibility(visibility(is_public))
                .with_declaration(decl.id),
        );
    }

    fn collect_function(&mut self, decl: &mut AstNode) {
        let root = self.scopes.root();
        annotations::validate_function_annotations(decl, &mut self.diagnostics);

        let AstKind::FunctionDecl {
            name,
            is_public,
            type_params,
            params,
            return_type,
            ..
        } = &mut decl.kind
        else {
            return;
        };
        let fn_name = name.clone();
        let is_public = *is_public;
        let is_generic = !type_params.is_empty();
        let type_params = type_params.clone();

        let mut pending = Vec::new();
        let mut param_types = Vec::with_capacity(params.len());
        for param in params.iter_mut() {
            let AstKind::Param { ty, .. } = &param.kind else {
                continue;
            };
            match resolve_in_params(&self.builtins, &self.scopes, root, ty, &type_params) {
                Ok(descriptor) => {
                    param.resolved_type = Some(descriptor.clone());
                    param_types.push(descriptor);
                }
                Err((unknown, span)) => {
                    pending.push(unknown_type_diagnostic(unknown, span));
                    param_types.push(self.builtins.void());
                }
            }
            param.ownership = Some(ownership::context_for_parameter(param));
        }

        let resolved_return = match return_type {
            Some(ty) => {
                match resolve_in_params(&self.builtins, &self.scopes, root, ty, &type_params) {
                    Ok(descriptor) => descriptor,
                    Err((unknown, span)) => {
                        pending.push(unknown_type_diagnostic(unknown, span));
                        self.builtins.void()
                    }
                }
            }
            None => self.builtins.void(),
        };
        self.diagnostics.extend(pending);

        let descriptor = TypeDescriptor::new(TypeKind::Function {
            params: param_types,
            return_type: resolved_return,
        });
        decl.resolved_type = Some(descriptor.clone());

        let mut entry = SymbolEntry::new(fn_name, SymbolKind::Function, decl.location())
            .with_type(descriptor)
            .with_visibility(visibility(is_public))
            .with_declaration(decl.id);
        entry.is_generic = is_generic;
        self.insert_module_symbol(decl, entry);
    }

    fn collect_const(&mut self, decl: &mut AstNode) {
        let root = self.scopes.root();
        let span = decl.span;
        let decl_id = decl.id;

        let AstKind::ConstDecl { name, is_public, ty, .. } = &decl.kind else {
            return;
        };
        let const_name = name.clone();
        let is_public = *is_public;
        let annotated = self.resolve_type(&ty.clone(), root);

        // Analyze the initializer with the annotated type as context so
        // literal bounds are checked against the declared type.
        if let AstKind::ConstDecl { init, .. } = &mut decl.kind {
            let mut init = std::mem::replace(
                init,
                Box::new(AstNode::new(decl_id, AstKind::Error, span)),
            );
            self.analyze_expr(&mut init, annotated.as_ref(), root);
            if let AstKind::ConstDecl { init: slot, .. } = &mut decl.kind {
                *slot = init;
            }
        }

        let AstKind::ConstDecl { init, .. } = &decl.kind else {
            return;
        };

        if !init.is_constant_expr() {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticCode::InvalidExpression,
                format!("Const `{const_name}` has a non-constant initializer"),
                init.span,
            ));
        } else {
            let resolver = ModuleConstResolver {
                consts: &self.module_consts,
                builtins: &self.builtins,
                scopes: &self.scopes,
                scope: root,
            };
            match const_eval::evaluate(init, &resolver) {
                Ok(value) => {
                    self.module_consts.insert(const_name.clone(), value.clone());
                    self.const_values.insert(decl_id, value);
                }
                Err(diag) => self.diagnostics.push(diag),
            }
        }

        let mut entry = SymbolEntry::new(const_name, SymbolKind::Const, span.start)
            .with_visibility(visibility(is_public))
            .with_declaration(decl_id);
        if let Some(descriptor) = annotated {
            decl.resolved_type = Some(descriptor.clone());
            entry = entry.with_type(descriptor);
        }
        self.insert_module_symbol(decl, entry);
    }

    fn insert_module_symbol(&mut self, decl: &AstNode, entry: SymbolEntry) {
        let root = self.scopes.root();
        if let Err(duplicate) = self.scopes.insert(root, entry) {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticCode::DuplicateSymbol,
                format!(
                    "Duplicate symbol `{}` (previously declared at {})",
                    duplicate.name, duplicate.previous
                ),
                decl.span,
            ));
        }
    }

    // --- bodies ---

    fn analyze_function_body(&mut self, decl: &mut AstNode) {
        let root = self.scopes.root();
        let fn_scope = self.scopes.push_child(root);

        let AstKind::FunctionDecl {
            type_params,
            params,
            body,
            ..
        } = &mut decl.kind
        else {
            return;
        };

        // Type parameters resolve to opaque nominal types inside the body.
        for type_param in type_params.iter() {
            let descriptor = TypeDescriptor::new(TypeKind::Struct(StructType {
                name: type_param.clone(),
                fields: SymbolTable::new(),
                methods: SymbolTable::new(),
                is_generic: true,
                type_params: Vec::new(),
            }));
            let mut entry = SymbolEntry::new(
                type_param.clone(),
                SymbolKind::Type,
                decl.span.start,
            )
            .with_type(descriptor);
            entry.is_generic = true;
            let _ = self.scopes.insert(fn_scope, entry);
        }

        let mut pending = Vec::new();
        for param in params.iter() {
            let AstKind::Param { name, .. } = &param.kind else {
                continue;
            };
            let mut entry = SymbolEntry::new(name.clone(), SymbolKind::Parameter, param.location())
                .with_declaration(param.id);
            if let Some(descriptor) = &param.resolved_type {
                entry = entry.with_type(descriptor.clone());
            }
            if let Err(duplicate) = self.scopes.insert(fn_scope, entry) {
                pending.push(Diagnostic::error(
                    DiagnosticCode::DuplicateSymbol,
                    format!("Duplicate parameter `{}`", duplicate.name),
                    param.span,
                ));
            }
        }
        self.diagnostics.extend(pending);

        let return_type = match decl.resolved_type.as_ref().map(TypeDescriptor::kind) {
            Some(TypeKind::Function { return_type, .. }) => Some(return_type.clone()),
            _ => None,
        };
        let previous_return = std::mem::replace(&mut self.current_return, return_type);

        if let Some(body) = body {
            self.analyze_block(body, fn_scope);
        }

        self.current_return = previous_return;
    }

    pub(crate) fn analyze_block(&mut self, block: &mut AstNode, parent: ScopeId) {
        let scope = self.scopes.push_child(parent);
        let AstKind::Block { statements } = &mut block.kind else {
            return;
        };

        let mut statements = std::mem::take(statements);
        let mut diverged = false;
        for stmt in statements.iter_mut() {
            if diverged {
                stmt.flags.set(NodeFlags::UNREACHABLE);
            }
            self.analyze_statement(stmt, scope);
            if statement_diverges(stmt) {
                diverged = true;
            }
        }

        if let AstKind::Block { statements: slot } = &mut block.kind {
            *slot = statements;
        }
        if diverged {
            block.resolved_type = Some(self.builtins.never());
        }
    }

    pub(crate) fn analyze_statement(&mut self, stmt: &mut AstNode, scope: ScopeId) {
        match &stmt.kind {
            AstKind::LetDecl { .. } => self.analyze_let(stmt, scope),
            AstKind::Block { .. } => self.analyze_block(stmt, scope),
            AstKind::ExprStmt { .. } => {
                let span = stmt.span;
                let id = stmt.id;
                if let AstKind::ExprStmt { expr } = &mut stmt.kind {
                    let mut inner =
                        std::mem::replace(expr, Box::new(AstNode::new(id, AstKind::Error, span)));
                    let ty = self.analyze_expr(&mut inner, None, scope);
                    if let AstKind::ExprStmt { expr: slot } = &mut stmt.kind {
                        *slot = inner;
                    }
                    stmt.resolved_type = ty;
                }
            }
            AstKind::Return { .. } => self.analyze_return(stmt, scope),
            AstKind::If { .. } => self.analyze_if(stmt, scope),
            AstKind::ForIn { .. } => self.analyze_for(stmt, scope),
            AstKind::Match { .. } => self.analyze_match(stmt, scope),
            AstKind::Error => {}
            _ => {
                // Declarations are module-level only.
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::InvalidOperation,
                    "This declaration is only allowed at module scope",
                    stmt.span,
                ));
            }
        }
    }

    fn analyze_let(&mut self, stmt: &mut AstNode, scope: ScopeId) {
        let span = stmt.span;
        let id = stmt.id;

        let AstKind::LetDecl { name, is_mutable, ty, .. } = &stmt.kind else {
            return;
        };
        let let_name = name.clone();
        let is_mutable = *is_mutable;
        let annotated = ty.clone().and_then(|t| self.resolve_type(&t, scope));

        let init_type = if let AstKind::LetDecl { init, .. } = &mut stmt.kind {
            let mut inner =
                std::mem::replace(init, Box::new(AstNode::new(id, AstKind::Error, span)));
            let init_type = self.analyze_expr(&mut inner, annotated.as_ref(), scope);
            if let AstKind::LetDecl { init: slot, .. } = &mut stmt.kind {
                *slot = inner;
            }
            init_type
        } else {
            None
        };

        if let (Some(expected), Some(actual)) = (&annotated, &init_type) {
            if expected != actual {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "Type mismatch: `{let_name}` is declared `{expected}` but initialized with `{actual}`"
                    ),
                    span,
                ));
            }
        }

        let binding_type = annotated.or(init_type);
        stmt.resolved_type = binding_type.clone();
        stmt.ownership = Some(ownership::context_for_declaration(stmt));

        let mut entry = SymbolEntry::new(let_name, SymbolKind::Variable, span.start)
            .with_declaration(id);
        if is_mutable {
            entry = entry.mutable();
        }
        if let Some(descriptor) = binding_type {
            entry = entry.with_type(descriptor);
        }
        if let Err(duplicate) = self.scopes.insert(scope, entry) {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticCode::DuplicateSymbol,
                format!(
                    "Duplicate symbol `{}` (previously declared at {})",
                    duplicate.name, duplicate.previous
                ),
                span,
            ));
        }
    }

    fn analyze_return(&mut self, stmt: &mut AstNode, scope: ScopeId) {
        let span = stmt.span;
        let id = stmt.id;
        let expected = self.current_return.clone();

        let AstKind::Return { value } = &mut stmt.kind else {
            return;
        };

        match value {
            Some(value) => {
                let mut inner =
                    std::mem::replace(value, Box::new(AstNode::new(id, AstKind::Error, span)));
                let actual = self.analyze_expr(&mut inner, expected.as_ref(), scope);
                if let AstKind::Return { value: Some(slot) } = &mut stmt.kind {
                    *slot = inner;
                }
                if let (Some(expected), Some(actual)) = (&expected, &actual) {
                    if expected != actual && !expected.is_void() {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::TypeMismatch,
                            format!(
                                "Type mismatch: function returns `{expected}` but found `{actual}`"
                            ),
                            span,
                        ));
                    }
                }
            }
            None => {
                if let Some(expected) = &expected {
                    if !expected.is_void() && !expected.is_never() {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticCode::TypeMismatch,
                            format!("Type mismatch: function returns `{expected}` but found no value"),
                            span,
                        ));
                    }
                }
            }
        }
    }

    fn analyze_if(&mut self, stmt: &mut AstNode, scope: ScopeId) {
        let span = stmt.span;
        let id = stmt.id;
        let bool_ty = self.builtins.bool();

        let AstKind::If { condition, .. } = &mut stmt.kind else {
            return;
        };
        let mut cond =
            std::mem::replace(condition, Box::new(AstNode::new(id, AstKind::Error, span)));
        let cond_type = self.analyze_expr(&mut cond, Some(&bool_ty), scope);
        if let Some(cond_type) = &cond_type {
            if !cond_type.is_bool() {
                self.diagnostics.push(Diagnostic::error(
                    DiagnosticCode::TypeMismatch,
                    format!("If condition must be `bool`, found `{cond_type}`"),
                    cond.span,
                ));
            }
        }
        if let AstKind::If { condition: slot, .. } = &mut stmt.kind {
            *slot = cond;
        }

        if let AstKind::If {
            then_block,
            else_block,
            ..
        } = &mut stmt.kind
        {
            let mut then_block = std::mem::replace(
                then_block,
                Box::new(AstNode::new(id, AstKind::Error, span)),
            );
            let mut else_taken = else_block.take();

            self.analyze_block(&mut then_block, scope);
            if let Some(else_node) = else_taken.as_mut() {
                // `else if` nests another if statement, not a block.
                if matches!(else_node.kind, AstKind::If { .. }) {
                    self.analyze_if(else_node, scope);
                } else {
                    self.analyze_block(else_node, scope);
                }
            }

            if let AstKind::If {
                then_block: then_slot,
                else_block: else_slot,
                ..
            } = &mut stmt.kind
            {
                *then_slot = then_block;
                *else_slot = else_taken;
            }
        }
    }

    fn analyze_for(&mut self, stmt: &mut AstNode, scope: ScopeId) {
        let span = stmt.span;
        let id = stmt.id;

        let AstKind::ForIn { binding, .. } = &stmt.kind else {
            return;
        };
        let binding = binding.clone();

        let element_type = if let AstKind::ForIn { iterable, .. } = &mut stmt.kind {
            let mut inner =
                std::mem::replace(iterable, Box::new(AstNode::new(id, AstKind::Error, span)));
            let iterable_type = self.analyze_expr(&mut inner, None, scope);
            let iterable_span = inner.span;
            if let AstKind::ForIn { iterable: slot, .. } = &mut stmt.kind {
                *slot = inner;
            }

            match iterable_type.as_ref().map(TypeDescriptor::kind) {
                Some(TypeKind::Slice { element, .. }) => Some(element.clone()),
                Some(_) => {
                    let found = iterable_type.as_ref().map(|t| t.display_name());
                    self.diagnostics.push(Diagnostic::error(
                        DiagnosticCode::InvalidOperation,
                        format!(
                            "`for .. in` requires a slice, found `{}`",
                            found.unwrap_or_default()
                        ),
                        iterable_span,
                    ));
                    None
                }
                None => None,
            }
        } else {
            None
        };

        let loop_scope = self.scopes.push_child(scope);
        let mut entry =
            SymbolEntry::new(binding, SymbolKind::Variable, span.start).with_declaration(id);
        if let Some(element) = element_type {
            entry = entry.with_type(element);
        }
        let _ = self.scopes.insert(loop_scope, entry);

        if let AstKind::ForIn { body, .. } = &mut stmt.kind {
            let mut body_block =
                std::mem::replace(body, Box::new(AstNode::new(id, AstKind::Error, span)));
            self.analyze_block(&mut body_block, loop_scope);
            if let AstKind::ForIn { body: slot, .. } = &mut stmt.kind {
                *slot = body_block;
            }
        }
    }

    fn analyze_match(&mut self, stmt: &mut AstNode, scope: ScopeId) {
        let span = stmt.span;
        let id = stmt.id;

        let scrutinee_type = if let AstKind::Match { scrutinee, .. } = &mut stmt.kind {
            let mut inner =
                std::mem::replace(scrutinee, Box::new(AstNode::new(id, AstKind::Error, span)));
            let ty = self.analyze_expr(&mut inner, None, scope);
            if let AstKind::Match { scrutinee: slot, .. } = &mut stmt.kind {
                *slot = inner;
            }
            ty
        } else {
            None
        };

        let AstKind::Match { arms, .. } = &mut stmt.kind else {
            return;
        };
        let mut arms_taken = std::mem::take(arms);

        for arm in arms_taken.iter_mut() {
            let arm_scope = self.scopes.push_child(scope);

            if let crate::models::ast::MatchPattern::Variant { name, binding } = &arm.pattern {
                let variant_info = match scrutinee_type.as_ref().map(TypeDescriptor::kind) {
                    Some(TypeKind::Enum(enum_type)) => {
                        match enum_type.variants.iter().find(|v| v.name == *name) {
                            Some(variant) => Some(variant.payload.clone()),
                            None => {
                                let candidates: Vec<&str> =
                                    enum_type.variants.iter().map(|v| v.name.as_str()).collect();
                                let mut diag = Diagnostic::error(
                                    DiagnosticCode::UndefinedSymbol,
                                    format!(
                                        "Enum `{}` has no variant `{name}`",
                                        enum_type.name
                                    ),
                                    arm.pattern_span,
                                );
                                if let Some(suggestion) =
                                    best_suggestion(name, candidates.into_iter())
                                {
                                    diag = diag.with_suggestion(suggestion);
                                }
                                self.diagnostics.push(diag);
                                None
                            }
                        }
                    }
                    _ => None,
                };

                if let Some(binding_name) = binding {
                    let mut entry = SymbolEntry::new(
                        binding_name.clone(),
                        SymbolKind::Variable,
                        arm.pattern_span.start,
                    );
                    if let Some(Some(payload)) = variant_info {
                        entry = entry.with_type(payload);
                    }
                    let _ = self.scopes.insert(arm_scope, entry);
                }
            }

            if matches!(arm.body.kind, AstKind::Block { .. }) {
                self.analyze_block(&mut arm.body, arm_scope);
            } else {
                let mut body = std::mem::replace(
                    &mut arm.body,
                    AstNode::new(id, AstKind::Error, span),
                );
                self.analyze_expr(&mut body, None, arm_scope);
                arm.body = body;
            }
        }

        if let Some(scrutinee_type) = &scrutinee_type {
            exhaustive::check_match_exhaustiveness(
                scrutinee_type,
                &arms_taken,
                span,
                &mut self.diagnostics,
            );
        }

        if let AstKind::Match { arms: slot, .. } = &mut stmt.kind {
            *slot = arms_taken;
        }
    }

    // --- type resolution ---

    pub(crate) fn resolve_type(&mut self, ty: &TypeExpr, scope: ScopeId) -> Option<TypeDescriptor> {
        match resolve_type_expr(&self.builtins, &self.scopes, scope, ty) {
            Ok(descriptor) => Some(descriptor),
            Err((unknown, span)) => {
                self.diagnostics.push(unknown_type_diagnostic(unknown, span));
                None
            }
        }
    }

    fn resolve_type_or_param(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        type_params: &[String],
    ) -> Option<TypeDescriptor> {
        match resolve_in_params(&self.builtins, &self.scopes, scope, ty, type_params) {
            Ok(descriptor) => Some(descriptor),
            Err((unknown, span)) => {
                self.diagnostics.push(unknown_type_diagnostic(unknown, span));
                None
            }
        }
    }
}

fn visibility(is_public: bool) -> Visibility {
    if is_public {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn unknown_type_diagnostic(name: String, span: Span) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::UndefinedSymbol,
        format!("Unknown type `{name}`"),
        span,
    )
}

/// A statement after which the rest of the block is unreachable.
fn statement_diverges(stmt: &AstNode) -> bool {
    match &stmt.kind {
        AstKind::Return { .. } => true,
        AstKind::ExprStmt { .. } | AstKind::Block { .. } => stmt.type_is_never(),
        _ => false,
    }
}

/// Resolve a syntactic type, treating `type_params` as opaque nominal
/// types.
fn resolve_in_params(
    builtins: &BuiltinTypes,
    scopes: &ScopeArena,
    scope: ScopeId,
    ty: &TypeExpr,
    type_params: &[String],
) -> Result<TypeDescriptor, (String, Span)> {
    if let TypeExprKind::Named { name, args } = &ty.kind {
        if type_params.contains(name) && args.is_empty() {
            return Ok(TypeDescriptor::new(TypeKind::Struct(StructType {
                name: name.clone(),
                fields: SymbolTable::new(),
                methods: SymbolTable::new(),
                is_generic: true,
                type_params: Vec::new(),
            })));
        }
    }
    resolve_type_expr(builtins, scopes, scope, ty)
}

/// Shared, diagnostic-free type resolution. `Err` carries the unknown
/// name and its span.
pub(crate) fn resolve_type_expr(
    builtins: &BuiltinTypes,
    scopes: &ScopeArena,
    scope: ScopeId,
    ty: &TypeExpr,
) -> Result<TypeDescriptor, (String, Span)> {
    match &ty.kind {
        TypeExprKind::Named { name, args } => {
            for arg in args {
                resolve_type_expr(builtins, scopes, scope, arg)?;
            }
            if let Some(descriptor) = builtins.get(name) {
                return Ok(descriptor);
            }
            match scopes.lookup_chain(scope, name) {
                Some(entry) if entry.kind == SymbolKind::Type => match &entry.ty {
                    Some(descriptor) => Ok(descriptor.clone()),
                    None => Err((name.clone(), ty.span)),
                },
                _ => Err((name.clone(), ty.span)),
            }
        }
        TypeExprKind::Slice { element, is_mutable } => {
            let element = resolve_type_expr(builtins, scopes, scope, element)?;
            Ok(TypeDescriptor::new(TypeKind::Slice {
                element,
                is_mutable: *is_mutable,
            }))
        }
        TypeExprKind::Pointer {
            pointee,
            is_mutable,
        } => {
            let pointee = resolve_type_expr(builtins, scopes, scope, pointee)?;
            Ok(TypeDescriptor::new(TypeKind::Pointer {
                pointee,
                is_mutable: *is_mutable,
            }))
        }
    }
}

/// Const-identifier and sizeof resolution backed by the module scope.
struct ModuleConstResolver<'a> {
    consts: &'a FxHashMap<String, ConstValue>,
    builtins: &'a BuiltinTypes,
    scopes: &'a ScopeArena,
    scope: ScopeId,
}

impl ConstResolver for ModuleConstResolver<'_> {
    fn resolve_const(&self, name: &str) -> Option<ConstValue> {
        self.consts.get(name).cloned()
    }

    fn resolve_sizeof(&self, node: &AstNode) -> Option<u128> {
        let AstKind::SizeOf { ty } = &node.kind else {
            return None;
        };
        resolve_type_expr(self.builtins, self.scopes, self.scope, ty)
            .ok()
            .map(|descriptor| size_estimate(&descriptor) as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::FileId;
    use crate::services::parser::parse;

    fn analyze_src(src: &str) -> (AstNode, Analysis) {
        analyze_src_with(src, &AnalyzerOptions::default())
    }

    fn analyze_src_with(src: &str, options: &AnalyzerOptions) -> (AstNode, Analysis) {
        let (mut program, parse_diags) = parse(src, FileId(0));
        assert!(
            !parse_diags.iter().any(Diagnostic::is_error),
            "parse errors: {parse_diags:?}"
        );
        let analysis = analyze(&mut program, options);
        (program, analysis)
    }

    fn error_codes(analysis: &Analysis) -> Vec<DiagnosticCode> {
        analysis.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn literal_at_bound_is_accepted() {
        let (program, analysis) = analyze_src("let x: i8 = 127;");
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);

        let AstKind::Program { decls } = &program.kind else {
            unreachable!()
        };
        assert_eq!(
            decls[0].resolved_type.as_ref().map(|t| t.display_name()),
            Some("i8".to_string())
        );
    }

    #[test]
    fn literal_one_past_bound_is_invalid() {
        let (_, analysis) = analyze_src("let x: i8 = 128;");
        let diag = analysis
            .diagnostics
            .iter()
            .find(|d| d.code == DiagnosticCode::InvalidLiteral)
            .expect("expected INVALID_LITERAL");
        assert_eq!(
            diag.message,
            "Integer literal 128 exceeds range of type i8"
        );
    }

    #[test]
    fn negative_bound_is_one_wider() {
        let (_, analysis) = analyze_src("let x: i8 = -128;");
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);

        let (_, analysis) = analyze_src("let x: i8 = -129;");
        assert!(error_codes(&analysis).contains(&DiagnosticCode::InvalidLiteral));
    }

    #[test]
    fn unannotated_literal_defaults_to_i32() {
        let (program, analysis) = analyze_src("let x = 7;");
        assert!(!analysis.has_errors());
        let AstKind::Program { decls } = &program.kind else {
            unreachable!()
        };
        assert_eq!(
            decls[0].resolved_type.as_ref().map(|t| t.display_name()),
            Some("i32".to_string())
        );
    }

    #[test]
    fn undefined_symbol_gets_suggestion() {
        let (_, analysis) =
            analyze_src("fn main() { let value = 1; log_value(valuee); }\nfn log_value(v: i32) {}");
        let diag = analysis
            .diagnostics
            .iter()
            .find(|d| d.code == DiagnosticCode::UndefinedSymbol)
            .expect("expected UNDEFINED_SYMBOL");
        assert_eq!(diag.suggestion.as_deref(), Some("value"));
    }

    #[test]
    fn strict_mode_requires_char_annotation() {
        let options = AnalyzerOptions {
            strict: true,
            ..Default::default()
        };
        let (_, analysis) = analyze_src_with("fn f() { let c = 'a'; }", &options);
        // `let c = 'a'` gives the literal no expected type.
        assert!(error_codes(&analysis).contains(&DiagnosticCode::TypeAnnotationRequired));

        let (_, analysis) = analyze_src_with("fn f() { let c: char = 'a'; }", &options);
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);
    }

    #[test]
    fn const_with_non_const_initializer_is_rejected() {
        let (_, analysis) = analyze_src(
            "fn get() -> i32 { return 4; }\nconst LIMIT: i32 = get();",
        );
        assert!(error_codes(&analysis).contains(&DiagnosticCode::InvalidExpression));
    }

    #[test]
    fn const_folding_covers_sizeof_and_arithmetic() {
        let (program, analysis) =
            analyze_src("const WORDS: usize = 4;\nconst BYTES: usize = WORDS * sizeof(u64);");
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);

        let AstKind::Program { decls } = &program.kind else {
            unreachable!()
        };
        assert_eq!(
            analysis.const_values.get(&decls[1].id),
            Some(&ConstValue::Int(32))
        );
    }

    #[test]
    fn statements_after_never_call_are_marked_unreachable() {
        let (program, analysis) =
            analyze_src("fn f() { panic(\"boom\"); log(\"unreachable\"); }");
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);

        let AstKind::Program { decls } = &program.kind else {
            unreachable!()
        };
        let AstKind::FunctionDecl { body: Some(body), .. } = &decls[0].kind else {
            unreachable!()
        };
        let AstKind::Block { statements } = &body.kind else {
            unreachable!()
        };
        assert!(!statements[0].is_unreachable());
        assert!(statements[1].is_unreachable());
    }

    #[test]
    fn conflicting_transfer_annotations_surface_through_analysis() {
        let (_, analysis) =
            analyze_src("extern fn f(#[transfer_full] #[borrowed] p: *mut u8);");
        assert!(error_codes(&analysis).contains(&DiagnosticCode::ConflictingAnnotations));
    }

    #[test]
    fn multiline_string_literal_is_normalized_during_analysis() {
        let src = "let banner = \"\n    hello\n    world\n  \";";
        let (program, analysis) = analyze_src(src);
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);

        let AstKind::Program { decls } = &program.kind else {
            unreachable!()
        };
        let AstKind::LetDecl { init, .. } = &decls[0].kind else {
            unreachable!()
        };
        let AstKind::StringLiteral { value, .. } = &init.kind else {
            unreachable!()
        };
        assert_eq!(value, "\nhello\nworld\n");
    }

    #[test]
    fn match_over_enum_checks_exhaustiveness() {
        let src = "enum Color { Red, Green, Blue }\n\
                   fn f(c: Color) { match c { Red => log(\"r\"), Green => log(\"g\") } }";
        let (_, analysis) = analyze_src(src);
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::NonExhaustiveMatch));
    }

    #[test]
    fn duplicate_module_symbol_is_rejected() {
        let (_, analysis) = analyze_src("let x = 1;\nlet x = 2;");
        assert!(error_codes(&analysis).contains(&DiagnosticCode::DuplicateSymbol));
    }

    #[test]
    fn for_in_over_slice_types_the_binding() {
        let (_, analysis) = analyze_src(
            "fn sum(items: []u32) -> u32 { let mut total: u32 = 0; for item in items { total = total + item; } return total; }",
        );
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);
    }

    #[test]
    fn call_type_mismatch_is_reported() {
        let (_, analysis) = analyze_src("fn f() { log(42); }");
        assert!(error_codes(&analysis).contains(&DiagnosticCode::TypeMismatch));
    }
}
