//! Two-pass binder: ASTs in, TypeGraph + dispatcher registry out.
//!
//! Pass 1 mints a stub node for every named top-level item so that cyclic
//! references have stable identities before any body is looked at. Pass 2
//! lowers bodies into those stubs, resolving identifiers in scope order
//! (generic parameters, module-local items, `use` imports, global lookup).
//! Pass 3 registers `dispatch` statements. Post-passes flatten alias chains,
//! expand struct spreads and sanity-check `@` constraints on references.
//!
//! Resolution never fails: anything that cannot be linked becomes the shared
//! Unknown sentinel plus a diagnostic, and every later stage keeps working.

use crate::dispatcher::{DiscriminatorSelector, DispatcherRegistry};
use crate::graph::{
    DynamicSpread, FieldKey, MetaAttribute, NumericRange, ResolvedField, StructType, TypeGraph,
    TypeKind, TypeNode, TypeRef,
};
use crate::module_set::{canonicalize, ModuleSet};
use crate::version::{Version, VersionGate};
use mcdoc_diagnostics::{Diagnostic, DiagnosticKind, SchemaLocation, Span};
use mcdoc_syntax::ast::{
    AccessorRoot, Attribute, DispatchKey, DispatchTarget, FieldKind, Item, ItemKind, Literal,
    Module, Primitive, StructField, TypeExpr,
};
use std::collections::{HashMap, HashSet};

/// Result of resolving a module set.
#[derive(Debug)]
pub struct Resolution {
    pub graph: TypeGraph,
    pub dispatchers: DispatcherRegistry,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves all modules into a single type graph and dispatcher registry.
pub fn resolve(modules: impl IntoIterator<Item = Module>) -> Resolution {
    let mut set = ModuleSet::new();
    for module in modules {
        set.insert(module);
    }

    let mut resolver = Resolver::new();
    resolver.bind_headers(&set);
    resolver.bind_imports(&set);
    resolver.lower_bodies(&set);
    resolver.flatten_aliases();
    resolver.expand_spreads();
    resolver.check_refined();
    resolver.register_dispatchers();

    tracing::debug!(
        modules = set.len(),
        nodes = resolver.graph.len(),
        dispatchers = resolver.registry.len(),
        diagnostics = resolver.diagnostics.len(),
        "resolved module set"
    );

    Resolution {
        graph: resolver.graph,
        dispatchers: resolver.registry,
        diagnostics: resolver.diagnostics,
    }
}

#[derive(Clone)]
struct Template {
    module: String,
    params: Vec<String>,
    body: TemplateBody,
    span: Span,
}

#[derive(Clone)]
enum TemplateBody {
    Alias(TypeExpr),
    Struct(Vec<StructField>),
}

/// A struct body after spread expansion.
#[derive(Default, Clone)]
struct Expansion {
    fields: Vec<ResolvedField>,
    spreads: Vec<DynamicSpread>,
    open: bool,
}

/// A struct body before spread expansion.
enum RawEntry {
    Field(ResolvedField),
    Spread {
        target: TypeRef,
        gate: VersionGate,
        location: SchemaLocation,
    },
}

struct PendingDispatch {
    resource: String,
    keys: Vec<DispatchKey>,
    target: TypeRef,
    location: SchemaLocation,
}

struct LowerCtx<'a> {
    module: &'a str,
    generics: &'a HashMap<String, TypeRef>,
}

struct Resolver {
    graph: TypeGraph,
    registry: DispatcherRegistry,
    diagnostics: Vec<Diagnostic>,
    templates: HashMap<String, Template>,
    /// Per-module import table: simple name → fully qualified symbol path.
    imports: HashMap<String, HashMap<String, String>>,
    /// Struct bodies awaiting spread expansion, keyed by their stub node.
    struct_bodies: HashMap<TypeRef, Vec<RawEntry>>,
    /// Generic instantiations, memoized by template path and argument nodes.
    instantiations: HashMap<(String, Vec<TypeRef>), TypeRef>,
    /// Bare primitives are interned so `Tag<int>` written twice memoizes to
    /// the same instantiation.
    primitives: HashMap<Primitive, TypeRef>,
    pending_dispatches: Vec<PendingDispatch>,
}

impl Resolver {
    fn new() -> Self {
        Self {
            graph: TypeGraph::new(),
            registry: DispatcherRegistry::new(),
            diagnostics: Vec::new(),
            templates: HashMap::new(),
            imports: HashMap::new(),
            struct_bodies: HashMap::new(),
            instantiations: HashMap::new(),
            primitives: HashMap::new(),
            pending_dispatches: Vec::new(),
        }
    }

    fn primitive_node(&mut self, prim: Primitive) -> TypeRef {
        if let Some(existing) = self.primitives.get(&prim) {
            return *existing;
        }
        let node = self.graph.push(TypeNode::of(TypeKind::Primitive {
            prim,
            range: None,
        }));
        self.primitives.insert(prim, node);
        node
    }

    fn diag(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    // ------------------------------------------------------------------
    // Pass 1: header binding
    // ------------------------------------------------------------------

    fn bind_headers(&mut self, set: &ModuleSet) {
        for (module_path, module) in set.iter() {
            for item in &module.items {
                match &item.kind {
                    ItemKind::TypeAlias(alias) => self.declare(
                        module_path,
                        &alias.name.name,
                        &alias.params,
                        TemplateBody::Alias(alias.ty.clone()),
                        item.span,
                    ),
                    ItemKind::Struct(def) => self.declare(
                        module_path,
                        &def.name.name,
                        &def.params,
                        TemplateBody::Struct(def.fields.clone()),
                        item.span,
                    ),
                    ItemKind::Enum(def) => {
                        let full = format!("{}::{}", module_path, def.name.name);
                        let stub = self.graph.push(TypeNode::unknown());
                        self.graph.bind_path(full, stub);
                    }
                    ItemKind::Dispatch(dispatch) => {
                        // `dispatch … to struct Name { … }` declares `Name`.
                        if let DispatchTarget::Struct(def) = &dispatch.target {
                            self.declare(
                                module_path,
                                &def.name.name,
                                &def.params,
                                TemplateBody::Struct(def.fields.clone()),
                                item.span,
                            );
                        }
                    }
                    ItemKind::Use(_) => {}
                }
            }
        }
    }

    fn declare(
        &mut self,
        module_path: &str,
        name: &str,
        params: &[mcdoc_syntax::ast::Ident],
        body: TemplateBody,
        span: Span,
    ) {
        let full = format!("{}::{}", module_path, name);
        if params.is_empty() {
            let stub = self.graph.push(TypeNode::unknown());
            self.graph.bind_path(full, stub);
        } else {
            self.templates.insert(
                full,
                Template {
                    module: module_path.to_string(),
                    params: params.iter().map(|p| p.name.clone()).collect(),
                    body,
                    span,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Use imports
    // ------------------------------------------------------------------

    fn bind_imports(&mut self, set: &ModuleSet) {
        for (module_path, module) in set.iter() {
            for item in &module.items {
                let ItemKind::Use(use_item) = &item.kind else {
                    continue;
                };
                let location = SchemaLocation::new(module_path, use_item.path.span);
                let Some(symbol) = canonicalize(module_path, &use_item.path) else {
                    self.diag(
                        Diagnostic::error(
                            DiagnosticKind::UnresolvedUse,
                            format!("use path `{}` escapes the module root", use_item.path),
                        )
                        .with_schema_location(location),
                    );
                    continue;
                };
                let Some(name) = use_item.path.leaf() else {
                    self.diag(
                        Diagnostic::error(
                            DiagnosticKind::UnresolvedUse,
                            format!("use path `{}` does not name an item", use_item.path),
                        )
                        .with_schema_location(location),
                    );
                    continue;
                };
                if self.graph.lookup(&symbol).is_none() && !self.templates.contains_key(&symbol) {
                    // Non-fatal: later references fall through to unqualified
                    // lookup.
                    self.diag(
                        Diagnostic::error(
                            DiagnosticKind::UnresolvedUse,
                            format!("cannot resolve `{}`", symbol),
                        )
                        .with_schema_location(location),
                    );
                    continue;
                }
                self.imports
                    .entry(module_path.to_string())
                    .or_default()
                    .insert(name.to_string(), symbol);
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: body lowering
    // ------------------------------------------------------------------

    fn lower_bodies(&mut self, set: &ModuleSet) {
        let no_generics = HashMap::new();
        for (module_path, module) in set.iter() {
            for item in &module.items {
                self.lower_item(module_path, item, &no_generics);
            }
        }
    }

    fn lower_item(&mut self, module_path: &str, item: &Item, no_generics: &HashMap<String, TypeRef>) {
        let ctx = LowerCtx {
            module: module_path,
            generics: no_generics,
        };
        match &item.kind {
            ItemKind::Use(_) => {}
            ItemKind::TypeAlias(alias) => {
                if !alias.params.is_empty() {
                    return; // lowered on instantiation
                }
                let full = format!("{}::{}", module_path, alias.name.name);
                let Some(stub) = self.graph.lookup(&full) else {
                    return;
                };
                let target = self.lower_type(&alias.ty, &ctx);
                self.graph.set(
                    stub,
                    TypeNode::at(
                        TypeKind::Alias(target),
                        SchemaLocation::new(module_path, item.span),
                    ),
                );
            }
            ItemKind::Struct(def) => {
                if !def.params.is_empty() {
                    return;
                }
                let full = format!("{}::{}", module_path, def.name.name);
                let Some(stub) = self.graph.lookup(&full) else {
                    return;
                };
                self.lower_struct_into(stub, &def.fields, item.span, &ctx);
            }
            ItemKind::Enum(def) => {
                let full = format!("{}::{}", module_path, def.name.name);
                let Some(stub) = self.graph.lookup(&full) else {
                    return;
                };
                let mut values = Vec::with_capacity(def.entries.len());
                for entry in &def.entries {
                    if !literal_matches_base(&entry.value, def.base) {
                        self.diag(
                            Diagnostic::error(
                                DiagnosticKind::TypeMismatch,
                                format!(
                                    "enum entry `{}` is not a {} value",
                                    entry.name.name, def.base
                                ),
                            )
                            .with_schema_location(SchemaLocation::new(module_path, entry.span)),
                        );
                        continue;
                    }
                    values.push(entry.value.clone());
                }
                self.graph.set(
                    stub,
                    TypeNode::at(
                        TypeKind::Enum {
                            base: def.base,
                            values,
                        },
                        SchemaLocation::new(module_path, item.span),
                    ),
                );
            }
            ItemKind::Dispatch(dispatch) => {
                let target = match &dispatch.target {
                    DispatchTarget::Struct(def) => {
                        if def.params.is_empty() {
                            let full = format!("{}::{}", module_path, def.name.name);
                            let stub = self.graph.lookup(&full).unwrap_or_else(|| self.graph.unknown());
                            if stub != self.graph.unknown() {
                                self.lower_struct_into(stub, &def.fields, item.span, &ctx);
                            }
                            stub
                        } else {
                            // A generic dispatch target is instantiated with
                            // Unknown for every parameter.
                            let full = format!("{}::{}", module_path, def.name.name);
                            let args = vec![self.graph.unknown(); def.params.len()];
                            self.instantiate(&full, args, item.span, module_path)
                        }
                    }
                    DispatchTarget::Type(ty) => self.lower_type(ty, &ctx),
                };
                let resource: Vec<&str> =
                    dispatch.resource.iter().map(|i| i.name.as_str()).collect();
                self.pending_dispatches.push(PendingDispatch {
                    resource: format!("{}:{}", dispatch.namespace.name, resource.join("/")),
                    keys: dispatch.keys.clone(),
                    target,
                    location: SchemaLocation::new(module_path, dispatch.span),
                });
            }
        }
    }

    fn lower_struct_into(
        &mut self,
        stub: TypeRef,
        fields: &[StructField],
        span: Span,
        ctx: &LowerCtx<'_>,
    ) {
        let entries = self.lower_fields(fields, ctx);
        self.struct_bodies.insert(stub, entries);
        self.graph.set(
            stub,
            TypeNode::at(
                TypeKind::Struct(StructType {
                    fields: Vec::new(),
                    spreads: Vec::new(),
                    open: false,
                }),
                SchemaLocation::new(ctx.module, span),
            ),
        );
    }

    fn lower_fields(&mut self, fields: &[StructField], ctx: &LowerCtx<'_>) -> Vec<RawEntry> {
        let mut entries = Vec::with_capacity(fields.len());
        for field in fields {
            let gate = self.gate_from_attributes(&field.attributes, ctx.module);
            let location = SchemaLocation::new(ctx.module, field.span);
            match &field.kind {
                FieldKind::Named { name, optional, ty } => {
                    let value = self.lower_type(ty, ctx);
                    entries.push(RawEntry::Field(ResolvedField {
                        key: FieldKey::Named(name.name.clone()),
                        value,
                        optional: *optional,
                        gate,
                        location: Some(location),
                    }));
                }
                FieldKind::Computed { key, value } => {
                    let key_ref = self.lower_type(key, ctx);
                    let value_ref = self.lower_type(value, ctx);
                    entries.push(RawEntry::Field(ResolvedField {
                        key: FieldKey::Computed(key_ref),
                        value: value_ref,
                        optional: true,
                        gate,
                        location: Some(location),
                    }));
                }
                FieldKind::Spread { ty } => {
                    let target = self.lower_type(ty, ctx);
                    entries.push(RawEntry::Spread {
                        target,
                        gate,
                        location,
                    });
                }
            }
        }
        entries
    }

    // ------------------------------------------------------------------
    // Type lowering
    // ------------------------------------------------------------------

    fn lower_type(&mut self, expr: &TypeExpr, ctx: &LowerCtx<'_>) -> TypeRef {
        match expr {
            TypeExpr::Primitive { prim, .. } => self.primitive_node(*prim),
            TypeExpr::Literal { value, .. } => self
                .graph
                .push(TypeNode::of(TypeKind::Literal(value.clone()))),
            TypeExpr::Ident(ident) => {
                if let Some(bound) = ctx.generics.get(&ident.name) {
                    return *bound;
                }
                self.resolve_name(&ident.name, ident.span, ctx)
            }
            TypeExpr::Path(path) => {
                let location = SchemaLocation::new(ctx.module, path.span);
                let candidates = self.path_candidates(ctx.module, path);
                for candidate in &candidates {
                    if let Some(found) = self.graph.lookup(candidate) {
                        return found;
                    }
                    if self.templates.contains_key(candidate) {
                        return self.generic_without_args(candidate, location);
                    }
                }
                self.unresolved(format!("cannot resolve `{}`", path), location)
            }
            TypeExpr::Complex(complex) => {
                let selector = selector_from_index(&complex.index);
                // Generic arguments on dispatcher references are recorded by
                // the parser but carry no meaning for validation.
                self.graph.push(TypeNode::at(
                    TypeKind::Dispatch {
                        resource: complex.resource_id(),
                        selector,
                    },
                    SchemaLocation::new(ctx.module, complex.span),
                ))
            }
            TypeExpr::Array { elem, len, span } => {
                let elem_ref = self.lower_type(elem, ctx);
                self.graph.push(TypeNode::at(
                    TypeKind::Array {
                        elem: elem_ref,
                        len: len.as_ref().map(NumericRange::from_ast),
                    },
                    SchemaLocation::new(ctx.module, *span),
                ))
            }
            TypeExpr::StructLiteral { fields, span } => {
                let stub = self.graph.push(TypeNode::unknown());
                self.lower_struct_into(stub, fields, *span, ctx);
                stub
            }
            TypeExpr::Union { members, span } => {
                let mut variants: Vec<crate::graph::UnionVariant> = Vec::new();
                for member in members {
                    let (gate, inner) = self.split_variant_gate(member, ctx);
                    let ty = self.lower_type(inner, ctx);
                    let variant = crate::graph::UnionVariant { ty, gate };
                    // Structural dedup is by node identity only.
                    if !variants.contains(&variant) {
                        variants.push(variant);
                    }
                }
                self.graph.push(TypeNode::at(
                    TypeKind::Union { variants },
                    SchemaLocation::new(ctx.module, *span),
                ))
            }
            TypeExpr::Attributed { attributes, ty } => {
                let gate = self.gate_from_attributes(attributes, ctx.module);
                let meta = meta_from_attributes(attributes);
                let inner = self.lower_type(ty, ctx);
                if !gate.is_open() {
                    // A gate in plain type position becomes a one-variant
                    // union, so empty-after-filtering unions cover it.
                    let mut node = TypeNode::of(TypeKind::Union {
                        variants: vec![crate::graph::UnionVariant { ty: inner, gate }],
                    });
                    node.meta = meta;
                    self.graph.push(node)
                } else if !meta.is_empty() {
                    let mut node = TypeNode::of(TypeKind::Alias(inner));
                    node.meta = meta;
                    self.graph.push(node)
                } else {
                    inner
                }
            }
            TypeExpr::Constrained { base, range, span } => {
                let nrange = NumericRange::from_ast(range);
                let location = SchemaLocation::new(ctx.module, *span);
                match base.as_ref() {
                    TypeExpr::Primitive { prim, .. } if prim.is_numeric() => {
                        self.graph.push(TypeNode::at(
                            TypeKind::Primitive {
                                prim: *prim,
                                range: Some(nrange),
                            },
                            location,
                        ))
                    }
                    // On strings the range constrains the length.
                    TypeExpr::Primitive {
                        prim: Primitive::String,
                        ..
                    } => self.graph.push(TypeNode::at(
                        TypeKind::Primitive {
                            prim: Primitive::String,
                            range: Some(nrange),
                        },
                        location,
                    )),
                    TypeExpr::Primitive { prim, .. } => {
                        self.diag(
                            Diagnostic::error(
                                DiagnosticKind::ConstraintOnNonNumeric,
                                format!("`@` constraint on non-numeric type `{}`", prim),
                            )
                            .with_schema_location(location.clone()),
                        );
                        self.graph.push(TypeNode::at(
                            TypeKind::Primitive {
                                prim: *prim,
                                range: None,
                            },
                            location,
                        ))
                    }
                    TypeExpr::Literal { .. } => {
                        self.diag(
                            Diagnostic::error(
                                DiagnosticKind::ConstraintOnNonNumeric,
                                "`@` constraint on a literal type".to_string(),
                            )
                            .with_schema_location(location),
                        );
                        self.lower_type(base, ctx)
                    }
                    _ => {
                        // Constraint over a reference: checked after lowering,
                        // once the target's kind is known.
                        let base_ref = self.lower_type(base, ctx);
                        self.graph.push(TypeNode::at(
                            TypeKind::Refined {
                                base: base_ref,
                                range: nrange,
                            },
                            location,
                        ))
                    }
                }
            }
            TypeExpr::Generic { base, args, span } => {
                let location = SchemaLocation::new(ctx.module, *span);
                let arg_refs: Vec<TypeRef> = args.iter().map(|a| self.lower_type(a, ctx)).collect();
                let Some(template_path) = self.find_template_path(base, ctx) else {
                    // Arguments applied to something that is not a template.
                    let inner = self.lower_type(base, ctx);
                    if inner != self.graph.unknown() {
                        self.diag(
                            Diagnostic::warning(
                                DiagnosticKind::UnresolvedReference,
                                "type arguments applied to a non-generic type".to_string(),
                            )
                            .with_schema_location(location),
                        );
                    }
                    return inner;
                };
                self.instantiate(&template_path, arg_refs, *span, ctx.module)
            }
        }
    }

    /// Peels a `since`/`until` gate off a union member.
    fn split_variant_gate<'e>(
        &mut self,
        member: &'e TypeExpr,
        ctx: &LowerCtx<'_>,
    ) -> (VersionGate, &'e TypeExpr) {
        if let TypeExpr::Attributed { attributes, ty } = member {
            let gate = self.gate_from_attributes(attributes, ctx.module);
            if !gate.is_open() {
                return (gate, ty);
            }
        }
        (VersionGate::OPEN, member)
    }

    /// Identifier resolution: module-local, then imports, then global.
    /// (Generic parameters are handled before this is called.)
    fn resolve_name(&mut self, name: &str, span: Span, ctx: &LowerCtx<'_>) -> TypeRef {
        let location = SchemaLocation::new(ctx.module, span);
        let local = format!("{}::{}", ctx.module, name);
        if let Some(found) = self.graph.lookup(&local) {
            return found;
        }
        if self.templates.contains_key(&local) {
            return self.generic_without_args(&local, location);
        }
        if let Some(symbol) = self
            .imports
            .get(ctx.module)
            .and_then(|map| map.get(name))
            .cloned()
        {
            if let Some(found) = self.graph.lookup(&symbol) {
                return found;
            }
            if self.templates.contains_key(&symbol) {
                return self.generic_without_args(&symbol, location);
            }
        }
        if let Some(found) = self.graph.lookup(name) {
            return found;
        }
        if self.templates.contains_key(name) {
            return self.generic_without_args(name, location);
        }
        self.unresolved(format!("cannot resolve `{}`", name), location)
    }

    /// Candidate fully qualified paths for a written path, in lookup order.
    fn path_candidates(&self, module: &str, path: &mcdoc_syntax::ast::ModulePath) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(relative) = canonicalize(module, path) {
            candidates.push(relative);
        }
        if !path.absolute {
            // Fall back to reading the path as already fully qualified.
            let raw = path.to_string();
            if !candidates.contains(&raw) {
                candidates.push(raw);
            }
        }
        candidates
    }

    fn find_template_path(&mut self, base: &TypeExpr, ctx: &LowerCtx<'_>) -> Option<String> {
        match base {
            TypeExpr::Ident(ident) => {
                let local = format!("{}::{}", ctx.module, ident.name);
                if self.templates.contains_key(&local) {
                    return Some(local);
                }
                if let Some(symbol) = self.imports.get(ctx.module).and_then(|m| m.get(&ident.name))
                {
                    if self.templates.contains_key(symbol) {
                        return Some(symbol.clone());
                    }
                }
                if self.templates.contains_key(&ident.name) {
                    return Some(ident.name.clone());
                }
                None
            }
            TypeExpr::Path(path) => self
                .path_candidates(ctx.module, path)
                .into_iter()
                .find(|candidate| self.templates.contains_key(candidate)),
            _ => None,
        }
    }

    fn unresolved(&mut self, message: String, location: SchemaLocation) -> TypeRef {
        self.diag(
            Diagnostic::error(DiagnosticKind::UnresolvedReference, message)
                .with_schema_location(location),
        );
        self.graph.unknown()
    }

    fn generic_without_args(&mut self, path: &str, location: SchemaLocation) -> TypeRef {
        self.diag(
            Diagnostic::error(
                DiagnosticKind::UnresolvedReference,
                format!("generic type `{}` used without type arguments", path),
            )
            .with_schema_location(location),
        );
        self.graph.unknown()
    }

    // ------------------------------------------------------------------
    // Generic instantiation
    // ------------------------------------------------------------------

    fn instantiate(
        &mut self,
        template_path: &str,
        mut args: Vec<TypeRef>,
        span: Span,
        use_module: &str,
    ) -> TypeRef {
        let Some(template) = self.templates.get(template_path).cloned() else {
            return self.unresolved(
                format!("cannot resolve `{}`", template_path),
                SchemaLocation::new(use_module, span),
            );
        };
        if args.len() != template.params.len() {
            self.diag(
                Diagnostic::error(
                    DiagnosticKind::UnresolvedReference,
                    format!(
                        "`{}` expects {} type argument(s), got {}",
                        template_path,
                        template.params.len(),
                        args.len()
                    ),
                )
                .with_schema_location(SchemaLocation::new(use_module, span)),
            );
            args.resize(template.params.len(), self.graph.unknown());
        }

        let key = (template_path.to_string(), args.clone());
        if let Some(existing) = self.instantiations.get(&key) {
            return *existing;
        }
        // Insert the stub before lowering the body so recursive generics
        // (`type Tree<T> = struct { children: [Tree<T>] }`) hit the memo.
        let stub = self.graph.push(TypeNode::unknown());
        self.instantiations.insert(key, stub);

        let bindings: HashMap<String, TypeRef> = template
            .params
            .iter()
            .cloned()
            .zip(args.iter().copied())
            .collect();
        let ctx = LowerCtx {
            module: &template.module,
            generics: &bindings,
        };
        match &template.body {
            TemplateBody::Alias(expr) => {
                let target = self.lower_type(expr, &ctx);
                self.graph.set(
                    stub,
                    TypeNode::at(
                        TypeKind::Alias(target),
                        SchemaLocation::new(&template.module, template.span),
                    ),
                );
            }
            TemplateBody::Struct(fields) => {
                let fields = fields.clone();
                self.lower_struct_into(stub, &fields, template.span, &ctx);
            }
        }
        stub
    }

    // ------------------------------------------------------------------
    // Post-passes
    // ------------------------------------------------------------------

    /// Rewrites every alias chain to point at its terminal node; cycles
    /// collapse to Unknown with a diagnostic.
    fn flatten_aliases(&mut self) {
        let refs: Vec<TypeRef> = self.graph.refs().collect();
        for r in refs {
            let TypeKind::Alias(_) = self.graph.node(r).kind else {
                continue;
            };
            let mut visited = HashSet::new();
            visited.insert(r);
            let mut cursor = r;
            let terminal = loop {
                let TypeKind::Alias(next) = self.graph.node(cursor).kind else {
                    break Some(cursor);
                };
                if !visited.insert(next) {
                    break None;
                }
                cursor = next;
            };
            match terminal {
                Some(t) => self.graph.node_mut(r).kind = TypeKind::Alias(t),
                None => {
                    let location = self.graph.node(r).location.clone();
                    let mut diagnostic = Diagnostic::error(
                        DiagnosticKind::UnresolvedReference,
                        "circular type alias".to_string(),
                    );
                    if let Some(location) = location {
                        diagnostic = diagnostic.with_schema_location(location);
                    }
                    self.diag(diagnostic);
                    self.graph.node_mut(r).kind = TypeKind::Unknown;
                }
            }
        }
    }

    /// Flattens `...Spread` entries into plain field lists, conjoining
    /// version gates and applying last-writer-wins to duplicate names.
    /// Spreads of dispatcher references stay symbolic: their field set is
    /// only known per JSON value, so they are kept for the validator.
    fn expand_spreads(&mut self) {
        let mut roots: Vec<TypeRef> = self.struct_bodies.keys().copied().collect();
        roots.sort_by_key(|r| r.index());
        let mut cache: HashMap<TypeRef, Expansion> = HashMap::new();
        for root in roots {
            let mut stack = Vec::new();
            let expansion = self.expand_struct(root, &mut stack, &mut cache);
            if let TypeKind::Struct(body) = &mut self.graph.node_mut(root).kind {
                body.fields = expansion.fields;
                body.spreads = expansion.spreads;
                body.open = expansion.open;
            }
        }
    }

    fn expand_struct(
        &mut self,
        r: TypeRef,
        stack: &mut Vec<TypeRef>,
        cache: &mut HashMap<TypeRef, Expansion>,
    ) -> Expansion {
        if let Some(cached) = cache.get(&r) {
            return cached.clone();
        }
        stack.push(r);
        let entries = self.struct_bodies.remove(&r).unwrap_or_default();
        let mut expansion = Expansion::default();

        for entry in &entries {
            match entry {
                RawEntry::Field(field) => push_field(&mut expansion.fields, field.clone()),
                RawEntry::Spread {
                    target,
                    gate,
                    location,
                } => {
                    let resolved = self.graph.resolve_alias(*target).unwrap_or(*target);
                    if stack.contains(&resolved) {
                        self.diag(
                            Diagnostic::error(
                                DiagnosticKind::UnresolvedReference,
                                "circular spread".to_string(),
                            )
                            .with_schema_location(location.clone()),
                        );
                        continue;
                    }
                    match &self.graph.node(resolved).kind {
                        TypeKind::Unknown => {
                            // The full field set cannot be known.
                            expansion.open = true;
                        }
                        TypeKind::Dispatch { .. } => {
                            expansion.spreads.push(DynamicSpread {
                                target: resolved,
                                gate: *gate,
                            });
                        }
                        TypeKind::Struct(_) => {
                            let inherited = self.expand_struct(resolved, stack, cache);
                            expansion.open |= inherited.open;
                            for mut field in inherited.fields {
                                field.gate = field.gate.conjoin(gate);
                                push_field(&mut expansion.fields, field);
                            }
                            for spread in inherited.spreads {
                                expansion.spreads.push(DynamicSpread {
                                    target: spread.target,
                                    gate: spread.gate.conjoin(gate),
                                });
                            }
                        }
                        _ => {
                            self.diag(
                                Diagnostic::error(
                                    DiagnosticKind::TypeMismatch,
                                    "spread target is not a struct".to_string(),
                                )
                                .with_schema_location(location.clone()),
                            );
                        }
                    }
                }
            }
        }

        // Re-insert so nested expansions sharing this struct see the entries
        // via the cache instead.
        self.struct_bodies.insert(r, entries);
        stack.pop();
        cache.insert(r, expansion.clone());
        expansion
    }

    /// Checks `Reference @ range` nodes now that targets are lowered.
    fn check_refined(&mut self) {
        let refs: Vec<TypeRef> = self.graph.refs().collect();
        for r in refs {
            let TypeKind::Refined { base, .. } = self.graph.node(r).kind else {
                continue;
            };
            let target = self.graph.resolve_alias(base).unwrap_or(base);
            let ok = matches!(
                self.graph.node(target).kind,
                TypeKind::Unknown
                    | TypeKind::Refined { .. }
                    | TypeKind::Primitive {
                        prim: Primitive::Int
                            | Primitive::Float
                            | Primitive::Double
                            | Primitive::String,
                        ..
                    }
            );
            if !ok {
                let location = self.graph.node(r).location.clone();
                let mut diagnostic = Diagnostic::error(
                    DiagnosticKind::ConstraintOnNonNumeric,
                    "`@` constraint on a non-numeric type".to_string(),
                );
                if let Some(location) = location {
                    diagnostic = diagnostic.with_schema_location(location);
                }
                self.diag(diagnostic);
                self.graph.node_mut(r).kind = TypeKind::Alias(base);
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 3: dispatcher registration
    // ------------------------------------------------------------------

    fn register_dispatchers(&mut self) {
        let pending = std::mem::take(&mut self.pending_dispatches);
        for dispatch in pending {
            for key in &dispatch.keys {
                match key {
                    DispatchKey::Name { name, .. } => {
                        self.registry.register(&dispatch.resource, name, dispatch.target);
                    }
                    DispatchKey::Fallback { .. } => {
                        self.registry
                            .register_fallback(&dispatch.resource, dispatch.target);
                    }
                }
            }
            tracing::debug!(
                resource = %dispatch.resource,
                keys = dispatch.keys.len(),
                module = %dispatch.location.module,
                "registered dispatch"
            );
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    fn gate_from_attributes(&mut self, attributes: &[Attribute], module: &str) -> VersionGate {
        let mut gate = VersionGate::OPEN;
        for attr in attributes {
            let slot = match attr.name.name.as_str() {
                "since" => &mut gate.since,
                "until" => &mut gate.until,
                _ => continue,
            };
            match attr.string_value().map(|s| s.parse::<Version>()) {
                Some(Ok(version)) => *slot = Some(version),
                _ => self.diag(
                    Diagnostic::error(
                        DiagnosticKind::ParseError,
                        format!("`{}` needs a version string value", attr.name.name),
                    )
                    .with_schema_location(SchemaLocation::new(module, attr.span)),
                ),
            }
        }
        gate
    }
}

/// Appends a field, removing any earlier field with the same name
/// (last writer wins, in source order after spread expansion).
fn push_field(fields: &mut Vec<ResolvedField>, field: ResolvedField) {
    if let FieldKey::Named(name) = &field.key {
        fields.retain(|existing| !matches!(&existing.key, FieldKey::Named(n) if n == name));
    }
    fields.push(field);
}

fn selector_from_index(index: &mcdoc_syntax::ast::DispatchIndex) -> DiscriminatorSelector {
    use mcdoc_syntax::ast::DispatchIndex;
    match index {
        DispatchIndex::Static { key, .. } => {
            if key == "%fallback" {
                DiscriminatorSelector::Fallback
            } else {
                DiscriminatorSelector::Static(key.clone())
            }
        }
        DispatchIndex::Dynamic(accessor) => match &accessor.root {
            AccessorRoot::Field(name) => DiscriminatorSelector::Sibling {
                name: name.clone(),
                path: accessor.path.clone(),
            },
            AccessorRoot::Key => DiscriminatorSelector::ComputedKey,
            AccessorRoot::Parent => DiscriminatorSelector::Parent {
                path: accessor.path.clone(),
            },
            AccessorRoot::Fallback => DiscriminatorSelector::Fallback,
        },
    }
}

fn literal_matches_base(literal: &Literal, base: Primitive) -> bool {
    match base {
        Primitive::String => matches!(literal, Literal::String(_)),
        Primitive::Int => matches!(literal, Literal::Int(_)),
        Primitive::Float | Primitive::Double => {
            matches!(literal, Literal::Float(_) | Literal::Int(_))
        }
        Primitive::Boolean => matches!(literal, Literal::Bool(_)),
        Primitive::Any => true,
    }
}

fn meta_from_attributes(attributes: &[Attribute]) -> Vec<MetaAttribute> {
    attributes
        .iter()
        .filter(|attr| !matches!(attr.name.name.as_str(), "since" | "until"))
        .map(|attr| MetaAttribute {
            name: attr.name.name.clone(),
            value: attr.string_value().map(str::to_string),
        })
        .collect()
}
