//! The validation walk.
//!
//! A [`Run`] is created per `validate` call and walks the JSON value and the
//! type graph in lockstep. Schema-vs-data mismatches become diagnostics and
//! the walk continues; only malformed graph states (resolver bugs) surface as
//! `InternalError`. Recursion is bounded by the JSON tree; a depth cap guards
//! the degenerate schemas (self-referential unions, self-dispatching
//! dispatchers) that recurse without consuming JSON.

use crate::path::{PathSegment, PathStack};
use mcdoc_diagnostics::{Diagnostic, DiagnosticKind};
use mcdoc_resolver::{
    DiscriminatorSelector, DispatcherKey, DispatcherMap, DispatcherRegistry, FieldKey,
    NumericRange, ResolvedField, StructType, TypeGraph, TypeKind, TypeRef, UnionVariant, Version,
    VersionGate,
};
use mcdoc_syntax::ast::{Literal, Primitive};
use serde_json::Value;
use std::collections::HashSet;

/// Frames that recurse without consuming JSON are cut off here.
const MAX_DEPTH: usize = 256;

/// Where validation starts: a named type, or a dispatcher variant chosen by
/// the caller (typically from the file path).
#[derive(Debug, Clone, Copy)]
pub enum Start<'a> {
    /// Fully qualified type path, `java::data::worldgen::biome::Biome`.
    Type(&'a str),
    /// `(dispatcher resource, key)`, e.g. `("minecraft:resource", "worldgen/biome")`.
    Dispatch { resource: &'a str, key: &'a str },
}

/// Validates `json` against `start` for `version`. Never panics and never
/// throws: every finding is a diagnostic, in depth-first JSON traversal order.
pub fn validate(
    graph: &TypeGraph,
    dispatchers: &DispatcherRegistry,
    start: Start<'_>,
    json: &Value,
    version: Version,
) -> Vec<Diagnostic> {
    let root = match start {
        Start::Type(path) => match graph.lookup(path) {
            Some(r) => r,
            None => {
                return vec![Diagnostic::error(
                    DiagnosticKind::InternalError,
                    format!("start type `{}` does not exist in the schema set", path),
                )]
            }
        },
        Start::Dispatch { resource, key } => {
            match dispatchers.query(&DispatcherKey::new(resource, key)) {
                Some(r) => r,
                None => {
                    return vec![Diagnostic::error(
                        DiagnosticKind::InternalError,
                        format!("no dispatch entry for `{}[{}]`", resource, key),
                    )]
                }
            }
        }
    };

    let mut run = Run {
        graph,
        dispatchers,
        version,
        path: PathStack::new(),
        ancestors: Vec::new(),
        computed_keys: Vec::new(),
        depth: 0,
        diagnostics: Vec::new(),
    };
    run.check(root, json);
    run.diagnostics
}

struct Run<'a> {
    graph: &'a TypeGraph,
    dispatchers: &'a DispatcherRegistry,
    version: Version,
    path: PathStack,
    /// JSON values above the current cursor, outermost first.
    ancestors: Vec<&'a Value>,
    /// Innermost computed-field key being matched, for `[[%key]]`.
    computed_keys: Vec<String>,
    depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Run<'a> {
    fn diag(&mut self, diagnostic: Diagnostic) {
        self.diagnostics
            .push(diagnostic.with_json_path(self.path.render()));
    }

    fn check(&mut self, r: TypeRef, value: &'a Value) {
        if self.depth >= MAX_DEPTH {
            self.diag(Diagnostic::error(
                DiagnosticKind::InternalError,
                "validation recursion limit reached (cyclic schema?)".to_string(),
            ));
            return;
        }
        self.depth += 1;
        self.check_inner(r, value);
        self.depth -= 1;
    }

    fn check_inner(&mut self, r: TypeRef, value: &'a Value) {
        let Some(resolved) = self.graph.resolve_alias(r) else {
            self.diag(Diagnostic::error(
                DiagnosticKind::InternalError,
                "unterminated alias chain in type graph".to_string(),
            ));
            return;
        };
        let node = self.graph.node(resolved);
        match &node.kind {
            TypeKind::Unknown => {}
            TypeKind::Alias(_) => unreachable!("resolve_alias returns non-alias nodes"),
            TypeKind::Primitive { prim, range } => self.check_primitive(*prim, *range, value),
            TypeKind::Literal(literal) => self.check_literal(literal, value),
            TypeKind::Array { elem, len } => self.check_array(*elem, *len, value),
            TypeKind::Struct(body) => self.check_struct(body, value),
            TypeKind::Enum { base, values } => self.check_enum(*base, values, value),
            TypeKind::Union { variants } => self.check_union(variants, value),
            TypeKind::Dispatch { resource, selector } => {
                self.check_dispatch(resource, selector, value)
            }
            TypeKind::Refined { base, range } => {
                self.check(*base, value);
                self.apply_refinement(*range, value);
            }
        }
    }

    // ------------------------------------------------------------------
    // Primitives and literals
    // ------------------------------------------------------------------

    fn check_primitive(&mut self, prim: Primitive, range: Option<NumericRange>, value: &Value) {
        match prim {
            Primitive::Any => {}
            Primitive::Boolean => {
                if !value.is_boolean() {
                    self.mismatch("boolean", value);
                }
            }
            Primitive::String => {
                let Some(s) = value.as_str() else {
                    self.mismatch("string", value);
                    return;
                };
                if let Some(range) = range {
                    let length = s.chars().count();
                    if !range.contains(length as f64) {
                        self.diag(Diagnostic::error(
                            DiagnosticKind::LengthOutOfRange,
                            format!("string length {} is outside {}", length, range),
                        ));
                    }
                }
            }
            Primitive::Int => {
                let Some(number) = integral_value(value) else {
                    self.mismatch("integer", value);
                    return;
                };
                if let Some(range) = range {
                    if !range.contains(number) {
                        self.out_of_range(number, range);
                    }
                }
            }
            Primitive::Float | Primitive::Double => {
                let Some(number) = value.as_f64() else {
                    self.mismatch("number", value);
                    return;
                };
                if let Some(range) = range {
                    if !range.contains(number) {
                        self.out_of_range(number, range);
                    }
                }
            }
        }
    }

    fn check_literal(&mut self, literal: &Literal, value: &Value) {
        if !literal_matches(literal, value) {
            self.diag(Diagnostic::error(
                DiagnosticKind::TypeMismatch,
                format!("expected {}, got {}", literal, json_type_name(value)),
            ));
        }
    }

    fn check_array(&mut self, elem: TypeRef, len: Option<NumericRange>, value: &'a Value) {
        let Some(items) = value.as_array() else {
            self.mismatch("array", value);
            return;
        };
        if let Some(len) = len {
            if !len.contains(items.len() as f64) {
                self.diag(Diagnostic::error(
                    DiagnosticKind::LengthOutOfRange,
                    format!("array length {} is outside {}", items.len(), len),
                ));
            }
        }
        for (i, item) in items.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            self.ancestors.push(value);
            self.check(elem, item);
            self.ancestors.pop();
            self.path.pop();
        }
    }

    fn check_enum(&mut self, base: Primitive, values: &[Literal], value: &Value) {
        if values.iter().any(|v| literal_matches(v, value)) {
            return;
        }
        let allowed: Vec<String> = values.iter().take(8).map(|v| v.to_string()).collect();
        let message = match value {
            Value::String(s) => format!("\"{}\" is not an allowed enum value", s),
            other => format!(
                "{} is not an allowed {} enum value",
                json_type_name(other),
                base
            ),
        };
        self.diag(
            Diagnostic::error(DiagnosticKind::EnumValueNotAllowed, message)
                .with_hint(format!("allowed: {}", allowed.join(", "))),
        );
    }

    // ------------------------------------------------------------------
    // Structs
    // ------------------------------------------------------------------

    fn check_struct(&mut self, body: &StructType, value: &'a Value) {
        let Some(object) = value.as_object() else {
            self.mismatch("object", value);
            return;
        };

        // Static fields plus whatever the dispatcher spreads contribute for
        // this particular value.
        let mut fields: Vec<ResolvedField> = body.fields.clone();
        let mut open = body.open;
        if !body.spreads.is_empty() {
            let mut visited = HashSet::new();
            for spread in &body.spreads {
                if !spread.gate.applies_to(self.version) {
                    continue;
                }
                self.collect_spread_fields(
                    spread.target,
                    spread.gate,
                    value,
                    &mut fields,
                    &mut open,
                    &mut visited,
                );
            }
        }

        let mut remaining: Vec<&String> = object.keys().collect();

        for field in &fields {
            if !field.gate.applies_to(self.version) {
                continue;
            }
            match &field.key {
                FieldKey::Named(name) => {
                    if let Some(child) = object.get(name) {
                        remaining.retain(|k| *k != name);
                        self.path.push(PathSegment::Field(name.clone()));
                        self.ancestors.push(value);
                        self.check(field.value, child);
                        self.ancestors.pop();
                        self.path.pop();
                    } else if !field.optional {
                        self.path.push(PathSegment::Field(name.clone()));
                        let mut diagnostic = Diagnostic::error(
                            DiagnosticKind::MissingRequiredField,
                            format!("missing required field `{}`", name),
                        );
                        if let Some(location) = &field.location {
                            diagnostic = diagnostic.with_schema_location(location.clone());
                        }
                        self.diag(diagnostic);
                        self.path.pop();
                    }
                }
                FieldKey::Computed(key_type) => {
                    let matched: Vec<&String> = remaining
                        .iter()
                        .copied()
                        .filter(|k| self.string_matches_key(*key_type, k.as_str(), 0))
                        .collect();
                    for key in matched {
                        remaining.retain(|k| *k != key);
                        let Some(child) = object.get(key.as_str()) else {
                            continue;
                        };
                        self.path.push(PathSegment::Field(key.clone()));
                        self.ancestors.push(value);
                        self.computed_keys.push(key.clone());
                        self.check(field.value, child);
                        self.computed_keys.pop();
                        self.ancestors.pop();
                        self.path.pop();
                    }
                }
            }
        }

        if open || self.has_catch_all(&fields) {
            return;
        }
        for key in remaining {
            self.path.push(PathSegment::Field(key.clone()));
            self.diag(Diagnostic::error(
                DiagnosticKind::UnexpectedField,
                format!("unexpected field `{}`", key),
            ));
            self.path.pop();
        }
    }

    /// Resolves one dispatcher spread against the current value and appends
    /// the fields of the selected struct. A failed selection opens the struct
    /// so the leftovers are not misreported.
    fn collect_spread_fields(
        &mut self,
        dispatch_ref: TypeRef,
        gate: VersionGate,
        value: &'a Value,
        fields: &mut Vec<ResolvedField>,
        open: &mut bool,
        visited: &mut HashSet<TypeRef>,
    ) {
        let Some(resolved) = self.graph.resolve_alias(dispatch_ref) else {
            return;
        };
        let TypeKind::Dispatch { resource, selector } = &self.graph.node(resolved).kind else {
            return;
        };
        let Some(target) = self.select_dispatch_target(resource, selector, value) else {
            *open = true;
            return;
        };
        let Some(target) = self.graph.resolve_alias(target.0) else {
            return;
        };
        if !visited.insert(target) {
            return;
        }
        match &self.graph.node(target).kind {
            TypeKind::Unknown => *open = true,
            TypeKind::Struct(inherited) => {
                for field in &inherited.fields {
                    let mut field = field.clone();
                    field.gate = field.gate.conjoin(&gate);
                    push_field(fields, field);
                }
                *open |= inherited.open;
                for spread in inherited.spreads.clone() {
                    self.collect_spread_fields(
                        spread.target,
                        spread.gate.conjoin(&gate),
                        value,
                        fields,
                        open,
                        visited,
                    );
                }
            }
            _ => {
                self.diag(Diagnostic::error(
                    DiagnosticKind::TypeMismatch,
                    "dispatched spread target is not a struct".to_string(),
                ));
                *open = true;
            }
        }
    }

    /// True when the string `key` satisfies a computed-field key type.
    /// Purely structural: no diagnostics, no JSON involvement.
    fn string_matches_key(&self, key_type: TypeRef, key: &str, depth: usize) -> bool {
        if depth > 32 {
            return false;
        }
        let Some(resolved) = self.graph.resolve_alias(key_type) else {
            return false;
        };
        match &self.graph.node(resolved).kind {
            TypeKind::Unknown => true,
            TypeKind::Primitive {
                prim: Primitive::Any,
                ..
            } => true,
            TypeKind::Primitive {
                prim: Primitive::String,
                range,
            } => range.map_or(true, |r| r.contains(key.chars().count() as f64)),
            TypeKind::Literal(Literal::String(s)) => s == key,
            TypeKind::Enum {
                base: Primitive::String,
                values,
            } => values
                .iter()
                .any(|v| matches!(v, Literal::String(s) if s == key)),
            TypeKind::Union { variants } => variants.iter().any(|v| {
                v.gate.applies_to(self.version) && self.string_matches_key(v.ty, key, depth + 1)
            }),
            TypeKind::Refined { base, range } => {
                self.string_matches_key(*base, key, depth + 1)
                    && range.contains(key.chars().count() as f64)
            }
            _ => false,
        }
    }

    /// A computed field whose key type accepts any string makes the struct a
    /// catch-all for leftover keys.
    fn has_catch_all(&self, fields: &[ResolvedField]) -> bool {
        fields.iter().any(|field| {
            if !field.gate.applies_to(self.version) {
                return false;
            }
            let FieldKey::Computed(key_type) = &field.key else {
                return false;
            };
            let Some(resolved) = self.graph.resolve_alias(*key_type) else {
                return false;
            };
            matches!(
                self.graph.node(resolved).kind,
                TypeKind::Unknown
                    | TypeKind::Primitive {
                        prim: Primitive::Any,
                        ..
                    }
                    | TypeKind::Primitive {
                        prim: Primitive::String,
                        range: None,
                    }
            )
        })
    }

    // ------------------------------------------------------------------
    // Unions
    // ------------------------------------------------------------------

    fn check_union(&mut self, variants: &[UnionVariant], value: &'a Value) {
        let applicable: Vec<UnionVariant> = variants
            .iter()
            .filter(|v| v.gate.applies_to(self.version))
            .copied()
            .collect();
        // No active variant for this version: no schema to check against.
        if applicable.is_empty() {
            return;
        }

        let mut summaries = Vec::with_capacity(applicable.len());
        for variant in &applicable {
            let saved = self.diagnostics.len();
            self.check(variant.ty, value);
            if self.diagnostics.len() == saved {
                return; // first variant with zero new diagnostics wins
            }
            summaries.push(format!(
                "{}: {}",
                self.describe(variant.ty),
                self.diagnostics[saved].summary_line()
            ));
            self.diagnostics.truncate(saved);
        }

        let mut message = format!("no union variant matched {}", json_type_name(value));
        for summary in &summaries {
            message.push_str("\n - ");
            message.push_str(summary);
        }
        self.diag(Diagnostic::error(DiagnosticKind::NoUnionMatch, message));
    }

    // ------------------------------------------------------------------
    // Dispatchers
    // ------------------------------------------------------------------

    fn check_dispatch(
        &mut self,
        resource: &str,
        selector: &DiscriminatorSelector,
        value: &'a Value,
    ) {
        let Some((target, hop)) = self.select_dispatch_target(resource, selector, value) else {
            return; // diagnostic already emitted
        };
        match hop {
            Some((name, key)) => {
                self.path.push(PathSegment::Dispatch { name, key });
                self.check(target, value);
                self.path.pop();
            }
            None => self.check(target, value),
        }
    }

    /// Evaluates a discriminator selector and picks the registry variant.
    /// Returns the target plus an optional path hop; `None` means the
    /// selection failed and a diagnostic was recorded.
    #[allow(clippy::type_complexity)]
    fn select_dispatch_target(
        &mut self,
        resource: &str,
        selector: &DiscriminatorSelector,
        value: &Value,
    ) -> Option<(TypeRef, Option<(String, String)>)> {
        let Some(map) = self.dispatchers.get(resource) else {
            self.diag(Diagnostic::error(
                DiagnosticKind::UnknownDispatchKey,
                format!("no dispatcher registered for `{}`", resource),
            ));
            return None;
        };

        let (label, key) = match selector {
            DiscriminatorSelector::Static(key) => {
                return match map.select(key) {
                    Some(target) => Some((target, None)),
                    None => {
                        self.diag(Diagnostic::error(
                            DiagnosticKind::UnknownDispatchKey,
                            format!("`{}` has no variant `{}`", resource, key),
                        ));
                        None
                    }
                };
            }
            DiscriminatorSelector::Fallback => {
                return match map.fallback {
                    Some(target) => Some((target, None)),
                    None => {
                        self.diag(Diagnostic::error(
                            DiagnosticKind::UnknownDispatchKey,
                            format!("`{}` has no fallback variant", resource),
                        ));
                        None
                    }
                };
            }
            DiscriminatorSelector::ComputedKey => match self.computed_keys.last().cloned() {
                Some(key) => ("%key".to_string(), key),
                None => {
                    self.diag(Diagnostic::error(
                        DiagnosticKind::UnknownDispatchKey,
                        "`%key` used outside a computed field".to_string(),
                    ));
                    return None;
                }
            },
            DiscriminatorSelector::Sibling { name, path } => {
                let found = value
                    .as_object()
                    .and_then(|obj| obj.get(name))
                    .and_then(|v| walk_fields(v, path))
                    .and_then(Value::as_str);
                match found {
                    Some(key) => (name.clone(), key.to_string()),
                    None => return self.discriminator_fallback(resource, map, name),
                }
            }
            DiscriminatorSelector::Parent { path } => {
                let found = self
                    .ancestors
                    .last()
                    .and_then(|parent| walk_fields(parent, path))
                    .and_then(Value::as_str);
                match found {
                    Some(key) => ("%parent".to_string(), key.to_string()),
                    None => return self.discriminator_fallback(resource, map, "%parent"),
                }
            }
        };

        match map.select(&key) {
            Some(target) => Some((target, Some((label, key)))),
            None => {
                self.diag(
                    Diagnostic::error(
                        DiagnosticKind::UnknownDispatchKey,
                        format!("`{}` has no variant for key \"{}\"", resource, key),
                    )
                    .with_hint(format!("known keys: {}", known_keys(map))),
                );
                None
            }
        }
    }

    /// The discriminator could not be read from the JSON. Uses the
    /// `%fallback` variant when one exists, otherwise reports.
    #[allow(clippy::type_complexity)]
    fn discriminator_fallback(
        &mut self,
        resource: &str,
        map: &DispatcherMap,
        label: &str,
    ) -> Option<(TypeRef, Option<(String, String)>)> {
        if let Some(fallback) = map.fallback {
            return Some((fallback, None));
        }
        self.diag(Diagnostic::error(
            DiagnosticKind::UnknownDispatchKey,
            format!(
                "cannot determine `{}` dispatch key from `{}`",
                resource, label
            ),
        ));
        None
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn apply_refinement(&mut self, range: NumericRange, value: &Value) {
        if let Some(number) = value.as_f64() {
            if !range.contains(number) {
                self.out_of_range(number, range);
            }
        } else if let Some(s) = value.as_str() {
            let length = s.chars().count();
            if !range.contains(length as f64) {
                self.diag(Diagnostic::error(
                    DiagnosticKind::LengthOutOfRange,
                    format!("string length {} is outside {}", length, range),
                ));
            }
        }
    }

    fn mismatch(&mut self, expected: &str, value: &Value) {
        self.diag(Diagnostic::error(
            DiagnosticKind::TypeMismatch,
            format!("expected {}, got {}", expected, json_type_name(value)),
        ));
    }

    fn out_of_range(&mut self, number: f64, range: NumericRange) {
        self.diag(Diagnostic::error(
            DiagnosticKind::OutOfRange,
            format!("value {} is outside {}", number, range),
        ));
    }

    /// One-line description of a node for union summaries.
    fn describe(&self, r: TypeRef) -> String {
        let resolved = self.graph.resolve_alias(r).unwrap_or(r);
        match &self.graph.node(resolved).kind {
            TypeKind::Unknown => "unknown".to_string(),
            TypeKind::Alias(_) => "alias".to_string(),
            TypeKind::Primitive { prim, range } => match range {
                Some(range) => format!("{} @ {}", prim, range),
                None => prim.to_string(),
            },
            TypeKind::Literal(literal) => literal.to_string(),
            TypeKind::Array { .. } => "array".to_string(),
            TypeKind::Struct(_) => "struct".to_string(),
            TypeKind::Enum { base, .. } => format!("enum({})", base),
            TypeKind::Union { .. } => "union".to_string(),
            TypeKind::Dispatch { resource, .. } => resource.clone(),
            TypeKind::Refined { base, range } => {
                format!("{} @ {}", self.describe(*base), range)
            }
        }
    }
}

/// Appends a field, replacing any earlier field with the same name.
fn push_field(fields: &mut Vec<ResolvedField>, field: ResolvedField) {
    if let FieldKey::Named(name) = &field.key {
        fields.retain(|existing| !matches!(&existing.key, FieldKey::Named(n) if n == name));
    }
    fields.push(field);
}

/// Follows `.a.b` style segments through nested objects.
fn walk_fields<'v>(mut value: &'v Value, path: &[String]) -> Option<&'v Value> {
    for segment in path {
        value = value.as_object()?.get(segment)?;
    }
    Some(value)
}

fn known_keys(map: &DispatcherMap) -> String {
    let keys: Vec<&str> = map.variants.keys().take(8).map(String::as_str).collect();
    if keys.is_empty() {
        "(none)".to_string()
    } else {
        keys.join(", ")
    }
}

/// Numeric value of a JSON number that is a valid integer: either an actual
/// integer, or a float with zero fractional part (the lenient reading).
fn integral_value(value: &Value) -> Option<f64> {
    let number = value.as_number()?;
    if number.is_i64() || number.is_u64() {
        return number.as_f64();
    }
    let f = number.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f)
}

fn literal_matches(literal: &Literal, value: &Value) -> bool {
    match literal {
        Literal::String(s) => value.as_str() == Some(s.as_str()),
        Literal::Bool(b) => value.as_bool() == Some(*b),
        Literal::Int(i) => integral_value(value) == Some(*i as f64),
        Literal::Float(x) => value.as_f64() == Some(*x),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
