//! The resolved type graph.
//!
//! An arena of [`TypeNode`]s addressed by [`TypeRef`] indices. References
//! carry node identity, not ownership, so cyclic schemas (a struct that
//! transitively references itself) are ordinary data. Index 0 is the shared
//! Unknown sentinel: it validates anything and is what failed resolutions
//! collapse to, so the graph never contains a dangling reference.

use crate::dispatcher::DiscriminatorSelector;
use crate::version::VersionGate;
use mcdoc_diagnostics::SchemaLocation;
use mcdoc_syntax::ast::{Literal, Primitive};
use std::collections::HashMap;

/// Handle into a [`TypeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(pub(crate) u32);

impl TypeRef {
    pub(crate) const UNKNOWN: TypeRef = TypeRef(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
    by_path: HashMap<String, TypeRef>,
}

impl TypeGraph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![TypeNode::unknown()],
            by_path: HashMap::new(),
        }
    }

    /// The always-valid sentinel node.
    pub fn unknown(&self) -> TypeRef {
        TypeRef::UNKNOWN
    }

    pub fn node(&self, r: TypeRef) -> &TypeNode {
        &self.nodes[r.index()]
    }

    /// Looks up a named item by fully qualified path (`module::Name`).
    pub fn lookup(&self, path: &str) -> Option<TypeRef> {
        self.by_path.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the Unknown sentinel is always present
    }

    /// Follows alias indirections to the underlying node. Alias chains are
    /// flattened during resolution, so this terminates after one hop; the cap
    /// guards against a malformed graph (a resolver bug, not a schema error).
    pub fn resolve_alias(&self, mut r: TypeRef) -> Option<TypeRef> {
        let mut hops = 0;
        while let TypeKind::Alias(target) = self.node(r).kind {
            r = target;
            hops += 1;
            if hops > self.nodes.len() {
                return None;
            }
        }
        Some(r)
    }

    pub(crate) fn push(&mut self, node: TypeNode) -> TypeRef {
        let r = TypeRef(self.nodes.len() as u32);
        self.nodes.push(node);
        r
    }

    pub(crate) fn set(&mut self, r: TypeRef, node: TypeNode) {
        debug_assert!(r != TypeRef::UNKNOWN, "the Unknown sentinel is immutable");
        self.nodes[r.index()] = node;
    }

    pub(crate) fn node_mut(&mut self, r: TypeRef) -> &mut TypeNode {
        &mut self.nodes[r.index()]
    }

    pub(crate) fn bind_path(&mut self, path: String, r: TypeRef) {
        self.by_path.insert(path, r);
    }

    pub(crate) fn refs(&self) -> impl Iterator<Item = TypeRef> {
        (0..self.nodes.len() as u32).map(TypeRef)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    pub kind: TypeKind,
    /// Schema source of the node, when it came from a specific declaration.
    pub location: Option<SchemaLocation>,
    /// Opaque attributes preserved from the schema (`id`, `nbt_path`,
    /// `random`, and anything unrecognized). Never validated against.
    pub meta: Vec<MetaAttribute>,
}

impl TypeNode {
    pub(crate) fn unknown() -> Self {
        Self::of(TypeKind::Unknown)
    }

    pub(crate) fn of(kind: TypeKind) -> Self {
        Self {
            kind,
            location: None,
            meta: Vec::new(),
        }
    }

    pub(crate) fn at(kind: TypeKind, location: SchemaLocation) -> Self {
        Self {
            kind,
            location: Some(location),
            meta: Vec::new(),
        }
    }
}

/// Attribute payload carried through resolution without interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaAttribute {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Validates anything; stands in wherever resolution failed.
    Unknown,
    /// Pure indirection minted for `type X = SomethingNamed`. Chains are
    /// flattened after lowering; cycles collapse to Unknown.
    Alias(TypeRef),
    Primitive {
        prim: Primitive,
        /// Value range for numerics, length range for strings.
        range: Option<NumericRange>,
    },
    Literal(Literal),
    Array {
        elem: TypeRef,
        len: Option<NumericRange>,
    },
    Struct(StructType),
    Enum {
        base: Primitive,
        values: Vec<Literal>,
    },
    Union {
        variants: Vec<UnionVariant>,
    },
    /// Reference into the dispatcher registry, resolved against the JSON at
    /// validation time.
    Dispatch {
        /// Dispatcher resource, e.g. `minecraft:chunk_generator`.
        resource: String,
        selector: DiscriminatorSelector,
    },
    /// A range applied to a named reference (`SomeAlias @ 0..1`); the base is
    /// checked post-lowering to be numeric or string.
    Refined {
        base: TypeRef,
        range: NumericRange,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    /// Source order after spread expansion.
    pub fields: Vec<ResolvedField>,
    /// Spreads of dispatcher references (`...ns:res[[type]]`): the inherited
    /// fields depend on the JSON being validated, so the validator resolves
    /// them per value.
    pub spreads: Vec<DynamicSpread>,
    /// True when a spread failed to resolve — the full field set is unknown,
    /// so unexpected-field reporting is suppressed.
    pub open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicSpread {
    /// A `Dispatch` node.
    pub target: TypeRef,
    pub gate: VersionGate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub key: FieldKey,
    pub value: TypeRef,
    pub optional: bool,
    pub gate: VersionGate,
    pub location: Option<SchemaLocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKey {
    Named(String),
    /// `[KeyType]: …` — matches remaining keys whose string form satisfies
    /// the key type.
    Computed(TypeRef),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnionVariant {
    pub ty: TypeRef,
    pub gate: VersionGate,
}

/// Closed/open numeric interval with optional exclusive endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl NumericRange {
    pub fn from_ast(range: &mcdoc_syntax::ast::RangeExpr) -> Self {
        Self {
            min: range.min,
            max: range.max,
            min_exclusive: range.min_exclusive,
            max_exclusive: range.max_exclusive,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min || (self.min_exclusive && value == min) {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max || (self.max_exclusive && value == max) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for NumericRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(min) = self.min {
            write!(f, "{}", min)?;
        }
        write!(f, "{}..{}", if self.min_exclusive { "<" } else { "" }, if self.max_exclusive { "<" } else { "" })?;
        if let Some(max) = self.max {
            write!(f, "{}", max)?;
        }
        Ok(())
    }
}
