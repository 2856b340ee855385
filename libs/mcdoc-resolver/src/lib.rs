//! mcdoc resolution: module linking and type graph construction.
//!
//! Takes the ASTs of every loaded module and produces:
//! - a [`TypeGraph`](graph::TypeGraph) where every named item is addressable
//!   by fully qualified path and every reference points at a real node (or at
//!   the Unknown sentinel when resolution failed),
//! - a [`DispatcherRegistry`](dispatcher::DispatcherRegistry) mapping
//!   `(resource, key)` pairs to resolved types,
//! - the diagnostics produced along the way.
//!
//! The graph is immutable once [`resolve`] returns; validator runs may share
//! it freely across threads.

pub mod dispatcher;
pub mod graph;
pub mod module_set;
mod resolver;
pub mod version;

pub use dispatcher::{DiscriminatorSelector, DispatcherKey, DispatcherMap, DispatcherRegistry};
pub use graph::{
    DynamicSpread, FieldKey, MetaAttribute, NumericRange, ResolvedField, StructType, TypeGraph,
    TypeKind, TypeNode, TypeRef, UnionVariant,
};
pub use module_set::ModuleSet;
pub use resolver::{resolve, Resolution};
pub use version::{Version, VersionGate, VersionParseError};
