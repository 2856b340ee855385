//! Dispatcher registry: `(resource, key) → type`.
//!
//! `dispatch ns:res[k1, k2] to T` statements populate the registry during
//! resolution; the validator consults it when it reaches a dispatcher
//! reference and has computed the runtime discriminator value.

use crate::graph::TypeRef;
use std::collections::{BTreeMap, HashMap};

/// Query key as used by callers picking a validation start point:
/// `("minecraft:resource", "worldgen/biome")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatcherKey {
    pub resource: String,
    pub index: String,
}

impl DispatcherKey {
    pub fn new(resource: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            index: index.into(),
        }
    }
}

/// How a dispatcher reference obtains its runtime discriminator value from
/// the JSON being validated. Evaluation is pure over the current cursor and
/// its ancestors; it never reads outside that path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscriminatorSelector {
    /// `[[type]]` / `[[foo.bar]]`: read the named sibling field, then follow
    /// the trailing segments.
    Sibling { name: String, path: Vec<String> },
    /// `[[%key]]`: the computed-field key currently being matched.
    ComputedKey,
    /// `[[%parent.x]]`: step up one JSON level, then follow the segments.
    Parent { path: Vec<String> },
    /// `[single]`: a fixed variant, no runtime lookup.
    Static(String),
    /// `[[%fallback]]` and friends: always the fallback variant.
    Fallback,
}

/// All variants registered for one dispatcher resource. `BTreeMap` keeps
/// reporting deterministic.
#[derive(Debug, Default, Clone)]
pub struct DispatcherMap {
    pub variants: BTreeMap<String, TypeRef>,
    pub fallback: Option<TypeRef>,
}

impl DispatcherMap {
    /// A concrete key, falling back to the `%fallback` entry when absent.
    pub fn select(&self, key: &str) -> Option<TypeRef> {
        self.variants.get(key).copied().or(self.fallback)
    }
}

#[derive(Debug, Default)]
pub struct DispatcherRegistry {
    map: HashMap<String, DispatcherMap>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str) -> Option<&DispatcherMap> {
        self.map.get(resource)
    }

    /// Lookup for a caller-chosen start point.
    pub fn query(&self, key: &DispatcherKey) -> Option<TypeRef> {
        self.map.get(&key.resource)?.select(&key.index)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn register(&mut self, resource: &str, key: &str, target: TypeRef) {
        self.map
            .entry(resource.to_string())
            .or_default()
            .variants
            .insert(key.to_string(), target);
    }

    pub(crate) fn register_fallback(&mut self, resource: &str, target: TypeRef) {
        self.map.entry(resource.to_string()).or_default().fallback = Some(target);
    }
}
