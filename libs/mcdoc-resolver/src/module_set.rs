//! Parsed modules keyed by canonical module path.

use mcdoc_syntax::ast::{Module, ModulePath, PathSegment};
use std::collections::BTreeMap;

/// All loaded modules, keyed by canonical path (`java::data::worldgen::biome`).
/// Iteration follows load order so resolution diagnostics come out in the
/// order the caller supplied the modules.
#[derive(Debug, Default)]
pub struct ModuleSet {
    modules: BTreeMap<String, Module>,
    order: Vec<String>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a module under its own canonical path. A module loaded twice
    /// replaces the earlier copy and keeps its original position.
    pub fn insert(&mut self, module: Module) {
        let key = module.path.clone();
        if self.modules.insert(key.clone(), module).is_none() {
            self.order.push(key);
        }
    }

    pub fn get(&self, path: &str) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in load order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Module)> {
        self.order
            .iter()
            .filter_map(|path| self.modules.get(path).map(|m| (path.as_str(), m)))
    }
}

/// Resolves a written path against the module it appears in, producing the
/// canonical `::`-joined form. `super` pops one segment of the base; chains of
/// `super` are permitted up to the root. Returns `None` when a `super` chain
/// escapes the root or when `super` appears after an identifier segment.
pub fn canonicalize(base_module: &str, path: &ModulePath) -> Option<String> {
    let mut segments: Vec<&str> = if path.absolute {
        Vec::new()
    } else {
        base_module.split("::").filter(|s| !s.is_empty()).collect()
    };

    let mut seen_ident = path.absolute;
    for segment in &path.segments {
        match segment {
            PathSegment::Super => {
                if seen_ident || segments.pop().is_none() {
                    return None;
                }
            }
            PathSegment::Ident(name) => {
                seen_ident = true;
                segments.push(name);
            }
        }
    }

    Some(segments.join("::"))
}

/// Splits a canonical symbol path into (module, item name).
pub fn split_symbol(path: &str) -> (&str, &str) {
    match path.rsplit_once("::") {
        Some((module, name)) => (module, name),
        None => ("", path),
    }
}
