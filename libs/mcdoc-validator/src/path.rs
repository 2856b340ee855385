//! JSON path tracking during validation.

use smallvec::SmallVec;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Object key.
    Field(String),
    /// Array index.
    Index(usize),
    /// Dispatcher hop, rendered `#type=flat`.
    Dispatch { name: String, key: String },
}

/// Stack of segments from the JSON root to the current cursor. Diagnostics
/// snapshot it via [`render`](PathStack::render); the root renders empty.
#[derive(Debug, Default, Clone)]
pub struct PathStack {
    segments: SmallVec<[PathSegment; 8]>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) {
        self.segments.pop();
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Dot-and-bracket form: `features[0].biome#type=flat`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                PathSegment::Index(i) => {
                    let _ = write!(out, "[{}]", i);
                }
                PathSegment::Dispatch { name, key } => {
                    let _ = write!(out, "#{}={}", name, key);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_dot_and_bracket_joined() {
        let mut path = PathStack::new();
        assert_eq!(path.render(), "");
        path.push(PathSegment::Field("features".to_string()));
        path.push(PathSegment::Index(0));
        path.push(PathSegment::Field("biome".to_string()));
        assert_eq!(path.render(), "features[0].biome");
        path.push(PathSegment::Dispatch {
            name: "type".to_string(),
            key: "flat".to_string(),
        });
        assert_eq!(path.render(), "features[0].biome#type=flat");
        path.pop();
        path.pop();
        assert_eq!(path.render(), "features[0]");
    }
}
