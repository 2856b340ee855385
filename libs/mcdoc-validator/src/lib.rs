//! Version-aware validation of JSON values against resolved mcdoc schemas.
//!
//! The single entry point is [`validate`]: a type graph and dispatcher
//! registry from `mcdoc-resolver`, a start point, a `serde_json::Value` and a
//! target game version in; structured diagnostics out. Runs are stateless —
//! the graph is read-only, so validations of disjoint values may happen
//! concurrently without locking.

mod path;
mod validator;

pub use path::{PathSegment, PathStack};
pub use validator::{validate, Start};
