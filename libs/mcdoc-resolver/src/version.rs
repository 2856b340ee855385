//! Game version triples and `since`/`until` gates.
//!
//! Versions are plain `(major, minor, patch)` triples with lexicographic
//! ordering. The textual forms are `M.m` (patch defaults to 0) and `M.m.p` —
//! deliberately not semver, which rejects the two-component form used all
//! over vanilla data.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version `{input}`: expected MAJOR.MINOR or MAJOR.MINOR.PATCH")]
pub struct VersionParseError {
    pub input: String,
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            input: s.to_string(),
        };
        let mut parts = s.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| err())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

/// `since`/`until` pair. A node applies for target `v` iff `since <= v`
/// (when set) and `v <= until` (when set); both endpoints inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionGate {
    pub since: Option<Version>,
    pub until: Option<Version>,
}

impl VersionGate {
    pub const OPEN: VersionGate = VersionGate {
        since: None,
        until: None,
    };

    pub fn applies_to(&self, version: Version) -> bool {
        if let Some(since) = self.since {
            if version < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if version > until {
                return false;
            }
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// Intersection of two gates: the later `since`, the earlier `until`.
    /// Used when spread-inherited fields combine their own gate with the
    /// spread's.
    pub fn conjoin(&self, other: &VersionGate) -> VersionGate {
        VersionGate {
            since: match (self.since, other.since) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            until: match (self.until, other.until) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_component_forms() {
        assert_eq!("1.20".parse::<Version>().unwrap(), Version::new(1, 20, 0));
        assert_eq!(
            "1.20.1".parse::<Version>().unwrap(),
            Version::new(1, 20, 1)
        );
        assert!("1".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("a.b".parse::<Version>().is_err());
    }

    #[test]
    fn two_component_form_equals_explicit_zero_patch() {
        let short: Version = "1.20".parse().unwrap();
        let long: Version = "1.20.0".parse().unwrap();
        assert_eq!(short, long);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        assert!(v("1.20") < v("1.20.1"));
        assert!(v("1.19.4") < v("1.20"));
        assert!(v("1.9") < v("1.10"));
        assert!(v("2.0") > v("1.99.99"));
    }

    #[test]
    fn gate_endpoints_are_inclusive() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        let gate = VersionGate {
            since: Some(v("1.19")),
            until: Some(v("1.20.1")),
        };
        assert!(!gate.applies_to(v("1.18.2")));
        assert!(gate.applies_to(v("1.19")));
        assert!(gate.applies_to(v("1.20")));
        assert!(gate.applies_to(v("1.20.1")));
        assert!(!gate.applies_to(v("1.20.2")));
    }

    #[test]
    fn open_endpoints_drop_their_bound() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        let since_only = VersionGate {
            since: Some(v("1.19")),
            until: None,
        };
        assert!(since_only.applies_to(v("999.0")));
        assert!(!since_only.applies_to(v("1.0")));
        assert!(VersionGate::OPEN.applies_to(v("0.0.0")));
    }

    #[test]
    fn conjoin_narrows_both_ends() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        let field = VersionGate {
            since: Some(v("1.17")),
            until: None,
        };
        let spread = VersionGate {
            since: Some(v("1.19")),
            until: Some(v("1.20")),
        };
        let combined = field.conjoin(&spread);
        assert_eq!(combined.since, Some(v("1.19")));
        assert_eq!(combined.until, Some(v("1.20")));
    }
}
