//! Semantic version constraints.
//!
//! # Responsibilities
//! - Parse dotted numeric versions (`1`, `1.2`, `2.0.1`)
//! - Parse constraints: optional operator (`>=`, `<=`, `>`, `<`, `==`, `!=`) + version
//! - Evaluate a client version against a constraint
//!
//! # Design Decisions
//! - Missing trailing components compare as `0`, so `1.2 == 1.2.0`
//! - Constraints are parsed once at declaration time; a bad one is a `ConfigError`
//! - Each component keeps only its leading digits (`1.0.0-rc1` reads as `1.0.0`)
//! - Everything here is immutable and safe to share across requests

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A dotted numeric version.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Parse a version, returning `None` when the leading component is not numeric.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let mut components = Vec::new();

        for (i, part) in raw.split('.').enumerate() {
            let digits: &str = {
                let end = part
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(part.len());
                &part[..end]
            };
            if digits.is_empty() {
                if i == 0 {
                    return None;
                }
                components.push(0);
                continue;
            }
            components.push(digits.parse().ok()?);
        }

        Some(Self { components })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl FromStr for Version {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ConfigError::InvalidVersion(s.trim().to_string()))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOp {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
}

impl VersionOp {
    // Two-character operators must be tried first.
    const TABLE: [(&'static str, VersionOp); 6] = [
        (">=", VersionOp::Ge),
        ("<=", VersionOp::Le),
        ("==", VersionOp::Eq),
        ("!=", VersionOp::Ne),
        (">", VersionOp::Gt),
        ("<", VersionOp::Lt),
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            VersionOp::Ge => ">=",
            VersionOp::Le => "<=",
            VersionOp::Gt => ">",
            VersionOp::Lt => "<",
            VersionOp::Eq => "==",
            VersionOp::Ne => "!=",
        }
    }

    /// Apply the operator to `candidate.cmp(required)`.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            VersionOp::Ge => ordering != Ordering::Less,
            VersionOp::Le => ordering != Ordering::Greater,
            VersionOp::Gt => ordering == Ordering::Greater,
            VersionOp::Lt => ordering == Ordering::Less,
            VersionOp::Eq => ordering == Ordering::Equal,
            VersionOp::Ne => ordering != Ordering::Equal,
        }
    }
}

/// Operator plus required version, e.g. `>=1.2.0`.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    op: VersionOp,
    required: Version,
    raw: String,
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidConstraint(raw.to_string()));
        }

        let (op, rest) = VersionOp::TABLE
            .iter()
            .find_map(|(symbol, op)| trimmed.strip_prefix(symbol).map(|rest| (*op, rest)))
            .unwrap_or((VersionOp::Eq, trimmed));

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(ConfigError::InvalidConstraint(raw.to_string()));
        }
        let required = rest.parse::<Version>()?;

        Ok(Self {
            op,
            required,
            raw: trimmed.to_string(),
        })
    }

    pub fn op(&self) -> VersionOp {
        self.op
    }

    pub fn required(&self) -> &Version {
        &self.required
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        self.op.accepts(candidate.cmp(&self.required))
    }

    /// Check a raw client version. Unparseable versions never satisfy a constraint.
    pub fn check(&self, candidate: &str) -> bool {
        Version::parse(candidate)
            .map(|v| self.matches(&v))
            .unwrap_or(false)
    }
}

impl FromStr for VersionConstraint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
