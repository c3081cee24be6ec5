/// Content paths
///
/// The value a name points at. Paths live in one of two namespaces:
///
/// ```text
/// /ipfs/<root>[/<segment>...]   immutable content
/// /ipns/<root>[/<segment>...]   another mutable name
/// ```
///
/// A bare root without a leading slash is read as an `/ipfs/` path.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

pub const IPFS_NAMESPACE: &str = "ipfs";
pub const IPNS_NAMESPACE: &str = "ipns";

/// A validated content path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path(String);

impl Path {
    pub fn parse(input: &str) -> Result<Self, RecordError> {
        let invalid = |reason| RecordError::InvalidPath {
            path: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("empty path"));
        }

        if !input.starts_with('/') {
            if input.contains('/') {
                return Err(invalid("relative path with segments"));
            }
            return Ok(Self(format!("/{IPFS_NAMESPACE}/{input}")));
        }

        let mut parts = input[1..].splitn(3, '/');
        let namespace = parts.next().unwrap_or_default();
        let root = parts.next().unwrap_or_default();

        if namespace != IPFS_NAMESPACE && namespace != IPNS_NAMESPACE {
            return Err(invalid("unknown namespace"));
        }
        if root.is_empty() {
            return Err(invalid("missing root"));
        }

        Ok(Self(input.to_string()))
    }

    /// Namespace segment, `ipfs` or `ipns`.
    pub fn namespace(&self) -> &str {
        self.0[1..].split('/').next().unwrap_or_default()
    }

    /// Root segment directly after the namespace.
    pub fn root(&self) -> &str {
        self.0[1..].split('/').nth(1).unwrap_or_default()
    }

    /// Everything after the root, e.g. `/a/b` for `/ipfs/Qm/a/b`.
    pub fn remainder(&self) -> &str {
        let prefix = 1 + self.namespace().len() + 1 + self.root().len();
        &self.0[prefix..]
    }

    /// Append trailing segments to this path.
    pub fn join(&self, suffix: &str) -> Result<Self, RecordError> {
        if suffix.is_empty() {
            return Ok(self.clone());
        }
        Self::parse(&format!("{}{}", self.0, suffix))
    }

    pub fn is_ipns(&self) -> bool {
        self.namespace() == IPNS_NAMESPACE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Path {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.0
    }
}
