//! Naming primitives: identifiers, revisions, source keys and qualified names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated bare identifier: the argument form of `module`, `grouping`,
/// `leaf` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Unqualified(String);

impl Unqualified {
    /// Validates and wraps an identifier string.
    pub fn try_new(s: &str) -> Result<Self, String> {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(c) => return Err(format!("identifier cannot start with '{}'", c)),
            None => return Err("identifier cannot be empty".to_string()),
        }
        for c in chars {
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
                return Err(format!("invalid character '{}' in identifier", c));
            }
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Unqualified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Unqualified {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Unqualified {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A revision label in `YYYY-MM-DD` form.
///
/// Revisions order chronologically; the string form is zero padded, so the
/// derived lexicographic ordering is the chronological one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(String);

impl Revision {
    pub fn try_new(s: &str) -> Result<Self, String> {
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(format!("'{}' is not a YYYY-MM-DD revision", s));
        }
        for (i, b) in bytes.iter().enumerate() {
            if i == 4 || i == 7 {
                continue;
            }
            if !b.is_ascii_digit() {
                return Err(format!("'{}' is not a YYYY-MM-DD revision", s));
            }
        }
        let month: u8 = s[5..7].parse().map_err(|_| "bad month".to_string())?;
        let day: u8 = s[8..10].parse().map_err(|_| "bad day".to_string())?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(format!("'{}' is out of range for a revision date", s));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one input source: module name plus optional revision.
///
/// This is the key under which modules are registered and the identifier
/// attached to every batch failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub name: Unqualified,
    pub revision: Option<Revision>,
}

impl SourceKey {
    pub fn new(name: Unqualified, revision: Option<Revision>) -> Self {
        Self { name, revision }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}@{}", self.name, rev),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Namespace component of a qualified name: module URI plus revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub uri: String,
    pub revision: Option<Revision>,
}

impl ModuleId {
    pub fn new(uri: impl Into<String>, revision: Option<Revision>) -> Self {
        Self {
            uri: uri.into(),
            revision,
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}?revision={}", self.uri, rev),
            None => f.write_str(&self.uri),
        }
    }
}

/// Keyword of a statement as it appears in source text.
///
/// Plain keywords belong to the base vocabulary; prefixed keywords refer to
/// extension-defined statements and are resolved during the
/// statement-definition phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    Plain(String),
    Prefixed { prefix: String, name: String },
}

impl Keyword {
    pub fn plain(name: impl Into<String>) -> Self {
        Self::Plain(name.into())
    }

    /// Local part without the prefix.
    pub fn local(&self) -> &str {
        match self {
            Self::Plain(name) => name,
            Self::Prefixed { name, .. } => name,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::Prefixed { prefix, .. } => Some(prefix),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(name) => f.write_str(name),
            Self::Prefixed { prefix, name } => write!(f, "{}:{}", prefix, name),
        }
    }
}

/// A fully qualified statement name: module identity plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub module: ModuleId,
    pub local: Unqualified,
}

impl QualifiedName {
    pub fn new(module: ModuleId, local: Unqualified) -> Self {
        Self { module, local }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}){}", self.module, self.local)
    }
}
