//! Typed argument values produced by statement definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{QualifiedName, Revision, Unqualified};

/// Lifecycle status carried by a `status` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Current,
    Deprecated,
    Obsolete,
}

impl Status {
    pub fn try_parse(s: &str) -> Result<Self, String> {
        match s {
            "current" => Ok(Self::Current),
            "deprecated" => Ok(Self::Deprecated),
            "obsolete" => Ok(Self::Obsolete),
            other => Err(format!(
                "'{}' is not a status, expected current, deprecated or obsolete",
                other
            )),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Current => "current",
            Self::Deprecated => "deprecated",
            Self::Obsolete => "obsolete",
        })
    }
}

/// The parsed argument of one statement instance.
///
/// Which variant a statement carries is fixed by its statement type;
/// `UnresolvedQName` is the pre-linkage form of a prefixed reference and is
/// rebound to `QName` once the prefix's module is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentValue {
    /// Statement takes no argument (`input`, `output`).
    Empty,
    Bool(bool),
    Str(String),
    Uri(String),
    Identifier(Unqualified),
    Revision(Revision),
    Status(Status),
    QName(QualifiedName),
    /// A `prefix:name` reference that has not been bound to a module yet.
    UnresolvedQName {
        prefix: Option<Unqualified>,
        local: Unqualified,
    },
    /// A schema path, one name per step. Absolute paths start at a module
    /// root; descendant paths start at the statement that carries them.
    SchemaPath {
        absolute: bool,
        steps: Vec<ArgumentValue>,
    },
}

impl ArgumentValue {
    /// Local identifier of an identifier-ish argument, if it has one.
    pub fn local_name(&self) -> Option<&Unqualified> {
        match self {
            Self::Identifier(name) => Some(name),
            Self::QName(qname) => Some(&qname.local),
            Self::UnresolvedQName { local, .. } => Some(local),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_qname(&self) -> Option<&QualifiedName> {
        match self {
            Self::QName(qname) => Some(qname),
            _ => None,
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Str(s) | Self::Uri(s) => f.write_str(s),
            Self::Identifier(name) => write!(f, "{}", name),
            Self::Revision(rev) => write!(f, "{}", rev),
            Self::Status(status) => write!(f, "{}", status),
            Self::QName(qname) => write!(f, "{}", qname),
            Self::UnresolvedQName {
                prefix: Some(prefix),
                local,
            } => write!(f, "{}:{}", prefix, local),
            Self::UnresolvedQName {
                prefix: None,
                local,
            } => write!(f, "{}", local),
            Self::SchemaPath { absolute, steps } => {
                for (index, step) in steps.iter().enumerate() {
                    if *absolute || index > 0 {
                        f.write_str("/")?;
                    }
                    write!(f, "{}", step)?;
                }
                Ok(())
            }
        }
    }
}
