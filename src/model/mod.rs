//! Model definitions for the Yuni schema language.
//!
//! This module contains the value types shared between the text front end,
//! the reactor and the final build product: source spans, module/statement
//! naming, typed argument values and the immutable declared/effective
//! statement views.

use serde::{Deserialize, Serialize};

mod argument;
mod name;
mod statement;

pub use argument::{ArgumentValue, Status};
pub use name::{Keyword, ModuleId, QualifiedName, Revision, SourceKey, Unqualified};
pub use statement::{
    DeclaredModel, DeclaredModuleView, DeclaredStatement, EffectiveModel, EffectiveStatement,
    ModuleView, StatementView,
};

/// Span information for source location tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// Set of features enabled for a build. Absent set means "all enabled";
/// an empty set disables every feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet(std::collections::HashSet<QualifiedName>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: QualifiedName) {
        self.0.insert(feature);
    }

    pub fn contains(&self, feature: &QualifiedName) -> bool {
        self.0.contains(feature)
    }
}

impl FromIterator<QualifiedName> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = QualifiedName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A position inside one input source, used by every reactor diagnostic.
///
/// The `source` identifies the module source the statement came from, the
/// span points into that source's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: SourceKey,
    pub span: Span,
}

impl SourceRef {
    pub fn new(source: SourceKey, span: Span) -> Self {
        Self { source, span }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}..{}", self.source, self.span.start, self.span.end)
    }
}
