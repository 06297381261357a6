//! Immutable declared/effective statement views and the final build product.

use serde::Serialize;
use std::sync::Arc;

use super::{ArgumentValue, SourceKey, SourceRef, Unqualified};

/// Common shape of a finished statement view: keyword, argument, children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementView<C> {
    pub keyword: String,
    pub argument: ArgumentValue,
    pub raw_argument: Option<String>,
    pub location: SourceRef,
    pub substatements: Vec<C>,
}

/// What was written: declared substatements only, nothing injected by
/// inference. Built at most once per context and shared between the
/// original and all of its copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredStatement {
    #[serde(flatten)]
    pub view: StatementView<Arc<DeclaredStatement>>,
}

impl DeclaredStatement {
    pub fn keyword(&self) -> &str {
        &self.view.keyword
    }

    pub fn argument(&self) -> &ArgumentValue {
        &self.view.argument
    }

    pub fn substatements(&self) -> &[Arc<DeclaredStatement>] {
        &self.view.substatements
    }

    /// First declared substatement with the given keyword.
    pub fn find_first(&self, keyword: &str) -> Option<&Arc<DeclaredStatement>> {
        self.view
            .substatements
            .iter()
            .find(|sub| sub.view.keyword == keyword)
    }
}

/// The final semantic form: declared substatements plus everything injected
/// by inference, minus statements excluded by feature gating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveStatement {
    #[serde(flatten)]
    pub view: StatementView<Arc<EffectiveStatement>>,
    /// Declared view this effective statement was built from, when the
    /// statement was declared at all.
    #[serde(skip)]
    pub declared: Option<Arc<DeclaredStatement>>,
}

impl EffectiveStatement {
    pub fn keyword(&self) -> &str {
        &self.view.keyword
    }

    pub fn argument(&self) -> &ArgumentValue {
        &self.view.argument
    }

    pub fn substatements(&self) -> &[Arc<EffectiveStatement>] {
        &self.view.substatements
    }

    pub fn find_first(&self, keyword: &str) -> Option<&Arc<EffectiveStatement>> {
        self.view
            .substatements
            .iter()
            .find(|sub| sub.view.keyword == keyword)
    }

    /// All direct substatements with the given keyword.
    pub fn find_all<'a>(
        &'a self,
        keyword: &'a str,
    ) -> impl Iterator<Item = &'a Arc<EffectiveStatement>> + 'a {
        self.view
            .substatements
            .iter()
            .filter(move |sub| sub.view.keyword == keyword)
    }
}

/// One main source's contribution to the build product.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleView {
    pub source: SourceKey,
    pub declared: Arc<DeclaredStatement>,
    pub effective: Arc<EffectiveStatement>,
}

/// Result of a successful `build_effective` run: every main source's root
/// statement in both representations, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveModel {
    pub modules: Vec<ModuleView>,
}

impl EffectiveModel {
    pub fn find_module(&self, name: &Unqualified) -> Option<&ModuleView> {
        self.modules.iter().find(|m| &m.source.name == name)
    }
}

/// One main source's declared root, produced by a build stopped after
/// full declaration.
#[derive(Debug, Clone, Serialize)]
pub struct DeclaredModuleView {
    pub source: SourceKey,
    pub declared: Arc<DeclaredStatement>,
}

/// Result of a `build_declared` run, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct DeclaredModel {
    pub modules: Vec<DeclaredModuleView>,
}

impl DeclaredModel {
    pub fn find_module(&self, name: &Unqualified) -> Option<&DeclaredModuleView> {
        self.modules.iter().find(|m| &m.source.name == name)
    }
}
