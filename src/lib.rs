//! Yuni Schema Compiler Library
//!
//! This library provides the core functionality for the Yuni schema
//! compiler: a text front end for schema modules, a phased statement
//! reactor that assembles the effective model, and the standard
//! statement vocabulary.

pub mod compiler;
pub mod error;
pub mod model;
pub mod reactor;
pub mod source;
pub mod vocab;

// Re-export commonly used types
pub use compiler::{CompilationPipeline, CompilationState};
pub use error::{ErrorCollector, SchemaError, SchemaResult};
pub use model::{DeclaredModel, EffectiveModel, FeatureSet, QualifiedName, SourceKey};
pub use reactor::{ParserMode, StatementReactor};
pub use source::{Lexer, ParseResult, Parser, TextSource, Token};
pub use vocab::standard_reactor;
