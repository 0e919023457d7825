//! Filter and sort query language for issue records.
//!
//! A query such as
//!
//! ```text
//! project = Web AND assignee = currentUser() AND updated >= -7d ORDER BY priority DESC
//! ```
//!
//! goes through lexer, parser, binder, resolver and compiler and comes out
//! as a backend-neutral [`CompiledQuery`]. The caller supplies the current
//! user and the current time through an [`EvaluationContext`], so compiling
//! the same text with the same context always gives the same result.

pub mod ast;
pub mod binder;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod predicate;
pub mod resolver;
pub mod schema;
pub mod sql_translator;
pub mod token;

use tracing::{debug, trace};

pub use context::EvaluationContext;
pub use error::{ErrorReport, QueryError};
pub use predicate::{CompiledQuery, OrderBy, Predicate, Value};
pub use schema::{FieldRegistry, FieldSchema, ValueType};

use config::{ConfigError, QueryConfig};

/// Compiles `text` against the standard issue fields.
pub fn compile_query(text: &str, ctx: &EvaluationContext) -> Result<CompiledQuery, QueryError> {
    compile_with(FieldRegistry::standard(), text, ctx)
}

/// Compiler bound to a custom field registry.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    registry: FieldRegistry,
}

impl QueryCompiler {
    pub fn new(registry: FieldRegistry) -> Self {
        Self { registry }
    }

    /// Standard fields plus the ones listed in `config`.
    pub fn from_config(config: &QueryConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.build_registry()?))
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn compile(
        &self,
        text: &str,
        ctx: &EvaluationContext,
    ) -> Result<CompiledQuery, QueryError> {
        compile_with(&self.registry, text, ctx)
    }
}

fn compile_with(
    registry: &FieldRegistry,
    text: &str,
    ctx: &EvaluationContext,
) -> Result<CompiledQuery, QueryError> {
    trace!(query = text, "compiling");

    let tokens = lexer::tokenize(text)?;
    let query = parser::parse(&tokens)?;
    debug!(
        tokens = tokens.len(),
        filtered = query.expr.is_some(),
        order_by = query.order_by.len(),
        "parsed query"
    );

    let bound = binder::bind(&query, registry)?;
    let resolved = resolver::resolve(bound, ctx);
    Ok(compiler::compile(resolved))
}
