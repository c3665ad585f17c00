//! Error types for the compiler

use thiserror::Error;

use loomflow_graph::GraphError;

/// Result type alias using CompileError
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors raised while compiling a graph
#[derive(Debug, Error)]
pub enum CompileError {
    /// The graph JSON document failed structural validation
    #[error("schema validation failed: {0}")]
    Schema(String),

    /// An unknown node type in strict mode
    #[error("unknown node type '{0}'")]
    UnknownType(String),

    /// Source assembly failed
    #[error("emit error: {0}")]
    Emit(String),

    /// Structural failure from the graph layer
    #[error(transparent)]
    Graph(#[from] GraphError),
}
