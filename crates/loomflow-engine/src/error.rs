//! Error types for the engine

use thiserror::Error;

use loomflow_graph::GraphError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while cooking a graph
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node's compute call failed
    #[error("node '{name}' ({node_id}) failed: {message}")]
    NodeFailed {
        node_id: String,
        name: String,
        message: String,
    },

    /// A node returned a malformed result (e.g. an output map naming a
    /// port the node does not have)
    #[error("node '{name}' ({node_id}) returned a malformed result: {message}")]
    Contract {
        node_id: String,
        name: String,
        message: String,
    },

    /// The scheduler could not drain its work queues
    #[error("schedule error: {0}")]
    Schedule(String),

    /// Several node-local failures collected over one cooking call
    #[error("cooking failed with {} error(s): {}", .0.len(), format_aggregate(.0))]
    Aggregate(Vec<EngineError>),

    /// The cooking call was cancelled between batches
    #[error("cooking cancelled")]
    Cancelled,

    /// Structural failure from the graph layer
    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn format_aggregate(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
