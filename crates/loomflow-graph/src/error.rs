//! Error types for the graph crate

use thiserror::Error;

use crate::types::ValueType;

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by graph construction and mutation
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node with this id is already in the arena
    #[error("node '{0}' already exists in the graph")]
    DuplicateNode(String),

    /// An identical edge already exists
    #[error("edge {from_node}.{from_port} -> {to_node}.{to_port} already exists")]
    DuplicateEdge {
        from_node: String,
        from_port: String,
        to_node: String,
        to_port: String,
    },

    /// A node id did not resolve in the arena
    #[error("node '{0}' not found")]
    NodeNotFound(String),

    /// A path did not resolve in the arena
    #[error("no node at path '{0}'")]
    PathNotFound(String),

    /// A name did not resolve inside the network being operated on
    #[error("node '{name}' not found in network '{network}'")]
    UnknownEndpoint { network: String, name: String },

    /// A port name did not resolve on a node
    #[error("port '{port}' not found on node '{node}'")]
    PortNotFound { node: String, port: String },

    /// A port with this name already exists in that direction
    #[error("port '{port}' already exists on node '{node}'")]
    DuplicatePort { node: String, port: String },

    /// A node or network name collides with an existing path in scope
    #[error("a node already exists at path '{0}'")]
    DuplicatePath(String),

    /// Source and target of a connection are the same node
    #[error("cannot connect a node's output to its own input")]
    SelfConnection,

    /// Adding this data edge would create a cycle
    #[error("data edge {from_node} -> {to_node} would create a cycle")]
    DataCycle { from_node: String, to_node: String },

    /// A plain input port already has a connection
    #[error("input port '{port}' on node '{node}' is already connected")]
    AlreadyConnected { node: String, port: String },

    /// A value failed the port's declared type check
    #[error("port '{port}' expects {expected:?}, got {got}")]
    TypeMismatch {
        port: String,
        expected: ValueType,
        got: String,
    },

    /// The type name is not in the registry
    #[error("unknown node type '{0}'")]
    UnknownType(String),

    /// The type name is already registered
    #[error("node type '{0}' is already registered")]
    DuplicateType(String),

    /// Operation requires a network node
    #[error("node '{0}' is not a network")]
    NotANetwork(String),
}
