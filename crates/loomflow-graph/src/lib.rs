//! loomflow-graph - arena graph and node contract for loomflow
//!
//! This crate owns the data model of a loomflow graph: typed ports, nodes,
//! networks with tunnel ports, the flat arena that stores them, and the
//! compute contract every node kind implements.
//!
//! # Architecture
//!
//! The graph is an arena: one [`Graph`] owns every node of a root network
//! and all of its descendant networks. Nodes and edges refer to each other
//! by opaque ids only - there are no back-pointers. Node kinds are
//! registered under string type names in a [`NodeRegistry`] and
//! instantiated through network factory methods on the arena.
//!
//! Execution lives in `loomflow-engine`; compilation in
//! `loomflow-compiler`. Both consume this crate.

pub mod contract;
pub mod error;
pub mod graph;
pub mod network;
pub mod node;
pub mod port;
pub mod registry;
pub mod types;

pub use contract::{
    ComputeError, ExecCommand, ExecutionContext, ExecutionResult, NodeBehavior,
};
pub use error::{GraphError, Result};
pub use graph::{Edge, Graph};
pub use network::{NETWORK_TYPE_FLOW, NETWORK_TYPE_SYSTEM};
pub use node::{Node, NodeId};
pub use port::Port;
pub use registry::{NodeRegistry, NodeSpec};
pub use types::{EdgeClass, NodeKind, PortDirection, PortFunction, ValueType};
