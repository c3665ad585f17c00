//! Node type registry
//!
//! Maps string type names to factories that produce a node's port schema
//! and compute behavior. The registry is populated eagerly at startup
//! (each node module contributes its registrations), wrapped in `Arc`,
//! and treated as immutable from then on.

use std::collections::HashMap;
use std::sync::Arc;

use crate::contract::NodeBehavior;
use crate::error::{GraphError, Result};
use crate::port::Port;

/// Everything a factory declares about a node instance: its ports, its
/// flow-control flag, and its compute behavior.
pub struct NodeSpec {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub is_flow_control: bool,
    pub behavior: Box<dyn NodeBehavior>,
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("is_flow_control", &self.is_flow_control)
            .field("behavior", &"<dyn NodeBehavior>")
            .finish()
    }
}

impl NodeSpec {
    /// A data node spec (not flow-control).
    pub fn data(behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_flow_control: false,
            behavior,
        }
    }

    /// A flow-control node spec.
    pub fn flow(behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            is_flow_control: true,
            ..Self::data(behavior)
        }
    }

    pub fn with_input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }
}

type Factory = dyn Fn(&serde_json::Value) -> Result<NodeSpec> + Send + Sync;

/// Registry of node type constructors keyed by type name
pub struct NodeRegistry {
    factories: HashMap<String, Box<Factory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under a type name.
    ///
    /// The factory receives the keyword options passed to `create_node`
    /// (e.g. a constant's value, a loop's default bounds) and returns the
    /// node's declared ports and behavior.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&serde_json::Value) -> Result<NodeSpec> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(GraphError::DuplicateType(type_name));
        }
        self.factories.insert(type_name, Box::new(factory));
        Ok(())
    }

    /// Instantiate a spec for a registered type name.
    pub fn instantiate(&self, type_name: &str, options: &serde_json::Value) -> Result<NodeSpec> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| GraphError::UnknownType(type_name.to_string()))?;
        factory(options)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Freeze the registry for sharing across graphs.
    pub fn into_shared(self) -> Arc<NodeRegistry> {
        Arc::new(self)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
