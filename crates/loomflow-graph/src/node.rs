//! Node arena entries
//!
//! A node couples identity and port state (owned by the graph arena) with
//! a boxed [`NodeBehavior`] produced by the registry factory. The behavior
//! is checked out by the executor while a batch runs so computes can
//! overlap without aliasing the arena.

use crate::contract::NodeBehavior;
use crate::error::{GraphError, Result};
use crate::port::Port;
use crate::types::{NodeKind, PortFunction};

/// Unique identifier for a node (uuid v4 hex)
pub type NodeId = String;

/// Generate a fresh node id.
pub fn fresh_id() -> NodeId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A node instance in the arena
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub type_name: String,
    pub kind: NodeKind,
    /// Owning network id; `None` for the root network.
    pub network_id: Option<NodeId>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub is_flow_control: bool,
    dirty: bool,
    behavior: Option<Box<dyn NodeBehavior>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("network_id", &self.network_id)
            .field("is_flow_control", &self.is_flow_control)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        kind: NodeKind,
        network_id: Option<NodeId>,
        behavior: Box<dyn NodeBehavior>,
    ) -> Self {
        Self {
            id: fresh_id(),
            name: name.into(),
            type_name: type_name.into(),
            kind,
            network_id,
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_flow_control: false,
            dirty: true,
            behavior: Some(behavior),
        }
    }

    pub fn is_network(&self) -> bool {
        self.kind == NodeKind::Network
    }

    pub fn is_data_node(&self) -> bool {
        !self.is_flow_control
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // --- Port management ---

    pub fn add_input(&mut self, port: Port) -> Result<()> {
        if self.inputs.iter().any(|p| p.name == port.name) {
            return Err(GraphError::DuplicatePort {
                node: self.id.clone(),
                port: port.name,
            });
        }
        self.inputs.push(port);
        Ok(())
    }

    pub fn add_output(&mut self, port: Port) -> Result<()> {
        if self.outputs.iter().any(|p| p.name == port.name) {
            return Err(GraphError::DuplicatePort {
                node: self.id.clone(),
                port: port.name,
            });
        }
        self.outputs.push(port);
        Ok(())
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.inputs.iter_mut().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.outputs.iter_mut().find(|p| p.name == name)
    }

    /// Either side - tunnel values can land on input or output ports.
    pub fn port_mut(&mut self, name: &str) -> Option<&mut Port> {
        if self.inputs.iter().any(|p| p.name == name) {
            self.input_mut(name)
        } else {
            self.output_mut(name)
        }
    }

    pub fn input_data_ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().filter(|p| p.function == PortFunction::Data)
    }

    pub fn input_control_ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs
            .iter()
            .filter(|p| p.function == PortFunction::Control)
    }

    pub fn output_data_ports(&self) -> impl Iterator<Item = &Port> {
        self.outputs
            .iter()
            .filter(|p| p.function == PortFunction::Data)
    }

    pub fn output_control_ports(&self) -> impl Iterator<Item = &Port> {
        self.outputs
            .iter()
            .filter(|p| p.function == PortFunction::Control)
    }

    // --- Behavior checkout (executor batch protocol) ---

    /// Take the behavior out for a concurrent compute. Returns `None` if it
    /// is already checked out.
    pub fn take_behavior(&mut self) -> Option<Box<dyn NodeBehavior>> {
        self.behavior.take()
    }

    /// Put the behavior back after the batch reconciles.
    pub fn restore_behavior(&mut self, behavior: Box<dyn NodeBehavior>) {
        self.behavior = Some(behavior);
    }
}
