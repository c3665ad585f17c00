//! Intermediate representation
//!
//! `IrGraph` is a decoupled structural snapshot of a live graph (or of a
//! serialised graph document). It is the stable data model shared between
//! all pipeline phases: plain data, serialisable, no references into the
//! execution engine.

use serde::{Deserialize, Serialize};

/// Port direction in the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

/// Port (and edge) class in the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortClass {
    Data,
    Control,
}

/// Execution class, inferred from structure:
///
/// - `Constant` - data node with no data-input ports, pure value source
/// - `Data` - standard data node
/// - `LoopAgain` - flow node with `loop_body` + `completed` outputs
/// - `Branch` - flow node with `true_out` + `false_out` outputs
/// - `Passthrough` - any other flow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecClass {
    Constant,
    Data,
    LoopAgain,
    Branch,
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrPort {
    pub name: String,
    pub direction: Direction,
    pub class: PortClass,
    /// Static value captured at extraction time (may be null for wired
    /// ports).
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrNode {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub inputs: Vec<IrPort>,
    pub outputs: Vec<IrPort>,
    pub is_flow_control: bool,
    pub exec_class: ExecClass,
    /// Values captured from data output ports at extraction time; a
    /// constant stores its value here.
    pub static_output_values: serde_json::Map<String, serde_json::Value>,
}

impl IrNode {
    pub fn input(&self, name: &str) -> Option<&IrPort> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&IrPort> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.output(name).is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrEdge {
    pub from_id: String,
    pub from_port: String,
    pub to_id: String,
    pub to_port: String,
    pub class: PortClass,
}

/// Structural snapshot of a graph, in extraction order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrGraph {
    pub id: String,
    pub name: String,
    pub nodes: Vec<IrNode>,
    pub edges: Vec<IrEdge>,
}

impl IrGraph {
    pub fn node(&self, node_id: &str) -> Option<&IrNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&IrNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn outgoing(&self, node_id: &str, port: &str) -> Vec<&IrEdge> {
        self.edges
            .iter()
            .filter(|e| e.from_id == node_id && e.from_port == port)
            .collect()
    }

    pub fn incoming(&self, node_id: &str, port: &str) -> Vec<&IrEdge> {
        self.edges
            .iter()
            .filter(|e| e.to_id == node_id && e.to_port == port)
            .collect()
    }

    pub fn all_incoming(&self, node_id: &str) -> Vec<&IrEdge> {
        self.edges.iter().filter(|e| e.to_id == node_id).collect()
    }

    pub fn all_outgoing(&self, node_id: &str) -> Vec<&IrEdge> {
        self.edges.iter().filter(|e| e.from_id == node_id).collect()
    }
}
