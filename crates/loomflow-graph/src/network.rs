//! Network factory operations on the arena
//!
//! Networks are nodes of kind `Network` that contain child nodes and expose
//! tunnel ports. All factory methods live on [`Graph`] keyed by the owning
//! network's id - the arena owns everything, handles are plain ids.

use async_trait::async_trait;

use crate::contract::{
    ComputeError, ExecCommand, ExecutionContext, ExecutionResult, NodeBehavior,
};
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph};
use crate::node::{Node, NodeId};
use crate::port::Port;
use crate::registry::NodeRegistry;
use crate::types::{NodeKind, ValueType};

/// Plain container network: no tunnel ports of its own.
pub const NETWORK_TYPE_SYSTEM: &str = "system-network";
/// Flow network: created with an `exec` control input and a `finished`
/// control output.
pub const NETWORK_TYPE_FLOW: &str = "flow-network";

/// Compute behavior of a network container node.
///
/// Tunnel propagation is the executor's job; the container itself only
/// reports completion on its `finished` tunnel when it has one.
struct NetworkBehavior {
    activate_finished: bool,
}

#[async_trait]
impl NodeBehavior for NetworkBehavior {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        log::debug!("computing network container '{}'", ctx.node_name);
        let mut result = ExecutionResult::new(ExecCommand::Continue);
        if self.activate_finished {
            result = result.with_control("finished", true);
        }
        Ok(result)
    }
}

fn build_network_node(
    name: &str,
    type_name: &str,
    network_id: Option<NodeId>,
) -> Result<Node> {
    let flow = match type_name {
        NETWORK_TYPE_FLOW => true,
        NETWORK_TYPE_SYSTEM => false,
        other => return Err(GraphError::UnknownType(other.to_string())),
    };

    let mut node = Node::new(
        name,
        type_name,
        NodeKind::Network,
        network_id,
        Box::new(NetworkBehavior {
            activate_finished: flow,
        }),
    );
    node.is_flow_control = true;
    if flow {
        node.add_input(Port::tunnel_control("exec"))?;
        node.add_output(Port::tunnel_control("finished"))?;
    }
    Ok(node)
}

impl Graph {
    /// Create a fresh graph holding a new root network.
    pub fn create_root(
        name: &str,
        type_name: &str,
        registry: std::sync::Arc<NodeRegistry>,
    ) -> Result<(Graph, NodeId)> {
        let mut graph = Graph::new(registry);
        let root = build_network_node(name, type_name, None)?;
        let root_id = graph.add_node(root)?;
        Ok((graph, root_id))
    }

    /// Create a nested network inside `parent`.
    pub fn create_network(
        &mut self,
        parent: &NodeId,
        name: &str,
        type_name: &str,
    ) -> Result<NodeId> {
        let parent_path = self.path_of(parent)?;
        let child_path = format!("{parent_path}/{name}");
        if self.node_by_path(&child_path).is_some() {
            return Err(GraphError::DuplicatePath(child_path));
        }

        let node = build_network_node(name, type_name, Some(parent.clone()))?;
        self.add_node(node)
    }

    /// Create a function node inside `parent` through the type registry.
    ///
    /// `options` are handed to the factory as keyword options (e.g. a
    /// constant's value or a loop's default bounds).
    pub fn create_node(
        &mut self,
        parent: &NodeId,
        name: &str,
        type_name: &str,
        options: serde_json::Value,
    ) -> Result<NodeId> {
        let parent_path = self.path_of(parent)?;
        let node_path = format!("{parent_path}:{name}");
        if self.node_by_path(&node_path).is_some() {
            return Err(GraphError::DuplicatePath(node_path));
        }

        let spec = self.registry().instantiate(type_name, &options)?;
        let mut node = Node::new(
            name,
            type_name,
            NodeKind::Function,
            Some(parent.clone()),
            spec.behavior,
        );
        node.is_flow_control = spec.is_flow_control;
        for port in spec.inputs {
            node.add_input(port)?;
        }
        for port in spec.outputs {
            node.add_output(port)?;
        }
        log::debug!("created node '{name}' of type '{type_name}' in {parent_path}");
        self.add_node(node)
    }

    /// Resolve a name in the scope of a network: its children, or the
    /// network itself (for tunnel connections).
    pub fn node_id_by_name_in(&self, network: &NodeId, name: &str) -> Option<NodeId> {
        if let Some(net) = self.node(network) {
            if net.name == name {
                return Some(net.id.clone());
            }
        }
        self.node_ids().into_iter().find(|id| {
            self.node(id)
                .map(|n| n.network_id.as_deref() == Some(network.as_str()) && n.name == name)
                .unwrap_or(false)
        })
    }

    /// Connect two nodes by name inside a network.
    ///
    /// Tunnel resolution: when the source is the network itself its input
    /// ports act as sources; when the target is the network itself its
    /// output ports act as sinks. A plain input port that is already wired
    /// rejects a second connection; tunnel endpoints allow fan-in.
    pub fn connect_nodes(
        &mut self,
        network: &NodeId,
        from_name: &str,
        from_port: &str,
        to_name: &str,
        to_port: &str,
    ) -> Result<Edge> {
        let network_name = self.require_node(network)?.name.clone();
        let from_id = self.node_id_by_name_in(network, from_name).ok_or_else(|| {
            GraphError::UnknownEndpoint {
                network: network_name.clone(),
                name: from_name.to_string(),
            }
        })?;
        let to_id = self.node_id_by_name_in(network, to_name).ok_or_else(|| {
            GraphError::UnknownEndpoint {
                network: network_name.clone(),
                name: to_name.to_string(),
            }
        })?;

        if from_id == to_id {
            return Err(GraphError::SelfConnection);
        }

        // Source port: outputs first, then inputs when the source is the
        // enclosing network (tunnel-in).
        let from_node = self.require_node(&from_id)?;
        let source_port = from_node.output(from_port).or_else(|| {
            if from_id == *network {
                from_node.input(from_port)
            } else {
                None
            }
        });
        let source_port = source_port.ok_or_else(|| GraphError::PortNotFound {
            node: from_id.clone(),
            port: from_port.to_string(),
        })?;
        let source_is_tunnel = source_port.is_tunnel();

        // Target port: inputs first, then outputs when the target is the
        // enclosing network (tunnel-out).
        let to_node = self.require_node(&to_id)?;
        let target_port = to_node.input(to_port).or_else(|| {
            if to_id == *network {
                to_node.output(to_port)
            } else {
                None
            }
        });
        let target_port = target_port.ok_or_else(|| GraphError::PortNotFound {
            node: to_id.clone(),
            port: to_port.to_string(),
        })?;
        let target_is_tunnel = target_port.is_tunnel();

        if !self.incoming_edges(&to_id, to_port).is_empty()
            && !source_is_tunnel
            && !target_is_tunnel
        {
            return Err(GraphError::AlreadyConnected {
                node: to_id.clone(),
                port: to_port.to_string(),
            });
        }

        self.add_edge(&from_id, from_port, &to_id, to_port)
    }

    /// Delete a node by name inside a network, with all of its edges.
    pub fn delete_node_in(&mut self, network: &NodeId, name: &str) -> Result<()> {
        let network_name = self.require_node(network)?.name.clone();
        let id = self.node_id_by_name_in(network, name).ok_or_else(|| {
            GraphError::UnknownEndpoint {
                network: network_name,
                name: name.to_string(),
            }
        })?;
        self.delete_node(&id)
    }

    // --- Tunnel port declaration ---

    fn require_network_mut(&mut self, network: &NodeId) -> Result<&mut Node> {
        let node = self.require_node_mut(network)?;
        if !node.is_network() {
            return Err(GraphError::NotANetwork(network.clone()));
        }
        Ok(node)
    }

    pub fn add_network_data_input(
        &mut self,
        network: &NodeId,
        name: &str,
        value_type: ValueType,
    ) -> Result<()> {
        self.require_network_mut(network)?
            .add_input(Port::tunnel_data(name, value_type))
    }

    pub fn add_network_control_input(&mut self, network: &NodeId, name: &str) -> Result<()> {
        self.require_network_mut(network)?
            .add_input(Port::tunnel_control(name))
    }

    pub fn add_network_data_output(
        &mut self,
        network: &NodeId,
        name: &str,
        value_type: ValueType,
    ) -> Result<()> {
        self.require_network_mut(network)?
            .add_output(Port::tunnel_data(name, value_type))
    }

    pub fn add_network_control_output(&mut self, network: &NodeId, name: &str) -> Result<()> {
        self.require_network_mut(network)?
            .add_output(Port::tunnel_control(name))
    }
}
