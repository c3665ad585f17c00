//! The graph arena
//!
//! One [`Graph`] owns every node of a root network and all of its
//! descendants (the arena pattern): a node table keyed by id, a flat edge
//! list, and adjacency indexes in both directions. External references use
//! opaque ids only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId};
use crate::registry::NodeRegistry;
use crate::types::{EdgeClass, PortFunction};

/// An immutable connection between two ports.
///
/// The class tag is derived from the source port when the edge is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from_node: NodeId,
    pub from_port: String,
    pub to_node: NodeId,
    pub to_port: String,
    pub class: EdgeClass,
}

/// Flat arena shared by a root network and all its descendant networks
pub struct Graph {
    registry: Arc<NodeRegistry>,
    nodes: HashMap<NodeId, Node>,
    /// Insertion order, for deterministic traversal and extraction.
    order: Vec<NodeId>,
    edges: Vec<Edge>,
    incoming: HashMap<(NodeId, String), Vec<Edge>>,
    outgoing: HashMap<(NodeId, String), Vec<Edge>>,
}

impl Graph {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    // --- Node table ---

    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.order.push(id.clone());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn require_node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    pub fn require_node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Removes the node and every edge touching it, atomically.
    pub fn delete_node(&mut self, id: &str) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::NodeNotFound(id.to_string()));
        }
        self.edges
            .retain(|e| e.from_node != id && e.to_node != id);
        self.incoming.retain(|key, bucket| {
            bucket.retain(|e| e.from_node != id);
            key.0 != id && !bucket.is_empty()
        });
        self.outgoing.retain(|key, bucket| {
            bucket.retain(|e| e.to_node != id);
            key.0 != id && !bucket.is_empty()
        });
        self.order.retain(|n| n != id);
        self.nodes.remove(id);
        Ok(())
    }

    // --- Edges ---

    /// Add an edge between two existing nodes.
    ///
    /// Type compatibility is not enforced here (a port-level concern), nor
    /// is single fan-in (the executor's pull rule handles that). Verbatim
    /// duplicates are rejected.
    pub fn add_edge(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Result<Edge> {
        let source = self.require_node(from_node)?;
        self.require_node(to_node)?;

        if self.edges.iter().any(|e| {
            e.from_node == from_node
                && e.from_port == from_port
                && e.to_node == to_node
                && e.to_port == to_port
        }) {
            return Err(GraphError::DuplicateEdge {
                from_node: from_node.to_string(),
                from_port: from_port.to_string(),
                to_node: to_node.to_string(),
                to_port: to_port.to_string(),
            });
        }

        // Class comes from the source port; tunnel sources live on the
        // input side of a network node.
        let source_port = source
            .output(from_port)
            .or_else(|| source.input(from_port));
        let class = match source_port.map(|p| p.function) {
            Some(PortFunction::Control) => EdgeClass::Control,
            _ => EdgeClass::Data,
        };

        // Data edges must stay acyclic; cycles are only legal through
        // flow-control loop nodes (control edges).
        if class == EdgeClass::Data && self.data_path_exists(to_node, from_node) {
            return Err(GraphError::DataCycle {
                from_node: from_node.to_string(),
                to_node: to_node.to_string(),
            });
        }

        let edge = Edge {
            from_node: from_node.to_string(),
            from_port: from_port.to_string(),
            to_node: to_node.to_string(),
            to_port: to_port.to_string(),
            class,
        };
        self.edges.push(edge.clone());
        self.incoming
            .entry((to_node.to_string(), to_port.to_string()))
            .or_default()
            .push(edge.clone());
        self.outgoing
            .entry((from_node.to_string(), from_port.to_string()))
            .or_default()
            .push(edge.clone());
        Ok(edge)
    }

    pub fn remove_edge(&mut self, edge: &Edge) {
        self.edges.retain(|e| e != edge);
        if let Some(bucket) = self
            .incoming
            .get_mut(&(edge.to_node.clone(), edge.to_port.clone()))
        {
            bucket.retain(|e| e != edge);
        }
        if let Some(bucket) = self
            .outgoing
            .get_mut(&(edge.from_node.clone(), edge.from_port.clone()))
        {
            bucket.retain(|e| e != edge);
        }
    }

    pub fn incoming_edges(&self, node: &str, port: &str) -> &[Edge] {
        self.incoming
            .get(&(node.to_string(), port.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn outgoing_edges(&self, node: &str, port: &str) -> &[Edge] {
        self.outgoing
            .get(&(node.to_string(), port.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `to` is reachable from `from` along data edges.
    fn data_path_exists(&self, from: &str, to: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier = vec![from];
        while let Some(current) = frontier.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for edge in &self.edges {
                if edge.class == EdgeClass::Data && edge.from_node == current {
                    frontier.push(edge.to_node.as_str());
                }
            }
        }
        false
    }

    /// All edges into any port of a node.
    pub fn all_incoming(&self, node: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to_node == node).collect()
    }

    /// All edges out of any port of a node.
    pub fn all_outgoing(&self, node: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from_node == node).collect()
    }

    pub fn edge_list(&self) -> &[Edge] {
        &self.edges
    }

    // --- Path resolution ---

    /// Full path of a node: networks separated by `/`, the terminal
    /// function node by `:` (e.g. `/root/subnet:adder`). Networks are
    /// themselves addressable (`/root/subnet`).
    pub fn path_of(&self, id: &str) -> Result<String> {
        let node = self.require_node(id)?;

        let mut ancestors = Vec::new();
        let mut cursor = node.network_id.clone();
        while let Some(parent_id) = cursor {
            let parent = self.require_node(&parent_id)?;
            ancestors.push(parent.name.clone());
            cursor = parent.network_id.clone();
        }
        ancestors.reverse();

        let prefix = if ancestors.is_empty() {
            String::new()
        } else {
            format!("/{}", ancestors.join("/"))
        };

        if node.is_network() {
            Ok(format!("{}/{}", prefix, node.name))
        } else {
            Ok(format!("{}:{}", prefix, node.name))
        }
    }

    pub fn node_by_path(&self, path: &str) -> Option<&Node> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .find(|n| self.path_of(&n.id).map(|p| p == path).unwrap_or(false))
    }

    pub fn node_id_by_path(&self, path: &str) -> Option<NodeId> {
        self.node_by_path(path).map(|n| n.id.clone())
    }

    // --- Values ---

    /// Client-facing typed store: validates against the declared port
    /// type, then marks the owning node and everything downstream dirty.
    pub fn set_input_value(
        &mut self,
        node_id: &str,
        port: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let node = self.require_node_mut(node_id)?;
        let port_ref = node
            .input_mut(port)
            .ok_or_else(|| GraphError::PortNotFound {
                node: node_id.to_string(),
                port: port.to_string(),
            })?;
        port_ref.set_value(value)?;
        node.mark_dirty();
        self.mark_downstream_dirty(node_id);
        Ok(())
    }

    /// Transitively mark every node reachable over outgoing edges dirty,
    /// together with the input ports the edges land on.
    pub fn mark_downstream_dirty(&mut self, node_id: &str) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut frontier = vec![node_id.to_string()];
        while let Some(current) = frontier.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let targets: Vec<(NodeId, String)> = self
                .edges
                .iter()
                .filter(|e| e.from_node == current)
                .map(|e| (e.to_node.clone(), e.to_port.clone()))
                .collect();
            for (target, port) in targets {
                if let Some(node) = self.nodes.get_mut(&target) {
                    node.mark_dirty();
                    if let Some(p) = node.port_mut(&port) {
                        p.mark_dirty();
                    }
                }
                frontier.push(target);
            }
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.order.len())
            .field("edges", &self.edges.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{
        ComputeError, ExecCommand, ExecutionContext, ExecutionResult, NodeBehavior,
    };
    use crate::node::Node;
    use crate::port::Port;
    use crate::types::{NodeKind, ValueType};
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl NodeBehavior for Noop {
        async fn compute(
            &mut self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<ExecutionResult, ComputeError> {
            Ok(ExecutionResult::new(ExecCommand::Continue))
        }
    }

    fn empty_graph() -> Graph {
        Graph::new(NodeRegistry::new().into_shared())
    }

    fn data_node(name: &str) -> Node {
        let mut node = Node::new(name, "test", NodeKind::Function, None, Box::new(Noop));
        node.add_input(Port::input_data("in", ValueType::Any))
            .unwrap();
        node.add_output(Port::output_data("out", ValueType::Any))
            .unwrap();
        node
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = empty_graph();
        let node = data_node("a");
        let clone_id = node.id.clone();
        graph.add_node(node).unwrap();

        let mut dup = data_node("b");
        dup.id = clone_id;
        assert!(matches!(
            graph.add_node(dup),
            Err(GraphError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_add_edge_validates_endpoints() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let err = graph.add_edge(&a, "out", "missing", "in").unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound(_)));
    }

    #[test]
    fn test_add_edge_indexes_both_directions() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let b = graph.add_node(data_node("b")).unwrap();
        graph.add_edge(&a, "out", &b, "in").unwrap();

        assert_eq!(graph.outgoing_edges(&a, "out").len(), 1);
        assert_eq!(graph.incoming_edges(&b, "in").len(), 1);
        assert_eq!(graph.edge_list().len(), 1);
    }

    #[test]
    fn test_verbatim_duplicate_edge_rejected() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let b = graph.add_node(data_node("b")).unwrap();
        graph.add_edge(&a, "out", &b, "in").unwrap();
        assert!(matches!(
            graph.add_edge(&a, "out", &b, "in"),
            Err(GraphError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_multi_fan_in_allowed_at_graph_level() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let b = graph.add_node(data_node("b")).unwrap();
        let c = graph.add_node(data_node("c")).unwrap();
        graph.add_edge(&a, "out", &c, "in").unwrap();
        graph.add_edge(&b, "out", &c, "in").unwrap();
        assert_eq!(graph.incoming_edges(&c, "in").len(), 2);
    }

    #[test]
    fn test_data_cycle_rejected() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let b = graph.add_node(data_node("b")).unwrap();
        graph.add_edge(&a, "out", &b, "in").unwrap();
        let err = graph.add_edge(&b, "out", &a, "in").unwrap_err();
        assert!(matches!(err, GraphError::DataCycle { .. }));
    }

    #[test]
    fn test_delete_node_evicts_edges() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let b = graph.add_node(data_node("b")).unwrap();
        let c = graph.add_node(data_node("c")).unwrap();
        graph.add_edge(&a, "out", &b, "in").unwrap();
        graph.add_edge(&b, "out", &c, "in").unwrap();

        graph.delete_node(&b).unwrap();
        assert!(graph.node(&b).is_none());
        assert!(graph.edge_list().is_empty());
        assert!(graph.outgoing_edges(&a, "out").is_empty());
        assert!(graph.incoming_edges(&c, "in").is_empty());
    }

    #[test]
    fn test_delete_missing_node() {
        let mut graph = empty_graph();
        assert!(matches!(
            graph.delete_node("nope"),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_set_input_value_marks_downstream_dirty() {
        let mut graph = empty_graph();
        let a = graph.add_node(data_node("a")).unwrap();
        let b = graph.add_node(data_node("b")).unwrap();
        graph.add_edge(&a, "out", &b, "in").unwrap();
        graph.node_mut(&b).unwrap().mark_clean();

        graph.set_input_value(&a, "in", json!(5)).unwrap();
        assert!(graph.node(&b).unwrap().is_dirty());
        assert_eq!(*graph.node(&a).unwrap().input("in").unwrap().value(), json!(5));
    }

    #[test]
    fn test_set_input_value_type_checked() {
        let mut graph = empty_graph();
        let mut node = Node::new("n", "test", NodeKind::Function, None, Box::new(Noop));
        node.add_input(Port::input_data("a", ValueType::Int)).unwrap();
        let id = graph.add_node(node).unwrap();

        let err = graph.set_input_value(&id, "a", json!("nope")).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }
}
