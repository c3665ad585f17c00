//! IR scheduling
//!
//! Maps an `IrGraph` to an `IrSchedule`: a resolved, ordered execution
//! plan the emitter translates into flat source. Two modes:
//!
//! - **linear** - no flow-control node: every data node in topological
//!   order forms the preamble, there are no blocks.
//! - **flow** - the driver (the unique flow node with no incoming control
//!   edge) is located; its data ancestors become the preamble and its
//!   control structure becomes a loop or sequence block.
//!
//! Every scheduled node pre-resolves its variable names and input
//! expressions, so templates never look back into the IR.

use std::collections::HashSet;

use crate::ir::{ExecClass, IrGraph, IrNode, PortClass};
use crate::writer::py_repr;

/// A node with its emission bindings resolved.
#[derive(Debug, Clone)]
pub struct ScheduledNode {
    pub node_id: String,
    pub node_name: String,
    pub type_name: String,
    /// port name -> generated variable name, in port order.
    output_vars: Vec<(String, String)>,
    /// port name -> source expression (upstream variable or literal).
    input_exprs: Vec<(String, String)>,
    /// Raw static output values for templates that need the value itself.
    output_port_values: serde_json::Map<String, serde_json::Value>,
}

impl ScheduledNode {
    pub fn output_var(&self, port: &str) -> Option<&str> {
        self.output_vars
            .iter()
            .find(|(name, _)| name == port)
            .map(|(_, var)| var.as_str())
    }

    pub fn input_expr(&self, port: &str) -> Option<&str> {
        self.input_exprs
            .iter()
            .find(|(name, _)| name == port)
            .map(|(_, expr)| expr.as_str())
    }

    pub fn static_output(&self, port: &str) -> Option<&serde_json::Value> {
        self.output_port_values.get(port)
    }

    /// All (port, variable) pairs in declaration order.
    pub fn output_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.output_vars
            .iter()
            .map(|(p, v)| (p.as_str(), v.as_str()))
    }
}

/// A flat run of nodes: emits as a; b; c.
#[derive(Debug, Clone, Default)]
pub struct SequenceBlock {
    pub nodes: Vec<ScheduledNode>,
}

/// A loop driven by a loop_again node.
///
/// Emits as: init vars, `async for _step in <driver expr>:`, break-out
/// test, body nodes, then post nodes after the loop.
#[derive(Debug, Clone)]
pub struct LoopBlock {
    pub driver: ScheduledNode,
    pub body: Vec<ScheduledNode>,
    pub post: Vec<ScheduledNode>,
}

#[derive(Debug, Clone)]
pub enum Block {
    Sequence(SequenceBlock),
    Loop(LoopBlock),
}

/// The full execution plan for one graph.
#[derive(Debug, Clone, Default)]
pub struct IrSchedule {
    pub graph_name: String,
    /// Data nodes that must run before the first flow-control driver.
    pub preamble: Vec<ScheduledNode>,
    pub blocks: Vec<Block>,
}

/// Convert a node name into a safe identifier prefix.
pub fn safe_name(name: &str) -> String {
    name.to_lowercase()
        .replace([' ', '-', '.'], "_")
}

pub struct Scheduler<'a> {
    ir: &'a IrGraph,
}

impl<'a> Scheduler<'a> {
    pub fn new(ir: &'a IrGraph) -> Self {
        Self { ir }
    }

    fn var(&self, node: &IrNode, port: &str) -> String {
        format!("{}_{}", safe_name(&node.name), port)
    }

    /// Expression for a node's input port.
    ///
    /// Resolution order: wired data edge -> upstream output variable;
    /// static value on the port -> literal; fallback -> empty string.
    fn resolve_input(&self, node: &IrNode, port_name: &str) -> String {
        let incoming = self.ir.incoming(&node.id, port_name);
        if let Some(edge) = incoming.iter().find(|e| e.class == PortClass::Data) {
            if let Some(src) = self.ir.node(&edge.from_id) {
                return self.var(src, &edge.from_port);
            }
        }

        if let Some(port) = node.input(port_name) {
            if !port.value.is_null() {
                return py_repr(&port.value);
            }
        }

        "\"\"".to_string()
    }

    fn schedule(&self, node: &IrNode) -> ScheduledNode {
        ScheduledNode {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            type_name: node.type_name.clone(),
            output_vars: node
                .outputs
                .iter()
                .map(|p| (p.name.clone(), self.var(node, &p.name)))
                .collect(),
            input_exprs: node
                .inputs
                .iter()
                .map(|p| (p.name.clone(), self.resolve_input(node, &p.name)))
                .collect(),
            output_port_values: node.static_output_values.clone(),
        }
    }

    // --- Topological sorts over data edges ---

    /// All non-flow-control ancestors of `target`, sources first.
    fn data_preds_topo(&self, target: &str) -> Vec<&'a IrNode> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.visit_data_preds(target, target, &mut visited, &mut order);
        order
    }

    fn visit_data_preds(
        &self,
        nid: &str,
        target: &str,
        visited: &mut HashSet<String>,
        order: &mut Vec<&'a IrNode>,
    ) {
        if !visited.insert(nid.to_string()) {
            return;
        }
        let Some(node) = self.ir.node(nid) else { return };
        for edge in self.ir.all_incoming(nid) {
            if edge.class != PortClass::Data {
                continue;
            }
            if let Some(src) = self.ir.node(&edge.from_id) {
                if !src.is_flow_control {
                    self.visit_data_preds(&edge.from_id, target, visited, order);
                }
            }
        }
        if !node.is_flow_control && nid != target {
            order.push(node);
        }
    }

    /// All non-flow-control nodes in topological order (pure data
    /// pipelines).
    fn topo_all_data(&self) -> Vec<&'a IrNode> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for node in &self.ir.nodes {
            self.visit_all_data(&node.id, &mut visited, &mut order);
        }
        order
    }

    fn visit_all_data(
        &self,
        nid: &str,
        visited: &mut HashSet<String>,
        order: &mut Vec<&'a IrNode>,
    ) {
        if !visited.insert(nid.to_string()) {
            return;
        }
        for edge in self.ir.all_incoming(nid) {
            if edge.class == PortClass::Data {
                self.visit_all_data(&edge.from_id, visited, order);
            }
        }
        if let Some(node) = self.ir.node(nid) {
            if !node.is_flow_control {
                order.push(node);
            }
        }
    }

    // --- Control-edge traversal ---

    /// Downstream chain of flow-control nodes reachable from one named
    /// control output.
    fn follow_control(&self, from_id: &str, port: &str) -> Vec<&'a IrNode> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        for edge in self.ir.outgoing(from_id, port) {
            self.follow_chain(&edge.to_id, &mut visited, &mut chain);
        }
        chain
    }

    fn follow_chain(
        &self,
        nid: &str,
        visited: &mut HashSet<String>,
        chain: &mut Vec<&'a IrNode>,
    ) {
        if !visited.insert(nid.to_string()) {
            return;
        }
        let Some(node) = self.ir.node(nid) else { return };
        chain.push(node);
        for port in &node.outputs {
            if port.class != PortClass::Control {
                continue;
            }
            for edge in self.ir.outgoing(nid, &port.name) {
                if let Some(target) = self.ir.node(&edge.to_id) {
                    if target.is_flow_control {
                        self.follow_chain(&edge.to_id, visited, chain);
                    }
                }
            }
        }
    }

    /// The entry flow-control node: no incoming control edges, so it is
    /// initiated by data alone rather than by another flow node.
    fn find_driver(&self) -> Option<&'a IrNode> {
        let with_incoming_ctrl: HashSet<&str> = self
            .ir
            .edges
            .iter()
            .filter(|e| e.class == PortClass::Control)
            .map(|e| e.to_id.as_str())
            .collect();
        self.ir
            .nodes
            .iter()
            .find(|n| n.is_flow_control && !with_incoming_ctrl.contains(n.id.as_str()))
    }

    // --- Public API ---

    pub fn build(&self, graph_name: &str) -> IrSchedule {
        let Some(driver) = self.find_driver() else {
            // Pure data pipeline: one preamble, zero blocks.
            return IrSchedule {
                graph_name: graph_name.to_string(),
                preamble: self
                    .topo_all_data()
                    .into_iter()
                    .map(|n| self.schedule(n))
                    .collect(),
                blocks: Vec::new(),
            };
        };

        let preamble: Vec<ScheduledNode> = self
            .data_preds_topo(&driver.id)
            .into_iter()
            .map(|n| self.schedule(n))
            .collect();
        let driver_scheduled = self.schedule(driver);

        let block = match driver.exec_class {
            ExecClass::LoopAgain => Block::Loop(LoopBlock {
                driver: driver_scheduled,
                body: self
                    .follow_control(&driver.id, "loop_body")
                    .into_iter()
                    .map(|n| self.schedule(n))
                    .collect(),
                post: self
                    .follow_control(&driver.id, "completed")
                    .into_iter()
                    .map(|n| self.schedule(n))
                    .collect(),
            }),
            ExecClass::Branch => {
                // Structural scaffolding only: both branches concatenate
                // after the driver until a branch template exists.
                let mut nodes = vec![driver_scheduled];
                nodes.extend(
                    self.follow_control(&driver.id, "true_out")
                        .into_iter()
                        .map(|n| self.schedule(n)),
                );
                nodes.extend(
                    self.follow_control(&driver.id, "false_out")
                        .into_iter()
                        .map(|n| self.schedule(n)),
                );
                Block::Sequence(SequenceBlock { nodes })
            }
            _ => {
                // Passthrough: follow the first control output.
                let first_ctrl = driver
                    .outputs
                    .iter()
                    .find(|p| p.class == PortClass::Control)
                    .map(|p| p.name.clone());
                let mut nodes = vec![driver_scheduled];
                if let Some(port) = first_ctrl {
                    nodes.extend(
                        self.follow_control(&driver.id, &port)
                            .into_iter()
                            .map(|n| self.schedule(n)),
                    );
                }
                Block::Sequence(SequenceBlock { nodes })
            }
        };

        IrSchedule {
            graph_name: graph_name.to_string(),
            preamble,
            blocks: vec![block],
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ScheduledNode;

    /// Minimal resolved node for template tests.
    pub(crate) fn scheduled_node(type_name: &str, name: &str) -> ScheduledNode {
        ScheduledNode {
            node_id: format!("{name}-id"),
            node_name: name.to_string(),
            type_name: type_name.to_string(),
            output_vars: vec![("out".to_string(), format!("{name}_out"))],
            input_exprs: Vec::new(),
            output_port_values: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Direction, IrEdge, IrPort};

    fn data_port(name: &str, direction: Direction, value: serde_json::Value) -> IrPort {
        IrPort {
            name: name.into(),
            direction,
            class: PortClass::Data,
            value,
        }
    }

    fn ctrl_port(name: &str, direction: Direction) -> IrPort {
        IrPort {
            name: name.into(),
            direction,
            class: PortClass::Control,
            value: serde_json::Value::Null,
        }
    }

    fn constant(id: &str, name: &str, value: serde_json::Value) -> IrNode {
        let mut statics = serde_json::Map::new();
        statics.insert("out".into(), value.clone());
        IrNode {
            id: id.into(),
            name: name.into(),
            type_name: "constant".into(),
            inputs: vec![],
            outputs: vec![data_port("out", Direction::Out, value)],
            is_flow_control: false,
            exec_class: ExecClass::Constant,
            static_output_values: statics,
        }
    }

    fn printer(id: &str, name: &str) -> IrNode {
        IrNode {
            id: id.into(),
            name: name.into(),
            type_name: "print".into(),
            inputs: vec![
                ctrl_port("exec", Direction::In),
                data_port("value", Direction::In, serde_json::Value::Null),
            ],
            outputs: vec![ctrl_port("next", Direction::Out)],
            is_flow_control: true,
            exec_class: ExecClass::Passthrough,
            static_output_values: serde_json::Map::new(),
        }
    }

    fn foreach(id: &str, name: &str, items: serde_json::Value) -> IrNode {
        IrNode {
            id: id.into(),
            name: name.into(),
            type_name: "for-each".into(),
            inputs: vec![
                ctrl_port("exec", Direction::In),
                data_port("items", Direction::In, items),
            ],
            outputs: vec![
                ctrl_port("loop_body", Direction::Out),
                ctrl_port("completed", Direction::Out),
                data_port("item", Direction::Out, serde_json::Value::Null),
                data_port("index", Direction::Out, serde_json::Value::Null),
                data_port("total", Direction::Out, serde_json::Value::Null),
            ],
            is_flow_control: true,
            exec_class: ExecClass::LoopAgain,
            static_output_values: serde_json::Map::new(),
        }
    }

    fn data_edge(from: &str, from_port: &str, to: &str, to_port: &str) -> IrEdge {
        IrEdge {
            from_id: from.into(),
            from_port: from_port.into(),
            to_id: to.into(),
            to_port: to_port.into(),
            class: PortClass::Data,
        }
    }

    fn ctrl_edge(from: &str, from_port: &str, to: &str, to_port: &str) -> IrEdge {
        IrEdge {
            from_id: from.into(),
            from_port: from_port.into(),
            to_id: to.into(),
            to_port: to_port.into(),
            class: PortClass::Control,
        }
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("Agent Step"), "agent_step");
        assert_eq!(safe_name("for-each.1"), "for_each_1");
    }

    #[test]
    fn test_pure_data_pipeline_schedules_into_preamble() {
        let ir = IrGraph {
            id: "g".into(),
            name: "data".into(),
            nodes: vec![constant("c1", "seven", serde_json::json!(7))],
            edges: vec![],
        };
        let schedule = Scheduler::new(&ir).build("data");
        assert_eq!(schedule.preamble.len(), 1);
        assert!(schedule.blocks.is_empty());
    }

    #[test]
    fn test_driver_detection_and_sequence_block() {
        let ir = IrGraph {
            id: "g".into(),
            name: "seq".into(),
            nodes: vec![
                constant("c1", "seven", serde_json::json!(7)),
                printer("p1", "printer"),
            ],
            edges: vec![data_edge("c1", "out", "p1", "value")],
        };
        let schedule = Scheduler::new(&ir).build("seq");

        // Constant in the preamble, printer as the sequence driver.
        assert_eq!(schedule.preamble.len(), 1);
        assert_eq!(schedule.preamble[0].node_name, "seven");
        match &schedule.blocks[0] {
            Block::Sequence(seq) => {
                assert_eq!(seq.nodes.len(), 1);
                assert_eq!(seq.nodes[0].node_name, "printer");
                // Wired input resolves to the upstream variable.
                assert_eq!(seq.nodes[0].input_expr("value"), Some("seven_out"));
            }
            Block::Loop(_) => panic!("expected sequence block"),
        }
    }

    #[test]
    fn test_loop_block_with_body_and_post() {
        let ir = IrGraph {
            id: "g".into(),
            name: "loop".into(),
            nodes: vec![
                foreach("f1", "each", serde_json::json!(["a", "b"])),
                printer("p1", "item_printer"),
                printer("p2", "done_printer"),
            ],
            edges: vec![
                ctrl_edge("f1", "loop_body", "p1", "exec"),
                ctrl_edge("f1", "completed", "p2", "exec"),
                data_edge("f1", "item", "p1", "value"),
                data_edge("f1", "total", "p2", "value"),
            ],
        };
        let schedule = Scheduler::new(&ir).build("loop");

        assert_eq!(schedule.blocks.len(), 1);
        match &schedule.blocks[0] {
            Block::Loop(block) => {
                assert_eq!(block.driver.node_name, "each");
                assert_eq!(block.body.len(), 1);
                assert_eq!(block.body[0].node_name, "item_printer");
                assert_eq!(block.post.len(), 1);
                assert_eq!(block.post[0].node_name, "done_printer");
                // Static input resolves to a literal.
                assert_eq!(block.driver.input_expr("items"), Some("['a', 'b']"));
                // Body reads the driver's output variable.
                assert_eq!(block.body[0].input_expr("value"), Some("each_item"));
            }
            Block::Sequence(_) => panic!("expected loop block"),
        }
    }

    #[test]
    fn test_unwired_unvalued_input_falls_back_to_empty_string() {
        let ir = IrGraph {
            id: "g".into(),
            name: "x".into(),
            nodes: vec![printer("p1", "printer")],
            edges: vec![],
        };
        let schedule = Scheduler::new(&ir).build("x");
        match &schedule.blocks[0] {
            Block::Sequence(seq) => {
                assert_eq!(seq.nodes[0].input_expr("value"), Some("\"\""));
            }
            Block::Loop(_) => panic!("expected sequence block"),
        }
    }

    #[test]
    fn test_variable_names() {
        let ir = IrGraph {
            id: "g".into(),
            name: "x".into(),
            nodes: vec![foreach("f1", "Fruit Loop", serde_json::json!([]))],
            edges: vec![],
        };
        let schedule = Scheduler::new(&ir).build("x");
        match &schedule.blocks[0] {
            Block::Loop(block) => {
                assert_eq!(block.driver.output_var("item"), Some("fruit_loop_item"));
            }
            Block::Sequence(_) => panic!("expected loop block"),
        }
    }
}
