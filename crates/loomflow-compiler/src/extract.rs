//! Live graph -> IR extraction
//!
//! Purely structural: port classes come from the port objects, exec
//! classes from port-name shape. Network container nodes are skipped -
//! they host the graph, they are not computation nodes - and edges whose
//! endpoints were skipped are filtered out with them.

use std::collections::HashSet;

use loomflow_graph::{Graph, PortFunction};

use crate::ir::{Direction, ExecClass, IrEdge, IrGraph, IrNode, IrPort, PortClass};

fn port_class(function: PortFunction) -> PortClass {
    match function {
        PortFunction::Data => PortClass::Data,
        PortFunction::Control => PortClass::Control,
    }
}

fn infer_exec_class(node: &loomflow_graph::Node) -> ExecClass {
    if !node.is_flow_control {
        if node.input_data_ports().count() == 0 {
            return ExecClass::Constant;
        }
        return ExecClass::Data;
    }

    let out_names: HashSet<&str> = node.outputs.iter().map(|p| p.name.as_str()).collect();
    if out_names.contains("loop_body") && out_names.contains("completed") {
        ExecClass::LoopAgain
    } else if out_names.contains("true_out") && out_names.contains("false_out") {
        ExecClass::Branch
    } else {
        ExecClass::Passthrough
    }
}

/// Extract an [`IrGraph`] from a live graph.
pub fn extract(graph: &Graph, graph_name: &str) -> IrGraph {
    let mut nodes: Vec<IrNode> = Vec::new();
    let mut kept: HashSet<String> = HashSet::new();

    for id in graph.node_ids() {
        let Some(node) = graph.node(&id) else { continue };
        if node.is_network() {
            continue;
        }

        let inputs: Vec<IrPort> = node
            .inputs
            .iter()
            .map(|p| IrPort {
                name: p.name.clone(),
                direction: Direction::In,
                class: port_class(p.function),
                value: p.value().clone(),
            })
            .collect();
        let outputs: Vec<IrPort> = node
            .outputs
            .iter()
            .map(|p| IrPort {
                name: p.name.clone(),
                direction: Direction::Out,
                class: port_class(p.function),
                value: p.value().clone(),
            })
            .collect();

        // A constant's meaningful value lives on its output port; capture
        // it so emission never has to look at live objects.
        let mut static_output_values = serde_json::Map::new();
        for p in node.output_data_ports() {
            if !p.value().is_null() {
                static_output_values.insert(p.name.clone(), p.value().clone());
            }
        }

        kept.insert(id.clone());
        nodes.push(IrNode {
            id: id.clone(),
            name: node.name.clone(),
            type_name: node.type_name.clone(),
            inputs,
            outputs,
            is_flow_control: node.is_flow_control,
            exec_class: infer_exec_class(node),
            static_output_values,
        });
    }

    let edges: Vec<IrEdge> = graph
        .edge_list()
        .iter()
        .filter(|e| kept.contains(&e.from_node) && kept.contains(&e.to_node))
        .map(|e| IrEdge {
            from_id: e.from_node.clone(),
            from_port: e.from_port.clone(),
            to_id: e.to_node.clone(),
            to_port: e.to_port.clone(),
            class: match e.class {
                loomflow_graph::EdgeClass::Data => PortClass::Data,
                loomflow_graph::EdgeClass::Control => PortClass::Control,
            },
        })
        .collect();

    // The owning-network id shared by the kept nodes identifies the graph.
    let graph_id = graph
        .node_ids()
        .into_iter()
        .filter_map(|id| graph.node(&id).and_then(|n| n.network_id.clone()))
        .next()
        .unwrap_or_else(|| "unknown".to_string());

    IrGraph {
        id: graph_id,
        name: graph_name.to_string(),
        nodes,
        edges,
    }
}
