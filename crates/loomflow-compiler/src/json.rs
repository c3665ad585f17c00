//! Serialised graph documents
//!
//! The compiler accepts a JSON document in place of a live graph:
//!
//! ```json
//! {
//!   "graph_name": "streaming-agent",
//!   "id": "optional-stable-id",
//!   "nodes": [
//!     { "id": "node_001", "type": "constant", "name": "Task",
//!       "inputs": { "value": "What is 123 * 456?" }, "outputs": {} }
//!   ],
//!   "edges": [
//!     { "from_node": "node_001", "from_port": "out",
//!       "to_node": "node_002", "to_port": "task" }
//!   ]
//! }
//! ```
//!
//! [`validate`] enforces the structural rules (duplicate node ids are
//! fatal, edge endpoints must exist, unknown types warn or error);
//! [`json_to_ir`] builds the IR using a declarative port schema per known
//! type, falling back to a reserved-name table for unknown ports; and
//! [`graph_to_json`] serialises a live graph into the same shape.

use std::collections::HashSet;

use serde_json::{json, Value};

use loomflow_graph::Graph;

use crate::error::{CompileError, Result};
use crate::ir::{Direction, ExecClass, IrEdge, IrGraph, IrNode, IrPort, PortClass};

/// Port names treated as control when nothing else is known.
pub const CONTROL_PORT_NAMES: [&str; 8] = [
    "exec",
    "next",
    "loop_body",
    "completed",
    "true_out",
    "false_out",
    "trigger",
    "done",
];

fn infer_port_class(name: &str) -> PortClass {
    if CONTROL_PORT_NAMES.contains(&name) {
        PortClass::Control
    } else {
        PortClass::Data
    }
}

// ---------------------------------------------------------------------------
// Declarative port schema per known node type
// ---------------------------------------------------------------------------

struct PortSpec {
    name: &'static str,
    direction: Direction,
    class: PortClass,
    default: Value,
}

fn in_data(name: &'static str, default: Value) -> PortSpec {
    PortSpec {
        name,
        direction: Direction::In,
        class: PortClass::Data,
        default,
    }
}

fn in_ctrl(name: &'static str) -> PortSpec {
    PortSpec {
        name,
        direction: Direction::In,
        class: PortClass::Control,
        default: Value::Null,
    }
}

fn out_data(name: &'static str, default: Value) -> PortSpec {
    PortSpec {
        name,
        direction: Direction::Out,
        class: PortClass::Data,
        default,
    }
}

fn out_ctrl(name: &'static str) -> PortSpec {
    PortSpec {
        name,
        direction: Direction::Out,
        class: PortClass::Control,
        default: Value::Null,
    }
}

fn port_schema(type_name: &str) -> Option<Vec<PortSpec>> {
    let specs = match type_name {
        "constant" => vec![out_data("out", Value::Null)],
        "add" => vec![
            in_data("a", json!(0)),
            in_data("b", json!(0)),
            out_data("sum", Value::Null),
        ],
        "multiply" => vec![
            in_data("a", json!(0)),
            in_data("b", json!(1)),
            out_data("product", Value::Null),
        ],
        "vector" => vec![
            in_data("x", json!(0.0)),
            in_data("y", json!(0.0)),
            in_data("z", json!(0.0)),
            out_data("vec", Value::Null),
        ],
        "dot-product" => vec![
            in_data("vec_a", json!([])),
            in_data("vec_b", json!([])),
            out_data("result", Value::Null),
        ],
        "print" => vec![
            in_ctrl("exec"),
            in_data("value", Value::Null),
            out_ctrl("next"),
        ],
        "branch" => vec![
            in_ctrl("exec"),
            in_data("condition", json!(false)),
            out_ctrl("true_out"),
            out_ctrl("false_out"),
        ],
        "for-loop" => vec![
            in_ctrl("exec"),
            in_data("start", json!(0)),
            in_data("end", json!(0)),
            out_ctrl("loop_body"),
            out_ctrl("completed"),
            out_data("index", Value::Null),
        ],
        "for-each" => vec![
            in_ctrl("exec"),
            in_data("items", json!([])),
            out_ctrl("loop_body"),
            out_ctrl("completed"),
            out_data("item", Value::Null),
            out_data("index", Value::Null),
            out_data("total", Value::Null),
        ],
        "accumulator" => vec![
            in_ctrl("exec"),
            in_data("val", Value::Null),
            out_ctrl("next"),
            out_data("count", Value::Null),
            out_data("last", Value::Null),
            out_data("history", Value::Null),
        ],
        "step-printer" => vec![
            in_ctrl("exec"),
            in_data("step_type", json!("")),
            in_data("step_content", json!("")),
            in_data("tool_name", json!("")),
            out_ctrl("next"),
        ],
        "tool-agent" => vec![
            in_data("task", json!("")),
            in_data("tools", json!(["calculator", "word_count"])),
            in_data("model", json!("gpt-4o-mini")),
            out_data("result", Value::Null),
            out_data("tool_calls", Value::Null),
            out_data("steps", Value::Null),
        ],
        "tool-agent-stream" => vec![
            in_ctrl("exec"),
            in_data("task", json!("")),
            in_data("tools", json!(["calculator", "word_count"])),
            in_data("model", json!("gpt-4o-mini")),
            out_ctrl("loop_body"),
            out_ctrl("completed"),
            out_data("step_type", json!("")),
            out_data("step_content", json!("")),
            out_data("tool_name", json!("")),
            out_data("step_count", json!(0)),
            out_data("result", json!("")),
        ],
        "llm" => vec![
            in_data("prompt", json!("")),
            in_data("system_prompt", json!("You are a helpful assistant.")),
            in_data("model", json!("gpt-4o-mini")),
            in_data("temperature", json!(0.7)),
            out_data("response", Value::Null),
            out_data("model_used", Value::Null),
            out_data("tokens_used", Value::Null),
        ],
        "llm-stream" => vec![
            in_ctrl("exec"),
            in_data("prompt", json!("")),
            in_data("system_prompt", json!("You are a helpful assistant.")),
            in_data("model", json!("gpt-4o-mini")),
            in_data("temperature", json!(0.7)),
            out_ctrl("loop_body"),
            out_ctrl("completed"),
            out_data("chunk", json!("")),
            out_data("accumulated", json!("")),
            out_data("chunk_count", json!(0)),
        ],
        "prompt-template" => vec![
            in_data("template", json!("Answer the following question: {question}")),
            in_data("variables", json!({})),
            out_data("prompt", Value::Null),
        ],
        _ => return None,
    };
    Some(specs)
}

/// Node types the JSON schema knows about.
pub fn known_types() -> &'static [&'static str] {
    &[
        "constant",
        "add",
        "multiply",
        "vector",
        "dot-product",
        "print",
        "branch",
        "for-loop",
        "for-each",
        "accumulator",
        "step-printer",
        "tool-agent",
        "tool-agent-stream",
        "llm",
        "llm-stream",
        "prompt-template",
    ]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn require(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(CompileError::Schema(message.into()))
    }
}

/// Validate a parsed graph document.
///
/// `strict` turns unknown node types into errors; otherwise they warn
/// (compilation falls back to the default template for them).
pub fn validate(data: &Value, strict: bool) -> Result<()> {
    let root = data
        .as_object()
        .ok_or_else(|| CompileError::Schema("graph JSON must be an object".into()))?;

    for key in ["graph_name", "nodes", "edges"] {
        require(root.contains_key(key), format!("missing required field '{key}'"))?;
    }
    require(root["graph_name"].is_string(), "graph_name must be a string")?;
    let nodes = root["nodes"]
        .as_array()
        .ok_or_else(|| CompileError::Schema("nodes must be a list".into()))?;
    let edges = root["edges"]
        .as_array()
        .ok_or_else(|| CompileError::Schema("edges must be a list".into()))?;

    let mut node_ids: HashSet<&str> = HashSet::new();
    for (i, node) in nodes.iter().enumerate() {
        let ctx = format!("nodes[{i}]");
        let obj = node
            .as_object()
            .ok_or_else(|| CompileError::Schema(format!("{ctx}: each node must be an object")))?;
        for key in ["id", "type"] {
            require(obj.contains_key(key), format!("{ctx}: missing required field '{key}'"))?;
        }
        let id = obj["id"]
            .as_str()
            .ok_or_else(|| CompileError::Schema(format!("{ctx}.id must be a string")))?;
        let type_name = obj["type"]
            .as_str()
            .ok_or_else(|| CompileError::Schema(format!("{ctx}.type must be a string")))?;
        require(node_ids.insert(id), format!("{ctx}: duplicate node id '{id}'"))?;

        if let Some(inputs) = obj.get("inputs") {
            require(inputs.is_object(), format!("{ctx}.inputs must be an object"))?;
        }
        if let Some(outputs) = obj.get("outputs") {
            require(outputs.is_object(), format!("{ctx}.outputs must be an object"))?;
        }

        if !known_types().contains(&type_name) {
            if strict {
                return Err(CompileError::UnknownType(type_name.to_string()));
            }
            log::warn!(
                "{ctx}: unknown node type '{type_name}' (compilation will emit a stub)"
            );
        }
    }

    for (i, edge) in edges.iter().enumerate() {
        let ctx = format!("edges[{i}]");
        let obj = edge
            .as_object()
            .ok_or_else(|| CompileError::Schema(format!("{ctx}: each edge must be an object")))?;
        for key in ["from_node", "from_port", "to_node", "to_port"] {
            let field = obj
                .get(key)
                .ok_or_else(|| CompileError::Schema(format!("{ctx}: missing required field '{key}'")))?;
            require(field.is_string(), format!("{ctx}.{key} must be a string"))?;
        }
        for key in ["from_node", "to_node"] {
            let id = obj[key].as_str().unwrap_or_default();
            require(
                node_ids.contains(id),
                format!("{ctx}: {key} '{id}' not found in nodes"),
            )?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// JSON -> IR
// ---------------------------------------------------------------------------

fn parse_node(spec: &Value) -> Result<IrNode> {
    let id = spec
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompileError::Schema("node missing 'id'".into()))?
        .to_string();
    let type_name = spec
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompileError::Schema("node missing 'type'".into()))?
        .to_string();
    let name = spec
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(&type_name)
        .to_string();
    let empty = serde_json::Map::new();
    let json_inputs = spec
        .get("inputs")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);
    let json_outputs = spec
        .get("outputs")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);

    let schema = port_schema(&type_name).unwrap_or_default();

    // Schema ports first, so structure is complete even when the JSON
    // omits them; JSON values override schema defaults.
    let mut inputs: Vec<IrPort> = Vec::new();
    for port in schema.iter().filter(|p| p.direction == Direction::In) {
        let value = json_inputs
            .get(port.name)
            .cloned()
            .unwrap_or_else(|| port.default.clone());
        inputs.push(IrPort {
            name: port.name.to_string(),
            direction: Direction::In,
            class: port.class,
            value,
        });
    }
    for (pname, value) in json_inputs {
        if inputs.iter().all(|p| &p.name != pname) {
            inputs.push(IrPort {
                name: pname.clone(),
                direction: Direction::In,
                class: infer_port_class(pname),
                value: value.clone(),
            });
        }
    }

    let mut outputs: Vec<IrPort> = Vec::new();
    for port in schema.iter().filter(|p| p.direction == Direction::Out) {
        let value = json_outputs
            .get(port.name)
            .cloned()
            .unwrap_or_else(|| port.default.clone());
        outputs.push(IrPort {
            name: port.name.to_string(),
            direction: Direction::Out,
            class: port.class,
            value,
        });
    }
    for (pname, value) in json_outputs {
        if outputs.iter().all(|p| &p.name != pname) {
            outputs.push(IrPort {
                name: pname.clone(),
                direction: Direction::Out,
                class: infer_port_class(pname),
                value: value.clone(),
            });
        }
    }

    // A constant carries its value under inputs.value in JSON; re-home it
    // onto the `out` output port where the scheduler looks for it.
    if type_name == "constant" {
        if let Some(value) = json_inputs.get("value") {
            if let Some(out) = outputs.iter_mut().find(|p| p.name == "out") {
                out.value = value.clone();
            } else {
                outputs.push(IrPort {
                    name: "out".to_string(),
                    direction: Direction::Out,
                    class: PortClass::Data,
                    value: value.clone(),
                });
            }
        }
    }

    let is_flow_control = outputs.iter().any(|p| p.class == PortClass::Control);

    let out_names: HashSet<&str> = outputs.iter().map(|p| p.name.as_str()).collect();
    let exec_class = if !is_flow_control {
        if inputs.iter().any(|p| p.class == PortClass::Data) {
            ExecClass::Data
        } else {
            ExecClass::Constant
        }
    } else if out_names.contains("loop_body") && out_names.contains("completed") {
        ExecClass::LoopAgain
    } else if out_names.contains("true_out") && out_names.contains("false_out") {
        ExecClass::Branch
    } else {
        ExecClass::Passthrough
    };

    let mut static_output_values = serde_json::Map::new();
    for port in &outputs {
        if port.class == PortClass::Data && !port.value.is_null() {
            static_output_values.insert(port.name.clone(), port.value.clone());
        }
    }

    Ok(IrNode {
        id,
        name,
        type_name,
        inputs,
        outputs,
        is_flow_control,
        exec_class,
        static_output_values,
    })
}

fn parse_edge(spec: &Value, nodes: &[IrNode]) -> Option<IrEdge> {
    let from_id = spec.get("from_node")?.as_str()?.to_string();
    let from_port = spec.get("from_port")?.as_str()?.to_string();
    let to_id = spec.get("to_node")?.as_str()?.to_string();
    let to_port = spec.get("to_port")?.as_str()?.to_string();

    let from_node = nodes.iter().find(|n| n.id == from_id)?;

    let class = from_node
        .output(&from_port)
        .map(|p| p.class)
        .unwrap_or_else(|| infer_port_class(&from_port));

    Some(IrEdge {
        from_id,
        from_port,
        to_id,
        to_port,
        class,
    })
}

/// Build an [`IrGraph`] from a graph document.
pub fn json_to_ir(data: &Value) -> Result<IrGraph> {
    let graph_name = data
        .get("graph_name")
        .and_then(|v| v.as_str())
        .unwrap_or("compiled-graph")
        .to_string();
    let graph_id = data
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("json-graph")
        .to_string();

    let no_specs: Vec<Value> = Vec::new();
    let node_specs = data
        .get("nodes")
        .and_then(|v| v.as_array())
        .unwrap_or(&no_specs);
    let mut nodes: Vec<IrNode> = Vec::new();
    for spec in node_specs {
        nodes.push(parse_node(spec)?);
    }

    let edge_specs = data
        .get("edges")
        .and_then(|v| v.as_array())
        .unwrap_or(&no_specs);
    let mut edges: Vec<IrEdge> = Vec::new();
    for spec in edge_specs {
        if let Some(edge) = parse_edge(spec, &nodes) {
            edges.push(edge);
        }
    }

    Ok(IrGraph {
        id: graph_id,
        name: graph_name,
        nodes,
        edges,
    })
}

// ---------------------------------------------------------------------------
// Graph -> JSON
// ---------------------------------------------------------------------------

/// Serialise a live graph into the document shape [`json_to_ir`] accepts.
///
/// Network containers are skipped, as extraction skips them; the
/// serialised form is the flat compilable view of the graph.
pub fn graph_to_json(graph: &Graph) -> Value {
    let mut root_name = "graph".to_string();
    let mut root_id = String::new();
    let mut nodes = Vec::new();
    let mut kept: HashSet<String> = HashSet::new();

    for id in graph.node_ids() {
        let Some(node) = graph.node(&id) else { continue };
        if node.is_network() {
            if node.network_id.is_none() {
                root_name = node.name.clone();
                root_id = node.id.clone();
            }
            continue;
        }

        let mut inputs = serde_json::Map::new();
        for port in node.input_data_ports() {
            if !port.value().is_null() {
                inputs.insert(port.name.clone(), port.value().clone());
            }
        }
        let mut outputs = serde_json::Map::new();
        for port in node.output_data_ports() {
            if !port.value().is_null() {
                outputs.insert(port.name.clone(), port.value().clone());
            }
        }

        kept.insert(id.clone());
        nodes.push(json!({
            "id": node.id,
            "type": node.type_name,
            "name": node.name,
            "inputs": inputs,
            "outputs": outputs,
        }));
    }

    let edges: Vec<Value> = graph
        .edge_list()
        .iter()
        .filter(|e| kept.contains(&e.from_node) && kept.contains(&e.to_node))
        .map(|e| {
            json!({
                "from_node": e.from_node,
                "from_port": e.from_port,
                "to_node": e.to_node,
                "to_port": e.to_port,
            })
        })
        .collect();

    json!({
        "graph_name": root_name,
        "id": root_id,
        "nodes": nodes,
        "edges": edges,
    })
}
