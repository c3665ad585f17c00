//! End-to-end compilation scenarios.

use serde_json::json;

use loomflow_compiler::{
    compile_graph, compile_json, extract, json, Block, EmitProfile, Scheduler,
};
use loomflow_graph::{Graph, NodeId};

fn root() -> (Graph, NodeId) {
    let registry = loomflow_nodes::builtin_registry().unwrap();
    Graph::create_root("root", "system-network", registry).unwrap()
}

/// Constant(7) -> Print: the emitted program binds 7 to a variable and
/// then prints that variable, in that order.
#[test]
fn compile_trivial_data_pipeline() {
    let (mut graph, net) = root();
    graph
        .create_node(&net, "seven", "constant", json!({"value": 7}))
        .unwrap();
    graph.create_node(&net, "printer", "print", json!({})).unwrap();
    graph
        .connect_nodes(&net, "seven", "out", "printer", "value")
        .unwrap();

    let source = compile_graph(&graph, "trivial", EmitProfile::Zero);

    let assignment = source.find("seven_out = 7").expect("assignment missing");
    let print_call = source
        .find("print(f'[printer] ' + str(seven_out))")
        .expect("print missing");
    assert!(assignment < print_call);
    assert!(source.contains("async def run() -> None:"));
    assert!(source.contains("asyncio.run(run())"));
}

/// For-each over a list literal: exactly one loop block with the item
/// printer in the body and the done printer in the post chain; the
/// emitted program iterates the same list literal and breaks on the done
/// sentinel.
#[test]
fn compile_for_each_loop() {
    let (mut graph, net) = root();
    let driver = graph
        .create_node(
            &net,
            "each",
            "for-each",
            json!({"items": ["apple", "banana", "cherry"]}),
        )
        .unwrap();
    graph
        .create_node(&net, "item_printer", "print", json!({}))
        .unwrap();
    graph
        .create_node(&net, "done_printer", "print", json!({}))
        .unwrap();
    graph
        .connect_nodes(&net, "each", "loop_body", "item_printer", "exec")
        .unwrap();
    graph
        .connect_nodes(&net, "each", "item", "item_printer", "value")
        .unwrap();
    graph
        .connect_nodes(&net, "each", "completed", "done_printer", "exec")
        .unwrap();
    graph
        .connect_nodes(&net, "each", "total", "done_printer", "value")
        .unwrap();

    // Schedule shape: one loop block, driver/body/post as wired.
    let ir = extract::extract(&graph, "foreach-demo");
    let schedule = Scheduler::new(&ir).build("foreach-demo");
    assert_eq!(schedule.blocks.len(), 1);
    match &schedule.blocks[0] {
        Block::Loop(block) => {
            assert_eq!(block.driver.node_id, driver);
            assert_eq!(block.body.len(), 1);
            assert_eq!(block.body[0].node_name, "item_printer");
            assert_eq!(block.post.len(), 1);
            assert_eq!(block.post[0].node_name, "done_printer");
        }
        Block::Sequence(_) => panic!("expected a loop block"),
    }

    let source = compile_graph(&graph, "foreach-demo", EmitProfile::Zero);
    assert!(source.contains(
        "async for _step in _foreach_stream(['apple', 'banana', 'cherry']):"
    ));
    assert!(source.contains("if _step['_done']:"));
    assert!(source.contains("break"));
    // Body reads the driver's item variable; post reads the total.
    assert!(source.contains("print(f'[item_printer] ' + str(each_item))"));
    assert!(source.contains("print(f'[done_printer] ' + str(each_total))"));
}

/// compile() is a pure function: two calls on the same graph produce
/// byte-identical strings.
#[test]
fn compilation_is_deterministic() {
    let (mut graph, net) = root();
    graph
        .create_node(&net, "a", "constant", json!({"value": 8}))
        .unwrap();
    graph
        .create_node(&net, "b", "constant", json!({"value": 4}))
        .unwrap();
    graph.create_node(&net, "adder", "add", json!({})).unwrap();
    graph.create_node(&net, "printer", "print", json!({})).unwrap();
    graph.connect_nodes(&net, "a", "out", "adder", "a").unwrap();
    graph.connect_nodes(&net, "b", "out", "adder", "b").unwrap();
    graph
        .connect_nodes(&net, "adder", "sum", "printer", "value")
        .unwrap();

    let first = compile_graph(&graph, "sum", EmitProfile::Zero);
    let second = compile_graph(&graph, "sum", EmitProfile::Zero);
    assert_eq!(first, second);

    let framework = compile_graph(&graph, "sum", EmitProfile::Framework);
    assert_eq!(framework, compile_graph(&graph, "sum", EmitProfile::Framework));
}

/// json_to_ir(graph_to_json(g)) is structurally equal to extract(g) for
/// registered node types.
#[test]
fn json_round_trip_matches_extraction() {
    let (mut graph, net) = root();
    graph
        .create_node(&net, "fruit", "constant", json!({"value": ["apple", "banana"]}))
        .unwrap();
    graph.create_node(&net, "each", "for-each", json!({})).unwrap();
    graph.create_node(&net, "printer", "print", json!({})).unwrap();
    graph.connect_nodes(&net, "fruit", "out", "each", "items").unwrap();
    graph
        .connect_nodes(&net, "each", "loop_body", "printer", "exec")
        .unwrap();
    graph
        .connect_nodes(&net, "each", "item", "printer", "value")
        .unwrap();

    let extracted = extract::extract(&graph, "round-trip");
    let round_tripped = json::json_to_ir(&json::graph_to_json(&graph)).unwrap();

    assert_eq!(extracted.nodes.len(), round_tripped.nodes.len());
    for node in &extracted.nodes {
        let twin = round_tripped.node(&node.id).expect("node lost in round trip");
        assert_eq!(node.name, twin.name);
        assert_eq!(node.type_name, twin.type_name);
        assert_eq!(node.is_flow_control, twin.is_flow_control);
        assert_eq!(node.exec_class, twin.exec_class);
        for port in &node.inputs {
            let twin_port = twin.input(&port.name).expect("input port lost");
            assert_eq!(port.class, twin_port.class);
        }
        for port in &node.outputs {
            let twin_port = twin.output(&port.name).expect("output port lost");
            assert_eq!(port.class, twin_port.class);
        }
    }

    assert_eq!(extracted.edges.len(), round_tripped.edges.len());
    for (a, b) in extracted.edges.iter().zip(round_tripped.edges.iter()) {
        assert_eq!(a.from_id, b.from_id);
        assert_eq!(a.from_port, b.from_port);
        assert_eq!(a.to_id, b.to_id);
        assert_eq!(a.to_port, b.to_port);
        assert_eq!(a.class, b.class);
    }
}

/// Compiling from JSON goes through validation and produces the same
/// program shape as compiling the live graph.
#[test]
fn compile_from_json_document() {
    let doc = json!({
        "graph_name": "agent-demo",
        "nodes": [
            { "id": "n1", "type": "constant", "name": "task",
              "inputs": { "value": "What is 123 * 456?" } },
            { "id": "n2", "type": "tool-agent-stream", "name": "agent",
              "inputs": { "tools": ["calculator"] } },
            { "id": "n3", "type": "step-printer", "name": "steps" },
            { "id": "n4", "type": "print", "name": "answer" }
        ],
        "edges": [
            { "from_node": "n1", "from_port": "out", "to_node": "n2", "to_port": "task" },
            { "from_node": "n2", "from_port": "loop_body", "to_node": "n3", "to_port": "exec" },
            { "from_node": "n2", "from_port": "step_type", "to_node": "n3", "to_port": "step_type" },
            { "from_node": "n2", "from_port": "completed", "to_node": "n4", "to_port": "exec" },
            { "from_node": "n2", "from_port": "result", "to_node": "n4", "to_port": "value" }
        ]
    });

    let source = compile_json(&doc, EmitProfile::Zero, true).unwrap();
    // The constant runs in the preamble, the agent drives the loop.
    assert!(source.contains("task_out = 'What is 123 * 456?'"));
    assert!(source.contains("async for _step in _agent_event_stream("));
    assert!(source.contains("def calculator"));
    assert!(source.contains("_TOOL_SCHEMAS"));
    // The post chain prints the agent's result variable.
    assert!(source.contains("print(f'[answer] ' + str(agent_result))"));
}

/// A prompt-template feeding a blocking llm node compiles to a format
/// call and a completion call in both profiles - no stub fallback.
#[test]
fn compile_prompt_template_into_llm() {
    let doc = json!({
        "graph_name": "qa",
        "nodes": [
            { "id": "n1", "type": "prompt-template", "name": "ask",
              "inputs": { "template": "Answer the question: {question}",
                          "variables": { "question": "Why is the sky blue?" } } },
            { "id": "n2", "type": "llm", "name": "answer",
              "inputs": { "temperature": 0.2 } }
        ],
        "edges": [
            { "from_node": "n1", "from_port": "prompt",
              "to_node": "n2", "to_port": "prompt" }
        ]
    });

    let zero = compile_json(&doc, EmitProfile::Zero, true).unwrap();
    assert!(zero.contains(
        "ask_prompt = ('Answer the question: {question}').format(**({'question': 'Why is the sky blue?'} or {}))"
    ));
    assert!(zero.contains("async def _llm_complete("));
    assert!(zero.contains(
        "answer_response, answer_model_used, answer_tokens_used = await _llm_complete("
    ));
    assert!(zero.contains("prompt=ask_prompt,"));
    assert!(zero.contains("temperature=0.2,"));
    assert!(!zero.contains("TODO: no template"));

    let framework = compile_json(&doc, EmitProfile::Framework, true).unwrap();
    assert!(framework.contains("from langchain_openai import ChatOpenAI"));
    assert!(framework.contains("await _llm_complete("));
    assert!(!framework.contains("TODO: no template"));
}

/// Unknown node types compile to a clearly marked stub in permissive
/// mode and fail in strict mode.
#[test]
fn unknown_type_stub_vs_strict() {
    let doc = json!({
        "graph_name": "mystery",
        "nodes": [
            { "id": "n1", "type": "telemetry-sink", "name": "sink",
              "inputs": { "exec": null, "payload": 1 },
              "outputs": { "done": null } }
        ],
        "edges": []
    });

    let source = compile_json(&doc, EmitProfile::Zero, false).unwrap();
    assert!(source.contains("TODO: no template for 'telemetry-sink'"));
    assert!(source.contains("sink_done = None"));

    assert!(compile_json(&doc, EmitProfile::Zero, true).is_err());
}

/// A graph with no flow-control node schedules into a single preamble
/// with an empty block list.
#[test]
fn pure_data_graph_has_no_blocks() {
    let (mut graph, net) = root();
    graph
        .create_node(&net, "a", "constant", json!({"value": 2}))
        .unwrap();
    graph
        .create_node(&net, "b", "constant", json!({"value": 3}))
        .unwrap();
    graph.create_node(&net, "adder", "add", json!({})).unwrap();
    graph.connect_nodes(&net, "a", "out", "adder", "a").unwrap();
    graph.connect_nodes(&net, "b", "out", "adder", "b").unwrap();

    let ir = extract::extract(&graph, "pure-data");
    let schedule = Scheduler::new(&ir).build("pure-data");
    assert!(schedule.blocks.is_empty());
    assert_eq!(schedule.preamble.len(), 3);
    // The adder comes after both of its sources.
    assert_eq!(schedule.preamble[2].node_name, "adder");
}
