//! Source emission
//!
//! Assembles an [`IrSchedule`] into a complete, standalone Python file:
//! header, deduplicated per-type preambles, an `async def run()` holding
//! the preamble nodes and execution blocks, and an `asyncio.run`
//! entrypoint. Emission is a pure function of the schedule and profile -
//! two calls over the same graph produce byte-identical output.

use std::collections::HashSet;

use crate::schedule::{Block, IrSchedule, LoopBlock, ScheduledNode, SequenceBlock};
use crate::templates::{framework, zero, TemplateRegistry};
use crate::writer::CodeWriter;

/// Emission target profile.
///
/// Extract and schedule are identical across profiles; only the template
/// registry and the header notes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitProfile {
    /// Emit calls into the companion orchestration framework (langchain).
    Framework,
    /// Emit raw calls to the minimum underlying service client (openai).
    #[default]
    Zero,
}

impl EmitProfile {
    pub fn templates(&self) -> TemplateRegistry {
        match self {
            EmitProfile::Framework => framework::templates(),
            EmitProfile::Zero => zero::templates(),
        }
    }

    fn header_notes(&self) -> &'static [&'static str] {
        match self {
            EmitProfile::Framework => &[
                "Framework profile.",
                "Dependencies: pip install langchain langchain-openai python-dotenv",
            ],
            EmitProfile::Zero => &[
                "Zero-framework profile.",
                "Dependencies: pip install openai python-dotenv",
                "No orchestration framework or graph runtime required.",
            ],
        }
    }

    /// Flag value accepted by the CLI `--target` option.
    pub fn parse(name: &str) -> Option<EmitProfile> {
        match name {
            "framework" => Some(EmitProfile::Framework),
            "zero" => Some(EmitProfile::Zero),
            _ => None,
        }
    }
}

fn header(graph_name: &str, profile: EmitProfile) -> Vec<String> {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    let mut lines = vec![
        "#!/usr/bin/env python3".to_string(),
        "\"\"\"".to_string(),
        format!("Compiled from loomflow graph: {graph_name}"),
        format!("Generated:  {today}"),
        String::new(),
    ];
    for note in profile.header_notes() {
        lines.push(note.to_string());
    }
    lines.extend([
        String::new(),
        "Do not edit by hand - re-run the compiler to regenerate.".to_string(),
        "\"\"\"".to_string(),
        "from __future__ import annotations".to_string(),
        String::new(),
        "import asyncio".to_string(),
        "import os".to_string(),
        String::new(),
        "try:".to_string(),
        "    from dotenv import load_dotenv".to_string(),
        "    load_dotenv()".to_string(),
        "except ImportError:".to_string(),
        "    pass  # dotenv optional".to_string(),
        String::new(),
    ]);
    lines
}

/// Collect each unique node type's preamble, once, in schedule order.
fn collect_preambles(schedule: &IrSchedule, registry: &TemplateRegistry) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut lines: Vec<String> = Vec::new();

    let mut maybe = |node: &ScheduledNode, lines: &mut Vec<String>| {
        if !seen.insert(node.type_name.clone()) {
            return;
        }
        let preamble = registry.get(&node.type_name).preamble(node);
        if !preamble.is_empty() {
            lines.extend(preamble);
            lines.push(String::new());
        }
    };

    for node in &schedule.preamble {
        maybe(node, &mut lines);
    }
    for block in &schedule.blocks {
        match block {
            Block::Loop(LoopBlock { driver, body, post }) => {
                maybe(driver, &mut lines);
                for node in body {
                    maybe(node, &mut lines);
                }
                for node in post {
                    maybe(node, &mut lines);
                }
            }
            Block::Sequence(SequenceBlock { nodes }) => {
                for node in nodes {
                    maybe(node, &mut lines);
                }
            }
        }
    }
    lines
}

const CONTROL_OUT_NAMES: [&str; 5] = ["loop_body", "completed", "next", "true_out", "false_out"];

/// Zero-initialise a loop driver's data-output variables; the loop body
/// reassigns them every iteration.
fn loop_driver_inits(driver: &ScheduledNode, w: &mut CodeWriter) {
    for (port, var) in driver.output_vars() {
        if CONTROL_OUT_NAMES.contains(&port) {
            continue;
        }
        let numeric = port.ends_with("_count")
            || port.ends_with("_index")
            || matches!(port, "count" | "index" | "total");
        let init = if numeric { "0" } else { "\"\"" };
        w.writeln(&format!("{var} = {init}"));
    }
}

fn emit_loop_block(block: &LoopBlock, registry: &TemplateRegistry, w: &mut CodeWriter) {
    let driver = &block.driver;
    let template = registry.get(&driver.type_name);

    w.comment(&format!("Node: {} ({})", driver.node_name, driver.type_name));
    loop_driver_inits(driver, w);
    w.blank();

    let loop_expr = template
        .emit_loop_expr(driver)
        .unwrap_or_else(|| "[]  # driver type has no loop expression".to_string());
    w.writeln(&format!("async for _step in {loop_expr}:"));
    w.push();

    template.emit_loop_break(driver, w);
    w.blank();

    for node in &block.body {
        registry.get(&node.type_name).emit_inline(node, w);
        w.blank();
    }

    w.pop();

    for node in &block.post {
        w.blank();
        registry.get(&node.type_name).emit_inline(node, w);
    }
}

fn emit_sequence_block(block: &SequenceBlock, registry: &TemplateRegistry, w: &mut CodeWriter) {
    for node in &block.nodes {
        registry.get(&node.type_name).emit_inline(node, w);
        w.blank();
    }
}

fn run_function(schedule: &IrSchedule, registry: &TemplateRegistry) -> Vec<String> {
    let mut w = CodeWriter::new(0);
    let rule_len = 50usize.saturating_sub(schedule.graph_name.len());
    w.writeln(&format!(
        "# -- Graph: {} {}",
        schedule.graph_name,
        "-".repeat(rule_len)
    ));
    w.writeln("async def run() -> None:");
    w.push();

    for node in &schedule.preamble {
        registry.get(&node.type_name).emit_inline(node, &mut w);
        w.blank();
    }

    for block in &schedule.blocks {
        match block {
            Block::Loop(loop_block) => emit_loop_block(loop_block, registry, &mut w),
            Block::Sequence(seq) => emit_sequence_block(seq, registry, &mut w),
        }
    }

    if schedule.preamble.is_empty() && schedule.blocks.is_empty() {
        w.writeln("pass  # empty graph");
    }

    w.pop();
    w.lines()
}

fn entrypoint() -> Vec<String> {
    vec![
        String::new(),
        String::new(),
        "if __name__ == \"__main__\":".to_string(),
        "    asyncio.run(run())".to_string(),
    ]
}

/// Emit a complete standalone source file from a schedule.
pub fn emit(schedule: &IrSchedule, profile: EmitProfile) -> String {
    let registry = profile.templates();
    let mut lines: Vec<String> = Vec::new();
    lines.extend(header(&schedule.graph_name, profile));
    lines.extend(collect_preambles(schedule, &registry));
    lines.extend(run_function(schedule, &registry));
    lines.extend(entrypoint());
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
