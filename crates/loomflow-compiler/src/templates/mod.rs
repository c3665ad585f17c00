//! Node emission templates
//!
//! A template decides how one node kind renders into target source. Four
//! hooks:
//!
//! - `preamble` - top-level declarations the node type needs (helper
//!   generators, tool definitions); deduplicated by type name across the
//!   whole schedule.
//! - `emit_inline` - the in-function body of the node at the current
//!   indent.
//! - `emit_loop_expr` - for loop drivers, the iterable expression of the
//!   loop header.
//! - `emit_loop_break` - for loop drivers, the pre-body unpacking and
//!   termination check inside the loop.
//!
//! Unknown type names resolve to a default template that emits a clearly
//! marked TODO stub and null-initialises outputs, keeping the emitted
//! program syntactically valid.
//!
//! Templates shared by both profiles live here; the profile modules add
//! the framework-bound and zero-framework agent templates on top.

pub mod framework;
pub mod zero;

use std::collections::HashMap;

use crate::schedule::ScheduledNode;
use crate::writer::{py_repr, CodeWriter};

pub trait NodeTemplate: Send + Sync {
    /// Top-level lines emitted once per node type, before `run()`.
    fn preamble(&self, _node: &ScheduledNode) -> Vec<String> {
        Vec::new()
    }

    /// Inline body of the node inside `run()` (or a loop body).
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        w.blank();
        w.comment(&format!(
            "TODO: no template for '{}' (node: {})",
            node.type_name, node.node_name
        ));
        w.comment("      register a template for this type to replace the stub");
        for (_, var) in node.output_vars() {
            w.writeln(&format!("{var} = None"));
        }
        w.blank();
    }

    /// Iterable expression for a loop header. `None` for non-drivers.
    fn emit_loop_expr(&self, _node: &ScheduledNode) -> Option<String> {
        None
    }

    /// Unpacking and break-out test at the top of a loop body.
    fn emit_loop_break(&self, _node: &ScheduledNode, _w: &mut CodeWriter) {}
}

/// Fallback for unregistered node types.
pub struct DefaultTemplate;

impl NodeTemplate for DefaultTemplate {}

/// Type-name-keyed template lookup with a default fallback.
pub struct TemplateRegistry {
    templates: HashMap<String, Box<dyn NodeTemplate>>,
    default: DefaultTemplate,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            default: DefaultTemplate,
        }
    }

    pub fn insert(&mut self, type_name: impl Into<String>, template: Box<dyn NodeTemplate>) {
        self.templates.insert(type_name.into(), template);
    }

    pub fn get(&self, type_name: &str) -> &dyn NodeTemplate {
        self.templates
            .get(type_name)
            .map(|t| t.as_ref())
            .unwrap_or(&self.default)
    }

    pub fn has(&self, type_name: &str) -> bool {
        self.templates.contains_key(type_name)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort extraction of tool names from a resolved literal
/// expression such as `['calculator', 'word_count']`.
pub(crate) fn tool_names_from_expr(expr: &str) -> Vec<String> {
    let trimmed = expr.trim();
    let strip_quotes = |s: &str| {
        let s = s.trim();
        s.strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| s.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
            .map(|s| s.to_string())
    };

    if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return inner.split(',').filter_map(strip_quotes).collect();
    }
    strip_quotes(trimmed).map(|s| vec![s]).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Profile-agnostic templates
// ---------------------------------------------------------------------------

/// `constant` - one assignment of the captured static value.
pub struct ConstantTemplate;

impl NodeTemplate for ConstantTemplate {
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let fallback = format!("{}_out", node.node_name.to_lowercase());
        let out_var = node.output_var("out").unwrap_or(&fallback).to_string();
        let value = node
            .static_output("out")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        w.comment(&format!("Node: {} (constant)", node.node_name));
        w.writeln(&format!("{out_var} = {}", py_repr(&value)));
    }
}

/// `print` - one print call over the wired value expression.
pub struct PrintTemplate;

impl NodeTemplate for PrintTemplate {
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let value = node.input_expr("value").unwrap_or("\"\"");
        w.comment(&format!("Node: {} (print)", node.node_name));
        w.writeln(&format!(
            "print(f'[{}] ' + str({value}))",
            node.node_name
        ));
    }
}

/// `step-printer` - the step-type dispatch of the runtime node, inlined.
pub struct StepPrinterTemplate;

impl NodeTemplate for StepPrinterTemplate {
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let st = node.input_expr("step_type").unwrap_or("'unknown'").to_string();
        let sc = node.input_expr("step_content").unwrap_or("''").to_string();
        let tn = node.input_expr("tool_name").unwrap_or("''").to_string();
        w.comment(&format!("Node: {} (step-printer)", node.node_name));
        w.writeln(&format!("if {st} == 'tool_call':"));
        w.push();
        w.writeln(&format!("print(f'  -> {{{tn}}}({{{sc}}})', flush=True)"));
        w.pop();
        w.writeln(&format!("elif {st} == 'tool_result':"));
        w.push();
        w.writeln(&format!("print(f'  <- {{{sc}}}', flush=True)"));
        w.pop();
        w.writeln("else:");
        w.push();
        w.writeln(&format!("print(f'  [{{{st}}}] {{{sc}}}', flush=True)"));
        w.pop();
    }
}

/// `add` - one binary expression.
pub struct AddTemplate;

impl NodeTemplate for AddTemplate {
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let fallback = format!("{}_sum", node.node_name.to_lowercase());
        let sum = node.output_var("sum").unwrap_or(&fallback).to_string();
        let a = node.input_expr("a").unwrap_or("0");
        let b = node.input_expr("b").unwrap_or("0");
        w.comment(&format!("Node: {} (add)", node.node_name));
        w.writeln(&format!("{sum} = {a} + {b}"));
    }
}

/// `multiply` - one binary expression.
pub struct MultiplyTemplate;

impl NodeTemplate for MultiplyTemplate {
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let fallback = format!("{}_product", node.node_name.to_lowercase());
        let product = node.output_var("product").unwrap_or(&fallback).to_string();
        let a = node.input_expr("a").unwrap_or("0");
        let b = node.input_expr("b").unwrap_or("1");
        w.comment(&format!("Node: {} (multiply)", node.node_name));
        w.writeln(&format!("{product} = {a} * {b}"));
    }
}

const FOREACH_HELPER: &str = r#"async def _foreach_stream(items):
    """Async generator - yields one dict per list element, then a done sentinel."""
    _items = list(items) if items is not None else []
    _total = len(_items)
    for _i, _v in enumerate(_items):
        yield {"_done": False, "item": _v, "index": _i, "total": _total}
    yield {"_done": True, "item": None, "index": -1, "total": _total}"#;

/// `for-each` - loop driver over a list, with a done sentinel.
pub struct ForEachTemplate;

impl NodeTemplate for ForEachTemplate {
    fn preamble(&self, _node: &ScheduledNode) -> Vec<String> {
        let mut lines: Vec<String> = FOREACH_HELPER.lines().map(String::from).collect();
        lines.push(String::new());
        lines
    }

    fn emit_loop_expr(&self, node: &ScheduledNode) -> Option<String> {
        let items = node.input_expr("items").unwrap_or("[]");
        Some(format!("_foreach_stream({items})"))
    }

    fn emit_loop_break(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let item = node.output_var("item").unwrap_or("_foreach_item").to_string();
        let index = node.output_var("index").unwrap_or("_foreach_index").to_string();
        let total = node.output_var("total").unwrap_or("_foreach_total").to_string();
        w.writeln(&format!("{item} = _step['item']"));
        w.writeln(&format!("{index} = _step['index']"));
        w.writeln(&format!("{total} = _step['total']"));
        w.writeln("if _step['_done']:");
        w.push();
        w.writeln("break");
        w.pop();
    }
}

/// `prompt-template` - formats a template string with a variables dict.
pub struct PromptTemplateTemplate;

impl NodeTemplate for PromptTemplateTemplate {
    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let fallback = format!("{}_prompt", node.node_name.to_lowercase());
        let prompt = node.output_var("prompt").unwrap_or(&fallback).to_string();
        let template = node.input_expr("template").unwrap_or("''");
        let variables = node.input_expr("variables").unwrap_or("{}");
        w.comment(&format!("Node: {} (prompt-template)", node.node_name));
        w.writeln(&format!(
            "{prompt} = ({template}).format(**({variables} or {{}}))"
        ));
    }
}

const RANGE_HELPER: &str = r#"async def _range_stream(start, end):
    """Async generator - yields one dict per index, then a done sentinel."""
    for _i in range(start, end):
        yield {"_done": False, "index": _i}
    yield {"_done": True, "index": -1}"#;

/// `for-loop` - loop driver over an integer range.
pub struct ForLoopTemplate;

impl NodeTemplate for ForLoopTemplate {
    fn preamble(&self, _node: &ScheduledNode) -> Vec<String> {
        let mut lines: Vec<String> = RANGE_HELPER.lines().map(String::from).collect();
        lines.push(String::new());
        lines
    }

    fn emit_loop_expr(&self, node: &ScheduledNode) -> Option<String> {
        let start = node.input_expr("start").unwrap_or("0");
        let end = node.input_expr("end").unwrap_or("0");
        Some(format!("_range_stream({start}, {end})"))
    }

    fn emit_loop_break(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let index = node.output_var("index").unwrap_or("_loop_index").to_string();
        w.writeln(&format!("{index} = _step['index']"));
        w.writeln("if _step['_done']:");
        w.push();
        w.writeln("break");
        w.pop();
    }
}

/// Register the profile-agnostic templates into a registry.
pub(crate) fn register_shared(registry: &mut TemplateRegistry) {
    registry.insert("constant", Box::new(ConstantTemplate));
    registry.insert("print", Box::new(PrintTemplate));
    registry.insert("step-printer", Box::new(StepPrinterTemplate));
    registry.insert("add", Box::new(AddTemplate));
    registry.insert("multiply", Box::new(MultiplyTemplate));
    registry.insert("prompt-template", Box::new(PromptTemplateTemplate));
    registry.insert("for-each", Box::new(ForEachTemplate));
    registry.insert("for-loop", Box::new(ForLoopTemplate));
}
