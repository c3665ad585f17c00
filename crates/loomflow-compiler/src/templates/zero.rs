//! Zero-framework emission profile
//!
//! Agent templates that target the raw `openai` SDK only - the ReAct
//! loop is emitted by hand over the native tool_calls message format.
//! The compiled output needs nothing beyond `pip install openai
//! python-dotenv`.

use crate::schedule::ScheduledNode;
use crate::templates::{
    register_shared, tool_names_from_expr, NodeTemplate, TemplateRegistry,
};
use crate::writer::CodeWriter;

fn tool_def(name: &str) -> Option<&'static str> {
    match name {
        "calculator" => Some(
            r#"def calculator(expression: str) -> str:
    """Evaluate a simple Python maths expression e.g. '2 + 3 * 4'."""
    try:
        return str(eval(expression, {"__builtins__": {}}, {}))
    except Exception as exc:
        return f"Error: {exc}""#,
        ),
        "word_count" => Some(
            r#"def word_count(text: str) -> str:
    """Count the number of words in a text string."""
    return str(len(text.split()))"#,
        ),
        "web_search" => Some(
            r#"def web_search(query: str) -> str:
    """Search the web (stub - replace with a real implementation)."""
    return f"web_search not implemented for standalone mode (query={query!r})""#,
        ),
        _ => None,
    }
}

fn tool_schema(name: &str) -> Option<&'static str> {
    match name {
        "calculator" => Some(
            r#"{
    "type": "function",
    "function": {
        "name": "calculator",
        "description": "Evaluate a simple Python maths expression e.g. '2 + 3 * 4'.",
        "parameters": {
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "The maths expression to evaluate."}
            },
            "required": ["expression"]
        }
    }
}"#,
        ),
        "word_count" => Some(
            r#"{
    "type": "function",
    "function": {
        "name": "word_count",
        "description": "Count the number of words in a text string.",
        "parameters": {
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "The text to count words in."}
            },
            "required": ["text"]
        }
    }
}"#,
        ),
        "web_search" => Some(
            r#"{
    "type": "function",
    "function": {
        "name": "web_search",
        "description": "Search the web for a query.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query."}
            },
            "required": ["query"]
        }
    }
}"#,
        ),
        _ => None,
    }
}

const CLIENT_PREAMBLE: &str = r#"import json as _json
from openai import AsyncOpenAI as _AsyncOpenAI

_client = _AsyncOpenAI()"#;

/// Tool function defs + `_TOOLS` dict + `_TOOL_SCHEMAS` list.
fn tool_block(tool_names: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("# -- Tools ----------------------------------------------------------------".to_string());
    for name in tool_names {
        if let Some(def) = tool_def(name) {
            lines.extend(def.lines().map(String::from));
            lines.push(String::new());
        }
    }

    lines.push("_TOOLS = {".to_string());
    for name in tool_names {
        lines.push(format!("    \"{name}\": {name},"));
    }
    lines.push("}".to_string());
    lines.push(String::new());

    lines.push("_TOOL_SCHEMAS = [".to_string());
    for name in tool_names {
        if let Some(schema) = tool_schema(name) {
            for line in schema.lines() {
                lines.push(format!("    {line}"));
            }
            if let Some(last) = lines.last_mut() {
                last.push(',');
            }
        }
    }
    lines.push("]".to_string());
    lines.push(String::new());
    lines
}

const BLOCKING_AGENT_HELPER: &str = r#"async def _run_agent(
    task: str,
    tool_schemas: list,
    model: str = "gpt-4o-mini",
    system_prompt: str = "You are a helpful assistant that uses tools to complete tasks.",
) -> dict:
    """
    ReAct loop using the raw OpenAI chat completions API.

    Returns: {"result": str, "tool_calls": list, "steps": int}
    """
    messages = [
        {"role": "system", "content": system_prompt},
        {"role": "user", "content": task},
    ]
    tool_call_log: list = []
    step_counter: int = 0

    while True:
        response = await _client.chat.completions.create(
            model=model,
            messages=messages,
            tools=tool_schemas if tool_schemas else [],
            tool_choice="auto" if tool_schemas else "none",
        )
        msg = response.choices[0].message

        assistant_turn: dict = {"role": "assistant", "content": msg.content}
        if msg.tool_calls:
            assistant_turn["tool_calls"] = [
                {
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.function.name,
                        "arguments": tc.function.arguments,
                    },
                }
                for tc in msg.tool_calls
            ]
        messages.append(assistant_turn)

        if not msg.tool_calls:
            return {
                "result": msg.content or "",
                "tool_calls": tool_call_log,
                "steps": step_counter,
            }

        for tc in msg.tool_calls:
            step_counter += 1
            name = tc.function.name
            args = _json.loads(tc.function.arguments or "{}")
            output = _TOOLS[name](**args) if name in _TOOLS else f"Unknown tool: {name!r}"

            tool_call_log.append({
                "tool": name,
                "input": args,
                "output": output,
                "step": step_counter,
            })

            messages.append({
                "role": "tool",
                "tool_call_id": tc.id,
                "content": output,
            })"#;

/// `tool-agent` - blocking ReAct loop over the raw OpenAI API.
pub struct ToolAgentTemplate;

impl NodeTemplate for ToolAgentTemplate {
    fn preamble(&self, node: &ScheduledNode) -> Vec<String> {
        let tool_names = tool_names_from_expr(node.input_expr("tools").unwrap_or("[]"));
        let mut lines: Vec<String> = CLIENT_PREAMBLE.lines().map(String::from).collect();
        lines.push(String::new());
        lines.extend(tool_block(&tool_names));
        lines.extend(BLOCKING_AGENT_HELPER.lines().map(String::from));
        lines.push(String::new());
        lines
    }

    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let task = node.input_expr("task").unwrap_or("\"\"");
        let model = node.input_expr("model").unwrap_or("'gpt-4o-mini'");
        let result = node.output_var("result").unwrap_or("_agent_result").to_string();
        let calls = node
            .output_var("tool_calls")
            .unwrap_or("_agent_tool_calls")
            .to_string();
        let steps = node.output_var("steps").unwrap_or("_agent_steps").to_string();

        w.comment(&format!(
            "Node: {} (tool-agent, blocking, zero-framework)",
            node.node_name
        ));
        w.writeln("_agent_out = await _run_agent(");
        w.push();
        w.writeln(&format!("task={task},"));
        w.writeln("tool_schemas=_TOOL_SCHEMAS,");
        w.writeln(&format!("model={model},"));
        w.pop();
        w.writeln(")");
        w.writeln(&format!("{result} = _agent_out[\"result\"]"));
        w.writeln(&format!("{calls} = _agent_out[\"tool_calls\"]"));
        w.writeln(&format!("{steps} = _agent_out[\"steps\"]"));
    }
}

const STREAM_AGENT_HELPER: &str = r#"async def _agent_event_stream(
    task: str,
    tool_schemas: list,
    model: str = "gpt-4o-mini",
    system_prompt: str = "You are a helpful assistant that uses tools to complete tasks.",
):
    """
    Async generator over reasoning steps using the raw OpenAI API.

    Yields dicts with keys: step_type, tool_name, content.
      step_type == "tool_call"   - agent is about to call a tool
      step_type == "tool_result" - tool returned a result
      step_type == "final"       - agent produced the final answer
    """
    messages = [
        {"role": "system", "content": system_prompt},
        {"role": "user", "content": task},
    ]

    while True:
        response = await _client.chat.completions.create(
            model=model,
            messages=messages,
            tools=tool_schemas if tool_schemas else [],
            tool_choice="auto" if tool_schemas else "none",
        )
        msg = response.choices[0].message

        assistant_turn: dict = {"role": "assistant", "content": msg.content}
        if msg.tool_calls:
            assistant_turn["tool_calls"] = [
                {
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.function.name,
                        "arguments": tc.function.arguments,
                    },
                }
                for tc in msg.tool_calls
            ]
        messages.append(assistant_turn)

        if not msg.tool_calls:
            yield {
                "step_type": "final",
                "tool_name": "",
                "content": msg.content or "",
            }
            return

        for tc in msg.tool_calls:
            name = tc.function.name
            args = _json.loads(tc.function.arguments or "{}")

            yield {
                "step_type": "tool_call",
                "tool_name": name,
                "content": str(args),
            }

            output = _TOOLS[name](**args) if name in _TOOLS else f"Unknown tool: {name!r}"
            messages.append({
                "role": "tool",
                "tool_call_id": tc.id,
                "content": output,
            })

            yield {
                "step_type": "tool_result",
                "tool_name": name,
                "content": output,
            }"#;

/// `tool-agent-stream` - loop driver over hand-rolled ReAct steps.
pub struct ToolAgentStreamTemplate;

impl NodeTemplate for ToolAgentStreamTemplate {
    fn preamble(&self, node: &ScheduledNode) -> Vec<String> {
        let tool_names = tool_names_from_expr(node.input_expr("tools").unwrap_or("[]"));
        let mut lines: Vec<String> = CLIENT_PREAMBLE.lines().map(String::from).collect();
        lines.push(String::new());
        lines.extend(tool_block(&tool_names));
        lines.extend(STREAM_AGENT_HELPER.lines().map(String::from));
        lines.push(String::new());
        lines
    }

    fn emit_loop_expr(&self, node: &ScheduledNode) -> Option<String> {
        let task = node.input_expr("task").unwrap_or("\"\"");
        let model = node.input_expr("model").unwrap_or("'gpt-4o-mini'");
        Some(format!(
            "_agent_event_stream(\n        task={task},\n        tool_schemas=_TOOL_SCHEMAS,\n        model={model},\n    )"
        ))
    }

    fn emit_loop_break(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let step_type = node.output_var("step_type").unwrap_or("_step_type").to_string();
        let content = node
            .output_var("step_content")
            .unwrap_or("_step_content")
            .to_string();
        let tool = node.output_var("tool_name").unwrap_or("_tool_name").to_string();
        let count = node.output_var("step_count").unwrap_or("_step_count").to_string();
        let result = node.output_var("result").unwrap_or("_agent_result").to_string();

        w.writeln(&format!("{step_type} = _step.get('step_type', '')"));
        w.writeln(&format!("{content} = _step.get('content', '')"));
        w.writeln(&format!("{tool} = _step.get('tool_name', '')"));
        w.writeln(&format!("{count} += 1"));
        w.blank();
        w.writeln(&format!("if {step_type} == 'final':"));
        w.push();
        w.writeln(&format!("{result} = {content}"));
        w.writeln("break");
        w.pop();
    }
}

const BLOCKING_LLM_HELPER: &str = r#"async def _llm_complete(
    prompt: str,
    system_prompt: str = "You are a helpful assistant.",
    model: str = "gpt-4o-mini",
    temperature: float = 0.7,
):
    """Run one chat completion; returns (text, model, total tokens)."""
    response = await _client.chat.completions.create(
        model=model,
        temperature=temperature,
        messages=[
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": prompt},
        ],
    )
    usage = response.usage
    total_tokens = usage.total_tokens if usage else 0
    return response.choices[0].message.content or "", response.model, total_tokens"#;

/// `llm` - blocking chat completion over the raw client.
pub struct LlmTemplate;

impl NodeTemplate for LlmTemplate {
    fn preamble(&self, _node: &ScheduledNode) -> Vec<String> {
        let mut lines: Vec<String> = CLIENT_PREAMBLE.lines().map(String::from).collect();
        lines.push(String::new());
        lines.extend(BLOCKING_LLM_HELPER.lines().map(String::from));
        lines.push(String::new());
        lines
    }

    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let prompt = node.input_expr("prompt").unwrap_or("\"\"");
        let system = node
            .input_expr("system_prompt")
            .unwrap_or("'You are a helpful assistant.'");
        let model = node.input_expr("model").unwrap_or("'gpt-4o-mini'");
        let temperature = node.input_expr("temperature").unwrap_or("0.7");
        let response = node.output_var("response").unwrap_or("_llm_response").to_string();
        let model_used = node
            .output_var("model_used")
            .unwrap_or("_llm_model_used")
            .to_string();
        let tokens = node
            .output_var("tokens_used")
            .unwrap_or("_llm_tokens_used")
            .to_string();

        w.comment(&format!(
            "Node: {} (llm, blocking, zero-framework)",
            node.node_name
        ));
        w.writeln(&format!("{response}, {model_used}, {tokens} = await _llm_complete("));
        w.push();
        w.writeln(&format!("prompt={prompt},"));
        w.writeln(&format!("system_prompt={system},"));
        w.writeln(&format!("model={model},"));
        w.writeln(&format!("temperature={temperature},"));
        w.pop();
        w.writeln(")");
    }
}

/// The zero-framework template registry.
pub fn templates() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    register_shared(&mut registry);
    registry.insert("tool-agent", Box::new(ToolAgentTemplate));
    registry.insert("tool-agent-stream", Box::new(ToolAgentStreamTemplate));
    registry.insert("llm", Box::new(LlmTemplate));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        let registry = templates();
        assert!(registry.has("tool-agent"));
        assert!(registry.has("llm"));
        assert!(registry.has("prompt-template"));
        assert!(registry.has("for-each"));
        // llm-stream is framework-only; zero falls back to the stub.
        assert!(!registry.has("llm-stream"));
    }

    #[test]
    fn test_tool_block_emits_schemas() {
        let lines = tool_block(&["word_count".to_string()]);
        let text = lines.join("\n");
        assert!(text.contains("def word_count"));
        assert!(text.contains("_TOOL_SCHEMAS = ["));
        assert!(text.contains("\"name\": \"word_count\""));
        // Trailing comma after the schema's closing brace.
        assert!(text.contains("    },"));
    }
}
