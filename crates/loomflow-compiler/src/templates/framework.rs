//! Framework-bound emission profile
//!
//! Agent and LLM node templates that emit calls into langchain /
//! langgraph. The emitted file depends on `langchain`,
//! `langchain-openai`, and (for web search) `langchain-community`.

use crate::schedule::ScheduledNode;
use crate::templates::{
    register_shared, tool_names_from_expr, NodeTemplate, TemplateRegistry,
};
use crate::writer::CodeWriter;

fn tool_def(name: &str) -> Option<&'static str> {
    match name {
        "calculator" => Some(
            r#"@tool
def calculator(expression: str) -> str:
    """Evaluate a simple Python maths expression e.g. '2 + 3 * 4'."""
    try:
        return str(eval(expression, {"__builtins__": {}}, {}))
    except Exception as exc:
        return f"Error: {exc}""#,
        ),
        "word_count" => Some(
            r#"@tool
def word_count(text: str) -> str:
    """Count the number of words in a text string."""
    return str(len(text.split()))"#,
        ),
        "web_search" => Some(
            r#"@tool
def web_search(query: str) -> str:
    """Search the web for a query string."""
    try:
        from langchain_community.tools import DuckDuckGoSearchRun
        return DuckDuckGoSearchRun().run(query)
    except ImportError:
        return "web_search unavailable (install langchain-community)""#,
        ),
        _ => None,
    }
}

/// Tool definitions + the `_TOOLS` lookup dict.
fn tool_block(tool_names: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("# -- LangChain tools ------------------------------------------------------".to_string());
    lines.push("from langchain_core.tools import tool".to_string());
    lines.push(String::new());
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
    lines
}

const BLOCKING_AGENT_HELPER: &str = r#"async def _run_agent(task: str, tool_names: list, model: str = "gpt-4o-mini") -> dict:
    """Run a blocking LangChain ReAct agent and return the result dict."""
    from langchain.agents import create_agent
    _tools = [_TOOLS[t] for t in tool_names if t in _TOOLS]
    agent = create_agent(
        model=f"openai:{model}",
        tools=_tools,
        system_prompt="You are a helpful assistant that uses tools to complete tasks.",
    )
    output = await agent.ainvoke({"messages": [{"role": "user", "content": task}]})
    messages = output.get("messages", [])
    tool_call_log, step_counter = [], 0
    tool_outputs: dict = {}
    for msg in messages:
        if type(msg).__name__ == "ToolMessage":
            tool_outputs[getattr(msg, "tool_call_id", "")] = str(msg.content)[:200]
    for msg in messages:
        if type(msg).__name__ == "AIMessage":
            for tc in getattr(msg, "tool_calls", []):
                step_counter += 1
                tool_call_log.append({
                    "tool": tc.get("name", ""),
                    "input": tc.get("args", {}),
                    "output": tool_outputs.get(tc.get("id", ""), ""),
                    "step": step_counter,
                })
    final_content = ""
    if messages:
        last = messages[-1]
        final_content = last.content if hasattr(last, "content") else str(last)
    return {"result": final_content, "tool_calls": tool_call_log, "steps": step_counter}"#;

/// `tool-agent` - blocking agent call; waits for the full result.
pub struct ToolAgentTemplate;

impl NodeTemplate for ToolAgentTemplate {
    fn preamble(&self, node: &ScheduledNode) -> Vec<String> {
        let tool_names = tool_names_from_expr(node.input_expr("tools").unwrap_or("[]"));
        let mut lines = tool_block(&tool_names);
        lines.extend(BLOCKING_AGENT_HELPER.lines().map(String::from));
        lines.push(String::new());
        lines
    }

    fn emit_inline(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let task = node.input_expr("task").unwrap_or("\"\"");
        let tools = node.input_expr("tools").unwrap_or("[]");
        let model = node.input_expr("model").unwrap_or("'gpt-4o-mini'");
        let result = node.output_var("result").unwrap_or("_agent_result").to_string();
        let calls = node
            .output_var("tool_calls")
            .unwrap_or("_agent_tool_calls")
            .to_string();
        let steps = node.output_var("steps").unwrap_or("_agent_steps").to_string();

        w.comment(&format!("Node: {} (tool-agent, blocking)", node.node_name));
        w.writeln("_agent_out = await _run_agent(");
        w.push();
        w.writeln(&format!("task={task},"));
        w.writeln(&format!("tool_names={tools},"));
        w.writeln(&format!("model={model},"));
        w.pop();
        w.writeln(")");
        w.writeln(&format!("{result} = _agent_out[\"result\"]"));
        w.writeln(&format!("{calls} = _agent_out[\"tool_calls\"]"));
        w.writeln(&format!("{steps} = _agent_out[\"steps\"]"));
    }
}

const STREAM_AGENT_HELPER: &str = r#"async def _agent_event_stream(task: str, tool_names: list, model: str = "gpt-4o-mini"):
    """
    Async generator over meaningful LangGraph reasoning steps.
    Yields dicts with keys: step_type, tool_name, content.
      step_type == "tool_call"   - agent is about to call a tool
      step_type == "tool_result" - tool returned a result
      step_type == "final"       - agent produced the final answer
    """
    from langchain.agents import create_agent
    _tools = [_TOOLS[t] for t in tool_names if t in _TOOLS]
    agent = create_agent(
        model=f"openai:{model}",
        tools=_tools,
        system_prompt="You are a helpful assistant that uses tools to complete tasks.",
    )
    async for event in agent.astream_events(
        {"messages": [{"role": "user", "content": task}]},
        version="v2",
    ):
        kind = event.get("event", "")
        name = event.get("name", "")
        data = event.get("data", {})

        if kind == "on_tool_start":
            yield {"step_type": "tool_call", "tool_name": name,
                   "content": str(data.get("input", {}))[:300]}

        elif kind == "on_tool_end":
            out = data.get("output", "")
            if hasattr(out, "content"):
                out = out.content
            yield {"step_type": "tool_result", "tool_name": name,
                   "content": str(out)[:300]}

        elif kind == "on_chain_end" and name == "LangGraph":
            msgs = (data.get("output") or {}).get("messages", [])
            final = ""
            if msgs:
                last = msgs[-1]
                final = last.content if hasattr(last, "content") else str(last)
            yield {"step_type": "final", "tool_name": "", "content": final}"#;

/// `tool-agent-stream` - loop driver over agent reasoning steps.
pub struct ToolAgentStreamTemplate;

impl NodeTemplate for ToolAgentStreamTemplate {
    fn preamble(&self, node: &ScheduledNode) -> Vec<String> {
        let tool_names = tool_names_from_expr(node.input_expr("tools").unwrap_or("[]"));
        let mut lines = tool_block(&tool_names);
        lines.extend(STREAM_AGENT_HELPER.lines().map(String::from));
        lines.push(String::new());
        lines
    }

    fn emit_loop_expr(&self, node: &ScheduledNode) -> Option<String> {
        let task = node.input_expr("task").unwrap_or("\"\"");
        let tools = node.input_expr("tools").unwrap_or("[]");
        let model = node.input_expr("model").unwrap_or("'gpt-4o-mini'");
        Some(format!(
            "_agent_event_stream(\n        task={task},\n        tool_names={tools},\n        model={model},\n    )"
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

const BLOCKING_LLM_HELPER: &str = r#"async def _llm_complete(prompt: str, system_prompt: str = "You are a helpful assistant.",
                        model: str = "gpt-4o-mini", temperature: float = 0.7):
    """Run one blocking chat completion; returns (text, model, total tokens)."""
    from langchain_openai import ChatOpenAI
    from langchain_core.messages import HumanMessage, SystemMessage
    llm = ChatOpenAI(model=model, temperature=temperature)
    message = await llm.ainvoke([SystemMessage(content=system_prompt),
                                 HumanMessage(content=prompt)])
    usage = getattr(message, "usage_metadata", None) or {}
    return message.content, model, usage.get("total_tokens", 0)"#;

/// `llm` - blocking chat completion.
pub struct LlmTemplate;

impl NodeTemplate for LlmTemplate {
    fn preamble(&self, _node: &ScheduledNode) -> Vec<String> {
        let mut lines: Vec<String> = BLOCKING_LLM_HELPER.lines().map(String::from).collect();
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

        w.comment(&format!("Node: {} (llm, blocking)", node.node_name));
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

const STREAM_LLM_HELPER: &str = r#"async def _llm_token_stream(prompt: str, system_prompt: str = "You are a helpful assistant.",
                            model: str = "gpt-4o-mini", temperature: float = 0.7):
    """Async generator that yields one token string at a time."""
    from langchain_openai import ChatOpenAI
    from langchain_core.messages import HumanMessage, SystemMessage
    llm = ChatOpenAI(model=model, temperature=temperature, streaming=True)
    async for chunk in llm.astream([SystemMessage(content=system_prompt),
                                    HumanMessage(content=prompt)]):
        if chunk.content:
            yield chunk.content"#;

/// `llm-stream` - loop driver yielding one token per iteration.
pub struct LlmStreamTemplate;

impl NodeTemplate for LlmStreamTemplate {
    fn preamble(&self, _node: &ScheduledNode) -> Vec<String> {
        let mut lines: Vec<String> = STREAM_LLM_HELPER.lines().map(String::from).collect();
        lines.push(String::new());
        lines
    }

    fn emit_loop_expr(&self, node: &ScheduledNode) -> Option<String> {
        let prompt = node.input_expr("prompt").unwrap_or("\"\"");
        let system = node
            .input_expr("system_prompt")
            .unwrap_or("'You are a helpful assistant.'");
        let model = node.input_expr("model").unwrap_or("'gpt-4o-mini'");
        let temperature = node.input_expr("temperature").unwrap_or("0.7");
        Some(format!(
            "_llm_token_stream(\n        prompt={prompt},\n        system_prompt={system},\n        model={model},\n        temperature={temperature},\n    )"
        ))
    }

    fn emit_loop_break(&self, node: &ScheduledNode, w: &mut CodeWriter) {
        let chunk = node.output_var("chunk").unwrap_or("_chunk").to_string();
        let accumulated = node
            .output_var("accumulated")
            .unwrap_or("_accumulated")
            .to_string();
        let count = node.output_var("chunk_count").unwrap_or("_chunk_count").to_string();
        w.writeln(&format!("{chunk} = _step"));
        w.writeln(&format!("{accumulated} += _step"));
        w.writeln(&format!("{count} += 1"));
    }
}

/// The framework-bound template registry.
pub fn templates() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    register_shared(&mut registry);
    registry.insert("tool-agent", Box::new(ToolAgentTemplate));
    registry.insert("tool-agent-stream", Box::new(ToolAgentStreamTemplate));
    registry.insert("llm", Box::new(LlmTemplate));
    registry.insert("llm-stream", Box::new(LlmStreamTemplate));
    registry
}
