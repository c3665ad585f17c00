//! Utility nodes: constant sources and printing sinks

use async_trait::async_trait;
use serde_json::json;

use loomflow_graph::{
    ComputeError, ExecCommand, ExecutionContext, ExecutionResult, NodeBehavior, NodeRegistry,
    NodeSpec, Port, Result, ValueType,
};

/// `constant` - pure value source, no inputs.
///
/// Options: `value` (the constant, default 0), `value_type` (optional
/// override; inferred from the value otherwise).
struct Constant {
    value: serde_json::Value,
}

#[async_trait]
impl NodeBehavior for Constant {
    async fn compute(
        &mut self,
        _ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        Ok(ExecutionResult::new(ExecCommand::Continue).with_data("out", self.value.clone()))
    }
}

/// `print` - flow sink that prints its wired value.
struct Print;

#[async_trait]
impl NodeBehavior for Print {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let value = ctx.data_input("value");
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("[{}] {}", ctx.node_name, rendered);
        Ok(ExecutionResult::new(ExecCommand::Continue).with_control("next", true))
    }
}

/// `accumulator` - flow sink that records every value it is called with.
///
/// The call count, last value, and full history are mirrored onto data
/// output ports so clients observe them through the graph.
struct Accumulator {
    count: i64,
    values: Vec<serde_json::Value>,
}

#[async_trait]
impl NodeBehavior for Accumulator {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let value = ctx.data_input("val").clone();
        self.count += 1;
        if !value.is_null() {
            self.values.push(value.clone());
        }
        log::debug!(
            "accumulator '{}' call #{} val={}",
            ctx.node_name,
            self.count,
            value
        );
        Ok(ExecutionResult::new(ExecCommand::Continue)
            .with_data("count", json!(self.count))
            .with_data("last", value)
            .with_data("history", json!(self.values))
            .with_control("next", true))
    }
}

/// `step-printer` - prints one formatted line per agent reasoning step.
struct StepPrinter;

#[async_trait]
impl NodeBehavior for StepPrinter {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let step_type = ctx.data_input("step_type").as_str().unwrap_or("").to_string();
        let content = ctx
            .data_input("step_content")
            .as_str()
            .unwrap_or("")
            .to_string();
        let tool = ctx.data_input("tool_name").as_str().unwrap_or("").to_string();

        match step_type.as_str() {
            "tool_call" => println!("  -> {tool}({content})"),
            "tool_result" => println!("  <- {content}"),
            other => println!("  [{other}] {content}"),
        }
        Ok(ExecutionResult::new(ExecCommand::Continue).with_control("next", true))
    }
}

fn parse_value_type(options: &serde_json::Value) -> Option<ValueType> {
    options
        .get("value_type")
        .and_then(|v| serde_json::from_value::<ValueType>(v.clone()).ok())
}

pub fn register(registry: &mut NodeRegistry) -> Result<()> {
    registry.register("constant", |options| {
        let value = options.get("value").cloned().unwrap_or(json!(0));
        let value_type = parse_value_type(options).unwrap_or_else(|| ValueType::infer(&value));
        Ok(NodeSpec::data(Box::new(Constant {
            value: value.clone(),
        }))
        .with_output(Port::output_data("out", value_type).with_value(value)))
    })?;

    registry.register("print", |_options| {
        Ok(NodeSpec::flow(Box::new(Print))
            .with_input(Port::input_control("exec"))
            .with_input(Port::input_data("value", ValueType::Any))
            .with_output(Port::output_control("next")))
    })?;

    registry.register("accumulator", |_options| {
        Ok(NodeSpec::flow(Box::new(Accumulator {
            count: 0,
            values: Vec::new(),
        }))
        .with_input(Port::input_control("exec"))
        .with_input(Port::input_data("val", ValueType::Any))
        .with_output(Port::output_control("next"))
        .with_output(Port::output_data("count", ValueType::Int))
        .with_output(Port::output_data("last", ValueType::Any))
        .with_output(Port::output_data("history", ValueType::Array)))
    })?;

    registry.register("step-printer", |_options| {
        Ok(NodeSpec::flow(Box::new(StepPrinter))
            .with_input(Port::input_control("exec"))
            .with_input(Port::input_data("step_type", ValueType::String))
            .with_input(Port::input_data("step_content", ValueType::String))
            .with_input(Port::input_data("tool_name", ValueType::String))
            .with_output(Port::output_control("next")))
    })?;

    Ok(())
}
