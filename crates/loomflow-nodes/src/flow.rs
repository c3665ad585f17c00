//! Flow-control nodes: branch and the iterative loop drivers
//!
//! Loop drivers carry iteration state across `LoopAgain` turns and reset
//! it when they return `Completed`.

use async_trait::async_trait;
use serde_json::json;

use loomflow_graph::{
    ComputeError, ExecCommand, ExecutionContext, ExecutionResult, NodeBehavior, NodeRegistry,
    NodeSpec, Port, Result, ValueType,
};

/// `branch` - routes control to `true_out` or `false_out` by condition.
struct Branch;

#[async_trait]
impl NodeBehavior for Branch {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let condition = ctx.bool_input("condition", false);
        Ok(ExecutionResult::new(ExecCommand::Continue)
            .with_control("true_out", condition)
            .with_control("false_out", !condition))
    }
}

/// `for-loop` - drives `loop_body` once per index in `start..end`, then
/// fires `completed`. A `start == end` range produces zero body turns.
struct ForLoop {
    index: i64,
    active: bool,
}

#[async_trait]
impl NodeBehavior for ForLoop {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let start = ctx.int_input("start", 0);
        let end = ctx.int_input("end", 0);

        if !self.active {
            self.index = start;
            self.active = true;
        }

        if self.index < end {
            let idx = self.index;
            self.index += 1;
            Ok(ExecutionResult::new(ExecCommand::LoopAgain)
                .with_data("index", json!(idx))
                .with_control("loop_body", true)
                .with_control("completed", false))
        } else {
            self.index = start;
            self.active = false;
            Ok(ExecutionResult::new(ExecCommand::Completed)
                .with_control("completed", true)
                .with_control("loop_body", false))
        }
    }
}

/// `for-each` - drives `loop_body` once per list element with `item`,
/// `index`, and `total` outputs; fires `completed` when exhausted. An
/// empty list completes immediately.
struct ForEach {
    items: Vec<serde_json::Value>,
    index: usize,
    total: usize,
    active: bool,
}

impl ForEach {
    fn reset(&mut self) {
        self.items = Vec::new();
        self.index = 0;
        self.total = 0;
        self.active = false;
    }

    fn completed() -> ExecutionResult {
        ExecutionResult::new(ExecCommand::Completed)
            .with_control("completed", true)
            .with_control("loop_body", false)
    }
}

#[async_trait]
impl NodeBehavior for ForEach {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        if !self.active {
            let raw = ctx.data_input("items");
            self.items = match raw {
                serde_json::Value::Null => Vec::new(),
                serde_json::Value::Array(items) => items.clone(),
                // A plain scalar iterates as a one-element list.
                other => vec![other.clone()],
            };
            self.total = self.items.len();
            self.index = 0;
            self.active = true;

            if self.total == 0 {
                self.reset();
                return Ok(Self::completed());
            }
        }

        if self.index < self.total {
            let item = self.items[self.index].clone();
            let idx = self.index;
            self.index += 1;
            Ok(ExecutionResult::new(ExecCommand::LoopAgain)
                .with_data("item", item)
                .with_data("index", json!(idx))
                .with_data("total", json!(self.total))
                .with_control("loop_body", true)
                .with_control("completed", false))
        } else {
            self.reset();
            Ok(Self::completed())
        }
    }
}

pub fn register(registry: &mut NodeRegistry) -> Result<()> {
    registry.register("branch", |_options| {
        Ok(NodeSpec::flow(Box::new(Branch))
            .with_input(Port::input_control("exec"))
            .with_input(Port::input_data("condition", ValueType::Bool))
            .with_output(Port::output_control("true_out"))
            .with_output(Port::output_control("false_out")))
    })?;

    registry.register("for-loop", |options| {
        let start = options.get("start").cloned().unwrap_or(json!(0));
        let end = options.get("end").cloned().unwrap_or(json!(0));
        Ok(NodeSpec::flow(Box::new(ForLoop {
            index: 0,
            active: false,
        }))
        .with_input(Port::input_control("exec"))
        .with_input(Port::input_data("start", ValueType::Int).with_value(start))
        .with_input(Port::input_data("end", ValueType::Int).with_value(end))
        .with_output(Port::output_control("loop_body"))
        .with_output(Port::output_control("completed"))
        .with_output(Port::output_data("index", ValueType::Int)))
    })?;

    registry.register("for-each", |options| {
        let items = options.get("items").cloned().unwrap_or(json!([]));
        Ok(NodeSpec::flow(Box::new(ForEach {
            items: Vec::new(),
            index: 0,
            total: 0,
            active: false,
        }))
        .with_input(Port::input_control("exec"))
        .with_input(Port::input_data("items", ValueType::Any).with_value(items))
        .with_output(Port::output_control("loop_body"))
        .with_output(Port::output_control("completed"))
        .with_output(Port::output_data("item", ValueType::Any))
        .with_output(Port::output_data("index", ValueType::Int))
        .with_output(Port::output_data("total", ValueType::Int)))
    })?;

    Ok(())
}
