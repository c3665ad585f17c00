//! The compute contract between nodes and the executor
//!
//! Every node kind implements [`NodeBehavior`]. The executor snapshots an
//! [`ExecutionContext`] immediately before the call and applies the
//! returned [`ExecutionResult`] to the node's ports afterwards; behaviors
//! never touch the graph directly.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeId;

/// Scheduler directive returned from a compute call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecCommand {
    /// Enqueue nodes downstream of every activated control output
    Continue,
    /// Suspend this branch (reserved)
    Wait,
    /// Re-enqueue this node for another turn after its activated outputs
    /// have been driven - iterative loop drivers use this
    LoopAgain,
    /// Do not re-enqueue; downstream of activated outputs still cooks
    Completed,
}

/// Failure raised from inside a node's compute call
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ComputeError {
    message: String,
}

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Convenience for the common "required input not wired" case.
    pub fn missing_input(port: &str) -> Self {
        Self::new(format!("missing required input '{port}'"))
    }
}

/// Snapshot handed to a node's compute call.
///
/// Holds the node's resolved data-input values and control-input
/// activations at the moment the executor scheduled it. Nodes must not
/// mutate the graph through it - it carries no graph reference at all.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub node_id: NodeId,
    pub node_name: String,
    pub network_id: Option<NodeId>,
    pub node_path: String,
    pub data_inputs: HashMap<String, serde_json::Value>,
    pub control_inputs: HashMap<String, bool>,
}

impl ExecutionContext {
    /// Data input value, `Null` when absent.
    pub fn data_input(&self, port: &str) -> &serde_json::Value {
        self.data_inputs
            .get(port)
            .unwrap_or(&serde_json::Value::Null)
    }

    /// Data input as i64 with a fallback for null/absent/mistyped values.
    pub fn int_input(&self, port: &str, default: i64) -> i64 {
        self.data_input(port).as_i64().unwrap_or(default)
    }

    /// Data input as f64 with a fallback.
    pub fn float_input(&self, port: &str, default: f64) -> f64 {
        self.data_input(port).as_f64().unwrap_or(default)
    }

    /// Data input as bool with a fallback.
    pub fn bool_input(&self, port: &str, default: bool) -> bool {
        self.data_input(port).as_bool().unwrap_or(default)
    }

    /// Whether a control input is currently active.
    pub fn control_active(&self, port: &str) -> bool {
        self.control_inputs.get(port).copied().unwrap_or(false)
    }
}

/// Standardized return value of every compute call.
///
/// Decouples node logic from flow control: the command tells the scheduler
/// what to do next, the value maps are applied to the node's ports.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: ExecCommand,
    pub data_outputs: HashMap<String, serde_json::Value>,
    pub control_outputs: HashMap<String, bool>,
}

impl ExecutionResult {
    pub fn new(command: ExecCommand) -> Self {
        Self {
            command,
            data_outputs: HashMap::new(),
            control_outputs: HashMap::new(),
        }
    }

    pub fn with_data(mut self, port: impl Into<String>, value: serde_json::Value) -> Self {
        self.data_outputs.insert(port.into(), value);
        self
    }

    pub fn with_control(mut self, port: impl Into<String>, active: bool) -> Self {
        self.control_outputs.insert(port.into(), active);
        self
    }
}

/// Per-node-kind compute logic.
///
/// A behavior owns whatever per-node state it needs across calls (loop
/// indices, item cursors). State carried across `LoopAgain` turns is reset
/// when the behavior returns `Completed`.
#[async_trait]
pub trait NodeBehavior: Send {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError>;
}
