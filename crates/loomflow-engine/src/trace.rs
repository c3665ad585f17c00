//! Trace events for observing a cooking run
//!
//! A [`TraceSink`] is injected into the executor at construction. This
//! abstracts over the transport (test buffer, channel, websocket fan-out)
//! so the engine never depends on a delivery mechanism.

use std::sync::Mutex;

use serde::Serialize;

use loomflow_graph::{ExecCommand, NodeId};

/// Events emitted while cooking
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceEvent {
    /// A cooking call began
    #[serde(rename_all = "camelCase")]
    CookStarted { target: NodeId },

    /// A cooking call drained all of its work
    #[serde(rename_all = "camelCase")]
    CookFinished { target: NodeId },

    /// A node's compute was invoked
    #[serde(rename_all = "camelCase")]
    NodeStarted { node_id: NodeId, name: String },

    /// A node's compute returned
    #[serde(rename_all = "camelCase")]
    NodeFinished {
        node_id: NodeId,
        name: String,
        command: ExecCommand,
    },

    /// A node's compute failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: NodeId,
        name: String,
        error: String,
    },

    /// A concurrent batch finished reconciling
    #[serde(rename_all = "camelCase")]
    BatchCompleted { size: usize },
}

/// Trait for receiving trace events.
///
/// Delivery is best effort; sinks must not block the executor.
pub trait TraceSink: Send + Sync {
    fn send(&self, event: TraceEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn send(&self, _event: TraceEvent) {}
}

/// Sink that buffers events in memory - used by tests to assert on
/// execution order.
#[derive(Debug, Default)]
pub struct VecTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl VecTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("trace sink poisoned").clone()
    }

    /// Names of finished nodes, in completion order.
    pub fn finished_names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::NodeFinished { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl TraceSink for VecTraceSink {
    fn send(&self, event: TraceEvent) {
        self.events.lock().expect("trace sink poisoned").push(event);
    }
}
