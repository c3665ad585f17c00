//! The cooking executor
//!
//! Two entry points share one batched scheduler:
//!
//! - `cook_data_nodes` evaluates the data-only subgraph a target needs,
//!   then computes the target.
//! - `cook_flow_control_nodes` drives a flow root and everything reachable
//!   through control edges until no work remains.
//!
//! The scheduler works over three structures: an *executor stack* of nodes
//! ready this batch, a *pending table* of node -> unsatisfied dependency
//! ids, and a *deferred stack* of loop drivers that requested another
//! turn. All nodes of a batch compute concurrently; graph state is
//! reconciled strictly between batches.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;

use loomflow_graph::{
    ComputeError, EdgeClass, ExecCommand, ExecutionContext, ExecutionResult, Graph, NodeBehavior,
    NodeId,
};

use crate::cancel::CancelFlag;
use crate::error::{EngineError, Result};
use crate::trace::{NullTraceSink, TraceEvent, TraceSink};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Node -> unsatisfied dependency ids, in insertion order.
///
/// Insertion order matters: promotion feeds the executor stack, and batch
/// order follows promotion order.
#[derive(Default)]
struct PendingTable {
    entries: Vec<(NodeId, Vec<NodeId>)>,
}

impl PendingTable {
    fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == id)
    }

    fn ensure(&mut self, id: &NodeId) {
        if !self.contains(id) {
            self.entries.push((id.clone(), Vec::new()));
        }
    }

    fn add_dependency(&mut self, id: &NodeId, dep: &NodeId) {
        self.ensure(id);
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == id) {
            if !entry.1.contains(dep) {
                entry.1.push(dep.clone());
            }
        }
    }

    /// Remove dependencies satisfied by a finished batch.
    fn remove_satisfied(&mut self, finished: &[NodeId]) {
        for (_, deps) in &mut self.entries {
            deps.retain(|d| !finished.contains(d));
        }
    }

    /// Move dependency-free entries onto the executor stack, in order.
    fn promote_ready(&mut self, stack: &mut Vec<NodeId>) {
        let mut remaining = Vec::new();
        for (id, deps) in self.entries.drain(..) {
            if deps.is_empty() {
                stack.push(id);
            } else {
                remaining.push((id, deps));
            }
        }
        self.entries = remaining;
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remaining(&self) -> Vec<(NodeId, Vec<NodeId>)> {
        self.entries.clone()
    }
}

type ComputeOutcome = (
    NodeId,
    String,
    Box<dyn NodeBehavior>,
    std::result::Result<ExecutionResult, ComputeError>,
);

/// The cooking executor.
///
/// Holds no graph state of its own - a graph is passed into every cooking
/// call. A trace sink observes the run; a cancel flag interrupts it
/// between batches.
pub struct Executor {
    trace: Arc<dyn TraceSink>,
    cancel: CancelFlag,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_trace(Arc::new(NullTraceSink))
    }

    pub fn with_trace(trace: Arc<dyn TraceSink>) -> Self {
        Self {
            trace,
            cancel: CancelFlag::new(),
        }
    }

    /// Flag a client can hold on to for cooperative cancellation.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Cook in whichever mode matches the node's flow-control flag.
    pub async fn cook(&self, graph: &mut Graph, node: &NodeId) -> Result<()> {
        let flow = graph.require_node(node)?.is_flow_control;
        if flow {
            self.cook_flow_control_nodes(graph, node).await
        } else {
            self.cook_data_nodes(graph, node).await
        }
    }

    /// Evaluate the data-only subgraph `target` needs, then compute it.
    pub async fn cook_data_nodes(&self, graph: &mut Graph, target: &NodeId) -> Result<()> {
        self.trace.send(TraceEvent::CookStarted {
            target: target.clone(),
        });
        self.compute_node(graph, target.clone()).await?;
        self.trace.send(TraceEvent::CookFinished {
            target: target.clone(),
        });
        Ok(())
    }

    /// Drive `root` and every node reachable through control edges until
    /// both stacks and the pending table drain.
    pub async fn cook_flow_control_nodes(&self, graph: &mut Graph, root: &NodeId) -> Result<()> {
        self.trace.send(TraceEvent::CookStarted {
            target: root.clone(),
        });

        let mut pending = PendingTable::default();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut deferred: Vec<NodeId> = Vec::new();
        let mut errors: Vec<EngineError> = Vec::new();

        if graph.require_node(root)?.is_flow_control {
            self.build_flow_stack(graph, root, &mut pending);
        } else {
            log::warn!("cook_flow_control_nodes called on data node '{root}'");
        }
        pending.promote_ready(&mut stack);

        while !stack.is_empty() || !deferred.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            // Next loop iteration boundary: the body drained, reload the
            // drivers that asked to go again.
            if stack.is_empty() {
                stack.append(&mut deferred);
            }

            // Drain the stack into a batch. Dependencies are already
            // resolved by the pending table, so everything here is ready.
            let mut batch: Vec<NodeId> = Vec::new();
            for id in stack.drain(..) {
                if !batch.contains(&id) {
                    batch.push(id);
                }
            }
            if batch.is_empty() {
                continue;
            }

            // Batch preparation, pass 1: tunnel network inputs inward and
            // force-cook dirty upstream data nodes sequentially, before
            // any behavior is checked out.
            for id in &batch {
                let Some(node) = graph.node(id) else { continue };
                if node.is_data_node() && !node.is_dirty() {
                    continue;
                }
                if node.is_network() {
                    self.tunnel_inputs_inward(graph, id);
                }
                for up in self.dirty_upstream_data(graph, id) {
                    if let Err(e) = self.compute_node(graph, up).await {
                        errors.push(e);
                    }
                }
            }

            // Pass 2: resolve input values, snapshot contexts, check out
            // behaviors. Clean data nodes are skipped - they still count
            // as finished for dependency resolution.
            let mut jobs: Vec<(NodeId, String, Box<dyn NodeBehavior>, ExecutionContext)> =
                Vec::new();
            for id in &batch {
                let Some(node) = graph.node(id) else { continue };
                if node.is_data_node() && !node.is_dirty() {
                    continue;
                }
                self.resolve_input_values(graph, id);
                let ctx = self.capture_context(graph, id);
                let Some(node) = graph.node_mut(id) else { continue };
                let name = node.name.clone();
                match node.take_behavior() {
                    Some(behavior) => {
                        self.trace.send(TraceEvent::NodeStarted {
                            node_id: id.clone(),
                            name: name.clone(),
                        });
                        jobs.push((id.clone(), name, behavior, ctx));
                    }
                    None => errors.push(EngineError::Contract {
                        node_id: id.clone(),
                        name,
                        message: "behavior already checked out".to_string(),
                    }),
                }
            }

            // Pass 3: compute the whole batch concurrently. Suspensions
            // overlap; nothing touches the graph until reconciliation.
            let futures: Vec<BoxFuture<'static, ComputeOutcome>> = jobs
                .into_iter()
                .map(|(id, name, mut behavior, ctx)| {
                    let fut: BoxFuture<'static, ComputeOutcome> = Box::pin(async move {
                        let outcome = behavior.compute(&ctx).await;
                        (id, name, behavior, outcome)
                    });
                    fut
                })
                .collect();
            let outcomes = join_all(futures).await;

            // Pass 4: reconcile sequentially against graph state.
            for (id, name, behavior, outcome) in outcomes {
                if let Some(node) = graph.node_mut(&id) {
                    node.restore_behavior(behavior);
                }
                let result = match outcome {
                    Err(e) => {
                        // Record and drop this node's downstream work;
                        // sibling batch members still reconcile.
                        self.trace.send(TraceEvent::NodeFailed {
                            node_id: id.clone(),
                            name: name.clone(),
                            error: e.to_string(),
                        });
                        errors.push(EngineError::NodeFailed {
                            node_id: id,
                            name,
                            message: e.to_string(),
                        });
                        continue;
                    }
                    Ok(result) => result,
                };

                if let Err(e) = self.apply_result(graph, &id, &result) {
                    errors.push(e);
                    continue;
                }
                if graph.node(&id).map(|n| n.is_network()).unwrap_or(false) {
                    self.tunnel_outputs_outward(graph, &id);
                }
                self.push_data_downstream(graph, &id);
                self.trace.send(TraceEvent::NodeFinished {
                    node_id: id.clone(),
                    name: name.clone(),
                    command: result.command,
                });

                match result.command {
                    ExecCommand::LoopAgain => deferred.push(id.clone()),
                    ExecCommand::Wait => {
                        // Reserved: suspend the branch without propagating.
                        log::warn!("node '{name}' returned wait; branch suspended");
                        continue;
                    }
                    ExecCommand::Continue | ExecCommand::Completed => {}
                }

                // Write every control activation to its downstream ports;
                // only *active* outputs enqueue their downstream nodes.
                let mut controls: Vec<(String, bool)> = result
                    .control_outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect();
                controls.sort_by(|a, b| a.0.cmp(&b.0));

                let mut candidates: Vec<NodeId> = Vec::new();
                for (port, active) in controls {
                    let edges: Vec<_> = graph.outgoing_edges(&id, &port).to_vec();
                    for edge in &edges {
                        if edge.class != EdgeClass::Control {
                            continue;
                        }
                        if let Some(target) = graph.node_mut(&edge.to_node) {
                            if let Some(p) = target.port_mut(&edge.to_port) {
                                p.write(json!(active));
                            }
                        }
                        if active && !candidates.contains(&edge.to_node) {
                            candidates.push(edge.to_node.clone());
                        }
                    }
                }
                for candidate in candidates {
                    self.build_flow_stack(graph, &candidate, &mut pending);
                }
            }
            self.trace.send(TraceEvent::BatchCompleted { size: batch.len() });

            // Promote entries whose dependencies this batch satisfied.
            pending.remove_satisfied(&batch);
            pending.promote_ready(&mut stack);
        }

        if !pending.is_empty() {
            let stuck: Vec<String> = pending
                .remaining()
                .into_iter()
                .map(|(id, deps)| {
                    let name = graph
                        .node(&id)
                        .map(|n| n.name.clone())
                        .unwrap_or_else(|| id.clone());
                    format!("{name} waiting on {deps:?}")
                })
                .collect();
            return Err(EngineError::Schedule(format!(
                "pending table did not drain: {}",
                stuck.join(", ")
            )));
        }

        self.trace.send(TraceEvent::CookFinished {
            target: root.clone(),
        });

        if !errors.is_empty() {
            return Err(EngineError::Aggregate(errors));
        }
        Ok(())
    }

    // --- Single-node cooking (data mode and force-cook) ---

    /// Compute one node after recursively cooking its dirty upstream data
    /// nodes. Sequential; used by the data cooking mode and by batch
    /// preparation.
    fn compute_node<'a>(
        &'a self,
        graph: &'a mut Graph,
        id: NodeId,
    ) -> BoxFuture<'a, Result<ExecCommand>> {
        Box::pin(async move {
            graph.require_node(&id)?;

            if graph.node(&id).map(|n| n.is_network()).unwrap_or(false) {
                self.tunnel_inputs_inward(graph, &id);
            }

            for up in self.dirty_upstream_data(graph, &id) {
                self.compute_node(&mut *graph, up).await?;
            }

            self.resolve_input_values(graph, &id);
            let ctx = self.capture_context(graph, &id);

            let node = graph.require_node_mut(&id)?;
            let name = node.name.clone();
            let Some(mut behavior) = node.take_behavior() else {
                return Err(EngineError::Contract {
                    node_id: id.clone(),
                    name,
                    message: "behavior already checked out".to_string(),
                });
            };

            self.trace.send(TraceEvent::NodeStarted {
                node_id: id.clone(),
                name: name.clone(),
            });
            let outcome = behavior.compute(&ctx).await;
            if let Some(node) = graph.node_mut(&id) {
                node.restore_behavior(behavior);
            }

            let result = match outcome {
                Err(e) => {
                    self.trace.send(TraceEvent::NodeFailed {
                        node_id: id.clone(),
                        name: name.clone(),
                        error: e.to_string(),
                    });
                    return Err(EngineError::NodeFailed {
                        node_id: id,
                        name,
                        message: e.to_string(),
                    });
                }
                Ok(result) => result,
            };

            self.apply_result(graph, &id, &result)?;
            if graph.node(&id).map(|n| n.is_network()).unwrap_or(false) {
                self.tunnel_outputs_outward(graph, &id);
            }
            self.push_data_downstream(graph, &id);
            self.trace.send(TraceEvent::NodeFinished {
                node_id: id.clone(),
                name,
                command: result.command,
            });
            Ok(result.command)
        })
    }

    // --- Stack building ---

    fn build_flow_stack(&self, graph: &Graph, id: &NodeId, pending: &mut PendingTable) {
        let mut visited = HashSet::new();
        self.build_flow_rec(graph, id, pending, &mut visited);
    }

    fn build_flow_rec(
        &self,
        graph: &Graph,
        id: &NodeId,
        pending: &mut PendingTable,
        visited: &mut HashSet<NodeId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        pending.ensure(id);
        let Some(node) = graph.node(id) else { return };
        let is_network = node.is_network();
        let input_ports: Vec<String> = node.inputs.iter().map(|p| p.name.clone()).collect();

        for port in &input_ports {
            // A network's input ports are sources for internal nodes:
            // dirty internal neighbours run after the network itself.
            if is_network {
                for down in self.downstream_node_ids(graph, id, port) {
                    let dirty = graph.node(&down).map(|n| n.is_dirty()).unwrap_or(false);
                    if dirty && !pending.contains(&down) {
                        pending.add_dependency(&down, id);
                    }
                }
            }

            for up in self.upstream_node_ids(graph, id, port) {
                let Some(up_node) = graph.node(&up) else { continue };
                if !up_node.is_dirty() {
                    continue;
                }
                if up_node.is_network() {
                    pending.add_dependency(id, &up);
                    self.build_flow_rec(graph, &up, pending, visited);
                } else if up_node.is_data_node() {
                    pending.add_dependency(id, &up);
                    self.build_data_rec(graph, &up, pending, visited);
                }
            }
        }
    }

    fn build_data_rec(
        &self,
        graph: &Graph,
        id: &NodeId,
        pending: &mut PendingTable,
        visited: &mut HashSet<NodeId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        pending.ensure(id);
        let Some(node) = graph.node(id) else { return };
        let data_ports: Vec<String> = node.input_data_ports().map(|p| p.name.clone()).collect();

        for port in &data_ports {
            for up in self.upstream_node_ids(graph, id, port) {
                let Some(up_node) = graph.node(&up) else { continue };
                if up_node.is_dirty() && up_node.is_data_node() {
                    pending.add_dependency(id, &up);
                    self.build_data_rec(graph, &up, pending, visited);
                }
            }
        }
    }

    // --- Context and value plumbing ---

    fn capture_context(&self, graph: &Graph, id: &NodeId) -> ExecutionContext {
        let Some(node) = graph.node(id) else {
            return ExecutionContext::default();
        };
        let mut data_inputs = HashMap::new();
        let mut control_inputs = HashMap::new();
        for port in node.input_data_ports() {
            data_inputs.insert(port.name.clone(), port.value().clone());
        }
        for port in node.input_control_ports() {
            control_inputs.insert(port.name.clone(), port.is_active());
        }
        ExecutionContext {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            network_id: node.network_id.clone(),
            node_path: graph.path_of(id).unwrap_or_default(),
            data_inputs,
            control_inputs,
        }
    }

    /// Resolve data-input port values before a context snapshot.
    ///
    /// A port with several incoming data edges takes the last edge's
    /// source value, and that value is copied onto every other source - a
    /// deliberate, documented simplification. A dirty single-source port
    /// pulls through tunnel chains.
    fn resolve_input_values(&self, graph: &mut Graph, id: &NodeId) {
        let Some(node) = graph.node(id) else { return };
        let data_ports: Vec<String> = node.input_data_ports().map(|p| p.name.clone()).collect();

        for port_name in data_ports {
            let data_edges = graph
                .incoming_edges(id, &port_name)
                .iter()
                .filter(|e| e.class == EdgeClass::Data)
                .count();
            if data_edges == 0 {
                continue;
            }
            let dirty = graph
                .node(id)
                .and_then(|n| n.input(&port_name))
                .map(|p| p.is_dirty())
                .unwrap_or(false);
            if data_edges < 2 && !dirty {
                continue;
            }

            let mut sources: Vec<(NodeId, String)> = Vec::new();
            let mut visited = HashSet::new();
            self.collect_upstream_sources(graph, id, &port_name, &mut sources, &mut visited);
            let Some((last_node, last_port)) = sources.last().cloned() else {
                continue;
            };
            let Some(value) = graph
                .node(&last_node)
                .and_then(|n| n.output(&last_port).or_else(|| n.input(&last_port)))
                .map(|p| p.value().clone())
            else {
                continue;
            };

            // The winning value overwrites the sibling sources.
            for (src, src_port) in sources.iter().take(sources.len().saturating_sub(1)) {
                if let Some(n) = graph.node_mut(src) {
                    if let Some(p) = n.port_mut(src_port) {
                        p.write(value.clone());
                    }
                }
            }
            if let Some(n) = graph.node_mut(id) {
                if let Some(p) = n.input_mut(&port_name) {
                    p.write(value);
                }
            }
        }
    }

    /// Upstream source ports of an input, tunnelling through InputOutput
    /// ports transitively. Edge insertion order is preserved.
    fn collect_upstream_sources(
        &self,
        graph: &Graph,
        node: &NodeId,
        port: &str,
        out: &mut Vec<(NodeId, String)>,
        visited: &mut HashSet<(NodeId, String)>,
    ) {
        if !visited.insert((node.clone(), port.to_string())) {
            return;
        }
        for edge in graph.incoming_edges(node, port) {
            let Some(src_node) = graph.node(&edge.from_node) else {
                continue;
            };
            let Some(src_port) = src_node
                .output(&edge.from_port)
                .or_else(|| src_node.input(&edge.from_port))
            else {
                continue;
            };
            out.push((edge.from_node.clone(), edge.from_port.clone()));
            if src_port.is_tunnel() {
                self.collect_upstream_sources(graph, &edge.from_node, &edge.from_port, out, visited);
            }
        }
    }

    /// Apply a compute result to the node's ports and mark it clean.
    ///
    /// A value map naming a port the node does not have is a contract
    /// violation (tunnel writes may land on either side of the port set).
    fn apply_result(
        &self,
        graph: &mut Graph,
        id: &NodeId,
        result: &ExecutionResult,
    ) -> Result<()> {
        let node = graph.require_node_mut(id)?;
        let name = node.name.clone();

        for (port, value) in &result.data_outputs {
            let has_output = node.output(port).is_some();
            let target = if has_output {
                node.output_mut(port)
            } else {
                node.input_mut(port)
            };
            match target {
                Some(p) => p.write(value.clone()),
                None => {
                    return Err(EngineError::Contract {
                        node_id: id.clone(),
                        name,
                        message: format!("result names unknown data output '{port}'"),
                    })
                }
            }
        }
        for (port, active) in &result.control_outputs {
            let has_output = node.output(port).is_some();
            let target = if has_output {
                node.output_mut(port)
            } else {
                node.input_mut(port)
            };
            match target {
                Some(p) => p.write(json!(active)),
                None => {
                    return Err(EngineError::Contract {
                        node_id: id.clone(),
                        name,
                        message: format!("result names unknown control output '{port}'"),
                    })
                }
            }
        }
        node.mark_clean();
        Ok(())
    }

    /// Push a network's data input values inward onto internal ports.
    fn tunnel_inputs_inward(&self, graph: &mut Graph, network: &NodeId) {
        let Some(node) = graph.node(network) else { return };
        let mut pushes: Vec<(NodeId, String, serde_json::Value)> = Vec::new();
        for port in node.input_data_ports() {
            if port.value().is_null() {
                continue;
            }
            for edge in graph.outgoing_edges(network, &port.name) {
                pushes.push((edge.to_node.clone(), edge.to_port.clone(), port.value().clone()));
            }
        }
        for (target, port, value) in pushes {
            if let Some(n) = graph.node_mut(&target) {
                if let Some(p) = n.port_mut(&port) {
                    p.write(value);
                }
            }
        }
    }

    /// Pull a network's output values outward from internal ports.
    fn tunnel_outputs_outward(&self, graph: &mut Graph, network: &NodeId) {
        let Some(node) = graph.node(network) else { return };
        let output_names: Vec<String> = node.outputs.iter().map(|p| p.name.clone()).collect();

        let mut pulls: Vec<(String, serde_json::Value)> = Vec::new();
        for name in &output_names {
            for edge in graph.incoming_edges(network, name) {
                let value = graph.node(&edge.from_node).and_then(|src| {
                    src.output(&edge.from_port)
                        .or_else(|| src.input(&edge.from_port))
                        .map(|p| p.value().clone())
                });
                if let Some(value) = value {
                    if !value.is_null() {
                        pulls.push((name.clone(), value));
                    }
                }
            }
        }
        if let Some(node) = graph.node_mut(network) {
            for (name, value) in pulls {
                if let Some(p) = node.output_mut(&name) {
                    p.write(value);
                }
            }
        }
    }

    /// Copy a node's non-null data output values along outgoing edges.
    fn push_data_downstream(&self, graph: &mut Graph, id: &NodeId) {
        let Some(node) = graph.node(id) else { return };
        let mut pushes: Vec<(NodeId, String, serde_json::Value)> = Vec::new();
        for port in node.output_data_ports() {
            if port.value().is_null() {
                continue;
            }
            for edge in graph.outgoing_edges(id, &port.name) {
                pushes.push((edge.to_node.clone(), edge.to_port.clone(), port.value().clone()));
            }
        }
        for (target, port, value) in pushes {
            if let Some(n) = graph.node_mut(&target) {
                if let Some(p) = n.port_mut(&port) {
                    p.write(value);
                }
            }
        }
    }

    // --- Adjacency helpers ---

    fn upstream_node_ids(&self, graph: &Graph, node: &NodeId, port: &str) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for edge in graph.incoming_edges(node, port) {
            if !ids.contains(&edge.from_node) {
                ids.push(edge.from_node.clone());
            }
        }
        ids
    }

    fn downstream_node_ids(&self, graph: &Graph, node: &NodeId, port: &str) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for edge in graph.outgoing_edges(node, port) {
            if !ids.contains(&edge.to_node) {
                ids.push(edge.to_node.clone());
            }
        }
        ids
    }

    /// Dirty data-node predecessors of a node's data inputs.
    fn dirty_upstream_data(&self, graph: &Graph, id: &NodeId) -> Vec<NodeId> {
        let Some(node) = graph.node(id) else {
            return Vec::new();
        };
        let data_ports: Vec<String> = node.input_data_ports().map(|p| p.name.clone()).collect();
        let mut ids = Vec::new();
        for port in &data_ports {
            for up in self.upstream_node_ids(graph, id, port) {
                let Some(up_node) = graph.node(&up) else { continue };
                if up_node.is_data_node() && up_node.is_dirty() && !ids.contains(&up) {
                    ids.push(up);
                }
            }
        }
        ids
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::VecTraceSink;
    use async_trait::async_trait;
    use loomflow_graph::{NodeRegistry, NodeSpec, Port, ValueType};

    // Test behaviors in the shape of the built-in node kinds, kept local
    // so the engine crate tests without the node library.

    struct ValueSource;

    #[async_trait]
    impl NodeBehavior for ValueSource {
        async fn compute(
            &mut self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<ExecutionResult, ComputeError> {
            Ok(ExecutionResult::new(ExecCommand::Continue))
        }
    }

    struct AddPair;

    #[async_trait]
    impl NodeBehavior for AddPair {
        async fn compute(
            &mut self,
            ctx: &ExecutionContext,
        ) -> std::result::Result<ExecutionResult, ComputeError> {
            let sum = ctx.int_input("a", 0) + ctx.int_input("b", 0);
            Ok(ExecutionResult::new(ExecCommand::Continue).with_data("sum", json!(sum)))
        }
    }

    struct FlowStep;

    #[async_trait]
    impl NodeBehavior for FlowStep {
        async fn compute(
            &mut self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<ExecutionResult, ComputeError> {
            Ok(ExecutionResult::new(ExecCommand::Continue).with_control("next", true))
        }
    }

    struct CountedLoop {
        index: i64,
        active: bool,
    }

    #[async_trait]
    impl NodeBehavior for CountedLoop {
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
                self.active = false;
                Ok(ExecutionResult::new(ExecCommand::Completed)
                    .with_control("completed", true)
                    .with_control("loop_body", false))
            }
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl NodeBehavior for AlwaysFails {
        async fn compute(
            &mut self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<ExecutionResult, ComputeError> {
            Err(ComputeError::new("boom"))
        }
    }

    struct Waits;

    #[async_trait]
    impl NodeBehavior for Waits {
        async fn compute(
            &mut self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<ExecutionResult, ComputeError> {
            Ok(ExecutionResult::new(ExecCommand::Wait).with_control("next", true))
        }
    }

    fn test_registry() -> std::sync::Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register("value", |options| {
                let value = options.get("value").cloned().unwrap_or(json!(0));
                Ok(NodeSpec::data(Box::new(ValueSource))
                    .with_output(Port::output_data("out", ValueType::Int).with_value(value)))
            })
            .unwrap();
        registry
            .register("add-pair", |_| {
                Ok(NodeSpec::data(Box::new(AddPair))
                    .with_input(Port::input_data("a", ValueType::Int))
                    .with_input(Port::input_data("b", ValueType::Int))
                    .with_output(Port::output_data("sum", ValueType::Int)))
            })
            .unwrap();
        registry
            .register("flow-step", |_| {
                Ok(NodeSpec::flow(Box::new(FlowStep))
                    .with_input(Port::input_control("exec"))
                    .with_input(Port::input_data("value", ValueType::Any))
                    .with_output(Port::output_control("next")))
            })
            .unwrap();
        registry
            .register("counted-loop", |options| {
                let start = options.get("start").cloned().unwrap_or(json!(0));
                let end = options.get("end").cloned().unwrap_or(json!(0));
                Ok(NodeSpec::flow(Box::new(CountedLoop {
                    index: 0,
                    active: false,
                }))
                .with_input(Port::input_control("exec"))
                .with_input(Port::input_data("start", ValueType::Int).with_value(start))
                .with_input(Port::input_data("end", ValueType::Int).with_value(end))
                .with_output(Port::output_control("loop_body"))
                .with_output(Port::output_control("completed"))
                .with_output(Port::output_data("index", ValueType::Int)))
            })
            .unwrap();
        registry
            .register("always-fails", |_| {
                Ok(NodeSpec::flow(Box::new(AlwaysFails))
                    .with_input(Port::input_control("exec"))
                    .with_output(Port::output_control("next")))
            })
            .unwrap();
        registry
            .register("waits", |_| {
                Ok(NodeSpec::flow(Box::new(Waits))
                    .with_input(Port::input_control("exec"))
                    .with_output(Port::output_control("next")))
            })
            .unwrap();
        registry.into_shared()
    }

    fn root() -> (Graph, NodeId) {
        Graph::create_root("root", "system-network", test_registry()).unwrap()
    }

    #[tokio::test]
    async fn test_data_cooking_pulls_dependencies() {
        let (mut graph, net) = root();
        graph
            .create_node(&net, "c8", "value", json!({"value": 8}))
            .unwrap();
        graph
            .create_node(&net, "c4", "value", json!({"value": 4}))
            .unwrap();
        let add = graph
            .create_node(&net, "adder", "add-pair", json!({}))
            .unwrap();
        graph.connect_nodes(&net, "c8", "out", "adder", "a").unwrap();
        graph.connect_nodes(&net, "c4", "out", "adder", "b").unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        executor.cook(&mut graph, &add).await.unwrap();

        let sum = graph.node(&add).unwrap().output("sum").unwrap().value().clone();
        assert_eq!(sum, json!(12));

        // Every data predecessor computed before the target.
        let order = sink.finished_names();
        let adder_pos = order.iter().position(|n| n == "adder").unwrap();
        assert!(order.iter().position(|n| n == "c8").unwrap() < adder_pos);
        assert!(order.iter().position(|n| n == "c4").unwrap() < adder_pos);
    }

    #[tokio::test]
    async fn test_flow_chain_runs_in_order() {
        let (mut graph, net) = root();
        let a = graph.create_node(&net, "a", "flow-step", json!({})).unwrap();
        graph.create_node(&net, "b", "flow-step", json!({})).unwrap();
        graph.create_node(&net, "c", "flow-step", json!({})).unwrap();
        graph.connect_nodes(&net, "a", "next", "b", "exec").unwrap();
        graph.connect_nodes(&net, "b", "next", "c", "exec").unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        executor.cook(&mut graph, &a).await.unwrap();

        assert_eq!(sink.finished_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_flow_waits_for_data_predecessors() {
        let (mut graph, net) = root();
        graph
            .create_node(&net, "c1", "value", json!({"value": 3}))
            .unwrap();
        graph
            .create_node(&net, "c2", "value", json!({"value": 4}))
            .unwrap();
        graph.create_node(&net, "adder", "add-pair", json!({})).unwrap();
        let sink_node = graph
            .create_node(&net, "printer", "flow-step", json!({}))
            .unwrap();
        graph.connect_nodes(&net, "c1", "out", "adder", "a").unwrap();
        graph.connect_nodes(&net, "c2", "out", "adder", "b").unwrap();
        graph
            .connect_nodes(&net, "adder", "sum", "printer", "value")
            .unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        executor.cook(&mut graph, &sink_node).await.unwrap();

        let order = sink.finished_names();
        let printer_pos = order.iter().position(|n| n == "printer").unwrap();
        assert!(order.iter().position(|n| n == "adder").unwrap() < printer_pos);
        assert_eq!(
            *graph.node(&sink_node).unwrap().input("value").unwrap().value(),
            json!(7)
        );
    }

    #[tokio::test]
    async fn test_loop_drives_body_in_order() {
        let (mut graph, net) = root();
        let driver = graph
            .create_node(&net, "loop", "counted-loop", json!({"start": 0, "end": 3}))
            .unwrap();
        graph.create_node(&net, "body", "flow-step", json!({})).unwrap();
        graph
            .connect_nodes(&net, "loop", "loop_body", "body", "exec")
            .unwrap();
        graph
            .connect_nodes(&net, "loop", "index", "body", "value")
            .unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        executor.cook(&mut graph, &driver).await.unwrap();

        let order = sink.finished_names();
        let body_turns = order.iter().filter(|n| *n == "body").count();
        assert_eq!(body_turns, 3);
        // Strict alternation: each body turn follows a driver turn.
        assert_eq!(
            order,
            vec!["loop", "body", "loop", "body", "loop", "body", "loop"]
        );
    }

    #[tokio::test]
    async fn test_zero_iteration_loop_fires_completed_only() {
        let (mut graph, net) = root();
        let driver = graph
            .create_node(&net, "loop", "counted-loop", json!({"start": 2, "end": 2}))
            .unwrap();
        graph.create_node(&net, "body", "flow-step", json!({})).unwrap();
        graph.create_node(&net, "done", "flow-step", json!({})).unwrap();
        graph
            .connect_nodes(&net, "loop", "loop_body", "body", "exec")
            .unwrap();
        graph
            .connect_nodes(&net, "loop", "completed", "done", "exec")
            .unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        executor.cook(&mut graph, &driver).await.unwrap();

        let order = sink.finished_names();
        assert!(!order.contains(&"body".to_string()));
        assert_eq!(order, vec!["loop", "done"]);
    }

    #[tokio::test]
    async fn test_failure_aggregates_and_drops_downstream() {
        let (mut graph, net) = root();
        let start = graph
            .create_node(&net, "start", "flow-step", json!({}))
            .unwrap();
        graph
            .create_node(&net, "broken", "always-fails", json!({}))
            .unwrap();
        graph.create_node(&net, "after", "flow-step", json!({})).unwrap();
        graph
            .connect_nodes(&net, "start", "next", "broken", "exec")
            .unwrap();
        graph
            .connect_nodes(&net, "broken", "next", "after", "exec")
            .unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        let err = executor.cook(&mut graph, &start).await.unwrap_err();

        assert!(matches!(err, EngineError::Aggregate(_)));
        let order = sink.finished_names();
        assert!(order.contains(&"start".to_string()));
        assert!(!order.contains(&"after".to_string()));
    }

    #[tokio::test]
    async fn test_wait_suspends_branch() {
        let (mut graph, net) = root();
        let start = graph.create_node(&net, "start", "waits", json!({})).unwrap();
        graph.create_node(&net, "after", "flow-step", json!({})).unwrap();
        graph
            .connect_nodes(&net, "start", "next", "after", "exec")
            .unwrap();

        let sink = Arc::new(VecTraceSink::new());
        let executor = Executor::with_trace(sink.clone());
        executor.cook(&mut graph, &start).await.unwrap();

        assert!(!sink.finished_names().contains(&"after".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_between_batches() {
        let (mut graph, net) = root();
        let a = graph.create_node(&net, "a", "flow-step", json!({})).unwrap();

        let executor = Executor::new();
        executor.cancel_flag().cancel();
        let err = executor.cook(&mut graph, &a).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_tunnel_values_cross_network_boundary() {
        let (mut graph, net) = root();
        let sub = graph.create_network(&net, "subnet", "flow-network").unwrap();
        graph
            .add_network_data_input(&sub, "value_in", ValueType::Any)
            .unwrap();
        graph
            .add_network_data_output(&sub, "value_out", ValueType::Any)
            .unwrap();
        graph
            .create_node(&net, "feeder", "value", json!({"value": 42}))
            .unwrap();
        let inner = graph
            .create_node(&sub, "inner", "add-pair", json!({}))
            .unwrap();

        graph
            .connect_nodes(&net, "feeder", "out", "subnet", "value_in")
            .unwrap();
        graph
            .connect_nodes(&sub, "subnet", "value_in", "inner", "a")
            .unwrap();
        graph
            .connect_nodes(&sub, "inner", "sum", "subnet", "value_out")
            .unwrap();

        let executor = Executor::new();
        executor.cook(&mut graph, &sub).await.unwrap();

        // Internal node saw the tunnelled input.
        assert_eq!(
            *graph.node(&inner).unwrap().input("a").unwrap().value(),
            json!(42)
        );
        // And the network's output tunnel reflects the internal result.
        assert_eq!(
            *graph.node(&sub).unwrap().output("value_out").unwrap().value(),
            json!(42)
        );
    }

    #[tokio::test]
    async fn test_multi_fan_in_last_edge_wins() {
        let (mut graph, net) = root();
        let a = graph
            .create_node(&net, "a", "value", json!({"value": 1}))
            .unwrap();
        let b = graph
            .create_node(&net, "b", "value", json!({"value": 2}))
            .unwrap();
        let sink_node = graph
            .create_node(&net, "sink", "flow-step", json!({}))
            .unwrap();
        // Two sources on one input: legal at the graph level.
        graph.add_edge(&a, "out", &sink_node, "value").unwrap();
        graph.add_edge(&b, "out", &sink_node, "value").unwrap();

        let executor = Executor::new();
        executor.cook(&mut graph, &sink_node).await.unwrap();

        // Last edge's source wins, and its value is copied onto the
        // sibling source.
        assert_eq!(
            *graph.node(&sink_node).unwrap().input("value").unwrap().value(),
            json!(2)
        );
        assert_eq!(*graph.node(&a).unwrap().output("out").unwrap().value(), json!(2));
    }
}
