//! loomflow-compiler - lowers a graph to standalone source code
//!
//! Three phases form a pipeline, shared by both input forms:
//!
//! ```text
//!     Graph      --[extract]--->  IrGraph
//!     graph.json --[json_to_ir]-> IrGraph
//!     IrGraph    --[schedule]-->  IrSchedule
//!     IrSchedule --[emit]------>  Python source (String)
//! ```
//!
//! The IR is a decoupled structural snapshot - no live node references,
//! safe to serialise, and shared by every phase. Emission goes through a
//! per-profile template registry: the *framework* profile targets
//! langchain, the *zero* profile targets the raw openai SDK only.
//!
//! The compiler never executes nodes; it is a pure, synchronous function
//! of its input.

pub mod emit;
pub mod error;
pub mod extract;
pub mod ir;
pub mod json;
pub mod schedule;
pub mod templates;
pub mod writer;

use loomflow_graph::Graph;

pub use emit::EmitProfile;
pub use error::{CompileError, Result};
pub use ir::{Direction, ExecClass, IrEdge, IrGraph, IrNode, IrPort, PortClass};
pub use schedule::{Block, IrSchedule, LoopBlock, ScheduledNode, Scheduler, SequenceBlock};
pub use writer::{py_repr, CodeWriter};

/// Compile a live graph into standalone source.
pub fn compile_graph(graph: &Graph, graph_name: &str, profile: EmitProfile) -> String {
    let ir = extract::extract(graph, graph_name);
    let schedule = Scheduler::new(&ir).build(&ir.name);
    emit::emit(&schedule, profile)
}

/// Compile a serialised graph document into standalone source.
///
/// `strict` turns unknown node types into errors instead of warnings.
pub fn compile_json(
    data: &serde_json::Value,
    profile: EmitProfile,
    strict: bool,
) -> Result<String> {
    json::validate(data, strict)?;
    let ir = json::json_to_ir(data)?;
    let schedule = Scheduler::new(&ir).build(&ir.name);
    Ok(emit::emit(&schedule, profile))
}
