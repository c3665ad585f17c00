//! loomflow-nodes - built-in node kinds
//!
//! The demo/utility node set every loomflow deployment starts from:
//!
//! - `constant`, `add`, `multiply`, `vector`, `dot-product` - data nodes
//! - `print`, `accumulator`, `step-printer` - flow sinks
//! - `branch`, `for-loop`, `for-each` - flow-control drivers
//!
//! Call [`install`] once at startup to register everything, then freeze
//! the registry:
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! loomflow_nodes::install(&mut registry)?;
//! let registry = registry.into_shared();
//! ```
//!
//! Domain-specific node runtimes (LLM calls, vision, messaging) are host
//! concerns and live outside this crate; the compiler knows their port
//! schemas independently.

pub mod flow;
pub mod math;
pub mod util;

use loomflow_graph::{NodeRegistry, Result};

/// Register every built-in node kind.
pub fn install(registry: &mut NodeRegistry) -> Result<()> {
    util::register(registry)?;
    math::register(registry)?;
    flow::register(registry)?;
    Ok(())
}

/// Convenience: a frozen registry holding exactly the built-in kinds.
pub fn builtin_registry() -> Result<std::sync::Arc<NodeRegistry>> {
    let mut registry = NodeRegistry::new();
    install(&mut registry)?;
    Ok(registry.into_shared())
}
