//! loomflow-engine - the cooking executor
//!
//! Evaluating a graph ("cooking") comes in two modes sharing one batched
//! scheduler:
//!
//! - [`Executor::cook_data_nodes`] pulls the data-only subgraph a target
//!   node needs, then computes it - use when the caller wants a value.
//! - [`Executor::cook_flow_control_nodes`] drives a flow root and
//!   everything reachable through control edges until no work remains,
//!   handling iterative loops, branches, and nested networks.
//!
//! The scheduler is single-threaded cooperative: all ready nodes of a
//! batch compute together (their suspensions overlap), and graph state is
//! reconciled strictly between batches. A [`TraceSink`] injected at
//! construction observes the run; a [`CancelFlag`] interrupts it at batch
//! boundaries.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod trace;

pub use cancel::CancelFlag;
pub use error::{EngineError, Result};
pub use executor::Executor;
pub use trace::{NullTraceSink, TraceEvent, TraceSink, VecTraceSink};
