//! qxm execution manager
//!
//! The runtime layer between quantum kernel code and pluggable execution
//! backends. It owns the protocol kernels rely on, never the simulation:
//!
//! - **Identity**: [`QuditIdPool`] hands out and recycles qudit ids and
//!   detects leaks
//! - **Regions**: [`RegionStack`] composes nested adjoint and control scopes
//! - **Dispatch**: [`ExecutionManager`] resolves each instruction and
//!   forwards it to an [`ExecutionBackend`]
//! - **Custom operations**: a process-wide [`CustomOperationRegistry`]
//! - **Contexts**: an externally owned [`ExecutionContext`] per run
//! - **Resolution**: one manager per thread, an optional process-wide
//!   override, and named factories ([`resolution`])
//! - **Deferred results**: [`MeasureResult`] and the bool-conversion hook
//!
//! # Example
//!
//! ```rust,ignore
//! use qxm_runtime::{ExecutionContext, qis, resolution};
//!
//! qxm_adapter_sim::register();
//! let ctx = ExecutionContext::new("sample").with_shots(100).shared();
//! resolution::with_execution_manager(|em| em.set_execution_context(ctx.clone()))?;
//!
//! let q = qis::qalloc_n(2)?;
//! qis::h(q[0])?;
//! qis::cx(q[0], q[1])?;
//! let bits = qis::mz_all(&q)?;
//! assert_eq!(bits[0].to_int(), bits[1].to_int());
//! qis::qfree_all(&q)?;
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod measure;
pub mod pool;
pub mod qis;
pub mod region;
pub mod registry;
pub mod resolution;
pub mod tracing_config;

pub use backend::{
    BackendConfig, BackendFactory, ExecutionBackend, InitialState, Instruction, Operation,
    Precision, SimulationState, StateBuffer,
};
pub use config::{ConfigError, LeakPolicy, LoggingConfig, RuntimeConfig};
pub use context::{ContextHandle, ExecutionContext, lock_context};
pub use error::{ManagerError, ManagerResult};
pub use manager::ExecutionManager;
pub use measure::{
    MeasureResult, Measurement, reset_bool_conversion_hook, set_bool_conversion_hook,
};
pub use pool::QuditIdPool;
pub use region::RegionStack;
pub use registry::{
    CustomOperation, CustomOperationRegistry, FnOperation, MatrixOperation,
    clear_registered_operations, lookup_operation, register_operation,
};
pub use resolution::{
    SharedExecutionManager, register_execution_manager, set_execution_manager_override,
    with_execution_manager,
};
pub use tracing_config::init_tracing;

/// Re-export of the shared value types.
pub use qxm_ir as ir;

