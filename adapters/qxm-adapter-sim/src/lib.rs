//! qxm Local Statevector Backend
//!
//! An [`ExecutionBackend`](qxm_runtime::ExecutionBackend) that simulates
//! qubits with a dense statevector. Kernels running on a thread whose
//! manager was built from this backend get exact gate application, real
//! collapsing measurements and trajectory-sampled noise.
//!
//! # Features
//!
//! - **Dynamic Register**: qubits join the state on allocation and are
//!   traced out on return
//! - **All Built-in Gates**: plus registered custom unitaries, controlled
//!   and adjoint
//! - **Noise**: Kraus channels, explicit or from the context's noise model
//! - **Spin Operators**: exact expectation values plus per-term samples
//!
//! # Performance
//!
//! | Live qubits | Memory |
//! |-------------|--------|
//! | 10 | ~16 KB |
//! | 20 | ~16 MB |
//! | 24 (default cap) | ~256 MB |
//!
//! # Example
//!
//! ```ignore
//! use qxm_runtime::qis;
//!
//! qxm_adapter_sim::register();
//!
//! let q = qis::qalloc_n(2)?;
//! qis::h(q[0])?;
//! qis::cx(q[0], q[1])?;
//! let bits = qis::mz_all(&q)?;
//! assert_eq!(bits[0].to_int(), bits[1].to_int());
//! qis::qfree_all(&q)?;
//! ```

mod error;
mod simulator;
mod statevector;

pub use error::SimError;
pub use simulator::{DEFAULT_MAX_QUBITS, StatevectorBackend};
pub use statevector::Statevector;

/// Name this backend registers under.
pub const BACKEND_NAME: &str = "statevector";

/// Register [`StatevectorBackend`] as the default execution manager under
/// [`BACKEND_NAME`].
pub fn register() {
    qxm_runtime::register_execution_manager::<StatevectorBackend>(BACKEND_NAME);
}
