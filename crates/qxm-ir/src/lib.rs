//! qxm shared value types
//!
//! This crate holds the plain data exchanged between kernel code, the
//! execution manager (`qxm-runtime`) and execution backends. It has no
//! behaviour of its own beyond construction and validation.
//!
//! # Core Components
//!
//! - **Qudits**: [`QuditInfo`] pairs a dimensionality with a pool-assigned id
//! - **Gates**: [`BuiltinGate`] names the instructions every backend understands
//! - **Spin operators**: [`PauliWord`], [`PauliString`] and [`SpinOp`] for
//!   Pauli rotations and expectation-value measurement
//! - **Noise**: [`KrausChannel`] and the per-gate [`NoiseModel`]
//! - **Results**: [`Counts`], [`SampleResult`] and [`SpinMeasureResult`]
//!
//! # Example
//!
//! ```rust
//! use qxm_ir::{BuiltinGate, QuditInfo, SpinOp};
//!
//! let q = QuditInfo::qubit(0);
//! assert_eq!(q.levels, 2);
//!
//! let gate = BuiltinGate::from_name("rx").unwrap();
//! assert_eq!(gate.num_params(), 1);
//!
//! // H = 0.5·Z₀Z₁ - 1.0·X₀
//! let h = SpinOp::parse_terms(&[(0.5, "ZZ"), (-1.0, "XI")]).unwrap();
//! assert_eq!(h.n_terms(), 2);
//! ```

pub mod error;
pub mod gate;
pub mod noise;
pub mod qudit;
pub mod result;
pub mod spin;

pub use error::{IrError, IrResult};
pub use gate::BuiltinGate;
pub use noise::{KrausChannel, NoiseModel};
pub use qudit::QuditInfo;
pub use result::{Counts, GLOBAL_REGISTER, SampleResult, SpinMeasureResult};
pub use spin::{PauliOp, PauliString, PauliWord, SpinOp, SpinTerm};
