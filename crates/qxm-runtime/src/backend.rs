//! Backend contract and configuration.
//!
//! The [`ExecutionBackend`] trait is the surface every simulator or hardware
//! driver implements. The execution manager resolves regions, names and
//! arities before anything reaches a backend:
//!
//! ```text
//!   kernel ──→ ExecutionManager ──→ Instruction ──→ ExecutionBackend
//!              (pool, regions,      (final adjoint,
//!               registry lookup)     flat controls)
//! ```
//!
//! | Method | Required | Notes |
//! |--------|----------|-------|
//! | `name()` | yes | |
//! | `allocate_qudit()` / `deallocate_qudit()` | yes | identity owned by the manager |
//! | `bind_context()` / `unbind_context()` | provided | default accepts any context |
//! | `initialize_state()` | yes | buffer + precision, or simulation handle |
//! | `apply()` | yes | fully resolved instruction |
//! | `apply_noise()` | yes | never affected by regions |
//! | `reset()` / `measure()` / `measure_spin_op()` | yes | |
//! | `synchronize()` | yes | blocking barrier |
//! | `flush_gate_queue()` | provided | no-op hint |

use std::fmt;

use num_complex::{Complex32, Complex64};
use qxm_ir::{BuiltinGate, KrausChannel, PauliWord, QuditInfo, SpinMeasureResult, SpinOp};
use serde::{Deserialize, Serialize};

use crate::context::ContextHandle;
use crate::error::ManagerResult;

/// What an instruction does.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A gate every backend understands.
    Builtin(BuiltinGate),
    /// A registered custom operation, materialized for the instruction's
    /// parameters as a row-major unitary.
    Custom {
        /// Registered name.
        name: String,
        /// Row-major `d × d` matrix, `d` the product of the targets' levels.
        /// Target `k` is digit `k` of the row and column index, least
        /// significant first, the same ordering as a [`StateBuffer`].
        matrix: Vec<Complex64>,
    },
}

impl Operation {
    /// Instruction name as issued by the kernel.
    pub fn name(&self) -> &str {
        match self {
            Operation::Builtin(gate) => gate.name(),
            Operation::Custom { name, .. } => name,
        }
    }
}

/// A fully resolved instruction, ready for a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation.
    pub operation: Operation,
    /// Gate parameters.
    pub params: Vec<f64>,
    /// Explicit controls followed by region controls.
    pub controls: Vec<QuditInfo>,
    /// Target qudits.
    pub targets: Vec<QuditInfo>,
    /// Whether to apply the conjugate transpose.
    pub adjoint: bool,
    /// Pauli word payload for `exp_pauli`; identity otherwise.
    pub operator: PauliWord,
}

impl Instruction {
    /// The instruction name.
    pub fn name(&self) -> &str {
        self.operation.name()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if self.adjoint {
            write!(f, "†")?;
        }
        if !self.params.is_empty() {
            let params: Vec<_> = self.params.iter().map(|p| format!("{p:.4}")).collect();
            write!(f, "({})", params.join(", "))?;
        }
        if !self.operator.is_empty() {
            write!(f, "[{}]", self.operator)?;
        }
        if !self.controls.is_empty() {
            let controls: Vec<_> = self.controls.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", controls.join(", "))?;
        }
        let targets: Vec<_> = self.targets.iter().map(ToString::to_string).collect();
        write!(f, " {}", targets.join(", "))
    }
}

/// Floating-point width of a raw state buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Single precision.
    Fp32,
    /// Double precision.
    Fp64,
}

/// Raw amplitudes tagged with their precision. Amplitude `i` belongs to the
/// basis state whose digit `k`, least significant first, is the level of
/// target `k`.
#[derive(Debug, Clone, Copy)]
pub enum StateBuffer<'a> {
    /// Single-precision amplitudes.
    F32(&'a [Complex32]),
    /// Double-precision amplitudes.
    F64(&'a [Complex64]),
}

impl StateBuffer<'_> {
    /// Precision tag of the buffer.
    pub fn precision(&self) -> Precision {
        match self {
            StateBuffer::F32(_) => Precision::Fp32,
            StateBuffer::F64(_) => Precision::Fp64,
        }
    }

    /// Number of amplitudes.
    pub fn len(&self) -> usize {
        match self {
            StateBuffer::F32(a) => a.len(),
            StateBuffer::F64(a) => a.len(),
        }
    }

    /// True if the buffer holds no amplitudes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Amplitudes widened to double precision.
    pub fn to_f64(&self) -> Vec<Complex64> {
        match self {
            StateBuffer::F32(a) => a
                .iter()
                .map(|c| Complex64::new(f64::from(c.re), f64::from(c.im)))
                .collect(),
            StateBuffer::F64(a) => a.to_vec(),
        }
    }
}

/// An opaque simulation state produced by some backend.
pub trait SimulationState {
    /// Number of qudits the state spans.
    fn num_qudits(&self) -> usize;

    /// Precision of [`SimulationState::amplitudes`].
    fn precision(&self) -> Precision;

    /// Amplitudes in computational-basis order, if the state can expose
    /// them.
    fn amplitudes(&self) -> Option<StateBuffer<'_>>;
}

/// Source for [`ExecutionBackend::initialize_state`].
pub enum InitialState<'a> {
    /// Raw amplitudes plus precision tag.
    Buffer(StateBuffer<'a>),
    /// A state handle from another simulation.
    Simulation(&'a dyn SimulationState),
}

impl fmt::Debug for InitialState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialState::Buffer(buffer) => f
                .debug_struct("Buffer")
                .field("precision", &buffer.precision())
                .field("len", &buffer.len())
                .finish(),
            InitialState::Simulation(state) => f
                .debug_struct("Simulation")
                .field("num_qudits", &state.num_qudits())
                .field("precision", &state.precision())
                .finish(),
        }
    }
}

/// Configuration for a backend instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name of the backend.
    pub name: String,
    /// Backend-specific options.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BackendConfig {
    /// Create a new backend configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Add an option.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Read an unsigned integer option.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// The contract between the execution manager and a backend.
///
/// Backends are thread-confined: each manager owns exactly one, and every
/// call arrives on the manager's thread. `Send` lets a manager be installed
/// as the process-wide override.
pub trait ExecutionBackend: Send {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// A qudit with a fresh identity is about to be used.
    fn allocate_qudit(&mut self, qudit: QuditInfo) -> ManagerResult<()>;

    /// A qudit identity has been returned.
    fn deallocate_qudit(&mut self, qudit: QuditInfo) -> ManagerResult<()>;

    /// A run configuration was bound to the manager. Rejecting it leaves the
    /// manager unbound.
    fn bind_context(&mut self, _context: &ContextHandle) -> ManagerResult<()> {
        Ok(())
    }

    /// The bound run configuration was released.
    fn unbind_context(&mut self) {}

    /// Overwrite the joint state of `targets`.
    fn initialize_state(
        &mut self,
        targets: &[QuditInfo],
        state: InitialState<'_>,
    ) -> ManagerResult<()>;

    /// Apply a resolved instruction.
    fn apply(&mut self, instruction: &Instruction) -> ManagerResult<()>;

    /// Apply a Kraus channel.
    fn apply_noise(&mut self, channel: &KrausChannel, targets: &[QuditInfo]) -> ManagerResult<()>;

    /// Force `target` into its ground state.
    fn reset(&mut self, target: QuditInfo) -> ManagerResult<()>;

    /// Measure `target` in the computational basis, returning the observed
    /// basis index.
    fn measure(&mut self, target: QuditInfo, register: &str) -> ManagerResult<i32>;

    /// Measure the expectation value of a spin operator. Term qudit indices
    /// are qudit ids.
    fn measure_spin_op(&mut self, op: &SpinOp) -> ManagerResult<SpinMeasureResult>;

    /// Block until every previously issued instruction has taken effect.
    fn synchronize(&mut self) -> ManagerResult<()>;

    /// Timing hint for backends that queue gates.
    fn flush_gate_queue(&mut self) -> ManagerResult<()> {
        Ok(())
    }
}

/// Construct a backend from configuration.
pub trait BackendFactory: ExecutionBackend + Sized + 'static {
    /// Create a backend from configuration.
    fn from_config(config: &BackendConfig) -> ManagerResult<Self>;
}
