//! Simulator backend implementation.

use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use qxm_ir::{KrausChannel, PauliOp, QuditInfo, SampleResult, SpinMeasureResult, SpinOp};
use qxm_runtime::{
    BackendConfig, BackendFactory, ContextHandle, ExecutionBackend, InitialState, Instruction,
    ManagerResult, Operation, Precision, SimulationState, StateBuffer, lock_context,
};

use crate::error::SimError;
use crate::statevector::{Statevector, dagger};

/// Default qubit capacity.
pub const DEFAULT_MAX_QUBITS: usize = 24;

/// Shots used for spin-operator sampling when no context is bound.
const DEFAULT_SHOTS: usize = 1000;

const NORM_TOLERANCE: f64 = 1e-6;

/// Local statevector backend.
///
/// Qubits are added to the state as they are allocated and traced out
/// (after a collapsing measurement) when they are returned, so memory
/// follows the number of live qubits rather than the highest id ever used.
pub struct StatevectorBackend {
    /// Backend configuration.
    config: BackendConfig,
    state: Statevector,
    /// Statevector bit position per qudit id.
    index_of: FxHashMap<usize, usize>,
    /// Qudit id per bit position.
    ids: Vec<usize>,
    /// Maximum number of live qubits.
    max_qubits: usize,
    rng: StdRng,
    context: Option<ContextHandle>,
}

impl StatevectorBackend {
    /// Create a new simulator backend with default settings.
    pub fn new() -> Self {
        Self::with_rng(BackendConfig::new("statevector"), DEFAULT_MAX_QUBITS, StdRng::from_entropy())
    }

    /// Create a simulator with custom max qubits.
    pub fn with_max_qubits(max_qubits: usize) -> Self {
        Self::with_rng(BackendConfig::new("statevector"), max_qubits, StdRng::from_entropy())
    }

    /// Create a simulator whose measurements are reproducible.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(
            BackendConfig::new("statevector"),
            DEFAULT_MAX_QUBITS,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(config: BackendConfig, max_qubits: usize, rng: StdRng) -> Self {
        Self {
            config,
            state: Statevector::new(0),
            index_of: FxHashMap::default(),
            ids: Vec::new(),
            max_qubits,
            rng,
            context: None,
        }
    }

    /// Current state. Bit `k` of an amplitude index belongs to the `k`-th
    /// live qubit in allocation order.
    pub fn state(&self) -> &Statevector {
        &self.state
    }

    /// Maximum number of live qubits.
    pub fn max_qubits(&self) -> usize {
        self.max_qubits
    }

    fn index(&self, qudit: QuditInfo) -> Result<usize, SimError> {
        self.index_of
            .get(&qudit.id)
            .copied()
            .ok_or(SimError::UnknownQubit(qudit.id))
    }

    fn indices(&self, qudits: &[QuditInfo]) -> Result<Vec<usize>, SimError> {
        qudits.iter().map(|q| self.index(*q)).collect()
    }

    /// Channels the bound context attaches to `gate`.
    fn noise_for(&self, gate: &str) -> Vec<KrausChannel> {
        self.context
            .as_ref()
            .and_then(|ctx| {
                lock_context(ctx)
                    .noise_model
                    .as_ref()
                    .map(|model| model.channels_for(gate).to_vec())
            })
            .unwrap_or_default()
    }

    fn shots(&self) -> usize {
        self.context
            .as_ref()
            .map(|ctx| lock_context(ctx).shots)
            .filter(|shots| *shots > 0)
            .unwrap_or(DEFAULT_SHOTS)
    }

    fn kraus(&mut self, channel: &KrausChannel, targets: &[usize]) -> Result<(), SimError> {
        if channel.dimension() != 1usize << targets.len() {
            return Err(SimError::ChannelShape {
                name: channel.name().to_string(),
                targets: targets.len(),
            });
        }
        self.state.apply_kraus(targets, channel.operators(), &mut self.rng);
        Ok(())
    }

    /// Overwrite `targets` with `amplitudes`. Bit `k` of a buffer index
    /// belongs to `targets[k]`.
    fn load(&mut self, targets: &[usize], amplitudes: &[Complex64]) -> Result<(), SimError> {
        if amplitudes.len() != 1usize << targets.len() {
            return Err(SimError::InvalidState(format!(
                "{} amplitudes for {} qubit(s)",
                amplitudes.len(),
                targets.len()
            )));
        }
        let norm: f64 = amplitudes.iter().map(Complex64::norm_sqr).sum();
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(SimError::InvalidState(format!("norm {norm} is not 1")));
        }

        // Disentangle the targets first; the rest of the register keeps
        // its (collapsed) state.
        for &t in targets {
            self.state.reset(t, &mut self.rng);
        }
        let target_mask: usize = targets.iter().map(|t| 1usize << t).sum();
        let old = self.state.amplitudes();
        let new: Vec<Complex64> = (0..old.len())
            .map(|i| {
                let local = targets
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| i & (1usize << **t) != 0)
                    .map(|(k, _)| 1usize << k)
                    .sum::<usize>();
                old[i & !target_mask] * amplitudes[local]
            })
            .collect();
        self.state.set_amplitudes(new);
        Ok(())
    }

    fn sample_term(&mut self, factors: &[(usize, PauliOp)], shots: usize, samples: &mut SampleResult, label: &str) {
        let mut rotated = self.state.clone();
        rotated.rotate_to_basis(factors);
        let mut histogram: FxHashMap<String, u64> = FxHashMap::default();
        for _ in 0..shots {
            let outcome = rotated.sample(&mut self.rng);
            let bits: String = factors
                .iter()
                .map(|(q, _)| if outcome & (1usize << *q) != 0 { '1' } else { '0' })
                .collect();
            *histogram.entry(bits).or_default() += 1;
        }
        let counts = samples.register_mut(label);
        for (bits, n) in histogram {
            counts.insert(bits, n);
        }
    }
}

impl Default for StatevectorBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for StatevectorBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn allocate_qudit(&mut self, qudit: QuditInfo) -> ManagerResult<()> {
        if !qudit.is_qubit() {
            return Err(SimError::UnsupportedLevels(qudit.levels).into());
        }
        if self.ids.len() >= self.max_qubits {
            return Err(SimError::CapacityExceeded {
                requested: self.ids.len() + 1,
                max: self.max_qubits,
            }
            .into());
        }
        let index = self.state.add_qubit();
        self.index_of.insert(qudit.id, index);
        self.ids.push(qudit.id);
        debug!("Allocated {} at bit {}", qudit, index);
        Ok(())
    }

    fn deallocate_qudit(&mut self, qudit: QuditInfo) -> ManagerResult<()> {
        let index = self.index(qudit)?;
        let value = self.state.measure(index, &mut self.rng);
        self.state.remove_qubit(index, value);
        self.index_of.remove(&qudit.id);
        self.ids.remove(index);
        for id in &self.ids[index..] {
            if let Some(i) = self.index_of.get_mut(id) {
                *i -= 1;
            }
        }
        debug!("Released {} (bit {})", qudit, index);
        Ok(())
    }

    fn bind_context(&mut self, context: &ContextHandle) -> ManagerResult<()> {
        self.context = Some(context.clone());
        Ok(())
    }

    fn unbind_context(&mut self) {
        self.context = None;
    }

    #[instrument(skip(self, targets, state))]
    fn initialize_state(
        &mut self,
        targets: &[QuditInfo],
        state: InitialState<'_>,
    ) -> ManagerResult<()> {
        let indices = self.indices(targets)?;
        let amplitudes = match state {
            InitialState::Buffer(buffer) => buffer.to_f64(),
            InitialState::Simulation(sim) => {
                if sim.num_qudits() != targets.len() {
                    return Err(SimError::InvalidState(format!(
                        "simulation spans {} qubit(s), {} targets given",
                        sim.num_qudits(),
                        targets.len()
                    ))
                    .into());
                }
                sim.amplitudes()
                    .ok_or_else(|| SimError::InvalidState("simulation state is opaque".into()))?
                    .to_f64()
            }
        };
        self.load(&indices, &amplitudes)?;
        Ok(())
    }

    #[instrument(skip(self, instruction))]
    fn apply(&mut self, instruction: &Instruction) -> ManagerResult<()> {
        let targets = self.indices(&instruction.targets)?;
        let cmask: usize = self
            .indices(&instruction.controls)?
            .iter()
            .map(|c| 1usize << c)
            .sum();

        match &instruction.operation {
            Operation::Builtin(gate) => self.state.apply_gate(
                *gate,
                &instruction.params,
                &targets,
                cmask,
                instruction.adjoint,
                &instruction.operator,
            ),
            Operation::Custom { matrix, .. } => {
                if instruction.adjoint {
                    self.state.apply_matrix(&targets, &dagger(matrix), cmask);
                } else {
                    self.state.apply_matrix(&targets, matrix, cmask);
                }
            }
        }

        for channel in self.noise_for(instruction.name()) {
            if channel.dimension() == 2 {
                for &t in &targets {
                    self.kraus(&channel, &[t])?;
                }
            } else {
                self.kraus(&channel, &targets)?;
            }
        }
        Ok(())
    }

    fn apply_noise(&mut self, channel: &KrausChannel, targets: &[QuditInfo]) -> ManagerResult<()> {
        let indices = self.indices(targets)?;
        self.kraus(channel, &indices)?;
        Ok(())
    }

    fn reset(&mut self, qudit: QuditInfo) -> ManagerResult<()> {
        let index = self.index(qudit)?;
        self.state.reset(index, &mut self.rng);
        Ok(())
    }

    fn measure(&mut self, qudit: QuditInfo, _register: &str) -> ManagerResult<i32> {
        let index = self.index(qudit)?;
        let outcome = self.state.measure(index, &mut self.rng);
        Ok(outcome as i32)
    }

    #[instrument(skip(self, op))]
    fn measure_spin_op(&mut self, op: &SpinOp) -> ManagerResult<SpinMeasureResult> {
        let shots = self.shots();
        let mut result = SpinMeasureResult::default();
        debug!("Measuring {} term(s) with {} shots", op.n_terms(), shots);

        for term in op.terms() {
            let factors = term
                .pauli
                .ops()
                .iter()
                .map(|(id, p)| Ok((self.index(QuditInfo::qubit(*id))?, *p)))
                .collect::<Result<Vec<_>, SimError>>()?;
            if factors.is_empty() {
                result.expectation += term.coeff;
                continue;
            }
            result.expectation += term.coeff * self.state.expectation(&factors);
            let label = term.pauli.label();
            self.sample_term(&factors, shots, &mut result.samples, &label);
        }
        Ok(result)
    }

    fn synchronize(&mut self) -> ManagerResult<()> {
        Ok(())
    }
}

impl BackendFactory for StatevectorBackend {
    fn from_config(config: &BackendConfig) -> ManagerResult<Self> {
        let max_qubits = config
            .get_u64("max_qubits")
            .map_or(DEFAULT_MAX_QUBITS, |n| n as usize);
        let rng = match config.get_u64("seed") {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self::with_rng(config.clone(), max_qubits, rng))
    }
}

impl SimulationState for Statevector {
    fn num_qudits(&self) -> usize {
        self.num_qubits()
    }

    fn precision(&self) -> Precision {
        Precision::Fp64
    }

    fn amplitudes(&self) -> Option<StateBuffer<'_>> {
        Some(StateBuffer::F64(Statevector::amplitudes(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qxm_ir::{BuiltinGate, PauliWord};
    use qxm_runtime::ManagerError;

    fn instruction(gate: BuiltinGate, params: &[f64], controls: &[QuditInfo], targets: &[QuditInfo]) -> Instruction {
        Instruction {
            operation: Operation::Builtin(gate),
            params: params.to_vec(),
            controls: controls.to_vec(),
            targets: targets.to_vec(),
            adjoint: false,
            operator: PauliWord::default(),
        }
    }

    fn backend_with(n: usize) -> (StatevectorBackend, Vec<QuditInfo>) {
        let mut backend = StatevectorBackend::seeded(42);
        let qs: Vec<_> = (0..n).map(QuditInfo::qubit).collect();
        for q in &qs {
            backend.allocate_qudit(*q).unwrap();
        }
        (backend, qs)
    }

    #[test]
    fn test_rejects_qutrits() {
        let mut backend = StatevectorBackend::new();
        let err = backend.allocate_qudit(QuditInfo::new(3, 0)).unwrap_err();
        assert!(matches!(err, ManagerError::Unsupported(_)));
    }

    #[test]
    fn test_capacity() {
        let mut backend = StatevectorBackend::with_max_qubits(1);
        backend.allocate_qudit(QuditInfo::qubit(0)).unwrap();
        let err = backend.allocate_qudit(QuditInfo::qubit(1)).unwrap_err();
        assert!(matches!(err, ManagerError::ResourceExhaustion(_)));
    }

    #[test]
    fn test_deallocation_reindexes() {
        let (mut backend, qs) = backend_with(3);
        backend.apply(&instruction(BuiltinGate::X, &[], &[], &[qs[2]])).unwrap();
        backend.deallocate_qudit(qs[0]).unwrap();
        assert_eq!(backend.state().num_qubits(), 2);
        assert_eq!(backend.measure(qs[2], "").unwrap(), 1);
        assert_eq!(backend.measure(qs[1], "").unwrap(), 0);
    }

    #[test]
    fn test_bell_correlation() {
        let (mut backend, qs) = backend_with(2);
        backend.apply(&instruction(BuiltinGate::H, &[], &[], &[qs[0]])).unwrap();
        backend.apply(&instruction(BuiltinGate::X, &[], &[qs[0]], &[qs[1]])).unwrap();
        let a = backend.measure(qs[0], "").unwrap();
        let b = backend.measure(qs[1], "").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_initialize_subset() {
        let (mut backend, qs) = backend_with(2);
        backend.apply(&instruction(BuiltinGate::X, &[], &[], &[qs[0]])).unwrap();
        let one = [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)];
        backend
            .initialize_state(&qs[1..], InitialState::Buffer(StateBuffer::F64(&one)))
            .unwrap();
        assert_eq!(backend.measure(qs[0], "").unwrap(), 1);
        assert_eq!(backend.measure(qs[1], "").unwrap(), 1);
    }

    #[test]
    fn test_custom_matrix_and_buffer_share_target_order() {
        // Swaps basis states 0 and 1: flips bit 0 of the matrix index.
        let flip_low: Vec<Complex64> = [
            0.0, 1.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 0.0,
        ]
        .iter()
        .map(|v| Complex64::new(*v, 0.0))
        .collect();
        let (mut applied, qs) = backend_with(2);
        applied
            .apply(&Instruction {
                operation: Operation::Custom {
                    name: "flip_low".into(),
                    matrix: flip_low,
                },
                ..instruction(BuiltinGate::X, &[], &[], &[qs[1], qs[0]])
            })
            .unwrap();

        // Amplitude 1 is the state with the first listed target set.
        let zero = Complex64::new(0.0, 0.0);
        let index_one = [zero, Complex64::new(1.0, 0.0), zero, zero];
        let (mut loaded, _) = backend_with(2);
        loaded
            .initialize_state(&[qs[1], qs[0]], InitialState::Buffer(StateBuffer::F64(&index_one)))
            .unwrap();

        for backend in [&mut applied, &mut loaded] {
            assert_eq!(backend.measure(qs[1], "").unwrap(), 1);
            assert_eq!(backend.measure(qs[0], "").unwrap(), 0);
        }
    }

    #[test]
    fn test_initialize_rejects_bad_buffers() {
        let (mut backend, qs) = backend_with(1);
        let short = [Complex64::new(1.0, 0.0)];
        assert!(backend
            .initialize_state(&qs, InitialState::Buffer(StateBuffer::F64(&short)))
            .is_err());
        let unnormalized = [Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0)];
        assert!(backend
            .initialize_state(&qs, InitialState::Buffer(StateBuffer::F64(&unnormalized)))
            .is_err());
    }

    #[test]
    fn test_initialize_from_simulation() {
        let (mut source, src_qs) = backend_with(1);
        source.apply(&instruction(BuiltinGate::X, &[], &[], &src_qs)).unwrap();
        let snapshot = source.state().clone();

        let (mut backend, qs) = backend_with(1);
        backend
            .initialize_state(&qs, InitialState::Simulation(&snapshot))
            .unwrap();
        assert_eq!(backend.measure(qs[0], "").unwrap(), 1);
    }

    #[test]
    fn test_spin_expectation() {
        let (mut backend, qs) = backend_with(2);
        backend.apply(&instruction(BuiltinGate::X, &[], &[], &[qs[1]])).unwrap();
        // <Z0> = 1, <Z1> = -1
        let op = SpinOp::parse_terms(&[(2.0, "ZI"), (0.5, "IZ"), (1.5, "II")]).unwrap();
        let result = backend.measure_spin_op(&op).unwrap();
        assert!((result.expectation - 3.0).abs() < 1e-10);
        let z1 = result.samples.register("Z1").unwrap();
        assert_eq!(z1.get("1"), DEFAULT_SHOTS as u64);
    }

    #[test]
    fn test_from_config() {
        let config = BackendConfig::new("sv")
            .with_extra("max_qubits", serde_json::json!(4))
            .with_extra("seed", serde_json::json!(9));
        let backend = StatevectorBackend::from_config(&config).unwrap();
        assert_eq!(backend.name(), "sv");
        assert_eq!(backend.max_qubits(), 4);
    }
}
