//! The execution manager.
//!
//! An [`ExecutionManager`] owns one backend plus everything the kernel-side
//! protocol needs: the qudit identity pool, the region stack and the bound
//! execution context. Every instruction passes through here, is checked and
//! resolved, then forwarded to the backend:
//!
//! ```text
//!   apply(name, params, controls, targets, adjoint)
//!     ├─ operands live? disjoint?
//!     ├─ name → BuiltinGate | registry lookup | UnknownOperation
//!     ├─ adjoint  = flag XOR (adjoint depth is odd), cleared for self-adjoint gates
//!     ├─ controls = explicit ++ region controls (deduplicated)
//!     └─ backend.apply(&Instruction), or queued while an adjoint region is open
//! ```
//!
//! Instructions issued inside an adjoint region are held back until the
//! region closes and then replayed in reverse order, so the region as a whole
//! applies the inverse of its body. A nested region hands its reversed body
//! to the enclosing one.
//!
//! Managers are thread-confined; see [`crate::resolution`] for how one is
//! obtained.

use std::fmt;

use qxm_ir::{BuiltinGate, IrError, KrausChannel, PauliWord, QuditInfo, SpinMeasureResult, SpinOp};
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::backend::{ExecutionBackend, InitialState, Instruction, Operation};
use crate::config::LeakPolicy;
use crate::context::{ContextHandle, lock_context};
use crate::error::{ManagerError, ManagerResult};
use crate::measure::{self, MeasureResult};
use crate::pool::QuditIdPool;
use crate::region::RegionStack;
use crate::registry::{self, CustomOperation};

/// Mediates between kernel code and one execution backend.
pub struct ExecutionManager {
    backend: Box<dyn ExecutionBackend>,
    pool: QuditIdPool,
    /// Live qudits by id.
    qudits: FxHashMap<usize, QuditInfo>,
    regions: RegionStack,
    context: Option<ContextHandle>,
    leak_policy: LeakPolicy,
    /// One buffer per open adjoint region, innermost last.
    adjoint_queue: Vec<Vec<Instruction>>,
}

impl ExecutionManager {
    /// Create a manager around `backend`.
    pub fn new(backend: Box<dyn ExecutionBackend>) -> Self {
        debug!("Creating execution manager for backend: {}", backend.name());
        Self {
            backend,
            pool: QuditIdPool::new(),
            qudits: FxHashMap::default(),
            regions: RegionStack::new(),
            context: None,
            leak_policy: LeakPolicy::default(),
            adjoint_queue: Vec::new(),
        }
    }

    /// Create a manager around a concrete backend.
    pub fn from_backend<B: ExecutionBackend + 'static>(backend: B) -> Self {
        Self::new(Box::new(backend))
    }

    /// Set the teardown leak policy.
    pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
        self.leak_policy = policy;
        self
    }

    /// Name of the backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    // ------------------------------------------------------------------
    // Qudit lifecycle
    // ------------------------------------------------------------------

    /// Allocate a qudit with `levels` basis states.
    pub fn allocate_qudit(&mut self, levels: usize) -> ManagerResult<QuditInfo> {
        if levels < 2 {
            return Err(ManagerError::protocol(format!(
                "a qudit needs at least 2 levels, got {levels}"
            )));
        }
        let qudit = QuditInfo::new(levels, self.pool.allocate());
        if let Err(e) = self.backend.allocate_qudit(qudit) {
            // The backend never saw this id as live.
            let _ = self.pool.free(qudit.id);
            return Err(e);
        }
        self.qudits.insert(qudit.id, qudit);
        debug!("Allocated {}", qudit);
        Ok(qudit)
    }

    /// Allocate `count` qudits with `levels` basis states each.
    pub fn allocate_qudits(&mut self, count: usize, levels: usize) -> ManagerResult<Vec<QuditInfo>> {
        (0..count).map(|_| self.allocate_qudit(levels)).collect()
    }

    /// Return a qudit's identity to the pool.
    pub fn return_qudit(&mut self, qudit: QuditInfo) -> ManagerResult<()> {
        if let Some(live) = self.qudits.get(&qudit.id) {
            if *live != qudit {
                return Err(ManagerError::protocol(format!(
                    "returned {qudit} but the live qudit with id {} is {live}",
                    qudit.id
                )));
            }
        }
        if self.regions.region_controls().any(|c| *c == qudit) {
            return Err(ManagerError::protocol(format!(
                "{qudit} is a control of an open control region"
            )));
        }
        if self.is_queued(qudit) {
            return Err(ManagerError::protocol(format!(
                "{qudit} is an operand of an open adjoint region"
            )));
        }
        self.pool.free(qudit.id)?;
        self.qudits.remove(&qudit.id);
        debug!("Returned {}", qudit);
        self.backend.deallocate_qudit(qudit)
    }

    /// True if any allocated qudit has not been returned.
    pub fn memory_leaked(&self) -> bool {
        !self.pool.all_deallocated()
    }

    /// Qudits still live, by ascending id.
    pub fn leaked_qudits(&self) -> Vec<QuditInfo> {
        self.pool
            .live_ids()
            .into_iter()
            .filter_map(|id| self.qudits.get(&id).copied())
            .collect()
    }

    /// Fail if any qudit is still live.
    pub fn check_leaks(&self) -> ManagerResult<()> {
        let leaked = self.leaked_qudits();
        if leaked.is_empty() {
            return Ok(());
        }
        Err(ManagerError::protocol(format!(
            "{} qudit(s) never returned: {}",
            leaked.len(),
            join(&leaked)
        )))
    }

    /// Number of live qudits.
    pub fn num_live_qudits(&self) -> usize {
        self.pool.num_live()
    }

    // ------------------------------------------------------------------
    // Execution context
    // ------------------------------------------------------------------

    /// Bind a run configuration. Only one may be bound at a time.
    pub fn set_execution_context(&mut self, context: ContextHandle) -> ManagerResult<()> {
        if self.context.is_some() {
            return Err(ManagerError::protocol(
                "an execution context is already bound; reset it first",
            ));
        }
        self.backend.bind_context(&context)?;
        debug!("Bound execution context: {}", lock_context(&context).kind);
        self.context = Some(context);
        Ok(())
    }

    /// Unbind the run configuration. No-op if none is bound.
    pub fn reset_execution_context(&mut self) {
        if self.context.take().is_some() {
            self.backend.unbind_context();
            debug!("Unbound execution context");
        }
    }

    /// The bound run configuration.
    pub fn execution_context(&self) -> Option<&ContextHandle> {
        self.context.as_ref()
    }

    // ------------------------------------------------------------------
    // Instruction dispatch
    // ------------------------------------------------------------------

    /// Overwrite the joint state of `targets`.
    pub fn initialize_state(
        &mut self,
        targets: &[QuditInfo],
        state: InitialState<'_>,
    ) -> ManagerResult<()> {
        self.check_live(targets)?;
        self.check_distinct(targets)?;
        debug!("Initializing {} qudit(s) from {:?}", targets.len(), state);
        self.backend.initialize_state(targets, state)
    }

    /// Apply `name` to `targets`.
    pub fn apply(
        &mut self,
        name: &str,
        params: &[f64],
        controls: &[QuditInfo],
        targets: &[QuditInfo],
        is_adjoint: bool,
    ) -> ManagerResult<()> {
        self.apply_with_operator(name, params, controls, targets, is_adjoint, PauliWord::default())
    }

    /// Apply `name` to `targets` with a Pauli word payload (`exp_pauli`).
    pub fn apply_with_operator(
        &mut self,
        name: &str,
        params: &[f64],
        controls: &[QuditInfo],
        targets: &[QuditInfo],
        is_adjoint: bool,
        operator: PauliWord,
    ) -> ManagerResult<()> {
        if targets.is_empty() {
            return Err(ManagerError::protocol(format!(
                "instruction '{name}' has no targets"
            )));
        }
        self.check_live(controls)?;
        self.check_live(targets)?;
        self.check_distinct(targets)?;

        let operation = resolve_operation(name, params, targets, &operator)?;
        let controls = self.regions.effective_controls(controls);
        self.check_live(&controls)?;
        if let Some(q) = controls.iter().find(|c| targets.contains(c)) {
            return Err(ManagerError::protocol(format!(
                "{q} is both control and target of '{name}'"
            )));
        }

        let self_adjoint = matches!(&operation, Operation::Builtin(g) if g.is_self_adjoint());
        let instruction = Instruction {
            operation,
            params: params.to_vec(),
            controls,
            targets: targets.to_vec(),
            adjoint: (is_adjoint ^ self.regions.effective_adjoint()) && !self_adjoint,
            operator,
        };
        if let Some(body) = self.adjoint_queue.last_mut() {
            debug!("Queueing {} in adjoint region", instruction);
            body.push(instruction);
            return Ok(());
        }
        debug!("Dispatching {}", instruction);
        self.backend.apply(&instruction)
    }

    /// Apply a noise channel. Regions do not affect noise, and a qudit with
    /// instructions queued in an open adjoint region is rejected.
    pub fn apply_noise(&mut self, channel: &KrausChannel, targets: &[QuditInfo]) -> ManagerResult<()> {
        self.check_live(targets)?;
        self.check_distinct(targets)?;
        self.check_not_queued(targets)?;
        let expected: usize = targets.iter().map(|q| q.levels).product();
        if channel.dimension() != expected {
            return Err(IrError::DimensionMismatch {
                expected,
                got: channel.dimension(),
            }
            .into());
        }
        debug!("Applying noise channel {} to {}", channel.name(), join(targets));
        self.backend.apply_noise(channel, targets)
    }

    /// Force `target` into its ground state.
    pub fn reset(&mut self, target: QuditInfo) -> ManagerResult<()> {
        self.check_live(&[target])?;
        self.check_not_queued(&[target])?;
        self.backend.reset(target)
    }

    /// Measure `target`, recording the outcome in the bound context under
    /// `register` (the global register when empty). Regions do not affect
    /// measurement, but a qudit with instructions still queued in an open
    /// adjoint region cannot be measured.
    pub fn measure(&mut self, target: QuditInfo, register: &str) -> ManagerResult<i32> {
        self.check_live(&[target])?;
        self.check_not_queued(&[target])?;
        let outcome = self.backend.measure(target, register)?;
        debug!("Measured {} = {}", target, outcome);
        if let Some(context) = &self.context {
            lock_context(context).record_measurement(register, outcome);
        }
        Ok(outcome)
    }

    /// Measure `target` and wrap the outcome for deferred observation.
    pub fn measure_deferred(&mut self, target: QuditInfo, register: &str) -> ManagerResult<MeasureResult> {
        let raw = self.measure(target, register)?;
        Ok(MeasureResult::new(raw, measure::next_result_id()))
    }

    /// Measure the expectation value of `op`. Term indices are qudit ids.
    pub fn measure_spin_op(&mut self, op: &SpinOp) -> ManagerResult<SpinMeasureResult> {
        for term in op.terms() {
            for (id, _) in term.pauli.ops() {
                if !self.pool.is_live(*id) {
                    return Err(ManagerError::protocol(format!(
                        "spin term {} references qudit id {id}, which is not live",
                        term.pauli.label()
                    )));
                }
            }
        }
        let result = self.backend.measure_spin_op(op)?;
        debug!("Measured spin operator: <H> = {}", result.expectation);
        if let Some(context) = &self.context {
            lock_context(context).expectation = Some(result.expectation);
        }
        Ok(result)
    }

    /// Block until the backend has applied every issued instruction.
    pub fn synchronize(&mut self) -> ManagerResult<()> {
        self.backend.synchronize()
    }

    /// Timing hint for queueing backends.
    pub fn flush_gate_queue(&mut self) -> ManagerResult<()> {
        self.backend.flush_gate_queue()
    }

    // ------------------------------------------------------------------
    // Regions
    // ------------------------------------------------------------------

    /// Enter an adjoint region. Instructions are queued until it closes.
    pub fn start_adjoint_region(&mut self) {
        self.regions.begin_adjoint();
        self.adjoint_queue.push(Vec::new());
    }

    /// Leave the innermost adjoint region and replay its body in reverse.
    ///
    /// Inside an enclosing adjoint region the reversed body is queued there
    /// instead of reaching the backend.
    pub fn end_adjoint_region(&mut self) -> ManagerResult<()> {
        self.regions.end_adjoint()?;
        let Some(mut body) = self.adjoint_queue.pop() else {
            return Ok(());
        };
        body.reverse();
        if let Some(outer) = self.adjoint_queue.last_mut() {
            outer.extend(body);
            return Ok(());
        }
        debug!("Replaying {} instruction(s) from adjoint region", body.len());
        for instruction in &body {
            self.backend.apply(instruction)?;
        }
        Ok(())
    }

    /// Number of instructions waiting for their adjoint regions to close.
    pub fn num_queued_instructions(&self) -> usize {
        self.adjoint_queue.iter().map(Vec::len).sum()
    }

    /// Enter a control region on `controls`. Returns the count to pass to
    /// [`ExecutionManager::end_ctrl_region`].
    pub fn start_ctrl_region(&mut self, controls: &[QuditInfo]) -> ManagerResult<usize> {
        self.check_live(controls)?;
        Ok(self.regions.begin_control(controls))
    }

    /// Leave the innermost control region of `n` qudits.
    pub fn end_ctrl_region(&mut self, n: usize) -> ManagerResult<()> {
        self.regions.end_control(n)
    }

    /// Current region state.
    pub fn region_stack(&self) -> &RegionStack {
        &self.regions
    }

    // ------------------------------------------------------------------
    // Custom operations
    // ------------------------------------------------------------------

    /// Register a custom operation process-wide.
    pub fn register_operation(&self, name: impl Into<String>, operation: impl CustomOperation + 'static) {
        registry::register_operation(name, operation);
    }

    /// Remove every custom operation process-wide.
    pub fn clear_registered_operations(&self) {
        registry::clear_registered_operations();
    }

    fn check_live(&self, qudits: &[QuditInfo]) -> ManagerResult<()> {
        for q in qudits {
            if self.qudits.get(&q.id) != Some(q) {
                return Err(ManagerError::protocol(format!("{q} is not a live qudit")));
            }
        }
        Ok(())
    }

    fn is_queued(&self, qudit: QuditInfo) -> bool {
        self.adjoint_queue
            .iter()
            .flatten()
            .any(|inst| inst.targets.contains(&qudit) || inst.controls.contains(&qudit))
    }

    fn check_not_queued(&self, qudits: &[QuditInfo]) -> ManagerResult<()> {
        match qudits.iter().find(|q| self.is_queued(**q)) {
            Some(q) => Err(ManagerError::protocol(format!(
                "{q} has instructions pending in an open adjoint region"
            ))),
            None => Ok(()),
        }
    }

    fn check_distinct(&self, qudits: &[QuditInfo]) -> ManagerResult<()> {
        for (i, q) in qudits.iter().enumerate() {
            if qudits[..i].contains(q) {
                return Err(ManagerError::protocol(format!("{q} appears twice as an operand")));
            }
        }
        Ok(())
    }

    fn report(&self, message: &str) {
        match self.leak_policy {
            LeakPolicy::Warn => warn!("{}", message),
            LeakPolicy::Error => error!("{}", message),
        }
    }
}

fn resolve_operation(
    name: &str,
    params: &[f64],
    targets: &[QuditInfo],
    operator: &PauliWord,
) -> ManagerResult<Operation> {
    if let Some(gate) = BuiltinGate::from_name(name) {
        if params.len() != gate.num_params() {
            return Err(ManagerError::protocol(format!(
                "'{name}' takes {} parameter(s), got {}",
                gate.num_params(),
                params.len()
            )));
        }
        match gate.num_targets() {
            Some(n) if n != targets.len() => {
                return Err(ManagerError::protocol(format!(
                    "'{name}' acts on {n} target(s), got {}",
                    targets.len()
                )));
            }
            None if operator.len() != targets.len() => {
                return Err(ManagerError::protocol(format!(
                    "Pauli word '{operator}' spans {} qudit(s) but {} target(s) were given",
                    operator.len(),
                    targets.len()
                )));
            }
            _ => {}
        }
        return Ok(Operation::Builtin(gate));
    }

    let definition = registry::lookup_operation(name)
        .ok_or_else(|| ManagerError::UnknownOperation(name.to_string()))?;
    if definition.num_targets() != targets.len() {
        return Err(ManagerError::protocol(format!(
            "custom operation '{name}' acts on {} target(s), got {}",
            definition.num_targets(),
            targets.len()
        )));
    }
    let matrix = definition.unitary(params);
    let dim: usize = targets.iter().map(|q| q.levels).product();
    if matrix.len() != dim * dim {
        return Err(IrError::DimensionMismatch {
            expected: dim * dim,
            got: matrix.len(),
        }
        .into());
    }
    Ok(Operation::Custom {
        name: name.to_string(),
        matrix,
    })
}

fn join(qudits: &[QuditInfo]) -> String {
    qudits
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionManager")
            .field("backend", &self.backend.name())
            .field("live_qudits", &self.pool.num_live())
            .field("regions", &self.regions)
            .field("context_bound", &self.context.is_some())
            .field("leak_policy", &self.leak_policy)
            .finish()
    }
}

impl Drop for ExecutionManager {
    fn drop(&mut self) {
        if !self.regions.is_balanced() {
            self.report(&format!(
                "execution manager torn down with open regions (adjoint depth {}, {} control frame(s))",
                self.regions.adjoint_depth(),
                self.regions.control_depth()
            ));
        }
        let queued = self.num_queued_instructions();
        if queued > 0 {
            self.report(&format!(
                "{queued} instruction(s) in unclosed adjoint regions were never applied"
            ));
        }
        if let Err(e) = self.check_leaks() {
            self.report(&e.to_string());
        }
        if self.context.take().is_some() {
            self.backend.unbind_context();
        }
    }
}
