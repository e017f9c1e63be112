//! Kernel-side instruction helpers.
//!
//! Free functions over the current thread's execution manager, shaped like
//! the calls generated kernel code makes:
//!
//! ```rust,ignore
//! use qxm_runtime::qis::*;
//!
//! let q = qalloc_n(2)?;
//! h(q[0])?;
//! cx(q[0], q[1])?;
//! let bits = mz_all(&q)?;
//! qfree_all(&q)?;
//! ```

use std::f64::consts::FRAC_PI_2;

use qxm_ir::{PauliWord, QuditInfo, SpinMeasureResult, SpinOp};

use crate::error::ManagerResult;
use crate::measure::{Measurement, into_measurement, measurement_bit};
use crate::resolution::with_execution_manager;

// ----------------------------------------------------------------------
// Allocation
// ----------------------------------------------------------------------

/// Allocate a qubit.
pub fn qalloc() -> ManagerResult<QuditInfo> {
    with_execution_manager(|em| em.allocate_qudit(2))
}

/// Allocate `n` qubits.
pub fn qalloc_n(n: usize) -> ManagerResult<Vec<QuditInfo>> {
    with_execution_manager(|em| em.allocate_qudits(n, 2))
}

/// Allocate a qudit with `levels` basis states.
pub fn qalloc_qudit(levels: usize) -> ManagerResult<QuditInfo> {
    with_execution_manager(|em| em.allocate_qudit(levels))
}

/// Return a qudit.
pub fn qfree(q: QuditInfo) -> ManagerResult<()> {
    with_execution_manager(|em| em.return_qudit(q))
}

/// Return several qudits, in order.
pub fn qfree_all(qs: &[QuditInfo]) -> ManagerResult<()> {
    with_execution_manager(|em| qs.iter().try_for_each(|q| em.return_qudit(*q)))
}

// ----------------------------------------------------------------------
// Gates
// ----------------------------------------------------------------------

fn gate(name: &str, params: &[f64], controls: &[QuditInfo], targets: &[QuditInfo], adjoint: bool) -> ManagerResult<()> {
    with_execution_manager(|em| em.apply(name, params, controls, targets, adjoint))
}

macro_rules! fixed_gates {
    ($($(#[$doc:meta])* $fn_name:ident => ($gate:literal, $adjoint:literal);)*) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(q: QuditInfo) -> ManagerResult<()> {
                gate($gate, &[], &[], &[q], $adjoint)
            }
        )*
    };
}

fixed_gates! {
    /// Hadamard.
    h => ("h", false);
    /// Pauli-X.
    x => ("x", false);
    /// Pauli-Y.
    y => ("y", false);
    /// Pauli-Z.
    z => ("z", false);
    /// S.
    s => ("s", false);
    /// T.
    t => ("t", false);
    /// S†.
    sdg => ("s", true);
    /// T†.
    tdg => ("t", true);
}

macro_rules! rotation_gates {
    ($($(#[$doc:meta])* $fn_name:ident, $ctrl_name:ident => $gate:literal;)*) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(theta: f64, q: QuditInfo) -> ManagerResult<()> {
                gate($gate, &[theta], &[], &[q], false)
            }

            #[doc = concat!("Controlled `", $gate, "`.")]
            pub fn $ctrl_name(theta: f64, control: QuditInfo, target: QuditInfo) -> ManagerResult<()> {
                gate($gate, &[theta], &[control], &[target], false)
            }
        )*
    };
}

rotation_gates! {
    /// Rotation about X.
    rx, crx => "rx";
    /// Rotation about Y.
    ry, cry => "ry";
    /// Rotation about Z.
    rz, crz => "rz";
    /// Phase rotation diag(1, e^{iθ}).
    r1, cr1 => "r1";
}

/// U3(θ, φ, λ).
pub fn u3(theta: f64, phi: f64, lambda: f64, q: QuditInfo) -> ManagerResult<()> {
    gate("u3", &[theta, phi, lambda], &[], &[q], false)
}

/// SWAP.
pub fn swap(a: QuditInfo, b: QuditInfo) -> ManagerResult<()> {
    gate("swap", &[], &[], &[a, b], false)
}

/// exp(iθ·P) where letter i of `word` acts on `qs[i]`.
pub fn exp_pauli(theta: f64, qs: &[QuditInfo], word: &str) -> ManagerResult<()> {
    let operator = PauliWord::parse(word)?;
    with_execution_manager(|em| em.apply_with_operator("exp_pauli", &[theta], &[], qs, false, operator))
}

/// CNOT.
pub fn cx(control: QuditInfo, target: QuditInfo) -> ManagerResult<()> {
    gate("x", &[], &[control], &[target], false)
}

/// Controlled Y.
pub fn cy(control: QuditInfo, target: QuditInfo) -> ManagerResult<()> {
    gate("y", &[], &[control], &[target], false)
}

/// Controlled Z.
pub fn cz(control: QuditInfo, target: QuditInfo) -> ManagerResult<()> {
    gate("z", &[], &[control], &[target], false)
}

/// Controlled Hadamard.
pub fn ch(control: QuditInfo, target: QuditInfo) -> ManagerResult<()> {
    gate("h", &[], &[control], &[target], false)
}

/// Toffoli.
pub fn ccx(c0: QuditInfo, c1: QuditInfo, target: QuditInfo) -> ManagerResult<()> {
    gate("x", &[], &[c0, c1], &[target], false)
}

/// Fredkin.
pub fn cswap(control: QuditInfo, a: QuditInfo, b: QuditInfo) -> ManagerResult<()> {
    gate("swap", &[], &[control], &[a, b], false)
}

/// Apply a registered custom operation.
pub fn custom(name: &str, params: &[f64], controls: &[QuditInfo], targets: &[QuditInfo]) -> ManagerResult<()> {
    gate(name, params, controls, targets, false)
}

/// A control qudit, optionally conditioned on |0⟩.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    /// The control qudit.
    pub qudit: QuditInfo,
    /// Condition on |0⟩ instead of |1⟩.
    pub negated: bool,
}

impl Control {
    /// Condition on |1⟩.
    pub fn pos(qudit: QuditInfo) -> Self {
        Self { qudit, negated: false }
    }

    /// Condition on |0⟩.
    pub fn neg(qudit: QuditInfo) -> Self {
        Self { qudit, negated: true }
    }
}

impl From<QuditInfo> for Control {
    fn from(qudit: QuditInfo) -> Self {
        Self::pos(qudit)
    }
}

/// Apply `name` to `target` under `controls`. Negated controls are wrapped
/// in X before and after.
pub fn controlled(name: &str, params: &[f64], controls: &[Control], target: QuditInfo) -> ManagerResult<()> {
    let negated: Vec<_> = controls.iter().filter(|c| c.negated).map(|c| c.qudit).collect();
    let qudits: Vec<_> = controls.iter().map(|c| c.qudit).collect();
    with_execution_manager(|em| {
        for q in &negated {
            em.apply("x", &[], &[], &[*q], false)?;
        }
        em.apply(name, params, &qudits, &[target], false)?;
        for q in &negated {
            em.apply("x", &[], &[], &[*q], false)?;
        }
        Ok(())
    })
}

// ----------------------------------------------------------------------
// Regions
// ----------------------------------------------------------------------

/// Run `kernel` with `controls` added to every instruction it issues. The
/// region is closed even if `kernel` fails; the kernel's error wins.
pub fn control<R>(kernel: impl FnOnce() -> ManagerResult<R>, controls: &[QuditInfo]) -> ManagerResult<R> {
    let n = with_execution_manager(|em| em.start_ctrl_region(controls))?;
    let result = kernel();
    let closed = with_execution_manager(|em| em.end_ctrl_region(n));
    let value = result?;
    closed?;
    Ok(value)
}

/// Apply the inverse of `kernel`.
///
/// The body's instructions are held back, then conjugate-transposed and
/// replayed in reverse order once `kernel` returns. Qudits the body touches
/// cannot be measured, reset or returned inside it. If `kernel` fails, what
/// it queued so far is still replayed and the kernel's error wins.
pub fn adjoint<R>(kernel: impl FnOnce() -> ManagerResult<R>) -> ManagerResult<R> {
    with_execution_manager(|em| {
        em.start_adjoint_region();
        Ok(())
    })?;
    let result = kernel();
    let closed = with_execution_manager(|em| em.end_adjoint_region());
    let value = result?;
    closed?;
    Ok(value)
}

// ----------------------------------------------------------------------
// Measurement
// ----------------------------------------------------------------------

/// Measure in the Z basis.
pub fn mz(q: QuditInfo) -> ManagerResult<Measurement> {
    mz_named(q, "")
}

/// Measure in the Z basis, recording under `register`.
pub fn mz_named(q: QuditInfo, register: &str) -> ManagerResult<Measurement> {
    with_execution_manager(|em| em.measure_deferred(q, register)).map(into_measurement)
}

/// Measure in the X basis.
pub fn mx(q: QuditInfo) -> ManagerResult<Measurement> {
    h(q)?;
    mz(q)
}

/// Measure in the Y basis.
pub fn my(q: QuditInfo) -> ManagerResult<Measurement> {
    r1(-FRAC_PI_2, q)?;
    h(q)?;
    mz(q)
}

/// Measure every qudit in the Z basis.
pub fn mz_all(qs: &[QuditInfo]) -> ManagerResult<Vec<Measurement>> {
    qs.iter().map(|q| mz(*q)).collect()
}

/// Force `q` into |0⟩.
pub fn reset(q: QuditInfo) -> ManagerResult<()> {
    with_execution_manager(|em| em.reset(q))
}

/// Measure the expectation value of a spin operator.
pub fn measure(op: &SpinOp) -> ManagerResult<SpinMeasureResult> {
    with_execution_manager(|em| em.measure_spin_op(op))
}

/// Pack measured bits into an integer, little-endian (bit i is 2^i). Reads
/// raw outcomes without observing them.
pub fn to_integer(bits: &[Measurement]) -> u64 {
    bits.iter()
        .enumerate()
        .filter(|(_, m)| measurement_bit(m))
        .fold(0, |acc, (i, _)| acc | (1u64 << i))
}

/// Pack a bitstring such as `"0110"` into an integer, little-endian.
pub fn to_integer_from_str(bits: &str) -> Option<u64> {
    bits.chars().enumerate().try_fold(0u64, |acc, (i, c)| match c {
        '0' => Some(acc),
        '1' => Some(acc | (1u64 << i)),
        _ => None,
    })
}
