//! Kernels run through the thread-local manager against the statevector
//! backend. Every test runs on its own thread, so each gets a fresh manager
//! and a fresh qudit pool.

use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Once;

use num_complex::Complex64;
use qxm_adapter_sim::BACKEND_NAME;
use qxm_ir::{KrausChannel, NoiseModel, SpinOp, SpinTerm};
use qxm_runtime::qis::{self, Control};
use qxm_runtime::resolution::activate_execution_manager;
use qxm_runtime::{
    BackendConfig, ExecutionContext, InitialState, LeakPolicy, ManagerError, ManagerResult,
    MatrixOperation, StateBuffer, lock_context, register_operation, with_execution_manager,
};

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        qxm_adapter_sim::register();
        let config = BackendConfig::new(BACKEND_NAME).with_extra("seed", serde_json::json!(2024));
        activate_execution_manager(config, LeakPolicy::Warn).unwrap();
    });
}

fn bits(qs: &[qxm_ir::QuditInfo]) -> ManagerResult<Vec<i32>> {
    Ok(qis::mz_all(qs)?.iter().map(|m| m.to_int()).collect())
}

#[test]
fn test_bell_pairs_agree() {
    setup();
    for _ in 0..20 {
        let q = qis::qalloc_n(2).unwrap();
        qis::h(q[0]).unwrap();
        qis::cx(q[0], q[1]).unwrap();
        let b = bits(&q).unwrap();
        assert_eq!(b[0], b[1]);
        qis::qfree_all(&q).unwrap();
    }
    assert!(!with_execution_manager(|em| Ok(em.memory_leaked())).unwrap());
}

#[test]
fn test_ghz_through_control_region() {
    setup();
    let q = qis::qalloc_n(3).unwrap();
    qis::h(q[0]).unwrap();
    qis::control(
        || {
            qis::x(q[1])?;
            qis::x(q[2])
        },
        &[q[0]],
    )
    .unwrap();
    let b = bits(&q).unwrap();
    assert!(b == [0, 0, 0] || b == [1, 1, 1], "got {b:?}");
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_adjoint_region_inverts_rotation() {
    setup();
    let q = qis::qalloc().unwrap();
    qis::rx(0.7, q).unwrap();
    qis::ry(-1.3, q).unwrap();
    qis::adjoint(|| {
        qis::rx(0.7, q)?;
        qis::ry(-1.3, q)
    })
    .unwrap();
    assert_eq!(qis::mz(q).unwrap().to_int(), 0);
    qis::qfree(q).unwrap();
}

#[test]
fn test_adjoint_of_non_commuting_body_is_its_inverse() {
    setup();
    let q = qis::qalloc().unwrap();
    // S·H takes |0⟩ to |+i⟩; its inverse must bring it back exactly.
    for _ in 0..50 {
        qis::h(q).unwrap();
        qis::s(q).unwrap();
        qis::adjoint(|| {
            qis::h(q)?;
            qis::s(q)
        })
        .unwrap();
        assert_eq!(qis::mz(q).unwrap().to_int(), 0);
    }
    qis::qfree(q).unwrap();
}

#[test]
fn test_adjoint_s_is_sdg() {
    setup();
    let q = qis::qalloc().unwrap();
    qis::h(q).unwrap();
    qis::s(q).unwrap();
    qis::adjoint(|| qis::s(q)).unwrap();
    qis::h(q).unwrap();
    assert_eq!(qis::mz(q).unwrap().to_int(), 0);

    qis::h(q).unwrap();
    qis::t(q).unwrap();
    qis::tdg(q).unwrap();
    qis::h(q).unwrap();
    assert_eq!(qis::mz(q).unwrap().to_int(), 0);
    qis::qfree(q).unwrap();
}

#[test]
fn test_nested_adjoint_cancels() {
    setup();
    let q = qis::qalloc().unwrap();
    qis::h(q).unwrap();
    qis::adjoint(|| qis::adjoint(|| qis::t(q))).unwrap();
    qis::tdg(q).unwrap();
    qis::h(q).unwrap();
    assert_eq!(qis::mz(q).unwrap().to_int(), 0);
    qis::qfree(q).unwrap();
}

#[test]
fn test_exp_pauli_flips() {
    setup();
    let q = qis::qalloc_n(2).unwrap();
    // exp(iπ/2 · XX) = i·XX
    qis::exp_pauli(FRAC_PI_2, &q, "XX").unwrap();
    assert_eq!(bits(&q).unwrap(), [1, 1]);
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_exp_pauli_rejects_wrong_word_length() {
    setup();
    let q = qis::qalloc_n(2).unwrap();
    let err = qis::exp_pauli(0.1, &q, "X").unwrap_err();
    assert!(err.is_protocol_violation());
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_custom_operation_under_control() {
    setup();
    register_operation(
        "sim_flip",
        MatrixOperation::from_real(&[0.0, 1.0, 1.0, 0.0]).unwrap(),
    );
    let q = qis::qalloc_n(2).unwrap();
    qis::custom("sim_flip", &[], &[], &[q[0]]).unwrap();
    // Control in |1⟩, so the target flips.
    qis::control(|| qis::custom("sim_flip", &[], &[], &[q[1]]), &[q[0]]).unwrap();
    assert_eq!(bits(&q).unwrap(), [1, 1]);
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_negated_control() {
    setup();
    let q = qis::qalloc_n(2).unwrap();
    qis::controlled("x", &[], &[Control::neg(q[0])], q[1]).unwrap();
    assert_eq!(bits(&q).unwrap(), [0, 1]);
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_basis_measurements() {
    setup();
    let q = qis::qalloc().unwrap();
    qis::h(q).unwrap();
    assert_eq!(qis::mx(q).unwrap().to_int(), 0);

    qis::reset(q).unwrap();
    qis::h(q).unwrap();
    qis::s(q).unwrap();
    assert_eq!(qis::my(q).unwrap().to_int(), 0);
    qis::qfree(q).unwrap();
}

#[test]
fn test_reset_returns_to_ground() {
    setup();
    let q = qis::qalloc().unwrap();
    qis::u3(PI, 0.0, PI, q).unwrap();
    qis::reset(q).unwrap();
    assert_eq!(qis::mz(q).unwrap().to_int(), 0);
    qis::qfree(q).unwrap();
}

#[test]
fn test_to_integer_is_little_endian() {
    setup();
    let q = qis::qalloc_n(3).unwrap();
    qis::x(q[0]).unwrap();
    qis::x(q[2]).unwrap();
    let m = qis::mz_all(&q).unwrap();
    assert_eq!(qis::to_integer(&m), 5);
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_context_records_and_drives_noise() {
    setup();
    let noise = NoiseModel::new().with_channel("x", KrausChannel::bit_flip(1.0).unwrap());
    let ctx = ExecutionContext::new("sample").with_noise_model(noise).shared();
    with_execution_manager(|em| em.set_execution_context(ctx.clone())).unwrap();

    let q = qis::qalloc().unwrap();
    // The certain bit flip undoes every x.
    qis::x(q).unwrap();
    assert_eq!(qis::mz_named(q, "r").unwrap().to_int(), 0);
    qis::h(q).unwrap();
    qis::h(q).unwrap();
    qis::mz(q).unwrap();
    qis::qfree(q).unwrap();

    with_execution_manager(|em| {
        em.reset_execution_context();
        Ok(())
    })
    .unwrap();
    let ctx = lock_context(&ctx);
    assert_eq!(ctx.register("r"), &[0]);
    assert_eq!(ctx.register(qxm_ir::GLOBAL_REGISTER), &[0]);
}

#[test]
fn test_spin_measurement_uses_context_shots() {
    setup();
    let ctx = ExecutionContext::new("observe").with_shots(50).shared();
    with_execution_manager(|em| em.set_execution_context(ctx.clone())).unwrap();

    let q = qis::qalloc_n(2).unwrap();
    qis::x(q[1]).unwrap();
    let h = SpinOp::from_terms(vec![
        SpinTerm::z(q[0].id, 0.5),
        SpinTerm::z(q[1].id, 2.0),
    ]);
    let result = qis::measure(&h).unwrap();
    assert!((result.expectation - (0.5 - 2.0)).abs() < 1e-10);
    let label = format!("Z{}", q[1].id);
    assert_eq!(result.samples.register(&label).unwrap().get("1"), 50);
    assert_eq!(lock_context(&ctx).expectation, Some(result.expectation));

    qis::qfree_all(&q).unwrap();
    with_execution_manager(|em| {
        em.reset_execution_context();
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_spin_measurement_on_returned_qudit_fails() {
    setup();
    let q = qis::qalloc().unwrap();
    qis::qfree(q).unwrap();
    let h = SpinOp::from_terms(vec![SpinTerm::z(q.id, 1.0)]);
    assert!(qis::measure(&h).unwrap_err().is_protocol_violation());
}

#[test]
fn test_initialize_state_from_buffer() {
    setup();
    let q = qis::qalloc_n(2).unwrap();
    // |q0 q1⟩ = |1 0⟩ → index 1 little-endian.
    let zero = Complex64::new(0.0, 0.0);
    let amplitudes = [zero, Complex64::new(1.0, 0.0), zero, zero];
    with_execution_manager(|em| {
        em.initialize_state(&q, InitialState::Buffer(StateBuffer::F64(&amplitudes)))
    })
    .unwrap();
    assert_eq!(bits(&q).unwrap(), [1, 0]);
    qis::qfree_all(&q).unwrap();
}

#[test]
fn test_qutrits_are_unsupported() {
    setup();
    let err = qis::qalloc_qudit(3).unwrap_err();
    assert!(matches!(err, ManagerError::Unsupported(_)));
    assert_eq!(with_execution_manager(|em| Ok(em.num_live_qudits())).unwrap(), 0);
}

#[test]
fn test_ids_are_recycled() {
    setup();
    let a = qis::qalloc().unwrap();
    let b = qis::qalloc().unwrap();
    qis::x(b).unwrap();
    qis::qfree(a).unwrap();
    let c = qis::qalloc().unwrap();
    assert_eq!(c.id, a.id);
    // The recycled qubit starts fresh; b keeps its state.
    assert_eq!(bits(&[c, b]).unwrap(), [0, 1]);
    qis::qfree_all(&[b, c]).unwrap();
}
