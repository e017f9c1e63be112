//! Benchmarks for instruction dispatch overhead
//!
//! Run with: cargo bench -p qxm-runtime

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use qxm_ir::{KrausChannel, QuditInfo, SpinMeasureResult, SpinOp};
use qxm_runtime::{
    ExecutionBackend, ExecutionManager, InitialState, Instruction, ManagerResult, MatrixOperation,
    register_operation,
};
use std::f64::consts::PI;

/// Backend that only counts instructions, so the numbers are pure manager
/// overhead.
struct CountingBackend {
    applied: u64,
}

impl ExecutionBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn allocate_qudit(&mut self, _: QuditInfo) -> ManagerResult<()> {
        Ok(())
    }

    fn deallocate_qudit(&mut self, _: QuditInfo) -> ManagerResult<()> {
        Ok(())
    }

    fn initialize_state(&mut self, _: &[QuditInfo], _: InitialState<'_>) -> ManagerResult<()> {
        Ok(())
    }

    fn apply(&mut self, instruction: &Instruction) -> ManagerResult<()> {
        self.applied += black_box(instruction.controls.len() as u64 + 1);
        Ok(())
    }

    fn apply_noise(&mut self, _: &KrausChannel, _: &[QuditInfo]) -> ManagerResult<()> {
        Ok(())
    }

    fn reset(&mut self, _: QuditInfo) -> ManagerResult<()> {
        Ok(())
    }

    fn measure(&mut self, _: QuditInfo, _: &str) -> ManagerResult<i32> {
        Ok(0)
    }

    fn measure_spin_op(&mut self, _: &SpinOp) -> ManagerResult<SpinMeasureResult> {
        Ok(SpinMeasureResult::default())
    }

    fn synchronize(&mut self) -> ManagerResult<()> {
        Ok(())
    }
}

fn manager() -> ExecutionManager {
    ExecutionManager::from_backend(CountingBackend { applied: 0 })
}

/// Benchmark built-in gate dispatch
fn bench_builtin_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("builtin_dispatch");

    group.bench_function("h", |b| {
        let mut em = manager();
        let q = em.allocate_qudit(2).unwrap();
        b.iter(|| em.apply(black_box("h"), &[], &[], &[q], false).unwrap());
    });

    group.bench_function("rx", |b| {
        let mut em = manager();
        let q = em.allocate_qudit(2).unwrap();
        b.iter(|| {
            em.apply(black_box("rx"), &[black_box(PI / 4.0)], &[], &[q], false)
                .unwrap();
        });
    });

    group.bench_function("cx", |b| {
        let mut em = manager();
        let qs = em.allocate_qudits(2, 2).unwrap();
        b.iter(|| em.apply(black_box("x"), &[], &qs[..1], &qs[1..], false).unwrap());
    });

    group.finish();
}

/// Benchmark dispatch under nested control regions
fn bench_region_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_dispatch");

    for depth in &[1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("control_frames", depth), depth, |b, &n| {
            let mut em = manager();
            let qs = em.allocate_qudits(n + 1, 2).unwrap();
            for q in &qs[..n] {
                em.start_ctrl_region(std::slice::from_ref(q)).unwrap();
            }
            b.iter(|| em.apply(black_box("t"), &[], &[], &qs[n..], false).unwrap());
        });
    }

    group.bench_function("adjoint_replay", |b| {
        let mut em = manager();
        let q = em.allocate_qudit(2).unwrap();
        b.iter(|| {
            em.start_adjoint_region();
            em.apply(black_box("t"), &[], &[], &[q], false).unwrap();
            em.apply(black_box("rx"), &[0.3], &[], &[q], false).unwrap();
            em.end_adjoint_region().unwrap();
        });
    });

    group.finish();
}

/// Benchmark custom operation lookup through the shared registry
fn bench_custom_dispatch(c: &mut Criterion) {
    register_operation(
        "bench_flip",
        MatrixOperation::from_real(&[0.0, 1.0, 1.0, 0.0]).unwrap(),
    );

    c.bench_function("custom_dispatch", |b| {
        let mut em = manager();
        let q = em.allocate_qudit(2).unwrap();
        b.iter(|| em.apply(black_box("bench_flip"), &[], &[], &[q], false).unwrap());
    });
}

/// Benchmark allocate/return cycles
fn bench_allocation(c: &mut Criterion) {
    c.bench_function("allocate_return", |b| {
        let mut em = manager();
        b.iter(|| {
            let q = em.allocate_qudit(2).unwrap();
            em.return_qudit(black_box(q)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_builtin_dispatch,
    bench_region_dispatch,
    bench_custom_dispatch,
    bench_allocation
);
criterion_main!(benches);
