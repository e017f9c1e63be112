//! A backend that accepts everything and simulates nothing.
//!
//! Measurements always return `0`; spin operators always report an
//! expectation of `0.0`. The backend name comes from the configuration so
//! tests can tell which factory built a manager.

#![allow(dead_code)]

use qxm_ir::{KrausChannel, QuditInfo, SpinMeasureResult, SpinOp};
use qxm_runtime::{
    BackendConfig, BackendFactory, ExecutionBackend, InitialState, Instruction, ManagerResult,
};

pub struct NullBackend {
    name: String,
    pub applied: usize,
}

impl NullBackend {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            applied: 0,
        }
    }
}

impl ExecutionBackend for NullBackend {
    fn name(&self) -> &str {
        &self.name
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

    fn apply(&mut self, _: &Instruction) -> ManagerResult<()> {
        self.applied += 1;
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

impl BackendFactory for NullBackend {
    fn from_config(config: &BackendConfig) -> ManagerResult<Self> {
        Ok(Self::named(&config.name))
    }
}
