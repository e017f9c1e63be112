//! Execution contexts.
//!
//! A context describes one run: its kind, shot count, optional noise model and
//! backend options. The caller creates it and shares it with the manager
//! through a [`ContextHandle`]; the manager only ever holds a clone of the
//! handle and never constructs a context itself. Measurements recorded during
//! the run accumulate in the context so the caller can read them after
//! unbinding.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qxm_ir::{GLOBAL_REGISTER, NoiseModel};

/// Shared handle to a run configuration.
pub type ContextHandle = Arc<Mutex<ExecutionContext>>;

/// Configuration and record of one run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Kind of run, e.g. `"sample"` or `"observe"`.
    pub kind: String,
    /// Number of shots for sampling backends.
    pub shots: usize,
    /// Noise applied by backends that support it.
    pub noise_model: Option<NoiseModel>,
    /// Backend-specific options.
    pub options: serde_json::Map<String, serde_json::Value>,
    /// Outcomes per register, in measurement order.
    pub measurements: BTreeMap<String, Vec<i32>>,
    /// Last observed expectation value.
    pub expectation: Option<f64>,
}

impl ExecutionContext {
    /// Create a context of the given kind with one shot.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            shots: 1,
            noise_model: None,
            options: serde_json::Map::new(),
            measurements: BTreeMap::new(),
            expectation: None,
        }
    }

    /// Set the shot count.
    pub fn with_shots(mut self, shots: usize) -> Self {
        self.shots = shots;
        self
    }

    /// Attach a noise model.
    pub fn with_noise_model(mut self, noise_model: NoiseModel) -> Self {
        self.noise_model = Some(noise_model);
        self
    }

    /// Add a backend option.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Wrap the context in a shareable handle.
    pub fn shared(self) -> ContextHandle {
        Arc::new(Mutex::new(self))
    }

    /// Append an outcome to `register`, or to the global register when the
    /// name is empty.
    pub fn record_measurement(&mut self, register: &str, outcome: i32) {
        let register = if register.is_empty() {
            GLOBAL_REGISTER
        } else {
            register
        };
        self.measurements
            .entry(register.to_string())
            .or_default()
            .push(outcome);
    }

    /// Outcomes recorded under `register`.
    pub fn register(&self, register: &str) -> &[i32] {
        self.measurements
            .get(register)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Lock a context, recovering from a poisoned mutex.
pub fn lock_context(handle: &ContextHandle) -> MutexGuard<'_, ExecutionContext> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
