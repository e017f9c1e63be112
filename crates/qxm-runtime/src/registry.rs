//! Process-wide custom operation registry.
//!
//! The [`CustomOperationRegistry`] maps operation names to user-defined
//! unitaries. A single instance ([`CustomOperationRegistry::global`]) is shared
//! by every execution manager on every thread; it is the only manager-facing
//! state that crosses threads, so it carries its own lock.

use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use num_complex::Complex64;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ManagerError, ManagerResult};

/// A user-defined unitary, dispatched by name.
pub trait CustomOperation: Send + Sync {
    /// Row-major `d × d` unitary for the given parameters, where `d` is the
    /// product of the target qudits' levels (`2^num_targets()` on qubits).
    /// Target `k` is digit `k` of the matrix index, least significant first.
    fn unitary(&self, params: &[f64]) -> Vec<Complex64>;

    /// Number of target qudits the unitary acts on.
    fn num_targets(&self) -> usize;
}

/// A constant-matrix custom operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixOperation {
    matrix: Vec<Complex64>,
    num_targets: usize,
}

impl MatrixOperation {
    /// Wrap a row-major qubit unitary. Its side length must be a power of two.
    /// Target `k` is bit `k` of the matrix index.
    pub fn new(matrix: Vec<Complex64>) -> ManagerResult<Self> {
        let dim = (matrix.len() as f64).sqrt().round() as usize;
        if dim < 2 || dim * dim != matrix.len() || !dim.is_power_of_two() {
            return Err(ManagerError::protocol(format!(
                "custom operation matrix of length {} is not a 2^n × 2^n matrix",
                matrix.len()
            )));
        }
        Ok(Self {
            num_targets: dim.trailing_zeros() as usize,
            matrix,
        })
    }

    /// Build from real entries.
    pub fn from_real(entries: &[f64]) -> ManagerResult<Self> {
        Self::new(entries.iter().map(|v| Complex64::new(*v, 0.0)).collect())
    }
}

impl CustomOperation for MatrixOperation {
    fn unitary(&self, _params: &[f64]) -> Vec<Complex64> {
        self.matrix.clone()
    }

    fn num_targets(&self) -> usize {
        self.num_targets
    }
}

type UnitaryFn = dyn Fn(&[f64]) -> Vec<Complex64> + Send + Sync;

/// A parameterized custom operation backed by a closure.
pub struct FnOperation {
    build: Box<UnitaryFn>,
    num_targets: usize,
}

impl FnOperation {
    /// Wrap a closure producing the unitary for given parameters.
    pub fn new(
        num_targets: usize,
        build: impl Fn(&[f64]) -> Vec<Complex64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            build: Box::new(build),
            num_targets,
        }
    }
}

impl CustomOperation for FnOperation {
    fn unitary(&self, params: &[f64]) -> Vec<Complex64> {
        (self.build)(params)
    }

    fn num_targets(&self) -> usize {
        self.num_targets
    }
}

impl fmt::Debug for FnOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation")
            .field("num_targets", &self.num_targets)
            .finish_non_exhaustive()
    }
}

/// Name → operation mapping guarded by a reader/writer lock.
#[derive(Default)]
pub struct CustomOperationRegistry {
    operations: RwLock<FxHashMap<String, Arc<dyn CustomOperation>>>,
}

static GLOBAL_REGISTRY: LazyLock<CustomOperationRegistry> =
    LazyLock::new(CustomOperationRegistry::new);

impl CustomOperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static CustomOperationRegistry {
        &GLOBAL_REGISTRY
    }

    /// Register `operation` under `name`, replacing any previous definition.
    pub fn register(&self, name: impl Into<String>, operation: Arc<dyn CustomOperation>) {
        let name = name.into();
        debug!("Registering custom operation: {}", name);
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, operation);
    }

    /// Remove every registered operation.
    pub fn clear(&self) {
        debug!("Clearing custom operation registry");
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Look up an operation by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn CustomOperation>> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Register a custom operation in the process-wide registry.
pub fn register_operation(name: impl Into<String>, operation: impl CustomOperation + 'static) {
    CustomOperationRegistry::global().register(name, Arc::new(operation));
}

/// Empty the process-wide registry.
pub fn clear_registered_operations() {
    CustomOperationRegistry::global().clear();
}

/// Look up a custom operation in the process-wide registry.
pub fn lookup_operation(name: &str) -> Option<Arc<dyn CustomOperation>> {
    CustomOperationRegistry::global().lookup(name)
}
