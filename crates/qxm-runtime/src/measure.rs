//! Deferred measurement results.
//!
//! In library mode a measurement returns a [`MeasureResult`] instead of a
//! plain boolean. Reading it as an integer is side-effect free; observing it
//! as a truth value goes through a process-wide conversion hook, which lets a
//! backend postpone the collapse decision until the value drives a branch.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::debug;

/// Decision hook: `(raw code, unique id) -> truth value`.
pub type BoolConversionHook = dyn Fn(i32, usize) -> bool + Send + Sync;

static BOOL_CONVERSION_HOOK: LazyLock<RwLock<Option<Arc<BoolConversionHook>>>> =
    LazyLock::new(|| RwLock::new(None));

static NEXT_RESULT_ID: AtomicUsize = AtomicUsize::new(0);

/// A result id never handed out before in this process.
pub(crate) fn next_result_id() -> usize {
    NEXT_RESULT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Install the process-wide boolean-conversion hook.
pub fn set_bool_conversion_hook(hook: impl Fn(i32, usize) -> bool + Send + Sync + 'static) {
    debug!("Installing measurement bool-conversion hook");
    *BOOL_CONVERSION_HOOK
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
}

/// Restore the default hook (`raw != 0`).
pub fn reset_bool_conversion_hook() {
    *BOOL_CONVERSION_HOOK
        .write()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

/// Run the installed hook, or the default when none is installed.
pub fn measure_result_bool_conversion(raw: i32, unique_id: usize) -> bool {
    // Clone out of the lock so a hook may itself touch the hook table.
    let hook = BOOL_CONVERSION_HOOK
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match hook {
        Some(hook) => hook(raw, unique_id),
        None => raw != 0,
    }
}

/// A measurement outcome with its identity.
///
/// Results produced by an execution manager carry ids that are unique across
/// every manager and thread in the process, so a hook can key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasureResult {
    raw: i32,
    unique_id: usize,
}

impl MeasureResult {
    /// Wrap a raw outcome.
    pub fn new(raw: i32, unique_id: usize) -> Self {
        Self { raw, unique_id }
    }

    /// The raw observed code. No side effect.
    pub fn to_int(&self) -> i32 {
        self.raw
    }

    /// The identity assigned at measurement time.
    pub fn unique_id(&self) -> usize {
        self.unique_id
    }

    /// Observe as a truth value. Invokes the conversion hook exactly once.
    pub fn observe(&self) -> bool {
        measure_result_bool_conversion(self.raw, self.unique_id)
    }
}

impl From<MeasureResult> for i32 {
    fn from(result: MeasureResult) -> Self {
        result.raw
    }
}

impl fmt::Display for MeasureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// What kernel-side measurement helpers return.
#[cfg(feature = "library-mode")]
pub type Measurement = MeasureResult;

/// What kernel-side measurement helpers return.
#[cfg(not(feature = "library-mode"))]
pub type Measurement = bool;

#[cfg(feature = "library-mode")]
pub(crate) fn into_measurement(result: MeasureResult) -> Measurement {
    result
}

#[cfg(not(feature = "library-mode"))]
pub(crate) fn into_measurement(result: MeasureResult) -> Measurement {
    result.to_int() != 0
}

/// Bit value of a measurement without triggering the conversion hook.
#[cfg(feature = "library-mode")]
pub(crate) fn measurement_bit(m: &Measurement) -> bool {
    m.to_int() != 0
}

#[cfg(not(feature = "library-mode"))]
pub(crate) fn measurement_bit(m: &Measurement) -> bool {
    *m
}
