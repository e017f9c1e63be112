//! Measurement records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Register name under which anonymous measurements are recorded.
pub const GLOBAL_REGISTER: &str = "__global__";

/// Histogram of observed bitstrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    counts: BTreeMap<String, u64>,
}

impl Counts {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` observations of `bitstring`.
    pub fn insert(&mut self, bitstring: impl Into<String>, count: u64) {
        *self.counts.entry(bitstring.into()).or_insert(0) += count;
    }

    /// Observations of `bitstring` (zero if never seen).
    pub fn get(&self, bitstring: &str) -> u64 {
        self.counts.get(bitstring).copied().unwrap_or(0)
    }

    /// Total number of observations.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The most frequent bitstring. Ties resolve to the lexicographically
    /// smallest string.
    pub fn most_frequent(&self) -> Option<(&str, u64)> {
        self.counts
            .iter()
            .fold(None, |best: Option<(&str, u64)>, (k, v)| match best {
                Some((_, bv)) if bv >= *v => best,
                _ => Some((k.as_str(), *v)),
            })
    }

    /// Iterate `(bitstring, count)` in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Per-register histograms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResult {
    registers: BTreeMap<String, Counts>,
}

impl SampleResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to a register's histogram, creating it if needed.
    pub fn register_mut(&mut self, name: &str) -> &mut Counts {
        self.registers.entry(name.to_string()).or_default()
    }

    /// A register's histogram.
    pub fn register(&self, name: &str) -> Option<&Counts> {
        self.registers.get(name)
    }

    /// Register names in lexicographic order.
    pub fn register_names(&self) -> impl Iterator<Item = &str> {
        self.registers.keys().map(String::as_str)
    }

    /// True if no register has been recorded.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Outcome of measuring a spin operator: the combined expectation value
/// plus the raw per-term record, keyed by term label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpinMeasureResult {
    /// ⟨H⟩ = Σ c_k ⟨P_k⟩.
    pub expectation: f64,
    /// Sampled histograms, one register per term.
    pub samples: SampleResult,
}
