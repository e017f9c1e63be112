//! Kraus channels and per-gate noise models.
//!
//! A [`KrausChannel`] is a set of operators `K_k` with `Σ K_k† K_k = I`.
//! Matrices are stored row-major, `d × d` with `d = levels^num_targets`.
//! The execution manager never inspects them; they are validated here and
//! interpreted by backends.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{IrError, IrResult};

const COMPLETENESS_TOLERANCE: f64 = 1e-8;

/// A completely positive, trace-preserving noise channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KrausChannel {
    name: String,
    dimension: usize,
    operators: Vec<Vec<Complex64>>,
}

impl KrausChannel {
    /// Build a channel from explicit Kraus operators, checking shapes and
    /// completeness.
    pub fn new(name: impl Into<String>, operators: Vec<Vec<Complex64>>) -> IrResult<Self> {
        let name = name.into();
        let first = operators.first().ok_or_else(|| IrError::InvalidChannel {
            name: name.clone(),
            reason: "no Kraus operators".into(),
        })?;

        let dimension = (first.len() as f64).sqrt().round() as usize;
        if dimension == 0 || dimension * dimension != first.len() {
            return Err(IrError::InvalidChannel {
                name,
                reason: format!("operator of length {} is not square", first.len()),
            });
        }
        if let Some(bad) = operators.iter().find(|k| k.len() != first.len()) {
            return Err(IrError::InvalidChannel {
                name,
                reason: format!(
                    "operators disagree in size ({} vs {})",
                    bad.len(),
                    first.len()
                ),
            });
        }

        // Σ K†K must be the identity.
        for row in 0..dimension {
            for col in 0..dimension {
                let mut sum = Complex64::new(0.0, 0.0);
                for k in &operators {
                    for m in 0..dimension {
                        sum += k[m * dimension + row].conj() * k[m * dimension + col];
                    }
                }
                let expected = if row == col { 1.0 } else { 0.0 };
                if (sum - Complex64::new(expected, 0.0)).norm() > COMPLETENESS_TOLERANCE {
                    return Err(IrError::InvalidChannel {
                        name,
                        reason: "operators are not trace preserving".into(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            dimension,
            operators,
        })
    }

    /// Depolarizing channel on one qubit.
    pub fn depolarizing(p: f64) -> IrResult<Self> {
        check_probability("p", p)?;
        let k0 = scaled(&identity(), (1.0 - p).sqrt());
        let s = (p / 3.0).sqrt();
        Self::new(
            "depolarizing",
            vec![k0, scaled(&pauli_x(), s), scaled(&pauli_y(), s), scaled(&pauli_z(), s)],
        )
    }

    /// Bit-flip channel: applies X with probability `p`.
    pub fn bit_flip(p: f64) -> IrResult<Self> {
        check_probability("p", p)?;
        Self::new(
            "bit_flip",
            vec![scaled(&identity(), (1.0 - p).sqrt()), scaled(&pauli_x(), p.sqrt())],
        )
    }

    /// Phase-flip channel: applies Z with probability `p`.
    pub fn phase_flip(p: f64) -> IrResult<Self> {
        check_probability("p", p)?;
        Self::new(
            "phase_flip",
            vec![scaled(&identity(), (1.0 - p).sqrt()), scaled(&pauli_z(), p.sqrt())],
        )
    }

    /// Amplitude damping (T1 decay).
    pub fn amplitude_damping(gamma: f64) -> IrResult<Self> {
        check_probability("gamma", gamma)?;
        let k0 = real(&[1.0, 0.0, 0.0, (1.0 - gamma).sqrt()]);
        let k1 = real(&[0.0, gamma.sqrt(), 0.0, 0.0]);
        Self::new("amplitude_damping", vec![k0, k1])
    }

    /// Phase damping (dephasing without energy loss).
    pub fn phase_damping(gamma: f64) -> IrResult<Self> {
        check_probability("gamma", gamma)?;
        let k0 = real(&[1.0, 0.0, 0.0, (1.0 - gamma).sqrt()]);
        let k1 = real(&[0.0, 0.0, 0.0, gamma.sqrt()]);
        Self::new("phase_damping", vec![k0, k1])
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Matrix dimension `d` of each operator.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The Kraus operators, row-major.
    pub fn operators(&self) -> &[Vec<Complex64>] {
        &self.operators
    }
}

/// Noise channels attached to gate names, applied by a backend after each
/// matching gate on that gate's targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseModel {
    channels: BTreeMap<String, Vec<KrausChannel>>,
}

impl NoiseModel {
    /// Create an empty noise model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a channel to every application of `gate`.
    pub fn add_channel(&mut self, gate: impl Into<String>, channel: KrausChannel) {
        self.channels.entry(gate.into()).or_default().push(channel);
    }

    /// Builder form of [`NoiseModel::add_channel`].
    pub fn with_channel(mut self, gate: impl Into<String>, channel: KrausChannel) -> Self {
        self.add_channel(gate, channel);
        self
    }

    /// Channels attached to `gate`.
    pub fn channels_for(&self, gate: &str) -> &[KrausChannel] {
        self.channels.get(gate).map_or(&[], Vec::as_slice)
    }

    /// True if no channel is attached to any gate.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn check_probability(name: &'static str, value: f64) -> IrResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(IrError::ProbabilityOutOfRange { name, value })
    }
}

fn real(values: &[f64]) -> Vec<Complex64> {
    values.iter().map(|v| Complex64::new(*v, 0.0)).collect()
}

fn scaled(m: &[Complex64], s: f64) -> Vec<Complex64> {
    m.iter().map(|v| v * s).collect()
}

fn identity() -> Vec<Complex64> {
    real(&[1.0, 0.0, 0.0, 1.0])
}

fn pauli_x() -> Vec<Complex64> {
    real(&[0.0, 1.0, 1.0, 0.0])
}

fn pauli_y() -> Vec<Complex64> {
    vec![
        Complex64::new(0.0, 0.0),
        Complex64::new(0.0, -1.0),
        Complex64::new(0.0, 1.0),
        Complex64::new(0.0, 0.0),
    ]
}

fn pauli_z() -> Vec<Complex64> {
    real(&[1.0, 0.0, 0.0, -1.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_channels_are_valid() {
        for channel in [
            KrausChannel::depolarizing(0.1).unwrap(),
            KrausChannel::bit_flip(0.3).unwrap(),
            KrausChannel::phase_flip(1.0).unwrap(),
            KrausChannel::amplitude_damping(0.25).unwrap(),
            KrausChannel::phase_damping(0.0).unwrap(),
        ] {
            assert_eq!(channel.dimension(), 2);
        }
    }

    #[test]
    fn test_probability_out_of_range() {
        assert!(matches!(
            KrausChannel::bit_flip(1.5),
            Err(IrError::ProbabilityOutOfRange { name: "p", .. })
        ));
    }

    #[test]
    fn test_non_trace_preserving_rejected() {
        let half = real(&[0.5, 0.0, 0.0, 0.5]);
        let err = KrausChannel::new("leaky", vec![half]).unwrap_err();
        assert!(matches!(err, IrError::InvalidChannel { .. }));
    }

    #[test]
    fn test_non_square_rejected() {
        let err = KrausChannel::new("odd", vec![real(&[1.0, 0.0, 0.0])]).unwrap_err();
        assert!(matches!(err, IrError::InvalidChannel { .. }));
    }

    #[test]
    fn test_noise_model_lookup() {
        let model = NoiseModel::new().with_channel("x", KrausChannel::bit_flip(0.1).unwrap());
        assert_eq!(model.channels_for("x").len(), 1);
        assert!(model.channels_for("h").is_empty());
        assert!(!model.is_empty());
    }
}
