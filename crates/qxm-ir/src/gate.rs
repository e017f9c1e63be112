//! Built-in instruction names.
//!
//! Every backend must understand these gates. Anything else reaching the
//! execution manager is looked up in the custom-operation registry.
//! Controls are never part of a gate's arity: `x` with one control is a CNOT.

use serde::{Deserialize, Serialize};

/// Gates with known semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinGate {
    /// Pauli-X gate.
    X,
    /// Pauli-Y gate.
    Y,
    /// Pauli-Z gate.
    Z,
    /// Hadamard gate.
    H,
    /// S gate (sqrt(Z)).
    S,
    /// T gate (fourth root of Z).
    T,
    /// Rotation around X axis.
    Rx,
    /// Rotation around Y axis.
    Ry,
    /// Rotation around Z axis.
    Rz,
    /// Phase gate diag(1, e^{iθ}).
    R1,
    /// Universal single-qubit gate U3(θ, φ, λ).
    U3,
    /// SWAP gate.
    Swap,
    /// exp(iθ·P) for a Pauli word P spanning all targets.
    ExpPauli,
}

impl BuiltinGate {
    /// All built-in gates.
    pub const ALL: [BuiltinGate; 13] = [
        BuiltinGate::X,
        BuiltinGate::Y,
        BuiltinGate::Z,
        BuiltinGate::H,
        BuiltinGate::S,
        BuiltinGate::T,
        BuiltinGate::Rx,
        BuiltinGate::Ry,
        BuiltinGate::Rz,
        BuiltinGate::R1,
        BuiltinGate::U3,
        BuiltinGate::Swap,
        BuiltinGate::ExpPauli,
    ];

    /// Resolve a gate by its instruction name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.name() == name)
    }

    /// Instruction name of this gate.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinGate::X => "x",
            BuiltinGate::Y => "y",
            BuiltinGate::Z => "z",
            BuiltinGate::H => "h",
            BuiltinGate::S => "s",
            BuiltinGate::T => "t",
            BuiltinGate::Rx => "rx",
            BuiltinGate::Ry => "ry",
            BuiltinGate::Rz => "rz",
            BuiltinGate::R1 => "r1",
            BuiltinGate::U3 => "u3",
            BuiltinGate::Swap => "swap",
            BuiltinGate::ExpPauli => "exp_pauli",
        }
    }

    /// Number of rotation parameters.
    #[inline]
    pub fn num_params(&self) -> usize {
        match self {
            BuiltinGate::Rx
            | BuiltinGate::Ry
            | BuiltinGate::Rz
            | BuiltinGate::R1
            | BuiltinGate::ExpPauli => 1,
            BuiltinGate::U3 => 3,
            _ => 0,
        }
    }

    /// Number of target qudits, or `None` when the arity follows the
    /// operator payload (`exp_pauli`).
    #[inline]
    pub fn num_targets(&self) -> Option<usize> {
        match self {
            BuiltinGate::Swap => Some(2),
            BuiltinGate::ExpPauli => None,
            _ => Some(1),
        }
    }

    /// True for gates that equal their own adjoint.
    pub fn is_self_adjoint(&self) -> bool {
        matches!(
            self,
            BuiltinGate::X | BuiltinGate::Y | BuiltinGate::Z | BuiltinGate::H | BuiltinGate::Swap
        )
    }
}

impl std::fmt::Display for BuiltinGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
