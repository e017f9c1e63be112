//! Pauli words and spin operators.
//!
//! A spin operator is a sum of weighted Pauli strings:
//!
//!   H = Σ_k  c_k · P_k
//!
//! where each P_k is a tensor product of single-qubit Pauli operators
//! (I, X, Y, Z) keyed by qudit id and c_k ∈ ℝ.
//!
//! [`PauliWord`] is the positional form used as the operator payload of an
//! `exp_pauli` instruction: its i-th letter acts on the i-th target.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, IrResult};

/// Single-qubit Pauli operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PauliOp {
    /// Identity.
    I,
    /// Pauli-X.
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z.
    Z,
}

impl PauliOp {
    /// Parse a single letter.
    pub fn from_char(c: char) -> IrResult<Self> {
        match c.to_ascii_uppercase() {
            'I' => Ok(PauliOp::I),
            'X' => Ok(PauliOp::X),
            'Y' => Ok(PauliOp::Y),
            'Z' => Ok(PauliOp::Z),
            other => Err(IrError::InvalidPauli(other)),
        }
    }

    /// The letter for this operator.
    pub fn as_char(&self) -> char {
        match self {
            PauliOp::I => 'I',
            PauliOp::X => 'X',
            PauliOp::Y => 'Y',
            PauliOp::Z => 'Z',
        }
    }
}

/// A positional Pauli word, e.g. `XZY`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PauliWord {
    ops: Vec<PauliOp>,
}

impl PauliWord {
    /// Parse a word such as `"XXIZ"`.
    pub fn parse(word: &str) -> IrResult<Self> {
        let ops = word
            .chars()
            .map(PauliOp::from_char)
            .collect::<IrResult<Vec<_>>>()?;
        Ok(Self { ops })
    }

    /// Build a word from its letters.
    pub fn from_ops(ops: impl IntoIterator<Item = PauliOp>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
        }
    }

    /// The letters, in target order.
    pub fn ops(&self) -> &[PauliOp] {
        &self.ops
    }

    /// Number of letters.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if the word has no letters.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True if every letter is the identity (including the empty word).
    pub fn is_identity(&self) -> bool {
        self.ops.iter().all(|op| *op == PauliOp::I)
    }
}

impl fmt::Display for PauliWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.ops {
            write!(f, "{}", op.as_char())?;
        }
        Ok(())
    }
}

/// A tensor product of Pauli operators on qudit ids.
///
/// Stored as a sorted `Vec<(qudit_id, PauliOp)>` with identity factors
/// omitted. Qudits not listed are implicitly I.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PauliString {
    ops: Vec<(usize, PauliOp)>,
}

impl PauliString {
    /// Construct from `(qudit_id, op)` pairs. Identity factors are dropped.
    pub fn from_ops(ops: impl IntoIterator<Item = (usize, PauliOp)>) -> Self {
        let mut v: Vec<(usize, PauliOp)> = ops
            .into_iter()
            .filter(|(_, op)| *op != PauliOp::I)
            .collect();
        v.sort_by_key(|(q, _)| *q);
        Self { ops: v }
    }

    /// Interpret a positional word with letter i acting on qudit id i.
    pub fn from_word(word: &PauliWord) -> Self {
        Self::from_ops(word.ops().iter().copied().enumerate())
    }

    /// The non-identity factors, sorted by qudit id.
    pub fn ops(&self) -> &[(usize, PauliOp)] {
        &self.ops
    }

    /// True if there are no non-identity factors.
    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Highest qudit id referenced.
    pub fn max_qudit(&self) -> Option<usize> {
        self.ops.last().map(|(q, _)| *q)
    }

    /// Compact label such as `Z0Z1`, or `I` for the identity.
    pub fn label(&self) -> String {
        if self.ops.is_empty() {
            return "I".to_string();
        }
        self.ops
            .iter()
            .map(|(q, op)| format!("{}{}", op.as_char(), q))
            .collect()
    }
}

/// A single weighted Pauli term: `coeff · pauli`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinTerm {
    /// Real coefficient.
    pub coeff: f64,
    /// The Pauli string.
    pub pauli: PauliString,
}

impl SpinTerm {
    /// Create a new term.
    pub fn new(coeff: f64, pauli: PauliString) -> Self {
        Self { coeff, pauli }
    }

    /// Shorthand: single-qudit Z term.
    pub fn z(qudit: usize, coeff: f64) -> Self {
        Self::new(coeff, PauliString::from_ops([(qudit, PauliOp::Z)]))
    }

    /// Shorthand: single-qudit X term.
    pub fn x(qudit: usize, coeff: f64) -> Self {
        Self::new(coeff, PauliString::from_ops([(qudit, PauliOp::X)]))
    }
}

/// A weighted sum of Pauli strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpinOp {
    terms: Vec<SpinTerm>,
}

impl SpinOp {
    /// Build from explicit terms.
    pub fn from_terms(terms: Vec<SpinTerm>) -> Self {
        Self { terms }
    }

    /// The identity operator with coefficient 1.
    pub fn identity() -> Self {
        Self {
            terms: vec![SpinTerm::new(1.0, PauliString::default())],
        }
    }

    /// Build from `(coeff, word)` pairs with positional words.
    pub fn parse_terms(terms: &[(f64, &str)]) -> IrResult<Self> {
        let terms = terms
            .iter()
            .map(|(coeff, word)| {
                let word = PauliWord::parse(word)?;
                Ok(SpinTerm::new(*coeff, PauliString::from_word(&word)))
            })
            .collect::<IrResult<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// Add a term.
    pub fn add_term(&mut self, term: SpinTerm) {
        self.terms.push(term);
    }

    /// The terms.
    pub fn terms(&self) -> &[SpinTerm] {
        &self.terms
    }

    /// Number of terms.
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// Highest qudit id referenced by any term.
    pub fn max_qudit(&self) -> Option<usize> {
        self.terms.iter().filter_map(|t| t.pauli.max_qudit()).max()
    }
}
