//! Statevector simulation engine.
//!
//! Qubit `k` is bit `k` of the amplitude index. Every gate takes a control
//! mask: it acts only on basis states whose masked bits are all set.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::PI;

use qxm_ir::{BuiltinGate, PauliOp, PauliWord};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// A statevector representing a quantum state.
#[derive(Debug, Clone)]
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    /// Number of qubits.
    num_qubits: usize,
}

impl Default for Statevector {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let size = 1usize << num_qubits;
        let mut amplitudes = vec![ZERO; size];
        amplitudes[0] = ONE;
        Self {
            amplitudes,
            num_qubits,
        }
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// The amplitudes.
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Replace the amplitudes. The length must be `2^num_qubits`.
    pub fn set_amplitudes(&mut self, amplitudes: Vec<Complex64>) {
        debug_assert_eq!(amplitudes.len(), 1usize << self.num_qubits);
        self.amplitudes = amplitudes;
    }

    /// Append a qubit in |0⟩ as the new most significant bit. Returns its
    /// index.
    pub fn add_qubit(&mut self) -> usize {
        self.amplitudes.resize(self.amplitudes.len() * 2, ZERO);
        self.num_qubits += 1;
        self.num_qubits - 1
    }

    /// Remove `qubit`, which must be in a basis state after
    /// [`Statevector::measure`] or [`Statevector::reset`]. Higher qubits
    /// shift down by one.
    pub fn remove_qubit(&mut self, qubit: usize, value: usize) {
        let mask = 1usize << qubit;
        let low = mask - 1;
        let kept: Vec<Complex64> = (0..self.amplitudes.len() / 2)
            .map(|i| {
                let full = ((i & !low) << 1) | (i & low) | (value * mask);
                self.amplitudes[full]
            })
            .collect();
        self.amplitudes = kept;
        self.num_qubits -= 1;
    }

    /// Squared norm.
    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes.iter().map(Complex64::norm_sqr).sum()
    }

    /// Apply a built-in gate.
    pub fn apply_gate(
        &mut self,
        gate: BuiltinGate,
        params: &[f64],
        targets: &[usize],
        cmask: usize,
        adjoint: bool,
        word: &PauliWord,
    ) {
        let sign = if adjoint { -1.0 } else { 1.0 };
        let p = |i: usize| params.get(i).copied().unwrap_or_default();
        match gate {
            BuiltinGate::X => self.apply_x(targets[0], cmask),
            BuiltinGate::Y => self.apply_y(targets[0], cmask),
            BuiltinGate::Z => self.apply_phase(targets[0], PI, cmask),
            BuiltinGate::H => self.apply_h(targets[0], cmask),
            BuiltinGate::S => self.apply_phase(targets[0], sign * PI / 2.0, cmask),
            BuiltinGate::T => self.apply_phase(targets[0], sign * PI / 4.0, cmask),
            BuiltinGate::R1 => self.apply_phase(targets[0], sign * p(0), cmask),
            BuiltinGate::Rx => self.apply_rx(targets[0], sign * p(0), cmask),
            BuiltinGate::Ry => self.apply_ry(targets[0], sign * p(0), cmask),
            BuiltinGate::Rz => self.apply_rz(targets[0], sign * p(0), cmask),
            BuiltinGate::U3 => {
                // U3(θ, φ, λ)† = U3(-θ, -λ, -φ)
                let (theta, phi, lambda) = if adjoint {
                    (-p(0), -p(2), -p(1))
                } else {
                    (p(0), p(1), p(2))
                };
                self.apply_u(targets[0], theta, phi, lambda, cmask);
            }
            BuiltinGate::Swap => self.apply_swap(targets[0], targets[1], cmask),
            BuiltinGate::ExpPauli => {
                let factors: Vec<_> = targets.iter().copied().zip(word.ops().iter().copied()).collect();
                self.apply_exp_pauli(sign * p(0), &factors, cmask);
            }
        }
    }

    // =========================================================================
    // Single-qubit gate implementations
    // =========================================================================

    fn apply_x(&mut self, qubit: usize, cmask: usize) {
        let mask = 1usize << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 && i & cmask == cmask {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    fn apply_y(&mut self, qubit: usize, cmask: usize) {
        let mask = 1usize << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 && i & cmask == cmask {
                let j = i | mask;
                let tmp = self.amplitudes[i];
                self.amplitudes[i] = -I * self.amplitudes[j];
                self.amplitudes[j] = I * tmp;
            }
        }
    }

    fn apply_h(&mut self, qubit: usize, cmask: usize) {
        let mask = 1usize << qubit;
        let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 && i & cmask == cmask {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = sqrt2_inv * (a + b);
                self.amplitudes[j] = sqrt2_inv * (a - b);
            }
        }
    }

    fn apply_phase(&mut self, qubit: usize, theta: f64, cmask: usize) {
        let mask = 1usize << qubit | cmask;
        let phase = Complex64::from_polar(1.0, theta);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask == mask {
                *amp *= phase;
            }
        }
    }

    fn apply_rx(&mut self, qubit: usize, theta: f64, cmask: usize) {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new(0.0, -(theta / 2.0).sin());
        self.apply_single(qubit, [[c, s], [s, c]], cmask);
    }

    fn apply_ry(&mut self, qubit: usize, theta: f64, cmask: usize) {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new((theta / 2.0).sin(), 0.0);
        self.apply_single(qubit, [[c, -s], [s, c]], cmask);
    }

    fn apply_rz(&mut self, qubit: usize, theta: f64, cmask: usize) {
        let m = [
            [Complex64::from_polar(1.0, -theta / 2.0), ZERO],
            [ZERO, Complex64::from_polar(1.0, theta / 2.0)],
        ];
        self.apply_single(qubit, m, cmask);
    }

    fn apply_u(&mut self, qubit: usize, theta: f64, phi: f64, lambda: f64, cmask: usize) {
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        let m = [
            [
                Complex64::new(c, 0.0),
                -Complex64::from_polar(s, lambda),
            ],
            [
                Complex64::from_polar(s, phi),
                Complex64::from_polar(c, phi + lambda),
            ],
        ];
        self.apply_single(qubit, m, cmask);
    }

    fn apply_single(&mut self, qubit: usize, m: [[Complex64; 2]; 2], cmask: usize) {
        let mask = 1usize << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 && i & cmask == cmask {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    // =========================================================================
    // Multi-qubit gate implementations
    // =========================================================================

    fn apply_swap(&mut self, q1: usize, q2: usize, cmask: usize) {
        let mask1 = 1usize << q1;
        let mask2 = 1usize << q2;
        for i in 0..self.amplitudes.len() {
            // Visit each |..1..0..⟩ ↔ |..0..1..⟩ pair once.
            if i & mask1 != 0 && i & mask2 == 0 && i & cmask == cmask {
                let j = (i & !mask1) | mask2;
                self.amplitudes.swap(i, j);
            }
        }
    }

    /// exp(iθ·P) = cos θ·I + i sin θ·P on the control-satisfied subspace.
    fn apply_exp_pauli(&mut self, theta: f64, factors: &[(usize, PauliOp)], cmask: usize) {
        let mut rotated = self.clone();
        rotated.apply_pauli_string(factors);
        let (c, s) = (theta.cos(), theta.sin());
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & cmask == cmask {
                *amp = c * *amp + I * s * rotated.amplitudes[i];
            }
        }
    }

    /// Apply a Pauli string (no controls).
    pub fn apply_pauli_string(&mut self, factors: &[(usize, PauliOp)]) {
        for (qubit, op) in factors {
            match op {
                PauliOp::I => {}
                PauliOp::X => self.apply_x(*qubit, 0),
                PauliOp::Y => self.apply_y(*qubit, 0),
                PauliOp::Z => self.apply_phase(*qubit, PI, 0),
            }
        }
    }

    /// Apply a row-major `2^n × 2^n` matrix to `targets`. `targets[k]` is
    /// bit `k` of the matrix index, as in the amplitude ordering. The matrix
    /// need not be unitary.
    pub fn apply_matrix(&mut self, targets: &[usize], matrix: &[Complex64], cmask: usize) {
        let n = targets.len();
        let dim = 1usize << n;
        let target_mask: usize = targets.iter().map(|t| 1usize << t).sum();
        let offsets: Vec<usize> = (0..dim)
            .map(|k| {
                (0..n)
                    .filter(|b| k & (1usize << b) != 0)
                    .map(|b| 1usize << targets[b])
                    .sum()
            })
            .collect();

        let mut local = vec![ZERO; dim];
        for base in 0..self.amplitudes.len() {
            if base & target_mask != 0 || base & cmask != cmask {
                continue;
            }
            for (k, offset) in offsets.iter().enumerate() {
                local[k] = self.amplitudes[base | offset];
            }
            for (row, offset) in offsets.iter().enumerate() {
                self.amplitudes[base | offset] = (0..dim)
                    .map(|col| matrix[row * dim + col] * local[col])
                    .sum();
            }
        }
    }

    // =========================================================================
    // Measurement and noise
    // =========================================================================

    /// Probability of reading 1 on `qubit`.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let mask = 1usize << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Projectively measure `qubit`, collapsing the state.
    pub fn measure<R: Rng>(&mut self, qubit: usize, rng: &mut R) -> usize {
        let p1 = self.probability_one(qubit);
        let outcome = usize::from(rng.r#gen::<f64>() < p1);
        self.collapse(qubit, outcome, if outcome == 1 { p1 } else { 1.0 - p1 });
        outcome
    }

    fn collapse(&mut self, qubit: usize, outcome: usize, probability: f64) {
        let mask = 1usize << qubit;
        let norm = probability.sqrt();
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if (i & mask != 0) as usize == outcome && norm > 0.0 {
                *amp /= norm;
            } else {
                *amp = ZERO;
            }
        }
    }

    /// Measure `qubit` and flip it back to |0⟩ if needed.
    pub fn reset<R: Rng>(&mut self, qubit: usize, rng: &mut R) {
        if self.measure(qubit, rng) == 1 {
            self.apply_x(qubit, 0);
        }
    }

    /// Apply one Kraus operator chosen with probability ‖K_k ψ‖².
    pub fn apply_kraus<R: Rng>(&mut self, targets: &[usize], operators: &[Vec<Complex64>], rng: &mut R) {
        let r: f64 = rng.r#gen();
        let mut cumulative = 0.0;
        let mut fallback = None;
        for k in operators {
            let mut branch = self.clone();
            branch.apply_matrix(targets, k, 0);
            let p = branch.norm_sqr();
            cumulative += p;
            if p > 0.0 {
                fallback = Some((branch.clone(), p));
            }
            if r < cumulative && p > 0.0 {
                *self = branch;
                self.normalize(p);
                return;
            }
        }
        // Rounding left r just above the total.
        if let Some((branch, p)) = fallback {
            *self = branch;
            self.normalize(p);
        }
    }

    fn normalize(&mut self, norm_sqr: f64) {
        let norm = norm_sqr.sqrt();
        for amp in &mut self.amplitudes {
            *amp /= norm;
        }
    }

    /// ⟨ψ|P|ψ⟩ for a Pauli string.
    pub fn expectation(&self, factors: &[(usize, PauliOp)]) -> f64 {
        let mut rotated = self.clone();
        rotated.apply_pauli_string(factors);
        self.amplitudes
            .iter()
            .zip(&rotated.amplitudes)
            .map(|(a, b)| (a.conj() * b).re)
            .sum()
    }

    /// Rotate so that measuring `factors` in Z reads the Pauli eigenbasis.
    pub fn rotate_to_basis(&mut self, factors: &[(usize, PauliOp)]) {
        for (qubit, op) in factors {
            match op {
                PauliOp::X => self.apply_h(*qubit, 0),
                PauliOp::Y => {
                    self.apply_phase(*qubit, -PI / 2.0, 0);
                    self.apply_h(*qubit, 0);
                }
                PauliOp::I | PauliOp::Z => {}
            }
        }
    }

    /// Sample a measurement outcome.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let r: f64 = rng.r#gen();

        let mut cumulative = 0.0;
        for (i, amp) in self.amplitudes.iter().enumerate() {
            cumulative += amp.norm_sqr();
            if r < cumulative {
                return i;
            }
        }

        // Fallback (shouldn't happen with normalized states)
        self.amplitudes.len() - 1
    }
}

/// Conjugate transpose of a row-major square matrix.
pub fn dagger(matrix: &[Complex64]) -> Vec<Complex64> {
    let dim = (matrix.len() as f64).sqrt().round() as usize;
    let mut out = vec![ZERO; matrix.len()];
    for row in 0..dim {
        for col in 0..dim {
            out[col * dim + row] = matrix[row * dim + col].conj();
        }
    }
    out
}
