//! Open quantum subsystem: a D-level oscillator under a Lindblad master equation.
//!
//! Solves the Gorini–Kossakowski–Sudarshan–Lindblad (GKSL) equation with a
//! single collapse operator L = √Γ a:
//!
//!   dρ/dt = -i[H, ρ] + Γ (a ρ a† - ½{a†a, ρ})
//!
//! # Coupling to the oscillator network
//!
//! The Hamiltonian is rebuilt from the network before every micro-step:
//!
//!   H = 2 a†a + 0.1 · ⟨sin θ⟩ · (a + a†)
//!
//! and the network reads back ⟨a + a†⟩ = Tr(ρ (a + a†)). These are the only
//! two channels between the levels.
//!
//! # Integration
//!
//! Each micro-step of length dt is split into RK4 steps of length h with
//! h·(‖H‖₁ + Γ(D-1)) ≤ 0.1. Every RK4 stage derivative is traceless, so the
//! trace is conserved up to rounding; the result is re-Hermitised and then
//! checked against the trace and purity tolerances.
//!
//! References:
//! - Lindblad (1976), Commun. Math. Phys. 48, 119
//! - Breuer & Petruccione, "The Theory of Open Quantum Systems" (2002)

use num_complex::Complex64;
use num_traits::Zero;
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::trace;

use crate::error::{QsfwError, QsfwResult};
use crate::operators::{LadderOperators, Operator};
use crate::oscillators::OscillatorNetwork;
use crate::params::{FIELD_GAIN, HARMONIC_WEIGHT};

/// Allowed |Tr ρ - 1| after a micro-step.
pub const TRACE_TOLERANCE: f64 = 1e-6;

/// Allowed excess of Tr ρ² over 1 after a micro-step.
pub const PURITY_TOLERANCE: f64 = 1e-3;

/// Upper bound on h·(generator scale) for one RK4 step.
const MAX_STEP_SCALE: f64 = 0.1;

/// Internal RK4 steps above this count mean dt or Γ is out of range.
pub const MAX_INTEGRATION_STEPS: usize = 100_000;

/// Density matrix of the quantum subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumState {
    rho: Operator,
}

impl QuantumState {
    /// Pure state |ψ⟩⟨ψ| from an (unnormalised) ket.
    pub fn from_ket(ket: &[Complex64]) -> QsfwResult<Self> {
        if ket.is_empty() {
            return Err(QsfwError::invalid("ket must have dimension >= 1"));
        }
        let norm_sqr: f64 = ket.iter().map(|c| c.norm_sqr()).sum();
        if !(norm_sqr.is_finite() && norm_sqr > 0.0) {
            return Err(QsfwError::invalid("ket has zero or non-finite norm"));
        }
        let scale = 1.0 / norm_sqr;
        let dim = ket.len();
        let rho = Operator::from_fn(dim, dim, |i, j| ket[i] * ket[j].conj() * scale);
        Ok(Self { rho })
    }

    /// Ground state |0⟩⟨0|.
    pub fn vacuum(dim: usize) -> QsfwResult<Self> {
        let mut ket = vec![Complex64::zero(); dim];
        if let Some(first) = ket.first_mut() {
            *first = Complex64::new(1.0, 0.0);
        }
        Self::from_ket(&ket)
    }

    /// Wrap an existing density matrix after checking shape and trace.
    pub fn from_density_matrix(rho: Operator) -> QsfwResult<Self> {
        if rho.nrows() != rho.ncols() || rho.nrows() == 0 {
            return Err(QsfwError::invalid(format!(
                "density matrix must be square and non-empty, got {}x{}",
                rho.nrows(),
                rho.ncols()
            )));
        }
        let state = Self { rho };
        state.check_physical()?;
        Ok(state)
    }

    pub fn dim(&self) -> usize {
        self.rho.nrows()
    }

    pub fn density_matrix(&self) -> &Operator {
        &self.rho
    }

    /// Tr ρ (should be 1).
    pub fn trace(&self) -> Complex64 {
        self.rho.trace()
    }

    /// Purity Tr(ρ²) = Σ |ρ_ij|² for Hermitian ρ.
    pub fn purity(&self) -> f64 {
        self.rho.iter().map(|z| z.norm_sqr()).sum()
    }

    /// Expectation value Re Tr(ρ O).
    pub fn expect(&self, op: &Operator) -> f64 {
        (&self.rho * op).trace().re
    }

    /// Mean excitation number ⟨a†a⟩ = Σ_n n ρ_nn.
    pub fn mean_excitation(&self) -> f64 {
        (0..self.dim()).map(|n| n as f64 * self.rho[(n, n)].re).sum()
    }

    fn check_physical(&self) -> QsfwResult<()> {
        if self.rho.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return Err(QsfwError::unstable("density matrix has non-finite entries"));
        }
        let tr = self.trace();
        if (tr.re - 1.0).abs() > TRACE_TOLERANCE || tr.im.abs() > TRACE_TOLERANCE {
            return Err(QsfwError::unstable(format!(
                "trace drifted to {:.3e}{:+.3e}i",
                tr.re, tr.im
            )));
        }
        let purity = self.purity();
        if purity > 1.0 + PURITY_TOLERANCE {
            return Err(QsfwError::unstable(format!(
                "purity {:.6} exceeds 1",
                purity
            )));
        }
        Ok(())
    }
}

/// Uniformly random pure state of dimension `dim`.
///
/// Real and imaginary parts of every amplitude are i.i.d. standard normal;
/// after normalisation the ket is Haar-distributed on the unit sphere.
pub fn init_state<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> QsfwResult<QuantumState> {
    if dim < 1 {
        return Err(QsfwError::invalid(format!(
            "state dimension must be >= 1, got {}",
            dim
        )));
    }
    let ket: Vec<Complex64> = (0..dim)
        .map(|_| Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal)))
        .collect();
    QuantumState::from_ket(&ket)
}

/// H = 2 a†a + 0.1 · meanSin(phases) · (a + a†).
pub fn build_hamiltonian(network: &OscillatorNetwork, ops: &LadderOperators) -> Operator {
    let field = network.synchrony_metric();
    let base = &ops.number * Complex64::new(HARMONIC_WEIGHT, 0.0);
    let drive = &ops.quadrature * Complex64::new(FIELD_GAIN * field, 0.0);
    base + drive
}

/// ⟨a + a†⟩ on `state`.
pub fn measure_observable(state: &QuantumState, ops: &LadderOperators) -> f64 {
    state.expect(&ops.quadrature)
}

/// Right-hand side of the master equation.
fn lindblad_rhs(
    rho: &Operator,
    hamiltonian: &Operator,
    decoherence_rate: f64,
    ops: &LadderOperators,
) -> Operator {
    let minus_i = Complex64::new(0.0, -1.0);
    let commutator = hamiltonian * rho - rho * hamiltonian;
    let mut drho = commutator * minus_i;

    if decoherence_rate > 0.0 {
        let jump = &ops.lowering * rho * &ops.raising;
        let anti = &ops.number * rho + rho * &ops.number;
        let dissipator = jump - anti * Complex64::new(0.5, 0.0);
        drho += dissipator * Complex64::new(decoherence_rate, 0.0);
    }
    drho
}

/// Number of RK4 steps needed to cover `dt` within the stability bound.
fn integration_steps(hamiltonian: &Operator, dt: f64, decoherence_rate: f64, dim: usize) -> usize {
    let h_norm = (0..hamiltonian.ncols())
        .map(|j| hamiltonian.column(j).iter().map(|z| z.norm()).sum::<f64>())
        .fold(0.0_f64, f64::max);
    let scale = h_norm + decoherence_rate * dim.saturating_sub(1) as f64;
    if scale <= 0.0 {
        return 1;
    }
    ((dt * scale / MAX_STEP_SCALE).ceil() as usize).max(1)
}

/// Advance `state` by one micro-step of duration `dt`.
///
/// Returns a new state; the input is left untouched.
pub fn evolve(
    state: &QuantumState,
    hamiltonian: &Operator,
    dt: f64,
    decoherence_rate: f64,
    ops: &LadderOperators,
) -> QsfwResult<QuantumState> {
    let d = state.dim();
    if !(dt.is_finite() && dt > 0.0) {
        return Err(QsfwError::invalid(format!("dt must be > 0, got {}", dt)));
    }
    if !(decoherence_rate.is_finite() && decoherence_rate >= 0.0) {
        return Err(QsfwError::invalid(format!(
            "decoherence rate must be >= 0, got {}",
            decoherence_rate
        )));
    }
    if ops.dim != d || hamiltonian.nrows() != d || hamiltonian.ncols() != d {
        return Err(QsfwError::invalid(format!(
            "dimension mismatch: state {}, operators {}, hamiltonian {}x{}",
            d,
            ops.dim,
            hamiltonian.nrows(),
            hamiltonian.ncols()
        )));
    }

    let steps = integration_steps(hamiltonian, dt, decoherence_rate, d);
    if steps > MAX_INTEGRATION_STEPS {
        return Err(QsfwError::unstable(format!(
            "dt={} with rate {} needs {} RK4 steps (limit {})",
            dt, decoherence_rate, steps, MAX_INTEGRATION_STEPS
        )));
    }
    let h = dt / steps as f64;
    let half = Complex64::new(h / 2.0, 0.0);
    let full = Complex64::new(h, 0.0);
    let sixth = Complex64::new(h / 6.0, 0.0);
    let two = Complex64::new(2.0, 0.0);

    let mut rho = state.rho.clone();
    for _ in 0..steps {
        let k1 = lindblad_rhs(&rho, hamiltonian, decoherence_rate, ops);
        let k2 = lindblad_rhs(&(&rho + &k1 * half), hamiltonian, decoherence_rate, ops);
        let k3 = lindblad_rhs(&(&rho + &k2 * half), hamiltonian, decoherence_rate, ops);
        let k4 = lindblad_rhs(&(&rho + &k3 * full), hamiltonian, decoherence_rate, ops);
        rho += (k1 + (k2 + k3) * two + k4) * sixth;
    }

    // Rounding leaves a tiny anti-Hermitian part; project it out.
    let rho = (&rho + rho.adjoint()) * Complex64::new(0.5, 0.0);

    let next = QuantumState { rho };
    next.check_physical()?;
    trace!(steps, purity = next.purity(), "lindblad micro-step");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ops(dim: usize) -> LadderOperators {
        LadderOperators::new(dim).unwrap()
    }

    fn quiet_network(size: usize) -> OscillatorNetwork {
        OscillatorNetwork::from_parts(vec![0.0; size], vec![1.0; size], 0.6).unwrap()
    }

    #[test]
    fn random_state_is_normalised_and_pure() {
        let mut rng = StdRng::seed_from_u64(7);
        for dim in 1..=6 {
            let s = init_state(dim, &mut rng).unwrap();
            assert_eq!(s.dim(), dim);
            assert!((s.trace().re - 1.0).abs() < 1e-12);
            assert!((s.purity() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            init_state(0, &mut rng),
            Err(QsfwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn density_matrix_checked_on_wrap() {
        let vacuum = QuantumState::vacuum(3).unwrap();
        let wrapped = QuantumState::from_density_matrix(vacuum.density_matrix().clone()).unwrap();
        assert_eq!(wrapped.dim(), 3);
        assert!((wrapped.purity() - 1.0).abs() < 1e-12);

        // Maximally mixed qubit: trace 1, purity 1/2.
        let mixed = Operator::identity(2, 2) * Complex64::new(0.5, 0.0);
        assert!(QuantumState::from_density_matrix(mixed).is_ok());

        assert!(matches!(
            QuantumState::from_density_matrix(Operator::identity(2, 2)),
            Err(QsfwError::NumericalInstability(_))
        ));
        assert!(matches!(
            QuantumState::from_density_matrix(Operator::zeros(2, 3)),
            Err(QsfwError::InvalidArgument(_))
        ));
        assert!(matches!(
            QuantumState::from_density_matrix(Operator::zeros(0, 0)),
            Err(QsfwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn hamiltonian_without_field_is_harmonic() {
        let o = ops(4);
        let h = build_hamiltonian(&quiet_network(10), &o);
        for n in 0..4 {
            assert!((h[(n, n)].re - 2.0 * n as f64).abs() < 1e-12);
        }
        assert!(h[(0, 1)].norm() < 1e-12);
    }

    #[test]
    fn hamiltonian_field_term_follows_mean_sine() {
        let o = ops(3);
        let half_pi = std::f64::consts::FRAC_PI_2;
        let net = OscillatorNetwork::from_parts(vec![half_pi; 5], vec![1.0; 5], 0.6).unwrap();
        let h = build_hamiltonian(&net, &o);
        // sin(π/2) = 1 → 0.1 · (a + a†), entry (0,1) = 0.1 · √1
        assert!((h[(0, 1)].re - 0.1).abs() < 1e-12);
        assert!((h[(1, 2)].re - 0.1 * 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn evolve_preserves_trace() {
        let mut rng = StdRng::seed_from_u64(11);
        let o = ops(4);
        let mut state = init_state(4, &mut rng).unwrap();
        let h = build_hamiltonian(&quiet_network(4), &o);
        for _ in 0..500 {
            state = evolve(&state, &h, 0.01, 0.05, &o).unwrap();
            assert!((state.trace().re - 1.0).abs() < TRACE_TOLERANCE);
        }
    }

    #[test]
    fn evolve_keeps_hermitian() {
        let mut rng = StdRng::seed_from_u64(3);
        let o = ops(5);
        let state = init_state(5, &mut rng).unwrap();
        let h = build_hamiltonian(&quiet_network(4), &o);
        let next = evolve(&state, &h, 0.05, 0.2, &o).unwrap();
        let rho = next.density_matrix();
        let diff = rho - rho.adjoint();
        assert!(diff.iter().all(|z| z.norm() < 1e-14));
    }

    #[test]
    fn unitary_evolution_keeps_purity() {
        let mut rng = StdRng::seed_from_u64(5);
        let o = ops(4);
        let mut state = init_state(4, &mut rng).unwrap();
        let h = build_hamiltonian(&quiet_network(4), &o);
        for _ in 0..100 {
            state = evolve(&state, &h, 0.01, 0.0, &o).unwrap();
        }
        assert!((state.purity() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn damping_relaxes_to_vacuum() {
        let o = ops(4);
        let mut ket = vec![Complex64::zero(); 4];
        ket[3] = Complex64::new(1.0, 0.0);
        let mut state = QuantumState::from_ket(&ket).unwrap();
        let h = build_hamiltonian(&quiet_network(4), &o);
        for _ in 0..200 {
            state = evolve(&state, &h, 0.1, 1.0, &o).unwrap();
        }
        // After t = 20/Γ the population of |0⟩ is essentially 1.
        assert!(state.density_matrix()[(0, 0)].re > 0.999);
        assert!(state.mean_excitation() < 1e-3);
    }

    #[test]
    fn excitation_decays_at_rate_gamma() {
        // For a pure damping channel d⟨n⟩/dt = -Γ⟨n⟩ exactly.
        let o = ops(6);
        let mut ket = vec![Complex64::zero(); 6];
        ket[1] = Complex64::new(1.0, 0.0);
        let mut state = QuantumState::from_ket(&ket).unwrap();
        let h = build_hamiltonian(&quiet_network(4), &o);
        let gamma = 0.5;
        for _ in 0..100 {
            state = evolve(&state, &h, 0.01, gamma, &o).unwrap();
        }
        let expected = (-gamma * 1.0_f64).exp();
        assert!((state.mean_excitation() - expected).abs() < 1e-6);
    }

    #[test]
    fn vacuum_has_zero_field() {
        let o = ops(4);
        let state = QuantumState::vacuum(4).unwrap();
        assert!(measure_observable(&state, &o).abs() < 1e-15);
    }

    #[test]
    fn coherent_superposition_field() {
        // (|0⟩ + |1⟩)/√2 → ⟨a + a†⟩ = 1
        let o = ops(3);
        let one = Complex64::new(1.0, 0.0);
        let state = QuantumState::from_ket(&[one, one, Complex64::zero()]).unwrap();
        assert!((measure_observable(&state, &o) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn evolve_rejects_bad_step() {
        let o = ops(2);
        let state = QuantumState::vacuum(2).unwrap();
        let h = build_hamiltonian(&quiet_network(2), &o);
        assert!(matches!(
            evolve(&state, &h, 0.0, 0.1, &o),
            Err(QsfwError::InvalidArgument(_))
        ));
        assert!(matches!(
            evolve(&state, &h, 0.1, -1.0, &o),
            Err(QsfwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn huge_rate_is_numerical_instability() {
        let o = ops(4);
        let state = QuantumState::vacuum(4).unwrap();
        let h = build_hamiltonian(&quiet_network(2), &o);
        assert!(matches!(
            evolve(&state, &h, 1.0, 1e6, &o),
            Err(QsfwError::NumericalInstability(_))
        ));
    }

    #[test]
    fn evolve_rejects_dimension_mismatch() {
        let state = QuantumState::vacuum(3).unwrap();
        let o = ops(4);
        let h = build_hamiltonian(&quiet_network(2), &o);
        assert!(matches!(
            evolve(&state, &h, 0.01, 0.0, &o),
            Err(QsfwError::InvalidArgument(_))
        ));
    }
}
