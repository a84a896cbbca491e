//! Ladder operators for a truncated Fock space, memoised by dimension.
//!
//! In the basis |0⟩,...,|D-1⟩:
//!
//!   a|n⟩ = √n |n-1⟩,  a†|n⟩ = √(n+1) |n+1⟩
//!
//! so the lowering operator has √n on the first superdiagonal. The cache also
//! keeps the products every micro-step needs (a†, a†a, a + a†) so a run never
//! rebuilds them.
//!
//! The cache is lock-protected and never evicts. A sweep prefills it for the
//! dimensions it will use before any worker starts, after which every lookup
//! is a shared read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use nalgebra::DMatrix;
use num_complex::Complex64;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{QsfwError, QsfwResult};

/// Dense complex D×D operator.
pub type Operator = DMatrix<Complex64>;

/// The operator family for one Fock-space dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct LadderOperators {
    pub dim: usize,
    /// Annihilation operator a.
    pub lowering: Operator,
    /// Creation operator a†.
    pub raising: Operator,
    /// Number operator a†a.
    pub number: Operator,
    /// Field quadrature a + a†.
    pub quadrature: Operator,
}

impl LadderOperators {
    /// Build the family for `dim` (dim ≥ 1).
    pub fn new(dim: usize) -> QsfwResult<Self> {
        let lowering = lowering_operator(dim)?;
        let raising = lowering.adjoint();
        let number = &raising * &lowering;
        let quadrature = &lowering + &raising;
        Ok(Self {
            dim,
            lowering,
            raising,
            number,
            quadrature,
        })
    }
}

/// Annihilation operator for a `dim`-level truncated oscillator.
pub fn lowering_operator(dim: usize) -> QsfwResult<Operator> {
    if dim < 1 {
        return Err(QsfwError::invalid(format!(
            "operator dimension must be >= 1, got {}",
            dim
        )));
    }
    let mut a = Operator::zeros(dim, dim);
    for n in 1..dim {
        a[(n - 1, n)] = Complex64::new((n as f64).sqrt(), 0.0);
    }
    Ok(a)
}

/// Thread-safe memo of [`LadderOperators`] keyed by dimension.
#[derive(Debug, Default)]
pub struct OperatorCache {
    entries: RwLock<HashMap<usize, Arc<LadderOperators>>>,
    constructions: AtomicUsize,
}

static GLOBAL_CACHE: OnceLock<Arc<OperatorCache>> = OnceLock::new();

impl OperatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by everything that does not inject its own.
    pub fn global() -> Arc<OperatorCache> {
        GLOBAL_CACHE
            .get_or_init(|| Arc::new(OperatorCache::new()))
            .clone()
    }

    /// Operators for `dim`, built on first request.
    pub fn get(&self, dim: usize) -> QsfwResult<Arc<LadderOperators>> {
        if let Some(ops) = self.entries.read().get(&dim) {
            return Ok(Arc::clone(ops));
        }

        let mut entries = self.entries.write();
        // Another thread may have built it between the two locks.
        if let Some(ops) = entries.get(&dim) {
            return Ok(Arc::clone(ops));
        }
        let ops = Arc::new(LadderOperators::new(dim)?);
        self.constructions.fetch_add(1, Ordering::Relaxed);
        debug!(dim, "cached ladder operators");
        entries.insert(dim, Arc::clone(&ops));
        Ok(ops)
    }

    /// Build every listed dimension up front.
    pub fn prefill(&self, dims: &[usize]) -> QsfwResult<()> {
        for &dim in dims {
            self.get(dim)?;
        }
        Ok(())
    }

    /// How many operator families this cache has constructed.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_operator_has_sqrt_superdiagonal() {
        let a = lowering_operator(4).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let expected = if j == i + 1 { (j as f64).sqrt() } else { 0.0 };
                assert!((a[(i, j)].re - expected).abs() < 1e-15);
                assert_eq!(a[(i, j)].im, 0.0);
            }
        }
    }

    #[test]
    fn number_operator_is_diagonal_n() {
        let ops = LadderOperators::new(5).unwrap();
        for n in 0..5 {
            assert!((ops.number[(n, n)].re - n as f64).abs() < 1e-12);
        }
        let off: f64 = (0..5)
            .flat_map(|i| (0..5).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .map(|(i, j)| ops.number[(i, j)].norm())
            .sum();
        assert!(off < 1e-12);
    }

    #[test]
    fn quadrature_is_hermitian() {
        let ops = LadderOperators::new(6).unwrap();
        let diff = &ops.quadrature - ops.quadrature.adjoint();
        assert!(diff.iter().all(|z| z.norm() < 1e-15));
    }

    #[test]
    fn dimension_one_is_zero_operator() {
        let a = lowering_operator(1).unwrap();
        assert_eq!(a.nrows(), 1);
        assert_eq!(a[(0, 0)], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn dimension_zero_rejected() {
        let cache = OperatorCache::new();
        assert!(matches!(cache.get(0), Err(QsfwError::InvalidArgument(_))));
        assert_eq!(cache.constructions(), 0);
    }

    #[test]
    fn cache_is_idempotent_and_builds_once() {
        let cache = OperatorCache::new();
        for dim in 1..=6 {
            let first = cache.get(dim).unwrap();
            let second = cache.get(dim).unwrap();
            assert_eq!(*first, *second);
        }
        assert_eq!(cache.constructions(), 6);
        cache.get(3).unwrap();
        assert_eq!(cache.constructions(), 6);
        assert_eq!(cache.len(), 6);
    }

    #[test]
    fn prefill_then_concurrent_reads() {
        let cache = Arc::new(OperatorCache::new());
        cache.prefill(&[2, 4]).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get(4).map(|ops| ops.dim))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().unwrap(), 4);
        }
        assert_eq!(cache.constructions(), 2);
    }
}
