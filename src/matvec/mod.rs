//! Matrix-vector engine
//!
//! Parallelizes operator application over contiguous blocks of the basis
//! index range and provides deterministic blocked reductions. Each worker
//! owns its output block exclusively and accumulates every element in a fixed
//! term order, so the result is bit-identical for any partitioning and any
//! number of workers. Inner products are reduced block-by-block with a
//! sequential combine in block order, which keeps repeated runs reproducible
//! for testing and checkpoint/restart.
//!
//! This module performs no iterative logic of its own; the only blocking
//! point it introduces is the implicit join at the end of each parallel
//! apply.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::operator::Hamiltonian;
use crate::{Amplitude, StateVector};

/// Contiguous block partitioning of the basis index range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitioning {
    /// Number of consecutive indices handled by one worker per block
    pub block_size: usize,
}

impl Default for Partitioning {
    fn default() -> Self {
        Self { block_size: 4096 }
    }
}

impl Partitioning {
    /// A partitioning with the given block size (clamped to at least one)
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }
}

/// Apply the Hamiltonian to a state vector
///
/// `out[i]` equals the exact sparse operator application restricted to row
/// `i`, accumulated in the operator's fixed term order; the partitioning only
/// decides which worker computes which block.
pub fn apply(
    hamiltonian: &Hamiltonian,
    vector: &StateVector,
    partitioning: Partitioning,
) -> StateVector {
    debug_assert_eq!(vector.len(), hamiltonian.dimension());
    let block_size = partitioning.block_size.max(1);
    let mut out = StateVector::zeros(hamiltonian.dimension());
    out.as_mut_slice()
        .par_chunks_mut(block_size)
        .enumerate()
        .for_each(|(block, chunk)| {
            let offset = block * block_size;
            for (position, element) in chunk.iter_mut().enumerate() {
                *element = hamiltonian.row(offset + position, vector);
            }
        });
    out
}

/// The inner product `⟨a|b⟩ = Σ conj(a[i]) b[i]` with deterministic reduction
///
/// Partial sums are computed per block and combined sequentially in block
/// order, so the result does not depend on the worker count.
pub fn dot(a: &StateVector, b: &StateVector, partitioning: Partitioning) -> Amplitude {
    debug_assert_eq!(a.len(), b.len());
    let block_size = partitioning.block_size.max(1);
    let partials: Vec<Amplitude> = a
        .as_slice()
        .par_chunks(block_size)
        .zip(b.as_slice().par_chunks(block_size))
        .map(|(x, y)| {
            x.iter()
                .zip(y.iter())
                .map(|(p, q)| p.conj() * q)
                .sum::<Amplitude>()
        })
        .collect();
    partials.into_iter().sum()
}

/// The Euclidean norm of a state vector, via the deterministic inner product
pub fn norm(vector: &StateVector, partitioning: Partitioning) -> f64 {
    dot(vector, vector, partitioning).re.sqrt()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{apply, dot, norm, Partitioning};
    use crate::basis::{Basis, Sector};
    use crate::lattice::LatticeSpec;
    use crate::operator::HamiltonianBuilder;
    use crate::{Amplitude, StateVector};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn test_hamiltonian() -> crate::operator::Hamiltonian {
        let lattice = LatticeSpec::builder(4)
            .with_hopping(0, 1, Amplitude::new(-1.0, 0.2))
            .with_hopping(1, 2, Amplitude::new(-1.0, 0.0))
            .with_hopping(2, 3, Amplitude::new(-0.6, -0.4))
            .with_coulomb_intra(1, 3.0)
            .with_field(0, 0.2, 0.5)
            .build()
            .unwrap();
        let basis = Arc::new(Basis::enumerate(4, Sector::new(2, 2), 1 << 20).unwrap());
        HamiltonianBuilder::new()
            .with_lattice(&lattice)
            .with_basis(&basis)
            .build()
            .unwrap()
    }

    fn random_vector(dimension: usize, seed: u64) -> StateVector {
        let mut rng = StdRng::seed_from_u64(seed);
        StateVector::from_fn(dimension, |_, _| {
            Amplitude::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5)
        })
    }

    #[test]
    fn output_is_bit_identical_across_partitionings() {
        let hamiltonian = test_hamiltonian();
        let v = random_vector(hamiltonian.dimension(), 17);
        let reference = apply(&hamiltonian, &v, Partitioning::with_block_size(1));
        for block_size in [2, 3, 7, 64, 4096] {
            let out = apply(&hamiltonian, &v, Partitioning::with_block_size(block_size));
            assert!(
                reference.iter().zip(out.iter()).all(|(a, b)| a == b),
                "partitioning with block size {block_size} changed the output bits"
            );
        }
    }

    #[test]
    fn apply_matches_sequential_row_evaluation() {
        let hamiltonian = test_hamiltonian();
        let v = random_vector(hamiltonian.dimension(), 23);
        let parallel = apply(&hamiltonian, &v, Partitioning::default());
        for index in 0..hamiltonian.dimension() {
            assert_eq!(parallel[index], hamiltonian.row(index, &v));
        }
    }

    #[test]
    fn blocked_dot_matches_sequential_blocked_sum() {
        let a = random_vector(1000, 5);
        let b = random_vector(1000, 9);
        let partitioning = Partitioning::with_block_size(128);
        let parallel = dot(&a, &b, partitioning);
        let sequential: Amplitude = a
            .as_slice()
            .chunks(128)
            .zip(b.as_slice().chunks(128))
            .map(|(x, y)| {
                x.iter()
                    .zip(y.iter())
                    .map(|(p, q)| p.conj() * q)
                    .sum::<Amplitude>()
            })
            .sum();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn norm_of_unit_vector_is_one() {
        let mut v = StateVector::zeros(37);
        v[5] = Amplitude::new(0.0, 1.0);
        assert_relative_eq!(norm(&v, Partitioning::default()), 1.0, epsilon = 1e-15);
    }
}
