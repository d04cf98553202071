//! Hamiltonian module
//!
//! Wraps the assembled term rules together with the sector basis into an
//! implicit sparse linear operator. The operator exposes a single hot-path
//! operation, the evaluation of one output row, which the matrix-vector
//! engine parallelizes over contiguous index blocks.
//!
//! A `Hamiltonian` is constructed through the `HamiltonianBuilder` from a
//! `lattice: LatticeSpec` and a shared `basis: Arc<Basis>` as
//!
//! ```ignore
//! HamiltonianBuilder::new()
//!     .with_lattice(&lattice)
//!     .with_basis(&basis)
//!     .build()?;
//! ```
//!
//! Because every rule conserves the particle number of each spin species and
//! the rule set is Hermitian-closed (both verified at build time), applying
//! the operator can never leave the declared sector; an in-sector lookup miss
//! during application is therefore an invariant violation, not a runtime
//! condition.

pub mod terms;

use std::sync::Arc;

use crate::basis::Basis;
use crate::error::BuildError;
use crate::lattice::LatticeSpec;
use crate::{Amplitude, StateVector};
pub use terms::Term;

/// The many-body Hamiltonian as an implicit sparse operator
#[derive(Debug, Clone)]
pub struct Hamiltonian {
    basis: Arc<Basis>,
    terms: Vec<Term>,
}

impl Hamiltonian {
    /// The basis the operator acts on
    pub fn basis(&self) -> &Arc<Basis> {
        &self.basis
    }

    /// The dimension of the operator
    pub fn dimension(&self) -> usize {
        self.basis.dimension()
    }

    /// The assembled term rules
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Evaluate one element of `H v`
    ///
    /// Enumerating the rules on basis state `index` yields the column
    /// `⟨target|H|index⟩`; since the rule set is closed under Hermitian
    /// conjugation that column is the conjugate of row `index`, so the row
    /// accumulates as `Σ conj(amplitude) v[target]` in fixed term order.
    pub fn row(&self, index: usize, vector: &StateVector) -> Amplitude {
        let word = self.basis.state(index);
        let mut acc = Amplitude::new(0.0, 0.0);
        for term in &self.terms {
            if let Some((target, amplitude)) = term.apply(word) {
                let target_index = self
                    .basis
                    .index_of(target)
                    .expect("term rules conserve the sector by construction");
                acc += amplitude.conj() * vector[target_index];
            }
        }
        acc
    }
}

/// Builder for a Hamiltonian from references to a lattice and a sector basis
pub struct HamiltonianBuilder<RefLattice, RefBasis> {
    lattice: RefLattice,
    basis: RefBasis,
}

impl Default for HamiltonianBuilder<(), ()> {
    fn default() -> Self {
        Self {
            lattice: (),
            basis: (),
        }
    }
}

impl HamiltonianBuilder<(), ()> {
    /// Initialize an empty builder
    pub fn new() -> Self {
        Self::default()
    }
}

impl<RefLattice, RefBasis> HamiltonianBuilder<RefLattice, RefBasis> {
    /// Attach the lattice specification
    pub fn with_lattice(self, lattice: &LatticeSpec) -> HamiltonianBuilder<&LatticeSpec, RefBasis> {
        HamiltonianBuilder {
            lattice,
            basis: self.basis,
        }
    }

    /// Attach the shared sector basis
    pub fn with_basis(self, basis: &Arc<Basis>) -> HamiltonianBuilder<RefLattice, &Arc<Basis>> {
        HamiltonianBuilder {
            lattice: self.lattice,
            basis,
        }
    }
}

impl HamiltonianBuilder<&LatticeSpec, &Arc<Basis>> {
    /// Assemble and verify the term rules
    #[tracing::instrument(name = "Hamiltonian builder", level = "info", skip(self))]
    pub fn build(self) -> Result<Hamiltonian, BuildError> {
        if self.lattice.sites() != self.basis.sites() {
            return Err(BuildError::MalformedLattice(format!(
                "lattice has {} sites but the basis was enumerated for {}",
                self.lattice.sites(),
                self.basis.sites()
            )));
        }
        let terms = terms::assemble(self.lattice, self.basis);
        terms::verify_hermitian_closure(&terms).map_err(BuildError::MalformedLattice)?;
        terms::verify_sector_conservation(&terms, self.basis.sites())
            .map_err(BuildError::MalformedLattice)?;
        tracing::info!(
            terms = terms.len(),
            dimension = self.basis.dimension(),
            "assembled Hamiltonian rule set"
        );
        Ok(Hamiltonian {
            basis: Arc::clone(self.basis),
            terms,
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::HamiltonianBuilder;
    use crate::basis::{Basis, Sector};
    use crate::lattice::LatticeSpec;
    use crate::matvec::{self, Partitioning};
    use crate::{Amplitude, StateVector};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_vector(dimension: usize, seed: u64) -> StateVector {
        let mut rng = StdRng::seed_from_u64(seed);
        StateVector::from_fn(dimension, |_, _| {
            Amplitude::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5)
        })
    }

    #[test]
    fn operator_is_hermitian_on_random_vectors() {
        let lattice = LatticeSpec::builder(4)
            .with_hopping(0, 1, Amplitude::new(-1.0, 0.3))
            .with_hopping(1, 2, Amplitude::new(-0.7, 0.0))
            .with_hopping(2, 3, Amplitude::new(-1.0, -0.2))
            .with_hopping(3, 0, Amplitude::new(-0.5, 0.1))
            .with_coulomb_intra(0, 4.0)
            .with_coulomb_intra(2, 2.0)
            .with_coulomb_inter(0, 2, 1.5)
            .with_field(1, 0.3, 0.2)
            .build()
            .unwrap();
        let basis = Arc::new(Basis::enumerate(4, Sector::new(2, 1), 1 << 20).unwrap());
        let hamiltonian = HamiltonianBuilder::new()
            .with_lattice(&lattice)
            .with_basis(&basis)
            .build()
            .unwrap();

        let partitioning = Partitioning::default();
        let v = random_vector(hamiltonian.dimension(), 7);
        let w = random_vector(hamiltonian.dimension(), 11);
        let hv = matvec::apply(&hamiltonian, &v, partitioning);
        let hw = matvec::apply(&hamiltonian, &w, partitioning);

        // ⟨w|Hv⟩ = conj(⟨v|Hw⟩) for a Hermitian operator
        let lhs = matvec::dot(&w, &hv, partitioning);
        let rhs = matvec::dot(&v, &hw, partitioning).conj();
        assert_relative_eq!(lhs.re, rhs.re, max_relative = 1e-12);
        assert_relative_eq!(lhs.im, rhs.im, max_relative = 1e-12);
    }

    #[test]
    fn applying_twice_matches_norm_identity() {
        let lattice = LatticeSpec::chain(3, 1.0, 2.0).unwrap();
        let basis = Arc::new(Basis::enumerate(3, Sector::new(1, 1), 1 << 20).unwrap());
        let hamiltonian = HamiltonianBuilder::new()
            .with_lattice(&lattice)
            .with_basis(&basis)
            .build()
            .unwrap();

        let partitioning = Partitioning::default();
        let v = random_vector(hamiltonian.dimension(), 3);
        let hv = matvec::apply(&hamiltonian, &v, partitioning);
        let hhv = matvec::apply(&hamiltonian, &hv, partitioning);

        // ⟨v|H·Hv⟩ = ⟨Hv|Hv⟩
        let lhs = matvec::dot(&v, &hhv, partitioning);
        let rhs = matvec::dot(&hv, &hv, partitioning);
        assert_relative_eq!(lhs.re, rhs.re, max_relative = 1e-12);
        assert_relative_eq!(lhs.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_lattice_and_basis_are_rejected() {
        let lattice = LatticeSpec::chain(3, 1.0, 0.0).unwrap();
        let basis = Arc::new(Basis::enumerate(4, Sector::new(1, 1), 1 << 20).unwrap());
        let result = HamiltonianBuilder::new()
            .with_lattice(&lattice)
            .with_basis(&basis)
            .build();
        assert!(result.is_err());
    }
}
