//! Expectation values of operator strings
//!
//! Computes correlation functions against converged eigenvectors. A
//! correlator descriptor is an ordered product of single-site creation and
//! annihilation insertions, applied right-to-left to the ket with the same
//! word-surgery rules the Hamiltonian uses. Each insertion moves the state
//! into a neighbouring symmetry sector whose basis is enumerated on demand
//! and memoized; the sector walk is validated up front, and any string that
//! would leave the representable sector lattice is rejected with a
//! `SectorMismatch` rather than silently zeroed, since a silent zero is
//! indistinguishable from a genuinely vanishing expectation value.

pub mod totalspin;

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::basis::{jw_sign, Basis, Sector, Spin};
use crate::error::EvaluationError;
use crate::matvec::{self, Partitioning};
use crate::{Amplitude, StateVector};

/// Whether an insertion creates or annihilates a particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    /// `c†`
    Create,
    /// `c`
    Annihilate,
}

/// One single-site operator insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insertion {
    /// Site the operator acts on
    pub site: usize,
    /// Spin species the operator acts on
    pub spin: Spin,
    /// Creation or annihilation
    pub kind: OperatorKind,
}

/// An ordered operator string; the rightmost insertion acts on the ket first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorDescriptor {
    insertions: Vec<Insertion>,
}

impl CorrelatorDescriptor {
    /// A descriptor from an explicit list of insertions
    pub fn new(insertions: Vec<Insertion>) -> Self {
        Self { insertions }
    }

    /// The two-operator correlator `c†_{iσ} c_{jσ}`
    pub fn one_body(i: usize, j: usize, spin: Spin) -> Self {
        Self::new(vec![
            Insertion {
                site: i,
                spin,
                kind: OperatorKind::Create,
            },
            Insertion {
                site: j,
                spin,
                kind: OperatorKind::Annihilate,
            },
        ])
    }

    /// The occupation-number correlator `n_{iσ}`
    pub fn occupation(site: usize, spin: Spin) -> Self {
        Self::one_body(site, site, spin)
    }

    /// The insertions in operator order (leftmost first)
    pub fn insertions(&self) -> &[Insertion] {
        &self.insertions
    }
}

/// An expectation value keyed by its descriptor and eigenpair index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    /// Index of the eigenpair the value was evaluated against
    pub eigenpair: usize,
    /// The operator string
    pub descriptor: CorrelatorDescriptor,
    /// The computed scalar
    pub value: Amplitude,
}

/// Evaluates operator strings against state vectors of one cluster
///
/// Holds a memoized basis per visited sector; the cache is a `RefCell`
/// workspace so repeated evaluations of related correlators share their
/// intermediate bases.
pub struct Evaluator {
    sites: usize,
    max_dimension: usize,
    partitioning: Partitioning,
    bases: RefCell<HashMap<Sector, Arc<Basis>>>,
}

impl Evaluator {
    /// An evaluator seeded with the sector basis the eigenvectors live in
    pub fn new(basis: &Arc<Basis>, max_dimension: usize) -> Self {
        let mut bases = HashMap::new();
        bases.insert(basis.sector(), Arc::clone(basis));
        Self {
            sites: basis.sites(),
            max_dimension,
            partitioning: Partitioning::default(),
            bases: RefCell::new(bases),
        }
    }

    /// Override the partitioning used for the final inner products
    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// The diagonal expectation value `⟨ψ|O|ψ⟩` within one sector
    pub fn evaluate(
        &self,
        state: &StateVector,
        sector: Sector,
        descriptor: &CorrelatorDescriptor,
    ) -> Result<Amplitude, EvaluationError> {
        self.evaluate_between(state, sector, state, sector, descriptor)
    }

    /// The matrix element `⟨φ|O|ψ⟩` between two (possibly different) sectors
    ///
    /// Used for off-diagonal and dynamical correlators where bra and ket are
    /// different eigenvectors.
    pub fn evaluate_between(
        &self,
        bra: &StateVector,
        bra_sector: Sector,
        ket: &StateVector,
        ket_sector: Sector,
        descriptor: &CorrelatorDescriptor,
    ) -> Result<Amplitude, EvaluationError> {
        let path = self.sector_walk(bra_sector, ket_sector, descriptor)?;

        let mut current = ket.clone();
        let mut current_basis = self.basis_for(ket_sector, bra_sector)?;
        for (insertion, target_sector) in descriptor
            .insertions
            .iter()
            .rev()
            .zip(path.into_iter().skip(1))
        {
            let target_basis = self.basis_for(target_sector, bra_sector)?;
            current = apply_insertion(&current, &current_basis, &target_basis, *insertion);
            current_basis = target_basis;
        }

        let value = matvec::dot(bra, &current, self.partitioning);
        if !(value.re.is_finite() && value.im.is_finite()) {
            return Err(EvaluationError::NumericalInstability(format!(
                "correlator evaluation produced a non-finite value {value}"
            )));
        }
        Ok(value)
    }

    /// The one-body correlation matrix `⟨c†_{iσ} c_{jσ}⟩` for one species
    pub fn one_body_matrix(
        &self,
        state: &StateVector,
        sector: Sector,
        spin: Spin,
    ) -> Result<DMatrix<Amplitude>, EvaluationError> {
        let mut matrix = DMatrix::from_element(self.sites, self.sites, Amplitude::new(0.0, 0.0));
        for (i, j) in (0..self.sites).cartesian_product(0..self.sites) {
            let descriptor = CorrelatorDescriptor::one_body(i, j, spin);
            matrix[(i, j)] = self.evaluate(state, sector, &descriptor)?;
        }
        Ok(matrix)
    }

    /// Validate the sector sequence the string walks through
    fn sector_walk(
        &self,
        bra_sector: Sector,
        ket_sector: Sector,
        descriptor: &CorrelatorDescriptor,
    ) -> Result<Vec<Sector>, EvaluationError> {
        let mut path = vec![ket_sector];
        for insertion in descriptor.insertions.iter().rev() {
            let mut sector = *path.last().expect("the walk starts from the ket sector");
            let count = match insertion.spin {
                Spin::Up => &mut sector.n_up,
                Spin::Down => &mut sector.n_down,
            };
            match insertion.kind {
                OperatorKind::Create => {
                    if *count >= self.sites {
                        return Err(EvaluationError::SectorMismatch {
                            reason: format!(
                                "creation at site {} overfills the {:?} species",
                                insertion.site, insertion.spin
                            ),
                            bra: bra_sector,
                        });
                    }
                    *count += 1;
                }
                OperatorKind::Annihilate => {
                    if *count == 0 {
                        return Err(EvaluationError::SectorMismatch {
                            reason: format!(
                                "annihilation at site {} empties the {:?} species below zero",
                                insertion.site, insertion.spin
                            ),
                            bra: bra_sector,
                        });
                    }
                    *count -= 1;
                }
            }
            path.push(sector);
        }
        let final_sector = *path.last().expect("the walk is never empty");
        if final_sector != bra_sector {
            return Err(EvaluationError::SectorMismatch {
                reason: format!(
                    "operator string maps the ket into sector {final_sector:?}, \
                     which the bra does not live in"
                ),
                bra: bra_sector,
            });
        }
        Ok(path)
    }

    fn basis_for(
        &self,
        sector: Sector,
        bra_sector: Sector,
    ) -> Result<Arc<Basis>, EvaluationError> {
        if let Some(basis) = self.bases.borrow().get(&sector) {
            return Ok(Arc::clone(basis));
        }
        let basis = Basis::enumerate(self.sites, sector, self.max_dimension).map_err(|error| {
            EvaluationError::SectorMismatch {
                reason: format!("intermediate sector {sector:?} is not representable: {error}"),
                bra: bra_sector,
            }
        })?;
        let basis = Arc::new(basis);
        self.bases
            .borrow_mut()
            .insert(sector, Arc::clone(&basis));
        Ok(basis)
    }
}

/// Apply one insertion, mapping a vector between neighbouring sector bases
fn apply_insertion(
    vector: &StateVector,
    from: &Basis,
    to: &Basis,
    insertion: Insertion,
) -> StateVector {
    let mode = from.mode(insertion.site, insertion.spin);
    let mask = 1u64 << mode;
    let mut out = StateVector::zeros(to.dimension());
    for (index, amplitude) in vector.iter().enumerate() {
        if amplitude.re == 0.0 && amplitude.im == 0.0 {
            continue;
        }
        let word = from.state(index);
        let target = match insertion.kind {
            OperatorKind::Create => {
                if word & mask != 0 {
                    continue;
                }
                word | mask
            }
            OperatorKind::Annihilate => {
                if word & mask == 0 {
                    continue;
                }
                word & !mask
            }
        };
        let target_index = to
            .index_of(target)
            .expect("insertion targets lie in the walked sector by construction");
        out[target_index] += amplitude * jw_sign(word, mode);
    }
    out
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{CorrelatorDescriptor, Evaluator, Insertion, OperatorKind};
    use crate::basis::{Basis, Sector, Spin};
    use crate::error::EvaluationError;
    use crate::lattice::LatticeSpec;
    use crate::operator::HamiltonianBuilder;
    use crate::solver::{LanczosSolver, SolverConfig};
    use approx::assert_relative_eq;

    fn two_site_ground_state() -> (Arc<Basis>, crate::StateVector) {
        let lattice = LatticeSpec::chain(2, 1.0, 0.0).unwrap();
        let basis = Arc::new(Basis::enumerate(2, Sector::new(1, 0), 1 << 20).unwrap());
        let hamiltonian = HamiltonianBuilder::new()
            .with_lattice(&lattice)
            .with_basis(&basis)
            .build()
            .unwrap();
        let pairs = LanczosSolver::new(&hamiltonian, SolverConfig::default())
            .solve()
            .unwrap();
        (basis, pairs.into_iter().next().unwrap().vector)
    }

    #[test]
    fn occupation_of_the_bonding_state_is_half() {
        let (basis, ground) = two_site_ground_state();
        let evaluator = Evaluator::new(&basis, 1 << 20);
        let value = evaluator
            .evaluate(
                &ground,
                basis.sector(),
                &CorrelatorDescriptor::occupation(0, Spin::Up),
            )
            .unwrap();
        assert_relative_eq!(value.re, 0.5, epsilon = 1e-9);
        assert_relative_eq!(value.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn hopping_correlator_of_the_bonding_state_is_half() {
        let (basis, ground) = two_site_ground_state();
        let evaluator = Evaluator::new(&basis, 1 << 20);
        let value = evaluator
            .evaluate(
                &ground,
                basis.sector(),
                &CorrelatorDescriptor::one_body(0, 1, Spin::Up),
            )
            .unwrap();
        assert_relative_eq!(value.re, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn one_body_matrix_of_the_bonding_state() {
        let (basis, ground) = two_site_ground_state();
        let evaluator = Evaluator::new(&basis, 1 << 20);
        let matrix = evaluator
            .one_body_matrix(&ground, basis.sector(), Spin::Up)
            .unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(matrix[(i, j)].re, 0.5, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn unbalanced_string_is_a_sector_mismatch() {
        let (basis, ground) = two_site_ground_state();
        let evaluator = Evaluator::new(&basis, 1 << 20);
        let lone_creation = CorrelatorDescriptor::new(vec![Insertion {
            site: 0,
            spin: Spin::Up,
            kind: OperatorKind::Create,
        }]);
        let result = evaluator.evaluate(&ground, basis.sector(), &lone_creation);
        assert!(matches!(
            result,
            Err(EvaluationError::SectorMismatch { .. })
        ));
    }

    #[test]
    fn annihilating_an_empty_species_is_a_sector_mismatch() {
        let (basis, ground) = two_site_ground_state();
        let evaluator = Evaluator::new(&basis, 1 << 20);
        // the sector holds no down particles at all
        let descriptor = CorrelatorDescriptor::one_body(0, 0, Spin::Down);
        let result = evaluator.evaluate(&ground, basis.sector(), &descriptor);
        assert!(matches!(
            result,
            Err(EvaluationError::SectorMismatch { .. })
        ));
    }

    #[test]
    fn pair_correlator_on_the_hubbard_dimer_is_suppressed_by_u() {
        let solve = |u: f64| {
            let lattice = LatticeSpec::chain(2, 1.0, u).unwrap();
            let basis = Arc::new(Basis::enumerate(2, Sector::new(1, 1), 1 << 20).unwrap());
            let hamiltonian = HamiltonianBuilder::new()
                .with_lattice(&lattice)
                .with_basis(&basis)
                .build()
                .unwrap();
            let pairs = LanczosSolver::new(&hamiltonian, SolverConfig::default())
                .solve()
                .unwrap();
            let evaluator = Evaluator::new(&basis, 1 << 20);
            // double occupancy of site 0
            let descriptor = CorrelatorDescriptor::new(vec![
                Insertion {
                    site: 0,
                    spin: Spin::Up,
                    kind: OperatorKind::Create,
                },
                Insertion {
                    site: 0,
                    spin: Spin::Up,
                    kind: OperatorKind::Annihilate,
                },
                Insertion {
                    site: 0,
                    spin: Spin::Down,
                    kind: OperatorKind::Create,
                },
                Insertion {
                    site: 0,
                    spin: Spin::Down,
                    kind: OperatorKind::Annihilate,
                },
            ]);
            evaluator
                .evaluate(&pairs[0].vector, basis.sector(), &descriptor)
                .unwrap()
                .re
        };
        let weak = solve(0.1);
        let strong = solve(8.0);
        assert!(weak > strong, "interaction should suppress double occupancy");
        assert!(strong > 0.0 && weak < 0.5);
    }
}
