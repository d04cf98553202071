//! The calculation driver
//!
//! Assembles a full run from validated inputs: enumerate the sector basis,
//! build the implicit Hamiltonian, extract the requested eigenpairs,
//! optionally polish them by conjugate-gradient refinement, and evaluate the
//! requested correlators plus the standard derived observables against every
//! eigenvector. The builder is typestate-checked, so a calculation without a
//! lattice or a sector does not compile.

use std::sync::Arc;

use crate::basis::{Basis, Sector};
use crate::error::Error;
use crate::expectation::totalspin::{total_spin, TotalSpin};
use crate::expectation::{CorrelatorDescriptor, Evaluator, Expectation};
use crate::lattice::LatticeSpec;
use crate::matvec::{self, Partitioning};
use crate::operator::HamiltonianBuilder;
use crate::solver::cg::{refine_eigenvector, CgConfig};
use crate::solver::{Eigenpair, LanczosSolver, SolverConfig};

/// Ceiling on the sector dimension unless the caller overrides it
pub const DEFAULT_MAX_DIMENSION: usize = 1 << 26;

/// The complete result record of one calculation
#[derive(Debug, Clone)]
pub struct CalculationOutput {
    /// The extracted eigenpairs, lowest first
    pub eigenpairs: Vec<Eigenpair>,
    /// One expectation value per requested descriptor per eigenpair
    pub expectations: Vec<Expectation>,
    /// `⟨S²⟩` and `⟨Sz⟩` of each eigenvector
    pub spin: Vec<TotalSpin>,
    /// The energy variance `⟨H²⟩ - ⟨H⟩²` of each eigenvector
    ///
    /// Vanishes on an exact eigenstate, so it is the standard convergence
    /// check that needs no reference value.
    pub variances: Vec<f64>,
}

/// Typestate builder for a calculation
///
/// `with_lattice` and `with_sector` must both be called before `run` exists.
pub struct CalculationBuilder<RefLattice, SectorState> {
    lattice: RefLattice,
    sector: SectorState,
    solver_config: SolverConfig,
    refinement: Option<CgConfig>,
    partitioning: Partitioning,
    max_dimension: usize,
    descriptors: Vec<CorrelatorDescriptor>,
}

impl CalculationBuilder<(), ()> {
    /// An empty builder
    pub fn new() -> Self {
        Self {
            lattice: (),
            sector: (),
            solver_config: SolverConfig::default(),
            refinement: None,
            partitioning: Partitioning::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            descriptors: Vec::new(),
        }
    }
}

impl Default for CalculationBuilder<(), ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<RefLattice, SectorState> CalculationBuilder<RefLattice, SectorState> {
    /// Attach the lattice the calculation runs on
    pub fn with_lattice(
        self,
        lattice: &LatticeSpec,
    ) -> CalculationBuilder<&LatticeSpec, SectorState> {
        CalculationBuilder {
            lattice,
            sector: self.sector,
            solver_config: self.solver_config,
            refinement: self.refinement,
            partitioning: self.partitioning,
            max_dimension: self.max_dimension,
            descriptors: self.descriptors,
        }
    }

    /// Attach the symmetry sector to diagonalize in
    pub fn with_sector(self, sector: Sector) -> CalculationBuilder<RefLattice, Sector> {
        CalculationBuilder {
            lattice: self.lattice,
            sector,
            solver_config: self.solver_config,
            refinement: self.refinement,
            partitioning: self.partitioning,
            max_dimension: self.max_dimension,
            descriptors: self.descriptors,
        }
    }

    /// Override the eigensolver configuration
    pub fn with_solver_config(mut self, config: SolverConfig) -> Self {
        self.solver_config = config;
        self
    }

    /// Polish every converged eigenvector by one shifted inverse-iteration
    /// step
    pub fn with_refinement(mut self, config: CgConfig) -> Self {
        self.refinement = Some(config);
        self
    }

    /// Override the basis partitioning shared by every parallel pass
    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Override the ceiling on the sector dimension
    pub fn with_max_dimension(mut self, max_dimension: usize) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Request correlators to evaluate against every eigenvector
    pub fn with_descriptors(mut self, descriptors: Vec<CorrelatorDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }
}

impl<'a> CalculationBuilder<&'a LatticeSpec, Sector> {
    /// Run the calculation to completion
    #[tracing::instrument(name = "Calculation", level = "info", skip_all, fields(
        sites = self.lattice.sites(),
        n_up = self.sector.n_up,
        n_down = self.sector.n_down,
    ))]
    pub fn run(self) -> Result<CalculationOutput, Error> {
        let basis = Arc::new(Basis::enumerate(
            self.lattice.sites(),
            self.sector,
            self.max_dimension,
        )?);
        let hamiltonian = HamiltonianBuilder::new()
            .with_lattice(self.lattice)
            .with_basis(&basis)
            .build()?;

        let mut eigenpairs = LanczosSolver::new(&hamiltonian, self.solver_config.clone())
            .with_partitioning(self.partitioning)
            .solve()?;
        if let Some(refinement) = self.refinement {
            for pair in eigenpairs.iter_mut() {
                pair.vector = refine_eigenvector(
                    &hamiltonian,
                    pair.energy,
                    &pair.vector,
                    refinement,
                    self.partitioning,
                )?;
            }
        }

        let mut variances = Vec::with_capacity(eigenpairs.len());
        let mut spin = Vec::with_capacity(eigenpairs.len());
        for pair in &eigenpairs {
            let applied = matvec::apply(&hamiltonian, &pair.vector, self.partitioning);
            let energy = matvec::dot(&pair.vector, &applied, self.partitioning).re;
            let square = matvec::dot(&applied, &applied, self.partitioning).re;
            variances.push(square - energy * energy);
            spin.push(total_spin(&basis, &pair.vector, self.partitioning)?);
        }

        let evaluator =
            Evaluator::new(&basis, self.max_dimension).with_partitioning(self.partitioning);
        let mut expectations =
            Vec::with_capacity(self.descriptors.len() * eigenpairs.len());
        for (index, pair) in eigenpairs.iter().enumerate() {
            for descriptor in &self.descriptors {
                let value = evaluator.evaluate(&pair.vector, self.sector, descriptor)?;
                expectations.push(Expectation {
                    eigenpair: index,
                    descriptor: descriptor.clone(),
                    value,
                });
            }
        }

        Ok(CalculationOutput {
            eigenpairs,
            expectations,
            spin,
            variances,
        })
    }
}
