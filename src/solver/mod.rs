//! Lanczos eigensolver
//!
//! Extracts the lowest eigenpairs of the Hamiltonian using only matrix-vector
//! products. Each iteration applies the operator through the matrix-vector
//! engine, orthogonalizes against the previous two Lanczos vectors via the
//! three-term recurrence, periodically re-orthogonalizes against the whole
//! stored basis to counter floating-point drift, and diagonalizes the
//! accumulated tridiagonal record to estimate the target eigenvalue.
//!
//! The solver moves through `Initialized → Iterating → {Converged |
//! MaxIterationsReached | NumericalBreakdown}`. Breakdown (the off-diagonal
//! coefficient collapsing before convergence) indicates a starting vector
//! deficient in the target invariant subspace and is retried with a fresh
//! random start up to the configured restart budget. Additional eigenpairs
//! are obtained by deflation: every new Krylov vector is projected against
//! the previously converged eigenvectors, which is also what recovers
//! degenerate subspaces across restarts.

pub mod cg;
pub mod tridiagonal;

use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::matvec::{self, Partitioning};
use crate::operator::Hamiltonian;
use crate::{Amplitude, StateVector};
use tridiagonal::TridiagonalRecord;

/// Explicit, immutable eigensolver configuration
///
/// Every knob that influences the iteration is a field here, never a hidden
/// heuristic, so runs are reproducible and the breakdown paths are testable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Convergence threshold on the change of the eigenvalue estimate
    pub tolerance: f64,
    /// Iteration cap per restart attempt
    pub max_iterations: usize,
    /// Re-orthogonalize against all stored Lanczos vectors every this many
    /// iterations (0 disables the periodic pass)
    pub reorth_period: usize,
    /// Number of fresh random starting vectors tried after a breakdown
    pub max_restarts: usize,
    /// Off-diagonal coefficient below which the recurrence has broken down
    pub breakdown_tolerance: f64,
    /// Number of eigenpairs to extract, lowest first
    pub num_eigenpairs: usize,
    /// Seed for the random starting vectors
    pub seed: u64,
    /// Optional wall-clock budget for the whole solve
    pub max_seconds: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 500,
            reorth_period: 8,
            max_restarts: 3,
            breakdown_tolerance: 1e-12,
            num_eigenpairs: 1,
            seed: 1234,
            max_seconds: None,
        }
    }
}

/// How an eigenpair left the iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// The eigenvalue estimate stabilized below the tolerance
    Converged,
    /// The iteration or wall-clock budget ran out; the pair is the best
    /// available estimate and the caller decides whether that is fatal
    MaxIterationsReached,
}

/// A converged (or best-effort) eigenvalue with its eigenvector
#[derive(Debug, Clone)]
pub struct Eigenpair {
    /// The eigenvalue
    pub energy: f64,
    /// The eigenvector in the sector basis, normalized
    pub vector: StateVector,
    /// Whether the pair converged within budget
    pub status: ConvergenceStatus,
    /// Lanczos iterations spent on this pair (final attempt only)
    pub iterations: usize,
    /// Restart attempts consumed by breakdowns before this pair was found
    pub restarts: usize,
}

enum Outcome {
    Done(Eigenpair),
    Breakdown { beta: f64 },
}

/// Lanczos iteration driver over a borrowed Hamiltonian
pub struct LanczosSolver<'a> {
    hamiltonian: &'a Hamiltonian,
    config: SolverConfig,
    partitioning: Partitioning,
}

impl<'a> LanczosSolver<'a> {
    /// A solver over `hamiltonian` with the given configuration
    pub fn new(hamiltonian: &'a Hamiltonian, config: SolverConfig) -> Self {
        Self {
            hamiltonian,
            config,
            partitioning: Partitioning::default(),
        }
    }

    /// Override the basis partitioning used for operator application
    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Extract the configured number of eigenpairs from random starts
    pub fn solve(&self) -> Result<Vec<Eigenpair>, SolverError> {
        self.solve_inner(None)
    }

    /// Extract eigenpairs, seeding the first search with a caller-supplied
    /// starting vector (it is normalized internally)
    pub fn solve_with_start(&self, start: StateVector) -> Result<Vec<Eigenpair>, SolverError> {
        self.solve_inner(Some(start))
    }

    #[tracing::instrument(name = "Lanczos solve", level = "info", skip_all)]
    fn solve_inner(&self, start: Option<StateVector>) -> Result<Vec<Eigenpair>, SolverError> {
        let dimension = self.hamiltonian.dimension();
        let requested = self.config.num_eigenpairs.min(dimension).max(1);
        let deadline = self
            .config
            .max_seconds
            .map(|seconds| Instant::now() + Duration::from_secs_f64(seconds));
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut pairs: Vec<Eigenpair> = Vec::with_capacity(requested);
        for target in 0..requested {
            let supplied = if target == 0 { start.as_ref() } else { None };
            let deflation: Vec<&StateVector> = pairs.iter().map(|pair| &pair.vector).collect();
            let pair = self.solve_one(supplied, &deflation, &mut rng, deadline)?;
            tracing::info!(
                target,
                energy = pair.energy,
                iterations = pair.iterations,
                restarts = pair.restarts,
                status = ?pair.status,
                "eigenpair extracted"
            );
            pairs.push(pair);
        }
        Ok(pairs)
    }

    fn solve_one(
        &self,
        start: Option<&StateVector>,
        deflation: &[&StateVector],
        rng: &mut StdRng,
        deadline: Option<Instant>,
    ) -> Result<Eigenpair, SolverError> {
        let attempts = self.config.max_restarts + 1;
        let mut last_beta = 0.0;
        for attempt in 0..attempts {
            let mut initial = match (attempt, start) {
                (0, Some(vector)) => vector.clone(),
                _ => self.random_vector(rng),
            };
            self.project_out(&mut initial, deflation);
            let length = matvec::norm(&initial, self.partitioning);
            if !length.is_finite() {
                return Err(SolverError::NumericalInstability(
                    "starting vector has non-finite norm".into(),
                ));
            }
            if length <= self.config.breakdown_tolerance {
                // start lies in the deflated subspace; count as a breakdown
                last_beta = length;
                continue;
            }
            initial /= Amplitude::from(length);

            match self.iterate(initial, deflation, deadline, attempt)? {
                Outcome::Done(pair) => return Ok(pair),
                Outcome::Breakdown { beta } => {
                    tracing::warn!(
                        attempt,
                        beta,
                        "Lanczos breakdown before convergence, restarting"
                    );
                    last_beta = beta;
                }
            }
        }
        Err(SolverError::Diverged {
            attempts,
            last_beta,
        })
    }

    /// One full Lanczos pass from a normalized starting vector
    fn iterate(
        &self,
        initial: StateVector,
        deflation: &[&StateVector],
        deadline: Option<Instant>,
        attempt: usize,
    ) -> Result<Outcome, SolverError> {
        let dimension = self.hamiltonian.dimension();
        let max_iterations = self.config.max_iterations.max(1);
        let one = Amplitude::new(1.0, 0.0);

        // The store is append-only while iterating; it is read back by the
        // periodic re-orthogonalization and the reconstruction pass.
        let mut vectors: Vec<StateVector> = vec![initial];
        let mut record = TridiagonalRecord::new();
        let mut previous_estimate: Option<f64> = None;
        let mut beta_previous = 0.0;

        loop {
            let step = record.len();
            let current = &vectors[step];
            let mut next = matvec::apply(self.hamiltonian, current, self.partitioning);
            let alpha = matvec::dot(current, &next, self.partitioning).re;

            // Three-term recurrence
            next.axpy(Amplitude::from(-alpha), current, one);
            if step > 0 {
                next.axpy(Amplitude::from(-beta_previous), &vectors[step - 1], one);
            }
            // Keep the Krylov space orthogonal to already-converged pairs
            self.project_out(&mut next, deflation);
            // Periodic full re-orthogonalization against the stored basis
            if self.config.reorth_period > 0 && (step + 1) % self.config.reorth_period == 0 {
                for old in &vectors {
                    let overlap = matvec::dot(old, &next, self.partitioning);
                    next.axpy(-overlap, old, one);
                }
            }

            let beta = matvec::norm(&next, self.partitioning);
            if !alpha.is_finite() || !beta.is_finite() {
                return Err(SolverError::NumericalInstability(format!(
                    "non-finite recurrence coefficients at iteration {} (α = {alpha}, β = {beta})",
                    step + 1
                )));
            }

            record.push_diagonal(alpha);
            let iterations = record.len();
            let (estimate, krylov_vector) = record.lowest_eigenpair();
            tracing::trace!(iteration = iterations, estimate, beta, "Lanczos step");

            // Exhausting the Krylov space makes the tridiagonal problem exact
            let exhausted = iterations == dimension;
            let converged = exhausted
                || previous_estimate
                    .map_or(false, |previous| (previous - estimate).abs() <= self.config.tolerance);
            if converged {
                return Ok(Outcome::Done(self.reconstruct(
                    &vectors,
                    &krylov_vector,
                    estimate,
                    iterations,
                    attempt,
                    ConvergenceStatus::Converged,
                )));
            }

            let out_of_time = deadline.map_or(false, |limit| Instant::now() >= limit);
            if iterations >= max_iterations || out_of_time {
                return Ok(Outcome::Done(self.reconstruct(
                    &vectors,
                    &krylov_vector,
                    estimate,
                    iterations,
                    attempt,
                    ConvergenceStatus::MaxIterationsReached,
                )));
            }

            if beta <= self.config.breakdown_tolerance {
                return Ok(Outcome::Breakdown { beta });
            }

            record.push_off_diagonal(beta);
            next /= Amplitude::from(beta);
            vectors.push(next);
            previous_estimate = Some(estimate);
            beta_previous = beta;
        }
    }

    /// Combine the stored Lanczos vectors with the eigenvector of the
    /// tridiagonal problem to recover the full-basis eigenvector
    fn reconstruct(
        &self,
        vectors: &[StateVector],
        krylov_vector: &[f64],
        energy: f64,
        iterations: usize,
        restarts: usize,
        status: ConvergenceStatus,
    ) -> Eigenpair {
        let mut eigenvector = StateVector::zeros(self.hamiltonian.dimension());
        for (coefficient, lanczos_vector) in krylov_vector.iter().zip(vectors.iter()) {
            eigenvector.axpy(
                Amplitude::from(*coefficient),
                lanczos_vector,
                Amplitude::new(1.0, 0.0),
            );
        }
        let length = matvec::norm(&eigenvector, self.partitioning);
        if length > 0.0 {
            eigenvector /= Amplitude::from(length);
        }
        Eigenpair {
            energy,
            vector: eigenvector,
            status,
            iterations,
            restarts,
        }
    }

    fn project_out(&self, vector: &mut StateVector, deflation: &[&StateVector]) {
        let one = Amplitude::new(1.0, 0.0);
        for converged in deflation {
            let overlap = matvec::dot(converged, vector, self.partitioning);
            vector.axpy(-overlap, *converged, one);
        }
    }

    fn random_vector(&self, rng: &mut StdRng) -> StateVector {
        StateVector::from_fn(self.hamiltonian.dimension(), |_, _| {
            Amplitude::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5)
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{ConvergenceStatus, LanczosSolver, SolverConfig};
    use crate::basis::{Basis, Sector};
    use crate::error::SolverError;
    use crate::lattice::LatticeSpec;
    use crate::operator::{Hamiltonian, HamiltonianBuilder};
    use crate::{Amplitude, StateVector};
    use approx::assert_relative_eq;

    fn build(lattice: &LatticeSpec, sector: Sector) -> Hamiltonian {
        let basis = Arc::new(Basis::enumerate(lattice.sites(), sector, 1 << 20).unwrap());
        HamiltonianBuilder::new()
            .with_lattice(lattice)
            .with_basis(&basis)
            .build()
            .unwrap()
    }

    #[test]
    fn two_site_chain_single_particle_ground_state() {
        let lattice = LatticeSpec::chain(2, 1.0, 0.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(1, 0));
        let pairs = LanczosSolver::new(&hamiltonian, SolverConfig::default())
            .solve()
            .unwrap();
        let ground = &pairs[0];
        assert_eq!(ground.status, ConvergenceStatus::Converged);
        assert_relative_eq!(ground.energy, -1.0, epsilon = 1e-10);
        // bonding state: equal weight on both sites
        assert_relative_eq!(ground.vector[0].norm(), (0.5f64).sqrt(), epsilon = 1e-8);
        assert_relative_eq!(ground.vector[1].norm(), (0.5f64).sqrt(), epsilon = 1e-8);
    }

    #[test]
    fn hubbard_dimer_matches_closed_form() {
        // E0 = (U - sqrt(U^2 + 16 t^2)) / 2 at half filling
        let (t, u) = (1.0, 4.0);
        let lattice = LatticeSpec::chain(2, t, u).unwrap();
        let hamiltonian = build(&lattice, Sector::new(1, 1));
        let pairs = LanczosSolver::new(&hamiltonian, SolverConfig::default())
            .solve()
            .unwrap();
        let expected = (u - (u * u + 16.0 * t * t).sqrt()) / 2.0;
        assert_relative_eq!(pairs[0].energy, expected, epsilon = 1e-9);
        assert!(pairs[0].iterations <= hamiltonian.dimension());
    }

    #[test]
    fn deflation_recovers_the_excited_state() {
        let lattice = LatticeSpec::chain(2, 1.0, 0.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(1, 0));
        let config = SolverConfig {
            num_eigenpairs: 2,
            ..SolverConfig::default()
        };
        let pairs = LanczosSolver::new(&hamiltonian, config).solve().unwrap();
        assert_relative_eq!(pairs[0].energy, -1.0, epsilon = 1e-9);
        assert_relative_eq!(pairs[1].energy, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn orthogonal_start_triggers_one_restart_and_converges() {
        let lattice = LatticeSpec::chain(2, 1.0, 0.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(1, 0));
        // exact antibonding eigenvector: orthogonal to the ground state
        let weight = Amplitude::from((0.5f64).sqrt());
        let start = StateVector::from_vec(vec![weight, -weight]);
        let pairs = LanczosSolver::new(&hamiltonian, SolverConfig::default())
            .solve_with_start(start)
            .unwrap();
        assert_eq!(pairs[0].restarts, 1);
        assert_relative_eq!(pairs[0].energy, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn forced_breakdown_on_every_attempt_diverges() {
        let lattice = LatticeSpec::chain(2, 1.0, 0.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(1, 0));
        let config = SolverConfig {
            // every off-diagonal coefficient is "zero" under this threshold
            breakdown_tolerance: 1e10,
            max_restarts: 2,
            ..SolverConfig::default()
        };
        let result = LanczosSolver::new(&hamiltonian, config).solve();
        match result {
            Err(SolverError::Diverged { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn one_dimensional_sector_converges_immediately() {
        // both sites doubly occupied: a single state with energy 2U
        let lattice = LatticeSpec::chain(2, 1.0, 4.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(2, 2));
        let pairs = LanczosSolver::new(&hamiltonian, SolverConfig::default())
            .solve()
            .unwrap();
        assert_eq!(pairs[0].iterations, 1);
        assert_eq!(pairs[0].status, ConvergenceStatus::Converged);
        assert_relative_eq!(pairs[0].energy, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn exhausted_wall_clock_budget_returns_best_estimate_with_status() {
        let lattice = LatticeSpec::chain(6, 1.0, 4.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(2, 2));
        // a zero budget expires after the first iteration
        let config = SolverConfig {
            max_seconds: Some(0.0),
            tolerance: 1e-16,
            ..SolverConfig::default()
        };
        let pairs = LanczosSolver::new(&hamiltonian, config).solve().unwrap();
        assert_eq!(pairs[0].status, ConvergenceStatus::MaxIterationsReached);
        assert!(pairs[0].iterations >= 1);
        assert!(pairs[0].energy.is_finite());
    }

    #[test]
    fn iteration_cap_returns_best_estimate_with_status() {
        let lattice = LatticeSpec::chain(6, 1.0, 4.0).unwrap();
        let hamiltonian = build(&lattice, Sector::new(2, 2));
        let config = SolverConfig {
            max_iterations: 3,
            tolerance: 1e-16,
            ..SolverConfig::default()
        };
        let pairs = LanczosSolver::new(&hamiltonian, config).solve().unwrap();
        assert_eq!(pairs[0].status, ConvergenceStatus::MaxIterationsReached);
        assert_eq!(pairs[0].iterations, 3);
        assert!(pairs[0].energy.is_finite());
    }
}
