//! Error taxonomy for the exact-diagonalization core
//!
//! Errors are grouped by the phase that raises them: construction of the basis
//! and operator, the eigensolver, and the expectation-value evaluator.
//! Construction errors indicate misconfiguration and are never retried;
//! solver breakdown is retried internally up to the configured restart budget
//! before it surfaces here; evaluation errors are always surfaced because a
//! silently zeroed correlator is indistinguishable from a vanishing one.

use miette::Diagnostic;

use crate::basis::Sector;

/// Errors raised while constructing the basis, lattice or Hamiltonian
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum BuildError {
    /// The requested symmetry sector is inconsistent with the lattice
    #[error("invalid sector: {0}")]
    InvalidSector(String),
    /// The sector dimension exceeds the configured maximum
    #[error("basis dimension {dimension} exceeds the configured maximum {maximum}")]
    BasisTooLarge {
        /// Exact combinatorial dimension of the requested sector
        dimension: u128,
        /// Configured ceiling on the basis dimension
        maximum: usize,
    },
    /// A bond or field references a site outside the lattice
    #[error("malformed lattice: {0}")]
    MalformedLattice(String),
}

/// Errors raised by the Lanczos/CG eigensolver
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum SolverError {
    /// Breakdown persisted through every configured restart attempt
    #[error(
        "eigensolver diverged: breakdown on all {attempts} restart attempts \
         (last off-diagonal {last_beta:.3e})"
    )]
    Diverged {
        /// Number of starting vectors tried, including the first
        attempts: usize,
        /// Off-diagonal coefficient at the final breakdown
        last_beta: f64,
    },
    /// A non-finite value appeared mid-iteration
    #[error("numerical instability in the eigensolver: {0}")]
    NumericalInstability(String),
}

/// Errors raised by the correlation-function evaluator
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum EvaluationError {
    /// The operator string leaves the representable sector lattice
    #[error("sector mismatch: {reason} (bra sector {bra:?})")]
    SectorMismatch {
        /// Why the string cannot be evaluated
        reason: String,
        /// Sector of the bra state the string was evaluated against
        bra: Sector,
    },
    /// A non-finite value appeared while applying the operator string
    #[error("numerical instability in the evaluator: {0}")]
    NumericalInstability(String),
}

/// Top-level error for the crate
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum Error {
    /// Construction-time failure
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Eigensolver failure
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// Evaluator failure
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
