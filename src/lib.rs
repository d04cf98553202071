//! Latticed is an exact-diagonalization engine for quantum lattice models
//!
//! # Overview
//! Latticed computes extremal eigenpairs and correlation functions of many-body
//! Hamiltonians for spinful fermions on finite lattices. The Hilbert space is
//! restricted to a symmetry sector with fixed particle number per spin species,
//! the Hamiltonian is kept as an implicit sparse operator (a closed set of term
//! rules applied state-by-state), and the lowest eigenpairs are extracted by
//! Lanczos iteration with optional conjugate-gradient refinement. Converged
//! eigenvectors feed a correlation-function evaluator which computes expectation
//! values of creation/annihilation operator strings and derived observables such
//! as the total spin.
//!
//! The crate is a numerical core only: it consumes validated in-memory
//! descriptions of the lattice, sector and solver settings, and produces
//! in-memory result records. Input-file parsing, output formatting and any
//! command-line surface belong to the surrounding tooling.
//!
//! # Usage
//! A calculation is assembled through builders:
//!
//! ```
//! use latticed::calculation::CalculationBuilder;
//! use latticed::lattice::LatticeSpec;
//! use latticed::basis::Sector;
//! use latticed::solver::SolverConfig;
//!
//! let lattice = LatticeSpec::chain(2, 1.0, 4.0).unwrap();
//! let output = CalculationBuilder::new()
//!     .with_lattice(&lattice)
//!     .with_sector(Sector::new(1, 1))
//!     .with_solver_config(SolverConfig::default())
//!     .run()
//!     .unwrap();
//! assert!(output.eigenpairs[0].energy < 0.0);
//! ```

#![warn(missing_docs)]

/// Sector-constrained many-body basis enumeration
pub mod basis;

/// The dispatcher-facing calculation driver
pub mod calculation;

/// Error handling
pub mod error;

/// Expectation values of operator strings and derived observables
pub mod expectation;

/// Lattice geometry and coupling parameters
pub mod lattice;

/// Parallel operator application and deterministic reductions
pub mod matvec;

/// The many-body Hamiltonian as an implicit sparse operator
pub mod operator;

/// Lanczos eigensolver and conjugate-gradient eigenvector refinement
pub mod solver;

pub use error::Error;

/// The scalar amplitude type used throughout the crate
pub type Amplitude = num_complex::Complex<f64>;

/// A dense many-body state vector indexed by basis-state index
pub type StateVector = nalgebra::DVector<Amplitude>;
