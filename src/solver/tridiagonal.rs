//! The Lanczos tridiagonal record
//!
//! The three-term recurrence accumulates one diagonal coefficient per
//! iteration and one off-diagonal coefficient per extension of the Krylov
//! basis. The record grows monotonically until convergence or the iteration
//! cap and is diagonalized as a small dense symmetric matrix to estimate the
//! target eigenvalue; nalgebra does not sort the eigenvalues, so the lowest
//! one is found by a scan.

use nalgebra::DMatrix;

/// Append-only record of Lanczos recurrence coefficients
#[derive(Debug, Clone, Default)]
pub struct TridiagonalRecord {
    alphas: Vec<f64>,
    betas: Vec<f64>,
}

impl TridiagonalRecord {
    /// An empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed iterations (the order of the tridiagonal matrix)
    pub fn len(&self) -> usize {
        self.alphas.len()
    }

    /// Whether no iteration has completed yet
    pub fn is_empty(&self) -> bool {
        self.alphas.is_empty()
    }

    /// Record the diagonal coefficient of the current iteration
    pub fn push_diagonal(&mut self, alpha: f64) {
        self.alphas.push(alpha);
    }

    /// Record the off-diagonal coefficient coupling to the next iteration
    pub fn push_off_diagonal(&mut self, beta: f64) {
        self.betas.push(beta);
    }

    /// Diagonalize the record and return the lowest eigenvalue with its
    /// eigenvector in the Krylov basis
    pub fn lowest_eigenpair(&self) -> (f64, Vec<f64>) {
        let order = self.alphas.len();
        assert!(order > 0, "cannot diagonalize an empty record");
        if order == 1 {
            return (self.alphas[0], vec![1.0]);
        }
        let mut matrix = DMatrix::zeros(order, order);
        for (row, &alpha) in self.alphas.iter().enumerate() {
            matrix[(row, row)] = alpha;
        }
        for (row, &beta) in self.betas.iter().take(order - 1).enumerate() {
            matrix[(row, row + 1)] = beta;
            matrix[(row + 1, row)] = beta;
        }
        let eigen = matrix.symmetric_eigen();
        let mut lowest = 0;
        for index in 1..order {
            if eigen.eigenvalues[index] < eigen.eigenvalues[lowest] {
                lowest = index;
            }
        }
        let vector = eigen.eigenvectors.column(lowest).iter().copied().collect();
        (eigen.eigenvalues[lowest], vector)
    }
}
