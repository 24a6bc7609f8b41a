//! Bridging helpers between the ndarray containers used throughout the
//! estimator and the nalgebra routines used for factorizations and solves.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

/// Convert an ndarray matrix to a nalgebra `DMatrix`.
pub fn dmatrix_from_array(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

/// Convert a nalgebra `DMatrix` back to an ndarray matrix.
pub fn array_from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Lower-triangular Cholesky factor `L` with `P = L·Lᵀ`.
///
/// Returns `None` when the matrix is not positive-definite; callers decide
/// whether that is fatal (it is, during filtering).
pub fn cholesky_lower(p: &Array2<f64>) -> Option<Array2<f64>> {
    let m = dmatrix_from_array(p);
    m.cholesky().map(|chol| array_from_dmatrix(&chol.l()))
}

/// Matrix inverse via nalgebra, `None` when singular.
pub fn try_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    dmatrix_from_array(m)
        .try_inverse()
        .map(|inv| array_from_dmatrix(&inv))
}

/// Force symmetry of a covariance matrix: `(P + Pᵀ) / 2`.
pub fn symmetrize(p: &Array2<f64>) -> Array2<f64> {
    let p_t = p.t();
    (p + &p_t) * 0.5
}

/// Outer product `a·bᵀ`.
pub fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}
