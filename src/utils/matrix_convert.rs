//! Matrix conversion utilities.
//!
//! Vectors and matrices are carried around as `ndarray` arrays; the SVD kernel
//! works on `nalgebra` matrices. These functions copy between the two
//! representations, including the empty (zero-row or zero-column) case.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Convert an ndarray Array2 to a nalgebra DMatrix.
///
/// # Arguments
///
/// * `arr` - The ndarray Array2 to convert
///
/// # Returns
///
/// * A nalgebra DMatrix with the same data
pub fn ndarray_to_nalgebra(arr: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Convert an ndarray Array1 to a nalgebra DVector.
pub fn ndarray_vec_to_nalgebra(arr: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(arr.len(), arr.iter().copied())
}

/// Convert a nalgebra DVector to an ndarray Array1.
pub fn nalgebra_vec_to_ndarray(vec: &DVector<f64>) -> Array1<f64> {
    vec.iter().copied().collect()
}

/// Scale the rows of `mat` by the entries of `diag` (`diag(d) * mat`).
pub fn scale_rows(diag: &Array1<f64>, mat: &Array2<f64>) -> Array2<f64> {
    let mut out = mat.clone();
    for (mut row, d) in out.rows_mut().into_iter().zip(diag.iter()) {
        row *= *d;
    }
    out
}
