//! Integration tests for matrix conversion utilities.

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use ndarray::{array, Array1, Array2};
use svdopt_rs::utils::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
    scale_rows,
};

#[test]
fn test_ndarray_nalgebra_roundtrip_2d() {
    // Create a test matrix with known values
    let arr = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

    let mat = ndarray_to_nalgebra(&arr);
    assert_eq!(mat.shape(), (3, 2));
    assert_relative_eq!(mat[(2, 1)], 6.0);

    let arr2 = nalgebra_to_ndarray(&mat);
    assert_eq!(arr.shape(), arr2.shape());
    for i in 0..arr.nrows() {
        for j in 0..arr.ncols() {
            assert_relative_eq!(arr[[i, j]], arr2[[i, j]], epsilon = 1e-10);
        }
    }
}

#[test]
fn test_ndarray_nalgebra_roundtrip_1d() {
    let arr = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let v = ndarray_vec_to_nalgebra(&arr);
    assert_eq!(v.len(), 5);
    let arr2 = nalgebra_vec_to_ndarray(&v);
    assert_eq!(arr, arr2);
}

#[test]
fn test_products_agree_across_representations() {
    let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
    let x = array![0.5, -1.0];

    let nd = a.dot(&x);
    let na: DVector<f64> = ndarray_to_nalgebra(&a) * ndarray_vec_to_nalgebra(&x);
    assert_eq!(nalgebra_vec_to_ndarray(&na), nd);

    let ata: DMatrix<f64> = ndarray_to_nalgebra(&a).transpose() * ndarray_to_nalgebra(&a);
    assert_eq!(nalgebra_to_ndarray(&ata), a.t().dot(&a));
}

#[test]
fn test_scale_rows_matches_diagonal_product() {
    let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
    let d = array![1.0, 2.0, 3.0];
    let expected = Array2::from_diag(&d).dot(&a);
    assert_eq!(scale_rows(&d, &a), expected);
}
