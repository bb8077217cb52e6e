//! Integration tests for the truncated SVD package.

use approx::assert_relative_eq;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use svdopt_rs::utils::{NalgebraSvd, SvdPackage};

fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
}

#[test]
fn test_full_rank_reconstruction() {
    let a = random_matrix(8, 5, 42);
    let svd = NalgebraSvd::default().factorize(&a, None).unwrap();
    assert_eq!(svd.rank(), 5);
    assert!(svd.sigma_trunc.is_empty());
    assert!(svd.sigma.windows(2).into_iter().all(|w| w[0] >= w[1]));

    let back = svd.u.dot(&Array2::from_diag(&svd.sigma)).dot(&svd.vt);
    for (x, y) in back.iter().zip(a.iter()) {
        assert_relative_eq!(x, y, epsilon = 1e-10);
    }
}

#[test]
fn test_rank_deficient_matrix_is_truncated() {
    // third column is the sum of the first two
    let mut a = random_matrix(6, 3, 7);
    for i in 0..6 {
        a[[i, 2]] = a[[i, 0]] + a[[i, 1]];
    }
    let svd = NalgebraSvd::default().factorize(&a, None).unwrap();
    assert_eq!(svd.rank(), 2);
    assert_eq!(svd.sigma_trunc.len(), 1);
    assert!(svd.sigma_trunc[0] <= 5e-7 * svd.sigma[0]);
}

#[test]
fn test_max_sing_caps_rank() {
    let a = random_matrix(5, 5, 3);
    let svd = NalgebraSvd::new(2, 0.0).factorize(&a, None).unwrap();
    assert_eq!(svd.rank(), 2);
    assert_eq!(svd.sigma_trunc.len(), 3);
    assert!(svd.sigma_trunc.iter().all(|s| *s <= svd.sigma[1]));

    // an explicit threshold ignores max_sing
    let svd = NalgebraSvd::new(2, 0.0).factorize(&a, Some(0.0)).unwrap();
    assert_eq!(svd.rank(), 5);
}
