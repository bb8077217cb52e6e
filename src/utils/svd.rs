//! Truncated singular value decomposition.
//!
//! The upgrade computations only need a factorization `A = U Σ Vᵗ` in which small
//! singular values have been discarded. [`SvdPackage`] is that primitive;
//! [`NalgebraSvd`] implements it on top of `nalgebra`.

use log::trace;
use ndarray::{Array1, Array2};

use crate::error::{Result, SvdOptError};
use crate::utils::matrix_convert::ndarray_to_nalgebra;

/// A thin SVD with only the retained singular triplets.
///
/// For an `m x n` input with `k` retained singular values, `u` is `m x k`,
/// `sigma` has length `k` (descending) and `vt` is `k x n`.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    pub u: Array2<f64>,
    pub sigma: Array1<f64>,
    pub vt: Array2<f64>,
    /// Discarded singular values, descending
    pub sigma_trunc: Array1<f64>,
}

impl TruncatedSvd {
    /// Number of retained singular values.
    pub fn rank(&self) -> usize {
        self.sigma.len()
    }

    /// An empty factorization of an `m x n` matrix.
    pub fn empty(m: usize, n: usize) -> Self {
        Self {
            u: Array2::zeros((m, 0)),
            sigma: Array1::zeros(0),
            vt: Array2::zeros((0, n)),
            sigma_trunc: Array1::zeros(0),
        }
    }
}

/// A supplier of truncated SVD factorizations.
pub trait SvdPackage {
    /// Factorize `matrix`.
    ///
    /// With `threshold = None` the package applies its configured truncation
    /// (maximum number of singular values and relative threshold). With
    /// `Some(t)` every singular value above `t * sigma_max` is retained. Exact
    /// zeros are always discarded.
    fn factorize(&self, matrix: &Array2<f64>, threshold: Option<f64>) -> Result<TruncatedSvd>;

    /// Short human-readable name for reports.
    fn description(&self) -> String;
}

/// Truncated SVD on top of nalgebra's bidiagonal SVD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NalgebraSvd {
    /// Maximum number of singular values retained
    pub max_sing: usize,
    /// Relative truncation threshold (`sigma_i / sigma_max`)
    pub eig_thresh: f64,
}

impl NalgebraSvd {
    pub fn new(max_sing: usize, eig_thresh: f64) -> Self {
        Self {
            max_sing,
            eig_thresh,
        }
    }
}

impl Default for NalgebraSvd {
    fn default() -> Self {
        Self::new(usize::MAX, 5e-7)
    }
}

impl SvdPackage for NalgebraSvd {
    fn factorize(&self, matrix: &Array2<f64>, threshold: Option<f64>) -> Result<TruncatedSvd> {
        let (m, n) = matrix.dim();
        if m == 0 || n == 0 {
            return Ok(TruncatedSvd::empty(m, n));
        }

        let (thresh, max_sing) = match threshold {
            Some(t) => (t, usize::MAX),
            None => (self.eig_thresh, self.max_sing),
        };

        let svd = ndarray_to_nalgebra(matrix)
            .try_svd(true, true, f64::EPSILON, 0)
            .ok_or_else(|| {
                SvdOptError::LinearAlgebraError(format!("SVD of {}x{} matrix failed", m, n))
            })?;
        let u = svd
            .u
            .ok_or_else(|| SvdOptError::LinearAlgebraError("SVD returned no U".to_string()))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| SvdOptError::LinearAlgebraError("SVD returned no Vt".to_string()))?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let sigma_max = order.first().map_or(0.0, |&i| svd.singular_values[i]);
        let (kept, dropped): (Vec<(usize, usize)>, Vec<(usize, usize)>) =
            order.iter().copied().enumerate().partition(|&(rank, i)| {
                let s = svd.singular_values[i];
                rank < max_sing && s > 0.0 && s > thresh * sigma_max
            });

        let k = kept.len();
        let mut u_out = Array2::zeros((m, k));
        let mut vt_out = Array2::zeros((k, n));
        let mut sigma = Array1::zeros(k);
        for (col, &(_, i)) in kept.iter().enumerate() {
            sigma[col] = svd.singular_values[i];
            for r in 0..m {
                u_out[[r, col]] = u[(r, i)];
            }
            for c in 0..n {
                vt_out[[col, c]] = v_t[(i, c)];
            }
        }
        let sigma_trunc: Array1<f64> = dropped
            .iter()
            .map(|&(_, i)| svd.singular_values[i])
            .collect();

        trace!(
            "SVD of {}x{} matrix: {} singular values retained, {} truncated",
            m,
            n,
            k,
            sigma_trunc.len()
        );

        Ok(TruncatedSvd {
            u: u_out,
            sigma,
            vt: vt_out,
            sigma_trunc,
        })
    }

    fn description(&self) -> String {
        "nalgebra SVD".to_string()
    }
}
