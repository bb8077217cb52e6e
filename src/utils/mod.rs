//! Utility functions and helpers for the svdopt-rs library.

pub mod matrix_convert;
pub mod svd;

// Re-export commonly used utilities
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
    scale_rows,
};
pub use svd::{NalgebraSvd, SvdPackage, TruncatedSvd};
