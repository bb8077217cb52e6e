//! Integration tests for the svdopt-rs library
//!
//! These tests drive the solver end to end on small models, rather than
//! exercising individual components.

// Convergence on a straight-line model
pub mod linear_model;

// Bounds and frozen parameters
pub mod bounded;

// Tikhonov regularization
pub mod regularized;

// Restart points and jacobian-only mode
pub mod restart;

// Failed model runs
pub mod failures;
