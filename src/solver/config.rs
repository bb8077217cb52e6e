//! Configuration options for the SVD-stabilised Gauss-Levenberg-Marquardt solver.
//!
//! This module defines the linear-algebra formulation used for upgrade vectors,
//! the lambda schedule, the SVD truncation settings and the per-iteration
//! parameter change limits.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SvdOptError};
use crate::solver::regularization::DynamicRegularization;

/// Linear-algebra formulation of the upgrade equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatInv {
    /// Normal equations `JᵗQJ`
    #[default]
    #[serde(rename = "jtqj", alias = "JtQJ")]
    JtQJ,

    /// Square-root weighted Jacobian `Q^½J`, never forming the normal equations
    #[serde(rename = "q12j", alias = "Q12J")]
    Q12J,
}

impl MatInv {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatInv::JtQJ => "JtQJ",
            MatInv::Q12J => "Q12J",
        }
    }
}

/// Marquardt matrix added to the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MarquardtMatrix {
    /// Identity (after sensitivity scaling)
    #[default]
    #[serde(rename = "ident", alias = "IDEN")]
    Ident,

    /// Diagonal of `JᵗQJ`
    #[serde(rename = "jtqj", alias = "JTQJ")]
    JtQJ,
}

impl MarquardtMatrix {
    /// Trial type label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            MarquardtMatrix::Ident => "IDEN",
            MarquardtMatrix::JtQJ => "JTQJ",
        }
    }
}

/// Configuration options for the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Description used in iteration headers. Default: "base parameter solution"
    pub description: String,

    /// Upgrade formulation. Default: JtQJ
    pub mat_inv: MatInv,

    /// Marquardt matrix. Default: Ident
    pub marquardt: MarquardtMatrix,

    /// Rescale each upgrade by the optimal scalar along its direction. Default: false
    pub scale_upgrade: bool,

    /// Lambdas tried in every iteration. Default: [0.1, 1, 10, 100, 1000]
    pub base_lambdas: Vec<f64>,

    /// Starting value of the best lambda. Default: 20.0
    pub initial_lambda: f64,

    /// Maximum number of singular values retained. Default: 1_000_000
    pub max_sing: usize,

    /// Relative singular-value truncation threshold. Default: 5e-7
    pub eig_thresh: f64,

    /// Maximum relative change of `relative`-limited parameters. Default: 10.0
    pub rel_par_max: f64,

    /// Maximum factor change of `factor`-limited parameters. Default: 10.0
    pub fac_par_max: f64,

    /// Fraction of the initial value below which change limits use that fraction instead. Default: 0.001
    pub fac_orig: f64,

    /// Relative phi reduction below which central derivatives are used. Default: 0.1
    pub phi_red_switch: f64,

    /// Relative tolerance when testing whether a parameter sits on a bound. Default: 1e-5
    pub out_of_bound_tol: f64,

    /// Compute one Jacobian and stop. Default: false
    pub jacobian_only: bool,

    /// Tikhonov regularization settings
    pub regularization: DynamicRegularization,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            description: "base parameter solution".to_string(),
            mat_inv: MatInv::default(),
            marquardt: MarquardtMatrix::default(),
            scale_upgrade: false,
            base_lambdas: vec![0.1, 1.0, 10.0, 100.0, 1000.0],
            initial_lambda: 20.0,
            max_sing: 1_000_000,
            eig_thresh: 5e-7,
            rel_par_max: 10.0,
            fac_par_max: 10.0,
            fac_orig: 0.001,
            phi_red_switch: 0.1,
            out_of_bound_tol: 1e-5,
            jacobian_only: false,
            regularization: DynamicRegularization::default(),
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_mat_inv(mut self, mat_inv: MatInv) -> Self {
        self.mat_inv = mat_inv;
        self
    }

    pub fn with_marquardt(mut self, marquardt: MarquardtMatrix) -> Self {
        self.marquardt = marquardt;
        self
    }

    pub fn with_scale_upgrade(mut self, scale_upgrade: bool) -> Self {
        self.scale_upgrade = scale_upgrade;
        self
    }

    pub fn with_base_lambdas(mut self, lambdas: Vec<f64>) -> Self {
        self.base_lambdas = lambdas;
        self
    }

    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    pub fn with_svd_truncation(mut self, max_sing: usize, eig_thresh: f64) -> Self {
        self.max_sing = max_sing;
        self.eig_thresh = eig_thresh;
        self
    }

    pub fn with_change_limits(mut self, rel_par_max: f64, fac_par_max: f64, fac_orig: f64) -> Self {
        self.rel_par_max = rel_par_max;
        self.fac_par_max = fac_par_max;
        self.fac_orig = fac_orig;
        self
    }

    pub fn with_phi_red_switch(mut self, phi_red_switch: f64) -> Self {
        self.phi_red_switch = phi_red_switch;
        self
    }

    pub fn with_out_of_bound_tol(mut self, tol: f64) -> Self {
        self.out_of_bound_tol = tol;
        self
    }

    pub fn with_jacobian_only(mut self, jacobian_only: bool) -> Self {
        self.jacobian_only = jacobian_only;
        self
    }

    pub fn with_regularization(mut self, regularization: DynamicRegularization) -> Self {
        self.regularization = regularization;
        self
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SvdOptError::Configuration(msg));

        if let Some(l) = self
            .base_lambdas
            .iter()
            .find(|l| !(l.is_finite() && **l >= 0.0))
        {
            return bad(format!("lambdas must be finite and non-negative, got {}", l));
        }
        if !(self.initial_lambda.is_finite() && self.initial_lambda > 0.0) {
            return bad(format!(
                "initial lambda must be positive, got {}",
                self.initial_lambda
            ));
        }
        if self.max_sing == 0 {
            return bad("max_sing must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.eig_thresh) {
            return bad(format!("eig_thresh must lie in [0, 1), got {}", self.eig_thresh));
        }
        if !(self.rel_par_max > 0.0) {
            return bad(format!("rel_par_max must be positive, got {}", self.rel_par_max));
        }
        if !(self.fac_par_max > 1.0) {
            return bad(format!(
                "fac_par_max must be greater than 1, got {}",
                self.fac_par_max
            ));
        }
        if !(self.fac_orig >= 0.0) {
            return bad(format!("fac_orig must be non-negative, got {}", self.fac_orig));
        }
        if !(self.out_of_bound_tol >= 0.0) {
            return bad(format!(
                "out_of_bound_tol must be non-negative, got {}",
                self.out_of_bound_tol
            ));
        }
        self.regularization.validate()
    }
}
