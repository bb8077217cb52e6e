//! Objective function and weights.
//!
//! The objective function (phi) is the sum of squared weighted residuals, split
//! into a measurement component and a regularization component. The total phi
//! for a Tikhonov weight `mu` is `meas + mu * regul`; the square-root weight
//! matrix scales regularization rows by `sqrt(mu)` so that `Q = Q_sqrt^2` is
//! consistent with that total.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, SvdOptError};
use crate::observations::{ObservationInfo, PriorInformation};
use crate::parameters::{Observations, Parameters};

/// Decomposed objective function value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhiComponents {
    /// Measurement objective function
    pub meas: f64,

    /// Regularization objective function (unscaled by the Tikhonov weight)
    pub regul: f64,
}

impl PhiComponents {
    pub fn new(meas: f64, regul: f64) -> Self {
        Self { meas, regul }
    }

    /// Total phi for a Tikhonov weight.
    pub fn total(&self, tikhonov_weight: f64) -> f64 {
        self.meas + tikhonov_weight * self.regul
    }
}

impl fmt::Display for PhiComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "meas = {:.6e}, regul = {:.6e}", self.meas, self.regul)
    }
}

/// Weighted least-squares objective over observations and prior information.
#[derive(Debug, Clone, Default)]
pub struct ObjectiveFunction {
    obs_info: ObservationInfo,
    prior_info: PriorInformation,
}

impl ObjectiveFunction {
    pub fn new(obs_info: ObservationInfo, prior_info: PriorInformation) -> Self {
        Self {
            obs_info,
            prior_info,
        }
    }

    pub fn observation_info(&self) -> &ObservationInfo {
        &self.obs_info
    }

    pub fn prior_information(&self) -> &PriorInformation {
        &self.prior_info
    }

    /// Observation names.
    pub fn observation_names(&self) -> Vec<String> {
        self.obs_info.names()
    }

    /// Jacobian/residual row order: observations, then prior information.
    pub fn row_names(&self) -> Vec<String> {
        let mut names = self.obs_info.names();
        names.extend(self.prior_info.names());
        names
    }

    /// Residual (observed minus simulated) of one row.
    fn residual(
        &self,
        name: &str,
        sim_obs: &Observations,
        numeric_pars: &Parameters,
    ) -> Result<(f64, f64, bool)> {
        if let Some(rec) = self.obs_info.get(name) {
            let sim = sim_obs
                .get(name)
                .ok_or_else(|| SvdOptError::ObservationNotFound(name.to_string()))?;
            Ok((rec.value - sim, rec.weight, rec.is_regularization()))
        } else if let Some(rec) = self.prior_info.get(name) {
            let sim = rec.simulated(numeric_pars)?;
            Ok((rec.value - sim, rec.weight, rec.is_regularization()))
        } else {
            Err(SvdOptError::ObservationNotFound(name.to_string()))
        }
    }

    /// Residual vector (observed minus simulated) in the given row order.
    pub fn residuals(
        &self,
        sim_obs: &Observations,
        numeric_pars: &Parameters,
        rows: &[String],
    ) -> Result<Array1<f64>> {
        rows.iter()
            .map(|name| self.residual(name, sim_obs, numeric_pars).map(|(r, _, _)| r))
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from_vec)
    }

    /// Measurement and regularization components of phi.
    pub fn phi_components(
        &self,
        sim_obs: &Observations,
        numeric_pars: &Parameters,
    ) -> Result<PhiComponents> {
        let mut phi = PhiComponents::default();
        for name in self.row_names() {
            let (r, w, regul) = self.residual(&name, sim_obs, numeric_pars)?;
            let contribution = (r * w).powi(2);
            if regul {
                phi.regul += contribution;
            } else {
                phi.meas += contribution;
            }
        }
        Ok(phi)
    }

    /// Squared-weighted contribution of each observation group to phi.
    pub fn group_contributions(
        &self,
        sim_obs: &Observations,
        numeric_pars: &Parameters,
    ) -> Result<Vec<(String, f64)>> {
        let mut groups: Vec<(String, f64)> = Vec::new();
        let obs = self.obs_info.iter().map(|(n, r)| (n, r.group.as_str()));
        let prior = self.prior_info.iter().map(|(n, r)| (n, r.group.as_str()));
        for (name, group) in obs.chain(prior) {
            let (r, w, _) = self.residual(name, sim_obs, numeric_pars)?;
            match groups.iter_mut().find(|(g, _)| g == group) {
                Some((_, total)) => *total += (r * w).powi(2),
                None => groups.push((group.to_string(), (r * w).powi(2))),
            }
        }
        Ok(groups)
    }
}

/// Diagonal square-root weight matrix.
///
/// Measurement rows carry their weight `w`; regularization rows carry `w * sqrt(mu)`.
#[derive(Debug, Clone)]
pub struct SqrtWeights {
    index: HashMap<String, usize>,
    base: Vec<f64>,
    regul: Vec<bool>,
    tikhonov_weight: f64,
}

impl SqrtWeights {
    /// Build the weights of every row of `objective` for Tikhonov weight `mu`.
    pub fn new(objective: &ObjectiveFunction, tikhonov_weight: f64) -> Self {
        let mut index = HashMap::new();
        let mut base = Vec::new();
        let mut regul = Vec::new();
        let obs = objective
            .obs_info
            .iter()
            .map(|(n, r)| (n, r.weight, r.is_regularization()));
        let prior = objective
            .prior_info
            .iter()
            .map(|(n, r)| (n, r.weight, r.is_regularization()));
        for (name, weight, is_regul) in obs.chain(prior) {
            index.insert(name.clone(), base.len());
            base.push(weight);
            regul.push(is_regul);
        }
        Self {
            index,
            base,
            regul,
            tikhonov_weight,
        }
    }

    pub fn tikhonov_weight(&self) -> f64 {
        self.tikhonov_weight
    }

    pub fn set_tikhonov_weight(&mut self, mu: f64) {
        self.tikhonov_weight = mu;
    }

    /// Square-root weights for `rows`, in that order.
    pub fn diagonal(&self, rows: &[String]) -> Result<Array1<f64>> {
        let sqrt_mu = self.tikhonov_weight.max(0.0).sqrt();
        rows.iter()
            .map(|name| {
                let i = *self
                    .index
                    .get(name)
                    .ok_or_else(|| SvdOptError::ObservationNotFound(name.clone()))?;
                Ok(if self.regul[i] {
                    self.base[i] * sqrt_mu
                } else {
                    self.base[i]
                })
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from_vec)
    }
}
