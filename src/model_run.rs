//! A parameter set together with the model outputs it produced.

use crate::error::Result;
use crate::objective::{ObjectiveFunction, PhiComponents};
use crate::parameters::{Observations, ParameterTransform, Parameters};

/// One evaluated (or not yet evaluated) model run.
///
/// The current solution of the solver and every upgrade trial are `ModelRun`s.
/// A run without observations is invalid and never compares lower than any
/// other run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRun {
    ctl_pars: Parameters,
    obs: Option<Observations>,
    frozen_ctl_pars: Parameters,
    phi: Option<PhiComponents>,
}

impl ModelRun {
    /// A run at `ctl_pars` with no observations yet.
    pub fn new(ctl_pars: Parameters) -> Self {
        Self {
            ctl_pars,
            ..Self::default()
        }
    }

    /// A run with simulated observations; phi is evaluated immediately.
    pub fn evaluated(
        ctl_pars: Parameters,
        obs: Observations,
        objective: &ObjectiveFunction,
        transform: &dyn ParameterTransform,
    ) -> Result<Self> {
        let mut run = Self::new(ctl_pars);
        run.set_observations(obs, objective, transform)?;
        Ok(run)
    }

    pub fn ctl_pars(&self) -> &Parameters {
        &self.ctl_pars
    }

    pub fn obs(&self) -> Option<&Observations> {
        self.obs.as_ref()
    }

    pub fn frozen_ctl_pars(&self) -> &Parameters {
        &self.frozen_ctl_pars
    }

    pub fn set_frozen_ctl_pars(&mut self, frozen: Parameters) {
        self.frozen_ctl_pars = frozen;
    }

    pub fn clear_frozen(&mut self) {
        self.frozen_ctl_pars.clear();
    }

    pub fn phi_components(&self) -> Option<PhiComponents> {
        self.phi
    }

    /// Total phi for a Tikhonov weight, if the run is valid.
    pub fn phi(&self, tikhonov_weight: f64) -> Option<f64> {
        self.phi.map(|p| p.total(tikhonov_weight))
    }

    /// Whether the run holds observations.
    pub fn is_valid(&self) -> bool {
        self.obs.is_some() && self.phi.is_some()
    }

    /// Replace the parameters; observations and phi are discarded.
    pub fn set_ctl_pars(&mut self, ctl_pars: Parameters) {
        self.ctl_pars = ctl_pars;
        self.obs = None;
        self.phi = None;
    }

    /// Attach simulated observations and evaluate phi for them.
    pub fn set_observations(
        &mut self,
        obs: Observations,
        objective: &ObjectiveFunction,
        transform: &dyn ParameterTransform,
    ) -> Result<()> {
        let numeric = transform.ctl_to_numeric(&self.ctl_pars);
        self.phi = Some(objective.phi_components(&obs, &numeric)?);
        self.obs = Some(obs);
        Ok(())
    }

    /// Replace parameters and observations together.
    pub fn update(
        &mut self,
        ctl_pars: Parameters,
        obs: Observations,
        objective: &ObjectiveFunction,
        transform: &dyn ParameterTransform,
    ) -> Result<()> {
        self.ctl_pars = ctl_pars;
        self.set_observations(obs, objective, transform)
    }

    /// `true` when `self` is strictly better than `other` at Tikhonov weight `mu`.
    ///
    /// An invalid run never wins; any valid run beats an invalid one.
    pub fn cmp_lt(&self, other: &ModelRun, tikhonov_weight: f64) -> bool {
        match (self.phi(tikhonov_weight), other.phi(tikhonov_weight)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(a), Some(b)) => a < b,
        }
    }
}
