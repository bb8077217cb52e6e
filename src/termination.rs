//! Termination control.
//!
//! After every iteration the solver reports the objective function and the
//! largest relative parameter change to a [`Termination`] collaborator, which
//! decides whether another iteration is worthwhile. [`TerminationController`]
//! implements the classic criteria: an iteration cap, an absolute phi target,
//! stagnation of the best phi, clustering of the lowest phis and stagnation of
//! the parameters.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SvdOptError};
use crate::objective::PhiComponents;

/// Termination-control collaborator.
pub trait Termination {
    /// Record an iteration's outcome. Returns `true` when optimisation should stop.
    fn process_iteration(
        &mut self,
        phi: &PhiComponents,
        tikhonov_weight: f64,
        max_rel_change: f64,
    ) -> bool;

    /// Whether the last processed iteration triggered termination.
    fn check_last_iteration(&self) -> bool;

    /// Number of iterations processed so far.
    fn iteration_number(&self) -> usize;

    /// Why optimisation stopped, once it has.
    fn reason(&self) -> Option<&str> {
        None
    }

    /// Serialise the state for a restart.
    fn save_state(&self) -> Result<String>;

    /// Restore a state produced by [`save_state`](Self::save_state).
    fn restore_state(&mut self, state: &str) -> Result<()>;
}

/// Thresholds of the default termination criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationSettings {
    /// Maximum number of iterations. Default: 50
    pub noptmax: usize,

    /// Stop once total phi is at or below this value. Default: 0.0
    pub phistopthresh: f64,

    /// Stop after this many iterations without lowering the best phi (0 disables). Default: 3
    pub nphinored: usize,

    /// Number of lowest phis that must lie within `phiredstp` of each other. Default: 4
    pub nphistp: usize,

    /// Relative phi spread for `nphistp`. Default: 0.005
    pub phiredstp: f64,

    /// Stop after this many consecutive iterations with small parameter change. Default: 3
    pub nrelpar: usize,

    /// Relative parameter change counted as small. Default: 0.005
    pub relparstp: f64,
}

impl Default for TerminationSettings {
    fn default() -> Self {
        Self {
            noptmax: 50,
            phistopthresh: 0.0,
            nphinored: 3,
            nphistp: 4,
            phiredstp: 0.005,
            nrelpar: 3,
            relparstp: 0.005,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TerminationState {
    iteration: usize,
    best_phi: Option<f64>,
    nphinored_count: usize,
    nrelpar_count: usize,
    lowest_phi: Vec<f64>,
    terminate: bool,
    reason: Option<String>,
}

/// Default termination controller.
#[derive(Debug, Clone, Default)]
pub struct TerminationController {
    settings: TerminationSettings,
    state: TerminationState,
}

impl TerminationController {
    pub fn new(settings: TerminationSettings) -> Self {
        Self {
            settings,
            state: TerminationState::default(),
        }
    }

    pub fn settings(&self) -> &TerminationSettings {
        &self.settings
    }

    /// Lowest total phi seen so far.
    pub fn best_phi(&self) -> Option<f64> {
        self.state.best_phi
    }

    fn stop(&mut self, reason: String) {
        info!("termination: {}", reason);
        self.state.terminate = true;
        self.state.reason = Some(reason);
    }

    fn record_lowest(&mut self, phi: f64) {
        let lowest = &mut self.state.lowest_phi;
        let pos = lowest.partition_point(|&p| p <= phi);
        lowest.insert(pos, phi);
        lowest.truncate(self.settings.nphistp.max(1));
    }
}

impl Termination for TerminationController {
    fn process_iteration(
        &mut self,
        phi: &PhiComponents,
        tikhonov_weight: f64,
        max_rel_change: f64,
    ) -> bool {
        let total = phi.total(tikhonov_weight);
        let s = &self.settings;
        self.state.iteration += 1;

        match self.state.best_phi {
            Some(best) if total >= best => self.state.nphinored_count += 1,
            _ => {
                self.state.best_phi = Some(total);
                self.state.nphinored_count = 0;
            }
        }

        if max_rel_change.abs() <= s.relparstp {
            self.state.nrelpar_count += 1;
        } else {
            self.state.nrelpar_count = 0;
        }

        self.record_lowest(total);

        let s = &self.settings;
        let st = &self.state;
        let spread = match (st.lowest_phi.first(), st.lowest_phi.last()) {
            (Some(&lo), Some(&hi)) if hi > 0.0 => (hi - lo) / hi,
            _ => 0.0,
        };

        let reason = if total <= s.phistopthresh {
            Some(format!("phi {:.6e} at or below phistopthresh", total))
        } else if st.iteration >= s.noptmax {
            Some(format!("iteration limit {} reached", s.noptmax))
        } else if s.nphinored > 0 && st.nphinored_count >= s.nphinored {
            Some(format!(
                "{} iterations without lowering phi",
                st.nphinored_count
            ))
        } else if s.nphistp > 0 && st.lowest_phi.len() >= s.nphistp && spread <= s.phiredstp {
            Some(format!(
                "{} lowest phis within relative {:.3e}",
                s.nphistp, s.phiredstp
            ))
        } else if s.nrelpar > 0 && st.nrelpar_count >= s.nrelpar {
            Some(format!(
                "{} iterations with relative parameter change below {:.3e}",
                st.nrelpar_count, s.relparstp
            ))
        } else {
            None
        };
        if let Some(reason) = reason {
            self.stop(reason);
        }
        self.state.terminate
    }

    fn check_last_iteration(&self) -> bool {
        self.state.terminate
    }

    fn iteration_number(&self) -> usize {
        self.state.iteration
    }

    fn reason(&self) -> Option<&str> {
        self.state.reason.as_deref()
    }

    fn save_state(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    fn restore_state(&mut self, state: &str) -> Result<()> {
        let restored: TerminationState = serde_json::from_str(state).map_err(|e| {
            SvdOptError::InconsistentRestart(format!("unreadable termination state: {}", e))
        })?;
        self.state = restored;
        Ok(())
    }
}
