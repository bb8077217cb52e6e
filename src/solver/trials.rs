//! Trial batch evaluation.
//!
//! Every iteration tries one constrained upgrade per lambda. The candidates are
//! submitted to the run manager as a single batch and ranked once the batch has
//! completed.

use log::warn;

use crate::model_run::ModelRun;
use crate::objective::ObjectiveFunction;
use crate::parameters::{ParameterTransform, Parameters};
use crate::report::TrialSummary;
use crate::run_manager::RunManager;

/// Lambdas tried in one iteration: `base` plus the best lambda, its half and its
/// double, sorted ascending without duplicates.
///
/// # Examples
///
/// ```
/// use svdopt_rs::solver::trials::lambda_set;
///
/// let lambdas = lambda_set(&[0.1, 1.0, 10.0], 2.0);
/// assert_eq!(lambdas, vec![0.1, 1.0, 2.0, 4.0, 10.0]);
/// ```
pub fn lambda_set(base: &[f64], best: f64) -> Vec<f64> {
    let mut lambdas: Vec<f64> = base.to_vec();
    lambdas.extend([best, best / 2.0, best * 2.0]);
    lambdas.sort_by(|a, b| a.total_cmp(b));
    lambdas.dedup();
    lambdas
}

/// One candidate of a trial batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialCandidate {
    pub lambda: f64,
    /// Trial type label
    pub label: String,
    /// Candidate active-control parameters
    pub candidate: Parameters,
    /// Parameters held fixed for this candidate
    pub frozen: Parameters,
    /// Step length in active-control space
    pub magnitude: f64,
}

/// The winning trial of a batch.
#[derive(Debug, Clone)]
pub struct SelectedTrial {
    /// Evaluated run, with the trial's frozen parameters attached
    pub run: ModelRun,
    pub lambda: f64,
    /// Submission index within the batch
    pub index: usize,
}

/// Ranking of a completed batch.
#[derive(Debug, Clone, Default)]
pub struct TrialOutcome {
    /// `None` when every trial failed
    pub best: Option<SelectedTrial>,
    /// One summary per trial, in submission order
    pub summaries: Vec<TrialSummary>,
}

/// Candidates submitted to a run manager, paired with their run ids.
#[derive(Debug, Clone, Default)]
pub struct TrialBatch {
    trials: Vec<(TrialCandidate, usize)>,
}

impl TrialBatch {
    /// Start a new batch on `run_manager` and queue every candidate in model space.
    pub fn submit(
        candidates: Vec<TrialCandidate>,
        run_manager: &mut dyn RunManager,
        transform: &dyn ParameterTransform,
    ) -> Self {
        run_manager.reinitialize("upgrade");
        let trials = candidates
            .into_iter()
            .map(|c| {
                let model = transform.active_ctl_to_model(&c.candidate);
                let id = run_manager.add_run(model, &c.label, c.lambda);
                (c, id)
            })
            .collect();
        Self { trials }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Rank the completed batch at Tikhonov weight `mu`.
    ///
    /// Failed runs are summarised but never selected. Among the successful ones
    /// the lowest total phi wins; ties go to the earliest submitted trial.
    pub fn evaluate(
        self,
        run_manager: &dyn RunManager,
        objective: &ObjectiveFunction,
        transform: &dyn ParameterTransform,
        tikhonov_weight: f64,
        starting_phi: f64,
    ) -> TrialOutcome {
        let mut outcome = TrialOutcome::default();

        for (index, (trial, id)) in self.trials.into_iter().enumerate() {
            let record = run_manager.get_run(id);
            let obs = record.and_then(|r| r.observations.clone());
            // the run manager may have adjusted what it actually ran
            let ctl = match record {
                Some(r) => transform.model_to_ctl(&r.parameters),
                None => transform.active_ctl_to_ctl(&trial.candidate),
            };
            let run = match obs.map(|o| ModelRun::evaluated(ctl, o, objective, transform)) {
                Some(Ok(mut run)) => {
                    run.set_frozen_ctl_pars(trial.frozen);
                    Some(run)
                }
                Some(Err(e)) => {
                    warn!("trial at lambda {:.3e} could not be evaluated: {}", trial.lambda, e);
                    None
                }
                None => None,
            };

            let phi = run.as_ref().and_then(|r| r.phi(tikhonov_weight));
            outcome.summaries.push(TrialSummary {
                lambda: trial.lambda,
                label: trial.label,
                length: trial.magnitude,
                phi: phi.map(|p| {
                    let pct = if starting_phi != 0.0 { p / starting_phi * 100.0 } else { 0.0 };
                    (p, pct)
                }),
            });

            let Some(run) = run else {
                continue;
            };
            let better = match &outcome.best {
                Some(best) => run.cmp_lt(&best.run, tikhonov_weight),
                None => true,
            };
            if better {
                outcome.best = Some(SelectedTrial {
                    run,
                    lambda: trial.lambda,
                    index,
                });
            }
        }
        outcome
    }
}
