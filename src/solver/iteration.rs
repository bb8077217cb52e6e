//! The iteration controller.
//!
//! [`SvdSolver`] drives the optimisation. Each iteration builds (or reuses) a
//! Jacobian at the current solution, freezes parameters whose derivatives
//! failed, optionally retunes the Tikhonov weight, evaluates one constrained
//! upgrade per lambda as a single batch of model runs and commits the best
//! trial. The best lambda found is handed back by every iteration and fed into
//! the next one.

use log::{debug, info};

use crate::error::{Result, SvdOptError};
use crate::jacobian::{JacobianBuilder, JacobianRequest};
use crate::model_run::ModelRun;
use crate::objective::{ObjectiveFunction, PhiComponents, SqrtWeights};
use crate::parameters::{Observations, ParameterInfo, ParameterTransform, Parameters, TransformSeq};
use crate::report::{ChangeTable, LogReporter, Reporter, ResidualRow};
use crate::run_manager::RunManager;
use crate::solver::config::{MarquardtMatrix, SolverConfig};
use crate::solver::limits::ConstraintEngine;
use crate::solver::regularization::{search_weight, DynamicRegularization};
use crate::solver::trials::{lambda_set, TrialBatch, TrialCandidate};
use crate::solver::upgrade::{strategy_for, UpgradeContext, UpgradeStrategy};
use crate::termination::Termination;
use crate::utils::svd::{NalgebraSvd, SvdPackage};

/// Where a restarted optimisation picks up.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResumePoint {
    /// Start a fresh iteration
    #[default]
    None,
    /// Reuse the Jacobian the builder already holds; only the base run is repeated
    ReuseJacobian,
    /// Execute and process Jacobian runs the builder has already queued
    ResumeJacobianRuns,
    /// Start a new iteration from saved control parameters
    ResumeNewIteration(Parameters),
}

/// What one iteration hands back to the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationOutcome {
    /// Lambda of the selected trial; seeds the next lambda set
    pub best_lambda: f64,
    /// Objective of the new current solution
    pub phi: PhiComponents,
    /// Tikhonov weight used for the trials
    pub tikhonov_weight: f64,
    /// Largest relative control-parameter change
    pub max_rel_change: f64,
    /// Termination requested by the termination controller
    pub terminate: bool,
}

/// SVD-stabilised Gauss-Levenberg-Marquardt solver.
pub struct SvdSolver {
    config: SolverConfig,
    par_info: ParameterInfo,
    objective: ObjectiveFunction,
    transform: Box<dyn ParameterTransform>,
    regularization: DynamicRegularization,
    strategy: Box<dyn UpgradeStrategy>,
    svd: Box<dyn SvdPackage>,
    reporter: Box<dyn Reporter>,
    cur_solution: ModelRun,
    best_lambda: f64,
    central: bool,
    terminate_local: bool,
    save_next_jacobian: bool,
}

impl SvdSolver {
    /// Create a solver starting from the parameters' initial values.
    pub fn new(
        config: SolverConfig,
        par_info: ParameterInfo,
        objective: ObjectiveFunction,
    ) -> Result<Self> {
        config.validate()?;
        par_info.validate()?;
        objective.prior_information().validate(&par_info)?;
        if objective.observation_info().is_empty() && objective.prior_information().is_empty() {
            return Err(SvdOptError::Configuration(
                "no observations or prior information to fit".to_string(),
            ));
        }

        let transform = TransformSeq::new(&par_info)?;
        Ok(Self {
            regularization: config.regularization.clone(),
            strategy: strategy_for(config.mat_inv),
            svd: Box::new(NalgebraSvd::new(config.max_sing, config.eig_thresh)),
            reporter: Box::new(LogReporter),
            cur_solution: ModelRun::new(par_info.initial_values()),
            best_lambda: config.initial_lambda,
            central: false,
            terminate_local: false,
            save_next_jacobian: false,
            transform: Box::new(transform),
            config,
            par_info,
            objective,
        })
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn with_transform<T: ParameterTransform + 'static>(mut self, transform: T) -> Self {
        self.transform = Box::new(transform);
        self
    }

    pub fn with_svd<S: SvdPackage + 'static>(mut self, svd: S) -> Self {
        self.svd = Box::new(svd);
        self
    }

    /// Start from `ctl_pars` instead of the initial values.
    pub fn with_initial_parameters(mut self, ctl_pars: Parameters) -> Result<Self> {
        self.check_complete(&ctl_pars)?;
        self.cur_solution = ModelRun::new(ctl_pars);
        Ok(self)
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn objective(&self) -> &ObjectiveFunction {
        &self.objective
    }

    pub fn current_solution(&self) -> &ModelRun {
        &self.cur_solution
    }

    /// Tikhonov regularization state, including the current weight.
    pub fn regularization(&self) -> &DynamicRegularization {
        &self.regularization
    }

    pub fn best_lambda(&self) -> f64 {
        self.best_lambda
    }

    /// Whether Jacobians are built with central differences.
    pub fn uses_central_derivatives(&self) -> bool {
        self.central
    }

    fn check_complete(&self, ctl_pars: &Parameters) -> Result<()> {
        match self.par_info.iter().find(|(name, _)| !ctl_pars.contains(name)) {
            Some((name, _)) => Err(SvdOptError::InconsistentRestart(format!(
                "restart parameters lack '{}'",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Run up to `max_iter` iterations, or until termination is requested.
    ///
    /// `optimum` tracks the best solution seen across calls: it is replaced
    /// whenever an iteration ends with a lower total phi. Returns the current
    /// solution after the last iteration.
    pub fn solve(
        &mut self,
        run_manager: &mut dyn RunManager,
        jacobian: &mut dyn JacobianBuilder,
        termination: &mut dyn Termination,
        max_iter: usize,
        optimum: &mut ModelRun,
        resume: ResumePoint,
    ) -> Result<ModelRun> {
        if self.config.jacobian_only {
            self.compute_jacobian_only(run_manager, jacobian)?;
            return Ok(self.cur_solution.clone());
        }

        self.terminate_local = false;
        let mut resume = resume;
        let mut best_lambda = self.best_lambda;

        for _ in 0..max_iter {
            let outcome = self.iteration(
                run_manager,
                jacobian,
                termination,
                std::mem::take(&mut resume),
                best_lambda,
            )?;
            best_lambda = outcome.best_lambda;

            if self.save_next_jacobian {
                jacobian.save();
                self.save_next_jacobian = false;
            }
            if self.cur_solution.cmp_lt(optimum, outcome.tikhonov_weight) {
                *optimum = self.cur_solution.clone();
                self.reporter.write_parameters("bpa", optimum.ctl_pars());
                let rows = self.residual_rows(optimum)?;
                self.reporter.write_residuals("rei", &rows);
                jacobian.save();
                self.save_next_jacobian = true;
            }

            if outcome.terminate || self.terminate_local {
                break;
            }
        }

        self.best_lambda = best_lambda;
        Ok(self.cur_solution.clone())
    }

    /// Build and process one Jacobian at the current solution and update the
    /// current solution from its base run.
    pub fn compute_jacobian_only(
        &mut self,
        run_manager: &mut dyn RunManager,
        jacobian: &mut dyn JacobianBuilder,
    ) -> Result<()> {
        self.build_jacobian(run_manager, jacobian)?;
        self.process_jacobian(run_manager, jacobian)
    }

    fn build_jacobian(
        &self,
        run_manager: &mut dyn RunManager,
        jacobian: &mut dyn JacobianBuilder,
    ) -> Result<()> {
        let numeric_names = self
            .transform
            .ctl_to_numeric(self.cur_solution.ctl_pars())
            .names();
        let request = JacobianRequest {
            base_ctl: self.cur_solution.ctl_pars(),
            numeric_names: &numeric_names,
            transform: self.transform.as_ref(),
            par_info: &self.par_info,
            central: self.central,
        };
        jacobian.build_runs(&request, run_manager)?;
        jacobian.make_runs(run_manager);
        Ok(())
    }

    fn process_jacobian(
        &mut self,
        run_manager: &dyn RunManager,
        jacobian: &mut dyn JacobianBuilder,
    ) -> Result<()> {
        jacobian.process_runs(run_manager, &self.objective, self.transform.as_ref())?;
        let (ctl, obs) = jacobian.base_run().ok_or_else(|| {
            SvdOptError::BaseRunFailed("jacobian builder holds no base run".to_string())
        })?;
        let (ctl, obs) = (ctl.clone(), obs.clone());
        self.cur_solution
            .update(ctl, obs, &self.objective, self.transform.as_ref())
    }

    /// Run the model once at the current parameters.
    fn run_base(&mut self, run_manager: &mut dyn RunManager) -> Result<()> {
        run_manager.reinitialize("base");
        let model = self.transform.ctl_to_model(self.cur_solution.ctl_pars());
        let id = run_manager.add_run(model, "base", 0.0);
        run_manager.run_batch();
        let record = run_manager
            .get_run(id)
            .ok_or_else(|| SvdOptError::BaseRunFailed("base run was not queued".to_string()))?;
        let obs = record.observations.clone().ok_or_else(|| {
            SvdOptError::BaseRunFailed("the base parameter run did not complete".to_string())
        })?;
        let mut ctl = self.cur_solution.ctl_pars().clone();
        ctl.update(&self.transform.model_to_ctl(&record.parameters));
        self.cur_solution
            .update(ctl, obs, &self.objective, self.transform.as_ref())
    }

    /// Bring the Jacobian up to date, honouring the resume point.
    fn refresh_jacobian(
        &mut self,
        run_manager: &mut dyn RunManager,
        jacobian: &mut dyn JacobianBuilder,
        resume: ResumePoint,
    ) -> Result<()> {
        match resume {
            ResumePoint::ReuseJacobian => {
                if jacobian.jacobian().is_empty() {
                    return Err(SvdOptError::InconsistentRestart(
                        "no jacobian available to reuse".to_string(),
                    ));
                }
                info!("reusing the existing jacobian");
                self.run_base(run_manager)
            }
            ResumePoint::ResumeJacobianRuns => {
                if !jacobian.has_pending_runs() {
                    return Err(SvdOptError::InconsistentRestart(
                        "no queued jacobian runs to resume".to_string(),
                    ));
                }
                jacobian.make_runs(run_manager);
                self.process_jacobian(run_manager, jacobian)
            }
            ResumePoint::ResumeNewIteration(ctl_pars) => {
                self.check_complete(&ctl_pars)?;
                self.cur_solution.set_ctl_pars(ctl_pars);
                self.compute_jacobian_only(run_manager, jacobian)
            }
            ResumePoint::None => self.compute_jacobian_only(run_manager, jacobian),
        }
    }

    /// Residual artifact rows for a run.
    fn residual_rows(&self, run: &ModelRun) -> Result<Vec<ResidualRow>> {
        let Some(obs) = run.obs() else {
            return Ok(Vec::new());
        };
        let numeric = self.transform.ctl_to_numeric(run.ctl_pars());
        let mut rows = Vec::new();
        for (name, rec) in self.objective.observation_info().iter() {
            rows.push(ResidualRow {
                name: name.clone(),
                group: rec.group.clone(),
                measured: rec.value,
                modelled: obs.value(name)?,
                weight: rec.weight,
            });
        }
        for (name, rec) in self.objective.prior_information().iter() {
            rows.push(ResidualRow {
                name: name.clone(),
                group: rec.group.clone(),
                measured: rec.value,
                modelled: rec.simulated(&numeric)?,
                weight: rec.weight,
            });
        }
        Ok(rows)
    }

    /// One full iteration. `best_lambda` seeds the lambda set; the lambda of the
    /// selected trial comes back in the outcome.
    pub fn iteration(
        &mut self,
        run_manager: &mut dyn RunManager,
        jacobian: &mut dyn JacobianBuilder,
        termination: &mut dyn Termination,
        resume: ResumePoint,
        best_lambda: f64,
    ) -> Result<IterationOutcome> {
        let iteration = termination.iteration_number() + 1;
        let calls_at_start = run_manager.total_runs();
        self.reporter
            .iteration_header(iteration, &self.config.description, calls_at_start);
        self.reporter.message(&format!(
            "svd package: {}; matrix inversion: {}",
            self.svd.description(),
            self.strategy.mat_inv().as_str()
        ));
        self.reporter
            .write_parameters("rpb", self.cur_solution.ctl_pars());
        self.reporter
            .write_termination_state(&termination.save_state()?);

        self.refresh_jacobian(run_manager, jacobian, resume)?;

        let transform = self.transform.as_ref();
        let cur_ctl = self.cur_solution.ctl_pars().clone();
        let cur_obs = self
            .cur_solution
            .obs()
            .cloned()
            .ok_or_else(|| SvdOptError::InvalidState("current solution has no observations".to_string()))?;
        let base_active = transform.ctl_to_active_ctl(&cur_ctl);
        let base_numeric = transform.active_ctl_to_numeric(&base_active);

        // parameters without usable derivatives stay where they are
        let failed: Vec<String> = jacobian.failed_parameter_names().into_iter().collect();
        if !failed.is_empty() {
            self.reporter.jacobian_failures(&failed);
        }
        let failed_frozen = base_active.subset(failed.iter());

        let rows = self.objective.row_names();
        let obs_names = self.objective.observation_names();
        let residuals = self.objective.residuals(&cur_obs, &base_numeric, &rows)?;
        let jac = jacobian.jacobian();
        let strategy = self.strategy.as_ref();
        let svd = self.svd.as_ref();
        let objective = &self.objective;
        let engine = ConstraintEngine::new(&self.par_info, transform, &self.config);

        if self.regularization.use_dynamic_reg {
            let start = self.cur_solution.phi_components().unwrap_or_default();

            // parameters pinned by an undamped step at the current weight stay pinned
            // while candidate weights are projected
            let seed_q_sqrt = SqrtWeights::new(objective, self.regularization.weight).diagonal(&rows)?;
            let seed_ctx = UpgradeContext {
                jacobian: jac,
                rows: &rows,
                q_sqrt: &seed_q_sqrt,
                residuals: &residuals,
                base_active_ctl: &base_active,
                transform,
                svd,
            };
            let seed_frozen = engine
                .constrained_upgrade(strategy, &seed_ctx, &failed_frozen, 0.0, MarquardtMatrix::Ident, false)?
                .frozen;
            debug!("weight search holds {} parameter(s) fixed", seed_frozen.len());

            let project = |mu: f64| -> Result<PhiComponents> {
                let q_sqrt = SqrtWeights::new(objective, mu).diagonal(&rows)?;
                let ctx = UpgradeContext {
                    jacobian: jac,
                    rows: &rows,
                    q_sqrt: &q_sqrt,
                    residuals: &residuals,
                    base_active_ctl: &base_active,
                    transform,
                    svd,
                };
                let up = strategy.compute_upgrade(&ctx, &seed_frozen, 0.0, MarquardtMatrix::Ident, false)?;
                let moved = transform.active_ctl_to_numeric(&up.upgrade_active_ctl);
                let numeric_delta: Parameters = (&moved - &base_numeric)
                    .into_iter()
                    .filter(|(_, d)| **d != 0.0)
                    .map(|(name, d)| (name.clone(), *d))
                    .collect();
                project_phi(&ctx, &numeric_delta, &base_numeric, &cur_obs, &obs_names, objective)
            };
            let outcome = search_weight(&self.regularization, start.meas, project, self.reporter.as_mut())?;
            self.regularization.weight = outcome.mu;
            self.reporter.regularization_result(outcome.mu, &outcome.phi);
        }

        let mu = self.regularization.weight;
        let starting = self.cur_solution.phi_components().unwrap_or_default();
        let starting_phi = starting.total(mu);
        self.reporter.starting_phi(&starting, mu);

        let q_sqrt = SqrtWeights::new(objective, mu).diagonal(&rows)?;
        let ctx = UpgradeContext {
            jacobian: jac,
            rows: &rows,
            q_sqrt: &q_sqrt,
            residuals: &residuals,
            base_active_ctl: &base_active,
            transform,
            svd,
        };
        let marquardt = self.config.marquardt;

        let mut candidates = Vec::new();
        for lambda in lambda_set(&self.config.base_lambdas, best_lambda) {
            let constrained = engine.constrained_upgrade(
                strategy,
                &ctx,
                &failed_frozen,
                lambda,
                marquardt,
                self.config.scale_upgrade,
            )?;
            debug!(
                "lambda {:.3e}: {} upgrade pass(es), {} frozen, step {:.4e}",
                lambda,
                constrained.passes,
                constrained.frozen.len(),
                constrained.magnitude
            );
            self.reporter.singular_values(
                &format!("lambda {:.3e}", lambda),
                &constrained.upgrade.sigma,
                &constrained.upgrade.sigma_trunc,
            );
            candidates.push(TrialCandidate {
                lambda,
                label: marquardt.label().to_string(),
                candidate: constrained.candidate,
                frozen: constrained.frozen,
                magnitude: constrained.magnitude,
            });
        }
        if candidates.iter().all(|c| c.magnitude == 0.0) {
            self.reporter
                .message("every parameter is frozen; no further improvement possible");
            self.terminate_local = true;
        }

        let batch = TrialBatch::submit(candidates, run_manager, transform);
        let n_trials = batch.len();
        run_manager.run_batch();
        let outcome = batch.evaluate(run_manager, objective, transform, mu, starting_phi);
        for summary in &outcome.summaries {
            self.reporter.trial(summary);
        }
        let best = outcome.best.ok_or(SvdOptError::AllTrialsFailed {
            iteration,
            trials: n_trials,
        })?;

        let frozen = best.run.frozen_ctl_pars();
        if !frozen.is_empty() {
            self.reporter.frozen_parameters(frozen);
        }

        let new_ctl = best.run.ctl_pars();
        let ctl_table = ChangeTable::new("control", &cur_ctl, new_ctl);
        let numeric_table = ChangeTable::new("numeric", &base_numeric, &transform.ctl_to_numeric(new_ctl));
        let max_rel_change = ctl_table.max_relative().map_or(0.0, |(_, r)| r.abs());
        self.reporter.parameter_changes(&ctl_table);
        self.reporter.parameter_changes(&numeric_table);
        self.reporter
            .model_calls(iteration, run_manager.total_runs() - calls_at_start);

        // switch to central derivatives once progress slows down
        let best_phi = best.run.phi(mu).unwrap_or(starting_phi);
        if starting_phi != 0.0
            && !self.central
            && (starting_phi - best_phi) / starting_phi < self.config.phi_red_switch
        {
            self.central = true;
            self.reporter.message("switching to central derivatives");
        }
        info!(
            "iteration {}: starting phi {:.6e}, ending phi {:.6e} at lambda {:.3e}",
            iteration, starting_phi, best_phi, best.lambda
        );

        let phi = best.run.phi_components().unwrap_or_default();
        let terminate = termination.process_iteration(&phi, mu, max_rel_change);

        self.cur_solution = best.run;
        let rows_out = self.residual_rows(&self.cur_solution)?;
        self.reporter.write_parameters("par", self.cur_solution.ctl_pars());
        self.reporter
            .write_parameters(&format!("par{}", iteration), self.cur_solution.ctl_pars());
        self.reporter
            .write_residuals(&format!("rei{}", iteration), &rows_out);

        Ok(IterationOutcome {
            best_lambda: best.lambda,
            phi,
            tikhonov_weight: mu,
            max_rel_change,
            terminate,
        })
    }
}

/// Objective of the linearised model after applying `numeric_delta`.
fn project_phi(
    ctx: &UpgradeContext<'_>,
    numeric_delta: &Parameters,
    base_numeric: &Parameters,
    obs: &Observations,
    obs_names: &[String],
    objective: &ObjectiveFunction,
) -> Result<PhiComponents> {
    let mut numeric = base_numeric.clone();
    numeric.add_shared(numeric_delta);

    let mut projected = obs.clone();
    let names = numeric_delta.names();
    if !names.is_empty() {
        let j = ctx.jacobian.matrix(obs_names, &names)?;
        let d_obs = j.dot(&numeric_delta.to_array(&names)?);
        for (name, d) in obs_names.iter().zip(d_obs.iter()) {
            if let Some(v) = projected.get_mut(name) {
                *v += d;
            }
        }
    }
    objective.phi_components(&projected, &numeric)
}
