//! Progress reporting and per-iteration artifacts.
//!
//! The solver hands everything it wants to tell the outside world to a
//! [`Reporter`]. Reporting is fire-and-forget: no method returns an error and a
//! failing sink never stops the solver. [`LogReporter`] renders events through
//! the `log` facade; [`MemoryReporter`] keeps the artifacts in memory so callers
//! (and tests) can inspect them after a run.

use log::{debug, info, warn};
use ndarray::Array1;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::objective::PhiComponents;
use crate::parameters::Parameters;

/// Summary of one upgrade trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSummary {
    pub lambda: f64,
    /// Trial type label (e.g. `IDEN`)
    pub label: String,
    /// Euclidean length of the step in active-control space
    pub length: f64,
    /// Total phi and its percentage of the starting phi; `None` if the run failed
    pub phi: Option<(f64, f64)>,
}

/// One row of a parameter-change table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterChange {
    pub name: String,
    pub old: f64,
    pub new: f64,
    /// `(old - new) / old`; `None` when `old` is zero
    pub relative: Option<f64>,
    /// `max(|old|, |new|) / min(|old|, |new|)`; `None` when either value is zero
    pub factor: Option<f64>,
}

/// Parameter changes over one iteration in one coordinate space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeTable {
    pub space: String,
    pub rows: Vec<ParameterChange>,
}

impl ChangeTable {
    /// Changes for every name held by both `old` and `new`.
    pub fn new(space: &str, old: &Parameters, new: &Parameters) -> Self {
        let rows = new
            .iter()
            .filter_map(|(name, &n)| {
                old.get(name).map(|o| ParameterChange {
                    name: name.clone(),
                    old: o,
                    new: n,
                    relative: (o != 0.0).then(|| (o - n) / o),
                    factor: (o != 0.0 && n != 0.0)
                        .then(|| o.abs().max(n.abs()) / o.abs().min(n.abs())),
                })
            })
            .collect();
        Self {
            space: space.to_string(),
            rows,
        }
    }

    /// Largest absolute relative change and the parameter it belongs to.
    pub fn max_relative(&self) -> Option<(&str, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.relative.map(|v| (r.name.as_str(), v.abs())))
            .fold(None, |acc, (n, v)| match acc {
                Some((_, best)) if best >= v => acc,
                _ => Some((n, v)),
            })
    }

    /// Largest factor change and the parameter it belongs to.
    pub fn max_factor(&self) -> Option<(&str, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.factor.map(|v| (r.name.as_str(), v)))
            .fold(None, |acc, (n, v)| match acc {
                Some((_, best)) if best >= v => acc,
                _ => Some((n, v)),
            })
    }
}

/// One row of a residual artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualRow {
    pub name: String,
    pub group: String,
    pub measured: f64,
    pub modelled: f64,
    pub weight: f64,
}

impl ResidualRow {
    pub fn residual(&self) -> f64 {
        self.measured - self.modelled
    }
}

/// Report collaborator.
///
/// Every method has a no-op default so sinks only implement what they care about.
#[allow(unused_variables)]
pub trait Reporter {
    /// Start of an iteration.
    fn iteration_header(&mut self, iteration: usize, description: &str, model_calls: usize) {}

    /// Objective function at the start of an iteration.
    fn starting_phi(&mut self, phi: &PhiComponents, tikhonov_weight: f64) {}

    /// Parameters whose Jacobian column could not be computed.
    fn jacobian_failures(&mut self, names: &[String]) {}

    /// Singular-value spectrum of one factorization.
    fn singular_values(&mut self, label: &str, sigma: &Array1<f64>, sigma_trunc: &Array1<f64>) {}

    /// Progress of the regularization weight search.
    fn regularization_step(&mut self, iteration: usize, mu: f64, projected_meas: f64, target: f64) {
    }

    /// Weight chosen by the regularization weight search.
    fn regularization_result(&mut self, mu: f64, phi: &PhiComponents) {}

    fn trial(&mut self, summary: &TrialSummary) {}

    /// Parameters frozen while computing the selected upgrade.
    fn frozen_parameters(&mut self, frozen: &Parameters) {}

    fn parameter_changes(&mut self, table: &ChangeTable) {}

    /// Model calls used by an iteration.
    fn model_calls(&mut self, iteration: usize, calls: usize) {}

    /// Write a parameter artifact (`par`, `par<N>`, `bpa`, `rpb`).
    fn write_parameters(&mut self, tag: &str, pars: &Parameters) {}

    /// Write a residual artifact (`rei<N>`, `rei`).
    fn write_residuals(&mut self, tag: &str, rows: &[ResidualRow]) {}

    /// Write the termination controller state (`rst`).
    fn write_termination_state(&mut self, state: &str) {}

    /// Free-form message.
    fn message(&mut self, text: &str) {}
}

/// Renders report events as `log` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn iteration_header(&mut self, iteration: usize, description: &str, model_calls: usize) {
        info!(
            "OPTIMISATION ITERATION {} ({}), model calls so far: {}",
            iteration, description, model_calls
        );
    }

    fn starting_phi(&mut self, phi: &PhiComponents, tikhonov_weight: f64) {
        info!(
            "  starting phi = {:.6e} ({}, tikhonov weight = {:.6e})",
            phi.total(tikhonov_weight),
            phi,
            tikhonov_weight
        );
    }

    fn jacobian_failures(&mut self, names: &[String]) {
        if !names.is_empty() {
            warn!(
                "  derivatives could not be computed for: {}",
                names.join(", ")
            );
        }
    }

    fn singular_values(&mut self, label: &str, sigma: &Array1<f64>, sigma_trunc: &Array1<f64>) {
        debug!(
            "  {}: {} singular values retained {:?}, truncated {:?}",
            label,
            sigma.len(),
            sigma.to_vec(),
            sigma_trunc.to_vec()
        );
    }

    fn regularization_step(&mut self, iteration: usize, mu: f64, projected_meas: f64, target: f64) {
        debug!(
            "  regularization search {}: mu = {:.6e}, projected phi meas = {:.6e}, target = {:.6e}",
            iteration, mu, projected_meas, target
        );
    }

    fn regularization_result(&mut self, mu: f64, phi: &PhiComponents) {
        info!(
            "  tikhonov weight = {:.6e}, projected {}",
            mu, phi
        );
    }

    fn trial(&mut self, summary: &TrialSummary) {
        match summary.phi {
            Some((phi, pct)) => info!(
                "  lambda = {:.4e} ({}), length = {:.4e}, phi = {:.6e} ({:.2}% of starting phi)",
                summary.lambda, summary.label, summary.length, phi, pct
            ),
            None => warn!(
                "  lambda = {:.4e} ({}), length = {:.4e}, run failed",
                summary.lambda, summary.label, summary.length
            ),
        }
    }

    fn frozen_parameters(&mut self, frozen: &Parameters) {
        if !frozen.is_empty() {
            info!("  parameters frozen during upgrade: {}", frozen.names().join(", "));
        }
    }

    fn parameter_changes(&mut self, table: &ChangeTable) {
        for row in &table.rows {
            debug!(
                "  {:<16} {:>14.6e} {:>14.6e}",
                row.name, row.old, row.new
            );
        }
        if let Some((name, v)) = table.max_relative() {
            info!("  max relative {} change = {:.4e} [{}]", table.space, v, name);
        }
        if let Some((name, v)) = table.max_factor() {
            info!("  max factor {} change = {:.4e} [{}]", table.space, v, name);
        }
    }

    fn model_calls(&mut self, iteration: usize, calls: usize) {
        info!("  model calls in iteration {}: {}", iteration, calls);
    }

    fn write_parameters(&mut self, tag: &str, pars: &Parameters) {
        debug!("  [{}] {} parameter values", tag, pars.len());
    }

    fn write_residuals(&mut self, tag: &str, rows: &[ResidualRow]) {
        debug!("  [{}] {} residuals", tag, rows.len());
    }

    fn write_termination_state(&mut self, state: &str) {
        debug!("  [rst] {}", state);
    }

    fn message(&mut self, text: &str) {
        info!("{}", text);
    }
}

/// Artifacts captured by a [`MemoryReporter`].
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub parameters: BTreeMap<String, Parameters>,
    pub residuals: BTreeMap<String, Vec<ResidualRow>>,
    pub termination_state: Option<String>,
    pub trials: Vec<TrialSummary>,
    pub change_tables: Vec<ChangeTable>,
    pub tikhonov_weights: Vec<f64>,
    /// Objective components projected for each selected weight
    pub projected_phi: Vec<PhiComponents>,
    pub jacobian_failures: Vec<String>,
    pub frozen: Vec<Parameters>,
}

/// Keeps artifacts in memory and forwards every event to a [`LogReporter`].
///
/// Clones share the same storage, so a clone kept by the caller sees what the
/// solver wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    inner: Arc<Mutex<Artifacts>>,
    log: LogReporter,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything captured so far.
    pub fn artifacts(&self) -> Artifacts {
        self.inner
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn with<F: FnOnce(&mut Artifacts)>(&self, f: F) {
        if let Ok(mut a) = self.inner.lock() {
            f(&mut a);
        }
    }
}

impl Reporter for MemoryReporter {
    fn iteration_header(&mut self, iteration: usize, description: &str, model_calls: usize) {
        self.log.iteration_header(iteration, description, model_calls);
    }

    fn starting_phi(&mut self, phi: &PhiComponents, tikhonov_weight: f64) {
        self.log.starting_phi(phi, tikhonov_weight);
    }

    fn jacobian_failures(&mut self, names: &[String]) {
        self.log.jacobian_failures(names);
        self.with(|a| a.jacobian_failures.extend_from_slice(names));
    }

    fn regularization_result(&mut self, mu: f64, phi: &PhiComponents) {
        self.log.regularization_result(mu, phi);
        self.with(|a| {
            a.tikhonov_weights.push(mu);
            a.projected_phi.push(*phi);
        });
    }

    fn trial(&mut self, summary: &TrialSummary) {
        self.log.trial(summary);
        self.with(|a| a.trials.push(summary.clone()));
    }

    fn frozen_parameters(&mut self, frozen: &Parameters) {
        self.log.frozen_parameters(frozen);
        self.with(|a| a.frozen.push(frozen.clone()));
    }

    fn parameter_changes(&mut self, table: &ChangeTable) {
        self.log.parameter_changes(table);
        self.with(|a| a.change_tables.push(table.clone()));
    }

    fn write_parameters(&mut self, tag: &str, pars: &Parameters) {
        self.with(|a| {
            a.parameters.insert(tag.to_string(), pars.clone());
        });
    }

    fn write_residuals(&mut self, tag: &str, rows: &[ResidualRow]) {
        self.with(|a| {
            a.residuals.insert(tag.to_string(), rows.to_vec());
        });
    }

    fn write_termination_state(&mut self, state: &str) {
        self.with(|a| a.termination_state = Some(state.to_string()));
    }

    fn message(&mut self, text: &str) {
        self.log.message(text);
    }
}
