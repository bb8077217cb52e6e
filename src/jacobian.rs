//! Jacobian storage and construction.
//!
//! The Jacobian holds the partial derivatives of the simulated observations
//! (and prior-information equations) with respect to the numeric-space
//! parameters: `J[i, j] = ∂sim_i / ∂p_j`. Rows follow the objective function's
//! row order, columns the numeric parameter names it was built for.
//!
//! Construction is split in three steps so that the perturbed model runs can be
//! batched with every other run: [`JacobianBuilder::build_runs`] queues the base
//! run and the perturbations, [`JacobianBuilder::make_runs`] executes them and
//! [`JacobianBuilder::process_runs`] turns the results into derivatives.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, SvdOptError};
use crate::objective::ObjectiveFunction;
use crate::parameters::{Observations, ParameterInfo, ParameterTransform, Parameters};
use crate::run_manager::RunManager;

/// A dense Jacobian addressed by row and column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Jacobian {
    rows: Vec<String>,
    cols: Vec<String>,
    matrix: Array2<f64>,
    failed: BTreeSet<String>,
}

impl Jacobian {
    /// Create a Jacobian from its names and values.
    pub fn new(rows: Vec<String>, cols: Vec<String>, matrix: Array2<f64>) -> Result<Self> {
        if matrix.dim() != (rows.len(), cols.len()) {
            return Err(SvdOptError::DimensionMismatch(format!(
                "Jacobian matrix is {}x{} but has {} row and {} column names",
                matrix.nrows(),
                matrix.ncols(),
                rows.len(),
                cols.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            matrix,
            failed: BTreeSet::new(),
        })
    }

    /// Mark parameters whose derivatives could not be computed.
    pub fn with_failed<I: IntoIterator<Item = String>>(mut self, failed: I) -> Self {
        self.failed.extend(failed);
        self
    }

    pub fn row_names(&self) -> &[String] {
        &self.rows
    }

    pub fn col_names(&self) -> &[String] {
        &self.cols
    }

    /// Parameters whose derivatives could not be computed.
    pub fn failed_parameter_names(&self) -> &BTreeSet<String> {
        &self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    /// `(rows, columns)`.
    pub fn size(&self) -> (usize, usize) {
        self.matrix.dim()
    }

    pub fn nonzero_count(&self) -> usize {
        self.matrix.iter().filter(|v| **v != 0.0).count()
    }

    /// Derivatives with respect to one parameter.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.cols
            .iter()
            .position(|c| c == name)
            .map(|j| self.matrix.column(j))
    }

    /// Sub-matrix for the named rows and columns, in the order given.
    pub fn matrix(&self, rows: &[String], cols: &[String]) -> Result<Array2<f64>> {
        let row_idx = index_of(&self.rows, rows, SvdOptError::ObservationNotFound)?;
        let col_idx = index_of(&self.cols, cols, SvdOptError::ParameterNotFound)?;
        Ok(Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| {
            self.matrix[[row_idx[i], col_idx[j]]]
        }))
    }
}

fn index_of(
    all: &[String],
    wanted: &[String],
    missing: fn(String) -> SvdOptError,
) -> Result<Vec<usize>> {
    let lookup: HashMap<&str, usize> = all
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    wanted
        .iter()
        .map(|n| lookup.get(n.as_str()).copied().ok_or_else(|| missing(n.clone())))
        .collect()
}

/// What a Jacobian is to be built for.
pub struct JacobianRequest<'a> {
    /// Control-space parameters of the base run (fixed parameters included)
    pub base_ctl: &'a Parameters,
    /// Numeric-space parameters to differentiate with respect to
    pub numeric_names: &'a [String],
    pub transform: &'a dyn ParameterTransform,
    pub par_info: &'a ParameterInfo,
    /// Use central instead of forward differences
    pub central: bool,
}

/// Jacobian builder/processor collaborator.
pub trait JacobianBuilder {
    /// Queue the base run and every perturbed run with `run_manager`.
    fn build_runs(
        &mut self,
        request: &JacobianRequest<'_>,
        run_manager: &mut dyn RunManager,
    ) -> Result<()>;

    /// Execute the queued runs.
    fn make_runs(&mut self, run_manager: &mut dyn RunManager) {
        run_manager.run_batch();
    }

    /// Turn completed runs into derivatives. Fails if the base run failed.
    fn process_runs(
        &mut self,
        run_manager: &dyn RunManager,
        objective: &ObjectiveFunction,
        transform: &dyn ParameterTransform,
    ) -> Result<()>;

    /// Whether runs have been queued but not yet processed.
    fn has_pending_runs(&self) -> bool;

    /// The most recently processed Jacobian.
    fn jacobian(&self) -> &Jacobian;

    /// Control parameters and simulated observations of the last base run.
    fn base_run(&self) -> Option<(&Parameters, &Observations)>;

    /// Sub-matrix by names.
    fn matrix(&self, rows: &[String], cols: &[String]) -> Result<Array2<f64>> {
        self.jacobian().matrix(rows, cols)
    }

    fn failed_parameter_names(&self) -> BTreeSet<String> {
        self.jacobian().failed_parameter_names().clone()
    }

    /// Snapshot the current Jacobian.
    fn save(&mut self);

    /// Reinstate the last snapshot.
    fn restore(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
struct PendingRuns {
    base_id: usize,
    base_ctl: Parameters,
    numeric_names: Vec<String>,
    base_numeric: Parameters,
    /// Per parameter: `(run id, perturbed numeric value)`
    perturbations: Vec<Vec<(usize, f64)>>,
}

/// Finite-difference Jacobian built from perturbed model runs.
#[derive(Debug, Clone, Default)]
pub struct FiniteDifferenceJacobian {
    jacobian: Jacobian,
    saved: Option<Jacobian>,
    pending: Option<PendingRuns>,
    base: Option<(Parameters, Observations)>,
}

impl FiniteDifferenceJacobian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perturbed numeric values for one parameter.
    ///
    /// The increment is `max(derinc * |x|, derinc_floor)`. A perturbation that
    /// would leave the parameter's bounds is taken in the opposite direction.
    fn perturbations(
        name: &str,
        x: f64,
        request: &JacobianRequest<'_>,
    ) -> Result<Vec<f64>> {
        let rec = request.par_info.record(name)?;
        let h = (rec.derinc * x.abs()).max(rec.derinc_floor);
        let in_bounds = |v: f64| {
            let numeric = Parameters::from_pairs([(name, v)]);
            request
                .transform
                .numeric_to_active_ctl(&numeric)
                .get(name)
                .map_or(false, |c| rec.bounds.is_within_bounds(c))
        };

        let forward = if in_bounds(x + h) { x + h } else { x - h };
        if request.central {
            let both: Vec<f64> = [x + h, x - h].into_iter().filter(|v| in_bounds(*v)).collect();
            if both.len() == 2 {
                return Ok(both);
            }
        }
        Ok(vec![forward])
    }
}

impl JacobianBuilder for FiniteDifferenceJacobian {
    fn build_runs(
        &mut self,
        request: &JacobianRequest<'_>,
        run_manager: &mut dyn RunManager,
    ) -> Result<()> {
        let transform = request.transform;
        let base_numeric = transform.ctl_to_numeric(request.base_ctl);

        run_manager.reinitialize("jacobian");
        let base_id = run_manager.add_run(transform.ctl_to_model(request.base_ctl), "base", 0.0);

        let mut perturbations = Vec::with_capacity(request.numeric_names.len());
        for name in request.numeric_names {
            let x = base_numeric.value(name)?;
            let mut runs = Vec::new();
            for v in Self::perturbations(name, x, request)? {
                let mut numeric = base_numeric.clone();
                numeric.insert(name.clone(), v);
                let ctl = transform.numeric_to_ctl(&numeric);
                let mut full = request.base_ctl.clone();
                full.update(&ctl);
                let id = run_manager.add_run(transform.ctl_to_model(&full), name, 0.0);
                runs.push((id, v));
            }
            perturbations.push(runs);
        }

        debug!(
            "queued {} jacobian runs for {} parameters ({} differences)",
            run_manager.batch_len(),
            request.numeric_names.len(),
            if request.central { "central" } else { "forward" }
        );

        self.pending = Some(PendingRuns {
            base_id,
            base_ctl: request.base_ctl.clone(),
            numeric_names: request.numeric_names.to_vec(),
            base_numeric,
            perturbations,
        });
        Ok(())
    }

    fn process_runs(
        &mut self,
        run_manager: &dyn RunManager,
        objective: &ObjectiveFunction,
        transform: &dyn ParameterTransform,
    ) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| SvdOptError::InvalidState("no jacobian runs queued".to_string()))?;

        let base_obs = run_manager
            .get_run(pending.base_id)
            .and_then(|r| r.observations.clone())
            .ok_or_else(|| {
                SvdOptError::BaseRunFailed("the jacobian base run did not complete".to_string())
            })?;

        let obs_names = objective.observation_names();
        let rows = objective.row_names();
        let base_sim = base_obs.to_array(&obs_names)?;
        let n_obs = obs_names.len();

        let mut matrix = Array2::zeros((rows.len(), pending.numeric_names.len()));
        let mut failed = Vec::new();

        for (j, (name, runs)) in pending
            .numeric_names
            .iter()
            .zip(pending.perturbations.iter())
            .enumerate()
        {
            let x0 = pending.base_numeric.value(name)?;
            let mut points: Vec<(f64, Array1<f64>)> = Vec::new();
            for &(id, v) in runs {
                if let Some(obs) = run_manager.get_run(id).and_then(|r| r.observations.as_ref()) {
                    points.push((v, obs.to_array(&obs_names)?));
                }
            }

            let derivative = match points.as_slice() {
                [(a, sa), (b, sb)] if a != b => Some((sa - sb) / (a - b)),
                [(a, sa)] | [(a, sa), _] if *a != x0 => Some((sa - &base_sim) / (a - x0)),
                _ => None,
            };

            match derivative {
                Some(d) => {
                    matrix.column_mut(j).slice_mut(ndarray::s![..n_obs]).assign(&d);
                    for (i, pi_name) in rows.iter().enumerate().skip(n_obs) {
                        if let Some(rec) = objective.prior_information().get(pi_name) {
                            matrix[[i, j]] = rec
                                .terms
                                .iter()
                                .filter(|(p, _)| p == name)
                                .map(|(_, c)| c)
                                .sum();
                        }
                    }
                }
                None => failed.push(name.clone()),
            }
        }

        if !failed.is_empty() {
            warn!(
                "derivatives could not be computed for {} parameter(s): {}",
                failed.len(),
                failed.join(", ")
            );
        }

        let base_ctl = {
            let model = run_manager
                .get_run(pending.base_id)
                .map(|r| r.parameters.clone())
                .unwrap_or_default();
            let mut ctl = pending.base_ctl.clone();
            ctl.update(&transform.model_to_ctl(&model));
            ctl
        };

        self.jacobian = Jacobian::new(rows, pending.numeric_names, matrix)?.with_failed(failed);
        self.base = Some((base_ctl, base_obs));
        Ok(())
    }

    fn has_pending_runs(&self) -> bool {
        self.pending.is_some()
    }

    fn jacobian(&self) -> &Jacobian {
        &self.jacobian
    }

    fn base_run(&self) -> Option<(&Parameters, &Observations)> {
        self.base.as_ref().map(|(p, o)| (p, o))
    }

    fn save(&mut self) {
        self.saved = Some(self.jacobian.clone());
    }

    fn restore(&mut self) -> Result<()> {
        let saved = self
            .saved
            .clone()
            .ok_or_else(|| SvdOptError::InvalidState("no saved jacobian to restore".to_string()))?;
        self.jacobian = saved;
        Ok(())
    }
}
