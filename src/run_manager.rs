//! Model-run execution.
//!
//! The solver never calls the simulation model directly. It queues parameter
//! sets with a [`RunManager`], runs the whole batch with one blocking call and
//! reads the results back by the id each run was queued under.
//! [`LocalRunManager`] executes batches in-process, in parallel with rayon when
//! the `parallel` feature is enabled.

use log::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;
use crate::parameters::{Observations, Parameters};

/// A simulation model: model-space parameters in, simulated observations out.
pub trait Model: Sync {
    /// Run the model.
    ///
    /// An `Err` marks the run as failed; it does not abort the solver unless the
    /// failed run is the base run of a Jacobian.
    fn run(&self, model_pars: &Parameters) -> Result<Observations>;
}

impl<F> Model for F
where
    F: Fn(&Parameters) -> Result<Observations> + Sync,
{
    fn run(&self, model_pars: &Parameters) -> Result<Observations> {
        self(model_pars)
    }
}

/// One queued (and possibly completed) run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Model-space parameters
    pub parameters: Parameters,
    /// Simulated observations; `None` until the run succeeded
    pub observations: Option<Observations>,
    pub label: String,
    pub lambda: f64,
}

impl RunRecord {
    pub fn is_success(&self) -> bool {
        self.observations.is_some()
    }
}

/// Run-execution collaborator.
pub trait RunManager {
    /// Discard queued runs and start a new batch.
    fn reinitialize(&mut self, tag: &str);

    /// Queue a run and return its id within the batch.
    fn add_run(&mut self, model_pars: Parameters, label: &str, lambda: f64) -> usize;

    /// Execute every queued run, blocking until all of them completed or failed.
    fn run_batch(&mut self);

    /// A queued run by id.
    fn get_run(&self, id: usize) -> Option<&RunRecord>;

    /// Number of runs in the current batch.
    fn batch_len(&self) -> usize;

    /// Number of model runs executed since construction.
    fn total_runs(&self) -> usize;
}

/// In-process run manager.
pub struct LocalRunManager<M: Model> {
    model: M,
    tag: String,
    runs: Vec<RunRecord>,
    total: usize,
    parallel: bool,
}

impl<M: Model> LocalRunManager<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            tag: String::new(),
            runs: Vec::new(),
            total: 0,
            parallel: cfg!(feature = "parallel"),
        }
    }

    /// Run batches serially even when rayon is available.
    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn execute(model: &M, pars: &Parameters) -> Option<Observations> {
        match model.run(pars) {
            Ok(obs) if obs.iter().all(|(_, v)| v.is_finite()) => Some(obs),
            Ok(_) => {
                warn!("model run produced non-finite observations");
                None
            }
            Err(e) => {
                warn!("model run failed: {}", e);
                None
            }
        }
    }

    fn run_serial(&mut self) {
        let model = &self.model;
        for run in self.runs.iter_mut().filter(|r| !r.is_success()) {
            run.observations = Self::execute(model, &run.parameters);
        }
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(&mut self) {
        let model = &self.model;
        self.runs
            .par_iter_mut()
            .filter(|r| !r.is_success())
            .for_each(|run| run.observations = Self::execute(model, &run.parameters));
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(&mut self) {
        self.run_serial();
    }
}

impl<M: Model> RunManager for LocalRunManager<M> {
    fn reinitialize(&mut self, tag: &str) {
        self.tag = tag.to_string();
        self.runs.clear();
    }

    fn add_run(&mut self, model_pars: Parameters, label: &str, lambda: f64) -> usize {
        self.runs.push(RunRecord {
            parameters: model_pars,
            observations: None,
            label: label.to_string(),
            lambda,
        });
        self.runs.len() - 1
    }

    fn run_batch(&mut self) {
        let pending = self.runs.iter().filter(|r| !r.is_success()).count();
        debug!("{}: running {} model runs", self.tag, pending);
        if self.parallel {
            self.run_parallel();
        } else {
            self.run_serial();
        }
        self.total += pending;
    }

    fn get_run(&self, id: usize) -> Option<&RunRecord> {
        self.runs.get(id)
    }

    fn batch_len(&self) -> usize {
        self.runs.len()
    }

    fn total_runs(&self) -> usize {
        self.total
    }
}
