//! # svdopt-rs
//!
//! `svdopt-rs` estimates the parameters of expensive simulation models with a
//! Gauss-Levenberg-Marquardt scheme stabilised by truncated singular value
//! decomposition.
//!
//! The library provides:
//! - Two upgrade formulations (normal equations `JᵗQJ` and square-root weighted `Q^½J`)
//!   with truncated SVD and identity or `JᵗQJ` Marquardt damping
//! - Change limits, hard bounds and iterative freezing of parameters heading out of bounds
//! - Batched evaluation of one trial upgrade per lambda
//! - Tikhonov regularization with an adaptive weight search
//! - Pluggable collaborators for model runs, Jacobians, transforms, reporting and termination
//!
//! ## Basic Usage
//!
//! ```
//! use svdopt_rs::observations::{ObservationInfo, ObservationRecord, PriorInformation};
//! use svdopt_rs::parameters::{Observations, ParameterInfo, ParameterRecord, Parameters};
//! use svdopt_rs::{
//!     FiniteDifferenceJacobian, LocalRunManager, ModelRun, ObjectiveFunction, ResumePoint,
//!     Result, SolverConfig, SvdSolver, TerminationController, TerminationSettings,
//! };
//!
//! // y = a * x + b, observed at x = 0, 1, 2
//! let model = |p: &Parameters| -> Result<Observations> {
//!     let (a, b) = (p.value("a")?, p.value("b")?);
//!     Ok((0..3).map(|x| (format!("y{}", x), a * x as f64 + b)).collect())
//! };
//!
//! let par_info = ParameterInfo::new()
//!     .with("a", ParameterRecord::new(1.0, -10.0, 10.0)?)?
//!     .with("b", ParameterRecord::new(1.0, -10.0, 10.0)?)?;
//! let obs_info = (0..3).fold(ObservationInfo::new(), |info, x| {
//!     info.with(&format!("y{}", x), ObservationRecord::new(2.0 * x as f64 + 0.5, 1.0, "obs"))
//! });
//! let objective = ObjectiveFunction::new(obs_info, PriorInformation::new());
//!
//! let mut solver = SvdSolver::new(SolverConfig::default(), par_info, objective)?;
//! let mut run_manager = LocalRunManager::new(model);
//! let mut jacobian = FiniteDifferenceJacobian::new();
//! let mut termination = TerminationController::new(TerminationSettings::default());
//! let mut best = ModelRun::default();
//!
//! solver.solve(&mut run_manager, &mut jacobian, &mut termination, 10, &mut best, ResumePoint::None)?;
//! assert!((best.ctl_pars().value("a")? - 2.0).abs() < 1e-3);
//! # Ok::<(), svdopt_rs::SvdOptError>(())
//! ```

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

pub mod jacobian;
pub mod model_run;
pub mod objective;
pub mod observations;
pub mod report;
pub mod run_manager;
pub mod solver;
pub mod termination;
pub mod utils;

// Re-exports for convenience
pub use error::{Result, SvdOptError};
pub use jacobian::{FiniteDifferenceJacobian, Jacobian, JacobianBuilder, JacobianRequest};
pub use model_run::ModelRun;
pub use objective::{ObjectiveFunction, PhiComponents, SqrtWeights};
pub use report::{LogReporter, MemoryReporter, Reporter};
pub use run_manager::{LocalRunManager, Model, RunManager, RunRecord};
pub use solver::{
    DynamicRegularization, MarquardtMatrix, MatInv, ResumePoint, SolverConfig, SvdSolver,
};
pub use termination::{Termination, TerminationController, TerminationSettings};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
