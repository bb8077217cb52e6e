//! SVD-stabilised Gauss-Levenberg-Marquardt solver.
//!
//! This module holds the solver core: the upgrade vector computation, the
//! constraint engine that enforces change limits and bounds, the Tikhonov
//! weight search, the trial batch evaluation and the iteration controller that
//! ties them together.

// Include module declarations and re-exports
pub mod config;
pub mod iteration;
pub mod limits;
pub mod regularization;
pub mod trials;
pub mod upgrade;

// Re-export key types
pub use config::{MarquardtMatrix, MatInv, SolverConfig};
pub use iteration::{IterationOutcome, ResumePoint, SvdSolver};
pub use limits::{BoundCheck, ConstrainedUpgrade, ConstraintEngine, LimitCheck, LimitType};
pub use regularization::{search_weight, DynamicRegularization, WeightSearchOutcome};
pub use trials::{lambda_set, SelectedTrial, TrialBatch, TrialCandidate, TrialOutcome};
pub use upgrade::{
    strategy_for, NormalEquationUpgrade, SqrtWeightedUpgrade, UpgradeContext, UpgradeStrategy,
    UpgradeVector,
};
