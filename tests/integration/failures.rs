//! Behaviour when model runs fail.

use svdopt_rs::parameters::Parameters;
use svdopt_rs::{
    FiniteDifferenceJacobian, LocalRunManager, MemoryReporter, ModelRun, ResumePoint,
    SolverConfig, SvdOptError, SvdSolver,
};

use crate::test_helpers::{iteration_limit_only, line_problem, LineModel};

fn run(model: LineModel, max_iter: usize, reporter: MemoryReporter) -> (svdopt_rs::Result<ModelRun>, usize) {
    let (par_info, objective, _) = line_problem(5, 2.0, 0.5);
    let mut solver = SvdSolver::new(SolverConfig::default(), par_info, objective)
        .unwrap()
        .with_reporter(reporter);
    let mut rm = LocalRunManager::new(model);
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();
    let result = solver.solve(
        &mut rm,
        &mut jacobian,
        &mut termination,
        max_iter,
        &mut optimum,
        ResumePoint::None,
    );
    (result, rm.model().calls())
}

fn is_start(p: &Parameters) -> bool {
    p.get("a") == Some(1.0) && p.get("b") == Some(1.0)
}

#[test]
fn test_failed_base_run_aborts() {
    let model = LineModel::new(5).failing_when(is_start);
    let (result, _) = run(model, 3, MemoryReporter::new());
    assert!(matches!(result, Err(SvdOptError::BaseRunFailed(_))));
}

#[test]
fn test_all_trials_failing_is_an_error() {
    // jacobian runs move one parameter at a time; every trial moves both
    let model = LineModel::new(5).failing_when(|p| p.get("a") != Some(1.0) && p.get("b") != Some(1.0));
    let reporter = MemoryReporter::new();
    let (result, calls) = run(model, 3, reporter.clone());

    match result {
        Err(SvdOptError::AllTrialsFailed { iteration, trials }) => {
            assert_eq!(iteration, 1);
            assert_eq!(trials, 7);
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.ctl_pars().clone())),
    }
    // base, two perturbations and seven trials
    assert_eq!(calls, 10);
    let artifacts = reporter.artifacts();
    assert_eq!(artifacts.trials.len(), 7);
    assert!(artifacts.trials.iter().all(|t| t.phi.is_none()));
}

#[test]
fn test_failed_derivative_freezes_parameter() {
    // the perturbed run for b fails
    let model = LineModel::new(5).failing_when(|p| {
        p.get("b").map_or(false, |b| (b - 1.01).abs() < 1e-9)
    });
    let reporter = MemoryReporter::new();
    let (result, _) = run(model, 1, reporter.clone());

    let current = result.unwrap();
    assert_eq!(current.ctl_pars().get("b"), Some(1.0));
    assert_ne!(current.ctl_pars().get("a"), Some(1.0));
    assert_eq!(current.frozen_ctl_pars().get("b"), Some(1.0));

    let artifacts = reporter.artifacts();
    assert_eq!(artifacts.jacobian_failures, vec!["b".to_string()]);
    assert!(artifacts.frozen[0].contains("b"));
}
