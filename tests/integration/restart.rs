//! Restart points and jacobian-only runs.

use svdopt_rs::parameters::{ParameterTransform, Parameters, TransformSeq};
use svdopt_rs::{
    FiniteDifferenceJacobian, JacobianBuilder, JacobianRequest, LocalRunManager, MemoryReporter,
    ModelRun, ResumePoint, RunManager, SolverConfig, SvdOptError, SvdSolver, Termination,
};

use crate::test_helpers::{approx_eq, iteration_limit_only, line_problem, LineModel};

fn solver() -> (SvdSolver, LocalRunManager<LineModel>) {
    let (par_info, objective, model) = line_problem(5, 2.0, 0.5);
    (
        SvdSolver::new(SolverConfig::default(), par_info, objective).unwrap(),
        LocalRunManager::new(model),
    )
}

#[test]
fn test_restart_preconditions() {
    let (mut solver, mut rm) = solver();
    let mut optimum = ModelRun::default();

    let resumes = [
        ResumePoint::ReuseJacobian,
        ResumePoint::ResumeJacobianRuns,
        ResumePoint::ResumeNewIteration(Parameters::from_pairs([("a", 1.5)])),
    ];
    for resume in resumes {
        let mut jacobian = FiniteDifferenceJacobian::new();
        let mut termination = iteration_limit_only();
        let err = solver
            .solve(&mut rm, &mut jacobian, &mut termination, 1, &mut optimum, resume)
            .unwrap_err();
        assert!(matches!(err, SvdOptError::InconsistentRestart(_)), "{}", err);
    }
    assert_eq!(rm.total_runs(), 0);
}

#[test]
fn test_resume_new_iteration_from_saved_parameters() {
    let (solver, mut rm) = solver();
    let reporter = MemoryReporter::new();
    let mut solver = solver.with_reporter(reporter.clone());
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let saved = Parameters::from_pairs([("a", 1.9), ("b", 0.6)]);
    solver
        .solve(
            &mut rm,
            &mut jacobian,
            &mut termination,
            1,
            &mut optimum,
            ResumePoint::ResumeNewIteration(saved.clone()),
        )
        .unwrap();

    let artifacts = reporter.artifacts();
    // the iteration-start snapshot predates the restart parameters
    assert_eq!(artifacts.parameters["rpb"].get("a"), Some(1.0));
    let a = solver.current_solution().ctl_pars().value("a").unwrap();
    assert!((a - 2.0).abs() < (1.9f64 - 2.0).abs());
}

#[test]
fn test_reuse_jacobian_only_repeats_base_run() {
    let (mut solver, mut rm) = solver();
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    solver
        .solve(&mut rm, &mut jacobian, &mut termination, 1, &mut optimum, ResumePoint::None)
        .unwrap();
    let runs_before = rm.total_runs();
    let trials = rm.batch_len();

    solver
        .solve(
            &mut rm,
            &mut jacobian,
            &mut termination,
            1,
            &mut optimum,
            ResumePoint::ReuseJacobian,
        )
        .unwrap();
    // one base run plus one batch of trials, no perturbed runs
    assert_eq!(rm.total_runs() - runs_before, 1 + rm.batch_len());
    assert!(trials > 0);
    assert_eq!(termination.iteration_number(), 2);
}

#[test]
fn test_resume_queued_jacobian_runs() {
    let (par_info, objective, model) = line_problem(5, 2.0, 0.5);
    let transform = TransformSeq::new(&par_info).unwrap();
    let mut rm = LocalRunManager::new(model);
    let mut jacobian = FiniteDifferenceJacobian::new();

    let base = par_info.initial_values();
    let names = transform.ctl_to_numeric(&base).names();
    let request = JacobianRequest {
        base_ctl: &base,
        numeric_names: &names,
        transform: &transform,
        par_info: &par_info,
        central: false,
    };
    jacobian.build_runs(&request, &mut rm).unwrap();
    assert!(jacobian.has_pending_runs());
    assert_eq!(rm.total_runs(), 0);

    let mut solver = SvdSolver::new(SolverConfig::default(), par_info, objective).unwrap();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();
    solver
        .solve(
            &mut rm,
            &mut jacobian,
            &mut termination,
            1,
            &mut optimum,
            ResumePoint::ResumeJacobianRuns,
        )
        .unwrap();

    assert!(!jacobian.has_pending_runs());
    assert_eq!(jacobian.jacobian().size(), (5, 2));
    assert!(optimum.phi(1.0).unwrap() < 21.25);
}

#[test]
fn test_jacobian_only_mode() {
    let (par_info, objective, model) = line_problem(5, 2.0, 0.5);
    let config = SolverConfig::default().with_jacobian_only(true);
    let mut solver = SvdSolver::new(config, par_info, objective).unwrap();
    let mut rm = LocalRunManager::new(model);
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let current = solver
        .solve(&mut rm, &mut jacobian, &mut termination, 10, &mut optimum, ResumePoint::None)
        .unwrap();

    assert_eq!(termination.iteration_number(), 0);
    assert_eq!(rm.total_runs(), 3);
    assert_eq!(current.ctl_pars().get("a"), Some(1.0));
    assert!(current.is_valid());

    // dy/da = x, dy/db = 1
    let column_a = jacobian.jacobian().column("a").unwrap();
    for (x, d) in column_a.iter().enumerate() {
        assert!(approx_eq(*d, x as f64, 1e-6));
    }
    let column_b = jacobian.jacobian().column("b").unwrap();
    assert!(column_b.iter().all(|d| approx_eq(*d, 1.0, 1e-6)));
}
