//! Fits with Tikhonov regularization.

use svdopt_rs::{
    DynamicRegularization, FiniteDifferenceJacobian, LocalRunManager, MemoryReporter, ModelRun,
    ResumePoint, SolverConfig, SvdSolver,
};

use svdopt_rs::observations::{PriorInfoRecord, PriorInformation};
use svdopt_rs::ObjectiveFunction;

use crate::test_helpers::{
    approx_eq, iteration_limit_only, line_observations, line_parameters, regularized_line_problem,
    LineModel,
};

#[test]
fn test_fixed_weight_matches_normal_equations() {
    let (par_info, objective, model) = regularized_line_problem(5, 2.0, 0.5);
    let mut solver = SvdSolver::new(SolverConfig::default(), par_info, objective).unwrap();
    let mut rm = LocalRunManager::new(model);
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    solver
        .solve(&mut rm, &mut jacobian, &mut termination, 20, &mut optimum, ResumePoint::None)
        .unwrap();

    // [31 10; 10 6] [a; b] = [66; 22.5]
    let a = optimum.ctl_pars().value("a").unwrap();
    let b = optimum.ctl_pars().value("b").unwrap();
    assert!(approx_eq(a, 171.0 / 86.0, 1e-5), "a = {}", a);
    assert!(approx_eq(b, 37.5 / 86.0, 1e-5), "b = {}", b);

    let phi = optimum.phi_components().unwrap();
    assert!(phi.meas > 0.0 && phi.regul > 0.0);
    assert_eq!(solver.regularization().weight, 1.0);
}

#[test]
fn test_dynamic_weight_is_searched_each_iteration() {
    let (par_info, objective, model) = regularized_line_problem(5, 2.0, 0.5);
    let regularization = DynamicRegularization::dynamic().with_weight_bounds(1e-6, 1e6);
    let config = SolverConfig::default().with_regularization(regularization);
    let reporter = MemoryReporter::new();
    let mut solver = SvdSolver::new(config, par_info, objective)
        .unwrap()
        .with_reporter(reporter.clone());
    let mut rm = LocalRunManager::new(model);
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let current = solver
        .solve(&mut rm, &mut jacobian, &mut termination, 3, &mut optimum, ResumePoint::None)
        .unwrap();

    let weights = reporter.artifacts().tikhonov_weights;
    assert_eq!(weights.len(), 3);
    assert!(weights.iter().all(|mu| (1e-6..=1e6).contains(mu)));
    assert_eq!(solver.regularization().weight, weights[2]);

    // the measurement misfit at the start is 21.25
    let meas = current.phi_components().unwrap().meas;
    assert!(meas < 21.25, "meas phi {}", meas);
}

#[test]
fn test_weight_search_respects_parameter_on_bound() {
    // a starts on its upper bound of 1 while the data want a = 2
    let prior = PriorInformation::new()
        .with("pa", PriorInfoRecord::new(&[("a", 1.0)], 1.0, 1.0, "regul_a"))
        .with("pb", PriorInfoRecord::new(&[("b", 1.0)], 0.0, 1.0, "regul_b"));
    let objective = ObjectiveFunction::new(line_observations(5, 2.0, 0.5), prior);
    let regularization = DynamicRegularization::dynamic().with_weight_bounds(1e-6, 1e6);
    let config = SolverConfig::default().with_regularization(regularization);
    let reporter = MemoryReporter::new();
    let mut solver = SvdSolver::new(config, line_parameters(1.0), objective)
        .unwrap()
        .with_reporter(reporter.clone());
    let mut rm = LocalRunManager::new(LineModel::new(5));
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let current = solver
        .solve(&mut rm, &mut jacobian, &mut termination, 2, &mut optimum, ResumePoint::None)
        .unwrap();

    // with a held at 1 the best measurement fit is b = 2.5, phi = 10
    let projected = reporter.artifacts().projected_phi;
    assert!(!projected.is_empty());
    for phi in &projected {
        assert!(phi.meas > 10.0 - 1e-6, "projected meas phi {}", phi.meas);
    }
    assert_eq!(current.ctl_pars().value("a").unwrap(), 1.0);
    assert!(current.phi_components().unwrap().meas < 21.25);
}
