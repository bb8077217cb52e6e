//! Fits that run into parameter bounds.

use svdopt_rs::observations::PriorInformation;
use svdopt_rs::parameters::{ParameterInfo, ParameterRecord};
use svdopt_rs::{
    FiniteDifferenceJacobian, LocalRunManager, MemoryReporter, ModelRun, ObjectiveFunction,
    ResumePoint, SolverConfig, SvdSolver, Termination,
};

use crate::test_helpers::{
    approx_eq, iteration_limit_only, line_observations, line_parameters, LineModel,
};

#[test]
fn test_parameter_held_on_upper_bound() {
    // the data want a = 3 but a may not exceed 2.5
    let objective = ObjectiveFunction::new(line_observations(5, 3.0, 0.5), PriorInformation::new());
    let reporter = MemoryReporter::new();
    let mut solver = SvdSolver::new(SolverConfig::default(), line_parameters(2.5), objective)
        .unwrap()
        .with_reporter(reporter.clone());
    let mut rm = LocalRunManager::new(LineModel::new(5));
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let current = solver
        .solve(&mut rm, &mut jacobian, &mut termination, 15, &mut optimum, ResumePoint::None)
        .unwrap();

    assert_eq!(current.ctl_pars().value("a").unwrap(), 2.5);
    // best b for a = 2.5 is the mean of y - 2.5 x
    assert!(approx_eq(current.ctl_pars().value("b").unwrap(), 1.5, 1e-4));

    let artifacts = reporter.artifacts();
    assert!(!artifacts.frozen.is_empty());
    assert!(artifacts.frozen.iter().all(|f| f.get("a") == Some(2.5)));
    // no trial ever left the bounds
    for pars in artifacts.parameters.values() {
        assert!(pars.value("a").unwrap() <= 2.5);
    }
}

#[test]
fn test_everything_frozen_stops_locally() {
    // both parameters start on their upper bounds and the data push both up
    let par_info = ParameterInfo::new()
        .with("a", ParameterRecord::new(1.0, -10.0, 1.0).unwrap())
        .unwrap()
        .with("b", ParameterRecord::new(1.0, -10.0, 1.0).unwrap())
        .unwrap();
    let objective = ObjectiveFunction::new(line_observations(5, 2.0, 1.5), PriorInformation::new());
    let mut solver = SvdSolver::new(SolverConfig::default(), par_info, objective).unwrap();
    let mut rm = LocalRunManager::new(LineModel::new(5));
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let current = solver
        .solve(&mut rm, &mut jacobian, &mut termination, 10, &mut optimum, ResumePoint::None)
        .unwrap();

    assert_eq!(termination.iteration_number(), 1);
    assert_eq!(current.ctl_pars().get("a"), Some(1.0));
    assert_eq!(current.ctl_pars().get("b"), Some(1.0));
    assert_eq!(current.frozen_ctl_pars().len(), 2);
}
