//! Straight-line fits with every upgrade formulation.

use svdopt_rs::{
    FiniteDifferenceJacobian, LocalRunManager, MarquardtMatrix, MatInv, MemoryReporter, ModelRun,
    ResumePoint, SolverConfig, SvdSolver, Termination,
};

use crate::test_helpers::{approx_eq, iteration_limit_only, line_problem};

fn fit(config: SolverConfig, max_iter: usize) -> (ModelRun, ModelRun, MemoryReporter) {
    let (par_info, objective, model) = line_problem(5, 2.0, 0.5);
    let reporter = MemoryReporter::new();
    let mut solver = SvdSolver::new(config, par_info, objective)
        .unwrap()
        .with_reporter(reporter.clone());
    let mut rm = LocalRunManager::new(model);
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = iteration_limit_only();
    let mut optimum = ModelRun::default();

    let current = solver
        .solve(
            &mut rm,
            &mut jacobian,
            &mut termination,
            max_iter,
            &mut optimum,
            ResumePoint::None,
        )
        .unwrap();
    assert_eq!(termination.iteration_number(), max_iter);
    (current, optimum, reporter)
}

#[test]
fn test_line_fit_all_formulations() {
    for mat_inv in [MatInv::JtQJ, MatInv::Q12J] {
        for marquardt in [MarquardtMatrix::Ident, MarquardtMatrix::JtQJ] {
            let config = SolverConfig::default()
                .with_mat_inv(mat_inv)
                .with_marquardt(marquardt);
            let (_, optimum, _) = fit(config, 20);

            let a = optimum.ctl_pars().value("a").unwrap();
            let b = optimum.ctl_pars().value("b").unwrap();
            assert!(approx_eq(a, 2.0, 1e-4), "{:?}/{:?}: a = {}", mat_inv, marquardt, a);
            assert!(approx_eq(b, 0.5, 1e-4), "{:?}/{:?}: b = {}", mat_inv, marquardt, b);
            assert!(optimum.phi(1.0).unwrap() < 1e-6);
        }
    }
}

#[test]
fn test_scaled_upgrade_converges() {
    let config = SolverConfig::default().with_scale_upgrade(true);
    let (_, optimum, _) = fit(config, 15);
    assert!(approx_eq(optimum.ctl_pars().value("a").unwrap(), 2.0, 1e-4));
}

#[test]
fn test_phi_never_increases_across_iterations() {
    let (_, optimum, reporter) = fit(SolverConfig::default(), 4);
    let artifacts = reporter.artifacts();

    let phis: Vec<f64> = (1..=4)
        .map(|i| {
            artifacts.residuals[&format!("rei{}", i)]
                .iter()
                .map(|r| (r.residual() * r.weight).powi(2))
                .sum()
        })
        .collect();
    assert!(phis.windows(2).all(|w| w[1] <= w[0] + 1e-12), "{:?}", phis);
    assert!(optimum.phi(1.0).unwrap() <= phis[3] + 1e-12);
}

#[test]
fn test_artifacts_written() {
    let (current, optimum, reporter) = fit(SolverConfig::default(), 2);
    let artifacts = reporter.artifacts();

    for tag in ["rpb", "par", "par1", "par2", "bpa"] {
        assert!(artifacts.parameters.contains_key(tag), "missing {}", tag);
    }
    for tag in ["rei", "rei1", "rei2"] {
        assert_eq!(artifacts.residuals[tag].len(), 5, "rows in {}", tag);
    }
    assert_eq!(&artifacts.parameters["par"], current.ctl_pars());
    assert_eq!(&artifacts.parameters["bpa"], optimum.ctl_pars());
    assert!(artifacts.termination_state.is_some());

    // first iteration: base lambdas plus 20, 10 and 40 around the initial lambda
    let first: Vec<f64> = artifacts.trials.iter().take(7).map(|t| t.lambda).collect();
    assert_eq!(first, vec![0.1, 1.0, 10.0, 20.0, 40.0, 100.0, 1000.0]);
    assert!(artifacts.trials.iter().take(7).all(|t| t.label == "IDEN"));
    // one control and one numeric change table per iteration
    assert_eq!(artifacts.change_tables.len(), 4);
}
