//! Tikhonov-regularized fit with an adaptive regularization weight.
//!
//! A quadratic `y = c0 + c1 * x + c2 * x^2` is fitted to a handful of noisy
//! points. Preferred-value equations pull every coefficient towards zero and the
//! solver tunes the regularization weight so that the measurement objective
//! lands on a fraction of its current value. Artifacts are kept in memory and
//! printed at the end.

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};

use svdopt_rs::observations::{
    ObservationInfo, ObservationRecord, PriorInfoRecord, PriorInformation,
};
use svdopt_rs::parameters::{Observations, ParameterInfo, ParameterRecord, Parameters};
use svdopt_rs::{
    DynamicRegularization, FiniteDifferenceJacobian, LocalRunManager, MemoryReporter, ModelRun,
    ObjectiveFunction, ResumePoint, SolverConfig, SvdSolver, TerminationController,
    TerminationSettings,
};

const X: [f64; 6] = [-1.0, -0.5, 0.0, 0.5, 1.0, 1.5];
const Y: [f64; 6] = [2.9, 1.6, 1.1, 1.4, 2.2, 3.9];

fn quadratic(pars: &Parameters) -> svdopt_rs::Result<Observations> {
    let c = [pars.value("c0")?, pars.value("c1")?, pars.value("c2")?];
    Ok(X.iter()
        .enumerate()
        .map(|(i, x)| (format!("y{}", i), c[0] + c[1] * x + c[2] * x * x))
        .collect())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])?;

    println!("Regularized quadratic fit");
    println!("=========================\n");

    let obs_info = Y.iter().enumerate().fold(ObservationInfo::new(), |info, (i, y)| {
        info.with(&format!("y{}", i), ObservationRecord::new(*y, 10.0, "data"))
    });
    let prior = ["c0", "c1", "c2"].into_iter().fold(PriorInformation::new(), |prior, name| {
        prior.with(
            &format!("pref_{}", name),
            PriorInfoRecord::new(&[(name, 1.0)], 0.0, 1.0, "regul_pref"),
        )
    });

    let mut par_info = ParameterInfo::new();
    for name in ["c0", "c1", "c2"] {
        par_info.add(name, ParameterRecord::new(0.5, -20.0, 20.0)?)?;
    }

    let regularization = DynamicRegularization::dynamic()
        .with_target(1e-3, 0.2)
        .with_weight_bounds(1e-6, 1e4);
    let config = SolverConfig::default()
        .with_description("regularized quadratic")
        .with_regularization(regularization);

    let reporter = MemoryReporter::new();
    let objective = ObjectiveFunction::new(obs_info, prior);
    let mut solver =
        SvdSolver::new(config, par_info, objective)?.with_reporter(reporter.clone());

    let mut run_manager = LocalRunManager::new(quadratic);
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = TerminationController::new(TerminationSettings {
        noptmax: 8,
        ..TerminationSettings::default()
    });
    let mut best = ModelRun::default();

    let current = solver.solve(
        &mut run_manager,
        &mut jacobian,
        &mut termination,
        8,
        &mut best,
        ResumePoint::None,
    )?;

    let artifacts = reporter.artifacts();
    println!("Regularization weight per iteration:");
    for (i, mu) in artifacts.tikhonov_weights.iter().enumerate() {
        println!("  iteration {:>2}: {:.4e}", i + 1, mu);
    }

    println!("\nCoefficients:");
    for (name, value) in current.ctl_pars() {
        println!("  {} = {:>10.5}", name, value);
    }
    if let Some(phi) = current.phi_components() {
        println!(
            "\nMeasurement phi {:.4e}, regularization phi {:.4e}",
            phi.meas, phi.regul
        );
    }

    println!("\nResiduals of the final iteration:");
    if let Some(rows) = artifacts.residuals.get("rei") {
        for row in rows {
            println!(
                "  {:<8} {:<11} {:>9.4} {:>9.4} {:>9.4}",
                row.name,
                row.group,
                row.measured,
                row.modelled,
                row.residual()
            );
        }
    }

    Ok(())
}
