//! Calibrating a decay model against noisy data.
//!
//! The model `y = amp * exp(-k * t) + base` is fitted to synthetic observations.
//! `k` is estimated in log space and `base` is held fixed. Solver progress is
//! logged to the terminal.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};

use svdopt_rs::observations::{ObservationInfo, ObservationRecord, PriorInformation};
use svdopt_rs::parameters::{
    ChangeLimit, Observations, ParameterInfo, ParameterRecord, Parameters, TransformKind,
};
use svdopt_rs::{
    FiniteDifferenceJacobian, LocalRunManager, ModelRun, ObjectiveFunction, ResumePoint,
    RunManager, SolverConfig, SvdSolver, Termination, TerminationController, TerminationSettings,
};

fn decay(times: &[f64], pars: &Parameters) -> svdopt_rs::Result<Observations> {
    let amp = pars.value("amp")?;
    let k = pars.value("k")?;
    let base = pars.value("base")?;
    Ok(times
        .iter()
        .enumerate()
        .map(|(i, t)| (format!("c{:02}", i), amp * (-k * t).exp() + base))
        .collect())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])?;

    println!("Decay model calibration");
    println!("=======================\n");

    let times: Vec<f64> = (0..25).map(|i| i as f64 * 0.5).collect();
    let truth = Parameters::from_pairs([("amp", 4.0), ("k", 0.35), ("base", 0.2)]);

    // synthetic observations with uniform noise of +/- 0.02
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let clean = decay(&times, &truth)?;
    let obs_info = clean.iter().fold(ObservationInfo::new(), |info, (name, y)| {
        let noisy = y + rng.gen_range(-0.02..0.02);
        info.with(name, ObservationRecord::new(noisy, 50.0, "conc"))
    });

    let par_info = ParameterInfo::new()
        .with(
            "amp",
            ParameterRecord::new(1.0, 0.0, 100.0)?.with_change_limit(ChangeLimit::Relative),
        )?
        .with(
            "k",
            ParameterRecord::new(1.0, 1e-3, 10.0)?.with_transform(TransformKind::Log),
        )?
        .with(
            "base",
            ParameterRecord::new(0.2, 0.0, 1.0)?.with_transform(TransformKind::Fixed),
        )?;

    let objective = ObjectiveFunction::new(obs_info, PriorInformation::new());
    let config = SolverConfig::default().with_description("decay calibration");
    let mut solver = SvdSolver::new(config, par_info, objective)?;

    let mut run_manager = LocalRunManager::new(move |p: &Parameters| decay(&times, p));
    let mut jacobian = FiniteDifferenceJacobian::new();
    let mut termination = TerminationController::new(TerminationSettings {
        noptmax: 30,
        ..TerminationSettings::default()
    });
    let mut best = ModelRun::default();

    solver.solve(
        &mut run_manager,
        &mut jacobian,
        &mut termination,
        30,
        &mut best,
        ResumePoint::None,
    )?;

    println!("\nStopped after {} iterations", termination.iteration_number());
    if let Some(reason) = termination.reason() {
        println!("Reason: {}", reason);
    }
    println!("Model runs: {}", run_manager.total_runs());
    println!("\n{:<6} {:>12} {:>12}", "name", "estimate", "true");
    for (name, value) in best.ctl_pars() {
        println!("{:<6} {:>12.6} {:>12.6}", name, value, truth.value(name)?);
    }
    if let Some(phi) = best.phi_components() {
        println!("\nFinal phi: {:.6e}", phi.meas);
    }

    Ok(())
}
