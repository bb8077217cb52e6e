//! Constrained upgrade tests: freezing at bounds and change-limit scaling.

use approx::assert_relative_eq;
use ndarray::{array, Array1};

use svdopt_rs::parameters::{
    ChangeLimit, ParameterInfo, ParameterRecord, Parameters, TransformSeq,
};
use svdopt_rs::solver::{strategy_for, ConstraintEngine, UpgradeContext};
use svdopt_rs::utils::svd::NalgebraSvd;
use svdopt_rs::{Jacobian, MarquardtMatrix, MatInv, SolverConfig};

/// y1 = 2a + b, y2 = a - b, y3 = a, with residuals matching Δa = 1, Δb = -1 by default.
struct Setup {
    info: ParameterInfo,
    jacobian: Jacobian,
    rows: Vec<String>,
    q_sqrt: Array1<f64>,
    residuals: Array1<f64>,
    base: Parameters,
    transform: TransformSeq,
    svd: NalgebraSvd,
}

impl Setup {
    fn new(a: ParameterRecord, b: ParameterRecord) -> Self {
        let info = ParameterInfo::new()
            .with("a", a)
            .unwrap()
            .with("b", b)
            .unwrap();
        let rows: Vec<String> = ["y1", "y2", "y3"].iter().map(|s| s.to_string()).collect();
        let jacobian = Jacobian::new(
            rows.clone(),
            vec!["a".to_string(), "b".to_string()],
            array![[2.0, 1.0], [1.0, -1.0], [1.0, 0.0]],
        )
        .unwrap();
        Self {
            base: info.initial_values(),
            transform: TransformSeq::new(&info).unwrap(),
            info,
            jacobian,
            rows,
            q_sqrt: array![1.0, 2.0, 1.0],
            residuals: array![1.0, 2.0, 1.0],
            svd: NalgebraSvd::default(),
        }
    }

    fn with_residuals(mut self, residuals: Array1<f64>) -> Self {
        self.residuals = residuals;
        self
    }

    fn ctx(&self) -> UpgradeContext<'_> {
        UpgradeContext {
            jacobian: &self.jacobian,
            rows: &self.rows,
            q_sqrt: &self.q_sqrt,
            residuals: &self.residuals,
            base_active_ctl: &self.base,
            transform: &self.transform,
            svd: &self.svd,
        }
    }
}

#[test]
fn test_parameter_on_bound_is_frozen_and_rest_resolved() {
    // a starts on its upper bound and the unconstrained step pushes it out
    let setup = Setup::new(
        ParameterRecord::new(1.0, -10.0, 1.0).unwrap(),
        ParameterRecord::new(2.0, -10.0, 10.0).unwrap(),
    );
    let config = SolverConfig::default().with_change_limits(100.0, 100.0, 0.001);
    let engine = ConstraintEngine::new(&setup.info, &setup.transform, &config);

    for mat_inv in [MatInv::JtQJ, MatInv::Q12J] {
        let strategy = strategy_for(mat_inv);
        let result = engine
            .constrained_upgrade(
                strategy.as_ref(),
                &setup.ctx(),
                &Parameters::new(),
                0.0,
                MarquardtMatrix::Ident,
                false,
            )
            .unwrap();

        assert_eq!(result.frozen.names(), vec!["a".to_string()]);
        assert_eq!(result.frozen.get("a"), Some(1.0));
        assert_eq!(result.candidate.get("a"), Some(1.0));
        // weighted least squares over b alone: (1 - 8) / 5
        assert_relative_eq!(result.candidate.get("b").unwrap(), 0.6, epsilon = 1e-9);
        assert_relative_eq!(result.magnitude, 1.4, epsilon = 1e-9);
        assert!(result.passes >= 2);
        assert!(result.passes < setup.base.len() + 2);
    }
}

#[test]
fn test_parameter_on_zero_lower_bound_is_frozen() {
    // residuals matching Δa = -1, Δb = 1 push a below its bound at zero
    let setup = Setup::new(
        ParameterRecord::new(0.0, 0.0, 10.0)
            .unwrap()
            .with_change_limit(ChangeLimit::Factor),
        ParameterRecord::new(2.0, -10.0, 10.0).unwrap(),
    )
    .with_residuals(array![-1.0, -2.0, -1.0]);
    let config = SolverConfig::default().with_change_limits(100.0, 100.0, 0.001);
    let engine = ConstraintEngine::new(&setup.info, &setup.transform, &config);

    for mat_inv in [MatInv::JtQJ, MatInv::Q12J] {
        let strategy = strategy_for(mat_inv);
        let result = engine
            .constrained_upgrade(
                strategy.as_ref(),
                &setup.ctx(),
                &Parameters::new(),
                0.0,
                MarquardtMatrix::Ident,
                false,
            )
            .unwrap();

        assert_eq!(result.frozen.get("a"), Some(0.0));
        assert_eq!(result.candidate.get("a"), Some(0.0));
        // b alone: (-1 * 1 + 4 * 2) / 5
        assert_relative_eq!(result.candidate.get("b").unwrap(), 3.4, epsilon = 1e-9);
        assert_relative_eq!(result.magnitude, 1.4, epsilon = 1e-9);
        assert!(result.passes >= 2 && result.passes < setup.base.len() + 2);
    }
}

#[test]
fn test_frozen_set_only_grows() {
    let setup = Setup::new(
        ParameterRecord::new(1.0, -10.0, 1.0).unwrap(),
        ParameterRecord::new(2.0, -10.0, 10.0).unwrap(),
    );
    let config = SolverConfig::default().with_change_limits(100.0, 100.0, 0.001);
    let engine = ConstraintEngine::new(&setup.info, &setup.transform, &config);
    let strategy = strategy_for(MatInv::JtQJ);

    let already = Parameters::from_pairs([("b", 2.0)]);
    let result = engine
        .constrained_upgrade(
            strategy.as_ref(),
            &setup.ctx(),
            &already,
            1.0,
            MarquardtMatrix::Ident,
            false,
        )
        .unwrap();
    assert!(result.frozen.contains("b"));
    assert_eq!(result.candidate.get("b"), Some(2.0));
    // a is still pushed against its bound
    assert_eq!(result.candidate.get("a"), Some(1.0));
    assert_eq!(result.magnitude, 0.0);
    assert!(result.passes < setup.base.len() + 2);
}

#[test]
fn test_change_limit_scales_whole_step() {
    let setup = Setup::new(
        ParameterRecord::new(1.0, -10.0, 10.0)
            .unwrap()
            .with_change_limit(ChangeLimit::Relative),
        ParameterRecord::new(2.0, -10.0, 10.0)
            .unwrap()
            .with_change_limit(ChangeLimit::Relative),
    );
    let config = SolverConfig::default().with_change_limits(0.5, 10.0, 0.001);
    let engine = ConstraintEngine::new(&setup.info, &setup.transform, &config);
    let strategy = strategy_for(MatInv::Q12J);

    let result = engine
        .constrained_upgrade(
            strategy.as_ref(),
            &setup.ctx(),
            &Parameters::new(),
            0.0,
            MarquardtMatrix::Ident,
            false,
        )
        .unwrap();

    // full step (1, -1); a may only move by 0.5, so everything is halved
    assert!(result.frozen.is_empty());
    assert_relative_eq!(result.candidate.get("a").unwrap(), 1.5, epsilon = 1e-9);
    assert_relative_eq!(result.candidate.get("b").unwrap(), 1.5, epsilon = 1e-9);
    assert_relative_eq!(result.magnitude, 0.5f64.sqrt(), epsilon = 1e-9);
    assert_eq!(result.passes, 1);
}
