//! Tests for parameter definitions.

use svdopt_rs::parameters::{
    Bounds, ChangeLimit, ParameterInfo, ParameterRecord, TransformKind,
};
use svdopt_rs::SvdOptError;

#[test]
fn test_problem_from_json() {
    let info: ParameterInfo = serde_json::from_str(
        r#"{
            "hk": {"init_value": 5.0, "bounds": {"min": 0.1, "max": 50.0}, "transform": "log"},
            "ss": {"init_value": 0.2, "change_limit": "relative"},
            "por": {"init_value": 0.3, "transform": "fixed"}
        }"#,
    )
    .unwrap();
    info.validate().unwrap();

    let hk = info.record("hk").unwrap();
    assert_eq!(hk.transform, TransformKind::Log);
    assert_eq!(hk.change_limit, ChangeLimit::Factor);
    assert_eq!(hk.derinc, 0.01);
    assert_eq!(hk.bounds, Bounds::new(0.1, 50.0).unwrap());

    let ss = info.record("ss").unwrap();
    assert_eq!(ss.change_limit, ChangeLimit::Relative);
    assert_eq!(ss.bounds, Bounds::unbounded());

    assert!(!info.is_active("por"));
    assert!(info.is_active("ss"));
    assert_eq!(info.initial_values().len(), 3);
}

#[test]
fn test_initial_value_outside_bounds_rejected() {
    let info = ParameterInfo::new()
        .with("a", ParameterRecord::new(20.0, 0.0, 10.0).unwrap())
        .unwrap();
    assert!(matches!(info.validate(), Err(SvdOptError::Configuration(_))));

    // fixed parameters are not estimated, so their bounds are not checked
    let info = ParameterInfo::new()
        .with(
            "a",
            ParameterRecord::new(20.0, 0.0, 10.0)
                .unwrap()
                .with_transform(TransformKind::Fixed),
        )
        .unwrap();
    assert!(info.validate().is_ok());
}

#[test]
fn test_inverted_bounds_rejected() {
    let err = ParameterRecord::new(1.0, 5.0, 0.0).unwrap_err();
    assert!(matches!(err, SvdOptError::BoundsError(_)));
}

#[test]
fn test_unknown_parameter_lookup() {
    let info = ParameterInfo::new();
    assert!(matches!(
        info.record("missing"),
        Err(SvdOptError::ParameterNotFound(_))
    ));
}
