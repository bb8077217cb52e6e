//! Tests for the parameter transform chain.

use approx::assert_relative_eq;
use svdopt_rs::parameters::{
    ParameterInfo, ParameterRecord, ParameterTransform, Parameters, TransformKind, TransformSeq,
};

fn mixed_info() -> ParameterInfo {
    ParameterInfo::new()
        .with(
            "k1",
            ParameterRecord::new(3.5, 1e-3, 1e3)
                .unwrap()
                .with_transform(TransformKind::Log),
        )
        .unwrap()
        .with(
            "k2",
            ParameterRecord::new(0.02, 1e-6, 1.0)
                .unwrap()
                .with_transform(TransformKind::Log),
        )
        .unwrap()
        .with(
            "shift",
            ParameterRecord::new(-4.0, -10.0, 10.0)
                .unwrap()
                .with_scale_offset(0.5, 100.0),
        )
        .unwrap()
        .with(
            "held",
            ParameterRecord::new(1.0, 0.0, 2.0)
                .unwrap()
                .with_transform(TransformKind::Fixed),
        )
        .unwrap()
}

#[test]
fn test_control_numeric_control_roundtrip() {
    let info = mixed_info();
    let seq = TransformSeq::new(&info).unwrap();
    let ctl = Parameters::from_pairs([("k1", 3.5), ("k2", 0.02), ("shift", -4.0), ("held", 1.0)]);

    let numeric = seq.ctl_to_numeric(&ctl);
    assert_eq!(numeric.len(), 3);
    let back = seq.numeric_to_ctl(&numeric);

    assert_eq!(back.names(), ctl.names());
    for (name, value) in &ctl {
        assert_relative_eq!(back.get(name).unwrap(), *value, max_relative = 1e-12);
    }
}

#[test]
fn test_model_roundtrip_applies_scale_and_offset() {
    let info = mixed_info();
    let seq = TransformSeq::new(&info).unwrap();
    let ctl = info.initial_values();

    let model = seq.ctl_to_model(&ctl);
    assert_relative_eq!(model.get("shift").unwrap(), 98.0);
    let back = seq.model_to_ctl(&model);
    for (name, value) in &ctl {
        assert_relative_eq!(back.get(name).unwrap(), *value, max_relative = 1e-12);
    }
}

#[test]
fn test_active_ctl_to_model_reinserts_fixed() {
    let info = mixed_info();
    let seq = TransformSeq::new(&info).unwrap();
    let active = seq.ctl_to_active_ctl(&info.initial_values());
    assert!(!active.contains("held"));

    let model = seq.active_ctl_to_model(&active);
    assert_eq!(model.get("held"), Some(1.0));
    assert_eq!(model.len(), 4);
}

#[test]
fn test_log_transform_requires_positive_lower_bound() {
    let info = ParameterInfo::new()
        .with(
            "k",
            ParameterRecord::new(1.0, 0.0, 10.0)
                .unwrap()
                .with_transform(TransformKind::Log),
        )
        .unwrap();
    assert!(TransformSeq::new(&info).is_err());
}
