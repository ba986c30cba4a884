use super::*;

#[test]
fn shape_element_count_and_display() {
    let s = TensorShape::from([1, 3, 4, 5]);
    assert_eq!(s.rank(), 4);
    assert_eq!(s.element_count(), 60);
    assert_eq!(s.to_string(), "(1, 3, 4, 5)");
}

#[test]
fn degenerate_shapes() {
    assert!(TensorShape::from([0, 6]).is_degenerate());
    assert!(TensorShape::from([5, 0]).is_degenerate());
    assert!(TensorShape::new([]).is_degenerate());
    assert!(!TensorShape::from([5, 6]).is_degenerate());
}

#[test]
fn step_budget_rejects_zero() {
    assert!(StepBudget::new(0).is_err());
    assert_eq!(StepBudget::new(7).unwrap().get(), 7);
    assert_eq!(StepBudget::default().get(), 25);
}

#[test]
fn step_budget_serde_validates() {
    let b: StepBudget = serde_json::from_str("12").unwrap();
    assert_eq!(b.get(), 12);
    assert!(serde_json::from_str::<StepBudget>("0").is_err());
    assert_eq!(serde_json::to_string(&b).unwrap(), "12");
}

#[test]
fn shape_serializes_as_plain_array() {
    let s = TensorShape::from([1, 3, 8, 8]);
    let json = serde_json::to_string(&s).unwrap();
    assert_eq!(json, "[1,3,8,8]");
    let back: TensorShape = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);
}

#[test]
fn pose_defaults_to_identity() {
    let m = CaptureMeta::default();
    assert_eq!(m.pose, Pose::IDENTITY);
    assert_eq!(m.pose.rotation[3], 1.0);
}
