use super::*;

const MODEL: &str = r#"
{
  "name": "tiny",
  "input": [1, 3, 8, 8],
  "layers": [
    { "op": "scale", "factor": 2.0 },
    { "op": "relu" },
    { "op": "detect", "grid": 2, "score_threshold": 0.5, "max_detections": 4 }
  ],
  "outputs": [
    { "name": "boxes", "dtype": "f32", "role": "boxes" },
    { "name": "label_ids", "dtype": "i32", "role": "label_ids" }
  ]
}
"#;

#[test]
fn load_graph_parses_layers_and_outputs() {
    let g = load_graph(MODEL.as_bytes()).unwrap();
    assert_eq!(g.name(), "tiny");
    assert_eq!(g.step_count(), 3);
    assert_eq!(g.input_shape().dims(), &[1, 3, 8, 8]);
    assert_eq!(g.outputs()[0].role, OutputRole::Boxes);
    assert_eq!(g.outputs()[1].dtype, DType::I32);
    assert_eq!(g.layers()[0], Layer::Scale { factor: 2.0 });
}

#[test]
fn clones_share_the_definition() {
    let g = load_graph(MODEL.as_bytes()).unwrap();
    let h = g.clone();
    assert!(std::ptr::eq(g.def(), h.def()));
}

#[test]
fn rejects_unknown_ops() {
    let bad = MODEL.replace("\"relu\"", "\"gelu\"");
    let err = load_graph(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, DetectError::Config(_)));
}

#[test]
fn rejects_duplicate_outputs() {
    let bad = MODEL.replace("\"label_ids\", \"dtype\"", "\"boxes\", \"dtype\"");
    let err = load_graph(bad.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("twice"));
}

#[test]
fn rejects_empty_graphs_and_degenerate_inputs() {
    let def = GraphDef {
        name: "empty".to_string(),
        input: TensorShape::from([1, 3, 8, 8]),
        layers: vec![],
        outputs: vec![OutputSpec {
            name: "boxes".to_string(),
            dtype: DType::F32,
            role: OutputRole::Boxes,
        }],
    };
    assert!(CompiledGraph::from_def(def.clone()).is_err());

    let def = GraphDef {
        input: TensorShape::from([1, 0, 8, 8]),
        layers: vec![Layer::Identity],
        ..def
    };
    let err = CompiledGraph::from_def(def).unwrap_err();
    assert!(err.to_string().contains("degenerate"));
}

#[test]
fn rejects_models_without_a_boxes_output() {
    let bad = MODEL.replace(
        "{ \"name\": \"boxes\", \"dtype\": \"f32\", \"role\": \"boxes\" },\n",
        "",
    );
    assert_ne!(bad, MODEL);
    let err = load_graph(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, DetectError::Config(_)));
    assert!(err.to_string().contains("no boxes output"));
}

#[test]
fn rejects_outputs_whose_dtype_does_not_fit_the_role() {
    let bad = MODEL.replace(
        "\"dtype\": \"i32\", \"role\": \"label_ids\"",
        "\"dtype\": \"f32\", \"role\": \"label_ids\"",
    );
    assert_ne!(bad, MODEL);
    let err = load_graph(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, DetectError::Config(_)));
    assert!(err.to_string().contains("label_ids"));

    assert_eq!(OutputRole::Boxes.dtype(), DType::F32);
    assert_eq!(OutputRole::LabelIds.dtype(), DType::I32);
    assert_eq!(OutputRole::Scores.dtype(), DType::F32);
}
