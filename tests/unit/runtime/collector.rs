use super::*;
use crate::backend::scripted::{ScriptedBackend, ScriptedOutput};
use crate::foundation::core::DType;
use crate::model::graph::{GraphDef, Layer, OutputRole};

fn detector() -> CompiledGraph {
    CompiledGraph::from_def(GraphDef {
        name: "collector-unit".to_string(),
        input: TensorShape::from([1, 3, 4, 4]),
        layers: vec![Layer::Identity],
        outputs: vec![
            OutputSpec {
                name: "boxes".to_string(),
                dtype: DType::F32,
                role: OutputRole::Boxes,
            },
            OutputSpec {
                name: "label_ids".to_string(),
                dtype: DType::I32,
                role: OutputRole::LabelIds,
            },
        ],
    })
    .unwrap()
}

fn boxes(rows: usize) -> HostTensor {
    HostTensor::f32([rows, 6], vec![1.0; rows * 6]).unwrap()
}

fn labels(rows: usize) -> HostTensor {
    HostTensor::i32([rows], vec![2; rows]).unwrap()
}

#[test]
fn poll_reports_pending_until_device_finishes() {
    let g = detector();
    let mut backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(2, boxes(5))]);
    let mut c = ResultCollector::new(&g);

    c.request_output(&mut backend, 0).unwrap();
    assert_eq!(c.poll(0).unwrap(), OutputPoll::Pending);
    assert_eq!(c.poll(0).unwrap(), OutputPoll::Pending);
    let OutputPoll::Ready(t) = c.poll(0).unwrap() else {
        panic!("expected ready");
    };
    assert_eq!(t.shape().dims(), &[5, 6]);
    // Ready is sticky and does not poll the device again.
    assert!(matches!(c.poll(0).unwrap(), OutputPoll::Ready(_)));
}

#[test]
fn later_output_cannot_be_requested_before_earlier_is_ready() {
    let g = detector();
    let mut backend = ScriptedBackend::new(vec![
        ScriptedOutput::ready_after(1, boxes(1)),
        ScriptedOutput::ready_after(0, labels(1)),
    ]);
    let mut c = ResultCollector::new(&g);

    assert!(c.request_output(&mut backend, 1).is_err());
    c.request_output(&mut backend, 0).unwrap();
    assert!(c.request_output(&mut backend, 1).is_err());
    assert_eq!(backend.requested_slots(), vec![0]);

    assert_eq!(c.poll(0).unwrap(), OutputPoll::Pending);
    assert!(matches!(c.poll(0).unwrap(), OutputPoll::Ready(_)));
    c.request_output(&mut backend, 1).unwrap();
    assert_eq!(backend.requested_slots(), vec![0, 1]);
}

#[test]
fn missing_device_data_is_a_readback_error() {
    let g = detector();
    let mut backend = ScriptedBackend::new(vec![ScriptedOutput::missing()]);
    let mut c = ResultCollector::new(&g);
    let err = c.request_output(&mut backend, 0).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Readback);
    assert_eq!(c.requested(), 0);
}

#[test]
fn validate_output_rejects_degenerate_and_mistyped() {
    let g = detector();
    let spec = &g.outputs()[0];
    assert!(validate_output(spec, &boxes(5)).is_ok());

    let empty = HostTensor::f32([0, 6], vec![]).unwrap();
    let err = validate_output(spec, &empty).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Validation);
    assert!(err.to_string().contains("(0, 6)"));

    assert!(validate_output(spec, &labels(3)).is_err());
}

#[test]
fn release_completed_keeps_pending_handles() {
    let g = detector();
    let mut backend = ScriptedBackend::new(vec![
        ScriptedOutput::ready_after(0, boxes(1)),
        ScriptedOutput::ready_after(3, labels(1)),
    ]);
    let mut c = ResultCollector::new(&g);

    c.request_output(&mut backend, 0).unwrap();
    c.poll(0).unwrap();
    c.request_output(&mut backend, 1).unwrap();
    assert_eq!(c.held_handles(), 2);

    c.release_completed();
    assert_eq!(c.held_handles(), 1);
    assert_eq!(c.pending_requests(), 1);
    assert_eq!(backend.live_readbacks(), 1);

    c.release();
    assert_eq!(c.pending_requests(), 0);
    assert_eq!(backend.live_readbacks(), 0);
}

#[test]
fn consume_fails_while_pending() {
    let g = detector();
    let mut backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(5, boxes(1))]);
    let mut c = ResultCollector::new(&g);
    c.request_output(&mut backend, 0).unwrap();
    c.poll(0).unwrap();

    let err = c.consume(0, CaptureMeta::default()).unwrap_err();
    assert!(err.to_string().contains("still pending"));
    assert_eq!(backend.live_readbacks(), 0);
}

#[test]
fn consume_builds_host_result() {
    let g = detector();
    let mut backend = ScriptedBackend::new(vec![
        ScriptedOutput::ready_after(0, boxes(2)),
        ScriptedOutput::ready_after(0, labels(2)),
    ]);
    let mut c = ResultCollector::new(&g);
    for i in 0..2 {
        c.request_output(&mut backend, i).unwrap();
        assert!(matches!(c.poll(i).unwrap(), OutputPoll::Ready(_)));
    }
    assert!(c.is_complete());

    let r = c.consume(7, CaptureMeta::default()).unwrap();
    assert_eq!(r.run_id(), 7);
    assert_eq!(r.detections().len(), 2);
    assert_eq!(r.label_ids().collect::<Vec<_>>(), vec![2, 2]);
    assert_eq!(backend.live_readbacks(), 0);
}
