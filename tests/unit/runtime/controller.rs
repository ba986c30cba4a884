use super::*;
use crate::backend::scripted::{ScriptedBackend, ScriptedOutput};
use crate::foundation::core::{DType, TensorShape};
use crate::foundation::tensor::HostTensor;
use crate::model::graph::{GraphDef, Layer, OutputRole, OutputSpec};

fn graph(steps: usize) -> CompiledGraph {
    CompiledGraph::from_def(GraphDef {
        name: "controller-unit".to_string(),
        input: TensorShape::from([1, 1, 2, 2]),
        layers: vec![Layer::Identity; steps],
        outputs: vec![OutputSpec {
            name: "boxes".to_string(),
            dtype: DType::F32,
            role: OutputRole::Boxes,
        }],
    })
    .unwrap()
}

fn frame(value: f32) -> Frame {
    Frame::new(
        TensorShape::from([1, 1, 2, 2]),
        vec![value; 4],
        CaptureMeta::default(),
    )
    .unwrap()
}

fn boxes() -> HostTensor {
    HostTensor::f32([1, 6], vec![0.0, 0.0, 1.0, 1.0, 0.9, 3.0]).unwrap()
}

fn opts(budget: u32) -> ControllerOpts {
    ControllerOpts {
        step_budget: StepBudget::new(budget).unwrap(),
        ..Default::default()
    }
}

#[test]
fn run_ids_increase_per_admitted_run() {
    let backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(0, boxes())]);
    let mut c = RunController::new(backend, graph(2), opts(2));

    assert!(c.submit_run(&frame(1.0)));
    assert_eq!(c.run_id(), Some(0));
    assert_eq!(c.tick(), RunState::CollectingOutput(0));
    assert_eq!(c.tick(), RunState::Ready);
    assert_eq!(c.take_results().unwrap().run_id(), 0);

    assert!(c.submit_run(&frame(2.0)));
    assert_eq!(c.run_id(), Some(1));
}

#[test]
fn ticks_in_run_counts_from_admission() {
    let backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(5, boxes())]);
    let mut c = RunController::new(backend, graph(3), opts(1));

    c.tick();
    assert_eq!(c.ticks_in_run(), 0);
    assert!(c.submit_run(&frame(1.0)));
    for _ in 0..6 {
        c.tick();
    }
    assert_eq!(c.ticks_in_run(), 6);
    assert_eq!(c.state(), RunState::CollectingOutput(0));
    assert_eq!(c.pending_requests(), 1);
}

#[test]
fn ticks_in_run_resets_when_the_run_ends() {
    let backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(0, boxes())]);
    let mut c = RunController::new(backend, graph(2), opts(1));

    // Consumed.
    assert!(c.submit_run(&frame(1.0)));
    while c.tick() != RunState::Ready {}
    assert!(c.ticks_in_run() > 0);
    assert!(c.take_results().is_some());
    assert_eq!(c.ticks_in_run(), 0);
    c.tick();
    assert_eq!(c.ticks_in_run(), 0);

    // Cancelled.
    assert!(c.submit_run(&frame(1.0)));
    c.tick();
    assert_eq!(c.ticks_in_run(), 1);
    assert!(c.cancel());
    assert_eq!(c.ticks_in_run(), 0);

    // Failed, then drained.
    c.backend_mut().set_output(0, ScriptedOutput::missing());
    assert!(c.submit_run(&frame(1.0)));
    while !matches!(c.tick(), RunState::Failed(_)) {}
    assert!(c.ticks_in_run() > 0);
    assert_eq!(c.tick(), RunState::Idle);
    assert_eq!(c.ticks_in_run(), 0);
}

#[test]
fn last_error_persists_until_next_admission() {
    let backend = ScriptedBackend::new(vec![ScriptedOutput::missing()]);
    let mut c = RunController::new(backend, graph(1), opts(4));

    assert!(c.submit_run(&frame(1.0)));
    assert_eq!(c.tick(), RunState::CollectingOutput(0));
    assert_eq!(c.tick(), RunState::Failed(ErrorKind::Readback));
    assert_eq!(c.tick(), RunState::Idle);
    assert_eq!(c.last_error(), Some(ErrorKind::Readback));
    assert!(c.last_error_message().unwrap().contains("boxes"));

    c.backend_mut()
        .set_output(0, ScriptedOutput::ready_after(0, boxes()));
    assert!(c.submit_run(&frame(1.0)));
    assert_eq!(c.last_error(), None);
}

#[test]
fn frame_of_wrong_shape_is_refused_by_the_device() {
    let backend = crate::backend::cpu::CpuBackend::default();
    let mut c = RunController::new(backend, graph(1), opts(4));

    let wrong = Frame::new(TensorShape::from([1, 1, 1, 1]), vec![0.0], CaptureMeta::default())
        .unwrap();
    assert!(!c.submit_run(&wrong));
    assert_eq!(c.state(), RunState::Failed(ErrorKind::Execution));
    assert_eq!(c.tick(), RunState::Idle);
    assert_eq!(c.arena_stats().retained_buffers, 1);
}

#[test]
fn shutdown_frees_every_buffer() {
    let backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(3, boxes())]);
    let mut c = RunController::new(backend, graph(1), opts(1));

    assert!(c.submit_run(&frame(1.0)));
    c.tick();
    c.tick();
    assert_eq!(c.backend().live_readbacks(), 1);

    c.shutdown();
    assert_eq!(c.state(), RunState::Idle);
    assert_eq!(c.backend().live_readbacks(), 0);
    assert_eq!(c.backend().live_buffers(), 0);
    assert_eq!(c.arena_stats().retained_buffers, 0);
}

#[test]
fn warm_up_is_refused_mid_run() {
    let backend = ScriptedBackend::new(vec![ScriptedOutput::ready_after(0, boxes())]);
    let mut c = RunController::new(backend, graph(4), opts(1));

    assert!(c.submit_run(&frame(1.0)));
    assert!(c.warm_up().is_err());
    assert_eq!(c.state(), RunState::Executing);
}
