use super::*;

#[test]
fn frame_rejects_mismatched_data() {
    let shape = TensorShape::from([1, 3, 2, 2]);
    assert!(Frame::new(shape.clone(), vec![0.0; 12], CaptureMeta::default()).is_ok());
    assert!(Frame::new(shape, vec![0.0; 11], CaptureMeta::default()).is_err());
}

#[test]
fn closures_are_frame_sources() {
    let mut n = 0;
    let mut src = || {
        n += 1;
        (n % 2 == 0).then(|| {
            Frame::new(TensorShape::from([1, 1, 1, 1]), vec![1.0], CaptureMeta::default()).unwrap()
        })
    };
    assert!(src.next_frame().is_none());
    assert!(src.next_frame().is_some());
}

#[test]
fn synthetic_source_honors_ready_cadence() {
    let mut src = SyntheticSource::new(SyntheticSourceOpts {
        ready_every: 3,
        ..Default::default()
    })
    .unwrap();
    let ready: Vec<bool> = (0..6).map(|_| src.next_frame().is_some()).collect();
    assert_eq!(ready, vec![false, false, true, false, false, true]);
    assert_eq!(src.produced(), 2);
}

#[test]
fn synthetic_frames_move_and_carry_pose() {
    let mut src = SyntheticSource::new(SyntheticSourceOpts {
        shape: TensorShape::from([1, 2, 8, 8]),
        square: 2,
        ..Default::default()
    })
    .unwrap();

    let f0 = src.next_frame().unwrap();
    let f1 = src.next_frame().unwrap();
    assert_eq!(f0.capture().frame_index, 0);
    assert_eq!(f1.capture().frame_index, 1);
    assert!(f1.capture().pose.position[0] > f0.capture().pose.position[0]);

    // Frame 0: channel 0, square at (0, 0). Frame 1: channel 1, square at (1, 1).
    assert_eq!(f0.data()[0], 1.0);
    assert_eq!(f0.data().iter().sum::<f32>(), 4.0);
    assert_eq!(f1.data()[64 + 9], 1.0);
    assert_eq!(f1.data()[0], 0.0);
}

#[test]
fn synthetic_source_rejects_bad_shapes() {
    let bad = SyntheticSourceOpts {
        shape: TensorShape::from([3, 8, 8]),
        ..Default::default()
    };
    assert!(SyntheticSource::new(bad).is_err());
}
