use super::*;
use crate::backend::scripted::{ScriptEvent, ScriptedBackend};

fn shape(h: usize, w: usize) -> TensorShape {
    TensorShape::from([1, 3, h, w])
}

#[test]
fn reuses_matching_shape_before_allocating() {
    let mut backend = ScriptedBackend::new(vec![]);
    let mut arena = InputArena::new(ArenaOpts::default());

    let a = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    let a_id = a.id();
    arena.release(&mut backend, a);

    let b = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    assert_eq!(b.id(), a_id);

    let st = arena.stats();
    assert_eq!(st.alloc_buffers, 1);
    assert_eq!(st.reused, 1);
    assert_eq!(st.retained_buffers, 0);
}

#[test]
fn different_shape_allocates() {
    let mut backend = ScriptedBackend::new(vec![]);
    let mut arena = InputArena::new(ArenaOpts::default());

    let a = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    arena.release(&mut backend, a);
    let b = arena.acquire_input(&mut backend, &shape(4, 4)).unwrap();
    assert_eq!(b.shape(), &shape(4, 4));
    assert_eq!(arena.stats().alloc_buffers, 2);
    assert_eq!(arena.stats().retained_buffers, 1);
}

#[test]
fn allocation_failure_is_reported() {
    let mut backend = ScriptedBackend::new(vec![]).with_failing_allocations();
    let mut arena = InputArena::new(ArenaOpts::default());
    let err = arena
        .acquire_input(&mut backend, &shape(8, 8))
        .unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Allocation);
}

#[test]
fn honors_per_shape_cap() {
    let mut backend = ScriptedBackend::new(vec![]);
    let mut arena = InputArena::new(ArenaOpts {
        max_pool_bytes: 1 << 30,
        max_buffers_per_shape: 1,
    });

    let a = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    let b = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    arena.release(&mut backend, a);
    arena.release(&mut backend, b);

    let st = arena.stats();
    assert_eq!(st.retained_buffers, 1);
    assert_eq!(st.dropped_on_release, 1);
    assert_eq!(backend.live_buffers(), 1);
}

#[test]
fn honors_global_byte_cap() {
    let bytes = shape(8, 8).element_count() * 4;
    let mut backend = ScriptedBackend::new(vec![]);
    let mut arena = InputArena::new(ArenaOpts {
        max_pool_bytes: bytes,
        max_buffers_per_shape: 8,
    });

    let a = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    let b = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    arena.release(&mut backend, a);
    arena.release(&mut backend, b);

    let st = arena.stats();
    assert_eq!(st.retained_bytes, bytes);
    assert_eq!(st.retained_buffers, 1);
    assert!(st.dropped_on_release >= 1);
}

#[test]
fn clear_frees_retained_buffers() {
    let mut backend = ScriptedBackend::new(vec![]);
    let mut arena = InputArena::new(ArenaOpts::default());
    let a = arena.acquire_input(&mut backend, &shape(8, 8)).unwrap();
    let id = a.id();
    arena.release(&mut backend, a);

    arena.clear(&mut backend);
    assert_eq!(arena.stats().retained_buffers, 0);
    assert_eq!(backend.live_buffers(), 0);
    assert!(backend.events().contains(&ScriptEvent::Free { id }));
}
