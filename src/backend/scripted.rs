use crate::backend::device::{Backend, BufferId, DeviceBuffer, GraphSchedule, Readback};
use crate::foundation::core::TensorShape;
use crate::foundation::error::{DetectError, DetectResult};
use crate::foundation::tensor::HostTensor;
use crate::model::graph::{CompiledGraph, OutputSpec};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One device interaction observed by a [`ScriptedBackend`].
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptEvent {
    /// A buffer was allocated.
    Allocate {
        /// New buffer.
        id: BufferId,
        /// Its shape.
        shape: TensorShape,
    },
    /// A buffer was returned to the device.
    Free {
        /// Freed buffer.
        id: BufferId,
    },
    /// A run was scheduled over `input`.
    Schedule {
        /// Input buffer of the run.
        input: BufferId,
    },
    /// Step `index` (0-based within the run) was executed.
    Step {
        /// Step position.
        index: usize,
    },
    /// A readback of output `slot` was issued.
    RequestReadback {
        /// Output slot.
        slot: usize,
    },
    /// A readback of output `slot` was polled.
    Poll {
        /// Output slot.
        slot: usize,
        /// Whether the poll completed the transfer.
        ready: bool,
    },
    /// A readback handle of output `slot` was dropped.
    DropReadback {
        /// Output slot.
        slot: usize,
    },
}

/// Scripted behavior of one output slot.
#[derive(Clone, Debug)]
pub struct ScriptedOutput {
    /// Number of polls that report pending before the transfer completes.
    pub pending_polls: usize,
    /// Tensor delivered on completion. `None` means the device holds no data for this output.
    pub tensor: Option<HostTensor>,
}

impl ScriptedOutput {
    /// Output that completes after `pending_polls` pending polls.
    pub fn ready_after(pending_polls: usize, tensor: HostTensor) -> Self {
        Self {
            pending_polls,
            tensor: Some(tensor),
        }
    }

    /// Output for which the device reports no data.
    pub fn missing() -> Self {
        Self {
            pending_polls: 0,
            tensor: None,
        }
    }
}

/// Deterministic backend double for host-loop testing and replay.
///
/// Step failures, readback latencies (in polls) and output tensors are scripted up front, and
/// every device interaction is appended to an event log.
pub struct ScriptedBackend {
    outputs: Vec<ScriptedOutput>,
    fail_allocations: bool,
    fail_at_step: Option<usize>,
    next_id: u64,
    live_buffers: usize,
    log: Rc<RefCell<Vec<ScriptEvent>>>,
    live_readbacks: Rc<Cell<usize>>,
}

impl ScriptedBackend {
    /// Create a backend whose output slot `i` behaves like `outputs[i]`.
    pub fn new(outputs: Vec<ScriptedOutput>) -> Self {
        Self {
            outputs,
            fail_allocations: false,
            fail_at_step: None,
            next_id: 0,
            live_buffers: 0,
            log: Rc::new(RefCell::new(Vec::new())),
            live_readbacks: Rc::new(Cell::new(0)),
        }
    }

    /// Make every allocation fail.
    pub fn with_failing_allocations(mut self) -> Self {
        self.fail_allocations = true;
        self
    }

    /// Make step `index` (0-based within a run) fail.
    pub fn with_failing_step(mut self, index: usize) -> Self {
        self.fail_at_step = Some(index);
        self
    }

    /// Replace the script of one output slot.
    pub fn set_output(&mut self, slot: usize, output: ScriptedOutput) {
        if slot >= self.outputs.len() {
            self.outputs.resize(slot + 1, ScriptedOutput::missing());
        }
        self.outputs[slot] = output;
    }

    /// Toggle allocation failures.
    pub fn set_failing_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<ScriptEvent> {
        self.log.borrow().clone()
    }

    /// Forget logged events.
    pub fn clear_events(&mut self) {
        self.log.borrow_mut().clear();
    }

    /// Output slots in the order their readbacks were requested.
    pub fn requested_slots(&self) -> Vec<usize> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ScriptEvent::RequestReadback { slot } => Some(*slot),
                _ => None,
            })
            .collect()
    }

    /// Readback handles that have not been dropped yet.
    pub fn live_readbacks(&self) -> usize {
        self.live_readbacks.get()
    }

    /// Buffers allocated and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    fn record(&self, event: ScriptEvent) {
        self.log.borrow_mut().push(event);
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn allocate(&mut self, shape: &TensorShape) -> DetectResult<DeviceBuffer> {
        if self.fail_allocations {
            return Err(DetectError::allocation(format!(
                "scripted allocation failure for {shape}"
            )));
        }
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.live_buffers += 1;
        self.record(ScriptEvent::Allocate {
            id,
            shape: shape.clone(),
        });
        Ok(DeviceBuffer::zeroed(id, shape.clone()))
    }

    fn free(&mut self, buffer: DeviceBuffer) {
        self.live_buffers = self.live_buffers.saturating_sub(1);
        self.record(ScriptEvent::Free { id: buffer.id() });
    }

    fn schedule(
        &mut self,
        graph: &CompiledGraph,
        input: &DeviceBuffer,
    ) -> DetectResult<Box<dyn GraphSchedule>> {
        self.record(ScriptEvent::Schedule { input: input.id() });
        Ok(Box::new(ScriptedSchedule {
            total: graph.step_count(),
            done: 0,
            fail_at: self.fail_at_step,
            log: Rc::clone(&self.log),
        }))
    }

    fn request_readback(
        &mut self,
        slot: usize,
        _output: &OutputSpec,
    ) -> DetectResult<Option<Box<dyn Readback>>> {
        self.record(ScriptEvent::RequestReadback { slot });
        let Some(ScriptedOutput {
            pending_polls,
            tensor: Some(tensor),
        }) = self.outputs.get(slot).cloned()
        else {
            return Ok(None);
        };
        self.live_readbacks.set(self.live_readbacks.get() + 1);
        Ok(Some(Box::new(ScriptedReadback {
            slot,
            pending: pending_polls,
            tensor: Some(tensor),
            log: Rc::clone(&self.log),
            live: Rc::clone(&self.live_readbacks),
        })))
    }
}

struct ScriptedSchedule {
    total: usize,
    done: usize,
    fail_at: Option<usize>,
    log: Rc<RefCell<Vec<ScriptEvent>>>,
}

impl GraphSchedule for ScriptedSchedule {
    fn step(&mut self) -> DetectResult<()> {
        if self.done >= self.total {
            return Err(DetectError::execution("step past end of graph"));
        }
        if self.fail_at == Some(self.done) {
            return Err(DetectError::execution(format!(
                "scripted failure at step {}",
                self.done
            )));
        }
        self.log
            .borrow_mut()
            .push(ScriptEvent::Step { index: self.done });
        self.done += 1;
        Ok(())
    }

    fn steps_remaining(&self) -> usize {
        self.total - self.done
    }
}

struct ScriptedReadback {
    slot: usize,
    pending: usize,
    tensor: Option<HostTensor>,
    log: Rc<RefCell<Vec<ScriptEvent>>>,
    live: Rc<Cell<usize>>,
}

impl Readback for ScriptedReadback {
    fn poll(&mut self) -> DetectResult<Option<HostTensor>> {
        let ready = self.pending == 0;
        self.log.borrow_mut().push(ScriptEvent::Poll {
            slot: self.slot,
            ready,
        });
        if !ready {
            self.pending -= 1;
            return Ok(None);
        }
        self.tensor
            .take()
            .map(Some)
            .ok_or_else(|| DetectError::readback(format!("output {} already taken", self.slot)))
    }
}

impl Drop for ScriptedReadback {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
        self.log
            .borrow_mut()
            .push(ScriptEvent::DropReadback { slot: self.slot });
    }
}
