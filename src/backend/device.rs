use crate::foundation::core::TensorShape;
use crate::foundation::error::{DetectError, DetectResult};
use crate::foundation::tensor::HostTensor;
use crate::model::graph::{CompiledGraph, OutputSpec};

/// Backend-assigned buffer identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Device-resident float buffer holding one preprocessed frame.
///
/// Backends in this crate keep the storage in host memory; the type is still treated as
/// device-owned: it is handed out by [`Backend::allocate`] and must go back through
/// [`Backend::free`].
#[derive(Debug)]
pub struct DeviceBuffer {
    id: BufferId,
    shape: TensorShape,
    data: Vec<f32>,
}

impl DeviceBuffer {
    /// Create a zero-filled buffer. Intended for [`Backend`] implementations.
    pub fn zeroed(id: BufferId, shape: TensorShape) -> Self {
        let data = vec![0.0; shape.element_count()];
        Self { id, shape, data }
    }

    /// Buffer identity.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Buffer shape.
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len().saturating_mul(std::mem::size_of::<f32>())
    }

    /// Current contents.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Copy host data into the buffer. `src` must match the element count exactly.
    pub fn upload(&mut self, src: &[f32]) -> DetectResult<()> {
        if src.len() != self.data.len() {
            return Err(DetectError::validation(format!(
                "upload of {} elements into buffer of shape {}",
                src.len(),
                self.shape
            )));
        }
        self.data.copy_from_slice(src);
        Ok(())
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}

/// Resumable execution of one graph run on the device.
pub trait GraphSchedule {
    /// Perform exactly one elementary step. Must not be called once `steps_remaining() == 0`.
    fn step(&mut self) -> DetectResult<()>;

    /// Steps left until the run has finished.
    fn steps_remaining(&self) -> usize;
}

/// Pending transfer of one output tensor from device to host.
pub trait Readback {
    /// Non-blocking completion check. Returns the tensor once, when the transfer has finished.
    fn poll(&mut self) -> DetectResult<Option<HostTensor>>;
}

/// Accelerator seam: buffer allocation, graph scheduling, and asynchronous readback.
///
/// Every method must return promptly; long-running device work happens behind the returned
/// [`GraphSchedule`] and [`Readback`] handles.
pub trait Backend {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Allocate an input buffer. Out-of-memory is an [`DetectError::Allocation`].
    fn allocate(&mut self, shape: &TensorShape) -> DetectResult<DeviceBuffer>;

    /// Return a buffer to the device.
    fn free(&mut self, buffer: DeviceBuffer);

    /// Start a run of `graph` over `input`. The schedule performs no work until stepped.
    fn schedule(
        &mut self,
        graph: &CompiledGraph,
        input: &DeviceBuffer,
    ) -> DetectResult<Box<dyn GraphSchedule>>;

    /// Issue a non-blocking readback of output `slot` of the last completed run.
    ///
    /// `Ok(None)` means the device holds no data for that output.
    fn request_readback(
        &mut self,
        slot: usize,
        output: &OutputSpec,
    ) -> DetectResult<Option<Box<dyn Readback>>>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn allocate(&mut self, shape: &TensorShape) -> DetectResult<DeviceBuffer> {
        (**self).allocate(shape)
    }

    fn free(&mut self, buffer: DeviceBuffer) {
        (**self).free(buffer)
    }

    fn schedule(
        &mut self,
        graph: &CompiledGraph,
        input: &DeviceBuffer,
    ) -> DetectResult<Box<dyn GraphSchedule>> {
        (**self).schedule(graph, input)
    }

    fn request_readback(
        &mut self,
        slot: usize,
        output: &OutputSpec,
    ) -> DetectResult<Option<Box<dyn Readback>>> {
        (**self).request_readback(slot, output)
    }
}
