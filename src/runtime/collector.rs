use crate::backend::device::{Backend, Readback};
use crate::foundation::core::{CaptureMeta, TensorShape};
use crate::foundation::error::{DetectError, DetectResult};
use crate::foundation::tensor::HostTensor;
use crate::model::graph::{CompiledGraph, OutputSpec};
use crate::runtime::result::HostResult;

/// Outcome of polling one output.
#[derive(Debug, PartialEq)]
pub enum OutputPoll<'a> {
    /// The transfer is still in flight.
    Pending,
    /// The transfer finished; the host copy is available.
    Ready(&'a HostTensor),
}

/// Readback state of one declared output.
///
/// Readiness and disposal are independent: [`OutputRequest::poll`] only checks and stores the
/// host copy, [`OutputRequest::release`] drops the device handle.
pub struct OutputRequest {
    slot: usize,
    name: String,
    readback: Option<Box<dyn Readback>>,
    host: Option<HostTensor>,
}

impl OutputRequest {
    /// Declared output slot.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Declared output name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return `true` once the host copy has arrived.
    pub fn is_ready(&self) -> bool {
        self.host.is_some()
    }

    /// Return `true` while the device handle is held.
    pub fn holds_device_handle(&self) -> bool {
        self.readback.is_some()
    }

    /// Non-blocking readiness check.
    pub fn poll(&mut self) -> DetectResult<OutputPoll<'_>> {
        if self.host.is_none() {
            let Some(rb) = self.readback.as_mut() else {
                return Err(DetectError::readback(format!(
                    "output '{}' was released before it completed",
                    self.name
                )));
            };
            match rb.poll()? {
                Some(t) => {
                    tracing::trace!(output = %self.name, shape = %t.shape(), "readback done");
                    self.host = Some(t);
                }
                None => return Ok(OutputPoll::Pending),
            }
        }
        Ok(self
            .host
            .as_ref()
            .map_or(OutputPoll::Pending, OutputPoll::Ready))
    }

    /// Drop the device handle. Safe to call more than once.
    pub fn release(&mut self) {
        self.readback = None;
    }
}

impl std::fmt::Debug for OutputRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRequest")
            .field("slot", &self.slot)
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("holds_device_handle", &self.holds_device_handle())
            .finish()
    }
}

/// Reject degenerate outputs and outputs whose element type differs from the declaration.
pub fn validate_output(spec: &OutputSpec, tensor: &HostTensor) -> DetectResult<()> {
    if tensor.shape().is_degenerate() {
        return Err(DetectError::validation(format!(
            "output '{}' is empty: shape {}",
            spec.name,
            tensor.shape()
        )));
    }
    if tensor.dtype() != spec.dtype {
        return Err(DetectError::validation(format!(
            "output '{}' declared {:?}, read back {:?}",
            spec.name,
            spec.dtype,
            tensor.dtype()
        )));
    }
    Ok(())
}

/// Collects the declared outputs of exactly one run, strictly in declaration order.
#[derive(Debug)]
pub struct ResultCollector {
    graph: CompiledGraph,
    requests: Vec<OutputRequest>,
}

impl ResultCollector {
    /// Collector for a run of `graph`. No request is issued yet.
    pub fn new(graph: &CompiledGraph) -> Self {
        Self {
            graph: graph.clone(),
            requests: Vec::with_capacity(graph.outputs().len()),
        }
    }

    /// Number of declared outputs.
    pub fn output_count(&self) -> usize {
        self.graph.outputs().len()
    }

    /// Declaration of output `index`.
    pub fn spec(&self, index: usize) -> Option<&OutputSpec> {
        self.graph.outputs().get(index)
    }

    /// Number of requests issued so far.
    pub fn requested(&self) -> usize {
        self.requests.len()
    }

    /// Issue the readback of output `index`.
    ///
    /// `index` must be the next output not yet requested, and every earlier output must be
    /// ready. A device with no data for the output is a readback error.
    pub fn request_output<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
    ) -> DetectResult<&mut OutputRequest> {
        if index != self.requests.len() {
            return Err(DetectError::Other(anyhow::anyhow!(
                "output {index} requested out of order (next is {})",
                self.requests.len()
            )));
        }
        if let Some(prev) = self.requests.last()
            && !prev.is_ready()
        {
            return Err(DetectError::Other(anyhow::anyhow!(
                "output {index} requested before output '{}' was ready",
                prev.name
            )));
        }
        let spec = self.graph.outputs().get(index).ok_or_else(|| {
            DetectError::Other(anyhow::anyhow!(
                "output {index} is not declared by model '{}'",
                self.graph.name()
            ))
        })?;

        let readback = backend.request_readback(index, spec)?.ok_or_else(|| {
            DetectError::readback(format!("device has no data for output '{}'", spec.name))
        })?;
        self.requests.push(OutputRequest {
            slot: index,
            name: spec.name.clone(),
            readback: Some(readback),
            host: None,
        });
        Ok(&mut self.requests[index])
    }

    /// Issued request for output `index`.
    pub fn request(&self, index: usize) -> Option<&OutputRequest> {
        self.requests.get(index)
    }

    /// Non-blocking readiness check of an issued request.
    pub fn poll(&mut self, index: usize) -> DetectResult<OutputPoll<'_>> {
        self.requests
            .get_mut(index)
            .ok_or_else(|| DetectError::Other(anyhow::anyhow!("output {index} was not requested")))?
            .poll()
    }

    /// Requests that still wait on the device.
    pub fn pending_requests(&self) -> usize {
        self.requests.iter().filter(|r| !r.is_ready()).count()
    }

    /// Device handles still held, pending or not.
    pub fn held_handles(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.holds_device_handle())
            .count()
    }

    /// Drop device handles of requests whose host copy has arrived.
    pub fn release_completed(&mut self) {
        for r in self.requests.iter_mut().filter(|r| r.is_ready()) {
            r.release();
        }
    }

    /// Drop every device handle, completed or not, and forget pending requests.
    pub fn release(&mut self) {
        for r in &mut self.requests {
            r.release();
        }
        self.requests.retain(OutputRequest::is_ready);
    }

    /// Return `true` when every declared output has been read back.
    pub fn is_complete(&self) -> bool {
        self.requests.len() == self.output_count() && self.requests.iter().all(|r| r.is_ready())
    }

    /// Shape of a ready output, for logging.
    pub fn ready_shape(&self, index: usize) -> Option<&TensorShape> {
        self.requests
            .get(index)
            .and_then(|r| r.host.as_ref())
            .map(HostTensor::shape)
    }

    /// Turn the collected outputs into a [`HostResult`]. Fails if any output is not ready.
    pub fn consume(mut self, run_id: u64, capture: CaptureMeta) -> DetectResult<HostResult> {
        if let Some(r) = self.requests.iter().find(|r| !r.is_ready()) {
            return Err(DetectError::readback(format!(
                "output '{}' is still pending",
                r.name
            )));
        }
        if self.requests.len() != self.output_count() {
            let missing = &self.graph.outputs()[self.requests.len()].name;
            return Err(DetectError::readback(format!(
                "output '{missing}' was never requested"
            )));
        }

        self.release();
        let tensors = self
            .requests
            .drain(..)
            .filter_map(|r| r.host)
            .collect();
        HostResult::from_outputs(run_id, capture, self.graph.outputs(), tensors)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/collector.rs"]
mod tests;
