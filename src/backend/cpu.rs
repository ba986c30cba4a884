use crate::backend::device::{Backend, BufferId, DeviceBuffer, GraphSchedule, Readback};
use crate::foundation::core::{DType, TensorShape};
use crate::foundation::error::{DetectError, DetectResult};
use crate::foundation::tensor::HostTensor;
use crate::model::graph::{CompiledGraph, Layer, OutputRole, OutputSpec};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};

/// Options for [`CpuBackend`].
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CpuBackendOpts {
    /// Simulated device memory. Allocations beyond it fail. `None` is unbounded.
    pub memory_limit_bytes: Option<usize>,
}

/// Outputs of the last completed run, indexed by declared output slot.
type OutputStore = Arc<Mutex<Vec<Option<HostTensor>>>>;

/// Reference device that interprets [`Layer`]s on the calling thread, one layer per step, and
/// performs readback on a rayon worker.
pub struct CpuBackend {
    opts: CpuBackendOpts,
    next_id: u64,
    allocated_bytes: usize,
    outputs: OutputStore,
}

impl CpuBackend {
    /// Create a backend.
    pub fn new(opts: CpuBackendOpts) -> Self {
        Self {
            opts,
            next_id: 0,
            allocated_bytes: 0,
            outputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Bytes currently allocated to live buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(CpuBackendOpts::default())
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate(&mut self, shape: &TensorShape) -> DetectResult<DeviceBuffer> {
        let bytes = shape
            .element_count()
            .saturating_mul(DType::F32.size_bytes());
        if let Some(limit) = self.opts.memory_limit_bytes
            && self.allocated_bytes.saturating_add(bytes) > limit
        {
            return Err(DetectError::allocation(format!(
                "cpu device out of memory: {bytes} bytes requested, {} of {limit} in use",
                self.allocated_bytes
            )));
        }
        self.allocated_bytes = self.allocated_bytes.saturating_add(bytes);
        let id = BufferId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        tracing::trace!(id = id.0, %shape, bytes, "cpu buffer allocated");
        Ok(DeviceBuffer::zeroed(id, shape.clone()))
    }

    fn free(&mut self, buffer: DeviceBuffer) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(buffer.byte_len());
        tracing::trace!(id = buffer.id().0, "cpu buffer freed");
    }

    fn schedule(
        &mut self,
        graph: &CompiledGraph,
        input: &DeviceBuffer,
    ) -> DetectResult<Box<dyn GraphSchedule>> {
        if input.shape() != graph.input_shape() {
            return Err(DetectError::execution(format!(
                "input shape {} does not match model input {}",
                input.shape(),
                graph.input_shape()
            )));
        }
        {
            let mut store = self
                .outputs
                .lock()
                .map_err(|_| DetectError::execution("cpu output store poisoned"))?;
            store.clear();
            store.resize(graph.outputs().len(), None);
        }
        Ok(Box::new(CpuSchedule {
            graph: graph.clone(),
            next_layer: 0,
            shape: input.shape().clone(),
            activations: input.data().to_vec(),
            outputs: Arc::clone(&self.outputs),
        }))
    }

    fn request_readback(
        &mut self,
        slot: usize,
        output: &OutputSpec,
    ) -> DetectResult<Option<Box<dyn Readback>>> {
        let present = self
            .outputs
            .lock()
            .map_err(|_| DetectError::readback("cpu output store poisoned"))?
            .get(slot)
            .is_some_and(Option::is_some);
        if !present {
            return Ok(None);
        }

        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.outputs);
        rayon::spawn(move || {
            let tensor = store
                .lock()
                .ok()
                .and_then(|s| s.get(slot).cloned().flatten());
            if let Some(t) = tensor {
                let _ = tx.send(t);
            }
        });
        Ok(Some(Box::new(CpuReadback {
            name: output.name.clone(),
            rx,
        })))
    }
}

struct CpuReadback {
    name: String,
    rx: Receiver<HostTensor>,
}

impl Readback for CpuReadback {
    fn poll(&mut self) -> DetectResult<Option<HostTensor>> {
        match self.rx.try_recv() {
            Ok(t) => Ok(Some(t)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DetectError::readback(format!(
                "transfer of output '{}' was lost",
                self.name
            ))),
        }
    }
}

struct CpuSchedule {
    graph: CompiledGraph,
    next_layer: usize,
    shape: TensorShape,
    activations: Vec<f32>,
    outputs: OutputStore,
}

impl GraphSchedule for CpuSchedule {
    fn step(&mut self) -> DetectResult<()> {
        let Some(layer) = self.graph.layers().get(self.next_layer) else {
            return Err(DetectError::execution("step past end of graph"));
        };
        match *layer {
            Layer::Identity => {}
            Layer::Scale { factor } => self.activations.iter_mut().for_each(|x| *x *= factor),
            Layer::Bias { value } => self.activations.iter_mut().for_each(|x| *x += value),
            Layer::Relu => self.activations.iter_mut().for_each(|x| *x = x.max(0.0)),
            Layer::Sigmoid => self
                .activations
                .iter_mut()
                .for_each(|x| *x = 1.0 / (1.0 + (-*x).exp())),
            Layer::Detect {
                grid,
                score_threshold,
                max_detections,
            } => {
                let found = detect_grid(
                    &self.shape,
                    &self.activations,
                    grid,
                    score_threshold,
                    max_detections,
                )?;
                let tensors = self
                    .graph
                    .outputs()
                    .iter()
                    .map(|spec| build_output(spec, &found).map(Some))
                    .collect::<DetectResult<Vec<_>>>()?;
                *self
                    .outputs
                    .lock()
                    .map_err(|_| DetectError::execution("cpu output store poisoned"))? = tensors;
            }
        }
        self.next_layer += 1;
        Ok(())
    }

    fn steps_remaining(&self) -> usize {
        self.graph.step_count().saturating_sub(self.next_layer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Found {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    score: f32,
    label: i32,
}

fn detect_grid(
    shape: &TensorShape,
    act: &[f32],
    grid: u32,
    score_threshold: f32,
    max_detections: u32,
) -> DetectResult<Vec<Found>> {
    let &[1, c, h, w] = shape.dims() else {
        return Err(DetectError::execution(format!(
            "detect head expects (1, C, H, W) activations, got {shape}"
        )));
    };
    let grid = grid as usize;
    if grid == 0 || grid > h || grid > w {
        return Err(DetectError::execution(format!(
            "detect grid {grid} does not fit {h}x{w}"
        )));
    }

    let mut found = Vec::new();
    for gy in 0..grid {
        let (y0, y1) = (gy * h / grid, (gy + 1) * h / grid);
        for gx in 0..grid {
            let (x0, x1) = (gx * w / grid, (gx + 1) * w / grid);
            let area = ((y1 - y0) * (x1 - x0)) as f32;

            let mut best: Option<(i32, f32)> = None;
            for ch in 0..c {
                let plane = &act[ch * h * w..(ch + 1) * h * w];
                let sum: f32 = (y0..y1)
                    .map(|y| plane[y * w + x0..y * w + x1].iter().sum::<f32>())
                    .sum();
                let mean = sum / area;
                if best.is_none_or(|(_, s)| mean > s) {
                    best = Some((ch as i32, mean));
                }
            }

            if let Some((label, score)) = best
                && score >= score_threshold
            {
                found.push(Found {
                    x: x0 as f32,
                    y: y0 as f32,
                    w: (x1 - x0) as f32,
                    h: (y1 - y0) as f32,
                    score,
                    label,
                });
            }
        }
    }

    // Stable: equal scores keep raster order.
    found.sort_by(|a, b| b.score.total_cmp(&a.score));
    found.truncate(max_detections as usize);
    Ok(found)
}

fn build_output(spec: &OutputSpec, found: &[Found]) -> DetectResult<HostTensor> {
    let n = found.len();
    match (spec.role, spec.dtype) {
        (OutputRole::Boxes, DType::F32) => HostTensor::f32(
            [n, 6],
            found
                .iter()
                .flat_map(|f| [f.x, f.y, f.w, f.h, f.score, f.label as f32])
                .collect(),
        ),
        (OutputRole::LabelIds, DType::I32) => {
            HostTensor::i32([n], found.iter().map(|f| f.label).collect())
        }
        (OutputRole::Scores, DType::F32) => {
            HostTensor::f32([n], found.iter().map(|f| f.score).collect())
        }
        (role, dtype) => Err(DetectError::execution(format!(
            "output '{}' declares unsupported {role:?} as {dtype:?}",
            spec.name
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/cpu.rs"]
mod tests;
