use crate::foundation::core::{CaptureMeta, Pose, TensorShape};
use crate::foundation::error::{DetectError, DetectResult};

/// One preprocessed camera frame, ready to upload.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    shape: TensorShape,
    data: Vec<f32>,
    capture: CaptureMeta,
}

impl Frame {
    /// Create a frame, checking that `data` matches `shape`.
    pub fn new(shape: TensorShape, data: Vec<f32>, capture: CaptureMeta) -> DetectResult<Self> {
        if shape.is_degenerate() || shape.element_count() != data.len() {
            return Err(DetectError::validation(format!(
                "frame of shape {shape} cannot hold {} elements",
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data,
            capture,
        })
    }

    /// Frame shape.
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Pixel data, planar `(N, C, H, W)`.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Capture metadata.
    pub fn capture(&self) -> &CaptureMeta {
        &self.capture
    }
}

/// Supplier of frames. `None` means "not ready": skip submission this tick.
pub trait FrameSource {
    /// Latest frame, if one is ready.
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<Frame>,
{
    fn next_frame(&mut self) -> Option<Frame> {
        self()
    }
}

/// Options for [`SyntheticSource`].
#[derive(Clone, Debug)]
pub struct SyntheticSourceOpts {
    /// Frame shape, `(1, C, H, W)`.
    pub shape: TensorShape,
    /// Side of the bright square in pixels.
    pub square: usize,
    /// A frame is ready on every `ready_every`-th call.
    pub ready_every: u32,
    /// Nanoseconds between captures.
    pub frame_interval_ns: u64,
}

impl Default for SyntheticSourceOpts {
    fn default() -> Self {
        Self {
            shape: TensorShape::from([1, 3, 64, 64]),
            square: 16,
            ready_every: 1,
            frame_interval_ns: 1_000_000_000 / 30,
        }
    }
}

/// Camera stand-in: a bright square sweeping diagonally across a dark frame, cycling through
/// channels, with a pose that drifts along +x.
pub struct SyntheticSource {
    opts: SyntheticSourceOpts,
    calls: u64,
    produced: u64,
}

impl SyntheticSource {
    /// Create a source. The shape must be `(1, C, H, W)`.
    pub fn new(opts: SyntheticSourceOpts) -> DetectResult<Self> {
        let &[1, c, h, w] = opts.shape.dims() else {
            return Err(DetectError::config(format!(
                "synthetic source needs a (1, C, H, W) shape, got {}",
                opts.shape
            )));
        };
        if c == 0 || opts.square == 0 || opts.square > h.min(w) || opts.ready_every == 0 {
            return Err(DetectError::config(
                "synthetic source square must fit the frame and ready_every must be > 0",
            ));
        }
        Ok(Self {
            opts,
            calls: 0,
            produced: 0,
        })
    }

    /// Frames produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&self, index: u64) -> Vec<f32> {
        let dims = self.opts.shape.dims();
        let (c, h, w) = (dims[1], dims[2], dims[3]);
        let s = self.opts.square;
        let span = (h.min(w) - s + 1) as u64;
        let off = (index % span) as usize;
        let ch = (index % c as u64) as usize;

        let mut data = vec![0.0f32; c * h * w];
        let plane = &mut data[ch * h * w..(ch + 1) * h * w];
        for y in off..off + s {
            plane[y * w + off..y * w + off + s].fill(1.0);
        }
        data
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.calls += 1;
        if self.calls % u64::from(self.opts.ready_every) != 0 {
            return None;
        }
        let index = self.produced;
        self.produced += 1;
        let capture = CaptureMeta {
            frame_index: index,
            timestamp_ns: index.saturating_mul(self.opts.frame_interval_ns),
            pose: Pose {
                position: [index as f32 * 0.01, 1.6, 0.0],
                ..Pose::IDENTITY
            },
        };
        Frame::new(self.opts.shape.clone(), self.render(index), capture).ok()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/source.rs"]
mod tests;
