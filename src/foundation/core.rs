use crate::foundation::error::{DetectError, DetectResult};
use smallvec::SmallVec;
use std::num::NonZeroU32;

/// Tensor dimensions, outermost first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TensorShape(SmallVec<[usize; 4]>);

impl TensorShape {
    /// Build a shape from its dimensions.
    pub fn new(dims: impl IntoIterator<Item = usize>) -> Self {
        Self(dims.into_iter().collect())
    }

    /// Dimensions, outermost first.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of all dimensions (saturating). A rank-0 shape has one element.
    pub fn element_count(&self) -> usize {
        self.0.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Return `true` when the shape has no dimensions or any zero-sized dimension.
    ///
    /// A degenerate output shape means "no detections" and must never reach presentation.
    pub fn is_degenerate(&self) -> bool {
        self.0.is_empty() || self.0.contains(&0)
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims)
    }
}

impl std::fmt::Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str(")")
    }
}

/// Element type of a host tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit float.
    F32,
    /// 32-bit signed integer.
    I32,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
        }
    }
}

/// Maximum number of elementary graph steps performed in one scheduler tick.
///
/// Always non-zero: a zero budget is rejected when the value is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct StepBudget(NonZeroU32);

impl StepBudget {
    /// Layers-per-frame used when nothing else is configured.
    pub const DEFAULT: Self = Self(NonZeroU32::new(25).unwrap());

    /// Create a validated budget.
    pub fn new(steps: u32) -> DetectResult<Self> {
        NonZeroU32::new(steps)
            .map(Self)
            .ok_or_else(|| DetectError::config("step budget must be > 0"))
    }

    /// Budget as a plain step count.
    pub fn get(self) -> usize {
        self.0.get() as usize
    }
}

impl Default for StepBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for StepBudget {
    type Error = DetectError;

    fn try_from(steps: u32) -> DetectResult<Self> {
        Self::new(steps)
    }
}

impl From<StepBudget> for u32 {
    fn from(b: StepBudget) -> u32 {
        b.0.get()
    }
}

/// Camera pose at capture time.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose {
    /// World-space position (meters).
    pub position: [f32; 3],
    /// Orientation quaternion `[x, y, z, w]`.
    pub rotation: [f32; 4],
}

impl Pose {
    /// Origin with identity orientation.
    pub const IDENTITY: Self = Self {
        position: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Metadata captured alongside a frame; carried unchanged into that frame's detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CaptureMeta {
    /// Source frame counter.
    pub frame_index: u64,
    /// Capture timestamp in nanoseconds (source clock).
    pub timestamp_ns: u64,
    /// Camera pose when the frame was captured.
    pub pose: Pose,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
