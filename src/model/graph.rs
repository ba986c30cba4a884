use crate::foundation::core::{DType, TensorShape};
use crate::foundation::error::{DetectError, DetectResult};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// One elementary step of a graph.
///
/// The vocabulary is deliberately small: it is what the reference CPU backend knows how to
/// interpret. Other backends may ignore layer payloads and only honor the step count.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Layer {
    /// Pass-through.
    Identity,
    /// Multiply every activation by `factor`.
    Scale {
        /// Multiplier.
        factor: f32,
    },
    /// Add `value` to every activation.
    Bias {
        /// Offset.
        value: f32,
    },
    /// `max(x, 0)`.
    Relu,
    /// Logistic function.
    Sigmoid,
    /// Grid detection head: splits the spatial plane into `grid x grid` cells and emits one
    /// box per cell whose mean activation reaches `score_threshold`.
    Detect {
        /// Cells per side.
        grid: u32,
        /// Minimum cell score for a detection.
        score_threshold: f32,
        /// Upper bound on emitted detections (highest scores win).
        max_detections: u32,
    },
}

/// How an output tensor is interpreted when building a host result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRole {
    /// `(N, 4+)` float rows `[x, y, w, h, score?, ..]` in input pixels.
    Boxes,
    /// `(N)` integer class ids.
    LabelIds,
    /// `(N)` float confidences; overrides the score column of `Boxes`.
    Scores,
}

impl OutputRole {
    /// Element type an output of this role must declare.
    pub fn dtype(self) -> DType {
        match self {
            Self::Boxes | Self::Scores => DType::F32,
            Self::LabelIds => DType::I32,
        }
    }
}

/// A declared graph output. Outputs are collected in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    /// Output name.
    pub name: String,
    /// Element type.
    pub dtype: DType,
    /// Interpretation.
    pub role: OutputRole,
}

/// Serialized model description.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDef {
    /// Human-readable model name.
    pub name: String,
    /// Input tensor shape, e.g. `[1, 3, 640, 640]`.
    pub input: TensorShape,
    /// Elementary steps, executed in order.
    pub layers: Vec<Layer>,
    /// Declared outputs, in collection order.
    pub outputs: Vec<OutputSpec>,
}

/// Immutable, shareable handle to a loaded model.
///
/// Cloning is cheap; every clone refers to the same definition.
#[derive(Clone, Debug)]
pub struct CompiledGraph {
    def: Arc<GraphDef>,
}

impl CompiledGraph {
    /// Validate a definition and wrap it.
    pub fn from_def(def: GraphDef) -> DetectResult<Self> {
        if def.layers.is_empty() {
            return Err(DetectError::config(format!(
                "model '{}' has no layers",
                def.name
            )));
        }
        if def.input.is_degenerate() {
            return Err(DetectError::config(format!(
                "model '{}' input shape {} is degenerate",
                def.name, def.input
            )));
        }
        if def.outputs.is_empty() {
            return Err(DetectError::config(format!(
                "model '{}' declares no outputs",
                def.name
            )));
        }
        let mut seen = HashSet::new();
        for out in &def.outputs {
            if !seen.insert(out.name.as_str()) {
                return Err(DetectError::config(format!(
                    "model '{}' declares output '{}' twice",
                    def.name, out.name
                )));
            }
            if out.dtype != out.role.dtype() {
                return Err(DetectError::config(format!(
                    "model '{}' output '{}' has role {:?}, which needs {:?}, not {:?}",
                    def.name,
                    out.name,
                    out.role,
                    out.role.dtype(),
                    out.dtype
                )));
            }
        }
        if !def.outputs.iter().any(|o| o.role == OutputRole::Boxes) {
            return Err(DetectError::config(format!(
                "model '{}' declares no boxes output",
                def.name
            )));
        }
        Ok(Self { def: Arc::new(def) })
    }

    /// Read a JSON model description from disk.
    pub fn from_path(path: impl AsRef<Path>) -> DetectResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            DetectError::config(format!("open model JSON '{}': {e}", path.display()))
        })?;
        let def: GraphDef = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| DetectError::config(format!("parse model JSON: {e}")))?;
        Self::from_def(def)
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Expected input shape.
    pub fn input_shape(&self) -> &TensorShape {
        &self.def.input
    }

    /// Number of elementary steps a full run takes.
    pub fn step_count(&self) -> usize {
        self.def.layers.len()
    }

    /// Layers in execution order.
    pub fn layers(&self) -> &[Layer] {
        &self.def.layers
    }

    /// Declared outputs in collection order.
    pub fn outputs(&self) -> &[OutputSpec] {
        &self.def.outputs
    }

    /// Underlying definition.
    pub fn def(&self) -> &GraphDef {
        &self.def
    }
}

/// Turn serialized model bytes (JSON) into an executable graph handle.
///
/// Called once before the steady-state loop; a failure here is fatal to startup.
#[tracing::instrument(skip(model_bytes), fields(len = model_bytes.len()))]
pub fn load_graph(model_bytes: &[u8]) -> DetectResult<CompiledGraph> {
    let def: GraphDef = serde_json::from_slice(model_bytes)
        .map_err(|e| DetectError::config(format!("parse model JSON: {e}")))?;
    let graph = CompiledGraph::from_def(def)?;
    tracing::info!(
        model = graph.name(),
        steps = graph.step_count(),
        outputs = graph.outputs().len(),
        "model loaded"
    );
    Ok(graph)
}

#[cfg(test)]
#[path = "../../tests/unit/model/graph.rs"]
mod tests;
