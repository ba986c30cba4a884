use crate::foundation::core::CaptureMeta;
use crate::foundation::error::{DetectError, DetectResult};
use crate::foundation::tensor::HostTensor;
use crate::model::graph::{OutputRole, OutputSpec};

/// Axis-aligned box in model-input pixels.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub w: f32,
    /// Height.
    pub h: f32,
}

/// One detected object.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    /// Object bounds.
    pub bbox: BoundingBox,
    /// Confidence.
    pub score: f32,
    /// Class id; `-1` when the model provides none.
    pub label_id: i32,
}

/// A named output tensor as read back from the device.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NamedTensor {
    /// Declared output name.
    pub name: String,
    /// Host copy.
    pub tensor: HostTensor,
}

/// Finished detections for one capture, handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostResult {
    run_id: u64,
    capture: CaptureMeta,
    detections: Vec<Detection>,
    outputs: Vec<NamedTensor>,
}

impl HostResult {
    /// Decode validated output tensors (in declared order) into detections.
    ///
    /// Row count is taken from the first `Boxes` output; every other output must agree with it.
    pub fn from_outputs(
        run_id: u64,
        capture: CaptureMeta,
        specs: &[OutputSpec],
        tensors: Vec<HostTensor>,
    ) -> DetectResult<Self> {
        if specs.len() != tensors.len() {
            return Err(DetectError::validation(format!(
                "{} outputs declared, {} read back",
                specs.len(),
                tensors.len()
            )));
        }

        let (boxes_at, boxes) = specs
            .iter()
            .zip(&tensors)
            .enumerate()
            .find(|(_, (s, _))| s.role == OutputRole::Boxes)
            .map(|(i, (_, t))| (i, t))
            .ok_or_else(|| DetectError::validation("model declares no boxes output"))?;
        let &[rows, cols] = boxes.shape().dims() else {
            return Err(DetectError::validation(format!(
                "boxes output must be (N, 4+), got {}",
                boxes.shape()
            )));
        };
        if cols < 4 {
            return Err(DetectError::validation(format!(
                "boxes output must be (N, 4+), got {}",
                boxes.shape()
            )));
        }
        let box_data = boxes.as_f32()?;

        let mut detections: Vec<Detection> = box_data
            .chunks_exact(cols)
            .map(|r| Detection {
                bbox: BoundingBox {
                    x: r[0],
                    y: r[1],
                    w: r[2],
                    h: r[3],
                },
                score: r.get(4).copied().unwrap_or(1.0),
                label_id: r.get(5).map_or(-1, |&l| l as i32),
            })
            .collect();

        for (i, (spec, t)) in specs.iter().zip(&tensors).enumerate() {
            if i == boxes_at {
                continue;
            }
            match spec.role {
                OutputRole::Boxes => {}
                OutputRole::LabelIds => {
                    let ids = per_row(spec, t, rows)?.as_i32()?;
                    for (d, &id) in detections.iter_mut().zip(ids) {
                        d.label_id = id;
                    }
                }
                OutputRole::Scores => {
                    let scores = per_row(spec, t, rows)?.as_f32()?;
                    for (d, &s) in detections.iter_mut().zip(scores) {
                        d.score = s;
                    }
                }
            }
        }

        let outputs = specs
            .iter()
            .zip(tensors)
            .map(|(s, tensor)| NamedTensor {
                name: s.name.clone(),
                tensor,
            })
            .collect();
        Ok(Self {
            run_id,
            capture,
            detections,
            outputs,
        })
    }

    /// Id of the run that produced this result.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Metadata of the frame the detections belong to.
    pub fn capture(&self) -> &CaptureMeta {
        &self.capture
    }

    /// Decoded detections.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// Boxes, in detection order.
    pub fn boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.detections.iter().map(|d| &d.bbox)
    }

    /// Scores, in detection order.
    pub fn scores(&self) -> impl Iterator<Item = f32> + '_ {
        self.detections.iter().map(|d| d.score)
    }

    /// Class ids, in detection order.
    pub fn label_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.detections.iter().map(|d| d.label_id)
    }

    /// Raw outputs in declared order.
    pub fn outputs(&self) -> &[NamedTensor] {
        &self.outputs
    }

    /// Raw output by name.
    pub fn output(&self, name: &str) -> Option<&HostTensor> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.tensor)
    }
}

fn per_row<'a>(spec: &OutputSpec, t: &'a HostTensor, rows: usize) -> DetectResult<&'a HostTensor> {
    let ok = match t.shape().dims() {
        [n] | [n, 1] => *n == rows,
        _ => false,
    };
    if !ok {
        return Err(DetectError::validation(format!(
            "output '{}' has shape {}, expected ({rows})",
            spec.name,
            t.shape()
        )));
    }
    Ok(t)
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/result.rs"]
mod tests;
