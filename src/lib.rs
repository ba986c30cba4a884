//! tickdet runs a precompiled object-detection graph from a host's interactive loop without
//! ever blocking it.
//!
//! The public API is tick-oriented:
//!
//! - Load a [`CompiledGraph`] once at startup ([`load_graph`] / [`CompiledGraph::from_path`])
//! - Create a [`RunController`] over a [`Backend`] (or a [`DetectionSession`] that also owns a
//!   [`FrameSource`] and a [`Presenter`])
//! - Call `tick()` once per host frame; each call performs at most one step budget of graph work
//!   or one readback poll
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
mod foundation;
mod model;
mod runtime;
mod session;

pub use crate::foundation::core::{CaptureMeta, DType, Pose, StepBudget, TensorShape};
pub use crate::foundation::error::{DetectError, DetectResult, ErrorKind};
pub use crate::foundation::tensor::{HostTensor, TensorData};

pub use crate::model::graph::{CompiledGraph, GraphDef, Layer, OutputRole, OutputSpec, load_graph};
pub use crate::model::labels::LabelMap;

pub use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
pub use crate::backend::device::{Backend, BufferId, DeviceBuffer, GraphSchedule, Readback};
pub use crate::backend::scripted::{ScriptEvent, ScriptedBackend, ScriptedOutput};

pub use crate::runtime::arena::{ArenaOpts, ArenaStats, InputArena, InputBuffer};
pub use crate::runtime::collector::{OutputPoll, OutputRequest, ResultCollector, validate_output};
pub use crate::runtime::controller::{ControllerOpts, RunController, RunState};
pub use crate::runtime::executor::{Advance, StepCursor, advance, begin_run, run_to_completion};
pub use crate::runtime::result::{BoundingBox, Detection, HostResult, NamedTensor};

pub use crate::session::host_loop::{DetectionSession, SessionStats, SessionTick};
pub use crate::session::opts::SessionOpts;
pub use crate::session::present::{CollectingPresenter, Presenter};
pub use crate::session::source::{Frame, FrameSource, SyntheticSource, SyntheticSourceOpts};
