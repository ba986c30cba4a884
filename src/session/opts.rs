use crate::foundation::error::{DetectError, DetectResult};
use crate::runtime::controller::ControllerOpts;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Options for a [`DetectionSession`](crate::DetectionSession).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOpts {
    /// Scheduler options.
    pub controller: ControllerOpts,
    /// Run one blocking pass on a zeroed input when the session is created.
    pub warm_up: bool,
    /// Cancel an in-flight run when a newer frame is ready, instead of skipping the frame.
    pub supersede_in_flight: bool,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            controller: ControllerOpts::default(),
            warm_up: true,
            supersede_in_flight: false,
        }
    }
}

impl SessionOpts {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> DetectResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            DetectError::config(format!("open session options '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Parse options from JSON.
    pub fn from_reader(reader: impl Read) -> DetectResult<Self> {
        let opts: Self = serde_json::from_reader(reader)
            .map_err(|e| DetectError::config(format!("parse session options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reject option combinations the scheduler cannot honor.
    pub fn validate(&self) -> DetectResult<()> {
        let arena = &self.controller.arena;
        if arena.max_buffers_per_shape > 0 && arena.max_pool_bytes == 0 {
            return Err(DetectError::config(
                "arena.max_pool_bytes must be > 0 when buffers are retained",
            ));
        }
        Ok(())
    }
}
