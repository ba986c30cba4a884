/// Crate-wide result alias.
pub type DetectResult<T> = Result<T, DetectError>;

/// Diagnosable category of a failed run, as reported by
/// [`RunController::last_error`](crate::RunController::last_error).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The backend refused to allocate an input buffer.
    Allocation,
    /// A graph step failed on the device.
    Execution,
    /// The device reported no data for a requested output.
    Readback,
    /// An output was read back but its shape was degenerate, or it could not be decoded.
    Validation,
    /// Invalid options, model description, or labels.
    Config,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Stable lowercase name, used in logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Execution => "execution",
            Self::Readback => "readback",
            Self::Validation => "validation",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the scheduler, its backends, and the model loader.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    /// Buffer acquisition failed.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// A graph step failed.
    #[error("execution error: {0}")]
    Execution(String),

    /// The device reported no data for a requested output.
    #[error("readback error: {0}")]
    Readback(String),

    /// A successfully read output had a degenerate or undecodable shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// Startup configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Wrapped foreign error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DetectError {
    /// Build an [`DetectError::Allocation`].
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Build an [`DetectError::Execution`].
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Build an [`DetectError::Readback`].
    pub fn readback(msg: impl Into<String>) -> Self {
        Self::Readback(msg.into())
    }

    /// Build an [`DetectError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an [`DetectError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Allocation(_) => ErrorKind::Allocation,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Readback(_) => ErrorKind::Readback,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Config(_) => ErrorKind::Config,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}
