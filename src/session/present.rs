use crate::foundation::error::ErrorKind;
use crate::runtime::result::HostResult;

/// Consumer of finished detections.
///
/// Called from the host loop; implementations must return promptly.
pub trait Presenter {
    /// A run finished and its detections are ready to draw.
    fn present(&mut self, result: &HostResult);

    /// A run failed; nothing will be presented for that capture.
    fn on_error(&mut self, kind: ErrorKind);
}

/// In-memory presenter for tests and debugging.
#[derive(Debug, Default)]
pub struct CollectingPresenter {
    results: Vec<HostResult>,
    errors: Vec<ErrorKind>,
}

impl CollectingPresenter {
    /// Create an empty presenter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results in presentation order.
    pub fn results(&self) -> &[HostResult] {
        &self.results
    }

    /// Error notifications in order.
    pub fn errors(&self) -> &[ErrorKind] {
        &self.errors
    }
}

impl Presenter for CollectingPresenter {
    fn present(&mut self, result: &HostResult) {
        self.results.push(result.clone());
    }

    fn on_error(&mut self, kind: ErrorKind) {
        self.errors.push(kind);
    }
}
