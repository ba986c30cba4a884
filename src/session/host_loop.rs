use crate::backend::device::Backend;
use crate::foundation::error::{DetectResult, ErrorKind};
use crate::model::graph::CompiledGraph;
use crate::runtime::controller::{RunController, RunState};
use crate::session::opts::SessionOpts;
use crate::session::present::Presenter;
use crate::session::source::FrameSource;

/// What one [`DetectionSession::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTick {
    /// A new run was admitted this tick.
    pub submitted: bool,
    /// An in-flight run was cancelled in favor of a newer frame.
    pub superseded: bool,
    /// A result was handed to the presenter.
    pub presented: bool,
    /// A run failed this tick.
    pub failed: Option<ErrorKind>,
    /// Controller state after the tick.
    pub state: RunState,
}

/// Session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Host ticks driven.
    pub ticks: u64,
    /// Runs admitted.
    pub submitted: u64,
    /// Runs whose results were presented.
    pub completed: u64,
    /// Runs that failed.
    pub failed: u64,
    /// Idle ticks on which the source had no frame.
    pub skipped: u64,
    /// Runs cancelled for a newer frame.
    pub superseded: u64,
}

/// Host-loop driver: one [`tick`](Self::tick) per host frame.
///
/// Pulls a frame when the controller is idle, advances the controller by one bounded unit of
/// work, and forwards results and failures to the presenter.
pub struct DetectionSession<B: Backend, S: FrameSource, P: Presenter> {
    controller: RunController<B>,
    source: S,
    presenter: P,
    opts: SessionOpts,
    stats: SessionStats,
}

impl<B: Backend, S: FrameSource, P: Presenter> DetectionSession<B, S, P> {
    /// Build a session, warming the graph up first when configured.
    pub fn new(
        backend: B,
        graph: CompiledGraph,
        source: S,
        presenter: P,
        opts: SessionOpts,
    ) -> DetectResult<Self> {
        opts.validate()?;
        let mut controller = RunController::new(backend, graph, opts.controller.clone());
        if opts.warm_up {
            controller.warm_up()?;
        }
        Ok(Self {
            controller,
            source,
            presenter,
            opts,
            stats: SessionStats::default(),
        })
    }

    /// Drive one host tick.
    pub fn tick(&mut self) -> SessionTick {
        self.stats.ticks += 1;
        let mut out = SessionTick {
            submitted: false,
            superseded: false,
            presented: false,
            failed: None,
            state: self.controller.state(),
        };

        let idle = !self.controller.is_running();
        let may_supersede = self.opts.supersede_in_flight
            && matches!(
                self.controller.state(),
                RunState::Executing | RunState::CollectingOutput(_)
            );
        if idle || may_supersede {
            match self.source.next_frame() {
                None if idle => self.stats.skipped += 1,
                None => {}
                Some(frame) => {
                    if may_supersede && self.controller.cancel() {
                        self.stats.superseded += 1;
                        out.superseded = true;
                    }
                    if self.controller.submit_run(&frame) {
                        self.stats.submitted += 1;
                        out.submitted = true;
                    } else if let RunState::Failed(kind) = self.controller.state() {
                        self.report_failure(kind, &mut out);
                    }
                }
            }
        }

        match self.controller.tick() {
            RunState::Ready => {
                if let Some(result) = self.controller.take_results() {
                    self.presenter.present(&result);
                    self.stats.completed += 1;
                    out.presented = true;
                }
            }
            RunState::Failed(kind) => self.report_failure(kind, &mut out),
            _ => {}
        }

        out.state = self.controller.state();
        out
    }

    /// Counters so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The controller, for inspection.
    pub fn controller(&self) -> &RunController<B> {
        &self.controller
    }

    /// The controller, mutably.
    pub fn controller_mut(&mut self) -> &mut RunController<B> {
        &mut self.controller
    }

    /// The presenter.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// The frame source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Cancel any run, free retained buffers, and hand back the presenter.
    pub fn shutdown(mut self) -> P {
        self.controller.shutdown();
        tracing::debug!(stats = ?self.stats, "session shut down");
        self.presenter
    }

    fn report_failure(&mut self, kind: ErrorKind, out: &mut SessionTick) {
        self.stats.failed += 1;
        out.failed = Some(kind);
        self.presenter.on_error(kind);
    }
}
