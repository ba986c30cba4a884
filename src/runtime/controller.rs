use crate::backend::device::Backend;
use crate::foundation::core::{CaptureMeta, StepBudget};
use crate::foundation::error::{DetectError, DetectResult, ErrorKind};
use crate::model::graph::CompiledGraph;
use crate::runtime::arena::{ArenaOpts, ArenaStats, InputArena, InputBuffer};
use crate::runtime::collector::{OutputPoll, ResultCollector, validate_output};
use crate::runtime::executor::{Advance, StepCursor, advance, begin_run, run_to_completion};
use crate::runtime::result::HostResult;
use crate::session::source::Frame;

/// Options for [`RunController`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ControllerOpts {
    /// Graph steps performed per [`RunController::tick`].
    pub step_budget: StepBudget,
    /// Input buffer retention.
    pub arena: ArenaOpts,
}

/// Observable lifecycle state of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// No run in flight; [`RunController::submit_run`] is accepted.
    Idle,
    /// The graph is being stepped.
    Executing,
    /// Output `i` is being read back.
    CollectingOutput(usize),
    /// Every output has been read back and validated; waiting for
    /// [`RunController::take_results`].
    Ready,
    /// The run failed; the next tick drains it back to `Idle`.
    Failed(ErrorKind),
}

struct InFlight {
    run_id: u64,
    capture: CaptureMeta,
    input: InputBuffer,
}

// Each variant owns exactly what is valid in that state.
enum Phase {
    Idle,
    Executing {
        run: InFlight,
        cursor: StepCursor,
    },
    Collecting {
        run: InFlight,
        collector: ResultCollector,
        index: usize,
    },
    Ready {
        run: InFlight,
        result: HostResult,
    },
    Failed {
        run: Option<InFlight>,
        kind: ErrorKind,
    },
}

/// Single-flight, tick-driven scheduler for one compiled graph.
///
/// Every method returns promptly: a run is spread across many [`tick`](Self::tick)s, each
/// performing at most one step budget of graph work or one readback poll. There is no internal
/// deadline; a run whose device work never finishes stays in flight until
/// [`cancel`](Self::cancel)led, so hosts that need a watchdog must implement one on top of
/// [`ticks_in_run`](Self::ticks_in_run).
pub struct RunController<B: Backend> {
    backend: B,
    graph: CompiledGraph,
    arena: InputArena,
    opts: ControllerOpts,

    phase: Phase,
    last_error: Option<(ErrorKind, String)>,
    next_run_id: u64,
    ticks_in_run: u64,
}

impl<B: Backend> RunController<B> {
    /// Create an idle controller that owns `graph` for its whole lifetime.
    pub fn new(backend: B, graph: CompiledGraph, opts: ControllerOpts) -> Self {
        Self {
            backend,
            graph,
            arena: InputArena::new(opts.arena),
            opts,
            phase: Phase::Idle,
            last_error: None,
            next_run_id: 0,
            ticks_in_run: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        match &self.phase {
            Phase::Idle => RunState::Idle,
            Phase::Executing { .. } => RunState::Executing,
            Phase::Collecting { index, .. } => RunState::CollectingOutput(*index),
            Phase::Ready { .. } => RunState::Ready,
            Phase::Failed { kind, .. } => RunState::Failed(*kind),
        }
    }

    /// Return `true` in every state but `Idle`.
    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Kind of the most recent failure. Cleared when the next run is admitted.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error.as_ref().map(|(k, _)| *k)
    }

    /// Message of the most recent failure.
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|(_, m)| m.as_str())
    }

    /// Run one full, unbudgeted pass on a zeroed input so the first real run does not pay
    /// first-use cost. Blocks for the whole pass: call before the steady-state loop.
    #[tracing::instrument(skip(self), fields(model = self.graph.name(), backend = self.backend.name()))]
    pub fn warm_up(&mut self) -> DetectResult<()> {
        if self.is_running() {
            return Err(DetectError::Other(anyhow::anyhow!(
                "warm-up requested while a run is in flight"
            )));
        }
        let shape = self.graph.input_shape().clone();
        let mut input = self.arena.acquire_input(&mut self.backend, &shape)?;
        input.fill(0.0);
        let res = begin_run(&mut self.backend, &self.graph, &input)
            .and_then(|mut cursor| run_to_completion(&mut cursor).map(|()| cursor.steps_total()));
        self.arena.release(&mut self.backend, input);
        let steps = res?;
        tracing::info!(steps, "warm-up complete");
        Ok(())
    }

    /// Admit a run over `frame` if the controller is idle.
    ///
    /// Returns `false` without side effects when a run is already in flight (or a failed run has
    /// not been drained yet). Returns `false` and enters `Failed` when the input buffer cannot
    /// be prepared or the device refuses the run.
    pub fn submit_run(&mut self, frame: &Frame) -> bool {
        if self.is_running() {
            tracing::debug!(state = ?self.state(), "submit rejected: run in flight");
            return false;
        }

        self.last_error = None;
        self.ticks_in_run = 0;
        let run_id = self.next_run_id;
        self.next_run_id = self.next_run_id.saturating_add(1);

        let mut input = match self.arena.acquire_input(&mut self.backend, frame.shape()) {
            Ok(buf) => buf,
            Err(e) => {
                self.phase = self.fail(run_id, None, e);
                return false;
            }
        };
        if let Err(e) = input.upload(frame.data()) {
            let run = InFlight {
                run_id,
                capture: *frame.capture(),
                input,
            };
            self.phase = self.fail(run_id, Some(run), e);
            return false;
        }

        let cursor = begin_run(&mut self.backend, &self.graph, &input);
        let run = InFlight {
            run_id,
            capture: *frame.capture(),
            input,
        };
        match cursor {
            Ok(cursor) => {
                tracing::debug!(
                    run_id,
                    shape = %frame.shape(),
                    steps = cursor.steps_total(),
                    "run admitted"
                );
                self.phase = Phase::Executing { run, cursor };
                true
            }
            Err(e) => {
                self.phase = self.fail(run_id, Some(run), e);
                false
            }
        }
    }

    /// Advance by one bounded unit of work and return the resulting state.
    ///
    /// `Executing`: at most one step budget. `CollectingOutput(i)`: issue the request for output
    /// `i` if needed and poll it once. `Failed`: release the run and return to `Idle`. `Idle`
    /// and `Ready`: nothing.
    pub fn tick(&mut self) -> RunState {
        if self.is_running() {
            self.ticks_in_run = self.ticks_in_run.saturating_add(1);
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        self.phase = match phase {
            Phase::Idle => Phase::Idle,
            Phase::Executing { run, mut cursor } => {
                match advance(&mut cursor, self.opts.step_budget) {
                    Ok(Advance::Continuing) => Phase::Executing { run, cursor },
                    Ok(Advance::Completed) => {
                        tracing::debug!(
                            run_id = run.run_id,
                            steps = cursor.steps_performed(),
                            ticks = self.ticks_in_run,
                            "execution complete"
                        );
                        Phase::Collecting {
                            run,
                            collector: ResultCollector::new(&self.graph),
                            index: 0,
                        }
                    }
                    Err(e) => {
                        drop(cursor);
                        self.fail(run.run_id, Some(run), e)
                    }
                }
            }
            Phase::Collecting {
                run,
                mut collector,
                index,
            } => match self.collect(&mut collector, index) {
                Ok(false) => Phase::Collecting {
                    run,
                    collector,
                    index,
                },
                Ok(true) if index + 1 < collector.output_count() => Phase::Collecting {
                    run,
                    collector,
                    index: index + 1,
                },
                Ok(true) => match collector.consume(run.run_id, run.capture) {
                    Ok(result) => {
                        tracing::debug!(
                            run_id = run.run_id,
                            detections = result.detections().len(),
                            ticks = self.ticks_in_run,
                            "run ready"
                        );
                        Phase::Ready { run, result }
                    }
                    Err(e) => self.fail(run.run_id, Some(run), e),
                },
                Err(e) => {
                    collector.release();
                    self.fail(run.run_id, Some(run), e)
                }
            },
            ready @ Phase::Ready { .. } => ready,
            Phase::Failed { run, kind } => {
                if let Some(run) = run {
                    tracing::debug!(run_id = run.run_id, %kind, "failed run drained");
                    self.arena.release(&mut self.backend, run.input);
                }
                self.ticks_in_run = 0;
                Phase::Idle
            }
        };
        self.state()
    }

    /// Hand out the finished result and return to `Idle`. `None` unless `Ready`.
    pub fn take_results(&mut self) -> Option<HostResult> {
        if !matches!(self.phase, Phase::Ready { .. }) {
            return None;
        }
        let Phase::Ready { run, result } = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return None;
        };
        self.arena.release(&mut self.backend, run.input);
        self.ticks_in_run = 0;
        Some(result)
    }

    /// Abandon the in-flight run without surfacing an error.
    ///
    /// Releases the cursor, every readback request and the input buffer. Returns `false` when
    /// already idle.
    pub fn cancel(&mut self) -> bool {
        let run = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => return false,
            Phase::Executing { run, cursor } => {
                drop(cursor);
                Some(run)
            }
            Phase::Collecting {
                run, mut collector, ..
            } => {
                collector.release();
                Some(run)
            }
            Phase::Ready { run, .. } => Some(run),
            Phase::Failed { run, .. } => run,
        };
        if let Some(run) = run {
            tracing::debug!(run_id = run.run_id, "run cancelled");
            self.arena.release(&mut self.backend, run.input);
        }
        self.ticks_in_run = 0;
        true
    }

    /// Cancel any run and free every retained buffer.
    pub fn shutdown(&mut self) {
        self.cancel();
        self.arena.clear(&mut self.backend);
    }

    /// Readback requests of the current run still waiting on the device.
    pub fn pending_requests(&self) -> usize {
        match &self.phase {
            Phase::Collecting { collector, .. } => collector.pending_requests(),
            _ => 0,
        }
    }

    /// Input buffer of the in-flight run.
    pub fn input(&self) -> Option<&InputBuffer> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Executing { run, .. } | Phase::Collecting { run, .. } | Phase::Ready { run, .. } => {
                Some(&run.input)
            }
            Phase::Failed { run, .. } => run.as_ref().map(|r| &r.input),
        }
    }

    /// Id of the in-flight run.
    pub fn run_id(&self) -> Option<u64> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Executing { run, .. } | Phase::Collecting { run, .. } | Phase::Ready { run, .. } => {
                Some(run.run_id)
            }
            Phase::Failed { run, .. } => run.as_ref().map(|r| r.run_id),
        }
    }

    /// Ticks spent by the current run since admission. Zero while `Idle`.
    pub fn ticks_in_run(&self) -> u64 {
        self.ticks_in_run
    }

    /// Arena counters.
    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    /// The compiled graph.
    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Controller options.
    pub fn opts(&self) -> &ControllerOpts {
        &self.opts
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably. Must not be used to disturb an in-flight run.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // One collection tick for output `index`; `true` once it is ready and validated.
    fn collect(&mut self, collector: &mut ResultCollector, index: usize) -> DetectResult<bool> {
        if collector.requested() == index {
            collector.request_output(&mut self.backend, index)?;
        }
        let spec = self.graph.outputs().get(index).ok_or_else(|| {
            DetectError::Other(anyhow::anyhow!("output {index} is not declared"))
        })?;
        match collector.poll(index)? {
            OutputPoll::Pending => Ok(false),
            OutputPoll::Ready(tensor) => {
                validate_output(spec, tensor)?;
                tracing::trace!(output = %spec.name, shape = %tensor.shape(), "output validated");
                collector.release_completed();
                Ok(true)
            }
        }
    }

    fn fail(&mut self, run_id: u64, run: Option<InFlight>, e: DetectError) -> Phase {
        let kind = e.kind();
        tracing::warn!(run_id, %kind, error = %e, "run failed");
        self.last_error = Some((kind, e.to_string()));
        Phase::Failed { run, kind }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/controller.rs"]
mod tests;
