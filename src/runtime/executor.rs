use crate::backend::device::{Backend, GraphSchedule};
use crate::foundation::core::StepBudget;
use crate::foundation::error::DetectResult;
use crate::model::graph::CompiledGraph;
use crate::runtime::arena::InputBuffer;

/// Result of one budgeted [`advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Steps remain; call again on a later tick.
    Continuing,
    /// The final step has been performed.
    Completed,
}

/// Resumable execution position of one run.
pub struct StepCursor {
    schedule: Box<dyn GraphSchedule>,
    total: usize,
    performed: usize,
}

impl StepCursor {
    /// Steps performed so far.
    pub fn steps_performed(&self) -> usize {
        self.performed
    }

    /// Steps a full run takes.
    pub fn steps_total(&self) -> usize {
        self.total
    }

    /// Steps left.
    pub fn steps_remaining(&self) -> usize {
        self.schedule.steps_remaining()
    }

    /// Return `true` once the final step has been performed.
    pub fn is_complete(&self) -> bool {
        self.steps_remaining() == 0
    }
}

impl std::fmt::Debug for StepCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepCursor")
            .field("total", &self.total)
            .field("performed", &self.performed)
            .finish_non_exhaustive()
    }
}

/// Start a run of `graph` over `input`. No step is performed yet.
pub fn begin_run<B: Backend + ?Sized>(
    backend: &mut B,
    graph: &CompiledGraph,
    input: &InputBuffer,
) -> DetectResult<StepCursor> {
    let schedule = backend.schedule(graph, input)?;
    let total = schedule.steps_remaining();
    Ok(StepCursor {
        schedule,
        total,
        performed: 0,
    })
}

/// Perform at most `budget` steps and return immediately.
///
/// Reports [`Advance::Completed`] on the call that performs the final step, so a run of `T`
/// steps completes on call `ceil(T / budget)`. A failing step is returned as-is; the cursor
/// must then be discarded.
pub fn advance(cursor: &mut StepCursor, budget: StepBudget) -> DetectResult<Advance> {
    for _ in 0..budget.get() {
        if cursor.is_complete() {
            break;
        }
        cursor.schedule.step()?;
        cursor.performed += 1;
    }
    Ok(if cursor.is_complete() {
        Advance::Completed
    } else {
        Advance::Continuing
    })
}

/// Drive a cursor to completion in one call. Blocks for the whole run; only for use before the
/// steady-state loop starts.
pub fn run_to_completion(cursor: &mut StepCursor) -> DetectResult<()> {
    while !cursor.is_complete() {
        cursor.schedule.step()?;
        cursor.performed += 1;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/executor.rs"]
mod tests;
