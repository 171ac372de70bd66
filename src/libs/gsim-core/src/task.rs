//! Cooperative tasks
//!
//! Everything the simulator does between ticks is a task: each UE
//! session, the load generator and the statistics display. A task runs
//! one logical step per invocation and tells the scheduler what to do
//! with it next; the scheduler, not the task body, is the control
//! authority.

use crate::transport::Datagram;

/// Task identifier assigned by the scheduler
pub type TaskId = u64;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// On the running list, invoked on the next drain
    Running,
    /// Parked in the timing wheel until its wake time
    Paused,
    /// Off the running and paused lists; an inbound delivery reactivates it
    Stopped,
}

/// What the scheduler should do with a task after `run` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Park in the timing wheel until `wake_time()`
    Pause,
    /// Freeze; only an explicit resume or an inbound delivery reactivates
    Stop,
    /// Destroy the task and free its resources
    Finished,
}

/// A cooperatively scheduled task, generic over the simulator context it
/// operates on
pub trait Task<C> {
    /// Advance the task one step. `arg` carries an inbound datagram when
    /// the run was triggered by delivery rather than by timer.
    fn run(&mut self, ctx: &mut C, arg: Option<Datagram>) -> RunOutcome;

    /// Absolute wake time in milliseconds; 0 means "run next tick"
    fn wake_time(&self) -> u64;
}
