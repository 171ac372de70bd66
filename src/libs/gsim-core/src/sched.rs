//! Cooperative scheduler
//!
//! Single-threaded: the scheduler, the dispatcher and every task body
//! execute on one thread, so session state needs no locking. Tasks never
//! preempt each other; the only suspension points are the outcomes a
//! task returns from `run`.
//!
//! One tick is: `advance(now)` moves expired paused tasks to the running
//! list, the caller polls its transport and `deliver`s inbound datagrams,
//! then `drain(now, ctx)` runs the running list round-robin.

use std::collections::{HashMap, VecDeque};

use crate::task::{RunOutcome, Task, TaskId, TaskState};
use crate::transport::Datagram;
use crate::wheel::TimingWheel;

struct TaskEntry<C> {
    state: TaskState,
    task: Box<dyn Task<C>>,
}

/// Cooperative task scheduler over a timing wheel
pub struct Scheduler<C> {
    tasks: HashMap<TaskId, TaskEntry<C>>,
    running: VecDeque<TaskId>,
    wheel: TimingWheel,
    next_id: TaskId,
}

impl<C> Scheduler<C> {
    /// Create a scheduler whose wheel spans `wheel_width_ms`
    pub fn new(wheel_width_ms: u64) -> Self {
        Self {
            tasks: HashMap::new(),
            running: VecDeque::new(),
            wheel: TimingWheel::new(wheel_width_ms),
            next_id: 1,
        }
    }

    /// Insert a task; it starts running and is drained this tick
    pub fn insert(&mut self, task: Box<dyn Task<C>>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(
            id,
            TaskEntry {
                state: TaskState::Running,
                task,
            },
        );
        self.running.push_back(id);
        log::trace!("task [{id}] inserted");
        id
    }

    /// Lifecycle state of a task, if it still exists
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|e| e.state)
    }

    /// All-tasks count
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when no task exists
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Running-tasks count
    pub fn running_len(&self) -> usize {
        self.tasks
            .values()
            .filter(|e| e.state == TaskState::Running)
            .count()
    }

    /// Paused-tasks count
    pub fn paused_len(&self) -> usize {
        self.tasks
            .values()
            .filter(|e| e.state == TaskState::Paused)
            .count()
    }

    /// Wake a paused or stopped task
    pub fn resume(&mut self, id: TaskId) {
        if let Some(entry) = self.tasks.get_mut(&id) {
            if entry.state != TaskState::Running {
                entry.state = TaskState::Running;
                self.running.push_back(id);
            }
        }
    }

    /// Bulk-resume every paused task. Tasks woken before their wake time
    /// are re-parked by the next drain.
    pub fn resume_all_paused(&mut self) {
        let ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.state == TaskState::Paused)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.resume(id);
        }
    }

    /// Freeze a task; it stays in the all-tasks view
    pub fn stop(&mut self, id: TaskId) {
        if let Some(entry) = self.tasks.get_mut(&id) {
            entry.state = TaskState::Stopped;
        }
    }

    /// Park a task in the wheel until `wake`
    pub fn pause(&mut self, id: TaskId, wake: u64) {
        if let Some(entry) = self.tasks.get_mut(&id) {
            entry.state = TaskState::Paused;
            self.wheel.insert(id, wake);
        }
    }

    /// Destroy a task immediately
    pub fn abort(&mut self, id: TaskId) {
        if self.tasks.remove(&id).is_some() {
            log::trace!("task [{id}] aborted");
        }
    }

    /// Move every paused task whose wake time has passed to the running
    /// list. Stale wheel entries (task resumed or re-parked since) are
    /// dropped or re-armed here.
    pub fn advance(&mut self, now: u64) {
        for id in self.wheel.advance(now) {
            let Some(entry) = self.tasks.get_mut(&id) else {
                continue;
            };
            if entry.state != TaskState::Paused {
                continue;
            }
            let wake = entry.task.wake_time();
            if wake <= now {
                entry.state = TaskState::Running;
                self.running.push_back(id);
            } else {
                self.wheel.insert(id, wake);
            }
        }
    }

    /// Deliver an inbound datagram to its owning task and run it
    /// immediately, so the datagram is handled before the task re-pauses.
    /// Reactivates stopped tasks.
    pub fn deliver(&mut self, id: TaskId, ctx: &mut C, dgram: Datagram, now: u64) {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return;
        };
        let was_running = entry.state == TaskState::Running;
        let outcome = entry.task.run(ctx, Some(dgram));
        // a datagram consumed the task's run for this tick
        if was_running {
            self.running.retain(|queued| *queued != id);
        }
        self.apply_outcome(id, outcome, now);
    }

    /// Run every task on the running list once, round-robin
    pub fn drain(&mut self, now: u64, ctx: &mut C) {
        let batch: Vec<TaskId> = self.running.drain(..).collect();
        for id in batch {
            let Some(entry) = self.tasks.get_mut(&id) else {
                continue;
            };
            if entry.state != TaskState::Running {
                continue;
            }
            // woken ahead of time (bulk resume): re-park untouched
            let wake = entry.task.wake_time();
            if wake > now {
                entry.state = TaskState::Paused;
                self.wheel.insert(id, wake);
                continue;
            }
            let outcome = entry.task.run(ctx, None);
            self.apply_outcome(id, outcome, now);
        }
    }

    fn apply_outcome(&mut self, id: TaskId, outcome: RunOutcome, _now: u64) {
        match outcome {
            RunOutcome::Pause => {
                if let Some(entry) = self.tasks.get_mut(&id) {
                    entry.state = TaskState::Paused;
                    let wake = entry.task.wake_time();
                    self.wheel.insert(id, wake);
                }
            }
            RunOutcome::Stop => self.stop(id),
            RunOutcome::Finished => self.abort(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        wake: u64,
        runs: u32,
        outcome: RunOutcome,
    }

    impl Probe {
        fn new(outcome: RunOutcome) -> Self {
            Self {
                wake: 0,
                runs: 0,
                outcome,
            }
        }
    }

    struct ProbeCtx {
        runs: HashMap<TaskId, u32>,
        next_wake: u64,
    }

    impl Task<ProbeCtx> for Probe {
        fn run(&mut self, ctx: &mut ProbeCtx, _arg: Option<Datagram>) -> RunOutcome {
            self.runs += 1;
            self.wake = ctx.next_wake;
            *ctx.runs.entry(0).or_insert(0) += 1;
            self.outcome
        }

        fn wake_time(&self) -> u64 {
            self.wake
        }
    }

    fn ctx() -> ProbeCtx {
        ProbeCtx {
            runs: HashMap::new(),
            next_wake: 0,
        }
    }

    #[test]
    fn test_inserted_task_runs_on_first_drain() {
        let mut sched: Scheduler<ProbeCtx> = Scheduler::new(1000);
        let mut c = ctx();
        let id = sched.insert(Box::new(Probe::new(RunOutcome::Stop)));

        sched.drain(0, &mut c);
        assert_eq!(sched.state(id), Some(TaskState::Stopped));
        assert_eq!(c.runs[&0], 1);
    }

    #[test]
    fn test_pause_and_timer_wake() {
        let mut sched: Scheduler<ProbeCtx> = Scheduler::new(1000);
        let mut c = ctx();
        c.next_wake = 100;
        let id = sched.insert(Box::new(Probe::new(RunOutcome::Pause)));

        sched.drain(0, &mut c);
        assert_eq!(sched.state(id), Some(TaskState::Paused));
        assert_eq!(sched.paused_len(), 1);
        assert_eq!(sched.running_len(), 0);

        sched.advance(99);
        sched.drain(99, &mut c);
        assert_eq!(sched.state(id), Some(TaskState::Paused));
        assert_eq!(c.runs[&0], 1);

        c.next_wake = 0;
        sched.advance(100);
        assert_eq!(sched.state(id), Some(TaskState::Running));
        sched.drain(100, &mut c);
        assert_eq!(c.runs[&0], 2);
    }

    #[test]
    fn test_finished_task_is_destroyed() {
        let mut sched: Scheduler<ProbeCtx> = Scheduler::new(1000);
        let mut c = ctx();
        let id = sched.insert(Box::new(Probe::new(RunOutcome::Finished)));

        sched.drain(0, &mut c);
        assert_eq!(sched.state(id), None);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_early_bulk_resume_reparks_without_running() {
        let mut sched: Scheduler<ProbeCtx> = Scheduler::new(1000);
        let mut c = ctx();
        c.next_wake = 500;
        let id = sched.insert(Box::new(Probe::new(RunOutcome::Pause)));
        sched.drain(0, &mut c);
        assert_eq!(c.runs[&0], 1);

        sched.resume_all_paused();
        sched.drain(10, &mut c);
        // woken before its wake time: re-parked, not run
        assert_eq!(c.runs[&0], 1);
        assert_eq!(sched.state(id), Some(TaskState::Paused));
    }

    #[test]
    fn test_stopped_task_ignores_timers_until_resumed() {
        let mut sched: Scheduler<ProbeCtx> = Scheduler::new(1000);
        let mut c = ctx();
        let id = sched.insert(Box::new(Probe::new(RunOutcome::Stop)));
        sched.drain(0, &mut c);

        sched.advance(500);
        sched.drain(500, &mut c);
        assert_eq!(c.runs[&0], 1);

        sched.resume(id);
        sched.drain(500, &mut c);
        assert_eq!(c.runs[&0], 2);
    }
}
