//! Load generator
//!
//! A task on the scheduler wheel that queues new originating UE sessions
//! at the configured rate. The rate lives in the context so keyboard
//! commands can adjust it live; the main loop spawns the queued sessions
//! after each drain.

use gsim_core::stats::StatKind;
use gsim_core::task::{RunOutcome, Task};
use gsim_core::transport::Datagram;

use crate::context::SimContext;

/// Pacing interval between load-generator wakes
const LOADGEN_TICK_MS: u64 = 50;

/// Rate-driven session creator
pub struct LoadGenTask {
    wake_time: u64,
    last_time: u64,
    /// Fractional sessions carried between wakes, in session-millis
    credit_millis: u64,
}

impl LoadGenTask {
    pub fn new() -> Self {
        Self {
            wake_time: 0,
            last_time: 0,
            credit_millis: 0,
        }
    }
}

impl Default for LoadGenTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task<SimContext> for LoadGenTask {
    fn run(&mut self, ctx: &mut SimContext, _arg: Option<Datagram>) -> RunOutcome {
        let now = ctx.now_ms;
        let elapsed = now.saturating_sub(self.last_time).min(1000);
        self.last_time = now;

        self.credit_millis += u64::from(ctx.load_rate) * elapsed;
        while self.credit_millis >= 1000 {
            self.credit_millis -= 1000;

            if let Some(max) = ctx.cfg.max_sessions {
                if ctx.stats.get(StatKind::SessionsCreated) + ctx.pending_sessions.len() as u64
                    >= max
                {
                    log::info!("Load generator done: {max} sessions created");
                    return RunOutcome::Stop;
                }
            }
            let imsi = ctx.allocate_imsi();
            ctx.pending_sessions.push(imsi);
        }

        self.wake_time = now + LOADGEN_TICK_MS;
        RunOutcome::Pause
    }

    fn wake_time(&self) -> u64 {
        self.wake_time
    }
}
