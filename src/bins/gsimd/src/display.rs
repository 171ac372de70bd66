//! Statistics dashboard
//!
//! A periodic task on the scheduler wheel that re-renders a framed
//! counter table: session totals plus per-job sent/retransmit/timeout/
//! unexpected columns. Final totals are printed once on shutdown.

use std::io::Write;

use gsim_core::stats::StatKind;
use gsim_core::task::{RunOutcome, Task};
use gsim_core::time::unix_time_secs;
use gsim_core::transport::Datagram;

use crate::context::SimContext;
use crate::scenario::{Job, JobCounters, JobKind};

const SEPARATOR: &str =
    "+------------------------+----------------------------+-----------------------+";
const FOOTER_PAUSE: &str =
    "+--Adjust-Rate [+|-|*|/]--+-----Pause-Traffic [p]-----+-------Quit [q]--------+";
const FOOTER_RESUME: &str =
    "+---Adjust-Rate [+/-]----+----Resume-Traffic [c]------+-------Quit [q]--------+";

/// Periodic dashboard task
pub struct DisplayTask {
    interval: u64,
    wake_time: u64,
    start_secs: u64,
    start_time_str: String,
}

impl DisplayTask {
    pub fn new(interval_ms: u64) -> Self {
        let start_secs = unix_time_secs();
        Self {
            interval: interval_ms,
            wake_time: 0,
            start_secs,
            start_time_str: format_clock(start_secs),
        }
    }

    fn render(&self, ctx: &SimContext) {
        let mut out = String::new();

        // ANSI clear screen, cursor home
        out.push_str("\x1b[2J\x1b[H");

        out.push_str(SEPARATOR);
        out.push('\n');
        let runtime = unix_time_secs().saturating_sub(self.start_secs);
        out.push_str(&format!(
            "Start: {}  Run-Time: {}s            Node: {}\n",
            self.start_time_str,
            runtime,
            ctx.cfg.node.name()
        ));
        out.push_str(&format!(
            "Local-Host: {}                Remote-Host: {}\n",
            ctx.cfg.local_endpoint(),
            ctx.cfg.remote_endpoint()
        ));
        out.push_str(SEPARATOR);
        out.push('\n');

        out.push_str(&format!(
            "Total-Sessions:    {}\n",
            ctx.stats.get(StatKind::SessionsCreated)
        ));
        out.push_str(&format!(
            "Session-Completed: {}\n",
            ctx.stats.get(StatKind::SessionsSucc)
        ));
        out.push_str(&format!(
            "Session-Aborted:   {}\n",
            ctx.stats.get(StatKind::SessionsFail)
        ));
        out.push_str(&format!(
            "Dead-Calls:        {}\n",
            ctx.stats.get(StatKind::DeadCalls)
        ));

        out.push_str(SEPARATOR);
        out.push('\n');
        out.push_str(
            "                                 Messages  Retrans   Timeout   Unexpected-Msg\n",
        );

        for proc in ctx.scenario.procedures() {
            for index in proc.jobs {
                out.push_str(&format_job(&ctx.scenario.jobs[index]));
            }
        }

        out.push('\n');
        out.push_str(if ctx.traffic_paused {
            FOOTER_RESUME
        } else {
            FOOTER_PAUSE
        });
        out.push('\n');

        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(out.as_bytes());
        let _ = lock.flush();
    }
}

impl Task<SimContext> for DisplayTask {
    fn run(&mut self, ctx: &mut SimContext, _arg: Option<Datagram>) -> RunOutcome {
        self.render(ctx);
        self.wake_time = ctx.now_ms + self.interval;
        RunOutcome::Pause
    }

    fn wake_time(&self) -> u64 {
        self.wake_time
    }
}

fn format_job(job: &Job) -> String {
    match &job.kind {
        JobKind::Send(_) => format!(
            "{:<30} ---> {:>9} {:>9} {:>9}\n",
            job.msg_name,
            JobCounters::get(&job.counters.num_snd),
            JobCounters::get(&job.counters.num_snd_retrans),
            JobCounters::get(&job.counters.num_timeout),
        ),
        JobKind::Recv(_) => format!(
            "{:<30} <--- {:>9} {:>9}           {:>9}\n",
            job.msg_name,
            JobCounters::get(&job.counters.num_rcv),
            JobCounters::get(&job.counters.num_rcv_retrans),
            JobCounters::get(&job.counters.num_unexp),
        ),
        JobKind::Wait(ms) => format!("[Wait {ms:>5}]\n"),
    }
}

/// Final totals written on exit, after the dashboard stops refreshing
pub fn print_final(ctx: &SimContext) {
    println!();
    println!("{SEPARATOR}");
    println!(
        "Total-Sessions:    {}",
        ctx.stats.get(StatKind::SessionsCreated)
    );
    println!(
        "Session-Completed: {}",
        ctx.stats.get(StatKind::SessionsSucc)
    );
    println!(
        "Session-Aborted:   {}",
        ctx.stats.get(StatKind::SessionsFail)
    );
    println!("Unmatched-Datagrams: {}", ctx.unmatched_datagrams);
    println!("{SEPARATOR}");
}

fn format_clock(unix_secs: u64) -> String {
    let secs_of_day = unix_secs % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(86_399), "23:59:59");
        assert_eq!(format_clock(86_400 + 3_661), "01:01:01");
    }

    #[test]
    fn test_format_job_rows() {
        use crate::scenario::Scenario;
        use gsim_core::config::{Config, NodeType};

        let cfg = Config::default();
        let scn = Scenario::default_for(NodeType::Mme, &cfg);

        let send_row = format_job(&scn.jobs[0]);
        assert!(send_row.contains("Create-Session-Request"));
        assert!(send_row.contains("--->"));

        let recv_row = format_job(&scn.jobs[1]);
        assert!(recv_row.contains("<---"));

        let wait_row = format_job(&scn.jobs[4]);
        assert!(wait_row.contains("[Wait"));
    }
}
