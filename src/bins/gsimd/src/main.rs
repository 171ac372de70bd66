//! gsimd - GTP-C traffic simulator
//!
//! Drives many concurrent UE sessions through a scripted GTPv2-C call
//! flow against a remote MME/SGW/PGW over UDP, multiplexing the session
//! state machines on a single-threaded cooperative scheduler.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;

use gsim_core::config::{Config, NodeType};
use gsim_core::sched::Scheduler;
use gsim_core::task::TaskId;
use gsim_core::time::monotonic_ms;
use gsim_core::transport::UdpTransport;

pub mod context;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod keyboard;
pub mod loadgen;
pub mod msg_build;
pub mod scenario;
pub mod session;

#[cfg(test)]
mod sim_tests;

use context::SimContext;
use display::DisplayTask;
use keyboard::{Keyboard, KeyCommand};
use loadgen::LoadGenTask;
use scenario::Scenario;
use session::UeSession;

/// Scheduler tick, milliseconds
const TICK_MS: u64 = 10;

/// gsimd - GTP-C traffic simulator
#[derive(Parser, Debug)]
#[command(name = "gsimd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GTP-C traffic simulator for load-testing EPC network elements")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Node type override (mme, sgw, pgw)
    #[arg(short, long, value_parser = parse_node)]
    node: Option<NodeType>,

    /// Remote peer override, ip:port
    #[arg(short, long)]
    remote: Option<SocketAddr>,

    /// Session creation rate override, sessions per second
    #[arg(long)]
    rate: Option<u32>,

    /// Scenario file override
    #[arg(short, long)]
    scenario: Option<PathBuf>,
}

fn parse_node(s: &str) -> Result<NodeType, String> {
    s.parse::<NodeType>().map_err(|e| e.to_string())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(node) = args.node {
        cfg.node = node;
    }
    if let Some(remote) = args.remote {
        match remote.ip() {
            std::net::IpAddr::V4(ip) => cfg.remote_ip = ip,
            std::net::IpAddr::V6(_) => anyhow::bail!("remote must be an IPv4 endpoint"),
        }
        cfg.remote_port = remote.port();
    }
    if let Some(rate) = args.rate {
        cfg.session_rate = rate.max(1);
    }
    if args.scenario.is_some() {
        cfg.scenario = args.scenario.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn apply_key(
    command: KeyCommand,
    sched: &mut Scheduler<SimContext>,
    ctx: &mut SimContext,
    loadgen_id: Option<TaskId>,
) {
    match command {
        KeyCommand::RateUp => ctx.load_rate = ctx.load_rate.saturating_add(1),
        KeyCommand::RateDown => ctx.load_rate = ctx.load_rate.saturating_sub(1).max(1),
        KeyCommand::RateDouble => ctx.load_rate = ctx.load_rate.saturating_mul(2),
        KeyCommand::RateHalve => ctx.load_rate = (ctx.load_rate / 2).max(1),
        KeyCommand::PauseTraffic => {
            if let Some(id) = loadgen_id {
                sched.stop(id);
                ctx.traffic_paused = true;
                log::info!("Traffic paused");
            }
        }
        KeyCommand::ResumeTraffic => {
            if let Some(id) = loadgen_id {
                sched.resume(id);
            }
            sched.resume_all_paused();
            ctx.traffic_paused = false;
            log::info!("Traffic resumed");
        }
        KeyCommand::Quit => {
            log::info!("Shutdown requested");
            ctx.shutdown = true;
        }
    }
    if matches!(
        command,
        KeyCommand::RateUp | KeyCommand::RateDown | KeyCommand::RateDouble | KeyCommand::RateHalve
    ) {
        log::info!("Session rate now {}/s", ctx.load_rate);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    log::info!("gsimd v{}", env!("CARGO_PKG_VERSION"));

    let cfg = load_config(&args)?;
    log::info!(
        "Node {} local {} remote {}",
        cfg.node.name(),
        cfg.local_endpoint(),
        cfg.remote_endpoint()
    );

    let scenario = match &cfg.scenario {
        Some(path) => Scenario::from_file(path, &cfg)?,
        None => Scenario::default_for(cfg.node, &cfg),
    };
    let scenario = Arc::new(scenario);

    let transport = UdpTransport::bind(cfg.local_endpoint())
        .with_context(|| format!("binding {}", cfg.local_endpoint()))?;

    let wheel_width = cfg
        .t3_timer_ms
        .max(cfg.dead_call_wait_ms)
        .max(cfg.display_refresh_ms)
        .saturating_mul(2)
        .max(1024);

    let mut sched: Scheduler<SimContext> = Scheduler::new(wheel_width);
    let mut ctx = SimContext::new(cfg, Arc::clone(&scenario), Box::new(transport));

    sched.insert(Box::new(DisplayTask::new(ctx.cfg.display_refresh_ms)));
    let loadgen_id = scenario
        .is_originating()
        .then(|| sched.insert(Box::new(LoadGenTask::new())));

    // INT/TERM flip the running flag; the loop exits and restores the
    // terminal before printing final totals
    let running = Arc::new(AtomicBool::new(true));
    let running_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_flag.store(false, Ordering::SeqCst);
    })?;

    let mut keyboard = Keyboard::init()?;

    log::info!("gsimd running");
    while running.load(Ordering::SeqCst) && !ctx.shutdown {
        let now = monotonic_ms();
        ctx.now_ms = now;

        sched.advance(now);

        for command in keyboard.poll() {
            apply_key(command, &mut sched, &mut ctx, loadgen_id);
        }

        match ctx.transport.poll(TICK_MS) {
            Ok(dgrams) => {
                for dgram in dgrams {
                    dispatch::dispatch(&mut sched, &mut ctx, dgram, now);
                }
            }
            Err(e) => log::error!("Transport poll failed: {e}"),
        }

        sched.drain(now, &mut ctx);

        for imsi in std::mem::take(&mut ctx.pending_sessions) {
            UeSession::spawn(&mut sched, &mut ctx, imsi);
        }
    }

    keyboard.restore();
    display::print_final(&ctx);
    log::info!("gsimd terminated");
    Ok(())
}
