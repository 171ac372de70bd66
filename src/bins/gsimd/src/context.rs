//! Simulator context and tunnel registry
//!
//! One value owns everything the state machines share: configuration,
//! the scenario, the statistics store, the transport, and the two
//! indexes that route inbound datagrams to sessions (IMSI to session
//! task, local TEID to control tunnel). The whole context is mutated
//! only from the scheduler thread, so none of it is locked. Ownership of
//! tunnels is top-down from the session; the registry entries are
//! non-owning lookups that every session teardown removes together.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use gsim_core::config::Config;
use gsim_core::stats::Stats;
use gsim_core::task::TaskId;
use gsim_core::transport::Transport;
use gsim_gtp::ie::Gtp2ImsiIe;
use gsim_gtp::TeidPool;

use crate::error::{SimError, SimResult};
use crate::scenario::{GtpInterface, Scenario};

/// 8-byte BCD IMSI, the UE-permanent session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImsiKey(pub [u8; 8]);

impl ImsiKey {
    pub fn from_u64(imsi: u64) -> Self {
        Self(Gtp2ImsiIe::from_u64(imsi).value)
    }

    pub fn to_imsi_ie(self) -> Gtp2ImsiIe {
        Gtp2ImsiIe::new(self.0)
    }
}

impl fmt::Display for ImsiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Gtp2ImsiIe::new(self.0).to_bcd_string())
    }
}

/// Control-plane tunnel
///
/// The local TEID is the primary inbound dispatch key. Over S11/S4 a
/// single tunnel is shared by every PDN of the UE via the reference
/// count.
#[derive(Debug, Clone)]
pub struct CTun {
    pub local_teid: u32,
    pub remote_teid: u32,
    pub local_ep: SocketAddr,
    pub peer_ep: SocketAddr,
    pub ref_count: u32,
    /// Owning UE session, resolved through the IMSI index
    pub imsi: ImsiKey,
}

/// Everything the session state machines operate on
pub struct SimContext {
    pub cfg: Config,
    pub scenario: Arc<Scenario>,
    pub stats: Stats,
    pub transport: Box<dyn Transport>,
    /// Local TEID -> control tunnel
    pub tunnels: HashMap<u32, CTun>,
    /// IMSI -> owning session task
    pub sessions_by_imsi: HashMap<ImsiKey, TaskId>,
    /// Per-peer outbound request sequence numbers
    peer_seq: HashMap<SocketAddr, u32>,
    pub teid_pool: TeidPool,
    /// Wall-clock of the current tick, milliseconds
    pub now_ms: u64,
    /// IMSIs the load generator wants sessions spawned for
    pub pending_sessions: Vec<ImsiKey>,
    /// Next IMSI the load generator assigns
    pub next_imsi: u64,
    /// Session creation rate, sessions per second (keyboard-adjustable)
    pub load_rate: u32,
    /// Datagrams dropped because no session could be resolved
    pub unmatched_datagrams: u64,
    /// Operator paused the load generator
    pub traffic_paused: bool,
    /// Graceful shutdown requested
    pub shutdown: bool,
}

impl SimContext {
    pub fn new(cfg: Config, scenario: Arc<Scenario>, transport: Box<dyn Transport>) -> Self {
        let next_imsi = cfg.imsi_base;
        let load_rate = cfg.session_rate;
        Self {
            cfg,
            scenario,
            stats: Stats::new(),
            transport,
            tunnels: HashMap::new(),
            sessions_by_imsi: HashMap::new(),
            peer_seq: HashMap::new(),
            teid_pool: TeidPool::new(),
            now_ms: 0,
            pending_sessions: Vec::new(),
            next_imsi,
            load_rate,
            unmatched_datagrams: 0,
            traffic_paused: false,
            shutdown: false,
        }
    }

    /// Next outbound request sequence number for a peer; strictly
    /// monotonic per endpoint
    pub fn next_seq(&mut self, peer: SocketAddr) -> u32 {
        let entry = self.peer_seq.entry(peer).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Record an inbound request sequence number so later outbound
    /// requests to the peer stay above it
    pub fn update_peer_seq(&mut self, peer: SocketAddr, seq: u32) {
        let entry = self.peer_seq.entry(peer).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    /// Create (or, on S11/S4, share) a control tunnel for a PDN of the
    /// given session. Returns the tunnel's local TEID.
    pub fn ctun_create(
        &mut self,
        imsi: ImsiKey,
        existing: Option<u32>,
        peer_ep: SocketAddr,
    ) -> SimResult<u32> {
        if self.scenario.interface == GtpInterface::S11 {
            if let Some(teid) = existing {
                let tunnel = self
                    .tunnels
                    .get_mut(&teid)
                    .ok_or(SimError::CtunMissing(teid))?;
                tunnel.ref_count += 1;
                log::debug!("C-tunnel teid={teid} shared, refs={}", tunnel.ref_count);
                return Ok(teid);
            }
        }

        let local_teid = self.teid_pool.allocate()?;
        let tunnel = CTun {
            local_teid,
            remote_teid: 0,
            local_ep: self.cfg.local_endpoint(),
            peer_ep,
            ref_count: 1,
            imsi,
        };
        self.tunnels.insert(local_teid, tunnel);
        log::debug!("[Added] C-tunnel teid={local_teid} IMSI[{imsi}]");
        Ok(local_teid)
    }

    /// Drop one reference to a control tunnel, freeing it at zero
    pub fn ctun_release(&mut self, local_teid: u32) {
        if let Some(tunnel) = self.tunnels.get_mut(&local_teid) {
            tunnel.ref_count -= 1;
            if tunnel.ref_count == 0 {
                self.tunnels.remove(&local_teid);
                log::debug!("[Removed] C-tunnel teid={local_teid}");
            }
        }
    }

    /// Bind an IMSI to its session task
    pub fn session_bind(&mut self, imsi: ImsiKey, id: TaskId) {
        self.sessions_by_imsi.insert(imsi, id);
    }

    /// Remove the IMSI index entry of a dying session
    pub fn session_unbind(&mut self, imsi: ImsiKey) {
        self.sessions_by_imsi.remove(&imsi);
    }

    /// Session owning an IMSI
    pub fn session_by_imsi(&self, imsi: ImsiKey) -> Option<TaskId> {
        self.sessions_by_imsi.get(&imsi).copied()
    }

    /// Session owning a local TEID, through its control tunnel
    pub fn session_by_teid(&self, teid: u32) -> Option<TaskId> {
        let tunnel = self.tunnels.get(&teid)?;
        self.session_by_imsi(tunnel.imsi)
    }

    /// Allocate the next load-generator IMSI
    pub fn allocate_imsi(&mut self) -> ImsiKey {
        let imsi = ImsiKey::from_u64(self.next_imsi);
        self.next_imsi += 1;
        imsi
    }
}
