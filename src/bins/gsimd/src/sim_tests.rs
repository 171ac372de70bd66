//! End-to-end call-flow tests
//!
//! Drive full scenarios over the loopback transport with a hand-advanced
//! clock, playing the remote peer by crafting responses to whatever the
//! simulator sends.

use std::net::SocketAddr;
use std::sync::Arc;

use gsim_core::config::{Config, NodeType};
use gsim_core::sched::Scheduler;
use gsim_core::stats::StatKind;
use gsim_core::task::TaskId;
use gsim_core::transport::{Datagram, LoopHandle, LoopTransport};
use gsim_gtp::fteid_interface;
use gsim_gtp::header::{Gtp2Header, Gtp2MessageType};
use gsim_gtp::ie::{Gtp2BearerContextIe, Gtp2CauseIe, Gtp2EbiIe, Gtp2FTeidIe, Gtp2Ie};
use gsim_gtp::message::Gtp2Message;
use gsim_gtp::GTP_MIN_EBI;

use crate::context::{ImsiKey, SimContext};
use crate::dispatch;
use crate::msg_build;
use crate::scenario::{JobCounters, Scenario};
use crate::session::UeSession;

const PEER_CTEID: u32 = 0x9000;
const PEER_UTEID: u32 = 0x1111;

fn peer_ep() -> SocketAddr {
    "198.51.100.10:2123".parse().unwrap()
}

fn peer_ip() -> [u8; 4] {
    [198, 51, 100, 10]
}

struct Harness {
    sched: Scheduler<SimContext>,
    ctx: SimContext,
    net: LoopHandle,
    now: u64,
}

impl Harness {
    fn new(node: NodeType) -> Self {
        let cfg = Config {
            node,
            remote_ip: "198.51.100.10".parse().unwrap(),
            t3_timer_ms: 1000,
            n3_requests: 3,
            dead_call_wait_ms: 2000,
            ..Config::default()
        };
        let scenario = Scenario::default_for(node, &cfg);
        Self::with_scenario(cfg, scenario)
    }

    fn with_scenario(cfg: Config, scenario: Scenario) -> Self {
        let (transport, net) = LoopTransport::new();
        let ctx = SimContext::new(cfg, Arc::new(scenario), Box::new(transport));
        Self {
            sched: Scheduler::new(64 * 1024),
            ctx,
            net,
            now: 0,
        }
    }

    fn spawn(&mut self) -> TaskId {
        let imsi = self.ctx.allocate_imsi();
        UeSession::spawn(&mut self.sched, &mut self.ctx, imsi)
    }

    /// One scheduler tick: advance the clock, dispatch inbound, drain
    fn tick(&mut self, advance_ms: u64) {
        self.now += advance_ms;
        self.ctx.now_ms = self.now;
        self.sched.advance(self.now);
        let dgrams = self.ctx.transport.poll(0).expect("loop poll");
        for dgram in dgrams {
            dispatch::dispatch(&mut self.sched, &mut self.ctx, dgram, self.now);
        }
        self.sched.drain(self.now, &mut self.ctx);
        for imsi in std::mem::take(&mut self.ctx.pending_sessions) {
            UeSession::spawn(&mut self.sched, &mut self.ctx, imsi);
        }
    }

    fn inject(&mut self, msg: &Gtp2Message) {
        self.net.push_inbound(Datagram {
            conn_id: 0,
            peer: peer_ep(),
            buf: msg.encode().freeze(),
        });
    }

    /// Take and decode everything sent since the last call
    fn drain_sent(&self) -> Vec<Gtp2Message> {
        self.net
            .take_sent()
            .iter()
            .map(|frame| {
                let mut bytes = frame.buf.clone();
                Gtp2Message::decode(&mut bytes).expect("sent frame decodes")
            })
            .collect()
    }

    fn counter(&self, job: usize, pick: fn(&JobCounters) -> u64) -> u64 {
        pick(&self.ctx.scenario.jobs[job].counters)
    }

    fn stat(&self, kind: StatKind) -> u64 {
        self.ctx.stats.get(kind)
    }
}

fn snd(c: &JobCounters) -> u64 {
    JobCounters::get(&c.num_snd)
}
fn snd_retrans(c: &JobCounters) -> u64 {
    JobCounters::get(&c.num_snd_retrans)
}
fn rcv(c: &JobCounters) -> u64 {
    JobCounters::get(&c.num_rcv)
}
fn rcv_retrans(c: &JobCounters) -> u64 {
    JobCounters::get(&c.num_rcv_retrans)
}
fn timeout(c: &JobCounters) -> u64 {
    JobCounters::get(&c.num_timeout)
}
fn unexp(c: &JobCounters) -> u64 {
    JobCounters::get(&c.num_unexp)
}

/// The peer's reply to a simulator request; `sim_teid` is the
/// simulator's control TEID learned from its sender F-TEID
fn peer_response(req: &Gtp2Message, sim_teid: u32) -> Option<Gtp2Message> {
    let rsp_type = match Gtp2MessageType::try_from(req.msg_type()).ok()? {
        Gtp2MessageType::CreateSessionRequest => Gtp2MessageType::CreateSessionResponse,
        Gtp2MessageType::ModifyBearerRequest => Gtp2MessageType::ModifyBearerResponse,
        Gtp2MessageType::DeleteSessionRequest => Gtp2MessageType::DeleteSessionResponse,
        _ => return None,
    };

    let header = Gtp2Header::new(rsp_type as u8, sim_teid, req.sequence_number());
    let mut msg = Gtp2Message::new(header);

    let mut cause = bytes::BytesMut::new();
    Gtp2CauseIe::accepted().encode(&mut cause, 0);
    let mut cause_bytes = cause.freeze();
    msg.add_ie(Gtp2Ie::decode(&mut cause_bytes).expect("cause"));

    if rsp_type == Gtp2MessageType::CreateSessionResponse {
        msg.set_sender_fteid(fteid_interface::S11_S4_SGW_GTP_C, PEER_CTEID, peer_ip());

        let mut bctx = Gtp2BearerContextIe::new();
        let mut ebi = bytes::BytesMut::new();
        Gtp2EbiIe::new(GTP_MIN_EBI).encode(&mut ebi, 0);
        let mut ebi_bytes = ebi.freeze();
        bctx.add_ie(Gtp2Ie::decode(&mut ebi_bytes).expect("ebi"));
        bctx.add_ie(
            Gtp2FTeidIe::new_ipv4(fteid_interface::S1_U_SGW_GTP_U, PEER_UTEID, peer_ip()).to_ie(0),
        );
        msg.add_ie(bctx.to_ie(0));
    }
    Some(msg)
}

/// The peer's initial Create-Session-Request towards a terminating node
fn peer_cs_req(cfg: &Config, imsi: u64, seq: u32) -> Gtp2Message {
    let mut msg = msg_build::build_create_session_request(cfg);
    msg.set_msg_hdr(0, seq);
    msg.set_imsi(&ImsiKey::from_u64(imsi).to_imsi_ie());
    msg.set_sender_fteid(fteid_interface::S11_MME_GTP_C, PEER_CTEID, peer_ip());
    msg
}

// ----------------------------------------------------------------------
// S1: happy path, simulator as MME
// ----------------------------------------------------------------------
#[test]
fn s1_happy_path_mme() {
    let mut h = Harness::new(NodeType::Mme);
    h.spawn();
    h.tick(0);

    // initial Create-Session-Request on the default connection
    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    let cs_req = &sent[0];
    assert_eq!(
        cs_req.msg_type(),
        Gtp2MessageType::CreateSessionRequest as u8
    );
    assert_eq!(cs_req.teid(), 0);
    assert_eq!(cs_req.sequence_number(), 1);
    assert!(cs_req.imsi().is_ok());
    let sim_teid = cs_req.sender_fteid().expect("sender F-TEID").teid;
    assert_ne!(sim_teid, 0);

    let rsp = peer_response(cs_req, sim_teid).unwrap();
    h.inject(&rsp);
    h.tick(50);
    h.tick(10);

    // Modify-Bearer-Request with the learned remote TEID
    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    let mb_req = &sent[0];
    assert_eq!(mb_req.msg_type(), Gtp2MessageType::ModifyBearerRequest as u8);
    assert_eq!(mb_req.teid(), PEER_CTEID);
    assert_eq!(mb_req.sequence_number(), 2);

    h.inject(&peer_response(mb_req, sim_teid).unwrap());
    h.tick(50);
    h.tick(10); // wait job arms its timer

    // nothing leaves during the scripted wait
    h.tick(400);
    assert!(h.drain_sent().is_empty());

    h.tick(200); // wait expired: Delete-Session-Request
    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    let ds_req = &sent[0];
    assert_eq!(ds_req.msg_type(), Gtp2MessageType::DeleteSessionRequest as u8);
    assert_eq!(ds_req.sequence_number(), 3);

    h.inject(&peer_response(ds_req, sim_teid).unwrap());
    h.tick(50);

    // sent/received once each, no retransmits, no timeouts
    for job in [0, 2, 5] {
        assert_eq!(h.counter(job, snd), 1, "job {job} sent");
        assert_eq!(h.counter(job, snd_retrans), 0);
        assert_eq!(h.counter(job, timeout), 0);
    }
    for job in [1, 3, 6] {
        assert_eq!(h.counter(job, rcv), 1, "job {job} received");
        assert_eq!(h.counter(job, rcv_retrans), 0);
        assert_eq!(h.counter(job, unexp), 0);
    }

    assert_eq!(h.stat(StatKind::SessionsCreated), 1);
    assert_eq!(h.stat(StatKind::SessionsSucc), 1);
    assert_eq!(h.stat(StatKind::SessionsFail), 0);
    assert_eq!(h.stat(StatKind::Sessions), 0);
    assert_eq!(h.stat(StatKind::DeadCalls), 1);

    // dead-call grace over: session and tunnel are gone
    h.tick(2500);
    assert!(h.sched.is_empty());
    assert!(h.ctx.tunnels.is_empty());
    assert!(h.ctx.sessions_by_imsi.is_empty());
    assert_eq!(h.stat(StatKind::DeadCalls), 0);
    assert_eq!(
        h.stat(StatKind::SessionsCreated),
        h.stat(StatKind::SessionsSucc) + h.stat(StatKind::SessionsFail)
    );
}

// ----------------------------------------------------------------------
// S2: one retransmission, then success
// ----------------------------------------------------------------------
#[test]
fn s2_single_retransmit_then_success() {
    let mut h = Harness::new(NodeType::Mme);
    h.spawn();
    h.tick(0);

    let frames = h.net.take_sent();
    assert_eq!(frames.len(), 1);
    let first_buf = frames[0].buf.clone();
    let mut bytes = frames[0].buf.clone();
    let cs_req = Gtp2Message::decode(&mut bytes).unwrap();
    let sim_teid = cs_req.sender_fteid().unwrap().teid;

    // drop the first response; T3 expires and the request goes again
    h.tick(1000);
    let resent = h.net.take_sent();
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].buf, first_buf, "retransmission resends the stored buffer");
    assert_eq!(h.counter(0, snd), 1);
    assert_eq!(h.counter(0, snd_retrans), 1);

    // second response gets through; the scenario then runs to the end
    h.inject(&peer_response(&cs_req, sim_teid).unwrap());
    h.tick(10);

    let mut guard = 0;
    while h.stat(StatKind::SessionsSucc) == 0 {
        h.tick(100);
        for req in h.drain_sent() {
            if let Some(rsp) = peer_response(&req, sim_teid) {
                h.inject(&rsp);
            }
        }
        guard += 1;
        assert!(guard < 100, "scenario did not complete");
    }

    assert_eq!(h.counter(0, snd_retrans), 1);
    assert_eq!(h.counter(0, timeout), 0);
    assert_eq!(h.stat(StatKind::SessionsSucc), 1);
    assert_eq!(h.stat(StatKind::SessionsFail), 0);
}

// ----------------------------------------------------------------------
// S3: N3 exhausted
// ----------------------------------------------------------------------
#[test]
fn s3_n3_exhausted() {
    let mut h = Harness::new(NodeType::Mme);
    h.spawn();
    h.tick(0);
    assert_eq!(h.drain_sent().len(), 1);

    // three T3 expiries retransmit, the fourth gives up
    for _ in 0..3 {
        h.tick(1000);
    }
    assert_eq!(h.net.sent_count(), 3);
    assert_eq!(h.counter(0, snd), 1);
    assert_eq!(h.counter(0, snd_retrans), 3);
    assert_eq!(h.stat(StatKind::SessionsFail), 0);

    h.tick(1000);
    assert_eq!(h.net.sent_count(), 3, "no transmission past N3");
    assert_eq!(h.counter(0, timeout), 1);
    assert_eq!(h.stat(StatKind::SessionsFail), 1);
    assert_eq!(h.stat(StatKind::Sessions), 0);
    assert!(h.sched.is_empty());
    assert!(h.ctx.tunnels.is_empty());
    assert_eq!(
        h.stat(StatKind::SessionsCreated),
        h.stat(StatKind::SessionsSucc) + h.stat(StatKind::SessionsFail)
    );
}

// ----------------------------------------------------------------------
// S4: duplicate inbound request, simulator as SGW
// ----------------------------------------------------------------------
#[test]
fn s4_duplicate_inbound_request() {
    let mut h = Harness::new(NodeType::Sgw);
    let cs_req = peer_cs_req(&h.ctx.cfg, 505, 1);

    h.inject(&cs_req);
    h.tick(10);

    // session auto-created, response sent in the same tick
    assert_eq!(h.stat(StatKind::SessionsCreated), 1);
    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    let cs_rsp = &sent[0];
    assert_eq!(
        cs_rsp.msg_type(),
        Gtp2MessageType::CreateSessionResponse as u8
    );
    assert_eq!(cs_rsp.teid(), PEER_CTEID);
    assert_eq!(cs_rsp.sequence_number(), 1);
    assert_eq!(h.counter(0, rcv), 1);
    assert_eq!(h.counter(1, snd), 1);

    // identical duplicate: answered from the stored reply, no state move
    h.inject(&cs_req);
    h.tick(10);

    let dup = h.drain_sent();
    assert_eq!(dup.len(), 1);
    assert_eq!(
        dup[0].msg_type(),
        Gtp2MessageType::CreateSessionResponse as u8
    );
    assert_eq!(h.counter(0, rcv), 1);
    assert_eq!(h.counter(0, rcv_retrans), 1);
    assert_eq!(h.counter(1, snd), 1, "response job ran exactly once");
    assert_eq!(h.counter(0, unexp), 0);
}

// ----------------------------------------------------------------------
// S5: unexpected message mid-scenario
// ----------------------------------------------------------------------
#[test]
fn s5_unexpected_message() {
    let mut h = Harness::new(NodeType::Mme);
    h.spawn();
    h.tick(0);

    let sent = h.drain_sent();
    let cs_req = &sent[0];
    let sim_teid = cs_req.sender_fteid().unwrap().teid;
    h.inject(&peer_response(cs_req, sim_teid).unwrap());
    h.tick(10);

    // unscripted Create-Bearer-Request lands between procedures
    let mut cb_req = msg_build::build_create_bearer_request(&h.ctx.cfg);
    cb_req.set_msg_hdr(sim_teid, 99);
    h.inject(&cb_req);
    h.tick(10);

    assert_eq!(h.counter(2, unexp), 1);
    assert_eq!(h.stat(StatKind::SessionsFail), 0);

    // the scenario still completes normally
    let mut guard = 0;
    while h.stat(StatKind::SessionsSucc) == 0 {
        h.tick(100);
        for req in h.drain_sent() {
            if let Some(rsp) = peer_response(&req, sim_teid) {
                h.inject(&rsp);
            }
        }
        guard += 1;
        assert!(guard < 100, "scenario did not complete");
    }
    assert_eq!(h.counter(2, unexp), 1);
}

// ----------------------------------------------------------------------
// S6: S11 control-tunnel sharing across two PDNs
// ----------------------------------------------------------------------
#[test]
fn s6_s11_tunnel_sharing() {
    let cfg = Config {
        node: NodeType::Mme,
        remote_ip: "198.51.100.10".parse().unwrap(),
        t3_timer_ms: 1000,
        n3_requests: 3,
        dead_call_wait_ms: 2000,
        ..Config::default()
    };
    let yaml = r#"
interface: s11
steps:
  - send: create-session-request
  - recv: create-session-response
  - send: create-session-request
  - recv: create-session-response
"#;
    let scenario = Scenario::from_yaml(yaml, &cfg).unwrap();
    let mut h = Harness::with_scenario(cfg, scenario);

    h.spawn();
    h.tick(0);

    let sent = h.drain_sent();
    let first = &sent[0];
    let sim_teid = first.sender_fteid().unwrap().teid;
    h.inject(&peer_response(first, sim_teid).unwrap());
    h.tick(10);
    h.tick(10);

    // second PDN: the S11 control tunnel is shared, not re-created
    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    let second = &sent[0];
    assert_eq!(
        second.msg_type(),
        Gtp2MessageType::CreateSessionRequest as u8
    );
    assert_eq!(second.sender_fteid().unwrap().teid, sim_teid);
    assert_eq!(h.ctx.tunnels.len(), 1);
    assert_eq!(h.ctx.tunnels[&sim_teid].ref_count, 2);

    h.inject(&peer_response(second, sim_teid).unwrap());
    h.tick(10);
    assert_eq!(h.stat(StatKind::SessionsSucc), 1);

    // session teardown frees the shared tunnel exactly once
    h.tick(2500);
    assert!(h.sched.is_empty());
    assert!(h.ctx.tunnels.is_empty());
}

// ----------------------------------------------------------------------
// Responder plays the whole call flow
// ----------------------------------------------------------------------
#[test]
fn responder_full_flow() {
    let mut h = Harness::new(NodeType::Sgw);
    h.inject(&peer_cs_req(&h.ctx.cfg, 700, 1));
    h.tick(10);
    assert_eq!(h.drain_sent().len(), 1);

    let mut mb_req = msg_build::build_modify_bearer_request(&h.ctx.cfg);
    let sim_teid = *h.ctx.tunnels.keys().next().unwrap();
    mb_req.set_msg_hdr(sim_teid, 2);
    h.inject(&mb_req);
    h.tick(10);

    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].msg_type(),
        Gtp2MessageType::ModifyBearerResponse as u8
    );
    assert_eq!(sent[0].sequence_number(), 2);

    let mut ds_req = msg_build::build_delete_session_request(&h.ctx.cfg);
    ds_req.set_msg_hdr(sim_teid, 3);
    h.inject(&ds_req);
    h.tick(10);

    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].msg_type(),
        Gtp2MessageType::DeleteSessionResponse as u8
    );
    assert_eq!(h.stat(StatKind::SessionsSucc), 1);
    assert_eq!(h.stat(StatKind::DeadCalls), 1);

    // late duplicate during dead-call grace is still answered
    h.inject(&ds_req);
    h.tick(10);
    let sent = h.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].msg_type(),
        Gtp2MessageType::DeleteSessionResponse as u8
    );
    assert_eq!(h.counter(4, rcv_retrans), 1);

    h.tick(2500);
    assert!(h.sched.is_empty());
    assert_eq!(h.stat(StatKind::DeadCalls), 0);
}

// ----------------------------------------------------------------------
// Outbound sequence numbers are strictly increasing per peer
// ----------------------------------------------------------------------
#[test]
fn outbound_sequence_numbers_increase() {
    let mut h = Harness::new(NodeType::Mme);
    h.spawn();
    h.spawn();
    h.tick(0);

    let sent = h.drain_sent();
    assert_eq!(sent.len(), 2);
    let mut seqs: Vec<u32> = sent.iter().map(|m| m.sequence_number()).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2]);

    // local TEIDs minted for the two sessions never collide
    let teids: Vec<u32> = sent
        .iter()
        .map(|m| m.sender_fteid().unwrap().teid)
        .collect();
    assert_ne!(teids[0], teids[1]);
}
