//! UE session state machine
//!
//! Each UE session is a task stepping its scenario one job at a time:
//! requests are sent and retransmitted on the T3 timer up to N3 times,
//! triggered responses go out on the connection the request arrived on,
//! and a completed session lingers in dead-call mode answering late
//! duplicates until the grace period expires.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;

use gsim_core::config::{Config, NodeType};
use gsim_core::sched::Scheduler;
use gsim_core::stats::StatKind;
use gsim_core::task::{RunOutcome, Task, TaskId};
use gsim_core::transport::Datagram;
use gsim_gtp::fteid_interface;
use gsim_gtp::header::{msg_category, msg_name, Gtp2MessageType, Gtp2MsgCategory};
use gsim_gtp::ie::{Gtp2BearerContextIe, Gtp2IeType};
use gsim_gtp::message::Gtp2Message;
use gsim_gtp::{GTP_MAX_BEARERS, GTP_MIN_EBI};

use crate::context::{ImsiKey, SimContext};
use crate::error::{SimError, SimResult};
use crate::scenario::{JobCounters, JobKind, Scenario};

/// Session has a request in flight and expects its response
const FLAG_WAITING_FOR_RSP: u32 = 0x01;
/// Scenario finished; session is in dead-call grace
const FLAG_SCN_COMPLETE: u32 = 0x02;

const CS_REQ: u8 = Gtp2MessageType::CreateSessionRequest as u8;
const CS_RSP: u8 = Gtp2MessageType::CreateSessionResponse as u8;

/// A sent message retained for retransmission
#[derive(Debug, Clone)]
pub struct SentMsg {
    pub conn_id: u32,
    pub peer_ep: SocketAddr,
    pub buf: Bytes,
}

/// One request/response exchange
#[derive(Debug, Default, Clone)]
pub struct ProcRecord {
    /// Connection the request was sent or received on
    pub conn_id: u32,
    pub seq_number: u32,
    pub req_type: u8,
    pub rsp_type: u8,
    /// Last sent buffer, for retransmission
    pub sent_msg: Option<SentMsg>,
    /// Job that authored the procedure; receive-retransmit counters are
    /// attributed to it
    pub job_index: Option<usize>,
}

/// PDN connection: one control tunnel plus the bearers it binds
#[derive(Debug)]
pub struct Pdn {
    pub ctun_teid: u32,
    pub bearer_mask: u16,
}

/// Bearer with its user-plane tunnel endpoints
#[derive(Debug, Clone)]
pub struct Bearer {
    pub ebi: u8,
    pub utun_local_teid: u32,
    pub utun_remote_teid: u32,
}

/// Per-UE scenario interpreter
pub struct UeSession {
    imsi: ImsiKey,
    scenario: Arc<Scenario>,
    curr_task_indx: usize,
    bitmask: u32,
    curr_proc: ProcRecord,
    prev_proc: ProcRecord,
    curr_req_type: u8,
    pdns: Vec<Pdn>,
    curr_pdn: Option<usize>,
    bearers: [Option<Bearer>; GTP_MAX_BEARERS],
    peer_ep: SocketAddr,
    n3_requests: u32,
    retry_cnt: u32,
    t3_time: u64,
    dead_call_wait: u64,
    wake_time: u64,
    last_run_time: u64,
}

impl UeSession {
    pub fn new(imsi: ImsiKey, scenario: Arc<Scenario>, cfg: &Config) -> Self {
        Self {
            imsi,
            scenario,
            curr_task_indx: 0,
            bitmask: 0,
            curr_proc: ProcRecord::default(),
            prev_proc: ProcRecord::default(),
            curr_req_type: 0,
            pdns: Vec::new(),
            curr_pdn: None,
            bearers: Default::default(),
            peer_ep: cfg.remote_endpoint(),
            n3_requests: cfg.n3_requests,
            retry_cnt: 0,
            t3_time: cfg.t3_timer_ms,
            dead_call_wait: cfg.dead_call_wait_ms,
            wake_time: 0,
            last_run_time: 0,
        }
    }

    /// Create a session task, register it and index it by IMSI
    pub fn spawn(
        sched: &mut Scheduler<SimContext>,
        ctx: &mut SimContext,
        imsi: ImsiKey,
    ) -> TaskId {
        let session = UeSession::new(imsi, Arc::clone(&ctx.scenario), &ctx.cfg);
        let id = sched.insert(Box::new(session));
        ctx.session_bind(imsi, id);
        ctx.stats.inc(StatKind::SessionsCreated);
        ctx.stats.inc(StatKind::Sessions);
        log::info!("[Added] UE Session IMSI[{imsi}]");
        id
    }

    fn has_flag(&self, flag: u32) -> bool {
        self.bitmask & flag != 0
    }

    fn set_flag(&mut self, flag: u32) {
        self.bitmask |= flag;
    }

    fn clear_flag(&mut self, flag: u32) {
        self.bitmask &= !flag;
    }

    fn is_scn_completed(&self) -> bool {
        self.curr_task_indx >= self.scenario.jobs.len()
    }

    fn finish_task(&mut self) {
        self.curr_task_indx += 1;
    }

    fn bearer(&self, ebi: u8) -> Option<&Bearer> {
        let index = ebi.checked_sub(GTP_MIN_EBI)? as usize;
        self.bearers.get(index)?.as_ref()
    }

    fn bearer_mut(&mut self, ebi: u8) -> Option<&mut Bearer> {
        let index = ebi.checked_sub(GTP_MIN_EBI)? as usize;
        self.bearers.get_mut(index)?.as_mut()
    }

    fn bump_curr(&self, pick: fn(&JobCounters) -> &std::sync::atomic::AtomicU64) {
        if let Some(job) = self.scenario.jobs.get(self.curr_task_indx) {
            JobCounters::bump(pick(&job.counters));
        }
    }

    fn bump_prev_retrans(&self) {
        if let Some(index) = self.prev_proc.job_index {
            if let Some(job) = self.scenario.jobs.get(index) {
                JobCounters::bump(&job.counters.num_rcv_retrans);
            }
        }
    }

    /// Outcome for a run that should not move the state machine:
    /// a session waiting on a response or a timer keeps its wake time, a
    /// receive job with nothing in flight parks until the next delivery.
    fn keep_state(&self) -> RunOutcome {
        if self.has_flag(FLAG_WAITING_FOR_RSP) {
            return RunOutcome::Pause;
        }
        match self
            .scenario
            .jobs
            .get(self.curr_task_indx)
            .map(|job| &job.kind)
        {
            Some(JobKind::Recv(_)) => RunOutcome::Stop,
            _ => RunOutcome::Pause,
        }
    }

    /// Terminate on failure: the caller already bumped the job counter
    fn fail(&mut self, ctx: &mut SimContext) -> RunOutcome {
        ctx.stats.inc(StatKind::SessionsFail);
        ctx.stats.dec(StatKind::Sessions);
        self.release(ctx);
        RunOutcome::Finished
    }

    /// Remove this session's registry entries; tunnels shared across
    /// PDNs free once their last reference drops
    fn release(&mut self, ctx: &mut SimContext) {
        for pdn in &self.pdns {
            ctx.ctun_release(pdn.ctun_teid);
        }
        ctx.session_unbind(self.imsi);
        log::info!("[Removed] UE Session IMSI[{}]", self.imsi);
    }

    fn step(&mut self, ctx: &mut SimContext, arg: Option<Datagram>) -> RunOutcome {
        self.last_run_time = ctx.now_ms;
        log::trace!("Running UE session IMSI[{}]", self.imsi);

        if self.has_flag(FLAG_SCN_COMPLETE) {
            return self.handle_dead_call(ctx, arg);
        }

        if let Some(data) = arg {
            return self.handle_recv(ctx, data);
        }

        enum JobClass {
            Send,
            Recv,
            Wait,
        }
        let class = self
            .scenario
            .jobs
            .get(self.curr_task_indx)
            .map(|job| match job.kind {
                JobKind::Send(_) => JobClass::Send,
                JobKind::Recv(_) => JobClass::Recv,
                JobKind::Wait(_) => JobClass::Wait,
            });
        match class {
            Some(JobClass::Send) => self.handle_send(ctx),
            Some(JobClass::Wait) => self.handle_wait(),
            // a receive job never runs on a timer; nothing to do
            Some(JobClass::Recv) => RunOutcome::Pause,
            None => {
                log::error!("UE session IMSI[{}] ran past its scenario", self.imsi);
                self.fail(ctx)
            }
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn handle_send(&mut self, ctx: &mut SimContext) -> RunOutcome {
        if self.has_flag(FLAG_WAITING_FOR_RSP) {
            return self.handle_out_req_timeout(ctx);
        }

        let scn = Arc::clone(&self.scenario);
        let JobKind::Send(template) = &scn.jobs[self.curr_task_indx].kind else {
            return RunOutcome::Pause;
        };
        let mut msg = template.clone();

        if msg_category(msg.msg_type()) == Gtp2MsgCategory::Request {
            match self.handle_out_req(ctx, &mut msg) {
                Ok(()) => RunOutcome::Pause,
                Err(e) => {
                    log::error!("Sending request to peer failed: {e}");
                    self.bump_curr(|c| &c.num_timeout);
                    self.fail(ctx)
                }
            }
        } else {
            match self.handle_out_rsp(ctx, &mut msg) {
                Ok(()) => {
                    if self.is_scn_completed() {
                        self.complete(ctx)
                    } else {
                        // next inbound delivery reactivates the task
                        RunOutcome::Stop
                    }
                }
                Err(e) => {
                    log::error!("Sending response to peer failed: {e}");
                    self.bump_curr(|c| &c.num_unexp);
                    self.fail(ctx)
                }
            }
        }
    }

    fn handle_out_req(&mut self, ctx: &mut SimContext, msg: &mut Gtp2Message) -> SimResult<()> {
        let msg_type = msg.msg_type();

        if msg_type == CS_REQ {
            log::debug!("Creating PDN connection, IMSI[{}]", self.imsi);
            let existing = self.pdns.last().map(|p| p.ctun_teid);
            let teid = ctx.ctun_create(self.imsi, existing, self.peer_ep)?;
            self.pdns.push(Pdn {
                ctun_teid: teid,
                bearer_mask: 0,
            });
            self.curr_pdn = Some(self.pdns.len() - 1);
            self.create_bearers(ctx, msg)?;
        }
        let pdn_index = self.curr_pdn.ok_or(SimError::PdnMissing)?;

        let seq = ctx.next_seq(self.peer_ep);
        self.curr_proc = ProcRecord {
            conn_id: 0,
            seq_number: seq,
            req_type: msg_type,
            rsp_type: 0,
            sent_msg: None,
            job_index: Some(self.curr_task_indx),
        };
        self.curr_req_type = msg_type;
        self.retry_cnt = 0;

        let buf = self.encode_out(ctx, pdn_index, msg, seq)?;

        // initial message goes out on the default socket
        log::debug!("Sending {} seq={seq}", msg_name(msg_type));
        ctx.transport.send_msg(0, self.peer_ep, buf.clone())?;
        self.bump_curr(|c| &c.num_snd);

        self.curr_proc.sent_msg = Some(SentMsg {
            conn_id: 0,
            peer_ep: self.peer_ep,
            buf,
        });
        self.set_flag(FLAG_WAITING_FOR_RSP);

        // the job completes on response or max retry, not here
        self.wake_time = self.last_run_time + self.t3_time;
        Ok(())
    }

    fn handle_out_req_timeout(&mut self, ctx: &mut SimContext) -> RunOutcome {
        if self.retry_cnt >= self.n3_requests {
            log::debug!("Maximum retries reached, IMSI[{}]", self.imsi);
            self.curr_proc.sent_msg = None;
            self.bump_curr(|c| &c.num_timeout);
            return self.fail(ctx);
        }

        let Some(sent) = self.curr_proc.sent_msg.clone() else {
            log::error!("Retransmission with no stored request, IMSI[{}]", self.imsi);
            self.bump_curr(|c| &c.num_timeout);
            return self.fail(ctx);
        };

        log::debug!("Retransmitting {}", msg_name(self.curr_req_type));
        if let Err(e) = ctx
            .transport
            .send_msg(sent.conn_id, sent.peer_ep, sent.buf)
        {
            log::error!("Retransmission failed: {e}");
            self.bump_curr(|c| &c.num_timeout);
            return self.fail(ctx);
        }
        self.bump_curr(|c| &c.num_snd_retrans);
        self.retry_cnt += 1;

        // wake again at the next T3 expiry
        self.wake_time = self.last_run_time + self.t3_time;
        RunOutcome::Pause
    }

    fn handle_out_rsp(&mut self, ctx: &mut SimContext, msg: &mut Gtp2Message) -> SimResult<()> {
        let pdn_index = self.curr_pdn.ok_or(SimError::PdnMissing)?;
        let seq = self.curr_proc.seq_number;
        let buf = self.encode_out(ctx, pdn_index, msg, seq)?;

        // the response goes out on the connection the request arrived on
        let conn_id = self.curr_proc.conn_id;
        let ctun_teid = self.pdns[pdn_index].ctun_teid;
        let dst = ctx
            .tunnels
            .get(&ctun_teid)
            .ok_or(SimError::CtunMissing(ctun_teid))?
            .peer_ep;

        log::debug!("Sending {} seq={seq}", msg_name(msg.msg_type()));
        ctx.transport.send_msg(conn_id, dst, buf.clone())?;
        self.bump_curr(|c| &c.num_snd);

        // retained so a duplicate of the request can be answered again
        self.prev_proc.sent_msg = Some(SentMsg {
            conn_id,
            peer_ep: dst,
            buf,
        });
        self.prev_proc.rsp_type = msg.msg_type();

        self.finish_task();
        Ok(())
    }

    fn handle_wait(&mut self) -> RunOutcome {
        let JobKind::Wait(ms) = self.scenario.jobs[self.curr_task_indx].kind else {
            return RunOutcome::Pause;
        };
        self.wake_time = self.last_run_time + ms;
        self.finish_task();
        RunOutcome::Pause
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn handle_recv(&mut self, ctx: &mut SimContext, data: Datagram) -> RunOutcome {
        let mut bytes = data.buf.clone();
        let msg = match Gtp2Message::decode(&mut bytes) {
            Ok(msg) => msg,
            Err(e) => {
                // a malformed datagram never terminates a session
                log::debug!("Inbound decode failed: {e}");
                self.bump_curr(|c| &c.num_unexp);
                return self.keep_state();
            }
        };

        match msg_category(msg.msg_type()) {
            Gtp2MsgCategory::Request => self.handle_inc_req(ctx, &msg, &data),
            Gtp2MsgCategory::Response => self.handle_inc_rsp(ctx, &msg, &data),
            Gtp2MsgCategory::Other => {
                log::debug!("Unknown message type [{}] dropped", msg.msg_type());
                self.bump_curr(|c| &c.num_unexp);
                self.keep_state()
            }
        }
    }

    fn is_expected_req(&self, msg: &Gtp2Message) -> bool {
        match self.scenario.jobs.get(self.curr_task_indx).map(|j| &j.kind) {
            Some(JobKind::Recv(t)) => {
                *t == msg.msg_type() && msg.sequence_number() > self.curr_proc.seq_number
            }
            _ => false,
        }
    }

    fn is_expected_rsp(&self, msg: &Gtp2Message) -> bool {
        match self
            .scenario
            .jobs
            .get(self.curr_task_indx + 1)
            .map(|j| &j.kind)
        {
            Some(JobKind::Recv(t)) => {
                *t == msg.msg_type() && msg.sequence_number() == self.curr_proc.seq_number
            }
            _ => false,
        }
    }

    fn is_prev_proc_req(&self, msg: &Gtp2Message) -> bool {
        self.curr_task_indx > 0
            && self.prev_proc.req_type == msg.msg_type()
            && self.prev_proc.seq_number == msg.sequence_number()
    }

    fn is_prev_proc_rsp(&self, msg: &Gtp2Message) -> bool {
        self.curr_task_indx > 0
            && self.prev_proc.rsp_type == msg.msg_type()
            && self.prev_proc.seq_number == msg.sequence_number()
    }

    fn handle_inc_req(
        &mut self,
        ctx: &mut SimContext,
        msg: &Gtp2Message,
        data: &Datagram,
    ) -> RunOutcome {
        if self.is_expected_req(msg) {
            self.bump_curr(|c| &c.num_rcv);
        } else if self.is_prev_proc_req(msg) {
            // retransmitted request of the previous procedure: answer it
            // again from the stored reply
            log::debug!("Duplicate {} answered from store", msg_name(msg.msg_type()));
            self.bump_prev_retrans();
            if let Some(sent) = &self.prev_proc.sent_msg {
                if let Err(e) =
                    ctx.transport
                        .send_msg(sent.conn_id, sent.peer_ep, sent.buf.clone())
                {
                    log::error!("Duplicate reply send failed: {e}");
                }
            }
            return self.keep_state();
        } else {
            log::debug!("Unexpected {} dropped", msg_name(msg.msg_type()));
            self.bump_curr(|c| &c.num_unexp);
            return self.keep_state();
        }

        if msg.msg_type() == CS_REQ {
            log::debug!("Creating PDN connection, IMSI[{}]", self.imsi);
            let existing = self.pdns.last().map(|p| p.ctun_teid);
            match ctx.ctun_create(self.imsi, existing, data.peer) {
                Ok(teid) => {
                    self.pdns.push(Pdn {
                        ctun_teid: teid,
                        bearer_mask: 0,
                    });
                    self.curr_pdn = Some(self.pdns.len() - 1);
                }
                Err(e) => {
                    log::error!("PDN creation failed: {e}");
                    self.bump_curr(|c| &c.num_unexp);
                    return self.fail(ctx);
                }
            }
        }

        self.curr_proc.conn_id = data.conn_id;
        self.curr_proc.seq_number = msg.sequence_number();
        self.curr_proc.req_type = msg.msg_type();
        self.curr_proc.job_index = Some(self.curr_task_indx);
        self.curr_req_type = msg.msg_type();

        ctx.update_peer_seq(data.peer, msg.sequence_number());

        if let Err(e) = self.dec_and_store(ctx, msg, data.peer) {
            log::warn!("Applying inbound {} failed: {e}", msg_name(msg.msg_type()));
            self.bump_curr(|c| &c.num_unexp);
            return self.keep_state();
        }

        self.prev_proc.conn_id = self.curr_proc.conn_id;
        self.prev_proc.seq_number = self.curr_proc.seq_number;
        self.prev_proc.req_type = msg.msg_type();
        self.prev_proc.job_index = Some(self.curr_task_indx);

        // finish the receive job and send the triggered response in the
        // same tick
        self.finish_task();
        self.step(ctx, None)
    }

    fn handle_inc_rsp(
        &mut self,
        ctx: &mut SimContext,
        msg: &Gtp2Message,
        data: &Datagram,
    ) -> RunOutcome {
        if self.is_expected_rsp(msg) {
            log::debug!("Expected {} received", msg_name(msg.msg_type()));

            self.prev_proc.conn_id = data.conn_id;
            self.prev_proc.seq_number = self.curr_proc.seq_number;
            self.prev_proc.req_type = self.curr_req_type;
            self.prev_proc.rsp_type = msg.msg_type();
            self.prev_proc.job_index = Some(self.curr_task_indx);

            // the request job completes
            self.finish_task();

            self.bump_curr(|c| &c.num_rcv);
            if let Err(e) = self.dec_and_store(ctx, msg, data.peer) {
                log::warn!("Applying inbound {} failed: {e}", msg_name(msg.msg_type()));
            }
            self.clear_flag(FLAG_WAITING_FOR_RSP);
            self.curr_proc.sent_msg = None;

            // the receive job completes
            self.finish_task();

            if self.is_scn_completed() {
                return self.complete(ctx);
            }
            // re-evaluate the next job on the next tick
            self.wake_time = 0;
            RunOutcome::Pause
        } else if self.is_prev_proc_rsp(msg) {
            log::debug!("Response for previous procedure received");
            self.bump_prev_retrans();
            self.keep_state()
        } else {
            log::debug!("Unexpected {} dropped", msg_name(msg.msg_type()));
            self.bump_curr(|c| &c.num_unexp);
            self.keep_state()
        }
    }

    /// Apply a decoded inbound message to the data model: remote F-TEID
    /// into the control tunnel, peer endpoint, bearers minted from a
    /// Create-Session-Request
    fn dec_and_store(
        &mut self,
        ctx: &mut SimContext,
        msg: &Gtp2Message,
        peer: SocketAddr,
    ) -> SimResult<()> {
        let pdn_index = self.curr_pdn.ok_or(SimError::PdnMissing)?;
        let ctun_teid = self.pdns[pdn_index].ctun_teid;
        let msg_type = msg.msg_type();

        if msg_type == CS_REQ || msg_type == CS_RSP {
            let fteid = msg.sender_fteid()?;
            let tunnel = ctx
                .tunnels
                .get_mut(&ctun_teid)
                .ok_or(SimError::CtunMissing(ctun_teid))?;
            tunnel.remote_teid = fteid.teid;
        }

        let tunnel = ctx
            .tunnels
            .get_mut(&ctun_teid)
            .ok_or(SimError::CtunMissing(ctun_teid))?;
        tunnel.peer_ep = peer;

        if msg_type == CS_REQ {
            self.create_bearers(ctx, msg)?;
        }
        Ok(())
    }

    /// Mint bearers from the Bearer Context IEs of a
    /// Create-Session-Request (template or inbound)
    fn create_bearers(&mut self, ctx: &mut SimContext, msg: &Gtp2Message) -> SimResult<()> {
        if msg.msg_type() != CS_REQ {
            return Ok(());
        }
        let pdn_index = self.curr_pdn.ok_or(SimError::PdnMissing)?;

        let count = msg.ie_count(Gtp2IeType::BearerContext as u8, 0);
        for i in 1..=count {
            let ie = msg
                .ie(Gtp2IeType::BearerContext as u8, 0, i)
                .ok_or(SimError::Codec(gsim_gtp::GtpError::MissingMandatoryIe(
                    "Bearer Context",
                )))?;
            let bctx = Gtp2BearerContextIe::decode(&ie.value)?;
            let ebi = bctx.ebi()?;
            let Some(index) = ebi.checked_sub(GTP_MIN_EBI).map(usize::from) else {
                continue;
            };
            if index >= GTP_MAX_BEARERS {
                continue;
            }

            let remote_teid = bctx.gtpu_fteid(0).map(|f| f.teid).unwrap_or(0);
            if let Some(bearer) = self.bearer_mut(ebi) {
                bearer.utun_remote_teid = remote_teid;
                continue;
            }
            let bearer = Bearer {
                ebi,
                utun_local_teid: ctx.teid_pool.allocate()?,
                utun_remote_teid: remote_teid,
            };
            self.pdns[pdn_index].bearer_mask |= 1 << index;
            self.bearers[index] = Some(bearer);
        }
        Ok(())
    }

    /// Rewrite the header and session-bound IEs of an outbound message
    /// and encode it
    fn encode_out(
        &self,
        ctx: &SimContext,
        pdn_index: usize,
        msg: &mut Gtp2Message,
        seq: u32,
    ) -> SimResult<Bytes> {
        let ctun_teid = self.pdns[pdn_index].ctun_teid;
        let ctun = ctx
            .tunnels
            .get(&ctun_teid)
            .ok_or(SimError::CtunMissing(ctun_teid))?;

        msg.set_msg_hdr(ctun.remote_teid, seq);

        let msg_type = msg.msg_type();
        if msg_type == CS_REQ {
            msg.set_imsi(&self.imsi.to_imsi_ie());
        }
        if msg_type == CS_REQ || msg_type == CS_RSP {
            let local_ip = match ctun.local_ep.ip() {
                IpAddr::V4(ip) => ip.octets(),
                IpAddr::V6(_) => [0; 4],
            };
            msg.set_sender_fteid(sender_interface(ctx.cfg.node), ctun.local_teid, local_ip);
        }

        // the GTP-U TEID of every bearer context carrying one becomes
        // the bearer's local user-plane TEID
        let count = msg.ie_count(Gtp2IeType::BearerContext as u8, 0);
        for i in 1..=count {
            let value = match msg.ie(Gtp2IeType::BearerContext as u8, 0, i) {
                Some(ie) => ie.value.clone(),
                None => continue,
            };
            let mut bctx = Gtp2BearerContextIe::decode(&value)?;
            if bctx.gtpu_fteid(0).is_none() {
                continue;
            }
            let ebi = bctx.ebi()?;
            if let Some(bearer) = self.bearer(ebi) {
                bctx.set_gtpu_teid(bearer.utun_local_teid, 0)?;
                if let Some(ie) = msg.ie_mut(Gtp2IeType::BearerContext as u8, 0, i) {
                    ie.value = bctx.encode_value();
                }
            }
        }

        Ok(msg.encode().freeze())
    }

    // ------------------------------------------------------------------
    // Completion and dead-call
    // ------------------------------------------------------------------

    fn complete(&mut self, ctx: &mut SimContext) -> RunOutcome {
        log::debug!("Scenario end for UE, IMSI[{}]", self.imsi);

        ctx.stats.inc(StatKind::SessionsSucc);
        ctx.stats.dec(StatKind::Sessions);
        ctx.stats.inc(StatKind::DeadCalls);

        // linger long enough to answer delayed or retransmitted messages
        self.set_flag(FLAG_SCN_COMPLETE);
        self.wake_time = self.last_run_time + self.dead_call_wait;
        RunOutcome::Pause
    }

    fn handle_dead_call(&mut self, ctx: &mut SimContext, arg: Option<Datagram>) -> RunOutcome {
        let Some(data) = arg else {
            // grace period over
            ctx.stats.dec(StatKind::DeadCalls);
            self.release(ctx);
            return RunOutcome::Finished;
        };

        let mut bytes = data.buf.clone();
        if let Ok(msg) = Gtp2Message::decode(&mut bytes) {
            match msg_category(msg.msg_type()) {
                Gtp2MsgCategory::Request if self.is_prev_proc_req(&msg) => {
                    self.bump_prev_retrans();
                    if let Some(sent) = &self.prev_proc.sent_msg {
                        if let Err(e) =
                            ctx.transport
                                .send_msg(sent.conn_id, sent.peer_ep, sent.buf.clone())
                        {
                            log::error!("Dead-call reply send failed: {e}");
                        }
                    }
                }
                Gtp2MsgCategory::Response if self.is_prev_proc_rsp(&msg) => {
                    self.bump_prev_retrans();
                }
                _ => {}
            }
        }
        // keep waiting for the dead-call deadline
        RunOutcome::Pause
    }
}

impl Task<SimContext> for UeSession {
    fn run(&mut self, ctx: &mut SimContext, arg: Option<Datagram>) -> RunOutcome {
        self.step(ctx, arg)
    }

    fn wake_time(&self) -> u64 {
        self.wake_time
    }
}

fn sender_interface(node: NodeType) -> u8 {
    match node {
        NodeType::Mme => fteid_interface::S11_MME_GTP_C,
        NodeType::Sgw => fteid_interface::S11_S4_SGW_GTP_C,
        NodeType::Pgw => fteid_interface::S5_S8_PGW_GTP_C,
    }
}
