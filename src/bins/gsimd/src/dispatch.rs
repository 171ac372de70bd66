//! Inbound datagram dispatch
//!
//! Routes a received datagram to its owning UE session: by the header
//! TEID when present (looked up through the control-tunnel registry), or
//! by the IMSI IE for zero-TEID initial requests. When the simulator is
//! the terminating side, an initial Create-Session-Request for an
//! unknown IMSI creates the session.

use bytes::Bytes;

use gsim_core::sched::Scheduler;
use gsim_core::transport::Datagram;
use gsim_gtp::header::{msg_category, Gtp2Header, Gtp2MessageType, Gtp2MsgCategory};
use gsim_gtp::message::Gtp2Message;

use crate::context::{ImsiKey, SimContext};
use crate::session::UeSession;

/// Resolve the owning session of a datagram and deliver it as that
/// session's next run argument. Unresolvable datagrams are dropped and
/// counted.
pub fn dispatch(
    sched: &mut Scheduler<SimContext>,
    ctx: &mut SimContext,
    dgram: Datagram,
    now: u64,
) {
    let mut peek = dgram.buf.clone();
    let header = match Gtp2Header::decode(&mut peek) {
        Ok(header) => header,
        Err(e) => {
            log::debug!("Dropping undecodable datagram from {}: {e}", dgram.peer);
            ctx.unmatched_datagrams += 1;
            return;
        }
    };

    match header.teid.filter(|teid| *teid != 0) {
        Some(teid) => match ctx.session_by_teid(teid) {
            Some(id) => sched.deliver(id, ctx, dgram, now),
            None => {
                log::debug!("No session for TEID {teid}, dropping");
                ctx.unmatched_datagrams += 1;
            }
        },
        None => dispatch_by_imsi(sched, ctx, dgram, now),
    }
}

/// Zero-TEID datagrams are initial requests keyed by their IMSI IE
fn dispatch_by_imsi(
    sched: &mut Scheduler<SimContext>,
    ctx: &mut SimContext,
    dgram: Datagram,
    now: u64,
) {
    let imsi = match decode_imsi(&dgram.buf) {
        Some(imsi) => imsi,
        None => {
            log::debug!("Initial request without IMSI from {}, dropping", dgram.peer);
            ctx.unmatched_datagrams += 1;
            return;
        }
    };

    if let Some(id) = ctx.session_by_imsi(imsi) {
        sched.deliver(id, ctx, dgram, now);
        return;
    }

    // the peer originates against this simulator: create the UE session
    // the initial request is destined to
    let accepts_initial = !ctx.scenario.is_originating()
        && is_initial_request(&dgram.buf);
    if accepts_initial {
        let id = UeSession::spawn(sched, ctx, imsi);
        sched.deliver(id, ctx, dgram, now);
    } else {
        log::debug!("No session for IMSI[{imsi}], dropping");
        ctx.unmatched_datagrams += 1;
    }
}

fn decode_imsi(buf: &Bytes) -> Option<ImsiKey> {
    let mut bytes = buf.clone();
    let msg = Gtp2Message::decode(&mut bytes).ok()?;
    let imsi = msg.imsi().ok()?;
    Some(ImsiKey(imsi.value))
}

fn is_initial_request(buf: &Bytes) -> bool {
    let mut bytes = buf.clone();
    match Gtp2Header::decode(&mut bytes) {
        Ok(header) => {
            header.message_type == Gtp2MessageType::CreateSessionRequest as u8
                && msg_category(header.message_type) == Gtp2MsgCategory::Request
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use gsim_core::config::{Config, NodeType};
    use gsim_core::transport::LoopTransport;
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn peer() -> SocketAddr {
        "198.51.100.10:2123".parse().unwrap()
    }

    fn responder_ctx() -> SimContext {
        let cfg = Config {
            node: NodeType::Sgw,
            ..Config::default()
        };
        let scenario = Arc::new(Scenario::default_for(NodeType::Sgw, &cfg));
        let (transport, _handle) = LoopTransport::new();
        SimContext::new(cfg, scenario, Box::new(transport))
    }

    #[test]
    fn test_garbage_datagram_is_counted_and_dropped() {
        let mut sched: Scheduler<SimContext> = Scheduler::new(1024);
        let mut ctx = responder_ctx();

        dispatch(
            &mut sched,
            &mut ctx,
            Datagram {
                conn_id: 0,
                peer: peer(),
                buf: Bytes::from_static(&[0xFF, 0x01]),
            },
            0,
        );
        assert_eq!(ctx.unmatched_datagrams, 1);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_initial_cs_req_creates_session() {
        let mut sched: Scheduler<SimContext> = Scheduler::new(1024);
        let mut ctx = responder_ctx();

        let mut msg = crate::msg_build::build_create_session_request(&ctx.cfg);
        msg.set_msg_hdr(0, 1);
        msg.header.teid = Some(0);
        msg.set_imsi(&ImsiKey::from_u64(404).to_imsi_ie());

        dispatch(
            &mut sched,
            &mut ctx,
            Datagram {
                conn_id: 0,
                peer: peer(),
                buf: msg.encode().freeze(),
            },
            0,
        );

        assert_eq!(sched.len(), 1);
        assert!(ctx.session_by_imsi(ImsiKey::from_u64(404)).is_some());
    }

    #[test]
    fn test_unknown_teid_dropped() {
        let mut sched: Scheduler<SimContext> = Scheduler::new(1024);
        let mut ctx = responder_ctx();

        let mut msg = crate::msg_build::build_modify_bearer_request(&ctx.cfg);
        msg.set_msg_hdr(0xDEAD, 2);

        dispatch(
            &mut sched,
            &mut ctx,
            Datagram {
                conn_id: 0,
                peer: peer(),
                buf: msg.encode().freeze(),
            },
            0,
        );
        assert_eq!(ctx.unmatched_datagrams, 1);
        assert!(sched.is_empty());
    }
}
