//! Scenario message templates
//!
//! Authors the GTPv2-C template messages the scenario steps send. Session
//! state (header TEID, sequence number, IMSI, sender F-TEID, per-bearer
//! GTP-U TEIDs) is rewritten per send by the session state machine; the
//! templates carry placeholders for those fields.

use gsim_core::config::Config;
use gsim_gtp::fteid_interface;
use gsim_gtp::header::{Gtp2Header, Gtp2MessageType};
use gsim_gtp::ie::{
    Gtp2AmbrIe, Gtp2ApnIe, Gtp2BearerContextIe, Gtp2BearerQosIe, Gtp2CauseIe, Gtp2EbiIe,
    Gtp2FTeidIe, Gtp2Ie, Gtp2ImsiIe, Gtp2RatTypeIe, Gtp2RecoveryIe,
};
use gsim_gtp::message::Gtp2Message;
use gsim_gtp::GTP_MIN_EBI;

/// Default QCI for the default bearer
const DEFAULT_QCI: u8 = 9;

fn local_ipv4(cfg: &Config) -> [u8; 4] {
    cfg.local_ip.octets()
}

fn simple_ie<F: FnOnce(&mut bytes::BytesMut)>(encode: F) -> Gtp2Ie {
    let mut buf = bytes::BytesMut::new();
    encode(&mut buf);
    // strip the TLIV prologue the typed encoders write
    let value = buf.split_off(4).freeze();
    Gtp2Ie::new(buf[0], buf[3], value)
}

fn ebi_ie(ebi: u8, instance: u8) -> Gtp2Ie {
    simple_ie(|buf| Gtp2EbiIe::new(ebi).encode(buf, instance))
}

fn cause_ie(instance: u8) -> Gtp2Ie {
    simple_ie(|buf| Gtp2CauseIe::accepted().encode(buf, instance))
}

fn recovery_ie() -> Gtp2Ie {
    simple_ie(|buf| Gtp2RecoveryIe::new(0).encode(buf, 0))
}

fn default_bearer_context(cfg: &Config, gtpu_interface: u8, with_qos: bool) -> Gtp2Ie {
    let mut bctx = Gtp2BearerContextIe::new();
    bctx.add_ie(ebi_ie(GTP_MIN_EBI, 0));
    if with_qos {
        bctx.add_ie(Gtp2BearerQosIe::new(DEFAULT_QCI).to_ie(0));
    }
    // GTP-U TEID placeholder, rewritten per bearer at send time
    bctx.add_ie(Gtp2FTeidIe::new_ipv4(gtpu_interface, 0, local_ipv4(cfg)).to_ie(0));
    bctx.to_ie(0)
}

/// Build a Create-Session-Request template
pub fn build_create_session_request(cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::CreateSessionRequest as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);

    msg.set_imsi(&Gtp2ImsiIe::new([0u8; 8]));
    msg.add_ie(simple_ie(|buf| {
        Gtp2RatTypeIe::new(Gtp2RatTypeIe::EUTRAN).encode(buf, 0)
    }));
    msg.set_sender_fteid(fteid_interface::S11_MME_GTP_C, 0, local_ipv4(cfg));
    msg.add_ie(simple_ie(|buf| {
        Gtp2ApnIe::from_string(&cfg.apn).encode(buf, 0)
    }));
    msg.add_ie(simple_ie(|buf| {
        Gtp2AmbrIe::new(1_000_000, 1_000_000).encode(buf, 0)
    }));
    msg.add_ie(default_bearer_context(
        cfg,
        fteid_interface::S1_U_ENB_GTP_U,
        true,
    ));
    msg.add_ie(recovery_ie());
    msg
}

/// Build a Create-Session-Response template
pub fn build_create_session_response(cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::CreateSessionResponse as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);

    msg.add_ie(cause_ie(0));
    msg.set_sender_fteid(fteid_interface::S11_S4_SGW_GTP_C, 0, local_ipv4(cfg));

    let mut bctx = Gtp2BearerContextIe::new();
    bctx.add_ie(ebi_ie(GTP_MIN_EBI, 0));
    bctx.add_ie(cause_ie(0));
    bctx.add_ie(Gtp2FTeidIe::new_ipv4(fteid_interface::S1_U_SGW_GTP_U, 0, local_ipv4(cfg)).to_ie(0));
    msg.add_ie(bctx.to_ie(0));
    msg.add_ie(recovery_ie());
    msg
}

/// Build a Modify-Bearer-Request template
pub fn build_modify_bearer_request(cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::ModifyBearerRequest as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);
    msg.add_ie(default_bearer_context(
        cfg,
        fteid_interface::S1_U_ENB_GTP_U,
        false,
    ));
    msg
}

/// Build a Modify-Bearer-Response template
pub fn build_modify_bearer_response(cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::ModifyBearerResponse as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);
    msg.add_ie(cause_ie(0));

    let mut bctx = Gtp2BearerContextIe::new();
    bctx.add_ie(ebi_ie(GTP_MIN_EBI, 0));
    bctx.add_ie(cause_ie(0));
    msg.add_ie(bctx.to_ie(0));
    msg
}

/// Build a Delete-Session-Request template
pub fn build_delete_session_request(_cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::DeleteSessionRequest as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);
    // linked EBI of the default bearer
    msg.add_ie(ebi_ie(GTP_MIN_EBI, 0));
    msg
}

/// Build a Delete-Session-Response template
pub fn build_delete_session_response(_cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::DeleteSessionResponse as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);
    msg.add_ie(cause_ie(0));
    msg
}

/// Build a Create-Bearer-Request template (dedicated-bearer procedures)
pub fn build_create_bearer_request(cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::CreateBearerRequest as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);
    // linked EBI of the default bearer
    msg.add_ie(ebi_ie(GTP_MIN_EBI, 0));

    let mut bctx = Gtp2BearerContextIe::new();
    bctx.add_ie(ebi_ie(GTP_MIN_EBI + 1, 0));
    bctx.add_ie(Gtp2BearerQosIe::new(DEFAULT_QCI).to_ie(0));
    bctx.add_ie(
        Gtp2FTeidIe::new_ipv4(fteid_interface::S5_S8_SGW_GTP_U, 0, local_ipv4(cfg)).to_ie(0),
    );
    msg.add_ie(bctx.to_ie(0));
    msg
}

/// Build a Create-Bearer-Response template
pub fn build_create_bearer_response(_cfg: &Config) -> Gtp2Message {
    let header = Gtp2Header::new(Gtp2MessageType::CreateBearerResponse as u8, 0, 0);
    let mut msg = Gtp2Message::new(header);
    msg.add_ie(cause_ie(0));

    let mut bctx = Gtp2BearerContextIe::new();
    bctx.add_ie(ebi_ie(GTP_MIN_EBI + 1, 0));
    bctx.add_ie(cause_ie(0));
    msg.add_ie(bctx.to_ie(0));
    msg
}

/// Template for a message type, if the simulator can author one
pub fn template(msg_type: Gtp2MessageType, cfg: &Config) -> Option<Gtp2Message> {
    match msg_type {
        Gtp2MessageType::CreateSessionRequest => Some(build_create_session_request(cfg)),
        Gtp2MessageType::CreateSessionResponse => Some(build_create_session_response(cfg)),
        Gtp2MessageType::ModifyBearerRequest => Some(build_modify_bearer_request(cfg)),
        Gtp2MessageType::ModifyBearerResponse => Some(build_modify_bearer_response(cfg)),
        Gtp2MessageType::DeleteSessionRequest => Some(build_delete_session_request(cfg)),
        Gtp2MessageType::DeleteSessionResponse => Some(build_delete_session_response(cfg)),
        Gtp2MessageType::CreateBearerRequest => Some(build_create_bearer_request(cfg)),
        Gtp2MessageType::CreateBearerResponse => Some(build_create_bearer_response(cfg)),
        _ => None,
    }
}
