//! GTPv2-C codec for the gsim load simulator
//!
//! Message and Information Element building/parsing for the GPRS Tunneling
//! Protocol control plane as specified in 3GPP TS 29.274.

pub mod error;
pub mod header;
pub mod ie;
pub mod message;
pub mod teid_pool;

pub use error::{GtpError, GtpResult};
pub use header::{Gtp2Header, Gtp2MessageType, Gtp2MsgCategory};
pub use message::Gtp2Message;
pub use teid_pool::TeidPool;

/// GTPv2-C UDP port (2123)
pub const GTPV2_C_UDP_PORT: u16 = 2123;

/// Lowest valid EPS Bearer Identity
pub const GTP_MIN_EBI: u8 = 5;

/// Highest valid EPS Bearer Identity
pub const GTP_MAX_EBI: u8 = 15;

/// Number of bearers a UE session can hold (EBI 5..15)
pub const GTP_MAX_BEARERS: usize = (GTP_MAX_EBI - GTP_MIN_EBI + 1) as usize;

/// F-TEID interface types (3GPP TS 29.274 table 8.22-1)
pub mod fteid_interface {
    /// S1-U eNodeB GTP-U
    pub const S1_U_ENB_GTP_U: u8 = 0;
    /// S1-U SGW GTP-U
    pub const S1_U_SGW_GTP_U: u8 = 1;
    /// S5/S8 SGW GTP-U
    pub const S5_S8_SGW_GTP_U: u8 = 4;
    /// S5/S8 PGW GTP-U
    pub const S5_S8_PGW_GTP_U: u8 = 5;
    /// S5/S8 SGW GTP-C
    pub const S5_S8_SGW_GTP_C: u8 = 6;
    /// S5/S8 PGW GTP-C
    pub const S5_S8_PGW_GTP_C: u8 = 7;
    /// S11 MME GTP-C
    pub const S11_MME_GTP_C: u8 = 10;
    /// S11/S4 SGW GTP-C
    pub const S11_S4_SGW_GTP_C: u8 = 11;
}
