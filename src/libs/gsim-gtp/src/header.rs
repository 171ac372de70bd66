//! GTPv2-C Header
//!
//! Header structure and message-type classification as specified in
//! 3GPP TS 29.274.

use crate::error::{GtpError, GtpResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// GTPv2-C header length (with TEID)
pub const GTPV2C_HEADER_LEN: usize = 12;

/// GTPv2-C header length (without TEID)
pub const GTPV2C_HEADER_LEN_NO_TEID: usize = 8;

/// GTPv2-C Message Types scripted by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Gtp2MessageType {
    EchoRequest = 1,
    EchoResponse = 2,
    CreateSessionRequest = 32,
    CreateSessionResponse = 33,
    ModifyBearerRequest = 34,
    ModifyBearerResponse = 35,
    DeleteSessionRequest = 36,
    DeleteSessionResponse = 37,
    CreateBearerRequest = 95,
    CreateBearerResponse = 96,
    UpdateBearerRequest = 97,
    UpdateBearerResponse = 98,
    DeleteBearerRequest = 99,
    DeleteBearerResponse = 100,
    ReleaseAccessBearersRequest = 170,
    ReleaseAccessBearersResponse = 171,
    DownlinkDataNotification = 176,
    DownlinkDataNotificationAcknowledge = 177,
}

impl TryFrom<u8> for Gtp2MessageType {
    type Error = GtpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::EchoRequest),
            2 => Ok(Self::EchoResponse),
            32 => Ok(Self::CreateSessionRequest),
            33 => Ok(Self::CreateSessionResponse),
            34 => Ok(Self::ModifyBearerRequest),
            35 => Ok(Self::ModifyBearerResponse),
            36 => Ok(Self::DeleteSessionRequest),
            37 => Ok(Self::DeleteSessionResponse),
            95 => Ok(Self::CreateBearerRequest),
            96 => Ok(Self::CreateBearerResponse),
            97 => Ok(Self::UpdateBearerRequest),
            98 => Ok(Self::UpdateBearerResponse),
            99 => Ok(Self::DeleteBearerRequest),
            100 => Ok(Self::DeleteBearerResponse),
            170 => Ok(Self::ReleaseAccessBearersRequest),
            171 => Ok(Self::ReleaseAccessBearersResponse),
            176 => Ok(Self::DownlinkDataNotification),
            177 => Ok(Self::DownlinkDataNotificationAcknowledge),
            _ => Err(GtpError::InvalidMessageType(value)),
        }
    }
}

/// Message category used by the session state machine to pick the
/// request or response handling path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gtp2MsgCategory {
    Request,
    Response,
    Other,
}

impl Gtp2MessageType {
    /// Classify this message type as request, response or other
    pub fn category(&self) -> Gtp2MsgCategory {
        match self {
            Self::EchoRequest
            | Self::CreateSessionRequest
            | Self::ModifyBearerRequest
            | Self::DeleteSessionRequest
            | Self::CreateBearerRequest
            | Self::UpdateBearerRequest
            | Self::DeleteBearerRequest
            | Self::ReleaseAccessBearersRequest
            | Self::DownlinkDataNotification => Gtp2MsgCategory::Request,
            Self::EchoResponse
            | Self::CreateSessionResponse
            | Self::ModifyBearerResponse
            | Self::DeleteSessionResponse
            | Self::CreateBearerResponse
            | Self::UpdateBearerResponse
            | Self::DeleteBearerResponse
            | Self::ReleaseAccessBearersResponse
            | Self::DownlinkDataNotificationAcknowledge => Gtp2MsgCategory::Response,
        }
    }

    /// Display name of the message type
    pub fn name(&self) -> &'static str {
        match self {
            Self::EchoRequest => "Echo-Request",
            Self::EchoResponse => "Echo-Response",
            Self::CreateSessionRequest => "Create-Session-Request",
            Self::CreateSessionResponse => "Create-Session-Response",
            Self::ModifyBearerRequest => "Modify-Bearer-Request",
            Self::ModifyBearerResponse => "Modify-Bearer-Response",
            Self::DeleteSessionRequest => "Delete-Session-Request",
            Self::DeleteSessionResponse => "Delete-Session-Response",
            Self::CreateBearerRequest => "Create-Bearer-Request",
            Self::CreateBearerResponse => "Create-Bearer-Response",
            Self::UpdateBearerRequest => "Update-Bearer-Request",
            Self::UpdateBearerResponse => "Update-Bearer-Response",
            Self::DeleteBearerRequest => "Delete-Bearer-Request",
            Self::DeleteBearerResponse => "Delete-Bearer-Response",
            Self::ReleaseAccessBearersRequest => "Release-Access-Bearers-Request",
            Self::ReleaseAccessBearersResponse => "Release-Access-Bearers-Response",
            Self::DownlinkDataNotification => "Downlink-Data-Notification",
            Self::DownlinkDataNotificationAcknowledge => "Downlink-Data-Notification-Ack",
        }
    }
}

/// Classify a raw message-type octet; unknown types classify as `Other`
pub fn msg_category(msg_type: u8) -> Gtp2MsgCategory {
    Gtp2MessageType::try_from(msg_type)
        .map(|t| t.category())
        .unwrap_or(Gtp2MsgCategory::Other)
}

/// Display name for a raw message-type octet
pub fn msg_name(msg_type: u8) -> &'static str {
    Gtp2MessageType::try_from(msg_type)
        .map(|t| t.name())
        .unwrap_or("Unknown")
}

/// GTPv2-C Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2Header {
    /// Version (3 bits) - always 2 for GTPv2
    pub version: u8,
    /// Piggybacked flag (1 bit)
    pub piggybacked: bool,
    /// TEID presence flag (1 bit)
    pub teid_presence: bool,
    /// Message Type
    pub message_type: u8,
    /// Message Length (excluding first 4 bytes of header)
    pub length: u16,
    /// Tunnel Endpoint Identifier (present if teid_presence)
    pub teid: Option<u32>,
    /// Sequence Number (24 bits)
    pub sequence_number: u32,
}

impl Default for Gtp2Header {
    fn default() -> Self {
        Self {
            version: 2,
            piggybacked: false,
            teid_presence: true,
            message_type: 0,
            length: 0,
            teid: Some(0),
            sequence_number: 0,
        }
    }
}

impl Gtp2Header {
    /// Create a new header with TEID
    pub fn new(message_type: u8, teid: u32, sequence_number: u32) -> Self {
        Self {
            version: 2,
            piggybacked: false,
            teid_presence: true,
            message_type,
            length: 0,
            teid: Some(teid),
            sequence_number,
        }
    }

    /// Create a new header without TEID
    pub fn new_no_teid(message_type: u8, sequence_number: u32) -> Self {
        Self {
            version: 2,
            piggybacked: false,
            teid_presence: false,
            message_type,
            length: 0,
            teid: None,
            sequence_number,
        }
    }

    /// Get the flags byte
    pub fn flags(&self) -> u8 {
        let mut flags = (self.version & 0x07) << 5;
        if self.piggybacked {
            flags |= 0x10;
        }
        if self.teid_presence {
            flags |= 0x08;
        }
        flags
    }

    /// Get header length
    pub fn header_len(&self) -> usize {
        if self.teid_presence {
            GTPV2C_HEADER_LEN
        } else {
            GTPV2C_HEADER_LEN_NO_TEID
        }
    }

    /// Encode header to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags());
        buf.put_u8(self.message_type);
        buf.put_u16(self.length);

        if self.teid_presence {
            buf.put_u32(self.teid.unwrap_or(0));
        }

        // Sequence number (24 bits) + spare (8 bits)
        buf.put_u32(self.sequence_number << 8);
    }

    /// Decode header from bytes
    pub fn decode(buf: &mut Bytes) -> GtpResult<Self> {
        if buf.remaining() < 4 {
            return Err(GtpError::BufferTooShort {
                needed: 4,
                available: buf.remaining(),
            });
        }

        let flags = buf.get_u8();
        let version = (flags >> 5) & 0x07;
        let piggybacked = (flags & 0x10) != 0;
        let teid_presence = (flags & 0x08) != 0;

        let message_type = buf.get_u8();
        let length = buf.get_u16();

        if version != 2 {
            return Err(GtpError::InvalidVersion(version));
        }

        let min_remaining = if teid_presence { 8 } else { 4 };
        if buf.remaining() < min_remaining {
            return Err(GtpError::BufferTooShort {
                needed: min_remaining,
                available: buf.remaining(),
            });
        }

        let teid = if teid_presence {
            Some(buf.get_u32())
        } else {
            None
        };

        // Sequence number is the upper 24 bits of the trailing u32
        let sqn_raw = buf.get_u32();
        let sequence_number = sqn_raw >> 8;

        Ok(Self {
            version,
            piggybacked,
            teid_presence,
            message_type,
            length,
            teid,
            sequence_number,
        })
    }
}
