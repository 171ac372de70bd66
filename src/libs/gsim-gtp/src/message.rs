//! GTPv2-C Messages
//!
//! A message is a header plus an ordered IE list. The simulator authors
//! every outbound message from a scenario template and rewrites only the
//! fields the protocol requires to vary per session: header TEID,
//! sequence number, IMSI, sender F-TEID and per-bearer GTP-U TEIDs.
//! Unknown IEs ride along untouched.

use crate::error::{GtpError, GtpResult};
use crate::header::Gtp2Header;
use crate::ie::{Gtp2FTeidIe, Gtp2Ie, Gtp2IeType, Gtp2ImsiIe};
use bytes::{Buf, Bytes, BytesMut};

/// GTPv2-C Message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2Message {
    /// Message header
    pub header: Gtp2Header,
    /// Information Elements, in wire order
    pub ies: Vec<Gtp2Ie>,
}

impl Gtp2Message {
    /// Create a new message
    pub fn new(header: Gtp2Header) -> Self {
        Self {
            header,
            ies: Vec::new(),
        }
    }

    /// Message type octet
    pub fn msg_type(&self) -> u8 {
        self.header.message_type
    }

    /// Header sequence number
    pub fn sequence_number(&self) -> u32 {
        self.header.sequence_number
    }

    /// Header TEID (0 when absent)
    pub fn teid(&self) -> u32 {
        self.header.teid.unwrap_or(0)
    }

    /// Add an IE to the message
    pub fn add_ie(&mut self, ie: Gtp2Ie) {
        self.ies.push(ie);
    }

    /// Get the index-th IE of (type, instance); index is 1-based
    pub fn ie(&self, ie_type: u8, instance: u8, index: usize) -> Option<&Gtp2Ie> {
        self.ies
            .iter()
            .filter(|ie| ie.ie_type == ie_type && ie.instance == instance)
            .nth(index.checked_sub(1)?)
    }

    /// Mutable access to the index-th IE of (type, instance); 1-based
    pub fn ie_mut(&mut self, ie_type: u8, instance: u8, index: usize) -> Option<&mut Gtp2Ie> {
        self.ies
            .iter_mut()
            .filter(|ie| ie.ie_type == ie_type && ie.instance == instance)
            .nth(index.checked_sub(1)?)
    }

    /// Count the IEs of (type, instance)
    pub fn ie_count(&self, ie_type: u8, instance: u8) -> usize {
        self.ies
            .iter()
            .filter(|ie| ie.ie_type == ie_type && ie.instance == instance)
            .count()
    }

    /// Rewrite the header TEID and sequence number for this send
    pub fn set_msg_hdr(&mut self, teid: u32, sequence_number: u32) {
        self.header.teid_presence = true;
        self.header.teid = Some(teid);
        self.header.sequence_number = sequence_number;
    }

    /// Insert or replace the IMSI IE (instance 0)
    pub fn set_imsi(&mut self, imsi: &Gtp2ImsiIe) {
        let value = Bytes::copy_from_slice(&imsi.value);
        match self.ie_mut(Gtp2IeType::Imsi as u8, 0, 1) {
            Some(ie) => ie.value = value,
            None => self
                .ies
                .push(Gtp2Ie::new(Gtp2IeType::Imsi as u8, 0, value)),
        }
    }

    /// Insert or replace the sender F-TEID IE (instance 0)
    pub fn set_sender_fteid(&mut self, interface_type: u8, teid: u32, ipv4: [u8; 4]) {
        let fteid = Gtp2FTeidIe::new_ipv4(interface_type, teid, ipv4);
        let new_ie = fteid.to_ie(0);
        match self.ie_mut(Gtp2IeType::FTeid as u8, 0, 1) {
            Some(ie) => ie.value = new_ie.value,
            None => self.ies.push(new_ie),
        }
    }

    /// IMSI IE of the message, if present
    pub fn imsi(&self) -> GtpResult<Gtp2ImsiIe> {
        let ie = self
            .ie(Gtp2IeType::Imsi as u8, 0, 1)
            .ok_or(GtpError::MissingMandatoryIe("IMSI"))?;
        Gtp2ImsiIe::decode(&ie.value)
    }

    /// Sender F-TEID (instance 0), if present
    pub fn sender_fteid(&self) -> GtpResult<Gtp2FTeidIe> {
        let ie = self
            .ie(Gtp2IeType::FTeid as u8, 0, 1)
            .ok_or(GtpError::MissingMandatoryIe("F-TEID"))?;
        Gtp2FTeidIe::decode(&ie.value)
    }

    /// Message length field: header tail plus all IEs
    fn calculate_length(&self) -> u16 {
        let mut length = if self.header.teid_presence { 8 } else { 4 };
        for ie in &self.ies {
            length += ie.encoded_len() as u16;
        }
        length
    }

    /// Encode message to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();

        let mut header = self.header.clone();
        header.length = self.calculate_length();
        header.encode(&mut buf);

        for ie in &self.ies {
            ie.encode(&mut buf);
        }

        buf
    }

    /// Decode message from bytes
    pub fn decode(buf: &mut Bytes) -> GtpResult<Self> {
        let header = Gtp2Header::decode(buf)?;

        let mut msg = Self::new(header.clone());

        let header_extra = if header.teid_presence { 8 } else { 4 };
        let payload_len = (header.length as usize).saturating_sub(header_extra);

        if buf.remaining() < payload_len {
            return Err(GtpError::BufferTooShort {
                needed: payload_len,
                available: buf.remaining(),
            });
        }

        let mut remaining = payload_len;
        while remaining > 0 && buf.remaining() > 0 {
            let start_pos = buf.remaining();
            let ie = Gtp2Ie::decode(buf)?;
            let consumed = start_pos - buf.remaining();
            remaining = remaining.saturating_sub(consumed);
            msg.ies.push(ie);
        }

        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Gtp2MessageType;
    use crate::ie::Gtp2RecoveryIe;

    fn sample_message() -> Gtp2Message {
        let header = Gtp2Header::new(Gtp2MessageType::CreateSessionRequest as u8, 0, 0);
        let mut msg = Gtp2Message::new(header);
        let mut buf = BytesMut::new();
        Gtp2RecoveryIe::new(42).encode(&mut buf, 0);
        let mut bytes = buf.freeze();
        msg.add_ie(Gtp2Ie::decode(&mut bytes).unwrap());
        msg
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut msg = sample_message();
        msg.set_msg_hdr(0x12345678, 0x42);
        msg.set_imsi(&Gtp2ImsiIe::from_u64(1010000000001));
        msg.set_sender_fteid(10, 0xABCD, [10, 0, 0, 1]);

        let encoded = msg.encode();
        let mut bytes = encoded.freeze();
        let decoded = Gtp2Message::decode(&mut bytes).unwrap();

        assert_eq!(decoded.msg_type(), Gtp2MessageType::CreateSessionRequest as u8);
        assert_eq!(decoded.teid(), 0x12345678);
        assert_eq!(decoded.sequence_number(), 0x42);
        assert_eq!(decoded.imsi().unwrap(), Gtp2ImsiIe::from_u64(1010000000001));

        let fteid = decoded.sender_fteid().unwrap();
        assert_eq!(fteid.teid, 0xABCD);
        assert_eq!(fteid.interface_type, 10);
    }

    #[test]
    fn test_set_imsi_replaces_in_place() {
        let mut msg = sample_message();
        msg.set_imsi(&Gtp2ImsiIe::from_u64(1));
        msg.set_imsi(&Gtp2ImsiIe::from_u64(2));
        assert_eq!(msg.ie_count(Gtp2IeType::Imsi as u8, 0), 1);
        assert_eq!(msg.imsi().unwrap(), Gtp2ImsiIe::from_u64(2));
    }

    #[test]
    fn test_ie_indexing_one_based() {
        let mut msg = sample_message();
        msg.add_ie(Gtp2Ie::from_slice(Gtp2IeType::BearerContext as u8, 0, &[1]));
        msg.add_ie(Gtp2Ie::from_slice(Gtp2IeType::BearerContext as u8, 0, &[2]));

        assert_eq!(msg.ie_count(Gtp2IeType::BearerContext as u8, 0), 2);
        assert_eq!(
            msg.ie(Gtp2IeType::BearerContext as u8, 0, 1).unwrap().value[0],
            1
        );
        assert_eq!(
            msg.ie(Gtp2IeType::BearerContext as u8, 0, 2).unwrap().value[0],
            2
        );
        assert!(msg.ie(Gtp2IeType::BearerContext as u8, 0, 3).is_none());
        assert!(msg.ie(Gtp2IeType::BearerContext as u8, 0, 0).is_none());
    }

    #[test]
    fn test_unknown_ie_preserved() {
        let mut msg = sample_message();
        msg.add_ie(Gtp2Ie::from_slice(200, 3, &[0xDE, 0xAD]));

        let encoded = msg.encode();
        let mut bytes = encoded.freeze();
        let decoded = Gtp2Message::decode(&mut bytes).unwrap();

        let opaque = decoded.ie(200, 3, 1).unwrap();
        assert_eq!(&opaque.value[..], &[0xDE, 0xAD]);
    }
}
