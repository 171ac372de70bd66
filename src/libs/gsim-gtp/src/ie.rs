//! GTPv2 Information Elements
//!
//! Generic TLIV encoding plus typed views for the IEs the simulator
//! rewrites: IMSI, F-TEID and the grouped Bearer Context. Every other IE
//! travels through the codec as an opaque payload.

use crate::error::{GtpError, GtpResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// GTPv2 IE Types used by the simulator's scenario templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Gtp2IeType {
    Imsi = 1,
    Cause = 2,
    Recovery = 3,
    Apn = 71,
    Ambr = 72,
    Ebi = 73,
    RatType = 82,
    FTeid = 87,
    BearerContext = 93,
    BearerQos = 80,
}

/// Cause value: Request accepted (3GPP TS 29.274 table 8.4-1)
pub const GTP2_CAUSE_REQUEST_ACCEPTED: u8 = 16;

/// Generic GTPv2 Information Element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2Ie {
    /// IE Type
    pub ie_type: u8,
    /// IE Instance (4 bits)
    pub instance: u8,
    /// IE Value (raw bytes)
    pub value: Bytes,
}

impl Gtp2Ie {
    /// Create a new IE
    pub fn new(ie_type: u8, instance: u8, value: Bytes) -> Self {
        Self {
            ie_type,
            instance: instance & 0x0F,
            value,
        }
    }

    /// Create a new IE from slice
    pub fn from_slice(ie_type: u8, instance: u8, value: &[u8]) -> Self {
        Self {
            ie_type,
            instance: instance & 0x0F,
            value: Bytes::copy_from_slice(value),
        }
    }

    /// Encode IE to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.ie_type);
        buf.put_u16(self.value.len() as u16);
        buf.put_u8(self.instance & 0x0F);
        buf.put_slice(&self.value);
    }

    /// Decode IE from bytes
    pub fn decode(buf: &mut Bytes) -> GtpResult<Self> {
        if buf.remaining() < 4 {
            return Err(GtpError::BufferTooShort {
                needed: 4,
                available: buf.remaining(),
            });
        }

        let ie_type = buf.get_u8();
        let length = buf.get_u16() as usize;
        let instance = buf.get_u8() & 0x0F;

        if buf.remaining() < length {
            return Err(GtpError::BufferTooShort {
                needed: length,
                available: buf.remaining(),
            });
        }

        let value = buf.copy_to_bytes(length);
        Ok(Self {
            ie_type,
            instance,
            value,
        })
    }

    /// Get encoded length: Type(1) + Length(2) + Instance(1) + Value
    pub fn encoded_len(&self) -> usize {
        4 + self.value.len()
    }
}

/// IMSI IE, BCD-encoded into 8 octets (the UE-permanent session key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gtp2ImsiIe {
    pub value: [u8; 8],
}

impl Gtp2ImsiIe {
    pub fn new(value: [u8; 8]) -> Self {
        Self { value }
    }

    /// BCD-encode a numeric IMSI into 8 octets, low nibble first,
    /// unused nibbles filled with 0xF
    pub fn from_u64(imsi: u64) -> Self {
        let digits = format!("{imsi:015}");
        let bytes = digits.as_bytes();
        let mut value = [0xFFu8; 8];
        for (i, pair) in bytes.chunks(2).enumerate() {
            let low = pair[0] - b'0';
            let high = if pair.len() > 1 { pair[1] - b'0' } else { 0x0F };
            value[i] = (high << 4) | low;
        }
        Self { value }
    }

    /// BCD string form, for logging
    pub fn to_bcd_string(&self) -> String {
        let mut out = String::new();
        for byte in &self.value {
            let low = byte & 0x0F;
            let high = (byte >> 4) & 0x0F;
            if low < 10 {
                out.push((b'0' + low) as char);
            }
            if high < 10 {
                out.push((b'0' + high) as char);
            }
        }
        out
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::Imsi as u8);
        buf.put_u16(8);
        buf.put_u8(instance & 0x0F);
        buf.put_slice(&self.value);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.len() < 8 {
            return Err(GtpError::BufferTooShort {
                needed: 8,
                available: value.len(),
            });
        }
        let mut v = [0u8; 8];
        v.copy_from_slice(&value[..8]);
        Ok(Self { value: v })
    }
}

/// EBI (EPS Bearer Identity) IE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gtp2EbiIe {
    pub ebi: u8,
}

impl Gtp2EbiIe {
    pub fn new(ebi: u8) -> Self {
        Self { ebi: ebi & 0x0F }
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::Ebi as u8);
        buf.put_u16(1);
        buf.put_u8(instance & 0x0F);
        buf.put_u8(self.ebi & 0x0F);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.is_empty() {
            return Err(GtpError::BufferTooShort {
                needed: 1,
                available: 0,
            });
        }
        Ok(Self {
            ebi: value[0] & 0x0F,
        })
    }
}

/// Recovery (restart counter) IE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gtp2RecoveryIe {
    pub restart_counter: u8,
}

impl Gtp2RecoveryIe {
    pub fn new(restart_counter: u8) -> Self {
        Self { restart_counter }
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::Recovery as u8);
        buf.put_u16(1);
        buf.put_u8(instance & 0x0F);
        buf.put_u8(self.restart_counter);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.is_empty() {
            return Err(GtpError::BufferTooShort {
                needed: 1,
                available: 0,
            });
        }
        Ok(Self {
            restart_counter: value[0],
        })
    }
}

/// RAT Type IE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gtp2RatTypeIe {
    pub rat_type: u8,
}

impl Gtp2RatTypeIe {
    /// EUTRAN RAT type value
    pub const EUTRAN: u8 = 6;

    pub fn new(rat_type: u8) -> Self {
        Self { rat_type }
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::RatType as u8);
        buf.put_u16(1);
        buf.put_u8(instance & 0x0F);
        buf.put_u8(self.rat_type);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.is_empty() {
            return Err(GtpError::BufferTooShort {
                needed: 1,
                available: 0,
            });
        }
        Ok(Self { rat_type: value[0] })
    }
}

/// Cause IE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gtp2CauseIe {
    pub cause: u8,
    pub pce: bool,
    pub bce: bool,
    pub cs: bool,
}

impl Gtp2CauseIe {
    pub fn new(cause: u8) -> Self {
        Self {
            cause,
            pce: false,
            bce: false,
            cs: false,
        }
    }

    pub fn accepted() -> Self {
        Self::new(GTP2_CAUSE_REQUEST_ACCEPTED)
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::Cause as u8);
        buf.put_u16(2);
        buf.put_u8(instance & 0x0F);
        buf.put_u8(self.cause);

        let mut flags = 0u8;
        if self.pce {
            flags |= 0x04;
        }
        if self.bce {
            flags |= 0x02;
        }
        if self.cs {
            flags |= 0x01;
        }
        buf.put_u8(flags);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.len() < 2 {
            return Err(GtpError::BufferTooShort {
                needed: 2,
                available: value.len(),
            });
        }
        let flags = value[1];
        Ok(Self {
            cause: value[0],
            pce: (flags & 0x04) != 0,
            bce: (flags & 0x02) != 0,
            cs: (flags & 0x01) != 0,
        })
    }
}

/// APN IE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2ApnIe {
    pub apn: Vec<u8>,
}

impl Gtp2ApnIe {
    /// Convert dot-separated APN to length-prefixed label format
    pub fn from_string(apn: &str) -> Self {
        let mut encoded = Vec::new();
        for part in apn.split('.') {
            encoded.push(part.len() as u8);
            encoded.extend_from_slice(part.as_bytes());
        }
        Self { apn: encoded }
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::Apn as u8);
        buf.put_u16(self.apn.len() as u16);
        buf.put_u8(instance & 0x0F);
        buf.put_slice(&self.apn);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        Ok(Self {
            apn: value.to_vec(),
        })
    }
}

/// AMBR IE (Aggregate Maximum Bit Rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gtp2AmbrIe {
    pub uplink: u32,
    pub downlink: u32,
}

impl Gtp2AmbrIe {
    pub fn new(uplink: u32, downlink: u32) -> Self {
        Self { uplink, downlink }
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::Ambr as u8);
        buf.put_u16(8);
        buf.put_u8(instance & 0x0F);
        buf.put_u32(self.uplink);
        buf.put_u32(self.downlink);
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.len() < 8 {
            return Err(GtpError::BufferTooShort {
                needed: 8,
                available: value.len(),
            });
        }
        let uplink = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let downlink = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
        Ok(Self { uplink, downlink })
    }
}

/// F-TEID IE (Fully Qualified TEID)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2FTeidIe {
    pub interface_type: u8,
    pub teid: u32,
    pub ipv4_addr: Option<[u8; 4]>,
    pub ipv6_addr: Option<[u8; 16]>,
}

impl Gtp2FTeidIe {
    pub fn new_ipv4(interface_type: u8, teid: u32, ipv4: [u8; 4]) -> Self {
        Self {
            interface_type,
            teid,
            ipv4_addr: Some(ipv4),
            ipv6_addr: None,
        }
    }

    fn value_len(&self) -> usize {
        let mut len = 5; // flags(1) + TEID(4)
        if self.ipv4_addr.is_some() {
            len += 4;
        }
        if self.ipv6_addr.is_some() {
            len += 16;
        }
        len
    }

    /// Encode only the IE value portion (used inside grouped IEs)
    pub fn encode_value(&self, buf: &mut BytesMut) {
        let mut flags = self.interface_type & 0x3F;
        if self.ipv4_addr.is_some() {
            flags |= 0x80;
        }
        if self.ipv6_addr.is_some() {
            flags |= 0x40;
        }
        buf.put_u8(flags);
        buf.put_u32(self.teid);
        if let Some(ipv4) = &self.ipv4_addr {
            buf.put_slice(ipv4);
        }
        if let Some(ipv6) = &self.ipv6_addr {
            buf.put_slice(ipv6);
        }
    }

    pub fn encode(&self, buf: &mut BytesMut, instance: u8) {
        buf.put_u8(Gtp2IeType::FTeid as u8);
        buf.put_u16(self.value_len() as u16);
        buf.put_u8(instance & 0x0F);
        self.encode_value(buf);
    }

    /// Render as a generic IE (for insert-or-replace in a message)
    pub fn to_ie(&self, instance: u8) -> Gtp2Ie {
        let mut buf = BytesMut::with_capacity(self.value_len());
        self.encode_value(&mut buf);
        Gtp2Ie::new(Gtp2IeType::FTeid as u8, instance, buf.freeze())
    }

    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        if value.len() < 5 {
            return Err(GtpError::BufferTooShort {
                needed: 5,
                available: value.len(),
            });
        }

        let flags = value[0];
        let v4 = (flags & 0x80) != 0;
        let v6 = (flags & 0x40) != 0;
        let interface_type = flags & 0x3F;

        let teid = u32::from_be_bytes([value[1], value[2], value[3], value[4]]);

        let mut offset = 5;
        let ipv4_addr = if v4 {
            if value.len() < offset + 4 {
                return Err(GtpError::BufferTooShort {
                    needed: offset + 4,
                    available: value.len(),
                });
            }
            let addr = [
                value[offset],
                value[offset + 1],
                value[offset + 2],
                value[offset + 3],
            ];
            offset += 4;
            Some(addr)
        } else {
            None
        };

        let ipv6_addr = if v6 {
            if value.len() < offset + 16 {
                return Err(GtpError::BufferTooShort {
                    needed: offset + 16,
                    available: value.len(),
                });
            }
            let mut addr = [0u8; 16];
            addr.copy_from_slice(&value[offset..offset + 16]);
            Some(addr)
        } else {
            None
        };

        Ok(Self {
            interface_type,
            teid,
            ipv4_addr,
            ipv6_addr,
        })
    }
}

/// Bearer QoS IE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2BearerQosIe {
    pub pci: bool,
    pub pl: u8,
    pub pvi: bool,
    pub qci: u8,
    pub mbr_ul: u64,
    pub mbr_dl: u64,
    pub gbr_ul: u64,
    pub gbr_dl: u64,
}

impl Gtp2BearerQosIe {
    pub fn new(qci: u8) -> Self {
        Self {
            pci: false,
            pl: 0,
            pvi: false,
            qci,
            mbr_ul: 0,
            mbr_dl: 0,
            gbr_ul: 0,
            gbr_dl: 0,
        }
    }

    /// Encode only the IE value portion (used inside grouped IEs)
    pub fn encode_value(&self, buf: &mut BytesMut) {
        let mut arp = 0u8;
        if self.pci {
            arp |= 0x40;
        }
        arp |= (self.pl & 0x0F) << 2;
        if self.pvi {
            arp |= 0x01;
        }
        buf.put_u8(arp);
        buf.put_u8(self.qci);

        // MBR/GBR are 5 bytes each (40 bits)
        buf.put_slice(&self.mbr_ul.to_be_bytes()[3..8]);
        buf.put_slice(&self.mbr_dl.to_be_bytes()[3..8]);
        buf.put_slice(&self.gbr_ul.to_be_bytes()[3..8]);
        buf.put_slice(&self.gbr_dl.to_be_bytes()[3..8]);
    }

    pub fn to_ie(&self, instance: u8) -> Gtp2Ie {
        let mut buf = BytesMut::with_capacity(22);
        self.encode_value(&mut buf);
        Gtp2Ie::new(Gtp2IeType::BearerQos as u8, instance, buf.freeze())
    }
}

/// Bearer Context grouped IE
///
/// The value is itself a sequence of child IEs; the simulator reads the
/// EBI and rewrites the GTP-U F-TEID child when encoding outbound
/// messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gtp2BearerContextIe {
    pub ies: Vec<Gtp2Ie>,
}

impl Gtp2BearerContextIe {
    pub fn new() -> Self {
        Self { ies: Vec::new() }
    }

    pub fn add_ie(&mut self, ie: Gtp2Ie) {
        self.ies.push(ie);
    }

    /// Decode the grouped value into child IEs
    pub fn decode(value: &Bytes) -> GtpResult<Self> {
        let mut buf = value.clone();
        let mut ies = Vec::new();
        while buf.remaining() > 0 {
            ies.push(Gtp2Ie::decode(&mut buf)?);
        }
        Ok(Self { ies })
    }

    /// EPS Bearer Identity carried by this bearer context
    pub fn ebi(&self) -> GtpResult<u8> {
        let ie = self
            .ies
            .iter()
            .find(|ie| ie.ie_type == Gtp2IeType::Ebi as u8)
            .ok_or(GtpError::MissingMandatoryIe("EBI"))?;
        Ok(Gtp2EbiIe::decode(&ie.value)?.ebi)
    }

    /// GTP-U F-TEID child of the given instance
    pub fn gtpu_fteid(&self, instance: u8) -> Option<Gtp2FTeidIe> {
        self.ies
            .iter()
            .find(|ie| ie.ie_type == Gtp2IeType::FTeid as u8 && ie.instance == instance)
            .and_then(|ie| Gtp2FTeidIe::decode(&ie.value).ok())
    }

    /// Rewrite the TEID inside the GTP-U F-TEID child of the given
    /// instance, keeping the rest of the group intact
    pub fn set_gtpu_teid(&mut self, teid: u32, instance: u8) -> GtpResult<()> {
        let ie = self
            .ies
            .iter_mut()
            .find(|ie| ie.ie_type == Gtp2IeType::FTeid as u8 && ie.instance == instance)
            .ok_or(GtpError::MissingMandatoryIe("F-TEID"))?;
        let mut fteid = Gtp2FTeidIe::decode(&ie.value)?;
        fteid.teid = teid;
        let mut buf = BytesMut::with_capacity(fteid.value_len());
        fteid.encode_value(&mut buf);
        ie.value = buf.freeze();
        Ok(())
    }

    /// Encode the grouped value back into a flat byte string
    pub fn encode_value(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for ie in &self.ies {
            ie.encode(&mut buf);
        }
        buf.freeze()
    }

    /// Render as a generic IE
    pub fn to_ie(&self, instance: u8) -> Gtp2Ie {
        Gtp2Ie::new(
            Gtp2IeType::BearerContext as u8,
            instance,
            self.encode_value(),
        )
    }
}

impl Default for Gtp2BearerContextIe {
    fn default() -> Self {
        Self::new()
    }
}
