// ABOUTME: SMPP v3.4 optional parameters as (tag, length, value) triples
// ABOUTME: Tag constants cover the TLVs this transport reads or writes

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::CodecError;

/// TLV tag constants per SMPP v3.4 specification Table 5-1
pub mod tags {
    pub const USER_MESSAGE_REFERENCE: u16 = 0x0204;
    pub const SOURCE_PORT: u16 = 0x020A;
    pub const DESTINATION_PORT: u16 = 0x020C;
    pub const SAR_MSG_REF_NUM: u16 = 0x020E;
    pub const SAR_TOTAL_SEGMENTS: u16 = 0x020F;
    pub const SAR_SEGMENT_SEQNUM: u16 = 0x0210;
    pub const PAYLOAD_TYPE: u16 = 0x0019;
    pub const MESSAGE_PAYLOAD: u16 = 0x0424;
    pub const PRIVACY_INDICATOR: u16 = 0x0201;
    pub const USER_DATA_HEADER: u16 = 0x0005;
    pub const RECEIPTED_MESSAGE_ID: u16 = 0x001E;
    pub const MESSAGE_STATE: u16 = 0x0427;
    pub const NETWORK_ERROR_CODE: u16 = 0x0423;
    pub const ITS_SESSION_INFO: u16 = 0x1383;
    pub const USSD_SERVICE_OP: u16 = 0x0501;
}

/// One optional parameter. The length field is carried explicitly so that a
/// decoded PDU can be re-encoded byte-identically.
#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    pub tag: u16,
    pub length: u16,
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Tlv {
            tag,
            length: value.len() as u16,
            value,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.tag);
        buf.put_u16(self.length);
        buf.extend_from_slice(&self.value);
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < 4 {
            return Err(CodecError::TlvError("truncated TLV header".into()));
        }

        let tag = buf.get_u16();
        let length = buf.get_u16();

        if buf.remaining() < length as usize {
            return Err(CodecError::TlvError(format!(
                "TLV {tag:#06x} claims {length} octets, {} remain",
                buf.remaining()
            )));
        }

        let value = buf.copy_to_bytes(length as usize);
        Ok(Tlv { tag, length, value })
    }

    /// Decode all TLVs up to the end of the cursor
    pub fn decode_all(buf: &mut Cursor<&[u8]>) -> Result<Vec<Self>, CodecError> {
        let mut tlvs = Vec::new();
        while buf.has_remaining() {
            tlvs.push(Tlv::decode(buf)?);
        }
        Ok(tlvs)
    }
}
