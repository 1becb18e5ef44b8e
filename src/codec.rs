// ABOUTME: SMPP v3.4 wire codec: PDU header, framing, and encode/decode traits
// ABOUTME: Keeps parsing tolerant of SMSC spec violations where the protocol allows it

use crate::datatypes::{CommandId, CommandStatus};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Maximum allowed PDU size to prevent memory exhaustion from a misbehaving peer
pub const MAX_PDU_SIZE: u32 = 65536; // 64KB

/// SMPP v3.4 PDU Header (16 bytes, common to all PDUs)
#[derive(Debug, Clone, PartialEq)]
pub struct PduHeader {
    pub command_length: u32,
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    /// Encode PDU header to buffer. The command_length written here is a
    /// placeholder when called through `Encodable::to_bytes`, which patches
    /// the real length afterwards.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.command_length);
        buf.put_u32(self.command_id.into());
        buf.put_u32(self.command_status.into());
        buf.put_u32(self.sequence_number);
    }
}

/// Trait for PDUs that can be encoded to bytes
pub trait Encodable {
    /// Encode this PDU (header and body) to the buffer
    fn encode(&self, buf: &mut BytesMut);

    /// Convert this PDU to wire bytes, fixing up the command_length field
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);

        let length = buf.len() as u32;
        buf[0..4].copy_from_slice(&length.to_be_bytes());
        buf.freeze()
    }
}

/// Trait for PDUs that can be decoded from bytes
pub trait Decodable: Sized {
    /// Decode this PDU from the buffer positioned after the header
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;
}

/// Codec errors with enough context to debug a hostile wire
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Incomplete PDU: need more data")]
    Incomplete,

    #[error("Invalid PDU length: {length}, must be {min}-{max}")]
    InvalidPduLength { length: u32, min: u32, max: u32 },

    #[error("Field '{field}' malformed: {reason}")]
    FieldValidation {
        field: &'static str,
        reason: String,
    },

    #[error("TLV parsing error: {0}")]
    TlvError(String),

    #[error("Cannot encode unknown PDU {0:#x}")]
    UnknownPdu(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a C-octet string. The cursor advances past the terminating null,
/// never more than `max_len` octets in total.
pub fn decode_cstring(
    buf: &mut Cursor<&[u8]>,
    max_len: usize,
    field_name: &'static str,
) -> Result<String, CodecError> {
    let start = buf.position() as usize;
    let data = *buf.get_ref();

    let mut end = start;
    loop {
        if end >= data.len() || end - start >= max_len {
            return Err(CodecError::FieldValidation {
                field: field_name,
                reason: "unterminated c-octet string".into(),
            });
        }
        if data[end] == 0 {
            break;
        }
        end += 1;
    }

    // Non-UTF8 octets in address and id fields do occur in the wild;
    // preserve what we can instead of dropping the PDU.
    let value = String::from_utf8_lossy(&data[start..end]).into_owned();
    buf.set_position((end + 1) as u64);
    Ok(value)
}

/// Encode a C-octet string, truncating to `max_len` - 1 octets plus the null
pub fn encode_cstring(buf: &mut BytesMut, value: &str, max_len: usize) {
    let bytes = value.as_bytes();
    let actual_len = bytes.len().min(max_len - 1);
    buf.put_slice(&bytes[..actual_len]);
    buf.put_u8(0);
}

pub fn decode_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u8())
}

pub fn decode_u32(buf: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u32())
}

/// One SMPP PDU as read off or written to the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Bind(crate::datatypes::Bind),
    BindResp(crate::datatypes::BindResponse),
    Unbind(crate::datatypes::Unbind),
    UnbindResp(crate::datatypes::UnbindResponse),
    EnquireLink(crate::datatypes::EnquireLink),
    EnquireLinkResp(crate::datatypes::EnquireLinkResponse),
    SubmitSm(Box<crate::datatypes::SubmitSm>),
    SubmitSmResp(crate::datatypes::SubmitSmResponse),
    DeliverSm(Box<crate::datatypes::DeliverSm>),
    DeliverSmResp(crate::datatypes::DeliverSmResponse),
    GenericNack(crate::datatypes::GenericNack),

    /// A syntactically valid PDU with a command_id we do not speak.
    /// Kept so the session can answer with generic_nack instead of
    /// dropping the connection.
    Unknown {
        command_id: u32,
        command_status: u32,
        sequence_number: u32,
        body: Bytes,
    },
}

impl Frame {
    /// Check whether `buf` holds at least one complete PDU, without
    /// allocating anything for its body. Returns the PDU length.
    pub fn check(buf: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
        if buf.remaining() < PduHeader::SIZE {
            return Err(CodecError::Incomplete);
        }

        let pos = buf.position();
        let command_length = buf.get_u32();
        buf.set_position(pos);

        if command_length < PduHeader::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: PduHeader::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        if buf.remaining() < command_length as usize {
            return Err(CodecError::Incomplete);
        }

        Ok(command_length as usize)
    }

    /// Parse one complete PDU from the buffer. The caller must have
    /// established completeness with [`Frame::check`] first.
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Frame, CodecError> {
        use crate::datatypes::*;

        let start = buf.position() as usize;
        let command_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let command_status_raw = buf.get_u32();
        let sequence_number = buf.get_u32();
        let body_len = command_length as usize - PduHeader::SIZE;

        let Ok(command_id) = CommandId::try_from(command_id_raw) else {
            if buf.remaining() < body_len {
                return Err(CodecError::Incomplete);
            }
            let body = buf.copy_to_bytes(body_len);
            return Ok(Frame::Unknown {
                command_id: command_id_raw,
                command_status: command_status_raw,
                sequence_number,
                body,
            });
        };

        let header = PduHeader {
            command_length,
            command_id,
            command_status: CommandStatus::from(command_status_raw),
            sequence_number,
        };

        // Decode against a sub-slice bounded by command_length so a bad
        // body cannot eat into the following PDU.
        let body_start = buf.position() as usize;
        let full = *buf.get_ref();
        if full.len() < body_start + body_len {
            return Err(CodecError::Incomplete);
        }
        let mut body = Cursor::new(&full[body_start..body_start + body_len]);

        let frame = match command_id {
            CommandId::BindTransmitter
            | CommandId::BindReceiver
            | CommandId::BindTransceiver => Frame::Bind(Bind::decode(header, &mut body)?),
            CommandId::BindTransmitterResp
            | CommandId::BindReceiverResp
            | CommandId::BindTransceiverResp => {
                Frame::BindResp(BindResponse::decode(header, &mut body)?)
            }
            CommandId::Unbind => Frame::Unbind(Unbind::decode(header, &mut body)?),
            CommandId::UnbindResp => Frame::UnbindResp(UnbindResponse::decode(header, &mut body)?),
            CommandId::EnquireLink => Frame::EnquireLink(EnquireLink::decode(header, &mut body)?),
            CommandId::EnquireLinkResp => {
                Frame::EnquireLinkResp(EnquireLinkResponse::decode(header, &mut body)?)
            }
            CommandId::SubmitSm => Frame::SubmitSm(Box::new(SubmitSm::decode(header, &mut body)?)),
            CommandId::SubmitSmResp => {
                Frame::SubmitSmResp(SubmitSmResponse::decode(header, &mut body)?)
            }
            CommandId::DeliverSm => {
                Frame::DeliverSm(Box::new(DeliverSm::decode(header, &mut body)?))
            }
            CommandId::DeliverSmResp => {
                Frame::DeliverSmResp(DeliverSmResponse::decode(header, &mut body)?)
            }
            CommandId::GenericNack => Frame::GenericNack(GenericNack::decode(header, &mut body)?),
        };

        buf.set_position((start + command_length as usize) as u64);
        Ok(frame)
    }

    /// Wire representation of this frame
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        match self {
            Frame::Bind(pdu) => Ok(pdu.to_bytes()),
            Frame::BindResp(pdu) => Ok(pdu.to_bytes()),
            Frame::Unbind(pdu) => Ok(pdu.to_bytes()),
            Frame::UnbindResp(pdu) => Ok(pdu.to_bytes()),
            Frame::EnquireLink(pdu) => Ok(pdu.to_bytes()),
            Frame::EnquireLinkResp(pdu) => Ok(pdu.to_bytes()),
            Frame::SubmitSm(pdu) => Ok(pdu.to_bytes()),
            Frame::SubmitSmResp(pdu) => Ok(pdu.to_bytes()),
            Frame::DeliverSm(pdu) => Ok(pdu.to_bytes()),
            Frame::DeliverSmResp(pdu) => Ok(pdu.to_bytes()),
            Frame::GenericNack(pdu) => Ok(pdu.to_bytes()),
            Frame::Unknown { command_id, .. } => Err(CodecError::UnknownPdu(*command_id)),
        }
    }

    pub fn sequence_number(&self) -> u32 {
        match self {
            Frame::Bind(pdu) => pdu.sequence_number,
            Frame::BindResp(pdu) => pdu.sequence_number,
            Frame::Unbind(pdu) => pdu.sequence_number,
            Frame::UnbindResp(pdu) => pdu.sequence_number,
            Frame::EnquireLink(pdu) => pdu.sequence_number,
            Frame::EnquireLinkResp(pdu) => pdu.sequence_number,
            Frame::SubmitSm(pdu) => pdu.sequence_number,
            Frame::SubmitSmResp(pdu) => pdu.sequence_number,
            Frame::DeliverSm(pdu) => pdu.sequence_number,
            Frame::DeliverSmResp(pdu) => pdu.sequence_number,
            Frame::GenericNack(pdu) => pdu.sequence_number,
            Frame::Unknown {
                sequence_number, ..
            } => *sequence_number,
        }
    }
}
