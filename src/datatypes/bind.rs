// ABOUTME: bind_transmitter / bind_receiver / bind_transceiver PDUs and their responses
// ABOUTME: The three flavors share one body layout; only the command_id differs

use bytes::BytesMut;
use std::io::Cursor;

use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_u8, encode_cstring,
};
use crate::datatypes::{CommandId, CommandStatus};

/// Which SMPP bind operation a session performs (Section 4.1).
///
/// A transceiver binds full duplex; a split deployment runs a transmitter
/// and a receiver against the same correlation prefix instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindMode {
    Transmitter,
    Receiver,
    Transceiver,
}

impl BindMode {
    pub fn request_id(&self) -> CommandId {
        match self {
            BindMode::Transmitter => CommandId::BindTransmitter,
            BindMode::Receiver => CommandId::BindReceiver,
            BindMode::Transceiver => CommandId::BindTransceiver,
        }
    }

    pub fn response_id(&self) -> CommandId {
        match self {
            BindMode::Transmitter => CommandId::BindTransmitterResp,
            BindMode::Receiver => CommandId::BindReceiverResp,
            BindMode::Transceiver => CommandId::BindTransceiverResp,
        }
    }

    fn from_request_id(id: CommandId) -> Option<Self> {
        match id {
            CommandId::BindTransmitter => Some(BindMode::Transmitter),
            CommandId::BindReceiver => Some(BindMode::Receiver),
            CommandId::BindTransceiver => Some(BindMode::Transceiver),
            _ => None,
        }
    }

    fn from_response_id(id: CommandId) -> Option<Self> {
        match id {
            CommandId::BindTransmitterResp => Some(BindMode::Transmitter),
            CommandId::BindReceiverResp => Some(BindMode::Receiver),
            CommandId::BindTransceiverResp => Some(BindMode::Transceiver),
            _ => None,
        }
    }
}

/// Bind request PDU (Section 4.1.1). Field layout is identical for all three
/// bind flavors.
#[derive(Clone, Debug, PartialEq)]
pub struct Bind {
    pub mode: BindMode,
    pub sequence_number: u32,

    /// 5.2.1 system_id: ESME identification, up to 16 octets
    pub system_id: String,
    /// 5.2.2 password: up to 9 octets, empty when the SMSC requires none
    pub password: String,
    /// 5.2.3 system_type: categorizes the ESME, up to 13 octets
    pub system_type: String,
    /// 5.2.4 interface_version: 0x34 for SMPP v3.4
    pub interface_version: u8,
    /// 5.2.5 addr_ton
    pub addr_ton: u8,
    /// 5.2.6 addr_npi
    pub addr_npi: u8,
    /// 5.2.7 address_range: SME addresses served by this ESME
    pub address_range: String,
}

impl Encodable for Bind {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: self.mode.request_id(),
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.system_id, 16);
        encode_cstring(buf, &self.password, 9);
        encode_cstring(buf, &self.system_type, 13);
        buf.extend_from_slice(&[self.interface_version, self.addr_ton, self.addr_npi]);
        encode_cstring(buf, &self.address_range, 41);
    }
}

impl Decodable for Bind {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mode =
            BindMode::from_request_id(header.command_id).ok_or(CodecError::FieldValidation {
                field: "command_id",
                reason: "not a bind request".into(),
            })?;

        Ok(Bind {
            mode,
            sequence_number: header.sequence_number,
            system_id: decode_cstring(buf, 16, "system_id")?,
            password: decode_cstring(buf, 9, "password")?,
            system_type: decode_cstring(buf, 13, "system_type")?,
            interface_version: decode_u8(buf)?,
            addr_ton: decode_u8(buf)?,
            addr_npi: decode_u8(buf)?,
            address_range: decode_cstring(buf, 41, "address_range")?,
        })
    }
}

/// Bind response PDU (Section 4.1.2)
#[derive(Clone, Debug, PartialEq)]
pub struct BindResponse {
    pub mode: BindMode,
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    /// SMSC identification. Absent when the bind was rejected.
    pub system_id: String,
}

impl Encodable for BindResponse {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: self.mode.response_id(),
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        if self.command_status == CommandStatus::Ok {
            encode_cstring(buf, &self.system_id, 16);
        }
    }
}

impl Decodable for BindResponse {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mode =
            BindMode::from_response_id(header.command_id).ok_or(CodecError::FieldValidation {
                field: "command_id",
                reason: "not a bind response".into(),
            })?;

        // Rejecting SMSCs routinely omit the body entirely
        let system_id = if buf.get_ref().len() > buf.position() as usize {
            decode_cstring(buf, 16, "system_id")?
        } else {
            String::new()
        };

        Ok(BindResponse {
            mode,
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            system_id,
        })
    }
}
