// ABOUTME: submit_sm / submit_sm_resp PDUs (Sections 4.4.1 and 4.4.2)
// ABOUTME: Oversize payloads travel in the message_payload TLV instead of short_message

use bytes::{Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_u8, encode_cstring,
};
use crate::datatypes::tlv::{Tlv, tags};
use crate::datatypes::{CommandId, CommandStatus};

/// Submit a short message to the SMSC for onward delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSm {
    pub sequence_number: u32,

    // Mandatory parameters
    pub service_type: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    /// Up to 254 octets; empty when the payload rides in message_payload
    pub short_message: Bytes,

    pub optional_parameters: Vec<Tlv>,
}

impl SubmitSm {
    pub fn tlv(&self, tag: u16) -> Option<&Tlv> {
        self.optional_parameters.iter().find(|t| t.tag == tag)
    }

    pub fn message_payload(&self) -> Option<&Bytes> {
        self.tlv(tags::MESSAGE_PAYLOAD).map(|t| &t.value)
    }
}

impl Encodable for SubmitSm {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSm,
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.service_type, 6);
        buf.extend_from_slice(&[self.source_addr_ton, self.source_addr_npi]);
        encode_cstring(buf, &self.source_addr, 21);
        buf.extend_from_slice(&[self.dest_addr_ton, self.dest_addr_npi]);
        encode_cstring(buf, &self.destination_addr, 21);
        buf.extend_from_slice(&[self.esm_class, self.protocol_id, self.priority_flag]);
        encode_cstring(buf, &self.schedule_delivery_time, 17);
        encode_cstring(buf, &self.validity_period, 17);
        buf.extend_from_slice(&[
            self.registered_delivery,
            self.replace_if_present_flag,
            self.data_coding,
            self.sm_default_msg_id,
            self.short_message.len() as u8,
        ]);
        buf.extend_from_slice(&self.short_message);

        for tlv in &self.optional_parameters {
            tlv.encode(buf);
        }
    }
}

impl Decodable for SubmitSm {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let service_type = decode_cstring(buf, 6, "service_type")?;
        let source_addr_ton = decode_u8(buf)?;
        let source_addr_npi = decode_u8(buf)?;
        let source_addr = decode_cstring(buf, 21, "source_addr")?;
        let dest_addr_ton = decode_u8(buf)?;
        let dest_addr_npi = decode_u8(buf)?;
        let destination_addr = decode_cstring(buf, 21, "destination_addr")?;
        let esm_class = decode_u8(buf)?;
        let protocol_id = decode_u8(buf)?;
        let priority_flag = decode_u8(buf)?;
        let schedule_delivery_time = decode_cstring(buf, 17, "schedule_delivery_time")?;
        let validity_period = decode_cstring(buf, 17, "validity_period")?;
        let registered_delivery = decode_u8(buf)?;
        let replace_if_present_flag = decode_u8(buf)?;
        let data_coding = decode_u8(buf)?;
        let sm_default_msg_id = decode_u8(buf)?;
        let sm_length = decode_u8(buf)? as usize;

        use bytes::Buf;
        if buf.remaining() < sm_length {
            return Err(CodecError::FieldValidation {
                field: "short_message",
                reason: format!("sm_length {sm_length} exceeds remaining body"),
            });
        }
        let short_message = buf.copy_to_bytes(sm_length);
        let optional_parameters = Tlv::decode_all(buf)?;

        Ok(SubmitSm {
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            optional_parameters,
        })
    }
}

/// Response to submit_sm, carrying the SMSC-assigned message id on success.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    pub message_id: String,
}

impl Encodable for SubmitSmResponse {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        if self.command_status == CommandStatus::Ok {
            encode_cstring(buf, &self.message_id, 65);
        }
    }
}

impl Decodable for SubmitSmResponse {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        use bytes::Buf;

        // Error responses may omit the message_id body entirely
        let message_id = if buf.has_remaining() {
            decode_cstring(buf, 65, "message_id")?
        } else {
            String::new()
        };

        Ok(SubmitSmResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
        })
    }
}
