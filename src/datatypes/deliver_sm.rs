// ABOUTME: deliver_sm / deliver_sm_resp PDUs (Sections 4.6.1 and 4.6.2)
// ABOUTME: Carries both mobile-originated messages and SMSC delivery receipts

use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_u8, encode_cstring,
};
use crate::datatypes::tlv::{Tlv, tags};
use crate::datatypes::{CommandId, CommandStatus};

/// esm_class message-type bits (Section 5.2.12): 0b00_0100 marks an SMSC
/// delivery receipt on deliver_sm.
const ESM_CLASS_DELIVERY_RECEIPT: u8 = 0x04;

/// A message delivered by the SMSC to this ESME.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSm {
    pub sequence_number: u32,

    // Mandatory parameters; layout matches submit_sm
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
    pub short_message: Bytes,

    pub optional_parameters: Vec<Tlv>,
}

impl DeliverSm {
    pub fn tlv(&self, tag: u16) -> Option<&Tlv> {
        self.optional_parameters.iter().find(|t| t.tag == tag)
    }

    /// Message body: the message_payload TLV when present, short_message
    /// otherwise (Section 5.3.2.32).
    pub fn body(&self) -> &[u8] {
        match self.tlv(tags::MESSAGE_PAYLOAD) {
            Some(tlv) => &tlv.value,
            None => &self.short_message,
        }
    }

    /// Whether esm_class flags this PDU as an SMSC delivery receipt
    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class & ESM_CLASS_DELIVERY_RECEIPT != 0
    }

    /// ussd_service_op TLV value; presence marks a USSD dialogue
    pub fn ussd_service_op(&self) -> Option<u8> {
        self.tlv(tags::USSD_SERVICE_OP)
            .and_then(|t| t.value.first().copied())
    }

    /// its_session_info TLV, hex-encoded for transport metadata
    pub fn session_info(&self) -> Option<String> {
        self.tlv(tags::ITS_SESSION_INFO).map(|t| {
            t.value
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>()
        })
    }
}

impl Encodable for DeliverSm {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::DeliverSm,
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

impl Decodable for DeliverSm {
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

        if buf.remaining() < sm_length {
            return Err(CodecError::FieldValidation {
                field: "short_message",
                reason: format!("sm_length {sm_length} exceeds remaining body"),
            });
        }
        let short_message = buf.copy_to_bytes(sm_length);
        let optional_parameters = Tlv::decode_all(buf)?;

        Ok(DeliverSm {
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

/// Acknowledgement for a deliver_sm. The message_id field is unused and
/// always null (Section 4.6.2).
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl DeliverSmResponse {
    pub fn ok(sequence_number: u32) -> Self {
        DeliverSmResponse {
            command_status: CommandStatus::Ok,
            sequence_number,
        }
    }
}

impl Encodable for DeliverSmResponse {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::DeliverSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, "", 1);
    }
}

impl Decodable for DeliverSmResponse {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.has_remaining() {
            let _ = decode_cstring(buf, 65, "message_id")?;
        }
        Ok(DeliverSmResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Frame;

    fn inbound(short_message: &'static [u8]) -> DeliverSm {
        DeliverSm {
            sequence_number: 20,
            service_type: "".into(),
            source_addr_ton: 0,
            source_addr_npi: 0,
            source_addr: "27761234567".into(),
            dest_addr_ton: 0,
            dest_addr_npi: 1,
            destination_addr: "1234".into(),
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: "".into(),
            validity_period: "".into(),
            registered_delivery: 0,
            replace_if_present_flag: 0,
            data_coding: 0,
            sm_default_msg_id: 0,
            short_message: Bytes::from_static(short_message),
            optional_parameters: vec![],
        }
    }

    fn parse(bytes: &[u8]) -> Frame {
        let mut cursor = Cursor::new(bytes);
        Frame::check(&mut cursor).unwrap();
        Frame::parse(&mut cursor).unwrap()
    }

    #[test]
    fn deliver_sm_roundtrip() {
        let pdu = inbound(b"ping");
        match parse(&pdu.to_bytes()) {
            Frame::DeliverSm(decoded) => assert_eq!(*decoded, pdu),
            other => panic!("expected DeliverSm, got {other:?}"),
        }
    }

    #[test]
    fn receipt_flag_follows_esm_class() {
        let mut pdu = inbound(b"id:1 ...");
        assert!(!pdu.is_delivery_receipt());
        pdu.esm_class = 0x04;
        assert!(pdu.is_delivery_receipt());
    }

    #[test]
    fn body_prefers_message_payload_tlv() {
        let mut pdu = inbound(b"short");
        pdu.optional_parameters = vec![Tlv::new(tags::MESSAGE_PAYLOAD, Bytes::from_static(b"long body"))];
        assert_eq!(pdu.body(), b"long body");
    }

    #[test]
    fn ussd_accessors() {
        let mut pdu = inbound(b"*120#");
        pdu.optional_parameters = vec![
            Tlv::new(tags::USSD_SERVICE_OP, Bytes::from_static(&[0x01])),
            Tlv::new(tags::ITS_SESSION_INFO, Bytes::from_static(&[0x00, 0x2a])),
        ];
        assert_eq!(pdu.ussd_service_op(), Some(0x01));
        assert_eq!(pdu.session_info().as_deref(), Some("002a"));
    }

    #[test]
    fn deliver_sm_resp_roundtrip() {
        let resp = DeliverSmResponse::ok(20);
        match parse(&resp.to_bytes()) {
            Frame::DeliverSmResp(decoded) => assert_eq!(decoded, resp),
            other => panic!("expected DeliverSmResp, got {other:?}"),
        }
    }
}
