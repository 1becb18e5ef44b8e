// ABOUTME: enquire_link keep-alive PDUs (Sections 4.11.1 and 4.11.2)

use bytes::BytesMut;
use std::io::Cursor;

use crate::codec::{CodecError, Decodable, Encodable, PduHeader};
use crate::datatypes::{CommandId, CommandStatus};

/// Link confidence check. Either peer may send one at any time in a bound
/// session; the other must answer with enquire_link_resp.
#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLink {
    pub sequence_number: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLinkResponse {
    pub sequence_number: u32,
}

impl Encodable for EnquireLink {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::EnquireLink,
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        }
        .encode(buf);
    }
}

impl Decodable for EnquireLink {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(EnquireLink {
            sequence_number: header.sequence_number,
        })
    }
}

impl Encodable for EnquireLinkResponse {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::EnquireLinkResp,
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        }
        .encode(buf);
    }
}

impl Decodable for EnquireLinkResponse {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(EnquireLinkResponse {
            sequence_number: header.sequence_number,
        })
    }
}
