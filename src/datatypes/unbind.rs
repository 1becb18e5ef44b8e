// ABOUTME: unbind / unbind_resp PDUs for orderly session teardown (Section 4.2)

use bytes::BytesMut;
use std::io::Cursor;

use crate::codec::{CodecError, Decodable, Encodable, PduHeader};
use crate::datatypes::{CommandId, CommandStatus};

#[derive(Clone, Debug, PartialEq)]
pub struct Unbind {
    pub sequence_number: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnbindResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl Encodable for Unbind {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::Unbind,
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        }
        .encode(buf);
    }
}

impl Decodable for Unbind {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(Unbind {
            sequence_number: header.sequence_number,
        })
    }
}

impl Encodable for UnbindResponse {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::UnbindResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);
    }
}

impl Decodable for UnbindResponse {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(UnbindResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}
