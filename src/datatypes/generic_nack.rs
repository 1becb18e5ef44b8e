// ABOUTME: generic_nack PDU for rejecting malformed or unknown requests (Section 4.3)

use bytes::BytesMut;
use std::io::Cursor;

use crate::codec::{CodecError, Decodable, Encodable, PduHeader};
use crate::datatypes::{CommandId, CommandStatus};

/// Sent when a PDU cannot be matched to a known operation. The sequence
/// number echoes the offending PDU when it could be read, 0 otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct GenericNack {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl GenericNack {
    pub fn invalid_command_id(sequence_number: u32) -> Self {
        GenericNack {
            command_status: CommandStatus::InvalidCommandId,
            sequence_number,
        }
    }
}

impl Encodable for GenericNack {
    fn encode(&self, buf: &mut BytesMut) {
        PduHeader {
            command_length: 0,
            command_id: CommandId::GenericNack,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);
    }
}

impl Decodable for GenericNack {
    fn decode(header: PduHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(GenericNack {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nack_carries_status_and_sequence() {
        let bytes = GenericNack::invalid_command_id(12).to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[4..8], &0x8000_0000u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &3u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &12u32.to_be_bytes());
    }
}
