// ABOUTME: SMPP v3.4 command identifiers for the PDUs this transport speaks
// ABOUTME: Bit 31 distinguishes responses from requests per specification Table 4-1

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// SMPP v3.4 Command Identifiers (Table 4-1), restricted to the operations an
/// ESME transport uses. Anything else on the wire is surfaced as an unknown
/// frame and answered with generic_nack.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    GenericNack = 0x8000_0000,

    BindReceiver = 0x0000_0001,
    BindReceiverResp = 0x8000_0001,
    BindTransmitter = 0x0000_0002,
    BindTransmitterResp = 0x8000_0002,
    BindTransceiver = 0x0000_0009,
    BindTransceiverResp = 0x8000_0009,

    Unbind = 0x0000_0006,
    UnbindResp = 0x8000_0006,

    SubmitSm = 0x0000_0004,
    SubmitSmResp = 0x8000_0004,
    DeliverSm = 0x0000_0005,
    DeliverSmResp = 0x8000_0005,

    EnquireLink = 0x0000_0015,
    EnquireLinkResp = 0x8000_0015,
}

impl CommandId {
    /// Response PDUs have the high bit set
    pub fn is_response(&self) -> bool {
        u32::from(*self) & 0x8000_0000 != 0
    }
}
