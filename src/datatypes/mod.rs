// ABOUTME: SMPP v3.4 wire types: PDU definitions, command tables, and payload handling

pub mod bind;
pub mod command_id;
pub mod command_status;
pub mod data_coding;
pub mod deliver_sm;
pub mod delivery_receipt;
pub mod enquire_link;
pub mod generic_nack;
pub mod submit_sm;
pub mod tlv;
pub mod unbind;

pub use bind::{Bind, BindMode, BindResponse};
pub use command_id::CommandId;
pub use command_status::CommandStatus;
pub use data_coding::{Charset, DataCodingError, DataCodingMap};
pub use deliver_sm::{DeliverSm, DeliverSmResponse};
pub use delivery_receipt::{
    DEFAULT_DELIVERY_REPORT_REGEX, DeliveryReceipt, DeliveryReportParser,
};
pub use enquire_link::{EnquireLink, EnquireLinkResponse};
pub use generic_nack::GenericNack;
pub use submit_sm::{SubmitSm, SubmitSmResponse};
pub use tlv::{Tlv, tags};
pub use unbind::{Unbind, UnbindResponse};
