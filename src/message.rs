// ABOUTME: Bus-facing data model: user messages, delivery statuses, failure records
// ABOUTME: Serialization must stay stable; these shapes live in the shared KVStore too

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datatypes::DeliveryReceipt;

/// Which user-facing channel a message belongs to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Sms,
    Ussd,
}

/// USSD dialogue position, as published on the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEvent {
    New,
    Resume,
    Close,
}

/// Per-message metadata that rides along without interpretation, except for
/// the USSD session handle which both directions care about.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_info: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A user message crossing the bus in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub message_id: String,
    pub to_addr: String,
    pub from_addr: String,
    pub content: String,
    #[serde(default)]
    pub transport_type: TransportType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_event: Option<SessionEvent>,
    #[serde(default)]
    pub transport_metadata: TransportMetadata,
}

impl TransportMessage {
    /// USSD sessions stay open unless the message closes them; plain SMS
    /// has no session to continue.
    pub fn continues_session(&self) -> bool {
        self.session_event != Some(SessionEvent::Close)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Final state of a submitted message as told by a delivery report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    Pending,
}

impl DeliveryStatus {
    /// Map the receipt `stat` token. "0" is accepted as delivered for SMSCs
    /// that report numeric states instead of the seven-letter tokens.
    pub fn from_stat(stat: &str) -> Self {
        match stat {
            "DELIVRD" | "0" => DeliveryStatus::Delivered,
            "REJECTD" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Pending,
        }
    }
}

/// transport_metadata attached to a published delivery report
#[derive(Clone, Debug, Serialize)]
pub struct DeliveryReportMetadata {
    pub message: DeliveryReceipt,
    /// Parsed `done date`; null when the SMSC sent an unparseable timestamp
    pub date: Option<NaiveDateTime>,
}

/// Structured record for a terminal submit failure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The original outbound message payload
    pub message: Value,
    pub failure_code: Option<u32>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> TransportMessage {
        TransportMessage {
            message_id: "m1".into(),
            to_addr: "27761234567".into(),
            from_addr: "27700000000".into(),
            content: "hi".into(),
            transport_type: TransportType::Sms,
            session_event: None,
            transport_metadata: TransportMetadata::default(),
        }
    }

    #[test]
    fn json_roundtrip() {
        let msg = outbound();
        let json = msg.to_json().unwrap();
        assert_eq!(TransportMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn transport_type_serializes_lowercase() {
        let json = serde_json::to_string(&TransportType::Ussd).unwrap();
        assert_eq!(json, "\"ussd\"");
    }

    #[test]
    fn metadata_preserves_unknown_keys() {
        let json = r#"{
            "message_id": "m1",
            "to_addr": "123",
            "from_addr": "456",
            "content": "x",
            "transport_type": "sms",
            "transport_metadata": {"session_info": "abc", "carrier": "acme"}
        }"#;
        let msg = TransportMessage::from_json(json).unwrap();
        assert_eq!(msg.transport_metadata.session_info.as_deref(), Some("abc"));
        assert_eq!(msg.transport_metadata.extra["carrier"], "acme");

        let back = msg.to_json().unwrap();
        let reparsed = TransportMessage::from_json(&back).unwrap();
        assert_eq!(reparsed, msg);
    }

    #[test]
    fn delivery_status_mapping() {
        assert_eq!(DeliveryStatus::from_stat("DELIVRD"), DeliveryStatus::Delivered);
        assert_eq!(DeliveryStatus::from_stat("0"), DeliveryStatus::Delivered);
        assert_eq!(DeliveryStatus::from_stat("REJECTD"), DeliveryStatus::Failed);
        assert_eq!(DeliveryStatus::from_stat("ACCEPTD"), DeliveryStatus::Pending);
        assert_eq!(DeliveryStatus::from_stat("EXPIRED"), DeliveryStatus::Pending);
    }

    #[test]
    fn session_continuation() {
        let mut msg = outbound();
        assert!(msg.continues_session());
        msg.session_event = Some(SessionEvent::Resume);
        assert!(msg.continues_session());
        msg.session_event = Some(SessionEvent::Close);
        assert!(!msg.continues_session());
    }
}
