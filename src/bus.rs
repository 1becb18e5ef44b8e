// ABOUTME: Contracts for the message bus and failure sink this worker publishes into
// ABOUTME: The broker itself is an external collaborator; only its surface is specified here

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{DeliveryReportMetadata, DeliveryStatus, FailureRecord, TransportMessage};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus publish failed: {0}")]
    Publish(String),

    #[error("bus serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The transport worker's view of the message bus. Publish failures are
/// reported back so the worker can log them; they never tear down the
/// SMPP session.
///
/// `pause_connectors` / `unpause_connectors` is the backpressure contract:
/// the bus must stop feeding outbound messages while paused.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an inbound (mobile-originated) user message
    async fn publish_inbound(&self, message: TransportMessage) -> Result<(), BusError>;

    /// Acknowledge a successfully submitted outbound message
    async fn publish_ack(
        &self,
        user_message_id: &str,
        sent_message_id: &str,
    ) -> Result<(), BusError>;

    /// Reject an outbound message that failed terminally
    async fn publish_nack(&self, user_message_id: &str, reason: &str) -> Result<(), BusError>;

    /// Publish an SMSC delivery report for a previously acked message
    async fn publish_delivery_report(
        &self,
        user_message_id: &str,
        delivery_status: DeliveryStatus,
        transport_metadata: DeliveryReportMetadata,
    ) -> Result<(), BusError>;

    /// Stop consuming outbound messages
    async fn pause_connectors(&self);

    /// Resume consuming outbound messages
    async fn unpause_connectors(&self);
}

/// Sink for structured failure records on unrecoverable submit errors.
#[async_trait]
pub trait FailurePublisher: Send + Sync {
    async fn publish_failure(&self, failure: FailureRecord) -> Result<(), BusError>;
}
