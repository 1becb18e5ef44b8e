// ABOUTME: Correlation store: the key schema tying submits, responses and reports together
// ABOUTME: Lives in the shared KVStore so a split TX/RX pair sees one view

use thiserror::Error;

use crate::kv::{KvError, KvStore, PrefixedStore};
use crate::message::TransportMessage;

const MESSAGE_KEY_PREFIX: &str = "message_json";
const THIRD_PARTY_KEY_PREFIX: &str = "3rd_party_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("stored message is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key schema over the namespaced KVStore:
///
/// | key                          | value                   | lifetime             |
/// |------------------------------|-------------------------|----------------------|
/// | `message_json#<id>`          | outbound message JSON   | submit .. ack/nack   |
/// | `<sequence_number>`          | user message id         | submit .. resp       |
/// | `3rd_party_id#<smsc_id>`     | user message id         | TTL'd                |
///
/// Every operation is a single-key read or write, so no cross-key atomicity
/// is needed from the store. All operations are idempotent for identical
/// inputs.
#[derive(Clone)]
pub struct CorrelationStore {
    store: PrefixedStore,
    third_party_id_expiry: u64,
}

impl CorrelationStore {
    pub fn new(store: PrefixedStore, third_party_id_expiry: u64) -> Self {
        CorrelationStore {
            store,
            third_party_id_expiry,
        }
    }

    pub fn prefix(&self) -> &str {
        self.store.prefix()
    }

    fn message_key(message_id: &str) -> String {
        format!("{MESSAGE_KEY_PREFIX}#{message_id}")
    }

    fn third_party_key(smsc_id: &str) -> String {
        format!("{THIRD_PARTY_KEY_PREFIX}#{smsc_id}")
    }

    /// Persist the outbound message body until it is acked or nacked
    pub async fn store_outbound(&self, message: &TransportMessage) -> Result<(), StoreError> {
        let json = message.to_json()?;
        self.store
            .set(&Self::message_key(&message.message_id), &json)
            .await?;
        Ok(())
    }

    /// Fetch a stored outbound body without removing it (throttle retries)
    pub async fn load_outbound(
        &self,
        message_id: &str,
    ) -> Result<Option<TransportMessage>, StoreError> {
        match self.store.get(&Self::message_key(message_id)).await? {
            Some(json) => Ok(Some(TransportMessage::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Fetch and delete a stored outbound body (ack / terminal failure)
    pub async fn take_outbound(
        &self,
        message_id: &str,
    ) -> Result<Option<TransportMessage>, StoreError> {
        let message = self.load_outbound(message_id).await?;
        if message.is_some() {
            self.delete_outbound(message_id).await?;
        }
        Ok(message)
    }

    pub async fn delete_outbound(&self, message_id: &str) -> Result<(), StoreError> {
        self.store.delete(&Self::message_key(message_id)).await?;
        Ok(())
    }

    /// Record which user message a submit's sequence number belongs to
    pub async fn bind_seq(&self, sequence_number: u32, message_id: &str) -> Result<(), StoreError> {
        self.store
            .set(&sequence_number.to_string(), message_id)
            .await?;
        Ok(())
    }

    pub async fn resolve_seq(&self, sequence_number: u32) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(&sequence_number.to_string()).await?)
    }

    pub async fn unbind_seq(&self, sequence_number: u32) -> Result<(), StoreError> {
        self.store.delete(&sequence_number.to_string()).await?;
        Ok(())
    }

    /// Map the SMSC-assigned id back to the user message id, with the
    /// configured TTL so stale reports eventually stop correlating
    pub async fn bind_third_party(
        &self,
        smsc_message_id: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        let key = Self::third_party_key(smsc_message_id);
        self.store.set(&key, message_id).await?;
        self.store.expire(&key, self.third_party_id_expiry).await?;
        Ok(())
    }

    pub async fn resolve_third_party(
        &self,
        smsc_message_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(&Self::third_party_key(smsc_message_id))
            .await?)
    }
}
