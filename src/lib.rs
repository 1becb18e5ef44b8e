//! SMPP v3.4 transport worker.
//!
//! Bridges a bound ESME session against an SMSC to an internal message bus:
//! outbound bus messages become `submit_sm` operations, their responses and
//! delivery reports are correlated back to the originating message through a
//! shared key/value store, and inbound `deliver_sm` PDUs are reshaped into
//! normalized bus messages. Throttling, reconnection, and split
//! transmitter/receiver deployments are handled here; the bus broker and the
//! key/value store are external collaborators behind the [`bus::MessageBus`]
//! and [`kv::KvStore`] contracts.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smpp_transport::{MemoryStore, SmppConfig, SmppTransport};
//! # use smpp_transport::bus::{MessageBus, FailurePublisher};
//!
//! # async fn example(bus: Arc<dyn MessageBus>, failures: Arc<dyn FailurePublisher>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = SmppConfig::new("smsc.example.net", 2775, "system_id", "password");
//! let kv = Arc::new(MemoryStore::new());
//! let (worker, factory) = SmppTransport::transceiver(config, kv, bus, failures)?;
//!
//! // feed outbound bus messages into worker.handle_outbound_message(...)
//!
//! worker.shutdown(factory).await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod connection;
pub mod datatypes;
pub mod kv;
pub mod message;
pub mod operator;
pub mod reconnect;
pub mod session;
pub mod store;
pub mod worker;

#[cfg(test)]
mod tests;

pub use codec::{CodecError, Decodable, Encodable, Frame, PduHeader};
pub use config::{ConfigError, SmppConfig};
pub use datatypes::{BindMode, CommandId, CommandStatus};
pub use kv::{KvError, KvStore, MemoryStore, PrefixedStore};
pub use message::{
    DeliveryReportMetadata, DeliveryStatus, FailureRecord, SessionEvent, TransportMessage,
    TransportMetadata, TransportType,
};
pub use reconnect::{FactoryHandle, ReconnectingFactory};
pub use session::{EsmeSession, SessionError, SessionHandle, SessionHandler};
pub use store::CorrelationStore;
pub use worker::{SmppTransport, TransportError};
