// ABOUTME: The transport worker: binds bus traffic to the ESME session in both directions
// ABOUTME: Owns the correlation store, throttling edge, and all bus publishing

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{FailurePublisher, MessageBus};
use crate::config::{ConfigError, SmppConfig};
use crate::datatypes::{BindMode, CommandStatus, DeliveryReceipt, SubmitSmResponse};
use crate::kv::{KvError, KvStore, PrefixedStore};
use crate::message::{
    DeliveryReportMetadata, DeliveryStatus, FailureRecord, SessionEvent, TransportMessage,
    TransportMetadata,
};
use crate::operator::operator_number;
use crate::reconnect::{FactoryHandle, ReconnectingFactory};
use crate::session::{
    EsmeSession, InboundSm, SessionError, SessionHandle, SessionHandler, SubmitParams, UssdEvent,
};
use crate::store::{CorrelationStore, StoreError};

/// done_date format in conventional delivery reports
const DONE_DATE_FORMAT: &str = "%y%m%d%H%M%S";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("not bound to an SMSC")]
    NotConnected,
}

struct WorkerInner {
    config: Arc<SmppConfig>,
    bind_mode: BindMode,
    store: CorrelationStore,
    bus: Arc<dyn MessageBus>,
    failures: Arc<dyn FailurePublisher>,
    kv: Arc<dyn KvStore>,
    session: Mutex<Option<SessionHandle>>,
    throttled: AtomicBool,
}

/// The SMPP transport worker.
///
/// Consumes outbound bus messages into submit_sm operations, correlates
/// responses and delivery reports back to user message ids through the
/// shared KVStore, reshapes deliver_sm into inbound bus messages, and
/// paces the bus through pause/unpause on disconnects and throttling.
///
/// Cheap to clone; all clones share one worker state.
#[derive(Clone)]
pub struct SmppTransport {
    inner: Arc<WorkerInner>,
}

impl SmppTransport {
    /// Build a worker without starting a session. Validates configuration
    /// and opens the correlation namespace; useful on its own for tests and
    /// for callers that drive the session themselves.
    pub fn new(
        config: SmppConfig,
        bind_mode: BindMode,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        failures: Arc<dyn FailurePublisher>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let config = Arc::new(config);
        let prefix = config.correlation_prefix();
        info!(
            host = %config.host,
            port = config.port,
            %prefix,
            mode = ?bind_mode,
            "starting SMPP transport"
        );

        let store = CorrelationStore::new(
            PrefixedStore::new(Arc::clone(&kv), &prefix),
            config.third_party_id_expiry,
        );

        Ok(SmppTransport {
            inner: Arc::new(WorkerInner {
                config,
                bind_mode,
                store,
                bus,
                failures,
                kv,
                session: Mutex::new(None),
                throttled: AtomicBool::new(false),
            }),
        })
    }

    /// Start a full-duplex transceiver worker (the default deployment).
    pub fn transceiver(
        config: SmppConfig,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        failures: Arc<dyn FailurePublisher>,
    ) -> Result<(Self, FactoryHandle), TransportError> {
        Self::spawn(config, BindMode::Transceiver, kv, bus, failures)
    }

    /// Start the transmit half of a split bind. Must share its
    /// `split_bind_prefix` with the paired receiver, which handles the
    /// delivery reports for messages sent here.
    pub fn transmitter(
        config: SmppConfig,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        failures: Arc<dyn FailurePublisher>,
    ) -> Result<(Self, FactoryHandle), TransportError> {
        Self::spawn(config, BindMode::Transmitter, kv, bus, failures)
    }

    /// Start the receive half of a split bind. Outbound consumption stays
    /// paused for the life of the worker.
    pub fn receiver(
        config: SmppConfig,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        failures: Arc<dyn FailurePublisher>,
    ) -> Result<(Self, FactoryHandle), TransportError> {
        Self::spawn(config, BindMode::Receiver, kv, bus, failures)
    }

    fn spawn(
        config: SmppConfig,
        bind_mode: BindMode,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        failures: Arc<dyn FailurePublisher>,
    ) -> Result<(Self, FactoryHandle), TransportError> {
        let worker = Self::new(config, bind_mode, kv, bus, failures)?;

        let sequence_store = PrefixedStore::new(
            Arc::clone(&worker.inner.kv),
            &worker.inner.config.correlation_prefix(),
        );
        let session = EsmeSession::new(
            Arc::clone(&worker.inner.config),
            bind_mode,
            sequence_store,
            Arc::new(worker.clone()),
        )?;
        let factory = ReconnectingFactory::spawn(session, worker.inner.config.reconnect_delay());
        Ok((worker, factory))
    }

    /// Graceful shutdown: stop reconnecting, unbind, and close the KVStore.
    /// Outbound messages whose submit never completed are dropped; anything
    /// already submitted stays correlated in the KVStore across restarts.
    pub async fn shutdown(&self, factory: FactoryHandle) -> Result<(), TransportError> {
        info!("stopping SMPP transport");
        factory.stop_trying();
        factory.wait().await;
        self.inner.kv.close().await?;
        Ok(())
    }

    /// Entry point for outbound bus messages. The bus must await each call
    /// before feeding the next message: body, submit, and sequence mapping
    /// land in order within one message.
    pub async fn handle_outbound_message(
        &self,
        message: TransportMessage,
    ) -> Result<(), TransportError> {
        debug!(message_id = %message.message_id, "consumed outbound message");
        if let Some(session) = self.inner.session.lock().await.as_ref() {
            debug!(unacked = session.unacked_count(), "unacknowledged submits");
        }
        self.inner.store.store_outbound(&message).await?;
        self.submit_outbound(message).await
    }

    /// Submit a message whose body is already stored, recording the
    /// sequence mapping for response correlation.
    async fn submit_outbound(&self, message: TransportMessage) -> Result<(), TransportError> {
        let session = self
            .inner
            .session
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let config = &self.inner.config;
        let route = operator_number(
            &message.to_addr,
            &config.country_code,
            &config.operator_prefix,
            &config.operator_number,
        );

        let params = SubmitParams {
            short_message: message.content.as_bytes().to_vec(),
            destination_addr: message.to_addr.clone(),
            source_addr: route.unwrap_or_else(|| message.from_addr.clone()),
            message_type: message.transport_type,
            continue_session: message.continues_session(),
            session_info: message.transport_metadata.session_info.clone(),
        };

        let sequence_number = session.submit_sm(params).await?;
        self.inner
            .store
            .bind_seq(sequence_number, &message.message_id)
            .await?;
        Ok(())
    }

    async fn submit_sm_success(&self, message_id: &str, smsc_message_id: &str) {
        let store = &self.inner.store;
        if let Err(e) = store.bind_third_party(smsc_message_id, message_id).await {
            error!(error = %e, %message_id, "failed to record third-party id mapping");
        }
        if let Err(e) = store.delete_outbound(message_id).await {
            error!(error = %e, %message_id, "failed to delete acked message body");
        }

        debug!(%message_id, %smsc_message_id, "publishing ack");
        if let Err(e) = self
            .inner
            .bus
            .publish_ack(message_id, smsc_message_id)
            .await
        {
            error!(error = %e, %message_id, "ack publish failed");
        }
    }

    async fn submit_sm_failure(&self, message_id: &str, status: CommandStatus) {
        let reason = status.label();
        match self.inner.store.take_outbound(message_id).await {
            Ok(Some(original)) => {
                if let Err(e) = self.inner.bus.publish_nack(message_id, &reason).await {
                    error!(error = %e, %message_id, "nack publish failed");
                }
                let failure = FailureRecord {
                    message: serde_json::to_value(&original).unwrap_or(Value::Null),
                    failure_code: Some(u32::from(status)),
                    reason,
                };
                if let Err(e) = self.inner.failures.publish_failure(failure).await {
                    error!(error = %e, %message_id, "failure record publish failed");
                }
            }
            Ok(None) => {
                warn!(%message_id, "could not retrieve failed message body; skipping failure publish");
            }
            Err(e) => {
                error!(error = %e, %message_id, "failed to load message body for failure publish");
            }
        }
    }

    async fn submit_sm_throttled(&self, message_id: &str) {
        match self.inner.store.load_outbound(message_id).await {
            Ok(Some(message)) => {
                let worker = self.clone();
                let delay = self.inner.config.throttle_backoff();
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    debug!(message_id = %message.message_id, "retrying throttled message");
                    if let Err(e) = worker.submit_outbound(message).await {
                        warn!(error = %e, "throttled resubmit failed; message stays stored until reconnect");
                    }
                });
            }
            Ok(None) => {
                warn!(%message_id, "could not retrieve throttled message; dropping retry");
            }
            Err(e) => {
                error!(error = %e, %message_id, "failed to load throttled message");
            }
        }
    }

    /// Throttling is edge-triggered: only the first throttled response
    /// pauses the bus, only the first non-throttled outcome afterwards
    /// resumes it.
    async fn start_throttling(&self) {
        if self.inner.throttled.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("throttling outbound messages");
        self.inner.bus.pause_connectors().await;
    }

    async fn stop_throttling(&self) {
        if !self.inner.throttled.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("no longer throttling outbound messages");
        if self.inner.bind_mode != BindMode::Receiver {
            self.inner.bus.unpause_connectors().await;
        }
    }
}

#[async_trait]
impl SessionHandler for SmppTransport {
    async fn on_connect(&self, session: SessionHandle) {
        info!("ESME connected");
        *self.inner.session.lock().await = Some(session);
        if self.inner.bind_mode != BindMode::Receiver {
            self.inner.bus.unpause_connectors().await;
        }
    }

    async fn on_disconnect(&self) {
        info!("ESME disconnected");
        *self.inner.session.lock().await = None;
        self.inner.bus.pause_connectors().await;
    }

    async fn on_submit_sm_resp(&self, resp: SubmitSmResponse) {
        let sequence_number = resp.sequence_number;
        let message_id = match self.inner.store.resolve_seq(sequence_number).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(sequence_number, "sequence number lookup failed, discarding response");
                return;
            }
            Err(e) => {
                error!(error = %e, sequence_number, "correlation store failure on submit_sm_resp");
                return;
            }
        };
        if let Err(e) = self.inner.store.unbind_seq(sequence_number).await {
            error!(error = %e, sequence_number, "failed to delete sequence mapping");
        }

        match resp.command_status {
            CommandStatus::Ok => {
                self.submit_sm_success(&message_id, &resp.message_id).await;
                self.stop_throttling().await;
            }
            CommandStatus::Throttled => {
                self.start_throttling().await;
                self.submit_sm_throttled(&message_id).await;
            }
            status => {
                self.submit_sm_failure(&message_id, status).await;
                self.stop_throttling().await;
            }
        }
    }

    async fn on_delivery_report(&self, receipt: DeliveryReceipt) {
        let Some(smsc_message_id) = receipt.message_id().map(str::to_string) else {
            warn!("delivery report without an id field, discarding");
            return;
        };

        let message_id = match self.inner.store.resolve_third_party(&smsc_message_id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(
                    %smsc_message_id,
                    "failed to retrieve message id for delivery report, discarding"
                );
                return;
            }
            Err(e) => {
                error!(error = %e, %smsc_message_id, "correlation store failure on delivery report");
                return;
            }
        };

        let delivery_status = DeliveryStatus::from_stat(receipt.stat().unwrap_or(""));
        let date = receipt.done_date().and_then(|raw| {
            match NaiveDateTime::parse_from_str(raw, DONE_DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!(error = %e, done_date = raw, "unparseable done date in delivery report");
                    None
                }
            }
        });

        info!(%message_id, status = ?delivery_status, "publishing delivery report");
        let metadata = DeliveryReportMetadata {
            message: receipt,
            date,
        };
        if let Err(e) = self
            .inner
            .bus
            .publish_delivery_report(&message_id, delivery_status, metadata)
            .await
        {
            error!(error = %e, %message_id, "delivery report publish failed");
        }
    }

    async fn on_deliver_sm(&self, inbound: InboundSm) {
        let mut transport_metadata = TransportMetadata::default();
        if inbound.message_type == crate::message::TransportType::Ussd {
            transport_metadata.session_info = inbound.session_info;
        }

        let message = TransportMessage {
            message_id: Uuid::new_v4().to_string(),
            to_addr: inbound.destination_addr,
            from_addr: inbound.source_addr,
            content: inbound.content,
            transport_type: inbound.message_type,
            session_event: inbound.session_event.map(|event| match event {
                UssdEvent::New => SessionEvent::New,
                UssdEvent::Continue => SessionEvent::Resume,
                UssdEvent::Close => SessionEvent::Close,
            }),
            transport_metadata,
        };

        info!(message_id = %message.message_id, "publishing inbound message");
        if let Err(e) = self.inner.bus.publish_inbound(message).await {
            // Bad content (e.g. an undecodable data_coding) must not take
            // the session down with it.
            error!(error = %e, "inbound publish failed");
        }
    }
}
