// ABOUTME: ESME session: owns the TCP connection, the bind lifecycle and PDU dispatch
// ABOUTME: Sequence numbers come from the shared KVStore so split binds never collide

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::codec::Frame;
use crate::config::{ConfigError, SmppConfig};
use crate::connection::Connection;
use crate::datatypes::tlv::{Tlv, tags};
use crate::datatypes::{
    Bind, BindMode, BindResponse, CommandStatus, DataCodingMap, DeliverSm, DeliverSmResponse,
    DeliveryReceipt, DeliveryReportParser, EnquireLink, EnquireLinkResponse, GenericNack,
    SubmitSm, SubmitSmResponse, Unbind, UnbindResponse,
};
use crate::kv::{KvError, KvStore, PrefixedStore};
use crate::message::TransportType;

/// KVStore key holding the last allocated sequence number for this bind
const SEQUENCE_NUMBER_KEY: &str = "smpp_last_sequence_number";

/// Sequence numbers wrap back to 1 when the counter reaches 2^31 - 1
const MAX_SEQUENCE_NUMBER: i64 = 0x7FFF_FFFF;

/// ussd_service_op values (3GPP TS 23.090): PSSR indication opens a
/// dialogue, PSSR response closes one, USSR request continues it.
const USSD_OP_PSSR_INDICATION: u8 = 0x01;
const USSD_OP_USSR_REQUEST: u8 = 0x02;
const USSD_OP_PSSR_RESPONSE: u8 = 0x11;

/// End-of-session flag in the low bit of its_session_info
const SESSION_INFO_END_BIT: u16 = 0x0001;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no bind response within the bind timeout")]
    BindTimeout,

    #[error("bind rejected by SMSC: {0}")]
    BindRejected(CommandStatus),

    #[error("enquire_link went unanswered for a full interval")]
    LinkDead,

    #[error("session is not connected")]
    NotConnected,

    #[error("message of {0} octets exceeds 254 and send_long_messages is off")]
    MessageTooLong(usize),

    #[error(transparent)]
    Codec(#[from] crate::codec::CodecError),

    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Why a bound session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// stop_trying() was requested; the session unbound and closed
    Stopped,
    /// The SMSC closed the TCP connection
    RemoteClosed,
    /// The SMSC sent an unbind; we acknowledged and closed
    RemoteUnbind,
}

/// Callbacks raised by the session into the transport worker. All callbacks
/// run on the session task; a slow handler delays PDU dispatch, which is the
/// ordering guarantee acks rely on.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// The bind completed; `session` submits on this bind until disconnect
    async fn on_connect(&self, session: SessionHandle);

    /// The connection is gone (any reason); pause outbound consumption
    async fn on_disconnect(&self);

    /// A submit_sm_resp arrived, successful or not
    async fn on_submit_sm_resp(&self, resp: SubmitSmResponse);

    /// A deliver_sm matched the delivery-report pattern
    async fn on_delivery_report(&self, receipt: DeliveryReceipt);

    /// A deliver_sm carrying a user message
    async fn on_deliver_sm(&self, inbound: InboundSm);
}

/// USSD dialogue position as signalled on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UssdEvent {
    New,
    Continue,
    Close,
}

/// A mobile-originated message, decoded and ready for the bus
#[derive(Debug, Clone, PartialEq)]
pub struct InboundSm {
    pub source_addr: String,
    pub destination_addr: String,
    pub content: String,
    pub message_type: TransportType,
    pub session_event: Option<UssdEvent>,
    pub session_info: Option<String>,
}

/// Arguments for one submit_sm operation
#[derive(Debug, Clone)]
pub struct SubmitParams {
    pub short_message: Vec<u8>,
    pub destination_addr: String,
    pub source_addr: String,
    pub message_type: TransportType,
    pub continue_session: bool,
    pub session_info: Option<String>,
}

/// Allocates per-bind sequence numbers out of the shared KVStore so a split
/// TX/RX pair draws from one counter.
#[derive(Clone)]
pub struct SequenceAllocator {
    store: PrefixedStore,
}

impl SequenceAllocator {
    pub fn new(store: PrefixedStore) -> Self {
        SequenceAllocator { store }
    }

    pub async fn next(&self) -> Result<u32, KvError> {
        let n = self.store.incr(SEQUENCE_NUMBER_KEY).await?;
        if n >= MAX_SEQUENCE_NUMBER {
            self.store.set(SEQUENCE_NUMBER_KEY, "1").await?;
            return Ok(1);
        }
        Ok(n as u32)
    }
}

/// Write-side handle onto a bound session. Cloneable; submits PDUs through
/// the session task and allocates sequence numbers synchronously.
#[derive(Clone)]
pub struct SessionHandle {
    frames: mpsc::Sender<Frame>,
    sequence: SequenceAllocator,
    unacked: Arc<AtomicU32>,
    config: Arc<SmppConfig>,
}

impl SessionHandle {
    pub(crate) fn new(
        frames: mpsc::Sender<Frame>,
        sequence: SequenceAllocator,
        unacked: Arc<AtomicU32>,
        config: Arc<SmppConfig>,
    ) -> Self {
        SessionHandle {
            frames,
            sequence,
            unacked,
            config,
        }
    }

    /// Submit a short message. Returns the allocated sequence number as soon
    /// as the PDU is queued for the wire, before any response arrives.
    pub async fn submit_sm(&self, params: SubmitParams) -> Result<u32, SessionError> {
        let sequence_number = self.sequence.next().await?;
        let pdu = build_submit_sm(&self.config, sequence_number, params)?;
        self.frames
            .send(Frame::SubmitSm(Box::new(pdu)))
            .await
            .map_err(|_| SessionError::NotConnected)?;
        self.unacked.fetch_add(1, Ordering::SeqCst);
        Ok(sequence_number)
    }

    /// Outbound submits still awaiting a submit_sm_resp
    pub fn unacked_count(&self) -> u32 {
        self.unacked.load(Ordering::SeqCst)
    }
}

fn build_submit_sm(
    config: &SmppConfig,
    sequence_number: u32,
    params: SubmitParams,
) -> Result<SubmitSm, SessionError> {
    let mut optional_parameters = Vec::new();

    let short_message = if params.short_message.len() > 254 {
        if !config.send_long_messages {
            return Err(SessionError::MessageTooLong(params.short_message.len()));
        }
        optional_parameters.push(Tlv::new(tags::MESSAGE_PAYLOAD, params.short_message));
        Bytes::new()
    } else {
        Bytes::from(params.short_message)
    };

    if params.message_type == TransportType::Ussd {
        optional_parameters.push(Tlv::new(
            tags::USSD_SERVICE_OP,
            vec![USSD_OP_USSR_REQUEST],
        ));
        let mut session_info = params
            .session_info
            .as_deref()
            .and_then(|s| u16::from_str_radix(s, 16).ok())
            .unwrap_or(0)
            & !SESSION_INFO_END_BIT;
        if !params.continue_session {
            session_info |= SESSION_INFO_END_BIT;
        }
        optional_parameters.push(Tlv::new(
            tags::ITS_SESSION_INFO,
            session_info.to_be_bytes().to_vec(),
        ));
    }

    Ok(SubmitSm {
        sequence_number,
        service_type: config.service_type.clone(),
        source_addr_ton: config.source_addr_ton,
        source_addr_npi: config.source_addr_npi,
        source_addr: params.source_addr,
        dest_addr_ton: config.dest_addr_ton,
        dest_addr_npi: config.dest_addr_npi,
        destination_addr: params.destination_addr,
        esm_class: 0,
        protocol_id: 0,
        priority_flag: 0,
        schedule_delivery_time: String::new(),
        validity_period: String::new(),
        registered_delivery: config.registered_delivery as u8,
        replace_if_present_flag: 0,
        data_coding: 0,
        sm_default_msg_id: 0,
        short_message,
        optional_parameters,
    })
}

/// One ESME session against the configured SMSC.
///
/// State machine: DISCONNECTED -> CONNECTING -> OPEN -> BIND_PENDING ->
/// BOUND -> (UNBINDING ->) DISCONNECTED. `run` drives one full pass; the
/// reconnecting factory calls it again after the configured delay.
pub struct EsmeSession {
    config: Arc<SmppConfig>,
    bind_mode: BindMode,
    sequence: SequenceAllocator,
    handler: Arc<dyn SessionHandler>,
    data_codings: DataCodingMap,
    receipt_parser: DeliveryReportParser,
    unacked: Arc<AtomicU32>,
}

impl EsmeSession {
    pub fn new(
        config: Arc<SmppConfig>,
        bind_mode: BindMode,
        sequence_store: PrefixedStore,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Self, ConfigError> {
        let data_codings = DataCodingMap::with_overrides(&config.data_coding_overrides)?;
        let receipt_parser = DeliveryReportParser::new(&config.delivery_report_regex)?;
        Ok(EsmeSession {
            config,
            bind_mode,
            sequence: SequenceAllocator::new(sequence_store),
            handler,
            data_codings,
            receipt_parser,
            unacked: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Connect, bind, and serve the session until it ends. Exactly one bind
    /// is active per session at a time.
    pub async fn run(&self, stop: &mut watch::Receiver<bool>) -> Result<SessionEnd, SessionError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!(%addr, mode = ?self.bind_mode, "connecting to SMSC");

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let mut conn = Connection::new(stream);

        self.bind(&mut conn).await?;
        info!(%addr, mode = ?self.bind_mode, "bound to SMSC");

        self.unacked.store(0, Ordering::SeqCst);
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let handle = SessionHandle::new(
            frame_tx,
            self.sequence.clone(),
            Arc::clone(&self.unacked),
            Arc::clone(&self.config),
        );

        self.handler.on_connect(handle).await;
        let result = self.serve(&mut conn, frame_rx, stop).await;
        self.handler.on_disconnect().await;
        result
    }

    async fn bind(&self, conn: &mut Connection) -> Result<(), SessionError> {
        let sequence_number = self.sequence.next().await?;
        let bind = Bind {
            mode: self.bind_mode,
            sequence_number,
            system_id: self.config.system_id.clone(),
            password: self.config.password.clone(),
            system_type: self.config.system_type.clone(),
            interface_version: self.config.interface_version_byte(),
            addr_ton: 0,
            addr_npi: 0,
            address_range: String::new(),
        };
        conn.write_frame(&Frame::Bind(bind)).await?;

        let resp = time::timeout(self.config.bind_timeout(), self.await_bind_resp(conn))
            .await
            .map_err(|_| SessionError::BindTimeout)??;

        if resp.command_status != CommandStatus::Ok {
            return Err(SessionError::BindRejected(resp.command_status));
        }
        Ok(())
    }

    async fn await_bind_resp(&self, conn: &mut Connection) -> Result<BindResponse, SessionError> {
        loop {
            match conn.read_frame().await? {
                None => {
                    return Err(SessionError::Connect {
                        addr: format!("{}:{}", self.config.host, self.config.port),
                        source: std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "connection closed during bind",
                        ),
                    });
                }
                Some(Frame::BindResp(resp)) => return Ok(resp),
                Some(Frame::EnquireLink(req)) => {
                    conn.write_frame(&Frame::EnquireLinkResp(EnquireLinkResponse {
                        sequence_number: req.sequence_number,
                    }))
                    .await?;
                }
                Some(other) => {
                    warn!(frame = ?other, "unexpected PDU while waiting for bind response");
                }
            }
        }
    }

    async fn serve(
        &self,
        conn: &mut Connection,
        mut frame_rx: mpsc::Receiver<Frame>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, SessionError> {
        let interval = self.config.enquire_link_interval();
        let mut enquire = time::interval_at(time::Instant::now() + interval, interval);
        let mut pending_enquire: Option<u32> = None;
        let mut writer_open = true;

        loop {
            tokio::select! {
                // Outbound submits go first when the write path is ready;
                // keep-alive traffic must never starve them.
                biased;

                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return self.unbind(conn).await;
                    }
                }

                outbound = frame_rx.recv(), if writer_open => {
                    match outbound {
                        Some(frame) => conn.write_frame(&frame).await?,
                        None => writer_open = false,
                    }
                }

                frame = conn.read_frame() => {
                    match frame? {
                        None => return Ok(SessionEnd::RemoteClosed),
                        Some(frame) => {
                            if let Some(end) = self
                                .dispatch(frame, conn, &mut pending_enquire)
                                .await?
                            {
                                return Ok(end);
                            }
                        }
                    }
                }

                _ = enquire.tick() => {
                    if pending_enquire.is_some() {
                        return Err(SessionError::LinkDead);
                    }
                    let sequence_number = self.sequence.next().await?;
                    pending_enquire = Some(sequence_number);
                    conn.write_frame(&Frame::EnquireLink(EnquireLink { sequence_number }))
                        .await?;
                }
            }
        }
    }

    async fn unbind(&self, conn: &mut Connection) -> Result<SessionEnd, SessionError> {
        let sequence_number = self.sequence.next().await?;
        if let Err(e) = conn
            .write_frame(&Frame::Unbind(Unbind { sequence_number }))
            .await
        {
            debug!(error = %e, "unbind write failed during shutdown");
            return Ok(SessionEnd::Stopped);
        }

        // Best effort: give the SMSC a moment to acknowledge, then close
        let _ = time::timeout(Duration::from_secs(5), async {
            loop {
                match conn.read_frame().await {
                    Ok(Some(Frame::UnbindResp(_))) | Ok(None) | Err(_) => break,
                    Ok(Some(_)) => continue,
                }
            }
        })
        .await;

        let _ = conn.close().await;
        Ok(SessionEnd::Stopped)
    }

    async fn dispatch(
        &self,
        frame: Frame,
        conn: &mut Connection,
        pending_enquire: &mut Option<u32>,
    ) -> Result<Option<SessionEnd>, SessionError> {
        match frame {
            Frame::EnquireLink(req) => {
                conn.write_frame(&Frame::EnquireLinkResp(EnquireLinkResponse {
                    sequence_number: req.sequence_number,
                }))
                .await?;
            }
            Frame::EnquireLinkResp(resp) => {
                if pending_enquire.take().is_none() {
                    debug!(
                        sequence_number = resp.sequence_number,
                        "unsolicited enquire_link_resp"
                    );
                }
            }
            Frame::SubmitSmResp(resp) => {
                let previous = self.unacked.fetch_update(
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    |n| n.checked_sub(1),
                );
                if previous.is_err() {
                    debug!("submit_sm_resp with no outstanding submit on this bind");
                }
                self.handler.on_submit_sm_resp(resp).await;
            }
            Frame::DeliverSm(pdu) => {
                conn.write_frame(&Frame::DeliverSmResp(DeliverSmResponse::ok(
                    pdu.sequence_number,
                )))
                .await?;
                self.handle_deliver_sm(*pdu).await;
            }
            Frame::Unbind(req) => {
                info!("SMSC requested unbind");
                conn.write_frame(&Frame::UnbindResp(UnbindResponse {
                    command_status: CommandStatus::Ok,
                    sequence_number: req.sequence_number,
                }))
                .await?;
                let _ = conn.close().await;
                return Ok(Some(SessionEnd::RemoteUnbind));
            }
            Frame::GenericNack(nack) => {
                warn!(
                    status = %nack.command_status,
                    sequence_number = nack.sequence_number,
                    "received generic_nack"
                );
            }
            Frame::Unknown {
                command_id,
                sequence_number,
                ..
            } => {
                warn!(command_id = format!("{command_id:#x}"), "unknown PDU, sending generic_nack");
                conn.write_frame(&Frame::GenericNack(GenericNack::invalid_command_id(
                    sequence_number,
                )))
                .await?;
            }
            other => {
                warn!(frame = ?other, "unexpected PDU in bound state");
            }
        }
        Ok(None)
    }

    async fn handle_deliver_sm(&self, pdu: DeliverSm) {
        let content = match self.data_codings.decode(pdu.data_coding, pdu.body()) {
            Ok(content) => content,
            Err(e) => {
                // Publish what we can; an undecodable payload is not worth
                // the connection.
                error!(
                    data_coding = pdu.data_coding,
                    error = %e,
                    "failed to decode deliver_sm payload, falling back to lossy text"
                );
                self.data_codings.decode_lossy(pdu.data_coding, pdu.body())
            }
        };

        if let Some(receipt) = self.receipt_parser.parse(&content) {
            self.handler.on_delivery_report(receipt).await;
            return;
        }
        if pdu.is_delivery_receipt() {
            warn!(
                esm_class = pdu.esm_class,
                "esm_class flags a delivery receipt but the text does not parse; \
                 treating as an inbound message"
            );
        }

        let (message_type, session_event, session_info) = match pdu.ussd_service_op() {
            Some(op) => {
                let event = match op {
                    USSD_OP_PSSR_INDICATION => UssdEvent::New,
                    USSD_OP_PSSR_RESPONSE => UssdEvent::Close,
                    _ => UssdEvent::Continue,
                };
                (TransportType::Ussd, Some(event), pdu.session_info())
            }
            None => (TransportType::Sms, None, None),
        };

        self.handler
            .on_deliver_sm(InboundSm {
                source_addr: pdu.source_addr,
                destination_addr: pdu.destination_addr,
                content,
                message_type,
                session_event,
                session_info,
            })
            .await;
    }
}
