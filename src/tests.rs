//! End-to-end tests: a real transport worker against an in-process SMSC stub.
//!
//! The stub speaks SMPP over a loopback TcpListener using the crate's own
//! codec, which keeps the wire handling honest on both sides.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::time;

use crate::bus::testing::{BusEvent, RecordingBus, RecordingFailures};
use crate::codec::Frame;
use crate::config::SmppConfig;
use crate::connection::Connection;
use crate::datatypes::tlv::{Tlv, tags};
use crate::datatypes::{
    BindMode, BindResponse, CommandStatus, DeliverSm, SubmitSmResponse, UnbindResponse,
};
use crate::kv::{KvStore, MemoryStore};
use crate::message::{
    DeliveryStatus, SessionEvent, TransportMessage, TransportMetadata, TransportType,
};
use crate::worker::SmppTransport;

async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    time::timeout(Duration::from_secs(5), async {
        loop {
            if cond().await {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}

struct StubSmsc {
    conn: Connection,
}

impl StubSmsc {
    /// Accept the worker's connection and complete the bind handshake.
    async fn accept_and_bind(listener: &TcpListener, expected_mode: BindMode) -> Self {
        let (socket, _) = listener.accept().await.expect("accept failed");
        let mut smsc = StubSmsc {
            conn: Connection::new(socket),
        };

        let bind = match smsc.read().await {
            Frame::Bind(bind) => bind,
            other => panic!("expected bind, got {other:?}"),
        };
        assert_eq!(bind.mode, expected_mode);
        assert_eq!(bind.interface_version, 0x34);

        smsc.write(&Frame::BindResp(BindResponse {
            mode: bind.mode,
            command_status: CommandStatus::Ok,
            sequence_number: bind.sequence_number,
            system_id: "STUB".into(),
        }))
        .await;
        smsc
    }

    async fn read(&mut self) -> Frame {
        time::timeout(Duration::from_secs(5), self.conn.read_frame())
            .await
            .expect("timed out reading from worker")
            .expect("read failed")
            .expect("worker closed the connection")
    }

    async fn write(&mut self, frame: &Frame) {
        self.conn.write_frame(frame).await.expect("write failed");
    }
}

fn deliver_sm(
    sequence_number: u32,
    source_addr: &str,
    destination_addr: &str,
    text: &[u8],
    esm_class: u8,
    optional_parameters: Vec<Tlv>,
) -> DeliverSm {
    DeliverSm {
        sequence_number,
        service_type: String::new(),
        source_addr_ton: 0,
        source_addr_npi: 0,
        source_addr: source_addr.into(),
        dest_addr_ton: 0,
        dest_addr_npi: 1,
        destination_addr: destination_addr.into(),
        esm_class,
        protocol_id: 0,
        priority_flag: 0,
        schedule_delivery_time: String::new(),
        validity_period: String::new(),
        registered_delivery: 0,
        replace_if_present_flag: 0,
        data_coding: 0,
        sm_default_msg_id: 0,
        short_message: Bytes::copy_from_slice(text),
        optional_parameters,
    }
}

fn outbound(id: &str, to_addr: &str, content: &str) -> TransportMessage {
    TransportMessage {
        message_id: id.into(),
        to_addr: to_addr.into(),
        from_addr: "27700000000".into(),
        content: content.into(),
        transport_type: TransportType::Sms,
        session_event: None,
        transport_metadata: TransportMetadata::default(),
    }
}

struct TestRig {
    listener: TcpListener,
    config: SmppConfig,
    bus: Arc<RecordingBus>,
    failures: Arc<RecordingFailures>,
    kv: Arc<dyn KvStore>,
}

impl TestRig {
    async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = SmppConfig::new("127.0.0.1", port, "sysid", "pw");
        config.initial_reconnect_delay = 0;
        TestRig {
            listener,
            config,
            bus: RecordingBus::new(),
            failures: RecordingFailures::new(),
            kv: Arc::new(MemoryStore::new()),
        }
    }
}

#[tokio::test]
async fn transceiver_end_to_end() {
    let rig = TestRig::new().await;
    let (worker, factory) = SmppTransport::transceiver(
        rig.config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();

    let mut smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;

    // Bound: the worker lifts the outbound pause
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 1 }
    })
    .await;

    // Outbound message becomes a submit_sm
    worker
        .handle_outbound_message(outbound("m1", "27761234567", "hi"))
        .await
        .unwrap();
    let submit = match smsc.read().await {
        Frame::SubmitSm(pdu) => pdu,
        other => panic!("expected submit_sm, got {other:?}"),
    };
    assert_eq!(submit.destination_addr, "27761234567");
    assert_eq!(submit.short_message.as_ref(), b"hi");

    // Success response: ack published, third-party id recorded
    smsc.write(&Frame::SubmitSmResp(SubmitSmResponse {
        command_status: CommandStatus::Ok,
        sequence_number: submit.sequence_number,
        message_id: "SM1".into(),
    }))
    .await;

    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move {
            bus.events().await.contains(&BusEvent::Ack {
                user_message_id: "m1".into(),
                sent_message_id: "SM1".into(),
            })
        }
    })
    .await;

    // Delivery report for the acked message
    let receipt_text = b"id:SM1 sub:001 dlvrd:001 submit date:130101120000 \
done date:130101120500 stat:DELIVRD err:000 text:hi";
    smsc.write(&Frame::DeliverSm(Box::new(deliver_sm(
        100,
        "27761234567",
        "27700000000",
        receipt_text,
        0x04,
        vec![],
    ))))
    .await;
    match smsc.read().await {
        Frame::DeliverSmResp(resp) => assert_eq!(resp.sequence_number, 100),
        other => panic!("expected deliver_sm_resp, got {other:?}"),
    }

    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move {
            bus.events().await.iter().any(|e| {
                matches!(
                    e,
                    BusEvent::DeliveryReport {
                        user_message_id,
                        delivery_status: DeliveryStatus::Delivered,
                        ..
                    } if user_message_id == "m1"
                )
            })
        }
    })
    .await;

    // Plain mobile-originated SMS
    smsc.write(&Frame::DeliverSm(Box::new(deliver_sm(
        101,
        "27761234567",
        "12345",
        b"hello there",
        0,
        vec![],
    ))))
    .await;
    match smsc.read().await {
        Frame::DeliverSmResp(resp) => assert_eq!(resp.sequence_number, 101),
        other => panic!("expected deliver_sm_resp, got {other:?}"),
    }

    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move {
            bus.events().await.iter().any(|e| {
                matches!(e, BusEvent::Inbound(msg) if msg.content == "hello there"
                    && msg.from_addr == "27761234567"
                    && msg.transport_type == TransportType::Sms)
            })
        }
    })
    .await;

    // USSD deliver_sm carries session metadata through to the bus
    smsc.write(&Frame::DeliverSm(Box::new(deliver_sm(
        102,
        "27761234567",
        "*120*99#",
        b"1",
        0,
        vec![
            Tlv::new(tags::USSD_SERVICE_OP, Bytes::from_static(&[0x02])),
            Tlv::new(tags::ITS_SESSION_INFO, Bytes::from_static(&[0x00, 0x2a])),
        ],
    ))))
    .await;
    match smsc.read().await {
        Frame::DeliverSmResp(_) => {}
        other => panic!("expected deliver_sm_resp, got {other:?}"),
    }

    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move {
            bus.events().await.iter().any(|e| {
                matches!(e, BusEvent::Inbound(msg)
                    if msg.transport_type == TransportType::Ussd
                    && msg.session_event == Some(SessionEvent::Resume)
                    && msg.transport_metadata.session_info.as_deref() == Some("002a"))
            })
        }
    })
    .await;

    // Graceful shutdown: unbind on the wire, then the factory stops
    let stopper = worker.clone();
    let shutdown = tokio::spawn(async move { stopper.shutdown(factory).await });

    match smsc.read().await {
        Frame::Unbind(req) => {
            smsc.write(&Frame::UnbindResp(UnbindResponse {
                command_status: CommandStatus::Ok,
                sequence_number: req.sequence_number,
            }))
            .await;
        }
        other => panic!("expected unbind, got {other:?}"),
    }

    shutdown.await.unwrap().unwrap();
    assert_eq!(rig.bus.pause_count().await, 1); // the final disconnect
}

#[tokio::test]
async fn rejected_bind_reconnects() {
    let rig = TestRig::new().await;
    let (worker, factory) = SmppTransport::transceiver(
        rig.config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();

    // First attempt: refuse the bind
    let (socket, _) = rig.listener.accept().await.unwrap();
    let mut conn = Connection::new(socket);
    let bind = match conn.read_frame().await.unwrap().unwrap() {
        Frame::Bind(bind) => bind,
        other => panic!("expected bind, got {other:?}"),
    };
    conn.write_frame(&Frame::BindResp(BindResponse {
        mode: bind.mode,
        command_status: CommandStatus::BindFailed,
        sequence_number: bind.sequence_number,
        system_id: String::new(),
    }))
    .await
    .unwrap();
    drop(conn);

    // Second attempt succeeds
    let _smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 1 }
    })
    .await;

    factory.stop_trying();
    drop(worker);
}

#[tokio::test]
async fn remote_unbind_triggers_reconnect_and_pause() {
    let rig = TestRig::new().await;
    let (_worker, factory) = SmppTransport::transceiver(
        rig.config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();

    let mut smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 1 }
    })
    .await;

    // SMSC-initiated unbind: acknowledged, then the factory reconnects
    smsc.write(&Frame::Unbind(crate::datatypes::Unbind {
        sequence_number: 500,
    }))
    .await;
    match smsc.read().await {
        Frame::UnbindResp(resp) => assert_eq!(resp.sequence_number, 500),
        other => panic!("expected unbind_resp, got {other:?}"),
    }

    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.pause_count().await == 1 }
    })
    .await;

    let _smsc2 = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 2 }
    })
    .await;

    factory.stop_trying();
}

#[tokio::test]
async fn enquire_link_keepalive_round_trip() {
    let mut rig = TestRig::new().await;
    rig.config.smpp_enquire_link_interval = 1;

    let (_worker, factory) = SmppTransport::transceiver(
        rig.config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();

    let mut smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;

    // The worker pings within one interval; answer it
    let enquire = match smsc.read().await {
        Frame::EnquireLink(req) => req,
        other => panic!("expected enquire_link, got {other:?}"),
    };
    smsc.write(&Frame::EnquireLinkResp(
        crate::datatypes::EnquireLinkResponse {
            sequence_number: enquire.sequence_number,
        },
    ))
    .await;

    // Answering keeps the session alive for the next interval
    match smsc.read().await {
        Frame::EnquireLink(_) => {}
        other => panic!("expected second enquire_link, got {other:?}"),
    }

    factory.stop_trying();
}

#[tokio::test]
async fn unanswered_enquire_link_drops_and_reconnects() {
    let mut rig = TestRig::new().await;
    rig.config.smpp_enquire_link_interval = 1;

    let (_worker, factory) = SmppTransport::transceiver(
        rig.config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();

    let mut smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;
    match smsc.read().await {
        Frame::EnquireLink(_) => {} // deliberately not answered
        other => panic!("expected enquire_link, got {other:?}"),
    }

    // One interval later the worker declares the link dead and reconnects
    let _smsc2 = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 2 }
    })
    .await;

    factory.stop_trying();
}

#[tokio::test]
async fn transmitter_and_receiver_bind_with_their_own_flavors() {
    let rig = TestRig::new().await;
    let mut config = rig.config.clone();
    config.split_bind_prefix = "split-pair".into();

    let (_tx_worker, tx_factory) = SmppTransport::transmitter(
        config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();
    let _tx_smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transmitter).await;

    let rx_bus = RecordingBus::new();
    let (_rx_worker, rx_factory) = SmppTransport::receiver(
        config,
        Arc::clone(&rig.kv),
        rx_bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();
    let _rx_smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Receiver).await;

    // The transmitter unpauses outbound consumption; the receiver never does
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 1 }
    })
    .await;
    assert_eq!(rx_bus.unpause_count().await, 0);

    tx_factory.stop_trying();
    rx_factory.stop_trying();
}

#[tokio::test]
async fn dead_endpoint_keeps_retrying_until_stopped() {
    // Point the worker at a port nothing listens on
    let throwaway = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = throwaway.local_addr().unwrap().port();
    drop(throwaway);

    let mut config = SmppConfig::new("127.0.0.1", port, "sysid", "pw");
    config.initial_reconnect_delay = 0;

    let bus = RecordingBus::new();
    let (worker, factory) = SmppTransport::transceiver(
        config,
        Arc::new(MemoryStore::new()),
        bus.clone(),
        RecordingFailures::new(),
    )
    .unwrap();

    // Give it a few connect attempts, then stop; shutdown must complete
    time::sleep(Duration::from_millis(50)).await;
    worker.shutdown(factory).await.unwrap();
    assert_eq!(bus.unpause_count().await, 0);
}

#[tokio::test]
async fn submits_queued_behind_each_other_get_distinct_sequence_numbers() {
    let rig = TestRig::new().await;
    let (worker, factory) = SmppTransport::transceiver(
        rig.config.clone(),
        Arc::clone(&rig.kv),
        rig.bus.clone(),
        rig.failures.clone(),
    )
    .unwrap();

    let mut smsc = StubSmsc::accept_and_bind(&rig.listener, BindMode::Transceiver).await;
    let bus = rig.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.unpause_count().await == 1 }
    })
    .await;

    for i in 0..5 {
        worker
            .handle_outbound_message(outbound(&format!("m{i}"), "123", "x"))
            .await
            .unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        match smsc.read().await {
            Frame::SubmitSm(pdu) => assert!(seen.insert(pdu.sequence_number)),
            other => panic!("expected submit_sm, got {other:?}"),
        }
    }

    factory.stop_trying();
}
