//! End-to-end stream behavior: push delivery, failover to polling, push
//! restore and stop semantics, all on virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use partyline_chain::{
    EventStream, MemoryLedger, QueryOrder, StreamConfig, StreamHandle, StreamStopper, StreamUpdate,
};
use partyline_networking::{BackoffPolicy, MemoryConnector, MemoryListener, MemoryPeer, SessionConfig};
use partyline_shared::{
    CanonicalEvent, EventCursor, EventFilter, EventSource, PushState, RawEvent, StreamMode,
    StreamStatus,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Log output for failing runs: `RUST_LOG=partyline_chain=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn filter() -> EventFilter {
    EventFilter::new("0xABC", "party").with_activity_id("0x1")
}

fn config() -> StreamConfig {
    StreamConfig::new(filter()).with_session(SessionConfig::new("mem://push").with_backoff(
        BackoffPolicy::new(Duration::from_millis(800), Duration::from_secs(20)),
    ))
}

struct Observed {
    events: mpsc::UnboundedReceiver<CanonicalEvent>,
    statuses: mpsc::UnboundedReceiver<StreamStatus>,
}

fn start(
    config: StreamConfig,
    connector: &MemoryConnector,
    ledger: &Arc<MemoryLedger>,
) -> (StreamHandle, Observed) {
    let (event_tx, events) = mpsc::unbounded_channel();
    let (status_tx, statuses) = mpsc::unbounded_channel();
    let handle = EventStream::start(
        config,
        Arc::new(connector.clone()),
        ledger.clone(),
        move |event| {
            let _ = event_tx.send(event.clone());
        },
        move |status| {
            let _ = status_tx.send(status.clone());
        },
    );
    (handle, Observed { events, statuses })
}

async fn handshake(listener: &mut MemoryListener) -> (MemoryPeer, String) {
    let mut peer = listener.accept().await.expect("stream connects");
    let init = peer.recv_json().await.expect("init frame");
    assert_eq!(init["type"], "connection_init");
    assert!(peer.send_json(&json!({"type": "connection_ack"})));
    let subscribe = peer.recv_json().await.expect("subscribe frame");
    assert_eq!(subscribe["type"], "subscribe");
    let id = subscribe["id"].as_str().expect("subscription id").to_string();
    (peer, id)
}

fn push_frame(id: &str, name: &str, activity: &str) -> Value {
    json!({
        "type": "next",
        "id": id,
        "payload": {"data": {"events": {
            "sender": "0xsender",
            "type": format!("0xABC::party::{name}"),
            "timestamp": "1700000000000",
            "json": {"activity_id": activity}
        }}}
    })
}

fn ledger_event(seq: u32, activity: &str) -> RawEvent {
    RawEvent {
        id: EventCursor::new(json!({"txDigest": format!("d{seq}"), "eventSeq": "0"})),
        sender: "0xsender".to_string(),
        event_type: "0xABC::party::Joined".to_string(),
        timestamp_ms: Some(format!("17000000{seq:05}")),
        parsed_json: json!({"activity_id": activity}),
        transaction_module: Some("party".to_string()),
        package_id: Some("0xABC".to_string()),
    }
}

async fn wait_for_status(
    statuses: &mut mpsc::UnboundedReceiver<StreamStatus>,
    wanted: impl Fn(&StreamStatus) -> bool,
) -> StreamStatus {
    loop {
        let status = statuses.recv().await.expect("stream alive");
        if wanted(&status) {
            return status;
        }
    }
}

async fn wait_for_queries(ledger: &MemoryLedger, count: usize) {
    while ledger.queries().len() < count {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_push_failover_to_polling_and_stop() {
    init_tracing();
    let (connector, mut listener) = MemoryConnector::new(Some("graphql-transport-ws"));
    let ledger = Arc::new(MemoryLedger::new());
    let (handle, mut seen) = start(config(), &connector, &ledger);

    let (peer, id) = handshake(&mut listener).await;
    wait_for_status(&mut seen.statuses, |s| s.push_state == PushState::Connected).await;

    for name in ["Joined", "Voted", "Left"] {
        assert!(peer.send_json(&push_frame(&id, name, "0x1")));
    }
    for name in ["Joined", "Voted", "Left"] {
        let event = seen.events.recv().await.unwrap();
        assert_eq!(event.struct_name(), name);
        assert_eq!(event.source(), EventSource::Push);
    }

    // The server ends the subscription and refuses everything afterwards.
    connector.set_refusing(true);
    assert!(peer.send_json(&json!({"type": "complete", "id": id})));

    let status = wait_for_status(&mut seen.statuses, |s| s.mode == StreamMode::Pull).await;
    assert!(status.pull_active);
    assert_eq!(status.push_state, PushState::Failed);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("gave up after 5")));
    assert_eq!(connector.connect_count(), 6);
    assert_eq!(handle.stats().failovers.load(Ordering::Relaxed), 1);

    // First poll only positions the cursor.
    wait_for_queries(&ledger, 1).await;
    let seed = &ledger.queries()[0];
    assert_eq!(seed.limit, 1);
    assert_eq!(seed.order, QueryOrder::Descending);
    assert!(seed.cursor.is_none());

    ledger.push(ledger_event(3, "0x1"));
    ledger.push(ledger_event(4, "0x9"));

    let pulled = seen.events.recv().await.unwrap();
    assert_eq!(pulled.source(), EventSource::Pull);
    assert_eq!(pulled.correlation_id(), Some("0x1"));

    wait_for_queries(&ledger, 3).await;
    let after = &ledger.queries()[2];
    assert_eq!(after.order, QueryOrder::Ascending);
    assert_eq!(after.cursor, Some(ledger_event(4, "0x9").id));

    handle.stop();
    handle.stop();

    ledger.push(ledger_event(5, "0x1"));
    tokio::time::sleep(Duration::from_secs(20)).await;

    let mut closed = 0;
    while let Ok(status) = seen.statuses.try_recv() {
        if status.push_state == PushState::Closed {
            closed += 1;
            assert!(!status.pull_active);
        }
    }
    assert_eq!(closed, 1);
    assert!(seen.events.try_recv().is_err());
    assert_eq!(handle.status().push_state, PushState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_push_retry_restores_push() {
    init_tracing();
    let (connector, mut listener) = MemoryConnector::new(Some("graphql-transport-ws"));
    connector.set_refusing(true);
    let ledger = Arc::new(MemoryLedger::new());

    let config = config()
        .with_session(
            SessionConfig::new("mem://push")
                .with_backoff(BackoffPolicy::new(
                    Duration::from_millis(800),
                    Duration::from_secs(20),
                ))
                .with_max_attempts(1),
        )
        .with_push_retry_interval(Some(Duration::from_secs(30)));
    let (handle, mut seen) = start(config, &connector, &ledger);

    wait_for_status(&mut seen.statuses, |s| s.mode == StreamMode::Pull).await;
    assert_eq!(connector.connect_count(), 2);
    connector.set_refusing(false);

    let (_peer, _id) = handshake(&mut listener).await;
    let status = wait_for_status(&mut seen.statuses, |s| s.mode == StreamMode::Push).await;
    assert_eq!(status.push_state, PushState::Connected);
    assert!(!status.pull_active);

    let stats = handle.stats();
    assert_eq!(stats.failovers.load(Ordering::Relaxed), 1);
    assert_eq!(stats.push_restores.load(Ordering::Relaxed), 1);

    // Polling stopped with the restore.
    let polled = ledger.queries().len();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(ledger.queries().len(), polled);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_event_callback() {
    let (connector, mut listener) = MemoryConnector::new(Some("graphql-transport-ws"));
    let ledger = Arc::new(MemoryLedger::new());

    let stopper: Arc<OnceLock<StreamStopper>> = Arc::new(OnceLock::new());
    let delivered = Arc::new(AtomicUsize::new(0));
    let (status_tx, mut statuses) = mpsc::unbounded_channel();

    let handle = {
        let stopper = Arc::clone(&stopper);
        let delivered = Arc::clone(&delivered);
        EventStream::start(
            config(),
            Arc::new(connector.clone()),
            ledger.clone(),
            move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
                if let Some(stopper) = stopper.get() {
                    stopper.stop();
                }
            },
            move |status: &StreamStatus| {
                let _ = status_tx.send(status.clone());
            },
        )
    };
    assert!(stopper.set(handle.stopper()).is_ok());

    let (peer, id) = handshake(&mut listener).await;
    for name in ["Joined", "Voted", "Left"] {
        assert!(peer.send_json(&push_frame(&id, name, "0x1")));
    }

    wait_for_status(&mut statuses, |s| s.push_state == PushState::Closed).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert!(handle.stopper().is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_filtered_push_events_are_counted() {
    let (connector, mut listener) = MemoryConnector::new(Some("graphql-transport-ws"));
    let ledger = Arc::new(MemoryLedger::new());
    let (handle, mut seen) = start(config(), &connector, &ledger);

    let (peer, id) = handshake(&mut listener).await;
    assert!(peer.send_json(&push_frame(&id, "Joined", "0x2")));
    assert!(peer.send_json(&push_frame(&id, "Voted", "0x1")));

    let event = seen.events.recv().await.unwrap();
    assert_eq!(event.struct_name(), "Voted");

    let stats = handle.stats();
    assert_eq!(stats.events_delivered.load(Ordering::Relaxed), 1);
    assert_eq!(stats.events_filtered.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn test_filtered_pull_events_are_counted() {
    let (connector, _listener) = MemoryConnector::new(Some("graphql-transport-ws"));
    connector.set_refusing(true);
    let ledger = Arc::new(MemoryLedger::new());

    let config = config().with_session(SessionConfig::new("mem://push").with_max_attempts(0));
    let (handle, mut seen) = start(config, &connector, &ledger);

    wait_for_status(&mut seen.statuses, |s| s.mode == StreamMode::Pull).await;
    wait_for_queries(&ledger, 1).await;

    let mut other_module = ledger_event(2, "0x1");
    other_module.event_type = "0xABC::other::Joined".to_string();
    ledger.push(ledger_event(1, "0x9"));
    ledger.push(other_module);
    ledger.push(ledger_event(3, "0x1"));

    let event = seen.events.recv().await.unwrap();
    assert_eq!(event.source(), EventSource::Pull);
    assert_eq!(event.struct_name(), "Joined");
    assert_eq!(event.module(), Some("party"));

    // The rejection count follows the deliveries of the same tick.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = handle.stats();
    assert_eq!(stats.events_delivered.load(Ordering::Relaxed), 1);
    assert_eq!(stats.events_filtered.load(Ordering::Relaxed), 2);
}

#[tokio::test(start_paused = true)]
async fn test_buffered_stream_and_drop_stops() {
    let (connector, mut listener) = MemoryConnector::new(Some("graphql-transport-ws"));
    let ledger = Arc::new(MemoryLedger::new());
    let (handle, updates) =
        EventStream::start_buffered(config(), Arc::new(connector.clone()), ledger.clone(), 64);

    let (mut peer, id) = handshake(&mut listener).await;
    assert!(peer.send_json(&push_frame(&id, "Joined", "0x1")));

    let event = loop {
        match updates.try_recv() {
            Ok(StreamUpdate::Event(event)) => break event,
            Ok(StreamUpdate::Status(_)) => {}
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    };
    assert_eq!(event.struct_name(), "Joined");

    drop(handle);

    // The session unsubscribes on its way out.
    let complete = peer.recv_json().await.expect("complete frame");
    assert_eq!(complete["type"], "complete");
    assert_eq!(complete["id"], id.as_str());

    let last = updates.try_iter().last();
    assert!(matches!(
        last,
        Some(StreamUpdate::Status(StreamStatus { push_state: PushState::Closed, .. }))
    ));
}
