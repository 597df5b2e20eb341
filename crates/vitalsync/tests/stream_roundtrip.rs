//! End-to-end streaming tests against an in-process WebSocket server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use vitalsync::channel::{ConnectionPhase, ReconnectPolicy, TransportChannel};
use vitalsync::store::{LiveStateStore, StateSnapshot, StoreLimits};
use vitalsync::telemetry::{kinds, RadarFrame, VitalsSample};

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(40), 10)
}

fn frame_envelope(sequence: u64) -> String {
    format!(
        r#"{{"type":"frame","timestamp":{sequence}.5,"payload":{{"sequence":{sequence},"timestamp":{sequence}.5,"magnitudes":[0.1,0.2,0.3]}}}}"#
    )
}

fn vitals_envelope(heart_rate: f64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_secs_f64();
    format!(
        r#"{{"type":"vitals","timestamp":{now},"payload":{{"heart_rate":{heart_rate},"respiration_rate":15.0,"heart_confidence":0.9,"respiration_confidence":0.85,"phase_stability":0.8,"quality":0.92,"source":"chirp-phase","timestamp":{now}}}}}"#
    )
}

/// Bind a listener and return its port alongside the listener.
async fn bind_local() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

/// Build a channel wired into a fresh store, frame and vitals handlers
/// bound, with a wildcard dispatch counter.
fn wired_channel(port: u16) -> (TransportChannel, LiveStateStore, Arc<AtomicUsize>) {
    let channel = TransportChannel::new(
        "telemetry",
        format!("ws://127.0.0.1:{port}/ws/telemetry"),
        fast_policy(),
    );
    let store = LiveStateStore::new(&StoreLimits::default());

    let s = store.clone();
    channel.subscribe(kinds::FRAME, move |envelope| {
        if let Some(frame) = RadarFrame::from_payload(&envelope.payload) {
            s.apply_frame(frame);
        }
    });
    let s = store.clone();
    channel.subscribe(kinds::VITALS, move |envelope| {
        if let Some(sample) = VitalsSample::from_payload(&envelope.payload) {
            s.apply_vitals(sample);
        }
    });

    let dispatched = Arc::new(AtomicUsize::new(0));
    let counter = dispatched.clone();
    channel.subscribe_all(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    (channel, store, dispatched)
}

async fn wait_for_snapshot(
    rx: &mut watch::Receiver<StateSnapshot>,
    predicate: impl Fn(&StateSnapshot) -> bool,
) {
    timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&rx.borrow()) {
                return;
            }
            rx.changed().await.expect("store dropped");
        }
    })
    .await
    .expect("snapshot condition not reached in time");
}

async fn wait_for_phase(channel: &TransportChannel, phase: ConnectionPhase) {
    timeout(Duration::from_secs(5), async {
        while channel.phase() != phase {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("channel never reached {phase}"));
}

#[tokio::test]
async fn delivers_envelopes_into_the_store() {
    let (listener, port) = bind_local().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = accept_async(stream).await.expect("handshake");
        for sequence in 1..=3 {
            socket
                .send(Message::Text(frame_envelope(sequence)))
                .await
                .expect("send frame");
        }
        socket
            .send(Message::Text(vitals_envelope(64.0)))
            .await
            .expect("send vitals");
        // Keep the connection open until the test ends.
        futures_util::future::pending::<()>().await;
    });

    let (channel, store, dispatched) = wired_channel(port);
    let mut rx = store.subscribe();
    channel.connect();

    wait_for_snapshot(&mut rx, |snapshot| {
        snapshot.frames.len() == 3 && snapshot.vitals.len() == 1
    })
    .await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.frames.oldest().unwrap().sequence, 1);
    assert_eq!(snapshot.frames.latest().unwrap().sequence, 3);
    assert!((snapshot.vitals.latest().unwrap().heart_rate - 64.0).abs() < f64::EPSILON);

    // The wildcard subscriber saw all four envelopes.
    assert_eq!(dispatched.load(Ordering::SeqCst), 4);
    assert!(channel.is_open());

    channel.disconnect();
}

#[tokio::test]
async fn malformed_frames_do_not_break_the_stream() {
    let (listener, port) = bind_local().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = accept_async(stream).await.expect("handshake");

        // Garbage first: not JSON, then JSON without a usable type.
        socket
            .send(Message::Text("!! not json !!".to_string()))
            .await
            .expect("send garbage");
        socket
            .send(Message::Text(r#"{"type":42,"timestamp":1.0}"#.to_string()))
            .await
            .expect("send bad type");

        // Then a well-formed envelope on the same connection.
        socket
            .send(Message::Text(frame_envelope(7)))
            .await
            .expect("send frame");
        futures_util::future::pending::<()>().await;
    });

    let (channel, store, dispatched) = wired_channel(port);
    let mut rx = store.subscribe();
    channel.connect();

    wait_for_snapshot(&mut rx, |snapshot| snapshot.frames.len() == 1).await;

    // Zero handler invocations for the garbage, exactly one dispatch for
    // the valid envelope, and the connection survived throughout.
    assert_eq!(dispatched.load(Ordering::SeqCst), 1);
    assert_eq!(store.snapshot().frames.latest().unwrap().sequence, 7);
    assert!(channel.is_open());

    channel.disconnect();
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (listener, port) = bind_local().await;

    tokio::spawn(async move {
        // First session: one frame, then the server drops the socket.
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = accept_async(stream).await.expect("handshake");
        socket
            .send(Message::Text(frame_envelope(1)))
            .await
            .expect("send frame");
        drop(socket);

        // Second session after the client's backoff.
        let (stream, _) = listener.accept().await.expect("accept again");
        let mut socket = accept_async(stream).await.expect("handshake again");
        socket
            .send(Message::Text(frame_envelope(2)))
            .await
            .expect("send frame again");
        futures_util::future::pending::<()>().await;
    });

    let (channel, store, _dispatched) = wired_channel(port);

    let transitions: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let t = transitions.clone();
    channel.on_connectivity(move |connected| {
        t.lock().unwrap().push(connected);
    });

    let mut rx = store.subscribe();
    channel.connect();

    wait_for_snapshot(&mut rx, |snapshot| snapshot.frames.len() == 2).await;
    wait_for_phase(&channel, ConnectionPhase::Open).await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.frames.oldest().unwrap().sequence, 1);
    assert_eq!(snapshot.frames.latest().unwrap().sequence, 2);

    // Connected, lost, reconnected.
    assert_eq!(*transitions.lock().unwrap(), vec![true, false, true]);

    channel.disconnect();
}

#[tokio::test]
async fn send_reaches_the_server_only_while_open() {
    let (listener, port) = bind_local().await;
    let (received_tx, mut received_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        use futures_util::StreamExt;
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = accept_async(stream).await.expect("handshake");
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let _ = received_tx.send(text);
            }
        }
    });

    let (channel, _store, _dispatched) = wired_channel(port);

    // Dropped: the channel has not connected yet.
    channel.send(&serde_json::json!({"command": "too-early"}));

    channel.connect();
    wait_for_phase(&channel, ConnectionPhase::Open).await;

    channel.send(&serde_json::json!({"command": "start", "profile": "vital-signs"}));

    let received = timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .expect("server should receive the command")
        .expect("server channel open");
    let value: serde_json::Value = serde_json::from_str(&received).expect("command is JSON");
    assert_eq!(value["command"], "start");

    // The pre-connect send was dropped outright, never queued.
    assert!(received_rx.try_recv().is_err());

    channel.disconnect();
}
