//! Shared test harness: a scriptable mock transport, frame builders and
//! flow helpers for driving a client through its full lifecycle.

// Each integration test binary uses a different slice of the harness.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use alpaca_stream_client::{Conn, ConnCreator, ConnError, SharedConn, Ticker, TickerFactory};

// =============================================================================
// Mock connection
// =============================================================================

/// A mock transport driven through channels: the test feeds inbound
/// frames and observes everything the client writes.
pub struct MockConn {
    read_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: CancellationToken,
    ping_disabled: AtomicBool,
}

#[async_trait]
impl Conn for MockConn {
    async fn read(&self) -> Result<Vec<u8>, ConnError> {
        let mut read_rx = self.read_rx.lock().await;
        tokio::select! {
            () = self.closed.cancelled() => Err(ConnError::Closed),
            frame = read_rx.recv() => frame.ok_or(ConnError::Closed),
        }
    }

    async fn write(&self, payload: Vec<u8>) -> Result<(), ConnError> {
        if self.closed.is_cancelled() {
            return Err(ConnError::Closed);
        }
        self.write_tx
            .send(payload)
            .map_err(|_| ConnError::Closed)
    }

    async fn ping(&self) -> Result<(), ConnError> {
        if self.closed.is_cancelled() || self.ping_disabled.load(Ordering::SeqCst) {
            return Err(ConnError::Other("ping failed".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {}
}

/// Test-side handle to a [`MockConn`].
pub struct MockConnHandle {
    conn: Arc<MockConn>,
    read_tx: mpsc::UnboundedSender<Vec<u8>>,
    write_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockConnHandle {
    pub fn new() -> Self {
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        Self {
            conn: Arc::new(MockConn {
                read_rx: Mutex::new(read_rx),
                write_tx,
                closed: CancellationToken::new(),
                ping_disabled: AtomicBool::new(false),
            }),
            read_tx,
            write_rx: Mutex::new(write_rx),
        }
    }

    pub fn conn(&self) -> SharedConn {
        self.conn.clone()
    }

    /// A creator that always hands out this connection.
    pub fn creator(&self) -> ConnCreator {
        let conn = self.conn();
        Arc::new(move |_url| {
            let conn = conn.clone();
            Box::pin(async move { Ok(conn) })
        })
    }

    /// Feed an inbound frame to the client.
    pub fn push(&self, frame: Vec<u8>) {
        let _ = self.read_tx.send(frame);
    }

    /// Sever the connection: pending and future reads/writes fail.
    pub fn close(&self) {
        self.conn.closed.cancel();
    }

    pub fn disable_ping(&self) {
        self.conn.ping_disabled.store(true, Ordering::SeqCst);
    }

    /// The next frame the client wrote, decoded to a value map.
    pub async fn expect_write(&self) -> rmpv::Value {
        let mut write_rx = self.write_rx.lock().await;
        let frame = tokio::time::timeout(Duration::from_secs(2), write_rx.recv())
            .await
            .expect("timed out waiting for a client write")
            .expect("write channel closed");
        rmpv::decode::read_value(&mut &frame[..]).expect("client wrote invalid MessagePack")
    }
}

// =============================================================================
// Scripted connection sequences
// =============================================================================

/// Hands out scripted connections (or dial errors) in order. An empty
/// script makes the creator wait until the test pushes the next entry,
/// which keeps reconnect timing races out of the tests.
#[derive(Clone)]
pub struct ConnScript {
    queue: Arc<parking_lot::Mutex<VecDeque<Result<SharedConn, String>>>>,
}

impl ConnScript {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
        }
    }

    pub fn push_conn(&self, handle: &MockConnHandle) {
        self.queue.lock().push_back(Ok(handle.conn()));
    }

    pub fn push_error(&self, message: &str) {
        self.queue.lock().push_back(Err(message.to_string()));
    }

    pub fn creator(&self) -> ConnCreator {
        let queue = self.queue.clone();
        Arc::new(move |_url| {
            let queue = queue.clone();
            Box::pin(async move {
                loop {
                    if let Some(entry) = queue.lock().pop_front() {
                        return entry.map_err(ConnError::Other);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        })
    }
}

// =============================================================================
// Manual ping ticker
// =============================================================================

struct ManualTicker {
    ticks: mpsc::UnboundedReceiver<()>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.ticks.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

struct NeverTicker;

#[async_trait]
impl Ticker for NeverTicker {
    async fn tick(&mut self) {
        std::future::pending::<()>().await;
    }
}

/// A ticker factory whose first ticker is driven by the returned sender;
/// later sessions get a ticker that never fires.
pub fn manual_ticker() -> (mpsc::UnboundedSender<()>, TickerFactory) {
    let (tick_tx, tick_rx) = mpsc::unbounded_channel();
    let slot = Arc::new(parking_lot::Mutex::new(Some(tick_rx)));
    let factory: TickerFactory = Arc::new(move || {
        slot.lock().take().map_or_else(
            || Box::new(NeverTicker) as Box<dyn Ticker>,
            |ticks| Box::new(ManualTicker { ticks }) as Box<dyn Ticker>,
        )
    });
    (tick_tx, factory)
}

// =============================================================================
// Frame builders
// =============================================================================

fn encode_frame(records: Vec<rmpv::Value>) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &rmpv::Value::Array(records)).unwrap();
    buf
}

pub fn success_frame(msg: &str) -> Vec<u8> {
    encode_frame(vec![rmpv::Value::Map(vec![
        ("T".into(), "success".into()),
        ("msg".into(), msg.into()),
    ])])
}

pub fn error_frame(code: i64, msg: &str) -> Vec<u8> {
    encode_frame(vec![rmpv::Value::Map(vec![
        ("T".into(), "error".into()),
        ("code".into(), code.into()),
        ("msg".into(), msg.into()),
    ])])
}

fn symbol_array(symbols: &[&str]) -> rmpv::Value {
    rmpv::Value::Array(symbols.iter().map(|s| (*s).into()).collect())
}

#[derive(Default)]
pub struct AckSets<'a> {
    pub trades: &'a [&'a str],
    pub quotes: &'a [&'a str],
    pub bars: &'a [&'a str],
    pub daily_bars: &'a [&'a str],
    pub statuses: &'a [&'a str],
}

pub fn sub_ack_frame(sets: &AckSets<'_>) -> Vec<u8> {
    encode_frame(vec![rmpv::Value::Map(vec![
        ("T".into(), "subscription".into()),
        ("trades".into(), symbol_array(sets.trades)),
        ("quotes".into(), symbol_array(sets.quotes)),
        ("bars".into(), symbol_array(sets.bars)),
        ("dailyBars".into(), symbol_array(sets.daily_bars)),
        ("statuses".into(), symbol_array(sets.statuses)),
    ])])
}

/// Serialize a data record and tag it with its `T` kind.
pub fn record<T: Serialize>(tag: &str, record: &T) -> rmpv::Value {
    let bytes = rmp_serde::to_vec_named(record).unwrap();
    let value = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
    let rmpv::Value::Map(mut map) = value else {
        panic!("record did not serialize to a map");
    };
    map.insert(0, ("T".into(), tag.into()));
    rmpv::Value::Map(map)
}

/// Wrap tagged records into one inbound frame.
pub fn records_frame(records: Vec<rmpv::Value>) -> Vec<u8> {
    encode_frame(records)
}

/// An arbitrary untagged map, for malformed-welcome scenarios.
pub fn raw_map_frame(pairs: &[(&str, &str)]) -> Vec<u8> {
    encode_frame(vec![rmpv::Value::Map(
        pairs.iter().map(|(k, v)| ((*k).into(), (*v).into())).collect(),
    )])
}

// =============================================================================
// Flow helpers
// =============================================================================

/// Queue the server's side of a clean handshake: welcome + auth-ok.
pub fn write_initial_flow(handle: &MockConnHandle) {
    handle.push(success_frame("connected"));
    handle.push(success_frame("authenticated"));
}

/// Queue a clean handshake that also acknowledges a subscription.
pub fn write_initial_flow_with_sub(handle: &MockConnHandle, sets: &AckSets<'_>) {
    write_initial_flow(handle);
    handle.push(sub_ack_frame(sets));
}

pub fn str_field(map: &rmpv::Value, key: &str) -> Option<String> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .and_then(|(_, v)| v.as_str())
        .map(str::to_owned)
}

pub fn str_list(map: &rmpv::Value, key: &str) -> Vec<String> {
    map.as_map()
        .and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .and_then(|(_, v)| v.as_array())
        })
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// Assert the client's first post-connect frame is a correct auth.
pub async fn expect_auth(handle: &MockConnHandle, key: &str, secret: &str) {
    let frame = handle.expect_write().await;
    assert_eq!(str_field(&frame, "action").as_deref(), Some("auth"));
    assert_eq!(str_field(&frame, "key").as_deref(), Some(key));
    assert_eq!(str_field(&frame, "secret").as_deref(), Some(secret));
}

/// Assert the next frame is a subscribe and return it.
pub async fn expect_subscribe(handle: &MockConnHandle) -> rmpv::Value {
    let frame = handle.expect_write().await;
    assert_eq!(str_field(&frame, "action").as_deref(), Some("subscribe"));
    frame
}

pub fn sorted(mut symbols: Vec<String>) -> Vec<String> {
    symbols.sort();
    symbols
}
