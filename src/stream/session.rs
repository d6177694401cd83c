//! Connection session.
//!
//! A session owns one handshaken socket for its lifetime and runs the
//! cooperating tasks around it:
//!
//! - the **reader** decodes inbound frames, handles control messages
//!   inline and queues data records;
//! - `processor_count` **processors** drain the record queue into the
//!   user's handlers;
//! - the **writer** serializes every outbound frame and ping through a
//!   single write queue, so frames never interleave on the socket;
//! - the **ping ticker** enqueues a transport ping per tick.
//!
//! The record queue is bounded by `buffer_size`: slow processors block
//! the reader, which is the intended backpressure signal towards the
//! server's own slow-client detection.
//!
//! The first task to fail reports its error; everything else is wound
//! down through a session-scoped cancellation token and the error is
//! returned to the supervisor. With `processor_count > 1`, callback
//! ordering is not the wire order.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::stream::codec::{self, ControlMessage, Inbound, RecordDecoder};
use crate::stream::conn::SharedConn;
use crate::stream::coordinator::SubscriptionCoordinator;
use crate::stream::ticker::{Ticker, TickerFactory};

/// One element of the write queue.
#[derive(Debug)]
pub(crate) enum WriteItem {
    /// An encoded outbound frame.
    Frame(Vec<u8>),
    /// A transport-level ping.
    Ping,
}

/// Dispatches one decoded record to the user's handler.
pub(crate) type Dispatcher<R> = Arc<dyn Fn(R) + Send + Sync>;

/// Everything a session needs besides the cancellation scope.
pub(crate) struct SessionContext<D: RecordDecoder> {
    pub conn: SharedConn,
    pub decoder: Arc<D>,
    pub dispatcher: Dispatcher<D::Record>,
    pub coordinator: Arc<SubscriptionCoordinator>,
    pub processor_count: usize,
    pub buffer_size: usize,
    pub ticker_factory: TickerFactory,
}

/// Run a session until a task fails or the caller cancels.
///
/// Returns the error that ended the session; `Cancelled` when the
/// caller's token fired.
pub(crate) async fn run<D: RecordDecoder>(
    ctx: SessionContext<D>,
    cancel: &CancellationToken,
) -> StreamError {
    let token = cancel.child_token();
    let (write_tx, write_rx) = mpsc::channel::<WriteItem>(64);
    let (record_tx, record_rx) = mpsc::channel::<D::Record>(ctx.buffer_size.max(1));
    let record_rx = Arc::new(Mutex::new(record_rx));
    let (fail_tx, mut fail_rx) = mpsc::channel::<StreamError>(4);

    ctx.coordinator.attach_writer(write_tx.clone()).await;

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(writer(
        ctx.conn.clone(),
        write_rx,
        token.clone(),
        fail_tx.clone(),
    )));
    tasks.push(tokio::spawn(reader(
        ctx.conn.clone(),
        ctx.decoder.clone(),
        ctx.coordinator.clone(),
        record_tx,
        token.clone(),
        fail_tx.clone(),
    )));
    for _ in 0..ctx.processor_count.max(1) {
        tasks.push(tokio::spawn(processor(
            record_rx.clone(),
            ctx.dispatcher.clone(),
            token.clone(),
        )));
    }
    tasks.push(tokio::spawn(pinger(
        (ctx.ticker_factory)(),
        write_tx.clone(),
        token.clone(),
    )));

    let outcome = tokio::select! {
        () = cancel.cancelled() => StreamError::Cancelled,
        err = fail_rx.recv() => {
            err.unwrap_or_else(|| StreamError::Connection("session tasks exited".to_string()))
        }
    };

    token.cancel();
    ctx.coordinator.detach_writer().await;
    ctx.conn.close().await;
    drop(write_tx);
    for task in tasks {
        let _ = task.await;
    }
    ctx.coordinator.interrupt_sent().await;

    tracing::debug!(error = %outcome, "session ended");
    outcome
}

async fn reader<D: RecordDecoder>(
    conn: SharedConn,
    decoder: Arc<D>,
    coordinator: Arc<SubscriptionCoordinator>,
    record_tx: mpsc::Sender<D::Record>,
    token: CancellationToken,
    fail_tx: mpsc::Sender<StreamError>,
) {
    loop {
        let payload = tokio::select! {
            () = token.cancelled() => return,
            result = conn.read() => match result {
                Ok(payload) => payload,
                Err(err) => {
                    let _ = fail_tx.send(StreamError::Connection(err.to_string())).await;
                    return;
                }
            },
        };

        let inbound = match codec::decode_frame(&*decoder, &payload) {
            Ok(inbound) => inbound,
            Err(err) => {
                let _ = fail_tx.send(StreamError::Codec(err.to_string())).await;
                return;
            }
        };

        for message in inbound {
            match message {
                Inbound::Record(record) => {
                    let sent = tokio::select! {
                        () = token.cancelled() => return,
                        result = record_tx.send(record) => result.is_ok(),
                    };
                    if !sent {
                        return;
                    }
                }
                Inbound::Control(ControlMessage::Subscription(ack)) => {
                    coordinator.commit_ack(&ack).await;
                }
                Inbound::Control(ControlMessage::Error(msg)) => {
                    let err = StreamError::from(&msg);
                    coordinator.fail_pending(err.clone()).await;
                    if err.is_irrecoverable() {
                        let _ = fail_tx.send(err).await;
                        return;
                    }
                }
                Inbound::Control(ControlMessage::Connected | ControlMessage::Authenticated) => {
                    tracing::debug!("discarding stray control message on active session");
                }
            }
        }
    }
}

async fn writer(
    conn: SharedConn,
    mut write_rx: mpsc::Receiver<WriteItem>,
    token: CancellationToken,
    fail_tx: mpsc::Sender<StreamError>,
) {
    loop {
        let item = tokio::select! {
            () = token.cancelled() => return,
            item = write_rx.recv() => match item {
                Some(item) => item,
                None => return,
            },
        };

        let result = match item {
            WriteItem::Frame(payload) => conn.write(payload).await,
            WriteItem::Ping => conn.ping().await,
        };
        if let Err(err) = result {
            let _ = fail_tx.send(StreamError::Connection(err.to_string())).await;
            return;
        }
    }
}

async fn processor<R: Send + 'static>(
    record_rx: Arc<Mutex<mpsc::Receiver<R>>>,
    dispatcher: Dispatcher<R>,
    token: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            () = token.cancelled() => return,
            record = async { record_rx.lock().await.recv().await } => record,
        };
        match record {
            Some(record) => dispatcher(record),
            None => return,
        }
    }
}

async fn pinger(
    mut ticker: Box<dyn Ticker>,
    write_tx: mpsc::Sender<WriteItem>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            () = ticker.tick() => {
                if write_tx.send(WriteItem::Ping).await.is_err() {
                    return;
                }
            }
        }
    }
}
