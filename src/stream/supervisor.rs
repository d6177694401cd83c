//! Supervisor / reconnect loop.
//!
//! The supervisor owns the socket across the client's lifetime: it
//! repeatedly builds a connection, drives the handshake, and runs a
//! session until the caller cancels, an irrecoverable error occurs, or
//! the reconnect limit is exhausted. Recoverable failures back off by
//! `consecutive_failures x reconnect_delay` before the next attempt.
//!
//! The first handshake is special: its outcome is reported through a
//! oneshot so `connect` can return synchronously. The terminal outcome
//! is published exactly once on the termination watch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::config::StreamConfig;
use crate::error::StreamError;
use crate::stream::codec::RecordDecoder;
use crate::stream::conn::SharedConn;
use crate::stream::coordinator::SubscriptionCoordinator;
use crate::stream::handshake;
use crate::stream::session::{self, Dispatcher, SessionContext};

/// Lifecycle states of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed; `connect` not yet called.
    Created,
    /// First handshake in flight; `connect` is blocking.
    Connecting,
    /// A session is live.
    Running,
    /// The previous session failed recoverably; a new attempt is due.
    Reconnecting,
    /// Terminal; the terminated watch carries the cause.
    Terminated,
}

/// Terminal publication slot.
#[derive(Debug, Clone, Default)]
pub(crate) enum Termination {
    #[default]
    Pending,
    Done(Option<StreamError>),
}

/// Lifecycle state shared between the façade and the supervisor. The
/// supervisor is the sole mutator after `connect` hands off.
pub(crate) struct Lifecycle {
    state: parking_lot::Mutex<ClientState>,
    terminated_tx: watch::Sender<Termination>,
    terminated_rx: watch::Receiver<Termination>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (terminated_tx, terminated_rx) = watch::channel(Termination::Pending);
        Self {
            state: parking_lot::Mutex::new(ClientState::Created),
            terminated_tx,
            terminated_rx,
        }
    }

    pub(crate) fn state(&self) -> ClientState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        *self.state.lock() = state;
    }

    pub(crate) fn publish_terminal(&self, cause: Option<StreamError>) {
        let _ = self.terminated_tx.send(Termination::Done(cause));
    }

    /// Resolve once the supervisor has exited, with the terminal cause.
    pub(crate) async fn wait_terminated(&self) -> Option<StreamError> {
        let mut rx = self.terminated_rx.clone();
        loop {
            {
                let value = rx.borrow_and_update();
                if let Termination::Done(cause) = &*value {
                    return cause.clone();
                }
            }
            if rx.changed().await.is_err() {
                return Some(StreamError::Cancelled);
            }
        }
    }
}

/// The outer connection state machine.
pub(crate) struct Supervisor<D: RecordDecoder> {
    pub config: StreamConfig,
    pub url: Url,
    pub decoder: Arc<D>,
    pub dispatcher: Dispatcher<D::Record>,
    pub coordinator: Arc<SubscriptionCoordinator>,
    pub lifecycle: Arc<Lifecycle>,
    pub cancel: CancellationToken,
}

impl<D: RecordDecoder> Supervisor<D> {
    /// Run to termination. `first_result` receives the first handshake
    /// outcome (or the terminal error if none succeeds).
    pub(crate) async fn run(self, first_result: oneshot::Sender<Result<(), StreamError>>) {
        let mut first = Some(first_result);
        let mut failures: u64 = 0;

        let terminal = loop {
            if self.cancel.is_cancelled() {
                break StreamError::Cancelled;
            }

            let err = match self.attempt().await {
                Ok(conn) => {
                    failures = 0;
                    self.lifecycle.set_state(ClientState::Running);
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                    tracing::info!(url = %self.url, "stream connected");
                    self.run_session(conn).await
                }
                Err(err) => err,
            };

            if matches!(err, StreamError::Cancelled) || err.is_irrecoverable() {
                break err;
            }

            failures += 1;
            if self.config.reconnect_limit > 0 && failures > self.config.reconnect_limit {
                break StreamError::RetriesExhausted {
                    attempts: failures,
                    source: Box::new(err),
                };
            }

            let delay = backoff_delay(self.config.reconnect_delay, failures);
            tracing::warn!(
                error = %err,
                consecutive_failures = failures,
                delay_ms = delay.as_millis(),
                "stream connection lost; reconnecting"
            );
            self.lifecycle.set_state(ClientState::Reconnecting);

            tokio::select! {
                () = self.cancel.cancelled() => break StreamError::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.terminate(terminal, first).await;
    }

    /// One connection attempt: dial and handshake.
    async fn attempt(&self) -> Result<SharedConn, StreamError> {
        tracing::debug!(url = %self.url, "opening stream connection");
        let conn = tokio::select! {
            () = self.cancel.cancelled() => return Err(StreamError::Cancelled),
            result = (self.config.conn_creator)(self.url.clone()) => {
                result.map_err(|e| StreamError::Connection(e.to_string()))?
            }
        };

        if let Err(err) = handshake::perform(
            &conn,
            &*self.decoder,
            self.config.credentials.key(),
            self.config.credentials.secret(),
            &self.coordinator,
            &self.cancel,
        )
        .await
        {
            conn.close().await;
            return Err(err);
        }

        Ok(conn)
    }

    async fn run_session(&self, conn: SharedConn) -> StreamError {
        session::run(
            SessionContext {
                conn,
                decoder: self.decoder.clone(),
                dispatcher: self.dispatcher.clone(),
                coordinator: self.coordinator.clone(),
                processor_count: self.config.processor_count,
                buffer_size: self.config.buffer_size,
                ticker_factory: self.config.ticker_factory.clone(),
            },
            &self.cancel,
        )
        .await
    }

    async fn terminate(
        &self,
        terminal: StreamError,
        first: Option<oneshot::Sender<Result<(), StreamError>>>,
    ) {
        tracing::info!(cause = %terminal, "stream client terminated");
        self.coordinator.interrupt_all().await;
        self.lifecycle.set_state(ClientState::Terminated);
        if let Some(tx) = first {
            let _ = tx.send(Err(terminal.clone()));
        }
        self.lifecycle.publish_terminal(Some(terminal));
    }
}

/// Linear backoff: the delay grows with each consecutive failure.
fn backoff_delay(base: Duration, failures: u64) -> Duration {
    base.saturating_mul(u32::try_from(failures).unwrap_or(u32::MAX))
}
