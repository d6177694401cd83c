//! Shared façade engine.
//!
//! Both concrete clients wrap a [`ClientCore`] parameterized by their
//! feed's decoder. The core owns connect gatekeeping, the lifecycle
//! handle, and the subscription-change entry point; everything past
//! `connect` belongs to the supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::client::config::{parse_endpoint, StreamConfig};
use crate::domain::{Channel, Subscriptions};
use crate::error::StreamError;
use crate::stream::codec::RecordDecoder;
use crate::stream::coordinator::{ChangeKind, ChangeOutcome, SubscriptionCoordinator};
use crate::stream::session::Dispatcher;
use crate::stream::supervisor::{ClientState, Lifecycle, Supervisor};

pub(crate) struct ClientCore<D: RecordDecoder> {
    config: StreamConfig,
    /// Full endpoint (base URL plus any feed suffix); parsed at
    /// `connect` so invalid URLs surface there.
    endpoint: String,
    decoder: Arc<D>,
    dispatcher: Dispatcher<D::Record>,
    coordinator: Arc<SubscriptionCoordinator>,
    lifecycle: Arc<Lifecycle>,
    connect_called: AtomicBool,
}

impl<D: RecordDecoder> ClientCore<D> {
    pub(crate) fn new(
        config: StreamConfig,
        endpoint: String,
        decoder: D,
        dispatcher: Dispatcher<D::Record>,
        initial: Subscriptions,
    ) -> Self {
        Self {
            config,
            endpoint,
            decoder: Arc::new(decoder),
            dispatcher,
            coordinator: Arc::new(SubscriptionCoordinator::new(initial)),
            lifecycle: Arc::new(Lifecycle::new()),
            connect_called: AtomicBool::new(false),
        }
    }

    /// Establish the connection and launch the supervisor. Blocks until
    /// the first handshake succeeds or the client terminates.
    pub(crate) async fn connect(&self, cancel: CancellationToken) -> Result<(), StreamError> {
        if self.connect_called.swap(true, Ordering::SeqCst) {
            return Err(StreamError::ConnectCalledMultipleTimes);
        }

        let url = match parse_endpoint(&self.endpoint) {
            Ok(url) => url,
            Err(err) => {
                self.lifecycle.set_state(ClientState::Terminated);
                self.lifecycle.publish_terminal(Some(err.clone()));
                return Err(err);
            }
        };

        self.lifecycle.set_state(ClientState::Connecting);
        let (first_tx, first_rx) = oneshot::channel();
        let supervisor = Supervisor {
            config: self.config.clone(),
            url,
            decoder: self.decoder.clone(),
            dispatcher: self.dispatcher.clone(),
            coordinator: self.coordinator.clone(),
            lifecycle: self.lifecycle.clone(),
            cancel,
        };
        tokio::spawn(supervisor.run(first_tx));

        first_rx.await.unwrap_or(Err(StreamError::Cancelled))
    }

    #[cfg(test)]
    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolve once the supervisor has exited, with the terminal cause.
    pub(crate) async fn terminated(&self) -> Option<StreamError> {
        self.lifecycle.wait_terminated().await
    }

    /// The last server-confirmed subscription sets.
    pub(crate) async fn subscriptions(&self) -> Subscriptions {
        self.coordinator.committed().await
    }

    /// Submit a subscription change and block for the verdict.
    pub(crate) async fn subscription_change(
        &self,
        channel: Channel,
        kind: ChangeKind,
    ) -> Result<(), StreamError> {
        match self.lifecycle.state() {
            ClientState::Created | ClientState::Connecting => {
                return Err(StreamError::SubscriptionChangeBeforeConnect)
            }
            ClientState::Terminated => {
                return Err(StreamError::SubscriptionChangeAfterTerminated)
            }
            ClientState::Running | ClientState::Reconnecting => {}
        }

        match self.coordinator.submit(channel, kind).await? {
            ChangeOutcome::NoOp => Ok(()),
            ChangeOutcome::Wait(rx) => match rx.await {
                Ok(verdict) => verdict,
                Err(_) => Err(StreamError::SubscriptionChangeInterrupted),
            },
        }
    }
}
