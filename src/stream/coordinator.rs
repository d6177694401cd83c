//! Subscription coordination.
//!
//! [`SubscriptionCoordinator`] owns the committed subscription state,
//! the caller's intended state, and the single pending-change slot. It
//! is shared between the façade (which submits changes), the handshake
//! driver (which reapplies intent on a fresh socket), and the session
//! reader (which commits acknowledgements and fails rejected changes).
//!
//! Invariants:
//! - `current` only changes when a `subscription` acknowledgement
//!   arrives, and then it is replaced wholesale by the server's sets.
//! - At most one pending change exists; a second submit fails.
//! - Acknowledgements and server errors only settle a change whose
//!   frame reached a live session (`sent`); a change queued while
//!   disconnected is flushed once the next session's writer attaches.
//! - A sent change that loses its session resolves with
//!   [`StreamError::SubscriptionChangeInterrupted`], but its desired
//!   set becomes the carried intent so the next handshake reapplies it.

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::domain::{Channel, Subscriptions};
use crate::error::StreamError;
use crate::stream::codec;
use crate::stream::messages::{SubscriptionAck, SubscriptionRequest};
use crate::stream::session::WriteItem;

/// A user-requested mutation of one channel's symbol set.
#[derive(Debug, Clone)]
pub(crate) enum ChangeKind {
    /// Add symbols to the channel.
    Subscribe(Vec<String>),
    /// Clear every symbol on the channel.
    Unsubscribe,
}

/// What [`SubscriptionCoordinator::submit`] decided.
pub(crate) enum ChangeOutcome {
    /// The desired state already matches the committed state.
    NoOp,
    /// The change is pending; await the server's verdict.
    Wait(oneshot::Receiver<Result<(), StreamError>>),
}

struct PendingChange {
    desired: Subscriptions,
    frame: Vec<u8>,
    sent: bool,
    result: oneshot::Sender<Result<(), StreamError>>,
}

struct State {
    /// Last server-confirmed symbol sets.
    current: Subscriptions,
    /// What the next handshake should apply; equals `current` except
    /// while an interrupted change is being carried forward.
    desired: Subscriptions,
    pending: Option<PendingChange>,
    writer: Option<mpsc::Sender<WriteItem>>,
}

pub(crate) struct SubscriptionCoordinator {
    inner: Mutex<State>,
}

impl SubscriptionCoordinator {
    pub(crate) fn new(initial: Subscriptions) -> Self {
        Self {
            inner: Mutex::new(State {
                current: Subscriptions::default(),
                desired: initial,
                pending: None,
                writer: None,
            }),
        }
    }

    /// Submit a change. Encodes the wire frame against the committed
    /// state and hands it to the active session's writer if one exists;
    /// otherwise the change is queued until a session attaches.
    pub(crate) async fn submit(
        &self,
        channel: Channel,
        kind: ChangeKind,
    ) -> Result<ChangeOutcome, StreamError> {
        let mut st = self.inner.lock().await;
        if st.pending.is_some() {
            return Err(StreamError::SubscriptionChangeAlreadyInProgress);
        }

        let (next, request) = match kind {
            ChangeKind::Subscribe(symbols) => {
                let next = st.desired.with_added(channel, symbols.iter().cloned());
                if next == st.current {
                    return Ok(ChangeOutcome::NoOp);
                }
                let mut added = st.current.missing_from(channel, symbols);
                if added.is_empty() {
                    // The delta is already covered upstream; resend the
                    // full channel set so the server still answers.
                    added = sorted(next.channel(channel));
                }
                (next, SubscriptionRequest::subscribe_channel(channel, added))
            }
            ChangeKind::Unsubscribe => {
                let next = st.desired.with_cleared(channel);
                if next == st.current {
                    return Ok(ChangeOutcome::NoOp);
                }
                let removing = sorted(st.current.channel(channel));
                if removing.is_empty() {
                    // The server never saw these symbols; adjusting
                    // intent locally is enough.
                    st.desired = next;
                    return Ok(ChangeOutcome::NoOp);
                }
                (next, SubscriptionRequest::unsubscribe_channel(channel, removing))
            }
        };

        let frame =
            codec::encode_request(&request).map_err(|e| StreamError::Codec(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        let mut pending = PendingChange {
            desired: next,
            frame: frame.clone(),
            sent: false,
            result: tx,
        };

        if let Some(writer) = st.writer.clone() {
            pending.sent = writer.send(WriteItem::Frame(frame)).await.is_ok();
        }
        st.pending = Some(pending);
        Ok(ChangeOutcome::Wait(rx))
    }

    /// The symbol sets a fresh handshake must subscribe: the carried
    /// intent, i.e. the last committed state unless an interrupted
    /// change moved it. A change still queued unsent is not part of the
    /// handshake; it is flushed when the session's writer attaches.
    pub(crate) async fn handshake_target(&self) -> Subscriptions {
        self.inner.lock().await.desired.clone()
    }

    /// Make the session's write queue available and flush a change that
    /// was queued while disconnected.
    pub(crate) async fn attach_writer(&self, writer: mpsc::Sender<WriteItem>) {
        let mut st = self.inner.lock().await;
        st.writer = Some(writer.clone());
        if let Some(pending) = st.pending.as_mut() {
            if !pending.sent {
                pending.sent = writer
                    .send(WriteItem::Frame(pending.frame.clone()))
                    .await
                    .is_ok();
            }
        }
    }

    pub(crate) async fn detach_writer(&self) {
        self.inner.lock().await.writer = None;
    }

    /// Commit a server acknowledgement: replace the committed state
    /// wholesale and resolve a pending change whose frame was answered.
    pub(crate) async fn commit_ack(&self, ack: &SubscriptionAck) {
        let mut st = self.inner.lock().await;
        let confirmed = ack.to_subscriptions();
        st.current = confirmed.clone();
        st.desired = confirmed;
        if st.pending.as_ref().is_some_and(|p| p.sent) {
            if let Some(pending) = st.pending.take() {
                let _ = pending.result.send(Ok(()));
            }
        }
    }

    /// Fail an in-flight change with a server-mapped error; intent
    /// snaps back to the last confirmed state.
    pub(crate) async fn fail_pending(&self, err: StreamError) {
        let mut st = self.inner.lock().await;
        if st.pending.as_ref().is_some_and(|p| p.sent) {
            if let Some(pending) = st.pending.take() {
                st.desired = st.current.clone();
                let _ = pending.result.send(Err(err));
            }
        } else {
            tracing::warn!(error = %err, "server error with no subscription change in flight");
        }
    }

    /// Called when a session ends: a change that reached its wire is
    /// interrupted, with its desired set carried into the next
    /// handshake. A queued unsent change stays pending.
    pub(crate) async fn interrupt_sent(&self) {
        let mut st = self.inner.lock().await;
        if st.pending.as_ref().is_some_and(|p| p.sent) {
            if let Some(pending) = st.pending.take() {
                st.desired = pending.desired;
                let _ = pending
                    .result
                    .send(Err(StreamError::SubscriptionChangeInterrupted));
            }
        }
    }

    /// Called on client termination: release any pending change.
    pub(crate) async fn interrupt_all(&self) {
        let mut st = self.inner.lock().await;
        if let Some(pending) = st.pending.take() {
            st.desired = pending.desired;
            let _ = pending
                .result
                .send(Err(StreamError::SubscriptionChangeInterrupted));
        }
    }

    /// The last server-confirmed symbol sets.
    pub(crate) async fn committed(&self) -> Subscriptions {
        self.inner.lock().await.current.clone()
    }
}

fn sorted(set: &std::collections::HashSet<String>) -> Vec<String> {
    let mut symbols: Vec<String> = set.iter().cloned().collect();
    symbols.sort_unstable();
    symbols
}
