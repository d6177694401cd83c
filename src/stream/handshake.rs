//! Handshake driver.
//!
//! Runs the fixed welcome -> auth -> subscribe exchange over a freshly
//! opened socket, before any session tasks exist. The socket is not
//! shared yet, so reads and writes go to the transport directly; every
//! step races the caller's cancellation token.

use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::stream::codec::{self, ControlMessage, Inbound, RecordDecoder};
use crate::stream::conn::SharedConn;
use crate::stream::coordinator::SubscriptionCoordinator;
use crate::stream::messages::{AuthRequest, SubscriptionRequest};

/// Drive the handshake to completion.
///
/// On success the connection is authenticated and the carried
/// subscription intent has been acknowledged by the server.
pub(crate) async fn perform<D: RecordDecoder>(
    conn: &SharedConn,
    decoder: &D,
    key: &str,
    secret: &str,
    coordinator: &SubscriptionCoordinator,
    cancel: &CancellationToken,
) -> Result<(), StreamError> {
    // Step 1: the server speaks first.
    let welcome = read_inbound(conn, decoder, cancel).await?;
    let [Inbound::Control(ControlMessage::Connected)] = welcome.as_slice() else {
        return Err(StreamError::NoConnected);
    };

    // Step 2: authenticate.
    let auth = AuthRequest::new(key.to_string(), secret.to_string());
    write_frame(conn, &auth, cancel).await?;

    let response = read_inbound(conn, decoder, cancel).await?;
    match response.first() {
        Some(Inbound::Control(ControlMessage::Authenticated)) => {}
        Some(Inbound::Control(ControlMessage::Error(msg)))
            if matches!(msg.code, 401 | 402 | 404) =>
        {
            return Err(StreamError::InvalidCredentials);
        }
        _ => return Err(StreamError::BadAuthResponse),
    }
    tracing::debug!("stream authenticated");

    // Step 3: reapply subscription intent.
    let target = coordinator.handshake_target().await;
    if target.is_empty() {
        return Ok(());
    }
    write_frame(conn, &SubscriptionRequest::subscribe_set(&target), cancel).await?;

    loop {
        for message in read_inbound(conn, decoder, cancel).await? {
            match message {
                Inbound::Control(ControlMessage::Subscription(ack)) => {
                    coordinator.commit_ack(&ack).await;
                    return Ok(());
                }
                Inbound::Control(ControlMessage::Error(msg)) => {
                    let err = StreamError::from(&msg);
                    coordinator.fail_pending(err.clone()).await;
                    return Err(err);
                }
                other => {
                    tracing::debug!(?other, "discarding message while awaiting subscription ack");
                }
            }
        }
    }
}

async fn read_inbound<D: RecordDecoder>(
    conn: &SharedConn,
    decoder: &D,
    cancel: &CancellationToken,
) -> Result<Vec<Inbound<D::Record>>, StreamError> {
    let payload = tokio::select! {
        () = cancel.cancelled() => return Err(StreamError::Cancelled),
        result = conn.read() => result.map_err(|e| StreamError::Connection(e.to_string()))?,
    };
    codec::decode_frame(decoder, &payload).map_err(|e| StreamError::Codec(e.to_string()))
}

async fn write_frame<T: serde::Serialize>(
    conn: &SharedConn,
    request: &T,
    cancel: &CancellationToken,
) -> Result<(), StreamError> {
    let frame = codec::encode_request(request).map_err(|e| StreamError::Codec(e.to_string()))?;
    tokio::select! {
        () = cancel.cancelled() => Err(StreamError::Cancelled),
        result = conn.write(frame) => result.map_err(|e| StreamError::Connection(e.to_string())),
    }
}
