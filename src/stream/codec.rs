//! MessagePack frame codec.
//!
//! Inbound frames are MessagePack arrays of self-describing maps; each
//! map carries a `T` tag naming its kind. Control kinds (`success`,
//! `error`, `subscription`) are shared between feeds; data kinds are
//! decoded by a feed-specific [`RecordDecoder`]. Unknown kinds are
//! logged and discarded. Outbound requests are encoded as single
//! named-field maps.

use std::io::Cursor;

use serde::Serialize;

use crate::domain::{CryptoRecord, StockRecord};
use crate::stream::messages::{ErrorMessage, SubscriptionAck, SuccessKind, SuccessMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// MessagePack payload could not be read.
    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmpv::decode::Error),

    /// A value could not be encoded.
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A recognized record did not match its expected shape.
    #[error("invalid message: {0}")]
    Value(#[from] rmpv::ext::Error),

    /// The frame was not an array of records.
    #[error("invalid frame: {0}")]
    InvalidFormat(String),
}

/// A protocol-level control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// `success {msg: connected}` - the server's welcome.
    Connected,
    /// `success {msg: authenticated}` - auth accepted.
    Authenticated,
    /// `error {code, msg}`.
    Error(ErrorMessage),
    /// `subscription {...}` - the full acknowledged symbol sets.
    Subscription(SubscriptionAck),
}

/// One decoded element of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<R> {
    /// A control message handled by the connection machinery.
    Control(ControlMessage),
    /// A data record dispatched to user callbacks.
    Record(R),
}

/// Feed-specific decoding of data records by their `T` tag.
pub trait RecordDecoder: Send + Sync + 'static {
    /// The record type this feed produces.
    type Record: Send + std::fmt::Debug + 'static;

    /// Decode a record of kind `tag`, or `None` if the kind is unknown
    /// to this feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is a known kind but malformed.
    fn decode_record(&self, tag: &str, value: rmpv::Value)
        -> Result<Option<Self::Record>, CodecError>;
}

/// Decoder for the stock stream (`t`, `q`, `b`, `d`, `s`).
#[derive(Debug, Default, Clone, Copy)]
pub struct StockDecoder;

impl RecordDecoder for StockDecoder {
    type Record = StockRecord;

    fn decode_record(
        &self,
        tag: &str,
        value: rmpv::Value,
    ) -> Result<Option<StockRecord>, CodecError> {
        Ok(match tag {
            "t" => Some(StockRecord::Trade(rmpv::ext::from_value(value)?)),
            "q" => Some(StockRecord::Quote(rmpv::ext::from_value(value)?)),
            "b" => Some(StockRecord::Bar(rmpv::ext::from_value(value)?)),
            "d" => Some(StockRecord::DailyBar(rmpv::ext::from_value(value)?)),
            "s" => Some(StockRecord::Status(rmpv::ext::from_value(value)?)),
            _ => None,
        })
    }
}

/// Decoder for the crypto stream (`t`, `q`, `b`, `d`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoDecoder;

impl RecordDecoder for CryptoDecoder {
    type Record = CryptoRecord;

    fn decode_record(
        &self,
        tag: &str,
        value: rmpv::Value,
    ) -> Result<Option<CryptoRecord>, CodecError> {
        Ok(match tag {
            "t" => Some(CryptoRecord::Trade(rmpv::ext::from_value(value)?)),
            "q" => Some(CryptoRecord::Quote(rmpv::ext::from_value(value)?)),
            "b" => Some(CryptoRecord::Bar(rmpv::ext::from_value(value)?)),
            "d" => Some(CryptoRecord::DailyBar(rmpv::ext::from_value(value)?)),
            _ => None,
        })
    }
}

/// Decode one inbound frame into its classified elements.
///
/// # Errors
///
/// Returns an error if the payload is not a MessagePack array or if a
/// recognized record is malformed.
pub fn decode_frame<D: RecordDecoder>(
    decoder: &D,
    payload: &[u8],
) -> Result<Vec<Inbound<D::Record>>, CodecError> {
    let value = rmpv::decode::read_value(&mut Cursor::new(payload))?;
    let rmpv::Value::Array(items) = value else {
        return Err(CodecError::InvalidFormat(
            "expected an array of records".to_string(),
        ));
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let tag = item
            .as_map()
            .and_then(|map| {
                map.iter()
                    .find(|(key, _)| key.as_str() == Some("T"))
                    .and_then(|(_, value)| value.as_str())
            })
            .map(str::to_owned);

        match tag.as_deref() {
            Some("success") => {
                let msg: SuccessMessage = rmpv::ext::from_value(item)?;
                out.push(Inbound::Control(match msg.msg {
                    SuccessKind::Connected => ControlMessage::Connected,
                    SuccessKind::Authenticated => ControlMessage::Authenticated,
                }));
            }
            Some("error") => {
                let msg: ErrorMessage = rmpv::ext::from_value(item)?;
                out.push(Inbound::Control(ControlMessage::Error(msg)));
            }
            Some("subscription") => {
                let msg: SubscriptionAck = rmpv::ext::from_value(item)?;
                out.push(Inbound::Control(ControlMessage::Subscription(msg)));
            }
            Some(tag) => match decoder.decode_record(tag, item)? {
                Some(record) => out.push(Inbound::Record(record)),
                None => tracing::debug!(kind = tag, "discarding unknown message kind"),
            },
            None => tracing::debug!("discarding untagged message"),
        }
    }

    Ok(out)
}

/// Encode an outbound request as a named-field MessagePack map.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_request<T: Serialize>(request: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(request)?)
}
