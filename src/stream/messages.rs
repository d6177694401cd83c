//! Wire message types for the stream protocol.
//!
//! Inbound control messages arrive inside MessagePack arrays next to
//! data records; outbound requests are single MessagePack maps with an
//! `action` field.
//!
//! # Control messages
//!
//! ```text
//! {"T": "success", "msg": "connected"}
//! {"T": "success", "msg": "authenticated"}
//! {"T": "error", "code": 402, "msg": "auth failed"}
//! {"T": "subscription", "trades": [...], "quotes": [...], ...}
//! ```
//!
//! # Error codes
//!
//! - 400: invalid syntax
//! - 401: not authenticated
//! - 402: auth failed
//! - 403: already authenticated
//! - 404: auth timeout
//! - 405: symbol limit exceeded
//! - 406: connection limit exceeded
//! - 407: slow client
//! - 408: insufficient subscription
//! - 500: internal error

use serde::{Deserialize, Serialize};

use crate::domain::{Channel, Subscriptions};

/// Success message indicating connection or authentication succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Message type (always "success").
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Which milestone succeeded.
    pub msg: SuccessKind,
}

/// Kind of success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessKind {
    /// Initial connection established.
    Connected,
    /// Authentication accepted.
    Authenticated,
}

/// Error message with code and description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Message type (always "error").
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Numeric error code.
    pub code: i32,

    /// Error description.
    pub msg: String,
}

/// Subscription confirmation listing the full active symbol sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    /// Message type (always "subscription").
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Active trade symbols.
    #[serde(default)]
    pub trades: Vec<String>,

    /// Active quote symbols.
    #[serde(default)]
    pub quotes: Vec<String>,

    /// Active minute-bar symbols.
    #[serde(default)]
    pub bars: Vec<String>,

    /// Active daily-bar symbols.
    #[serde(default, rename = "dailyBars")]
    pub daily_bars: Vec<String>,

    /// Active trading-status symbols.
    #[serde(default)]
    pub statuses: Vec<String>,
}

impl SubscriptionAck {
    /// The acknowledged sets as subscription state.
    #[must_use]
    pub fn to_subscriptions(&self) -> Subscriptions {
        Subscriptions {
            trades: self.trades.iter().cloned().collect(),
            quotes: self.quotes.iter().cloned().collect(),
            bars: self.bars.iter().cloned().collect(),
            daily_bars: self.daily_bars.iter().cloned().collect(),
            statuses: self.statuses.iter().cloned().collect(),
        }
    }
}

/// Authentication request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    /// Action: "auth".
    pub action: &'static str,

    /// API key.
    pub key: String,

    /// API secret.
    pub secret: String,
}

impl AuthRequest {
    /// Create an authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }
}

/// Subscribe or unsubscribe request carrying per-channel symbol lists.
/// Empty channels are omitted from the encoded frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionRequest {
    /// Action: "subscribe" or "unsubscribe".
    pub action: String,

    /// Trade symbols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,

    /// Quote symbols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<String>,

    /// Minute-bar symbols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bars: Vec<String>,

    /// Daily-bar symbols.
    #[serde(skip_serializing_if = "Vec::is_empty", rename = "dailyBars")]
    pub daily_bars: Vec<String>,

    /// Trading-status symbols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
}

impl SubscriptionRequest {
    /// A subscribe request for every symbol in `subs`.
    #[must_use]
    pub fn subscribe_set(subs: &Subscriptions) -> Self {
        Self {
            action: "subscribe".to_string(),
            trades: sorted(&subs.trades),
            quotes: sorted(&subs.quotes),
            bars: sorted(&subs.bars),
            daily_bars: sorted(&subs.daily_bars),
            statuses: sorted(&subs.statuses),
        }
    }

    /// A subscribe request for added symbols on a single channel.
    #[must_use]
    pub fn subscribe_channel(channel: Channel, symbols: Vec<String>) -> Self {
        let mut req = Self {
            action: "subscribe".to_string(),
            ..Default::default()
        };
        req.set_channel(channel, symbols);
        req
    }

    /// An unsubscribe request for symbols on a single channel.
    #[must_use]
    pub fn unsubscribe_channel(channel: Channel, symbols: Vec<String>) -> Self {
        let mut req = Self {
            action: "unsubscribe".to_string(),
            ..Default::default()
        };
        req.set_channel(channel, symbols);
        req
    }

    fn set_channel(&mut self, channel: Channel, symbols: Vec<String>) {
        match channel {
            Channel::Trades => self.trades = symbols,
            Channel::Quotes => self.quotes = symbols,
            Channel::Bars => self.bars = symbols,
            Channel::DailyBars => self.daily_bars = symbols,
            Channel::Statuses => self.statuses = symbols,
        }
    }
}

fn sorted(set: &std::collections::HashSet<String>) -> Vec<String> {
    let mut symbols: Vec<String> = set.iter().cloned().collect();
    symbols.sort_unstable();
    symbols
}
