//! Typed market-data records.
//!
//! Field names map to the compact wire tags of the stream protocol
//! (`S` symbol, `p` price, `bp`/`bs` bid price/size, ...). Records are
//! self-describing on the wire: the `T` tag that selects the record
//! kind is consumed by the codec and does not appear here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Real-time stock trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Ticker symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Trade ID, unique per exchange per day.
    #[serde(rename = "i", default)]
    pub id: i64,

    /// Exchange code where the trade executed.
    #[serde(rename = "x", default)]
    pub exchange: String,

    /// Trade price.
    #[serde(rename = "p", default)]
    pub price: Decimal,

    /// Trade size in shares.
    #[serde(rename = "s", default)]
    pub size: u32,

    /// Trade timestamp.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,

    /// Trade condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape: "A" (NYSE), "B" (ARCA/regional), "C" (NASDAQ).
    #[serde(rename = "z", default)]
    pub tape: String,
}

/// Real-time stock quote (NBBO).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Bid exchange code.
    #[serde(rename = "bx", default)]
    pub bid_exchange: String,

    /// Bid price.
    #[serde(rename = "bp", default)]
    pub bid_price: Decimal,

    /// Bid size in round lots.
    #[serde(rename = "bs", default)]
    pub bid_size: u32,

    /// Ask exchange code.
    #[serde(rename = "ax", default)]
    pub ask_exchange: String,

    /// Ask price.
    #[serde(rename = "ap", default)]
    pub ask_price: Decimal,

    /// Ask size in round lots.
    #[serde(rename = "as", default)]
    pub ask_size: u32,

    /// Quote timestamp.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,

    /// Quote condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape: "A" (NYSE), "B" (ARCA/regional), "C" (NASDAQ).
    #[serde(rename = "z", default)]
    pub tape: String,
}

/// Stock OHLCV bar. Minute bars and daily bars share this shape; the
/// wire tag (`b` vs `d`) decides which handler receives the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Ticker symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Open price.
    #[serde(rename = "o", default)]
    pub open: Decimal,

    /// High price.
    #[serde(rename = "h", default)]
    pub high: Decimal,

    /// Low price.
    #[serde(rename = "l", default)]
    pub low: Decimal,

    /// Close price.
    #[serde(rename = "c", default)]
    pub close: Decimal,

    /// Volume in shares.
    #[serde(rename = "v", default)]
    pub volume: i64,

    /// Number of trades in the bar.
    #[serde(rename = "n", default)]
    pub trade_count: i32,

    /// Volume-weighted average price.
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Start of the bar period.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
}

/// Trading status update (halts, resumptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingStatus {
    /// Ticker symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Status code, e.g. "T" (trading) or "H" (halted).
    #[serde(rename = "sc", default)]
    pub status_code: String,

    /// Status message text.
    #[serde(rename = "sm", default)]
    pub status_msg: String,

    /// Reason code for the status change.
    #[serde(rename = "rc", default)]
    pub reason_code: String,

    /// Reason message explaining the status change.
    #[serde(rename = "rm", default)]
    pub reason_msg: String,

    /// Status timestamp.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,

    /// Tape: "A" (NYSE), "B" (ARCA/regional), "C" (NASDAQ).
    #[serde(rename = "z", default)]
    pub tape: String,
}

/// Real-time crypto trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoTrade {
    /// Pair symbol, e.g. "BTCUSD".
    #[serde(rename = "S")]
    pub symbol: String,

    /// Trade ID.
    #[serde(rename = "i", default)]
    pub id: i64,

    /// Exchange code.
    #[serde(rename = "x", default)]
    pub exchange: String,

    /// Trade price.
    #[serde(rename = "p", default)]
    pub price: Decimal,

    /// Trade size; crypto sizes are fractional.
    #[serde(rename = "s", default)]
    pub size: Decimal,

    /// Taker side: "B" (buy), "S" (sell) or "-" (unknown).
    #[serde(rename = "tks", default)]
    pub taker_side: String,

    /// Trade timestamp.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
}

/// Real-time crypto quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoQuote {
    /// Pair symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Exchange code.
    #[serde(rename = "x", default)]
    pub exchange: String,

    /// Bid price.
    #[serde(rename = "bp", default)]
    pub bid_price: Decimal,

    /// Bid size.
    #[serde(rename = "bs", default)]
    pub bid_size: Decimal,

    /// Ask price.
    #[serde(rename = "ap", default)]
    pub ask_price: Decimal,

    /// Ask size.
    #[serde(rename = "as", default)]
    pub ask_size: Decimal,

    /// Quote timestamp.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
}

/// Crypto OHLCV bar; minute and daily bars share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoBar {
    /// Pair symbol.
    #[serde(rename = "S")]
    pub symbol: String,

    /// Exchange code.
    #[serde(rename = "x", default)]
    pub exchange: String,

    /// Open price.
    #[serde(rename = "o", default)]
    pub open: Decimal,

    /// High price.
    #[serde(rename = "h", default)]
    pub high: Decimal,

    /// Low price.
    #[serde(rename = "l", default)]
    pub low: Decimal,

    /// Close price.
    #[serde(rename = "c", default)]
    pub close: Decimal,

    /// Volume; crypto volume is fractional.
    #[serde(rename = "v", default)]
    pub volume: Decimal,

    /// Number of trades in the bar.
    #[serde(rename = "n", default)]
    pub trade_count: i32,

    /// Volume-weighted average price.
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Start of the bar period.
    #[serde(rename = "t", default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
}

/// A decoded data record from the stock stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StockRecord {
    /// Trade record (`t`).
    Trade(Trade),
    /// Quote record (`q`).
    Quote(Quote),
    /// Minute bar record (`b`).
    Bar(Bar),
    /// Daily bar record (`d`).
    DailyBar(Bar),
    /// Trading status record (`s`).
    Status(TradingStatus),
}

/// A decoded data record from the crypto stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CryptoRecord {
    /// Trade record (`t`).
    Trade(CryptoTrade),
    /// Quote record (`q`).
    Quote(CryptoQuote),
    /// Minute bar record (`b`).
    Bar(CryptoBar),
    /// Daily bar record (`d`).
    DailyBar(CryptoBar),
}
