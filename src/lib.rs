//! Async streaming client for Alpaca's real-time market data feeds.
//!
//! Maintains a persistent, authenticated, subscription-driven websocket
//! connection delivering trades, quotes, bars, daily bars and (stocks
//! only) trading statuses to user callbacks.
//!
//! The connection lifecycle is managed for you: the client performs the
//! welcome/auth/subscribe handshake, keeps the socket healthy with
//! periodic pings, and transparently reconnects with the same
//! subscriptions after transport failures. Subscription changes either
//! complete against the live server, fail with a precise
//! [`StreamError`], or are cleanly interrupted.
//!
//! # Example
//!
//! ```no_run
//! use alpaca_stream_client::{StocksClient, Trade};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StocksClient::builder("iex")
//!         .credentials("API_KEY", "API_SECRET")
//!         .with_trades(|trade: Trade| println!("{} @ {}", trade.symbol, trade.price), ["AAPL"])
//!         .build();
//!
//!     let cancel = CancellationToken::new();
//!     client.connect(cancel.clone()).await?;
//!
//!     client
//!         .subscribe_to_quotes(|quote| println!("{quote:?}"), ["MSFT"])
//!         .await?;
//!
//!     // Runs until cancelled or an irrecoverable error occurs.
//!     if let Some(cause) = client.terminated().await {
//!         eprintln!("stream terminated: {cause}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Ordering
//!
//! With the default single processor, records reach callbacks in wire
//! order within a session. Raising `processor_count` trades ordering
//! for parallel dispatch. Order across a reconnect is never guaranteed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod domain;
pub mod error;
pub mod stream;

pub use client::{
    Credentials, CryptoClient, CryptoClientBuilder, StocksClient, StocksClientBuilder,
    DEFAULT_CRYPTO_BASE_URL, DEFAULT_STOCKS_BASE_URL,
};
pub use domain::{
    Bar, Channel, CryptoBar, CryptoQuote, CryptoTrade, Quote, Subscriptions, Trade, TradingStatus,
};
pub use error::StreamError;
pub use stream::{
    ClientState, Conn, ConnCreator, ConnError, SharedConn, Ticker, TickerFactory, PING_INTERVAL,
};
