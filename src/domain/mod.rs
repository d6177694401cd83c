//! Domain layer - market-data records and subscription state.
//!
//! These types carry no I/O or async machinery; the stream layer decodes
//! into them and the client façade exposes them to handler callbacks.

pub mod data;
pub mod subscription;

pub use data::{
    Bar, CryptoBar, CryptoQuote, CryptoRecord, CryptoTrade, Quote, StockRecord, Trade,
    TradingStatus,
};
pub use subscription::{Channel, Subscriptions};
