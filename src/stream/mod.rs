//! Connection machinery: transport, codec, handshake, session and the
//! supervisor that strings them together across reconnects.

pub mod codec;
pub mod conn;
pub(crate) mod coordinator;
pub(crate) mod handshake;
pub mod messages;
pub(crate) mod session;
pub(crate) mod supervisor;
pub mod ticker;

pub use codec::{CodecError, ControlMessage, CryptoDecoder, Inbound, RecordDecoder, StockDecoder};
pub use conn::{Conn, ConnCreator, ConnError, SharedConn, WebSocketConn};
pub use supervisor::ClientState;
pub use ticker::{IntervalTicker, Ticker, TickerFactory, PING_INTERVAL};
