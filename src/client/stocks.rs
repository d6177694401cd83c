//! Stock-stream client.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::client::config::{Credentials, StreamConfig, DEFAULT_STOCKS_BASE_URL};
use crate::client::core::ClientCore;
use crate::domain::{Bar, Channel, Quote, StockRecord, Subscriptions, Trade, TradingStatus};
use crate::error::StreamError;
use crate::stream::codec::StockDecoder;
use crate::stream::conn::ConnCreator;
use crate::stream::coordinator::ChangeKind;
use crate::stream::ticker::TickerFactory;

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

fn noop<T>() -> Handler<T> {
    Arc::new(|_| {})
}

/// Handler registry; swapped synchronously by `subscribe_to_*` calls.
struct StockHandlers {
    trade: RwLock<Handler<Trade>>,
    quote: RwLock<Handler<Quote>>,
    bar: RwLock<Handler<Bar>>,
    daily_bar: RwLock<Handler<Bar>>,
    status: RwLock<Handler<TradingStatus>>,
}

impl StockHandlers {
    fn new() -> Self {
        Self {
            trade: RwLock::new(noop()),
            quote: RwLock::new(noop()),
            bar: RwLock::new(noop()),
            daily_bar: RwLock::new(noop()),
            status: RwLock::new(noop()),
        }
    }

    fn dispatch(&self, record: StockRecord) {
        match record {
            StockRecord::Trade(trade) => (self.trade.read().clone())(trade),
            StockRecord::Quote(quote) => (self.quote.read().clone())(quote),
            StockRecord::Bar(bar) => (self.bar.read().clone())(bar),
            StockRecord::DailyBar(bar) => (self.daily_bar.read().clone())(bar),
            StockRecord::Status(status) => (self.status.read().clone())(status),
        }
    }
}

/// Streaming client for real-time stock market data.
///
/// Built through [`StocksClient::builder`]; `connect` establishes the
/// stream and keeps it alive across transparent reconnects until the
/// cancellation token fires or an irrecoverable error occurs.
pub struct StocksClient {
    core: ClientCore<StockDecoder>,
    handlers: Arc<StockHandlers>,
}

impl StocksClient {
    /// Start building a client for the given feed (e.g. `iex`, `sip`).
    #[must_use]
    pub fn builder(feed: impl Into<String>) -> StocksClientBuilder {
        StocksClientBuilder {
            config: StreamConfig::new(DEFAULT_STOCKS_BASE_URL),
            feed: feed.into(),
            initial: Subscriptions::default(),
            handlers: StockHandlers::new(),
        }
    }

    /// Connect and launch the background machinery.
    ///
    /// Blocks until the first handshake settles. Cancelling `cancel`
    /// later shuts the client down and publishes on [`terminated`].
    ///
    /// [`terminated`]: StocksClient::terminated
    ///
    /// # Errors
    ///
    /// Returns the first handshake's failure, the URL parse error, or
    /// [`StreamError::ConnectCalledMultipleTimes`] on a repeat call.
    pub async fn connect(&self, cancel: CancellationToken) -> Result<(), StreamError> {
        self.core.connect(cancel).await
    }

    /// Resolve once the client has terminated, with the terminal cause.
    pub async fn terminated(&self) -> Option<StreamError> {
        self.core.terminated().await
    }

    /// The last server-confirmed subscription sets.
    pub async fn subscriptions(&self) -> Subscriptions {
        self.core.subscriptions().await
    }

    /// Subscribe to trades for `symbols`, installing `handler` for all
    /// trade records.
    ///
    /// # Errors
    ///
    /// Fails per the subscription-change contract: before connect,
    /// after termination, while another change is pending, when the
    /// server rejects the change, or when the change is interrupted.
    pub async fn subscribe_to_trades<F, I, S>(
        &self,
        handler: F,
        symbols: I,
    ) -> Result<(), StreamError>
    where
        F: Fn(Trade) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.trade.write() = Arc::new(handler);
        self.change(Channel::Trades, ChangeKind::Subscribe(collect(symbols)))
            .await
    }

    /// Subscribe to quotes for `symbols`, installing `handler`.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn subscribe_to_quotes<F, I, S>(
        &self,
        handler: F,
        symbols: I,
    ) -> Result<(), StreamError>
    where
        F: Fn(Quote) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.quote.write() = Arc::new(handler);
        self.change(Channel::Quotes, ChangeKind::Subscribe(collect(symbols)))
            .await
    }

    /// Subscribe to minute bars for `symbols`, installing `handler`.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn subscribe_to_bars<F, I, S>(
        &self,
        handler: F,
        symbols: I,
    ) -> Result<(), StreamError>
    where
        F: Fn(Bar) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.bar.write() = Arc::new(handler);
        self.change(Channel::Bars, ChangeKind::Subscribe(collect(symbols)))
            .await
    }

    /// Subscribe to daily bars for `symbols`, installing `handler`.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn subscribe_to_daily_bars<F, I, S>(
        &self,
        handler: F,
        symbols: I,
    ) -> Result<(), StreamError>
    where
        F: Fn(Bar) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.daily_bar.write() = Arc::new(handler);
        self.change(Channel::DailyBars, ChangeKind::Subscribe(collect(symbols)))
            .await
    }

    /// Subscribe to trading statuses for `symbols`, installing `handler`.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn subscribe_to_statuses<F, I, S>(
        &self,
        handler: F,
        symbols: I,
    ) -> Result<(), StreamError>
    where
        F: Fn(TradingStatus) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.status.write() = Arc::new(handler);
        self.change(Channel::Statuses, ChangeKind::Subscribe(collect(symbols)))
            .await
    }

    /// Drop every trade subscription.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn unsubscribe_from_trades(&self) -> Result<(), StreamError> {
        self.change(Channel::Trades, ChangeKind::Unsubscribe).await
    }

    /// Drop every quote subscription.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn unsubscribe_from_quotes(&self) -> Result<(), StreamError> {
        self.change(Channel::Quotes, ChangeKind::Unsubscribe).await
    }

    /// Drop every minute-bar subscription.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn unsubscribe_from_bars(&self) -> Result<(), StreamError> {
        self.change(Channel::Bars, ChangeKind::Unsubscribe).await
    }

    /// Drop every daily-bar subscription.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn unsubscribe_from_daily_bars(&self) -> Result<(), StreamError> {
        self.change(Channel::DailyBars, ChangeKind::Unsubscribe).await
    }

    /// Drop every trading-status subscription.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_trades`](StocksClient::subscribe_to_trades).
    pub async fn unsubscribe_from_statuses(&self) -> Result<(), StreamError> {
        self.change(Channel::Statuses, ChangeKind::Unsubscribe).await
    }

    async fn change(&self, channel: Channel, kind: ChangeKind) -> Result<(), StreamError> {
        self.core.subscription_change(channel, kind).await
    }
}

fn collect<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    symbols.into_iter().map(Into::into).collect()
}

/// Builder for [`StocksClient`].
pub struct StocksClientBuilder {
    config: StreamConfig,
    feed: String,
    initial: Subscriptions,
    handlers: StockHandlers,
}

impl StocksClientBuilder {
    /// Override the stream endpoint.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the API key and secret.
    #[must_use]
    pub fn credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.credentials = Credentials::new(key, secret);
        self
    }

    /// Accept `limit` consecutive connection failures (`0` = unlimited)
    /// with `delay x failures` between attempts.
    #[must_use]
    pub fn reconnect_settings(mut self, limit: u64, delay: Duration) -> Self {
        self.config.reconnect_limit = limit;
        self.config.reconnect_delay = delay;
        self
    }

    /// Number of parallel record processors. Above 1, callback order is
    /// not the wire order.
    #[must_use]
    pub fn processor_count(mut self, count: usize) -> Self {
        self.config.processor_count = count.max(1);
        self
    }

    /// Capacity of the inbound record queue.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Inject a transport factory. Intended for tests.
    #[must_use]
    pub fn conn_creator(mut self, creator: ConnCreator) -> Self {
        self.config.conn_creator = creator;
        self
    }

    /// Inject a ping-ticker factory. Intended for tests.
    #[must_use]
    pub fn ticker_factory(mut self, factory: TickerFactory) -> Self {
        self.config.ticker_factory = factory;
        self
    }

    /// Initial trade subscription and its handler.
    #[must_use]
    pub fn with_trades<F, I, S>(self, handler: F, symbols: I) -> Self
    where
        F: Fn(Trade) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.trade.write() = Arc::new(handler);
        self.add_initial(Channel::Trades, symbols)
    }

    /// Initial quote subscription and its handler.
    #[must_use]
    pub fn with_quotes<F, I, S>(self, handler: F, symbols: I) -> Self
    where
        F: Fn(Quote) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.quote.write() = Arc::new(handler);
        self.add_initial(Channel::Quotes, symbols)
    }

    /// Initial minute-bar subscription and its handler.
    #[must_use]
    pub fn with_bars<F, I, S>(self, handler: F, symbols: I) -> Self
    where
        F: Fn(Bar) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.bar.write() = Arc::new(handler);
        self.add_initial(Channel::Bars, symbols)
    }

    /// Initial daily-bar subscription and its handler.
    #[must_use]
    pub fn with_daily_bars<F, I, S>(self, handler: F, symbols: I) -> Self
    where
        F: Fn(Bar) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.daily_bar.write() = Arc::new(handler);
        self.add_initial(Channel::DailyBars, symbols)
    }

    /// Initial trading-status subscription and its handler.
    #[must_use]
    pub fn with_statuses<F, I, S>(self, handler: F, symbols: I) -> Self
    where
        F: Fn(TradingStatus) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.handlers.status.write() = Arc::new(handler);
        self.add_initial(Channel::Statuses, symbols)
    }

    fn add_initial<I, S>(mut self, channel: Channel, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial = self.initial.with_added(channel, symbols);
        self
    }

    /// Finish the builder.
    #[must_use]
    pub fn build(self) -> StocksClient {
        let endpoint = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.feed
        );
        let handlers = Arc::new(self.handlers);
        let dispatcher = {
            let handlers = handlers.clone();
            Arc::new(move |record: StockRecord| handlers.dispatch(record))
        };
        StocksClient {
            core: ClientCore::new(
                self.config,
                endpoint,
                StockDecoder,
                dispatcher,
                self.initial,
            ),
            handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_registry_dispatches_by_record_kind() {
        let handlers = StockHandlers::new();
        let (tx, rx) = std::sync::mpsc::channel();
        *handlers.trade.write() = Arc::new(move |trade: Trade| {
            tx.send(trade.symbol).unwrap();
        });

        handlers.dispatch(StockRecord::Trade(Trade {
            symbol: "ALPACA".to_string(),
            id: 1,
            exchange: String::new(),
            price: rust_decimal::Decimal::ZERO,
            size: 0,
            timestamp: chrono::DateTime::UNIX_EPOCH,
            conditions: vec![],
            tape: String::new(),
        }));

        assert_eq!(rx.try_recv().unwrap(), "ALPACA");
    }

    #[test]
    fn builder_composes_feed_endpoint() {
        let client = StocksClient::builder("iex")
            .base_url("https://example.test/v2/")
            .build();
        assert_eq!(client.core_endpoint(), "https://example.test/v2/iex");
    }
}

#[cfg(test)]
impl StocksClient {
    fn core_endpoint(&self) -> &str {
        self.core.endpoint()
    }
}
