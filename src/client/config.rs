//! Client configuration.
//!
//! The builders collect options into a [`StreamConfig`], which is
//! immutable once `connect` launches the supervisor.

use std::time::Duration;

use url::Url;

use crate::error::StreamError;
use crate::stream::conn::{websocket_creator, ConnCreator};
use crate::stream::ticker::{interval_ticker_factory, TickerFactory};

/// Default stock stream endpoint; the feed name is appended.
pub const DEFAULT_STOCKS_BASE_URL: &str = "https://stream.data.alpaca.markets/v2";

/// Default crypto stream endpoint.
pub const DEFAULT_CRYPTO_BASE_URL: &str = "https://stream.data.alpaca.markets/crypto";

/// Environment variable overriding the default base URL.
const DATA_PROXY_WS: &str = "DATA_PROXY_WS";

/// Environment variables holding the ambient credentials.
const ENV_API_KEY: &str = "APCA_API_KEY_ID";
const ENV_API_SECRET: &str = "APCA_API_SECRET_KEY";

/// API credentials. The `Debug` implementation redacts the secret.
#[derive(Clone, Default)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Explicit credentials.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Credentials from the ambient environment, empty when unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            key: std::env::var(ENV_API_KEY).unwrap_or_default(),
            secret: std::env::var(ENV_API_SECRET).unwrap_or_default(),
        }
    }

    /// The API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// The options every stream client shares.
#[derive(Clone)]
pub(crate) struct StreamConfig {
    pub base_url: String,
    pub credentials: Credentials,
    /// `0` means retry indefinitely.
    pub reconnect_limit: u64,
    /// Multiplied by the consecutive-failure count between attempts.
    pub reconnect_delay: Duration,
    pub processor_count: usize,
    pub buffer_size: usize,
    pub conn_creator: ConnCreator,
    pub ticker_factory: TickerFactory,
}

impl StreamConfig {
    /// Defaults for a given endpoint, honoring the `DATA_PROXY_WS`
    /// override at construction time.
    pub(crate) fn new(default_base_url: &str) -> Self {
        let base_url = std::env::var(DATA_PROXY_WS)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_base_url.to_string());

        Self {
            base_url,
            credentials: Credentials::from_env(),
            reconnect_limit: 20,
            reconnect_delay: Duration::from_millis(150),
            processor_count: 1,
            buffer_size: 100_000,
            conn_creator: websocket_creator(),
            ticker_factory: interval_ticker_factory(),
        }
    }
}

/// Parse an endpoint and translate its scheme to websocket form.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url, StreamError> {
    let mut url =
        Url::parse(endpoint).map_err(|e| StreamError::InvalidUrl(format!("{endpoint}: {e}")))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url),
        other => {
            return Err(StreamError::InvalidUrl(format!(
                "{endpoint}: unsupported scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| StreamError::InvalidUrl(endpoint.to_string()))?;
    Ok(url)
}
