//! Per-channel subscription state.
//!
//! [`Subscriptions`] is the client's view of what the server should be
//! pushing: one symbol set per channel. It is only ever replaced
//! wholesale from a server `subscription` acknowledgement, so equality
//! between two values is set equality per channel, ignoring order.

use std::collections::HashSet;

/// A market-data channel the stream can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Trade records.
    Trades,
    /// Quote records.
    Quotes,
    /// Minute bars.
    Bars,
    /// Daily bars.
    DailyBars,
    /// Trading statuses (stocks only).
    Statuses,
}

/// The per-channel symbol sets a client wants the server to push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    /// Symbols subscribed for trades.
    pub trades: HashSet<String>,
    /// Symbols subscribed for quotes.
    pub quotes: HashSet<String>,
    /// Symbols subscribed for minute bars.
    pub bars: HashSet<String>,
    /// Symbols subscribed for daily bars.
    pub daily_bars: HashSet<String>,
    /// Symbols subscribed for trading statuses.
    pub statuses: HashSet<String>,
}

impl Subscriptions {
    /// Whether no channel has any symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
            && self.quotes.is_empty()
            && self.bars.is_empty()
            && self.daily_bars.is_empty()
            && self.statuses.is_empty()
    }

    /// The symbol set of a single channel.
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &HashSet<String> {
        match channel {
            Channel::Trades => &self.trades,
            Channel::Quotes => &self.quotes,
            Channel::Bars => &self.bars,
            Channel::DailyBars => &self.daily_bars,
            Channel::Statuses => &self.statuses,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut HashSet<String> {
        match channel {
            Channel::Trades => &mut self.trades,
            Channel::Quotes => &mut self.quotes,
            Channel::Bars => &mut self.bars,
            Channel::DailyBars => &mut self.daily_bars,
            Channel::Statuses => &mut self.statuses,
        }
    }

    /// A copy with `symbols` added to one channel.
    #[must_use]
    pub fn with_added<I, S>(&self, channel: Channel, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.channel_mut(channel)
            .extend(symbols.into_iter().map(normalize));
        next
    }

    /// A copy with one channel cleared.
    #[must_use]
    pub fn with_cleared(&self, channel: Channel) -> Self {
        let mut next = self.clone();
        next.channel_mut(channel).clear();
        next
    }

    /// Symbols in `symbols` that are not yet present on `channel`.
    #[must_use]
    pub fn missing_from<I, S>(&self, channel: Channel, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let existing = self.channel(channel);
        let mut added: Vec<String> = symbols
            .into_iter()
            .map(normalize)
            .filter(|s| !existing.contains(s))
            .collect();
        added.sort_unstable();
        added.dedup();
        added
    }
}

/// Symbols are tracked uppercase; the server reports them that way.
fn normalize<S: Into<String>>(symbol: S) -> String {
    symbol.into().to_uppercase()
}
