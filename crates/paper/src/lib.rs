use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use common::{
    BookLevel, Candle, Error, MarketDataProvider, Notifier, OrderBook, Result, Timeframe,
};

/// One call made against a `PaperMarket`, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketCall {
    Candles { symbol: String, limit: usize },
    OrderBook { symbol: String, depth: usize },
    TradableSymbols,
}

/// In-memory market-data provider fed by hand.
///
/// Nothing here touches the network. Candles and books are whatever the
/// caller last stored; symbols marked as failing return `Error::Timeout`.
#[derive(Default)]
pub struct PaperMarket {
    candles: RwLock<HashMap<String, Vec<Candle>>>,
    books: RwLock<HashMap<String, OrderBook>>,
    failing: RwLock<HashSet<String>>,
    failing_books: RwLock<HashSet<String>>,
    listed: RwLock<Vec<String>>,
    calls: Mutex<Vec<MarketCall>>,
}

impl PaperMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the closed-candle series for `symbol`.
    pub async fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.write().await.insert(symbol.to_string(), candles);
    }

    /// Append one freshly closed candle.
    pub async fn push_candle(&self, symbol: &str, candle: Candle) {
        self.candles
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .push(candle);
    }

    pub async fn set_book(&self, symbol: &str, book: OrderBook) {
        self.books.write().await.insert(symbol.to_string(), book);
    }

    /// Make every call for `symbol` fail (or succeed again).
    pub async fn set_failing(&self, symbol: &str, failing: bool) {
        toggle(&self.failing, symbol, failing).await;
    }

    /// Make only order-book calls for `symbol` fail.
    pub async fn set_book_failing(&self, symbol: &str, failing: bool) {
        toggle(&self.failing_books, symbol, failing).await;
    }

    /// Symbols reported by `tradable_symbols`, in listing order.
    pub async fn list_symbols(&self, symbols: &[&str]) {
        *self.listed.write().await = symbols.iter().map(|s| s.to_string()).collect();
    }

    pub async fn calls(&self) -> Vec<MarketCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: MarketCall) {
        self.calls.lock().await.push(call);
    }

    async fn check_failing(&self, set: &RwLock<HashSet<String>>, symbol: &str) -> Result<()> {
        if set.read().await.contains(symbol) {
            return Err(Error::Timeout(format!("PaperMarket: {symbol} is marked failing")));
        }
        Ok(())
    }
}

async fn toggle(set: &RwLock<HashSet<String>>, symbol: &str, on: bool) {
    let mut set = set.write().await;
    if on {
        set.insert(symbol.to_string());
    } else {
        set.remove(symbol);
    }
}

#[async_trait]
impl MarketDataProvider for PaperMarket {
    async fn get_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.record(MarketCall::Candles {
            symbol: symbol.to_string(),
            limit,
        })
        .await;
        self.check_failing(&self.failing, symbol).await?;

        let candles = self.candles.read().await;
        let series = candles.get(symbol).ok_or_else(|| {
            Error::Exchange(format!("PaperMarket has no candles for '{symbol}'"))
        })?;
        let start = series.len().saturating_sub(limit);
        debug!(symbol, returned = series.len() - start, "Paper candles served");
        Ok(series[start..].to_vec())
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook> {
        self.record(MarketCall::OrderBook {
            symbol: symbol.to_string(),
            depth,
        })
        .await;
        self.check_failing(&self.failing, symbol).await?;
        self.check_failing(&self.failing_books, symbol).await?;

        let book = self.books.read().await.get(symbol).cloned().unwrap_or_default();
        Ok(OrderBook {
            bids: book.bids.into_iter().take(depth).collect(),
            asks: book.asks.into_iter().take(depth).collect(),
        })
    }

    async fn tradable_symbols(&self, quote_coin: Option<&str>) -> Result<Vec<String>> {
        self.record(MarketCall::TradableSymbols).await;
        Ok(self
            .listed
            .read()
            .await
            .iter()
            .filter(|s| quote_coin.map_or(true, |q| s.ends_with(q)))
            .cloned()
            .collect())
    }
}

/// Notifier that keeps every message in memory.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    failing: Arc<RwLock<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far. Failed deliveries are not recorded.
    pub async fn messages(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        if *self.failing.read().await {
            return Err(Error::Notifier("RecordingNotifier is marked failing".into()));
        }
        self.sent.lock().await.push(text.to_string());
        Ok(())
    }
}

/// Build hourly-spaced candles whose OHLC all equal the given closes.
pub fn candles_from_closes(closes: &[f64], start: DateTime<Utc>) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| flat_candle(start + Duration::hours(i as i64), close))
        .collect()
}

pub fn flat_candle(open_time: DateTime<Utc>, close: f64) -> Candle {
    Candle {
        open_time,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }
}

/// Book with one level per side holding the given sizes.
pub fn book_with(bid_qty: f64, ask_qty: f64) -> OrderBook {
    OrderBook {
        bids: vec![BookLevel {
            price: 99.0,
            size: bid_qty,
        }],
        asks: vec![BookLevel {
            price: 101.0,
            size: ask_qty,
        }],
    }
}
