use async_trait::async_trait;

use crate::{Candle, OrderBook, Result, Timeframe};

/// Abstraction over the exchange's public market-data endpoints.
///
/// `BybitClient` implements this against the live REST API.
/// `PaperMarket` implements this with hand-fed data for tests.
///
/// Every call carries a bounded timeout on the implementation side; a timeout
/// surfaces as `Error::Timeout` and is recoverable.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Closed candles for `symbol`, oldest first. The in-progress candle is
    /// never included.
    async fn get_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize)
        -> Result<Vec<Candle>>;

    /// Top `depth` levels on each side, sorted best-first.
    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook>;

    /// Every symbol currently open for trading, optionally filtered by quote coin.
    async fn tradable_symbols(&self, quote_coin: Option<&str>) -> Result<Vec<String>>;
}
