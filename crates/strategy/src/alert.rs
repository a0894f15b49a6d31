use chrono::{DateTime, Utc};

use common::{escape_html, Direction, EmaCross, OrderBookSnapshot, SignalParams};

const EXCHANGE_NAME: &str = "Bybit";

/// A confirmed crossover, ready to be rendered for the notifier.
#[derive(Debug, Clone)]
pub struct Alert<'a> {
    pub symbol: &'a str,
    pub direction: Direction,
    pub ema: EmaCross,
    pub book: OrderBookSnapshot,
    pub params: &'a SignalParams,
    pub candle_time: DateTime<Utc>,
}

impl Alert<'_> {
    /// Telegram HTML body.
    pub fn render(&self) -> String {
        let p = self.params;
        let arrow = match self.direction {
            Direction::Bullish => "📈",
            Direction::Bearish => "📉",
        };
        let delta = self.book.delta();

        format!(
            "{arrow} <b>EMA {fast}/{slow} crossover</b> on {symbol} ({tf})\n\
             • Direction: {direction}\n\
             • EMA{fast} now: {fast_now:.4}\n\
             • EMA{slow} now: {slow_now:.4}\n\
             • Orderbook delta (top {depth}): {delta:.4} ({pressure})\n\
             • BidQty: {bid:.4} | AskQty: {ask:.4}\n\
             • Candle: {candle}\n\
             — {EXCHANGE_NAME} • {tf}",
            fast = p.ema_fast,
            slow = p.ema_slow,
            symbol = escape_html(self.symbol),
            tf = p.timeframe.label(),
            direction = self.direction,
            fast_now = self.ema.fast_now,
            slow_now = self.ema.slow_now,
            depth = p.orderbook_depth,
            pressure = self.book.pressure(),
            bid = self.book.bid_qty,
            ask = self.book.ask_qty,
            candle = self.candle_time.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}
