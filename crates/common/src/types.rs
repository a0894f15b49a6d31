use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One OHLCV candle. Series are ordered oldest first; providers hand out
/// closed candles only, so the last element is the most recently closed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle timeframe, expressed the way Bybit's kline `interval` parameter is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    Minutes(u32),
    Day,
    Week,
}

impl Timeframe {
    const MINUTE_STEPS: [u32; 10] = [1, 3, 5, 15, 30, 60, 120, 240, 360, 720];

    /// Wire code used in the kline request (`"60"`, `"D"`, `"W"`).
    pub fn code(&self) -> String {
        match self {
            Timeframe::Minutes(m) => m.to_string(),
            Timeframe::Day => "D".to_string(),
            Timeframe::Week => "W".to_string(),
        }
    }

    /// Human label used in alerts (`"15m"`, `"1h"`, `"1d"`).
    pub fn label(&self) -> String {
        match self {
            Timeframe::Minutes(m) if m % 60 == 0 => format!("{}h", m / 60),
            Timeframe::Minutes(m) => format!("{m}m"),
            Timeframe::Day => "1d".to_string(),
            Timeframe::Week => "1w".to_string(),
        }
    }

    pub fn duration(&self) -> Duration {
        let minutes = match self {
            Timeframe::Minutes(m) => *m as u64,
            Timeframe::Day => 24 * 60,
            Timeframe::Week => 7 * 24 * 60,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Minutes(60)
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "D" | "1D" => Ok(Timeframe::Day),
            "W" | "1W" => Ok(Timeframe::Week),
            other => other
                .parse::<u32>()
                .ok()
                .filter(|m| Self::MINUTE_STEPS.contains(m))
                .map(Timeframe::Minutes)
                .ok_or_else(|| Error::Config(format!("unsupported candle interval '{s}'"))),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single resting price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Top-of-book levels for one symbol, each side sorted best-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Aggregated resting size over the top N levels of each side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bid_qty: f64,
    pub ask_qty: f64,
}

impl OrderBookSnapshot {
    pub fn new(bid_qty: f64, ask_qty: f64) -> Self {
        Self { bid_qty, ask_qty }
    }

    /// Sum sizes over the first `depth` levels on each side.
    pub fn from_book(book: &OrderBook, depth: usize) -> Self {
        let sum = |levels: &[BookLevel]| levels.iter().take(depth).map(|l| l.size).sum::<f64>();
        Self {
            bid_qty: sum(&book.bids),
            ask_qty: sum(&book.asks),
        }
    }

    /// `ask_qty - bid_qty`. Positive means the ask side is heavier.
    pub fn delta(&self) -> f64 {
        self.ask_qty - self.bid_qty
    }

    pub fn pressure(&self) -> Pressure {
        Pressure::of(self.delta())
    }
}

/// Sign classification of an order-book delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pressure {
    /// Ask side heavier (delta > 0).
    Sell,
    /// Bid side heavier (delta < 0).
    Buy,
    Neutral,
}

impl Pressure {
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Pressure::Sell
        } else if delta < 0.0 {
            Pressure::Buy
        } else {
            Pressure::Neutral
        }
    }
}

impl std::fmt::Display for Pressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pressure::Sell => write!(f, "positive, sell pressure"),
            Pressure::Buy => write!(f, "negative, buy pressure"),
            Pressure::Neutral => write!(f, "neutral"),
        }
    }
}

/// Direction of an EMA crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "Bullish"),
            Direction::Bearish => write!(f, "Bearish"),
        }
    }
}

/// Fast and slow EMA values at one candle index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaPoint {
    pub fast: f64,
    pub slow: f64,
}

/// EMA values at the last two closed candles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaCross {
    pub fast_now: f64,
    pub slow_now: f64,
    pub fast_prev: f64,
    pub slow_prev: f64,
}

/// Result of classifying the last two EMA points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Crossover {
    #[default]
    None,
    Bullish(EmaCross),
    Bearish(EmaCross),
}

impl Crossover {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Crossover::None => None,
            Crossover::Bullish(_) => Some(Direction::Bullish),
            Crossover::Bearish(_) => Some(Direction::Bearish),
        }
    }

    pub fn values(&self) -> Option<&EmaCross> {
        match self {
            Crossover::None => None,
            Crossover::Bullish(v) | Crossover::Bearish(v) => Some(v),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Crossover::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, size: f64) -> BookLevel {
        BookLevel { price, size }
    }

    #[test]
    fn timeframe_parses_bybit_codes() {
        assert_eq!("60".parse::<Timeframe>().unwrap(), Timeframe::Minutes(60));
        assert_eq!("d".parse::<Timeframe>().unwrap(), Timeframe::Day);
        assert!("7".parse::<Timeframe>().is_err());
        assert!("M".parse::<Timeframe>().is_err());
    }

    #[test]
    fn timeframe_labels() {
        assert_eq!(Timeframe::Minutes(15).label(), "15m");
        assert_eq!(Timeframe::Minutes(240).label(), "4h");
        assert_eq!(Timeframe::Week.label(), "1w");
        assert_eq!(Timeframe::Day.code(), "D");
        assert_eq!(Timeframe::Minutes(60).duration(), Duration::from_secs(3600));
    }

    #[test]
    fn snapshot_sums_only_requested_depth() {
        let book = OrderBook {
            bids: vec![level(100.0, 1.0), level(99.0, 2.0), level(98.0, 50.0)],
            asks: vec![level(101.0, 0.5), level(102.0, 0.5)],
        };
        let snap = OrderBookSnapshot::from_book(&book, 2);
        assert_eq!(snap.bid_qty, 3.0);
        assert_eq!(snap.ask_qty, 1.0);
        assert_eq!(snap.delta(), -2.0);
        assert_eq!(snap.pressure(), Pressure::Buy);
    }

    #[test]
    fn pressure_sign_classification() {
        assert_eq!(OrderBookSnapshot::new(1.0, 3.0).pressure(), Pressure::Sell);
        assert_eq!(OrderBookSnapshot::new(5.0, 5.0).pressure(), Pressure::Neutral);
    }

    #[test]
    fn crossover_accessors() {
        let v = EmaCross {
            fast_now: 12.0,
            slow_now: 11.0,
            fast_prev: 10.0,
            slow_prev: 10.0,
        };
        assert_eq!(Crossover::Bullish(v).direction(), Some(Direction::Bullish));
        assert_eq!(Crossover::Bearish(v).values(), Some(&v));
        assert!(Crossover::None.is_none());
        assert!(Crossover::None.values().is_none());
    }
}
