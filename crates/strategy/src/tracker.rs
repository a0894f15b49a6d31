use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use common::{MarketDataProvider, Notifier, OrderBookSnapshot, Result, SignalParams};

use crate::alert::Alert;
use crate::confirm::confirm;
use crate::indicators::EmaCrossIndicator;

/// What one `SignalTracker::evaluate` call concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// The latest closed candle was already evaluated.
    SkippedDuplicateCandle,
    NoCrossover,
    /// A crossover the order book did not confirm.
    UnconfirmedCrossover,
    /// An alert was formatted and handed to the notifier.
    AlertSent,
}

impl std::fmt::Display for EvaluationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationOutcome::SkippedDuplicateCandle => write!(f, "skipped-duplicate-candle"),
            EvaluationOutcome::NoCrossover => write!(f, "no-crossover"),
            EvaluationOutcome::UnconfirmedCrossover => write!(f, "unconfirmed-crossover"),
            EvaluationOutcome::AlertSent => write!(f, "alert-sent"),
        }
    }
}

/// Dedup state for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolState {
    pub symbol: String,
    pub last_seen_candle_time: Option<DateTime<Utc>>,
}

/// Evaluates symbols one closed candle at a time and emits at most one alert
/// per (symbol, candle open time) for the lifetime of the tracker.
///
/// State is in memory only and is written after a completed evaluation, so a
/// provider failure mid-evaluation leaves the symbol's previous state intact.
pub struct SignalTracker {
    params: SignalParams,
    indicator: EmaCrossIndicator,
    states: HashMap<String, SymbolState>,
}

impl SignalTracker {
    pub fn new(params: SignalParams) -> Self {
        let indicator = EmaCrossIndicator::new(params.ema_fast, params.ema_slow);
        Self {
            params,
            indicator,
            states: HashMap::new(),
        }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    pub fn state(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    /// Open time of the last candle evaluated for `symbol`.
    pub fn last_seen(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.states.get(symbol).and_then(|s| s.last_seen_candle_time)
    }

    /// Run one evaluation for `symbol`.
    ///
    /// Order of work: candles, then (on a crossover) the order book, then (on
    /// confirmation) the notifier. Provider errors are returned without
    /// touching state; notifier errors are logged and swallowed.
    pub async fn evaluate(
        &mut self,
        symbol: &str,
        provider: &dyn MarketDataProvider,
        notifier: &dyn Notifier,
    ) -> Result<EvaluationOutcome> {
        let candles = provider
            .get_candles(symbol, self.params.timeframe, self.params.candle_limit())
            .await?;

        let Some(last) = candles.last() else {
            debug!(symbol, "No closed candles returned");
            return Ok(EvaluationOutcome::NoCrossover);
        };
        let candle_time = last.open_time;

        // An older last candle than the one already evaluated is a lagging
        // provider response, not new data.
        if matches!(self.last_seen(symbol), Some(seen) if seen >= candle_time) {
            debug!(symbol, candle = %candle_time, "Waiting for a new closed candle");
            return Ok(EvaluationOutcome::SkippedDuplicateCandle);
        }

        let crossover = self.indicator.compute(&candles);
        let (Some(direction), Some(ema)) = (crossover.direction(), crossover.values().copied())
        else {
            debug!(symbol, candle = %candle_time, candles = candles.len(), "No crossover on last closed candle");
            self.mark_seen(symbol, candle_time);
            return Ok(EvaluationOutcome::NoCrossover);
        };

        let depth = self.params.orderbook_depth;
        let book = provider.get_order_book(symbol, depth).await?;
        let snapshot = OrderBookSnapshot::from_book(&book, depth);

        if !confirm(direction, &snapshot, self.params.delta_abs_min) {
            info!(
                symbol,
                direction = %direction,
                delta = snapshot.delta(),
                "Crossover detected but order book did not confirm"
            );
            self.mark_seen(symbol, candle_time);
            return Ok(EvaluationOutcome::UnconfirmedCrossover);
        }

        let text = Alert {
            symbol,
            direction,
            ema,
            book: snapshot,
            params: &self.params,
            candle_time,
        }
        .render();

        info!(
            symbol,
            direction = %direction,
            fast = ema.fast_now,
            slow = ema.slow_now,
            delta = snapshot.delta(),
            "Confirmed crossover, sending alert"
        );
        if let Err(e) = notifier.send(&text).await {
            warn!(symbol, error = %e, "Alert delivery failed");
        }

        self.mark_seen(symbol, candle_time);
        Ok(EvaluationOutcome::AlertSent)
    }

    /// Record `candle_time` as evaluated. The stored time never moves backwards.
    fn mark_seen(&mut self, symbol: &str, candle_time: DateTime<Utc>) {
        let state = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState {
                symbol: symbol.to_string(),
                last_seen_candle_time: None,
            });
        state.last_seen_candle_time = state.last_seen_candle_time.max(Some(candle_time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use paper::{book_with, candles_from_closes, flat_candle, MarketCall, PaperMarket, RecordingNotifier};

    const SYMBOL: &str = "BTCUSDT";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn params() -> SignalParams {
        SignalParams {
            ema_fast: 3,
            ema_slow: 8,
            ..SignalParams::default()
        }
    }

    /// Downtrend then a jump: bullish crossover on the last candle.
    fn bullish_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        closes.push(150.0);
        closes
    }

    fn uptrend_closes() -> Vec<f64> {
        (0..30).map(|i| 100.0 + i as f64).collect()
    }

    async fn market_with(closes: &[f64], bid: f64, ask: f64) -> PaperMarket {
        let market = PaperMarket::new();
        market.set_candles(SYMBOL, candles_from_closes(closes, start())).await;
        market.set_book(SYMBOL, book_with(bid, ask)).await;
        market
    }

    #[tokio::test]
    async fn confirmed_crossover_sends_one_alert() {
        let market = market_with(&bullish_closes(), 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::AlertSent);

        let sent = notifier.messages().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("BTCUSDT"));
        assert!(sent[0].contains("Bullish"));
        assert_eq!(tracker.last_seen(SYMBOL), Some(start() + Duration::hours(30)));
    }

    #[tokio::test]
    async fn same_candle_twice_is_skipped_without_notifying() {
        let market = market_with(&bullish_closes(), 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        let second = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();

        assert_eq!(second, EvaluationOutcome::SkippedDuplicateCandle);
        assert_eq!(notifier.messages().await.len(), 1);
        // second poll fetched candles only
        let book_calls = market
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, MarketCall::OrderBook { .. }))
            .count();
        assert_eq!(book_calls, 1);
    }

    #[tokio::test]
    async fn no_crossover_updates_state_and_skips_book() {
        let market = market_with(&uptrend_closes(), 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::NoCrossover);
        assert!(tracker.last_seen(SYMBOL).is_some());
        assert_eq!(
            market.calls().await,
            vec![MarketCall::Candles {
                symbol: SYMBOL.into(),
                limit: 200
            }]
        );

        let again = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(again, EvaluationOutcome::SkippedDuplicateCandle);
    }

    #[tokio::test]
    async fn ask_heavy_book_leaves_bullish_unconfirmed() {
        let market = market_with(&bullish_closes(), 4.0, 10.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::UnconfirmedCrossover);
        assert!(notifier.messages().await.is_empty());
        assert!(tracker.last_seen(SYMBOL).is_some());
    }

    #[tokio::test]
    async fn deadband_blocks_thin_books() {
        let market = market_with(&bullish_closes(), 5.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(SignalParams {
            delta_abs_min: 2.0,
            ..params()
        });

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::UnconfirmedCrossover);
    }

    #[tokio::test]
    async fn short_series_is_no_crossover() {
        let market = market_with(&[10.0, 50.0], 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::NoCrossover);
        assert_eq!(tracker.last_seen(SYMBOL), Some(start() + Duration::hours(1)));
    }

    #[tokio::test]
    async fn empty_series_leaves_state_untouched() {
        let market = market_with(&[], 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::NoCrossover);
        assert!(tracker.state(SYMBOL).is_none());
    }

    #[tokio::test]
    async fn book_failure_propagates_without_state_change() {
        let market = market_with(&bullish_closes(), 10.0, 4.0).await;
        market.set_book_failing(SYMBOL, true).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let err = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap_err();
        assert!(err.is_transient());
        assert!(tracker.last_seen(SYMBOL).is_none());

        // next poll retries the same candle
        market.set_book_failing(SYMBOL, false).await;
        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::AlertSent);
    }

    #[tokio::test]
    async fn notifier_failure_still_marks_candle() {
        let market = market_with(&bullish_closes(), 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true).await;
        let mut tracker = SignalTracker::new(params());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::AlertSent);
        assert!(tracker.last_seen(SYMBOL).is_some());

        notifier.set_failing(false).await;
        let again = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(again, EvaluationOutcome::SkippedDuplicateCandle);
        assert!(notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn new_candle_is_evaluated_again() {
        let market = market_with(&uptrend_closes(), 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        let next_time = start() + Duration::hours(30);
        market.push_candle(SYMBOL, flat_candle(next_time, 131.0)).await;

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::NoCrossover);
        assert_eq!(tracker.last_seen(SYMBOL), Some(next_time));
    }

    #[tokio::test]
    async fn older_candle_after_newer_one_is_skipped() {
        let market = market_with(&bullish_closes(), 10.0, 4.0).await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        let first = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(first, EvaluationOutcome::AlertSent);

        let newer = start() + Duration::hours(31);
        market.push_candle(SYMBOL, flat_candle(newer, 151.0)).await;
        tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(tracker.last_seen(SYMBOL), Some(newer));

        // provider falls back to the series ending one candle earlier
        market
            .set_candles(SYMBOL, candles_from_closes(&bullish_closes(), start()))
            .await;
        let stale = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();

        assert_eq!(stale, EvaluationOutcome::SkippedDuplicateCandle);
        assert_eq!(notifier.messages().await.len(), 1);
        assert_eq!(tracker.last_seen(SYMBOL), Some(newer));
    }

    #[tokio::test]
    async fn symbols_keep_independent_state() {
        let market = market_with(&bullish_closes(), 10.0, 4.0).await;
        market
            .set_candles("ETHUSDT", candles_from_closes(&uptrend_closes(), start()))
            .await;
        let notifier = RecordingNotifier::new();
        let mut tracker = SignalTracker::new(params());

        tracker.evaluate("ETHUSDT", &market, &notifier).await.unwrap();
        assert!(tracker.last_seen(SYMBOL).is_none());

        let outcome = tracker.evaluate(SYMBOL, &market, &notifier).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::AlertSent);
        assert_eq!(tracker.state("ETHUSDT").unwrap().symbol, "ETHUSDT");
    }
}
