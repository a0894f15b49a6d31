use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use common::{Error, MarketDataProvider, Notifier, Result, SymbolSet};
use strategy::{EvaluationOutcome, SignalTracker};

/// Source of waiting. `TokioSleeper` in production; tests substitute one that
/// returns immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cloneable handle used to stop a running `ScanScheduler`.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Abort the current wait. An in-flight symbol evaluation finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Tally of one sweep over the symbol set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub alerts: usize,
    pub unconfirmed: usize,
    pub no_crossover: usize,
    pub skipped: usize,
    /// Symbols whose evaluation returned an error this cycle.
    pub failed: Vec<String>,
    /// The sweep stopped early on shutdown.
    pub interrupted: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: EvaluationOutcome) {
        match outcome {
            EvaluationOutcome::AlertSent => self.alerts += 1,
            EvaluationOutcome::UnconfirmedCrossover => self.unconfirmed += 1,
            EvaluationOutcome::NoCrossover => self.no_crossover += 1,
            EvaluationOutcome::SkippedDuplicateCandle => self.skipped += 1,
        }
    }

    pub fn evaluated(&self) -> usize {
        self.alerts + self.unconfirmed + self.no_crossover + self.skipped
    }
}

/// Sequential poller: every cycle evaluates each symbol in order with a short
/// pause between symbols, then waits for the poll interval.
pub struct ScanScheduler {
    tracker: SignalTracker,
    provider: Arc<dyn MarketDataProvider>,
    notifier: Arc<dyn Notifier>,
    sleeper: Arc<dyn Sleeper>,
    symbol_pause: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl ScanScheduler {
    pub fn new(
        tracker: SignalTracker,
        provider: Arc<dyn MarketDataProvider>,
        notifier: Arc<dyn Notifier>,
        sleeper: Arc<dyn Sleeper>,
        symbol_pause: Duration,
    ) -> (Self, SchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SchedulerHandle {
            shutdown_tx: Arc::new(shutdown_tx),
        };
        let scheduler = ScanScheduler {
            tracker,
            provider,
            notifier,
            sleeper,
            symbol_pause,
            shutdown_rx,
        };
        (scheduler, handle)
    }

    pub fn tracker(&self) -> &SignalTracker {
        &self.tracker
    }

    /// Sweep `symbols` once when `once`, otherwise every `interval` until
    /// shut down. Returns the number of cycles started.
    pub async fn run(&mut self, symbols: &[String], interval: Duration, once: bool) -> usize {
        let params = self.tracker.params();
        info!(
            symbols = symbols.len(),
            timeframe = %params.timeframe,
            ema_fast = params.ema_fast,
            ema_slow = params.ema_slow,
            interval_secs = interval.as_secs(),
            once,
            "Scan scheduler running"
        );

        let mut cycles = 0;
        loop {
            cycles += 1;
            let report = self.scan_cycle(symbols).await;
            info!(
                cycle = cycles,
                evaluated = report.evaluated(),
                alerts = report.alerts,
                unconfirmed = report.unconfirmed,
                no_crossover = report.no_crossover,
                skipped = report.skipped,
                failed = report.failed.len(),
                "Scan cycle complete"
            );

            if once || report.interrupted {
                break;
            }
            if self.pause(interval).await {
                break;
            }
        }

        info!(cycles, "Scan scheduler stopped");
        cycles
    }

    /// Evaluate every symbol once, in order. A failing symbol is logged and
    /// skipped; its dedup state is left as it was.
    pub async fn scan_cycle(&mut self, symbols: &[String]) -> CycleReport {
        let mut report = CycleReport::default();

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && self.pause(self.symbol_pause).await {
                report.interrupted = true;
                break;
            }
            if self.is_shutdown() {
                report.interrupted = true;
                break;
            }

            match self
                .tracker
                .evaluate(symbol, self.provider.as_ref(), self.notifier.as_ref())
                .await
            {
                Ok(outcome) => {
                    debug!(symbol = %symbol, outcome = %outcome, "Symbol evaluated");
                    report.record(outcome);
                }
                Err(e) if e.is_transient() => {
                    warn!(symbol = %symbol, error = %e, "Market data unavailable, retrying next cycle");
                    report.failed.push(symbol.clone());
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Symbol evaluation failed");
                    report.failed.push(symbol.clone());
                }
            }
        }

        report
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Wait for `duration`. Returns true if shutdown was requested.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        let sleeper = self.sleeper.clone();
        tokio::select! {
            _ = sleeper.sleep(duration) => self.is_shutdown(),
            changed = self.shutdown_rx.changed() => match changed {
                Ok(()) => *self.shutdown_rx.borrow(),
                // Every handle is gone; nothing can cancel us any more.
                Err(_) => {
                    sleeper.sleep(duration).await;
                    false
                }
            },
        }
    }
}

/// Turn a configured symbol set into the explicit list a scan walks.
pub async fn resolve_symbols(
    set: &SymbolSet,
    provider: &dyn MarketDataProvider,
    quote_coin: Option<&str>,
) -> Result<Vec<String>> {
    match set {
        SymbolSet::List(symbols) => Ok(symbols.clone()),
        SymbolSet::AllTradable => {
            let mut symbols = provider.tradable_symbols(quote_coin).await?;
            symbols.sort();
            symbols.dedup();
            if symbols.is_empty() {
                return Err(Error::Config(format!(
                    "no tradable symbols found (quote coin: {})",
                    quote_coin.unwrap_or("any")
                )));
            }
            info!(count = symbols.len(), "Resolved all tradable symbols");
            Ok(symbols)
        }
    }
}
