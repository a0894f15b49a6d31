use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{escape_html, Config, MarketDataProvider, Notifier};
use engine::{resolve_symbols, BybitClient, ScanScheduler, TokioSleeper};
use strategy::SignalTracker;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Invalid configuration, not starting");
            std::process::exit(1);
        }
    };
    info!(
        symbols = ?cfg.symbols,
        timeframe = %cfg.signal.timeframe,
        ema_fast = cfg.signal.ema_fast,
        ema_slow = cfg.signal.ema_slow,
        depth = cfg.signal.orderbook_depth,
        delta_abs_min = cfg.signal.delta_abs_min,
        once = cfg.once,
        "crossalert starting"
    );

    // ── Market data ───────────────────────────────────────────────────────────
    let provider: Arc<dyn MarketDataProvider> =
        match BybitClient::new(&cfg.bybit_base_url, &cfg.bybit_category, cfg.http_timeout) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(error = %e, "Failed to build market-data client");
                std::process::exit(1);
            }
        };

    // ── Notifier ──────────────────────────────────────────────────────────────
    let notifier = match telegram_alert::notifier_from_config(&cfg) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Failed to set up notifier");
            std::process::exit(1);
        }
    };

    // ── Symbol set ────────────────────────────────────────────────────────────
    let symbols =
        match resolve_symbols(&cfg.symbols, provider.as_ref(), cfg.quote_coin.as_deref()).await {
            Ok(symbols) => symbols,
            Err(e) => {
                error!(error = %e, "Could not resolve symbol set");
                notify(
                    notifier.as_ref(),
                    &format!("⛔ crossalert failed to start: {}", escape_html(&e.to_string())),
                )
                .await;
                std::process::exit(1);
            }
        };

    if cfg.startup_notice {
        let text = format!(
            "✅ crossalert started: {} symbol(s), EMA {}/{} on {}",
            symbols.len(),
            cfg.signal.ema_fast,
            cfg.signal.ema_slow,
            cfg.signal.timeframe.label()
        );
        notify(notifier.as_ref(), &text).await;
    }

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let tracker = SignalTracker::new(cfg.signal.clone());
    let (mut scheduler, handle) = ScanScheduler::new(
        tracker,
        provider,
        notifier,
        Arc::new(TokioSleeper),
        cfg.symbol_pause,
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, finishing current evaluation");
            handle.shutdown();
        }
    });

    scheduler.run(&symbols, cfg.poll_interval, cfg.once).await;
    info!("crossalert exiting");
}

async fn notify(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.send(text).await {
        warn!(error = %e, "Notice delivery failed");
    }
}
