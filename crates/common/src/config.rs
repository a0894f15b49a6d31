use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result, Timeframe};

/// Largest kline page Bybit serves in one request.
pub const MAX_CANDLE_LIMIT: usize = 1000;
/// Largest order-book depth Bybit serves for derivatives.
pub const MAX_ORDERBOOK_DEPTH: usize = 500;

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";

/// Which symbols a scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolSet {
    List(Vec<String>),
    /// Every instrument the exchange reports as trading.
    AllTradable,
}

/// Parameters of one per-symbol evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalParams {
    pub timeframe: Timeframe,
    pub ema_fast: usize,
    pub ema_slow: usize,
    /// Number of book levels summed on each side.
    pub orderbook_depth: usize,
    /// Deadband: books with `|delta|` below this never confirm.
    pub delta_abs_min: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::default(),
            ema_fast: 9,
            ema_slow: 21,
            orderbook_depth: 20,
            delta_abs_min: 0.0,
        }
    }
}

impl SignalParams {
    /// Candles requested per evaluation: at least three slow lengths so the
    /// seed has washed out of the evaluated window, never less than 200.
    pub fn candle_limit(&self) -> usize {
        (self.ema_slow * 3).max(200).min(MAX_CANDLE_LIMIT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ema_fast == 0 || self.ema_slow == 0 {
            return Err(Error::Config("EMA lengths must be greater than zero".into()));
        }
        if self.ema_fast == self.ema_slow {
            return Err(Error::Config(format!(
                "EMA_FAST and EMA_SLOW are both {}; equal lengths never cross",
                self.ema_fast
            )));
        }
        if self.orderbook_depth == 0 || self.orderbook_depth > MAX_ORDERBOOK_DEPTH {
            return Err(Error::Config(format!(
                "ORDERBOOK_DEPTH must be within 1..={MAX_ORDERBOOK_DEPTH}, got {}",
                self.orderbook_depth
            )));
        }
        if !self.delta_abs_min.is_finite() || self.delta_abs_min < 0.0 {
            return Err(Error::Config(format!(
                "DELTA_ABS_MIN must be a finite value >= 0, got {}",
                self.delta_abs_min
            )));
        }
        Ok(())
    }
}

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: SymbolSet,
    /// Quote filter applied when resolving `SymbolSet::AllTradable`.
    pub quote_coin: Option<String>,

    // Exchange
    pub bybit_base_url: String,
    pub bybit_category: String,

    pub signal: SignalParams,

    // Scheduling
    pub poll_interval: Duration,
    pub symbol_pause: Duration,
    pub once: bool,

    // Timeouts
    pub http_timeout: Duration,
    pub notify_timeout: Duration,

    // Telegram
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub startup_notice: bool,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build and validate a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let symbols = match env("WATCHLIST_PATH") {
            Some(path) => SymbolSet::List(WatchlistFile::load(&path)?.normalized()?),
            None => {
                let raw = env("SYMBOLS")
                    .or_else(|| env("SYMBOL"))
                    .unwrap_or_else(|| "BTCUSDT".to_string());
                parse_symbol_set(&raw)?
            }
        };

        let signal = SignalParams {
            timeframe: env("INTERVAL_MIN")
                .map(|v| v.parse::<Timeframe>())
                .transpose()?
                .unwrap_or_default(),
            ema_fast: parse_or(&env, "EMA_FAST", 9)?,
            ema_slow: parse_or(&env, "EMA_SLOW", 21)?,
            orderbook_depth: parse_or(&env, "ORDERBOOK_DEPTH", 20)?,
            delta_abs_min: parse_or(&env, "DELTA_ABS_MIN", 0.0)?,
        };
        signal.validate()?;

        let poll_secs: u64 = parse_or(&env, "POLL_SECONDS", 60)?;
        if poll_secs == 0 {
            return Err(Error::Config("POLL_SECONDS must be greater than zero".into()));
        }

        let http_timeout_secs: u64 = parse_or(&env, "HTTP_TIMEOUT_SECS", 15)?;
        let notify_timeout_secs: u64 = parse_or(&env, "NOTIFY_TIMEOUT_SECS", 10)?;
        if http_timeout_secs == 0 || notify_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }

        let telegram_token = env("TELEGRAM_BOT_TOKEN");
        let telegram_chat_id = env("TELEGRAM_CHAT_ID");

        Ok(Config {
            symbols,
            quote_coin: match env("QUOTE_COIN") {
                Some(q) if q.eq_ignore_ascii_case("any") => None,
                Some(q) => Some(q.to_uppercase()),
                None => Some("USDT".to_string()),
            },
            bybit_base_url: env("BYBIT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            bybit_category: env("BYBIT_CATEGORY").unwrap_or_else(|| "linear".to_string()),
            signal,
            poll_interval: Duration::from_secs(poll_secs),
            symbol_pause: Duration::from_millis(parse_or(&env, "SYMBOL_PAUSE_MS", 250)?),
            once: flag(&env, "ONCE"),
            http_timeout: Duration::from_secs(http_timeout_secs),
            notify_timeout: Duration::from_secs(notify_timeout_secs),
            telegram_token,
            telegram_chat_id,
            startup_notice: flag(&env, "STARTUP_NOTICE"),
        })
    }
}

/// Optional TOML watchlist.
///
/// ```toml
/// symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistFile {
    pub symbols: Vec<String>,
}

impl WatchlistFile {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn normalized(&self) -> Result<Vec<String>> {
        normalize_symbols(self.symbols.iter().map(String::as_str))
    }
}

fn parse_symbol_set(raw: &str) -> Result<SymbolSet> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(SymbolSet::AllTradable);
    }
    normalize_symbols(raw.split(',')).map(SymbolSet::List)
}

/// Uppercase, trim, drop blanks and duplicates while keeping first-seen order.
fn normalize_symbols<'a>(raw: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for s in raw.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()) {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    if out.is_empty() {
        return Err(Error::Config("symbol set is empty".into()));
    }
    Ok(out)
}

fn parse_or<T, F>(env: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| Error::Config(format!("{key}='{v}' is invalid: {e}"))),
        None => Ok(default),
    }
}

fn flag<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> bool {
    env(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
