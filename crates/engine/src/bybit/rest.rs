use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use common::config::{MAX_CANDLE_LIMIT, MAX_ORDERBOOK_DEPTH};
use common::{
    BookLevel, Candle, Error, MarketDataProvider, OrderBook, Result, Timeframe,
};

/// Guard against a cursor that never ends.
const MAX_INSTRUMENT_PAGES: usize = 20;

/// Unwrapped `result` of a v5 response with the server clock at reply time.
#[derive(Debug)]
struct Reply<T> {
    result: T,
    server_time: Option<DateTime<Utc>>,
}

/// Public market-data client for the Bybit v5 REST API.
pub struct BybitClient {
    http: Client,
    base_url: String,
    category: String,
}

impl BybitClient {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        category: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            category: category.into(),
        })
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Reply<T>> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| transport_error(path, e))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("{path}: HTTP {status}: {body}")));
        }
        parse_envelope(path, &body)
    }
}

fn transport_error(path: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{path}: {e}"))
    } else {
        Error::Http(format!("{path}: {e}"))
    }
}

#[async_trait]
impl MarketDataProvider for BybitClient {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        // One extra row: the newest one is usually still forming.
        let request_limit = (limit + 1).clamp(1, MAX_CANDLE_LIMIT);
        debug!(symbol, interval = %timeframe.code(), limit = request_limit, "Fetching klines");

        let reply: Reply<KlineResult> = self
            .public_get(
                "/v5/market/kline",
                &[
                    ("category", self.category.clone()),
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.code()),
                    ("limit", request_limit.to_string()),
                ],
            )
            .await?;

        // The server clock decides which candle is still forming.
        let now = reply.server_time.unwrap_or_else(Utc::now);
        let mut candles = closed_candles(&reply.result.list, timeframe, now)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook> {
        let request_depth = depth.clamp(1, MAX_ORDERBOOK_DEPTH);
        debug!(symbol, depth = request_depth, "Fetching order book");

        let result: OrderBookResult = self
            .public_get(
                "/v5/market/orderbook",
                &[
                    ("category", self.category.clone()),
                    ("symbol", symbol.to_string()),
                    ("limit", request_depth.to_string()),
                ],
            )
            .await?
            .result;

        Ok(OrderBook {
            bids: parse_levels(&result.bids, depth)?,
            asks: parse_levels(&result.asks, depth)?,
        })
    }

    async fn tradable_symbols(&self, quote_coin: Option<&str>) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        let mut cursor: Option<String> = None;
        let mut exhausted = false;

        for _ in 0..MAX_INSTRUMENT_PAGES {
            let mut query = vec![
                ("category", self.category.clone()),
                ("status", "Trading".to_string()),
                ("limit", "1000".to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page: InstrumentsResult = self
                .public_get("/v5/market/instruments-info", &query)
                .await?
                .result;
            symbols.extend(tradable_from_page(&page, quote_coin));

            match next_cursor(&page) {
                Some(next) => cursor = Some(next),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        if !exhausted {
            warn!(
                pages = MAX_INSTRUMENT_PAGES,
                collected = symbols.len(),
                "Instrument listing still had more pages, symbol set is truncated"
            );
        }

        symbols.sort();
        symbols.dedup();
        debug!(count = symbols.len(), "Resolved tradable instruments");
        Ok(symbols)
    }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// Unwrap the `{retCode, retMsg, result}` envelope every v5 endpoint returns.
fn parse_envelope<T: DeserializeOwned>(path: &str, body: &str) -> Result<Reply<T>> {
    let env: Envelope = serde_json::from_str(body)?;
    if env.ret_code != 0 {
        return Err(Error::Exchange(format!(
            "{path}: retCode {}: {}",
            env.ret_code, env.ret_msg
        )));
    }
    Ok(Reply {
        result: serde_json::from_value(env.result)?,
        server_time: env.time.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
    })
}

/// Rows arrive newest first as `[start_ms, open, high, low, close, volume, turnover]`.
/// Returns ascending candles whose period has fully elapsed at `now`.
fn closed_candles(rows: &[Vec<String>], timeframe: Timeframe, now: DateTime<Utc>) -> Result<Vec<Candle>> {
    let period = chrono::Duration::seconds(timeframe.duration().as_secs() as i64);

    let mut candles = rows
        .iter()
        .map(|row| parse_kline_row(row))
        .collect::<Result<Vec<_>>>()?;
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles.retain(|c| c.open_time + period <= now);
    Ok(candles)
}

fn parse_kline_row(row: &[String]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(Error::MalformedResponse(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }
    let start_ms: i64 = row[0]
        .parse()
        .map_err(|_| Error::MalformedResponse(format!("bad kline start '{}'", row[0])))?;
    let open_time = Utc
        .timestamp_millis_opt(start_ms)
        .single()
        .ok_or_else(|| Error::MalformedResponse(format!("kline start out of range: {start_ms}")))?;

    Ok(Candle {
        open_time,
        open: parse_num(&row[1], "open")?,
        high: parse_num(&row[2], "high")?,
        low: parse_num(&row[3], "low")?,
        close: parse_num(&row[4], "close")?,
        volume: parse_num(&row[5], "volume")?,
    })
}

fn parse_levels(rows: &[Vec<String>], depth: usize) -> Result<Vec<BookLevel>> {
    rows.iter()
        .take(depth)
        .map(|row| match row.as_slice() {
            [price, size, ..] => Ok(BookLevel {
                price: parse_num(price, "price")?,
                size: parse_num(size, "size")?,
            }),
            _ => Err(Error::MalformedResponse("order book level needs price and size".into())),
        })
        .collect()
}

fn parse_num(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::MalformedResponse(format!("{field} is not a finite number: '{raw}'")))
}

/// Cursor for the following page, `None` once the listing is exhausted.
fn next_cursor(page: &InstrumentsResult) -> Option<String> {
    page.next_page_cursor.clone().filter(|c| !c.is_empty())
}

fn tradable_from_page<'a>(
    page: &'a InstrumentsResult,
    quote_coin: Option<&'a str>,
) -> impl Iterator<Item = String> + 'a {
    page.list
        .iter()
        .filter(|i| i.status == "Trading")
        .filter(move |i| quote_coin.map_or(true, |q| i.quote_coin.eq_ignore_ascii_case(q)))
        .map(|i| i.symbol.clone())
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: serde_json::Value,
    /// Server time in milliseconds.
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OrderBookResult {
    #[serde(rename = "b", default)]
    bids: Vec<Vec<String>>,
    #[serde(rename = "a", default)]
    asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentsResult {
    #[serde(default)]
    list: Vec<Instrument>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    symbol: String,
    status: String,
    #[serde(default)]
    quote_coin: String,
}
