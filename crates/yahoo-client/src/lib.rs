use chrono::{DateTime, Utc};
use options_core::{ExpirySlice, FlowError, OptionChain, OptionQuote};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const MAX_RETRIES: u32 = 3;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Drop timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = match ts.front().and_then(|f| f.checked_add(self.window)) {
                Some(t) => t,
                None => now + self.window,
            };
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for Yahoo API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Yahoo Finance market-data client: spot/previous close from the chart
/// endpoint, full option chains from the options endpoint.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    pub fn new() -> Self {
        // Yahoo has no published quota; 60 req/min keeps the unauthenticated
        // endpoints from throttling. Override with YAHOO_RATE_LIMIT.
        let rate_limit: usize = std::env::var("YAHOO_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (options-flow)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// GET with rate limiting and exponential-backoff retry on throttling,
    /// server errors, and transport failures.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FlowError> {
        let mut last_error = String::new();
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let wait = Duration::from_millis(500 * 2u64.pow(attempt));
                tracing::warn!(
                    "Yahoo retry {}/{} after error: {} (sleeping {:.1}s)",
                    attempt,
                    MAX_RETRIES - 1,
                    last_error,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
            self.rate_limiter.acquire().await;

            let response = match self.client.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = format!("HTTP {status}");
                continue;
            }
            if !status.is_success() {
                return Err(FlowError::Api(format!("Yahoo HTTP {status} for {url}")));
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| FlowError::Api(format!("Yahoo response decode: {e}")));
        }
        Err(FlowError::Api(format!(
            "Yahoo request failed after {MAX_RETRIES} attempts: {last_error}"
        )))
    }

    /// Spot price and previous close for a symbol.
    pub async fn fetch_spot(&self, symbol: &str) -> Result<(f64, Option<f64>), FlowError> {
        let url = format!("{BASE_URL}/v8/finance/chart/{symbol}?range=2d&interval=1d");
        let payload: ChartResponse = self.get_json(&url).await?;

        let result = payload
            .chart
            .result
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| FlowError::Api(format!("No chart data for {symbol}")))?;

        let spot = result
            .meta
            .regular_market_price
            .ok_or_else(|| FlowError::Api(format!("No market price for {symbol}")))?;
        Ok((spot, result.meta.chart_previous_close))
    }

    /// Full option chain across all listed expirations.
    ///
    /// One request discovers the expiration list and the nearest slice; each
    /// remaining expiration costs one more request. A slice that fails to
    /// fetch is logged and skipped rather than failing the chain.
    pub async fn fetch_option_chain(&self, symbol: &str) -> Result<OptionChain, FlowError> {
        let url = format!("{BASE_URL}/v7/finance/options/{symbol}");
        let payload: OptionsResponse = self.get_json(&url).await?;
        let result = first_result(payload, symbol)?;

        let spot = result
            .quote
            .as_ref()
            .and_then(|q| q.regular_market_price)
            .ok_or_else(|| FlowError::Api(format!("No underlying quote for {symbol}")))?;
        let prev_close = result
            .quote
            .as_ref()
            .and_then(|q| q.regular_market_previous_close);

        let mut slices: Vec<ExpirySlice> = result
            .options
            .iter()
            .filter_map(convert_slice)
            .collect();
        let fetched: Vec<i64> = result
            .options
            .iter()
            .filter_map(|o| o.expiration_date)
            .collect();

        for expiry_ts in result.expiration_dates.iter().copied() {
            if fetched.contains(&expiry_ts) {
                continue;
            }
            let url = format!("{BASE_URL}/v7/finance/options/{symbol}?date={expiry_ts}");
            match self.get_json::<OptionsResponse>(&url).await {
                Ok(p) => {
                    if let Ok(r) = first_result(p, symbol) {
                        slices.extend(r.options.iter().filter_map(convert_slice));
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping expiration {} for {}: {}", expiry_ts, symbol, e);
                }
            }
        }

        if slices.is_empty() {
            return Err(FlowError::InsufficientData(format!(
                "No option data for {symbol}"
            )));
        }

        slices.sort_by_key(|s| s.expiration);
        Ok(OptionChain {
            symbol: symbol.to_string(),
            spot,
            prev_close,
            captured_at: Utc::now(),
            slices,
        })
    }
}

fn first_result(payload: OptionsResponse, symbol: &str) -> Result<OptionChainResult, FlowError> {
    payload
        .option_chain
        .result
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| FlowError::Api(format!("Empty option chain for {symbol}")))
}

/// Convert one Yahoo option slice to the core model. Slices without an
/// expiration timestamp are dropped.
fn convert_slice(slice: &YahooOptionsSlice) -> Option<ExpirySlice> {
    let ts = slice.expiration_date?;
    let expiration = DateTime::from_timestamp(ts, 0)?.date_naive();
    Some(ExpirySlice {
        expiration,
        calls: slice.calls.iter().map(convert_contract).collect(),
        puts: slice.puts.iter().map(convert_contract).collect(),
    })
}

fn convert_contract(c: &YahooContract) -> OptionQuote {
    OptionQuote {
        strike: c.strike.unwrap_or(f64::NAN),
        implied_volatility: c.implied_volatility.unwrap_or(0.0),
        open_interest: c.open_interest.unwrap_or(f64::NAN),
        volume: c.volume.unwrap_or(f64::NAN),
        last_price: c.last_price.unwrap_or(0.0),
        in_the_money: c.in_the_money.unwrap_or(false),
    }
}

// ---- wire format ----

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsResponse {
    option_chain: OptionChainBody,
}

#[derive(Debug, Deserialize)]
struct OptionChainBody {
    #[serde(default)]
    result: Option<Vec<OptionChainResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionChainResult {
    #[serde(default)]
    expiration_dates: Vec<i64>,
    quote: Option<UnderlyingQuote>,
    #[serde(default)]
    options: Vec<YahooOptionsSlice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnderlyingQuote {
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooOptionsSlice {
    expiration_date: Option<i64>,
    #[serde(default)]
    calls: Vec<YahooContract>,
    #[serde(default)]
    puts: Vec<YahooContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooContract {
    strike: Option<f64>,
    implied_volatility: Option<f64>,
    open_interest: Option<f64>,
    volume: Option<f64>,
    last_price: Option<f64>,
    in_the_money: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "optionChain": {
            "result": [{
                "underlyingSymbol": "SPY",
                "expirationDates": [1718928000, 1719532800],
                "quote": {
                    "regularMarketPrice": 543.25,
                    "regularMarketPreviousClose": 541.10
                },
                "options": [{
                    "expirationDate": 1718928000,
                    "calls": [{
                        "strike": 545.0,
                        "impliedVolatility": 0.142,
                        "openInterest": 1250,
                        "volume": 320,
                        "lastPrice": 2.31,
                        "inTheMoney": false
                    }],
                    "puts": [{
                        "strike": 545.0,
                        "impliedVolatility": 0.151,
                        "lastPrice": 3.05,
                        "inTheMoney": true
                    }]
                }]
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_deserialize_options_payload() {
        let payload: OptionsResponse = serde_json::from_str(SAMPLE).unwrap();
        let result = first_result(payload, "SPY").unwrap();

        assert_eq!(result.expiration_dates.len(), 2);
        let quote = result.quote.as_ref().unwrap();
        assert_eq!(quote.regular_market_price, Some(543.25));

        let slice = convert_slice(&result.options[0]).unwrap();
        assert_eq!(
            slice.expiration,
            chrono::NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
        );
        assert_eq!(slice.calls.len(), 1);
        assert_eq!(slice.calls[0].strike, 545.0);
        assert_eq!(slice.calls[0].open_interest, 1250.0);
        // Missing openInterest/volume come through as NaN, missing booleans
        // default
        assert!(slice.puts[0].open_interest.is_nan());
        assert!(slice.puts[0].volume.is_nan());
        assert!(slice.puts[0].in_the_money);
    }

    #[test]
    fn test_deserialize_chart_payload() {
        let sample = r#"{
            "chart": {
                "result": [{
                    "meta": {
                        "regularMarketPrice": 101.5,
                        "chartPreviousClose": 100.0
                    }
                }]
            }
        }"#;
        let payload: ChartResponse = serde_json::from_str(sample).unwrap();
        let result = payload.chart.result.into_iter().flatten().next().unwrap();
        assert_eq!(result.meta.regular_market_price, Some(101.5));
        assert_eq!(result.meta.chart_previous_close, Some(100.0));
    }

    #[test]
    fn test_empty_result_is_api_error() {
        let payload: OptionsResponse =
            serde_json::from_str(r#"{"optionChain": {"result": []}}"#).unwrap();
        assert!(matches!(
            first_result(payload, "XYZ"),
            Err(FlowError::Api(_))
        ));
    }
}
