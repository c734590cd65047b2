use crate::domain::market::{round2, HistoryPeriod, ListingRow, PriceBar, StockQuote};
use crate::ingest::http::{build_client, env_secs, random_user_agent};
use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQ_DELAY_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct ChartClient {
    http: reqwest::Client,
    base_url: String,
    req_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub meta: ChartMeta,
    pub bars: Vec<PriceBar>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub regular_market_day_high: Option<f64>,
    #[serde(default)]
    pub regular_market_day_low: Option<f64>,
    #[serde(default)]
    pub regular_market_volume: Option<f64>,
}

impl ChartClient {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("YAHOO_CHART_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let req_delay_ms = std::env::var("CHART_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQ_DELAY_MS);
        let http = build_client(env_secs("CHART_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))?;

        Ok(Self {
            http,
            base_url,
            req_delay: Duration::from_millis(req_delay_ms),
        })
    }

    /// Pause between consecutive chart requests.
    pub fn req_delay(&self) -> Duration {
        self.req_delay
    }

    pub async fn fetch_chart(&self, symbol: &str, period: HistoryPeriod) -> Result<Chart> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            symbol
        );
        let res = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .query(&[("range", period.range()), ("interval", period.interval())])
            .send()
            .await
            .with_context(|| format!("chart request failed (symbol={symbol}, period={period})"))?;

        let status = res.status();
        let text = res.text().await.context("failed to read chart response")?;
        if !status.is_success() {
            anyhow::bail!("chart endpoint HTTP {status} for {symbol}: {text}");
        }

        parse_chart(&text).with_context(|| format!("invalid chart payload for {symbol}"))
    }
}

pub fn parse_chart(raw: &str) -> Result<Chart> {
    let env: ChartEnvelope = serde_json::from_str(raw).context("chart response is not valid JSON")?;
    if let Some(err) = env.chart.error.filter(|v| !v.is_null()) {
        anyhow::bail!("chart endpoint error: {err}");
    }

    let result = env
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("chart response has no result")?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let at = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) =
            (at(&quote.open), at(&quote.high), at(&quote.low), at(&quote.close))
        else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(*ts, 0) else {
            continue;
        };

        bars.push(PriceBar {
            date,
            open: round2(open),
            high: round2(high),
            low: round2(low),
            close: round2(close),
            volume: round2(at(&quote.volume).unwrap_or(0.0)),
        });
    }

    Ok(Chart {
        meta: result.meta,
        bars,
    })
}

/// Completes a listing row with the latest price data. Prefers the chart
/// metadata and falls back to the last bar.
pub fn build_quote(row: ListingRow, chart: &Chart) -> Option<StockQuote> {
    let last_bar = chart.bars.last();
    let last = chart
        .meta
        .regular_market_price
        .or_else(|| last_bar.map(|b| b.close))?;
    let high = chart
        .meta
        .regular_market_day_high
        .or_else(|| last_bar.map(|b| b.high))
        .unwrap_or(last);
    let low = chart
        .meta
        .regular_market_day_low
        .or_else(|| last_bar.map(|b| b.low))
        .unwrap_or(last);
    let volume = chart
        .meta
        .regular_market_volume
        .or_else(|| last_bar.map(|b| b.volume))
        .unwrap_or(0.0);

    Some(StockQuote {
        company: row.company,
        last: round2(last),
        high: round2(high),
        low: round2(low),
        volume: (volume / 1_000_000.0 * 1000.0).round() / 1000.0,
        change: row.change,
        change_pct: row.change_pct,
        growth: row.growth,
    })
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}
