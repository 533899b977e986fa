use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use common::{Error, PriceBar, PriceHistoryProvider, Result};

const BASE_URL: &str = "https://query2.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Daily bars from the Yahoo Finance v8 chart endpoint.
pub struct YahooClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        let period2 = end
            .and_hms_opt(23, 59, 59)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(period1);
        format!(
            "{}/v8/finance/chart/{symbol}?period1={period1}&period2={period2}&interval=1d",
            self.base_url
        )
    }

    async fn get_chart(&self, symbol: &str, url: &str) -> Result<ChartResponse> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.base_delay * 2u32.pow(attempt - 1)).await;
            }

            let resp = match self.http.get(url).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(symbol, attempt, error = %e, "Yahoo request failed, retrying");
                    last_error = Some(e.to_string());
                    continue;
                }
                Err(e) => return Err(Error::data_unavailable(symbol, e.to_string())),
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!(symbol, attempt, %status, "Yahoo throttled or unavailable, retrying");
                last_error = Some(format!("HTTP {status}"));
                continue;
            }

            // 404 still carries a chart error body naming the problem.
            if !status.is_success() && status != StatusCode::NOT_FOUND {
                return Err(Error::data_unavailable(symbol, format!("HTTP {status}")));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| Error::data_unavailable(symbol, e.to_string()))?;
            return serde_json::from_str(&body).map_err(|e| {
                Error::data_unavailable(symbol, format!("unexpected response ({status}): {e}"))
            });
        }

        Err(Error::data_unavailable(
            symbol,
            last_error.unwrap_or_else(|| "retries exhausted".into()),
        ))
    }
}

#[async_trait]
impl PriceHistoryProvider for YahooClient {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let url = self.chart_url(symbol, start, end);
        debug!(symbol, %start, %end, "Fetching Yahoo chart");
        let chart = self.get_chart(symbol, &url).await?;
        let bars = parse_chart(symbol, chart)?;
        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
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

/// Convert a chart payload to bars, oldest first with unique dates.
///
/// Bars missing any of open/high/low/close are dropped; missing volume reads
/// as 0. A chart with no timestamps (a symbol without trades in the range)
/// yields an empty history rather than an error.
fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>> {
    let Some(results) = resp.chart.result else {
        let reason = match resp.chart.error {
            Some(err) => format!("{}: {}", err.code, err.description),
            None => "empty chart result".to_string(),
        };
        return Err(Error::data_unavailable(symbol, reason));
    };

    let Some(data) = results.into_iter().next() else {
        return Err(Error::data_unavailable(symbol, "chart result array is empty"));
    };
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };
    let Some(quote) = data.indicators.quote.into_iter().next() else {
        return Err(Error::data_unavailable(symbol, "no quote data"));
    };

    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let mut bars: Vec<PriceBar> = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            warn!(symbol, ts, "Skipping bar with invalid timestamp");
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        let bar = PriceBar {
            date,
            open,
            high,
            low,
            close,
            volume: at(&quote.volume, i).unwrap_or(0.0),
        };

        // Intraday refreshes can repeat the latest date.
        if let Some(last) = bars.last_mut() {
            if last.date == date {
                *last = bar;
                continue;
            }
            if last.date > date {
                continue;
            }
        }
        bars.push(bar);
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<PriceBar>> {
        parse_chart("TEST", serde_json::from_str(json).unwrap())
    }

    // 2024-01-02 14:30 UTC and the two following sessions.
    const T0: i64 = 1_704_205_800;
    const DAY: i64 = 86_400;

    #[test]
    fn parses_bars_and_skips_incomplete_rows() {
        let json = format!(
            r#"{{"chart":{{"result":[{{
                "timestamp":[{t0},{t1},{t2}],
                "indicators":{{"quote":[{{
                    "open":[10.0,null,12.0],
                    "high":[11.0,11.5,12.5],
                    "low":[9.5,10.5,11.5],
                    "close":[10.5,11.0,12.0],
                    "volume":[1000,2000,null]
                }}]}}
            }}],"error":null}}}}"#,
            t0 = T0,
            t1 = T0 + DAY,
            t2 = T0 + 2 * DAY
        );
        let bars = parse(&json).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].volume, 1000.0);
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(bars[1].volume, 0.0);
    }

    #[test]
    fn duplicate_trailing_date_keeps_latest_values() {
        let json = format!(
            r#"{{"chart":{{"result":[{{
                "timestamp":[{t0},{t1}],
                "indicators":{{"quote":[{{
                    "open":[1.0,1.0],"high":[2.0,3.0],"low":[0.5,0.5],
                    "close":[1.5,2.5],"volume":[10,20]
                }}]}}
            }}],"error":null}}}}"#,
            t0 = T0,
            t1 = T0 + 3_600
        );
        let bars = parse(&json).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 2.5);
    }

    #[test]
    fn chart_error_maps_to_data_unavailable() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse(json).unwrap_err();
        match err {
            Error::DataUnavailable { symbol, reason } => {
                assert_eq!(symbol, "TEST");
                assert!(reason.starts_with("Not Found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_timestamps_is_an_empty_history() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn chart_url_covers_whole_end_day() {
        let client = YahooClient::new().unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let url = client.chart_url("NVDA", d, d);
        assert!(url.contains("/v8/finance/chart/NVDA?"));
        assert!(url.contains("period1=1704153600"));
        assert!(url.contains("period2=1704239999"));
        assert!(url.ends_with("interval=1d"));
    }
}
