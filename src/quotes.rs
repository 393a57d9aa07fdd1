use crate::config::{QUOTE_CACHE_TTL_SECS, QuoteProviderMode, REGIME_INDEX_SYMBOL};
use crate::regime::QuoteRegimeDetector;
use crate::universe::AssetUniverse;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const YAHOO_MAX_ATTEMPTS: usize = 3;
const YAHOO_TIMEOUT_SECS: u64 = 10;
const YAHOO_RETRY_DELAY_MS: u64 = 700;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    /// Percent, not fraction: 1.25 means +1.25%.
    pub change_percent: f64,
    pub source: String,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ── Yahoo chart payload ─────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    meta: YahooMeta,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    symbol: Option<String>,
    short_name: Option<String>,
    long_name: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    close: Vec<Option<f64>>,
}

fn quote_from_chart(symbol: &str, parsed: YahooChartResponse) -> Result<Quote> {
    let result = parsed
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or(anyhow!("No chart result for {}", symbol))?;

    let last_close = result
        .indicators
        .quote
        .first()
        .and_then(|q| q.close.iter().rev().find_map(|v| *v));
    let price = result
        .meta
        .regular_market_price
        .or(last_close)
        .ok_or(anyhow!("No valid price for {}", symbol))?;
    let previous = result
        .meta
        .chart_previous_close
        .or(result.meta.previous_close)
        .unwrap_or(price);

    let change = price - previous;
    let change_percent = if previous != 0.0 {
        change / previous * 100.0
    } else {
        0.0
    };

    Ok(Quote {
        symbol: result.meta.symbol.unwrap_or_else(|| symbol.to_string()),
        name: result
            .meta
            .long_name
            .or(result.meta.short_name)
            .unwrap_or_else(|| symbol.to_string()),
        price,
        change: round2(change),
        change_percent: round2(change_percent),
        source: "yahoo".to_string(),
    })
}

// ── Live provider ───────────────────────────────────────────────────────────

/// Yahoo Finance chart endpoint with an in-memory TTL cache.
pub struct LiveQuotes {
    client: reqwest::Client,
    cache: RwLock<HashMap<String, (Instant, Quote)>>,
    ttl: Duration,
}

impl Default for LiveQuotes {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveQuotes {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(QUOTE_CACHE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    async fn cached(&self, symbol: &str) -> Option<Quote> {
        let cache = self.cache.read().await;
        cache
            .get(symbol)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, q)| q.clone())
    }

    pub async fn quote(&self, symbol: &str) -> Result<Quote> {
        if let Some(q) = self.cached(symbol).await {
            debug!("Quote cache hit for {}", symbol);
            return Ok(q);
        }
        let quote = self.fetch_yahoo(symbol).await?;
        self.cache
            .write()
            .await
            .insert(symbol.to_string(), (Instant::now(), quote.clone()));
        Ok(quote)
    }

    async fn fetch_yahoo(&self, symbol: &str) -> Result<Quote> {
        let urls = [
            format!(
                "https://query1.finance.yahoo.com/v8/finance/chart/{}?interval=1m&range=1d",
                symbol
            ),
            format!(
                "https://query2.finance.yahoo.com/v8/finance/chart/{}?interval=1m&range=1d",
                symbol
            ),
        ];

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=YAHOO_MAX_ATTEMPTS {
            for url in &urls {
                let response = match self
                    .client
                    .get(url)
                    .header("User-Agent", "Mozilla/5.0")
                    .timeout(Duration::from_secs(YAHOO_TIMEOUT_SECS))
                    .send()
                    .await
                {
                    Ok(resp) => resp,
                    Err(error) => {
                        last_error = Some(error.into());
                        continue;
                    }
                };

                match response.json::<YahooChartResponse>().await {
                    Ok(parsed) => match quote_from_chart(symbol, parsed) {
                        Ok(quote) => return Ok(quote),
                        Err(error) => last_error = Some(error),
                    },
                    Err(error) => last_error = Some(error.into()),
                }
            }

            if attempt < YAHOO_MAX_ATTEMPTS {
                warn!(
                    "Yahoo quote fetch failed for {} (attempt {}/{}), retrying...",
                    symbol, attempt, YAHOO_MAX_ATTEMPTS
                );
                tokio::time::sleep(Duration::from_millis(YAHOO_RETRY_DELAY_MS)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Failed to fetch Yahoo quote for {}", symbol)))
    }
}

// ── Fixture provider ────────────────────────────────────────────────────────

/// Reference prices from the asset universe, zero change.
pub struct FixtureQuotes {
    universe: Arc<AssetUniverse>,
}

impl FixtureQuotes {
    pub fn new(universe: Arc<AssetUniverse>) -> Self {
        Self { universe }
    }

    pub fn quote(&self, symbol: &str) -> Result<Quote> {
        let asset = self
            .universe
            .get(symbol)
            .ok_or(anyhow!("No fixture quote for {}", symbol))?;
        Ok(Quote {
            symbol: asset.ticker.clone(),
            name: asset.name.clone(),
            price: asset.price,
            change: 0.0,
            change_percent: 0.0,
            source: "fixture".to_string(),
        })
    }
}

// ── Provider ────────────────────────────────────────────────────────────────

/// Market-data capability, chosen once from configuration.
pub enum QuoteProvider {
    Live(LiveQuotes),
    Fixture(FixtureQuotes),
}

impl QuoteProvider {
    pub fn from_mode(mode: QuoteProviderMode, universe: Arc<AssetUniverse>) -> Self {
        info!("Quote provider: {}", mode.as_str());
        match mode {
            QuoteProviderMode::Live => Self::Live(LiveQuotes::new()),
            QuoteProviderMode::Fixture => Self::Fixture(FixtureQuotes::new(universe)),
        }
    }

    pub fn mode(&self) -> QuoteProviderMode {
        match self {
            Self::Live(_) => QuoteProviderMode::Live,
            Self::Fixture(_) => QuoteProviderMode::Fixture,
        }
    }

    pub async fn quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(anyhow!("Empty symbol"));
        }
        match self {
            Self::Live(live) => live.quote(&symbol).await,
            Self::Fixture(fixture) => fixture.quote(&symbol),
        }
    }

    /// Fetches each symbol in turn; failures are reported, not fatal.
    pub async fn quotes(&self, symbols: &[String]) -> (Vec<Quote>, Vec<String>) {
        let mut quotes = Vec::with_capacity(symbols.len());
        let mut failed = Vec::new();
        for symbol in symbols {
            match self.quote(symbol).await {
                Ok(q) => quotes.push(q),
                Err(e) => {
                    warn!("Quote for {} unavailable: {}", symbol, e);
                    failed.push(symbol.clone());
                }
            }
        }
        (quotes, failed)
    }

    /// Regime detector driven by today's move in the index ETF.
    pub async fn index_regime_detector(&self) -> Result<QuoteRegimeDetector> {
        let quote = self.quote(REGIME_INDEX_SYMBOL).await?;
        Ok(QuoteRegimeDetector::new(quote))
    }
}

/// New universe with provider prices. Tickers that fail keep their
/// reference price; bad prices go through asset cleaning.
pub async fn refresh_prices(universe: &AssetUniverse, provider: &QuoteProvider) -> AssetUniverse {
    let symbols: Vec<String> = universe.assets().iter().map(|a| a.ticker.clone()).collect();
    let (quotes, failed) = provider.quotes(&symbols).await;

    if !failed.is_empty() {
        warn!(
            "Keeping reference prices for {} tickers: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    info!(
        "Refreshed {}/{} prices via {}",
        quotes.len(),
        symbols.len(),
        provider.mode().as_str()
    );

    let prices: HashMap<String, f64> = quotes.into_iter().map(|q| (q.symbol, q.price)).collect();
    universe.with_prices(&prices)
}
