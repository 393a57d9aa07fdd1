use crate::error::{Result, StrategyError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

// ──────────────────────────────────────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────────────────────────────────────

/// Technology names above this volatility count as the crypto sleeve.
pub const CRYPTO_PROXY_VOLATILITY: f64 = 0.40;

/// Price substituted for non-positive or non-finite quotes.
pub const SENTINEL_PRICE: f64 = 1.0;

/// Cross-sector correlation when a pair has no entry in the table.
pub const DEFAULT_SECTOR_CORRELATION: f64 = 0.2;

/// Self-correlation tolerance used by validation.
pub const SELF_CORRELATION_TOLERANCE: f64 = 0.001;

// ──────────────────────────────────────────────────────────────────────────────
// Data Structures
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    Technology,
    Healthcare,
    Financial,
    Energy,
    Consumer,
    Utilities,
    #[serde(rename = "Real Estate")]
    RealEstate,
    Bonds,
    #[serde(rename = "ETF")]
    Etf,
    Other,
}

impl Sector {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technology => "Technology",
            Self::Healthcare => "Healthcare",
            Self::Financial => "Financial",
            Self::Energy => "Energy",
            Self::Consumer => "Consumer",
            Self::Utilities => "Utilities",
            Self::RealEstate => "Real Estate",
            Self::Bonds => "Bonds",
            Self::Etf => "ETF",
            Self::Other => "Other",
        }
    }
}

/// Sector-pair correlations, one canonical entry per unordered pair.
const SECTOR_CORRELATIONS: &[(Sector, Sector, f64)] = {
    use Sector::*;
    &[
        (Technology, Technology, 0.8),
        (Healthcare, Healthcare, 0.75),
        (Financial, Financial, 0.85),
        (Energy, Energy, 0.9),
        (Consumer, Consumer, 0.7),
        (Utilities, Utilities, 0.8),
        (RealEstate, RealEstate, 0.85),
        (Bonds, Bonds, 0.9),
        (Etf, Etf, 0.6),
        (Technology, Healthcare, 0.2),
        (Technology, Financial, 0.3),
        (Technology, Energy, 0.1),
        (Technology, Consumer, 0.25),
        (Technology, Utilities, 0.15),
        (Technology, RealEstate, 0.2),
        (Technology, Bonds, -0.2),
        (Technology, Etf, 0.4),
        (Healthcare, Financial, 0.25),
        (Healthcare, Energy, 0.15),
        (Healthcare, Consumer, 0.3),
        (Healthcare, Utilities, 0.2),
        (Healthcare, RealEstate, 0.15),
        (Healthcare, Bonds, -0.1),
        (Healthcare, Etf, 0.3),
        (Financial, Energy, 0.4),
        (Financial, Consumer, 0.35),
        (Financial, Utilities, 0.25),
        (Financial, RealEstate, 0.5),
        (Financial, Bonds, -0.3),
        (Financial, Etf, 0.45),
        (Energy, Consumer, 0.2),
        (Energy, Utilities, 0.3),
        (Energy, RealEstate, 0.25),
        (Energy, Bonds, -0.2),
        (Energy, Etf, 0.3),
        (Consumer, Utilities, 0.4),
        (Consumer, RealEstate, 0.3),
        (Consumer, Bonds, -0.1),
        (Consumer, Etf, 0.35),
        (Utilities, RealEstate, 0.4),
        (Utilities, Bonds, 0.1),
        (Utilities, Etf, 0.25),
        (RealEstate, Bonds, 0.05),
        (RealEstate, Etf, 0.4),
        (Bonds, Etf, -0.15),
    ]
};

/// Correlation between two distinct assets in the given sectors.
/// Order-independent: both orientations resolve to the same table entry.
pub fn sector_correlation(a: Sector, b: Sector) -> f64 {
    SECTOR_CORRELATIONS
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, c)| *c)
        .unwrap_or(DEFAULT_SECTOR_CORRELATION)
        .clamp(-1.0, 1.0)
}

/// Allocation bucket an asset reports into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetCategory {
    Stock,
    Bond,
    #[serde(rename = "ETF")]
    Etf,
    CryptoProxy,
}

impl AssetCategory {
    /// The single place that decides which bucket an asset belongs to.
    pub fn classify(sector: Sector, volatility: f64) -> Self {
        match sector {
            Sector::Bonds => Self::Bond,
            Sector::Etf => Self::Etf,
            Sector::Technology if volatility > CRYPTO_PROXY_VOLATILITY => Self::CryptoProxy,
            _ => Self::Stock,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetrics {
    /// 12-month return, also the expected-return proxy.
    #[serde(rename = "momentum12M")]
    pub momentum_12m: f64,
    pub earnings_growth: f64,
    /// Annualized standard deviation.
    pub volatility: f64,
    pub beta: f64,
    pub dividend_yield: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub ticker: String,
    pub name: String,
    pub sector: Sector,
    pub price: f64,
    pub metrics: AssetMetrics,
    pub category: AssetCategory,
}

impl Asset {
    pub fn new(
        ticker: &str,
        name: &str,
        sector: Sector,
        price: f64,
        metrics: AssetMetrics,
    ) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            name: name.to_string(),
            sector,
            price,
            category: AssetCategory::classify(sector, metrics.volatility),
            metrics,
        }
    }

    pub fn is_bond(&self) -> bool {
        self.sector == Sector::Bonds
    }
}

/// Clamps out-of-range metrics and substitutes a sentinel for bad prices.
/// Never fails; every correction is logged.
pub fn clean_asset(mut asset: Asset) -> Asset {
    let m = &mut asset.metrics;

    if !(m.volatility.is_finite() && m.volatility >= 0.0) {
        warn!("{}: volatility {} out of range, clamped to 0", asset.ticker, m.volatility);
        m.volatility = 0.0;
    }
    if !(m.dividend_yield.is_finite() && m.dividend_yield >= 0.0) {
        warn!("{}: dividend yield {} out of range, clamped to 0", asset.ticker, m.dividend_yield);
        m.dividend_yield = 0.0;
    }
    for (label, value) in [
        ("momentum", &mut m.momentum_12m),
        ("earnings growth", &mut m.earnings_growth),
        ("beta", &mut m.beta),
    ] {
        if !value.is_finite() {
            warn!("{}: {} is not finite, replaced with 0", asset.ticker, label);
            *value = 0.0;
        }
    }
    if !(asset.price.is_finite() && asset.price > 0.0) {
        warn!(
            "{}: price {} is not positive, substituting {}",
            asset.ticker, asset.price, SENTINEL_PRICE
        );
        asset.price = SENTINEL_PRICE;
    }

    asset.category = AssetCategory::classify(asset.sector, asset.metrics.volatility);
    asset
}

fn clean_correlation(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Asset Universe
// ──────────────────────────────────────────────────────────────────────────────

/// Immutable catalog of assets plus the correlation matrix aligned to
/// catalog order. Built once and shared read-only (`Arc`) by every consumer.
#[derive(Clone, Debug)]
pub struct AssetUniverse {
    assets: Vec<Asset>,
    index: HashMap<String, usize>,
    correlations: Vec<Vec<f64>>,
}

impl AssetUniverse {
    /// Builds a universe whose correlations come from the sector-pair table.
    pub fn new(assets: Vec<Asset>) -> Self {
        let assets = dedup_and_clean(assets);
        let correlations = sector_matrix(&assets);
        Self::from_parts(assets, correlations)
    }

    /// Builds a universe with an externally supplied matrix. Entries are
    /// clamped, the diagonal forced to 1.0 and the lower triangle mirrored
    /// from the upper one. A matrix of the wrong shape is replaced by the
    /// sector-derived one.
    pub fn with_correlations(assets: Vec<Asset>, matrix: Vec<Vec<f64>>) -> Self {
        let assets = dedup_and_clean(assets);
        let n = assets.len();

        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            warn!(
                "Correlation matrix shape does not match {} assets; rebuilding from sector table",
                n
            );
            let correlations = sector_matrix(&assets);
            return Self::from_parts(assets, correlations);
        }

        let mut correlations = vec![vec![0.0; n]; n];
        for i in 0..n {
            correlations[i][i] = 1.0;
            for j in (i + 1)..n {
                let c = clean_correlation(matrix[i][j]);
                correlations[i][j] = c;
                correlations[j][i] = c;
            }
        }

        Self::from_parts(assets, correlations)
    }

    fn from_parts(assets: Vec<Asset>, correlations: Vec<Vec<f64>>) -> Self {
        let index = assets
            .iter()
            .enumerate()
            .map(|(i, a)| (a.ticker.clone(), i))
            .collect();
        Self {
            assets,
            index,
            correlations,
        }
    }

    /// The reference 30-asset catalog.
    pub fn standard() -> Self {
        Self::new(standard_assets())
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.index.get(&ticker.trim().to_uppercase()).copied()
    }

    pub fn get(&self, ticker: &str) -> Option<&Asset> {
        self.index_of(ticker).map(|i| &self.assets[i])
    }

    pub fn require(&self, ticker: &str) -> Result<&Asset> {
        self.get(ticker)
            .ok_or_else(|| StrategyError::UnknownTicker(ticker.to_string()))
    }

    pub fn by_sector(&self, sector: Sector) -> Vec<&Asset> {
        self.assets.iter().filter(|a| a.sector == sector).collect()
    }

    /// N×N matrix aligned to `assets()` order.
    pub fn correlation_matrix(&self) -> &[Vec<f64>] {
        &self.correlations
    }

    /// Pairwise correlation; 0.0 when either ticker is unknown.
    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        match (self.index_of(a), self.index_of(b)) {
            (Some(i), Some(j)) => self.correlations[i][j],
            _ => 0.0,
        }
    }

    /// Returns a copy with prices replaced where `prices` has an entry.
    pub fn with_prices(&self, prices: &HashMap<String, f64>) -> Self {
        let assets = self
            .assets
            .iter()
            .map(|a| {
                let mut updated = a.clone();
                if let Some(&p) = prices.get(&a.ticker) {
                    updated.price = p;
                }
                clean_asset(updated)
            })
            .collect();
        Self::from_parts(assets, self.correlations.clone())
    }

    /// Lists every violated matrix invariant; empty means valid.
    pub fn validation_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let n = self.assets.len();

        for i in 0..n {
            let ticker = &self.assets[i].ticker;
            if (self.correlations[i][i] - 1.0).abs() > SELF_CORRELATION_TOLERANCE {
                issues.push(format!(
                    "{}: self-correlation {} is not 1.0",
                    ticker, self.correlations[i][i]
                ));
            }
            for j in 0..n {
                let c = self.correlations[i][j];
                if !(-1.0..=1.0).contains(&c) {
                    issues.push(format!(
                        "{}/{}: correlation {} outside [-1, 1]",
                        ticker, self.assets[j].ticker, c
                    ));
                }
                if j > i && c != self.correlations[j][i] {
                    issues.push(format!(
                        "{}/{}: correlation is not symmetric",
                        ticker, self.assets[j].ticker
                    ));
                }
            }
        }

        issues
    }

    pub fn is_valid(&self) -> bool {
        self.validation_issues().is_empty()
    }
}

fn dedup_and_clean(assets: Vec<Asset>) -> Vec<Asset> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(assets.len());
    for asset in assets {
        let asset = clean_asset(asset);
        if !seen.insert(asset.ticker.clone()) {
            warn!("Duplicate ticker {} dropped from universe", asset.ticker);
            continue;
        }
        out.push(asset);
    }
    out
}

/// Computes each unordered pair once and mirrors it.
fn sector_matrix(assets: &[Asset]) -> Vec<Vec<f64>> {
    let n = assets.len();
    let mut m = vec![vec![0.0; n]; n];
    for i in 0..n {
        m[i][i] = 1.0;
        for j in (i + 1)..n {
            let c = sector_correlation(assets[i].sector, assets[j].sector);
            m[i][j] = c;
            m[j][i] = c;
        }
    }
    debug!("Built {}x{} sector correlation matrix", n, n);
    m
}

fn asset(ticker: &str, name: &str, sector: Sector, price: f64, m: [f64; 5]) -> Asset {
    Asset::new(
        ticker,
        name,
        sector,
        price,
        AssetMetrics {
            momentum_12m: m[0],
            earnings_growth: m[1],
            volatility: m[2],
            beta: m[3],
            dividend_yield: m[4],
        },
    )
}

/// Metrics order: momentum, earnings growth, volatility, beta, dividend yield.
fn standard_assets() -> Vec<Asset> {
    use Sector::*;
    vec![
        asset("NVDA", "NVIDIA Corporation", Technology, 875.28, [1.89, 1.26, 0.45, 1.68, 0.003]),
        asset("AMD", "Advanced Micro Devices", Technology, 142.56, [0.75, 0.89, 0.42, 1.55, 0.0]),
        asset("MSFT", "Microsoft Corporation", Technology, 415.26, [0.28, 0.15, 0.22, 0.89, 0.007]),
        asset("GOOGL", "Alphabet Inc Class A", Technology, 175.32, [0.31, 0.42, 0.25, 1.05, 0.0]),
        asset("META", "Meta Platforms Inc", Technology, 563.92, [0.73, 0.35, 0.35, 1.18, 0.004]),
        asset("AMZN", "Amazon.com Inc", Technology, 195.12, [0.44, 0.52, 0.30, 1.15, 0.0]),
        asset("TSLA", "Tesla Inc", Technology, 248.98, [-0.15, 0.25, 0.55, 2.31, 0.0]),
        asset("AAPL", "Apple Inc", Technology, 229.87, [0.22, 0.11, 0.25, 1.24, 0.004]),
        asset("JNJ", "Johnson & Johnson", Healthcare, 155.43, [0.08, 0.06, 0.16, 0.68, 0.029]),
        asset("UNH", "UnitedHealth Group Inc", Healthcare, 595.21, [0.18, 0.14, 0.20, 0.75, 0.013]),
        asset("PFE", "Pfizer Inc", Healthcare, 25.89, [-0.12, -0.25, 0.22, 0.52, 0.061]),
        asset("JPM", "JPMorgan Chase & Co", Financial, 231.52, [0.35, 0.22, 0.28, 1.15, 0.021]),
        asset("BAC", "Bank of America Corp", Financial, 45.67, [0.41, 0.18, 0.32, 1.28, 0.024]),
        asset("V", "Visa Inc", Financial, 312.45, [0.19, 0.12, 0.20, 0.98, 0.007]),
        asset("XOM", "Exxon Mobil Corporation", Energy, 118.92, [0.12, 0.45, 0.35, 1.42, 0.034]),
        asset("CVX", "Chevron Corporation", Energy, 158.73, [0.08, 0.38, 0.30, 1.25, 0.031]),
        asset("KO", "The Coca-Cola Company", Consumer, 62.84, [0.15, 0.08, 0.15, 0.58, 0.030]),
        asset("PG", "Procter & Gamble", Consumer, 165.23, [0.12, 0.05, 0.14, 0.45, 0.024]),
        asset("WMT", "Walmart Inc", Consumer, 95.12, [0.58, 0.07, 0.17, 0.52, 0.023]),
        asset("HD", "The Home Depot Inc", Consumer, 412.67, [0.24, 0.09, 0.22, 0.98, 0.024]),
        asset("NEE", "NextEra Energy Inc", Utilities, 78.45, [0.22, 0.08, 0.18, 0.68, 0.028]),
        asset("SO", "The Southern Company", Utilities, 89.23, [0.31, 0.06, 0.15, 0.42, 0.038]),
        asset("VNO", "Vornado Realty Trust", RealEstate, 28.67, [-0.08, -0.15, 0.25, 1.12, 0.065]),
        asset("VNQ", "Vanguard Real Estate ETF", RealEstate, 92.34, [0.18, 0.12, 0.22, 0.95, 0.035]),
        asset("BND", "Vanguard Total Bond Market ETF", Bonds, 72.45, [0.05, 0.0, 0.05, -0.15, 0.042]),
        asset("SPY", "SPDR S&P 500 ETF Trust", Etf, 589.67, [0.26, 0.12, 0.16, 1.0, 0.013]),
        asset("QQQ", "Invesco QQQ Trust", Etf, 512.89, [0.29, 0.18, 0.22, 1.15, 0.006]),
        asset("GLD", "SPDR Gold Trust", Etf, 245.12, [0.28, 0.0, 0.18, -0.05, 0.0]),
        asset("TLT", "iShares 20+ Year Treasury Bond ETF", Bonds, 89.23, [0.02, 0.0, 0.12, -0.25, 0.038]),
        asset("VYM", "Vanguard High Dividend Yield ETF", Etf, 125.67, [0.14, 0.08, 0.15, 0.85, 0.029]),
    ]
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_standard_universe_shape() {
        let u = AssetUniverse::standard();
        assert_eq!(u.len(), 30);
        assert_eq!(u.correlation_matrix().len(), 30);
        assert!(u.correlation_matrix().iter().all(|row| row.len() == 30));
        assert_eq!(u.assets()[0].ticker, "NVDA");
        assert_eq!(u.assets()[29].ticker, "VYM");
        assert!(u.is_valid(), "issues: {:?}", u.validation_issues());
    }

    #[test]
    fn test_lookup_by_ticker() {
        let u = AssetUniverse::standard();
        assert_eq!(u.get("spy").map(|a| a.sector), Some(Sector::Etf));
        assert!(u.get("BTC").is_none());
        assert_eq!(
            u.require("BTC"),
            Err(StrategyError::UnknownTicker("BTC".to_string()))
        );
    }

    #[test]
    fn test_known_pair_correlations() {
        let u = AssetUniverse::standard();
        assert_eq!(u.correlation("SPY", "BND"), -0.15);
        assert_eq!(u.correlation("BND", "SPY"), -0.15);
        assert_eq!(u.correlation("NVDA", "AMD"), 0.8);
        assert_eq!(u.correlation("NVDA", "NVDA"), 1.0);
        assert_eq!(u.correlation("NVDA", "NOPE"), 0.0);
    }

    #[test]
    fn test_crypto_proxy_classification() {
        let u = AssetUniverse::standard();
        let proxies: Vec<&str> = u
            .assets()
            .iter()
            .filter(|a| a.category == AssetCategory::CryptoProxy)
            .map(|a| a.ticker.as_str())
            .collect();
        assert_eq!(proxies, vec!["NVDA", "AMD", "TSLA"]);
        assert_eq!(u.get("TLT").map(|a| a.category), Some(AssetCategory::Bond));
        assert_eq!(u.get("GLD").map(|a| a.category), Some(AssetCategory::Etf));
        assert_eq!(u.get("META").map(|a| a.category), Some(AssetCategory::Stock));
    }

    #[test]
    fn test_clean_asset_repairs_bad_record() {
        let dirty = Asset::new(
            "bad",
            "Broken Feed",
            Sector::Technology,
            -5.0,
            AssetMetrics {
                momentum_12m: f64::NAN,
                earnings_growth: 0.1,
                volatility: -0.3,
                beta: 1.0,
                dividend_yield: -0.01,
            },
        );
        let clean = clean_asset(dirty);
        assert_eq!(clean.ticker, "BAD");
        assert_eq!(clean.price, SENTINEL_PRICE);
        assert_eq!(clean.metrics.volatility, 0.0);
        assert_eq!(clean.metrics.dividend_yield, 0.0);
        assert_eq!(clean.metrics.momentum_12m, 0.0);
        assert_eq!(clean.category, AssetCategory::Stock);
    }

    #[test]
    fn test_supplied_matrix_is_cleaned() {
        let assets = standard_assets().into_iter().take(3).collect::<Vec<_>>();
        let matrix = vec![
            vec![0.5, 1.7, -0.2],
            vec![0.9, 0.1, f64::NAN],
            vec![0.3, 0.4, 2.0],
        ];
        let u = AssetUniverse::with_correlations(assets, matrix);
        let m = u.correlation_matrix();
        assert!(u.is_valid(), "issues: {:?}", u.validation_issues());
        assert_eq!(m[0][1], 1.0);
        assert_eq!(m[1][0], 1.0);
        assert_eq!(m[0][2], -0.2);
        assert_eq!(m[2][0], -0.2);
        assert_eq!(m[1][2], 0.0);
        for i in 0..3 {
            assert_eq!(m[i][i], 1.0);
        }
    }

    #[test]
    fn test_misshapen_matrix_falls_back_to_sectors() {
        let assets = standard_assets().into_iter().take(4).collect::<Vec<_>>();
        let u = AssetUniverse::with_correlations(assets, vec![vec![1.0; 2]; 2]);
        assert_eq!(u.correlation_matrix().len(), 4);
        assert_eq!(u.correlation("NVDA", "AMD"), 0.8);
    }

    #[test]
    fn test_duplicate_tickers_are_dropped() {
        let mut assets = standard_assets().into_iter().take(2).collect::<Vec<_>>();
        assets.push(assets[0].clone());
        let u = AssetUniverse::new(assets);
        assert_eq!(u.len(), 2);
    }

    #[test]
    fn test_with_prices_cleans_bad_quotes() {
        let u = AssetUniverse::standard();
        let prices = HashMap::from([("SPY".to_string(), 600.0), ("BND".to_string(), 0.0)]);
        let refreshed = u.with_prices(&prices);
        assert_eq!(refreshed.get("SPY").map(|a| a.price), Some(600.0));
        assert_eq!(refreshed.get("BND").map(|a| a.price), Some(SENTINEL_PRICE));
        assert_eq!(refreshed.get("QQQ").map(|a| a.price), u.get("QQQ").map(|a| a.price));
    }

    proptest! {
        #[test]
        fn prop_correlations_symmetric_and_bounded(i in 0usize..30, j in 0usize..30) {
            let u = AssetUniverse::standard();
            let m = u.correlation_matrix();
            prop_assert_eq!(m[i][j], m[j][i]);
            prop_assert!((-1.0..=1.0).contains(&m[i][j]));
            if i == j {
                prop_assert_eq!(m[i][j], 1.0);
            }
        }

        #[test]
        fn prop_supplied_matrix_always_valid(
            raw in proptest::collection::vec(-3.0f64..3.0, 16)
        ) {
            let assets = standard_assets().into_iter().take(4).collect::<Vec<_>>();
            let matrix: Vec<Vec<f64>> = raw.chunks(4).map(|c| c.to_vec()).collect();
            let u = AssetUniverse::with_correlations(assets, matrix);
            prop_assert!(u.is_valid());
        }
    }
}
