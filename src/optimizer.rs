use crate::config::{HIGH_RISK_THRESHOLD, LOW_RISK_THRESHOLD};
use crate::strategy::RiskScore;
use crate::universe::{Asset, Sector};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Bucket Targets ──────────────────────────────────────────────────────────
// Conservative (< 30)
pub const CONSERVATIVE_BOND_SHARE: f64 = 0.60;
pub const CONSERVATIVE_BOND_COUNT: usize = 3;
pub const CONSERVATIVE_STOCK_SHARE: f64 = 0.40;
pub const CONSERVATIVE_STOCK_COUNT: usize = 4;
pub const CONSERVATIVE_MIN_YIELD: f64 = 0.02;

// Aggressive (> 70)
pub const AGGRESSIVE_GROWTH_SHARE: f64 = 0.70;
pub const AGGRESSIVE_GROWTH_COUNT: usize = 6;
pub const AGGRESSIVE_MIN_MOMENTUM: f64 = 0.30;
pub const AGGRESSIVE_TECH_SHARE: f64 = 0.20;
pub const AGGRESSIVE_TECH_COUNT: usize = 2;
pub const AGGRESSIVE_BOND_SHARE: f64 = 0.10;
pub const AGGRESSIVE_BOND_COUNT: usize = 1;

// Balanced (30..=70)
pub const BALANCED_STOCK_SHARE: f64 = 0.60;
pub const BALANCED_STOCK_COUNT: usize = 5;
pub const BALANCED_MIN_MOMENTUM: f64 = 0.10;
pub const BALANCED_MAX_VOLATILITY: f64 = 0.35;
pub const BALANCED_BOND_SHARE: f64 = 0.25;
pub const BALANCED_BOND_COUNT: usize = 2;
pub const BALANCED_ETF_SHARE: f64 = 0.15;
pub const BALANCED_ETF_COUNT: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: Asset,
    pub weight: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskBand {
    Conservative,
    Balanced,
    Aggressive,
}

impl RiskBand {
    pub fn of(score: RiskScore) -> Self {
        let s = score.get();
        if s < LOW_RISK_THRESHOLD {
            Self::Conservative
        } else if s > HIGH_RISK_THRESHOLD {
            Self::Aggressive
        } else {
            Self::Balanced
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "Conservative",
            Self::Balanced => "Balanced",
            Self::Aggressive => "Aggressive",
        }
    }
}

fn take<'a>(assets: impl Iterator<Item = &'a Asset>, n: usize) -> Vec<&'a Asset> {
    assets.take(n).collect()
}

fn lowest_volatility<'a>(mut assets: Vec<&'a Asset>, n: usize) -> Vec<&'a Asset> {
    assets.sort_by(|a, b| a.metrics.volatility.total_cmp(&b.metrics.volatility));
    assets.truncate(n);
    assets
}

fn top_momentum<'a>(mut assets: Vec<&'a Asset>, n: usize) -> Vec<&'a Asset> {
    assets.sort_by(|a, b| b.metrics.momentum_12m.total_cmp(&a.metrics.momentum_12m));
    assets.truncate(n);
    assets
}

/// Spreads `share` evenly over `bucket`, merging into an existing entry
/// when the same ticker was already picked by an earlier bucket.
fn push_bucket(weights: &mut Vec<AssetWeight>, bucket: &[&Asset], share: f64) {
    if bucket.is_empty() {
        return;
    }
    let each = share / bucket.len() as f64;
    for asset in bucket {
        match weights.iter_mut().find(|w| w.asset.ticker == asset.ticker) {
            Some(existing) => existing.weight += each,
            None => weights.push(AssetWeight {
                asset: (*asset).clone(),
                weight: each,
            }),
        }
    }
}

/// Rescales weights to sum to 1. A zero or non-finite total leaves the
/// slice untouched.
pub fn normalize_weights(weights: &mut [AssetWeight]) {
    let total: f64 = weights.iter().map(|w| w.weight).sum();
    if total > 0.0 && total.is_finite() {
        for w in weights.iter_mut() {
            w.weight /= total;
        }
    }
}

/// Fixed category targets per risk band, renormalized so under-filled
/// buckets do not leave the portfolio short of 100%. Deterministic.
pub fn optimize_mix(assets: &[Asset], risk: RiskScore) -> Vec<AssetWeight> {
    let mut weights = Vec::new();
    let band = RiskBand::of(risk);

    match band {
        RiskBand::Conservative => {
            let bonds = take(assets.iter().filter(|a| a.is_bond()), CONSERVATIVE_BOND_COUNT);
            let stable = lowest_volatility(
                assets
                    .iter()
                    .filter(|a| !a.is_bond() && a.metrics.dividend_yield > CONSERVATIVE_MIN_YIELD)
                    .collect(),
                CONSERVATIVE_STOCK_COUNT,
            );
            push_bucket(&mut weights, &bonds, CONSERVATIVE_BOND_SHARE);
            push_bucket(&mut weights, &stable, CONSERVATIVE_STOCK_SHARE);
        }
        RiskBand::Aggressive => {
            let growth = top_momentum(
                assets
                    .iter()
                    .filter(|a| !a.is_bond() && a.metrics.momentum_12m > AGGRESSIVE_MIN_MOMENTUM)
                    .collect(),
                AGGRESSIVE_GROWTH_COUNT,
            );
            let tech = take(
                assets.iter().filter(|a| a.sector == Sector::Technology),
                AGGRESSIVE_TECH_COUNT,
            );
            let bonds = take(assets.iter().filter(|a| a.is_bond()), AGGRESSIVE_BOND_COUNT);
            push_bucket(&mut weights, &growth, AGGRESSIVE_GROWTH_SHARE);
            push_bucket(&mut weights, &tech, AGGRESSIVE_TECH_SHARE);
            push_bucket(&mut weights, &bonds, AGGRESSIVE_BOND_SHARE);
        }
        RiskBand::Balanced => {
            let stocks = take(
                assets.iter().filter(|a| {
                    !a.is_bond()
                        && a.metrics.momentum_12m > BALANCED_MIN_MOMENTUM
                        && a.metrics.volatility < BALANCED_MAX_VOLATILITY
                }),
                BALANCED_STOCK_COUNT,
            );
            let bonds = take(assets.iter().filter(|a| a.is_bond()), BALANCED_BOND_COUNT);
            let etfs = take(
                assets.iter().filter(|a| a.sector == Sector::Etf),
                BALANCED_ETF_COUNT,
            );
            push_bucket(&mut weights, &stocks, BALANCED_STOCK_SHARE);
            push_bucket(&mut weights, &bonds, BALANCED_BOND_SHARE);
            push_bucket(&mut weights, &etfs, BALANCED_ETF_SHARE);
        }
    }

    normalize_weights(&mut weights);
    debug!(
        "optimize_mix: {} band, {} candidates -> {} positions",
        band.as_str(),
        assets.len(),
        weights.len()
    );
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{AssetMetrics, AssetUniverse};
    use proptest::prelude::*;

    fn score(s: u8) -> RiskScore {
        RiskScore::new(s as i64).unwrap()
    }

    fn stock(ticker: &str, sector: Sector, vol: f64, yield_: f64, momentum: f64) -> Asset {
        Asset::new(
            ticker,
            ticker,
            sector,
            50.0,
            AssetMetrics {
                momentum_12m: momentum,
                earnings_growth: 0.05,
                volatility: vol,
                beta: 0.7,
                dividend_yield: yield_,
            },
        )
    }

    fn weight_of(weights: &[AssetWeight], ticker: &str) -> Option<f64> {
        weights.iter().find(|w| w.asset.ticker == ticker).map(|w| w.weight)
    }

    #[test]
    fn test_conservative_three_bonds_four_stocks() {
        let assets = vec![
            stock("B1", Sector::Bonds, 0.05, 0.04, 0.02),
            stock("B2", Sector::Bonds, 0.06, 0.04, 0.02),
            stock("B3", Sector::Bonds, 0.12, 0.03, 0.01),
            stock("S1", Sector::Consumer, 0.15, 0.03, 0.10),
            stock("S2", Sector::Utilities, 0.14, 0.035, 0.10),
            stock("S3", Sector::Consumer, 0.18, 0.025, 0.10),
            stock("S4", Sector::Healthcare, 0.16, 0.03, 0.10),
            stock("S5", Sector::Consumer, 0.22, 0.03, 0.10),
        ];
        let weights = optimize_mix(&assets, score(20));

        assert_eq!(weights.len(), 7);
        for b in ["B1", "B2", "B3"] {
            let w = weight_of(&weights, b).unwrap();
            assert!((w - 0.20).abs() < 1e-12, "{} weight {}", b, w);
        }
        for s in ["S1", "S2", "S3", "S4"] {
            let w = weight_of(&weights, s).unwrap();
            assert!((w - 0.10).abs() < 1e-12, "{} weight {}", s, w);
        }
        // Highest-volatility stock is the one left out.
        assert!(weight_of(&weights, "S5").is_none());
        let total: f64 = weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_underfilled_bucket_is_renormalized() {
        let assets = vec![stock("ONLY", Sector::Consumer, 0.10, 0.03, 0.05)];
        let weights = optimize_mix(&assets, score(10));
        assert_eq!(weights.len(), 1);
        assert!((weights[0].weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggressive_merges_overlapping_picks() {
        let u = AssetUniverse::standard();
        let weights = optimize_mix(u.assets(), score(90));
        let mut seen = std::collections::HashSet::new();
        assert!(weights.iter().all(|w| seen.insert(w.asset.ticker.clone())));
        // NVDA is both a top-momentum and a first-listed tech pick.
        let nvda = weight_of(&weights, "NVDA").unwrap();
        assert!((nvda - (0.70 / 6.0 + 0.10)).abs() < 1e-12);
        assert!((weight_of(&weights, "BND").unwrap() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_mix_on_standard_universe() {
        let u = AssetUniverse::standard();
        let weights = optimize_mix(u.assets(), score(50));
        assert!((weight_of(&weights, "BND").unwrap() - 0.125).abs() < 1e-12);
        assert!((weight_of(&weights, "TLT").unwrap() - 0.125).abs() < 1e-12);
        assert!((weight_of(&weights, "SPY").unwrap() - 0.075).abs() < 1e-12);
    }

    #[test]
    fn test_no_candidates_yields_empty_mix() {
        assert!(optimize_mix(&[], score(50)).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let u = AssetUniverse::standard();
        assert_eq!(optimize_mix(u.assets(), score(42)), optimize_mix(u.assets(), score(42)));
    }

    proptest! {
        #[test]
        fn prop_weights_sum_to_one(risk in 0u8..=100, skip in 0usize..20) {
            let u = AssetUniverse::standard();
            let subset: Vec<Asset> = u.assets().iter().skip(skip).cloned().collect();
            let weights = optimize_mix(&subset, score(risk));
            if !weights.is_empty() {
                let total: f64 = weights.iter().map(|w| w.weight).sum();
                prop_assert!((total - 1.0).abs() < 1e-9, "total {}", total);
                prop_assert!(weights.iter().all(|w| (0.0..=1.0).contains(&w.weight)));
            }
        }
    }
}
