use crate::error::{Result, StrategyError};
use crate::filter::select_candidates;
use crate::optimizer::{AssetWeight, RiskBand, optimize_mix};
use crate::regime::{MarketRegime, RegimeDetector};
use crate::stats::{PortfolioStats, calculate_portfolio_stats};
use crate::universe::{Asset, AssetCategory, AssetUniverse};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserIntent {
    Growth,
    Income,
    Stability,
}

impl UserIntent {
    pub const ALL: [UserIntent; 3] = [Self::Growth, Self::Income, Self::Stability];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Growth => "Growth",
            Self::Income => "Income",
            Self::Stability => "Stability",
        }
    }
}

impl fmt::Display for UserIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserIntent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "growth" => Ok(Self::Growth),
            "income" => Ok(Self::Income),
            "stability" => Ok(Self::Stability),
            other => Err(format!(
                "unknown intent '{}' (expected growth|income|stability)",
                other
            )),
        }
    }
}

/// Risk appetite on a 0..=100 scale. Only constructible through validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    pub const MAX: u8 = 100;

    pub fn new(score: i64) -> Result<Self> {
        if (0..=Self::MAX as i64).contains(&score) {
            Ok(Self(score as u8))
        } else {
            Err(StrategyError::InvalidRiskScore(score))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RiskScore {
    type Error = StrategyError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> u8 {
        score.0
    }
}

/// Whole-percent split by asset category; always sums to 100 for a
/// non-empty portfolio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAllocation {
    pub stocks: u32,
    pub bonds: u32,
    pub crypto: u32,
    pub etfs: u32,
}

impl CategoryAllocation {
    pub fn total(&self) -> u32 {
        self.stocks + self.bonds + self.crypto + self.etfs
    }

    /// Largest-remainder rounding of the per-category weight sums, so the
    /// integer parts add up to exactly 100.
    pub fn from_weights(weights: &[AssetWeight]) -> Self {
        let mut sums = [0.0f64; 4];
        for w in weights {
            let slot = match w.asset.category {
                AssetCategory::Stock => 0,
                AssetCategory::Bond => 1,
                AssetCategory::CryptoProxy => 2,
                AssetCategory::Etf => 3,
            };
            sums[slot] += w.weight;
        }

        let total: f64 = sums.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Self::default();
        }

        let exact: Vec<f64> = sums.iter().map(|s| s / total * 100.0).collect();
        let mut parts: Vec<u32> = exact.iter().map(|e| e.floor() as u32).collect();
        let short = 100u32.saturating_sub(parts.iter().sum());

        let mut order: Vec<usize> = (0..4).collect();
        order.sort_by(|&a, &b| {
            let ra = exact[a] - exact[a].floor();
            let rb = exact[b] - exact[b].floor();
            rb.total_cmp(&ra).then(a.cmp(&b))
        });
        for &i in order.iter().take(short as usize) {
            parts[i] += 1;
        }

        Self {
            stocks: parts[0],
            bonds: parts[1],
            crypto: parts[2],
            etfs: parts[3],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDna {
    pub id: String,
    pub name: String,
    pub intent: UserIntent,
    pub risk_score: RiskScore,
    pub market_regime: MarketRegime,
    pub assets: Vec<AssetWeight>,
    pub stats: PortfolioStats,
    pub narrative: String,
    pub allocation: CategoryAllocation,
    /// Informational fallbacks taken while building the strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

fn risk_level(risk: RiskScore) -> &'static str {
    RiskBand::of(risk).as_str()
}

fn regime_adjective(regime: MarketRegime) -> &'static str {
    match regime {
        MarketRegime::Bull => "Momentum",
        MarketRegime::Bear => "Defensive",
        MarketRegime::Sideways => "Adaptive",
    }
}

pub fn name_templates(intent: UserIntent, risk: RiskScore, regime: MarketRegime) -> [String; 3] {
    let level = risk_level(risk);
    let adj = regime_adjective(regime);
    match intent {
        UserIntent::Growth => [
            format!("{} Growth Engine", level),
            format!("{} Growth Strategy", adj),
            format!("Tech {} Portfolio", level),
        ],
        UserIntent::Income => [
            format!("{} Income Generator", level),
            format!("Dividend {} Strategy", adj),
            format!("Yield {} Portfolio", level),
        ],
        UserIntent::Stability => [
            format!("{} Stability Fund", level),
            format!("{} Balanced Strategy", adj),
            format!("Core {} Portfolio", level),
        ],
    }
}

pub fn generate_narrative(
    intent: UserIntent,
    risk: RiskScore,
    regime: MarketRegime,
    allocation: &CategoryAllocation,
) -> String {
    let regime_text = match regime {
        MarketRegime::Bull => "bullish momentum",
        MarketRegime::Bear => "defensive positioning",
        MarketRegime::Sideways => "market-neutral approach",
    };

    let mut parts = Vec::new();
    if allocation.stocks > 0 {
        parts.push(format!("{}% to growth stocks", allocation.stocks));
    }
    if allocation.bonds > 0 {
        parts.push(format!("{}% to bonds", allocation.bonds));
    }
    if allocation.crypto > 0 {
        parts.push(format!("{}% to cryptocurrency", allocation.crypto));
    }
    if allocation.etfs > 0 {
        parts.push(format!("{}% to diversified ETFs", allocation.etfs));
    }

    let focus = match intent {
        UserIntent::Growth => "Focuses on high-momentum assets with strong growth potential.",
        UserIntent::Income => "Emphasizes dividend-paying assets and yield generation.",
        UserIntent::Stability => "Prioritizes capital preservation with moderate growth.",
    };

    format!(
        "Optimized for {} market conditions using {} factors. This {} {} strategy allocates {}. {}",
        regime.as_str().to_lowercase(),
        regime_text,
        risk_level(risk).to_lowercase(),
        intent.as_str().to_lowercase(),
        parts.join(", "),
        focus
    )
}

/// Regime → filter → optimize → statistics → presentation.
pub struct StrategyAssembler<D: RegimeDetector, R: Rng> {
    universe: Arc<AssetUniverse>,
    detector: D,
    rng: R,
}

impl<D: RegimeDetector, R: Rng> StrategyAssembler<D, R> {
    /// `rng` only picks among name templates.
    pub fn new(universe: Arc<AssetUniverse>, detector: D, rng: R) -> Self {
        Self {
            universe,
            detector,
            rng,
        }
    }

    pub fn universe(&self) -> &AssetUniverse {
        &self.universe
    }

    pub fn generate_strategy(&mut self, intent: UserIntent, risk: RiskScore) -> StrategyDna {
        let regime = self.detector.detect_market_regime();
        let candidates = select_candidates(&self.universe, regime, intent);
        let mut notes: Vec<String> = candidates.note.into_iter().collect();

        let mut weights = optimize_mix(&candidates.assets, risk);
        if weights.is_empty() && !self.universe.is_empty() {
            let note = format!(
                "Filtered assets could not fill any {} allocation bucket; using the full universe.",
                risk_level(risk).to_lowercase()
            );
            info!("{}", note);
            notes.push(note);
            weights = optimize_mix(self.universe.assets(), risk);
        }
        if weights.is_empty() && !candidates.assets.is_empty() {
            let note = format!(
                "No asset fits a {} bucket; holding the {} candidates in equal weight.",
                risk_level(risk).to_lowercase(),
                candidates.assets.len()
            );
            info!("{}", note);
            notes.push(note);
            weights = equal_weights(&candidates.assets);
        }
        if weights.is_empty() {
            warn!("Asset universe produced no positions for risk {}", risk.get());
        }

        let stats = calculate_portfolio_stats(&weights, &self.universe);
        let allocation = CategoryAllocation::from_weights(&weights);
        let narrative = generate_narrative(intent, risk, regime, &allocation);
        let templates = name_templates(intent, risk, regime);
        let name = templates
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| templates[0].clone());

        let id = format!(
            "strategy_{}_{}_{}",
            intent.as_str().to_lowercase(),
            risk.get(),
            chrono::Utc::now().timestamp_millis()
        );

        info!(
            "Generated '{}' ({} / risk {} / {}): return {:.2}%, vol {:.2}%",
            name,
            intent,
            risk.get(),
            regime,
            stats.mean_return * 100.0,
            stats.volatility * 100.0
        );

        StrategyDna {
            id,
            name,
            intent,
            risk_score: risk,
            market_regime: regime,
            assets: weights,
            stats,
            narrative,
            allocation,
            notes,
        }
    }
}

fn equal_weights(assets: &[Asset]) -> Vec<AssetWeight> {
    let weight = 1.0 / assets.len() as f64;
    assets
        .iter()
        .map(|asset| AssetWeight {
            asset: asset.clone(),
            weight,
        })
        .collect()
}

pub const BASELINE_ID: &str = "standard_60_40";
pub const BASELINE_NAME: &str = "Standard 60/40 Portfolio";
pub const BASELINE_EQUITY: &str = "SPY";
pub const BASELINE_BOND: &str = "BND";
pub const BASELINE_RISK: i64 = 50;

/// Fixed 60% broad-market ETF / 40% bond ETF comparator.
pub fn standard_60_40(universe: &AssetUniverse) -> Result<StrategyDna> {
    let weights = vec![
        AssetWeight {
            asset: universe.require(BASELINE_EQUITY)?.clone(),
            weight: 0.6,
        },
        AssetWeight {
            asset: universe.require(BASELINE_BOND)?.clone(),
            weight: 0.4,
        },
    ];

    let stats = calculate_portfolio_stats(&weights, universe);
    let allocation = CategoryAllocation::from_weights(&weights);
    let risk = RiskScore::new(BASELINE_RISK)?;

    Ok(StrategyDna {
        id: BASELINE_ID.to_string(),
        name: BASELINE_NAME.to_string(),
        intent: UserIntent::Stability,
        risk_score: risk,
        market_regime: MarketRegime::Sideways,
        assets: weights,
        stats,
        narrative: "Traditional balanced portfolio with 60% stocks (SPY) and 40% bonds (BND). \
                    Provides moderate growth with lower volatility."
            .to_string(),
        allocation,
        notes: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{FixedRegimeDetector, WeightedRegimeDetector};
    use crate::universe::{Asset, AssetMetrics, Sector};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn assembler(regime: MarketRegime) -> StrategyAssembler<FixedRegimeDetector, StdRng> {
        StrategyAssembler::new(
            Arc::new(AssetUniverse::standard()),
            FixedRegimeDetector(regime),
            StdRng::seed_from_u64(5),
        )
    }

    fn score(s: i64) -> RiskScore {
        RiskScore::new(s).unwrap()
    }

    #[test]
    fn test_risk_score_bounds() {
        assert!(RiskScore::new(0).is_ok());
        assert!(RiskScore::new(100).is_ok());
        assert_eq!(RiskScore::new(101), Err(StrategyError::InvalidRiskScore(101)));
        assert_eq!(RiskScore::new(-1), Err(StrategyError::InvalidRiskScore(-1)));
        assert!(serde_json::from_str::<RiskScore>("150").is_err());
        assert_eq!(serde_json::from_str::<RiskScore>("42").unwrap().get(), 42);
    }

    #[test]
    fn test_strategy_stats_match_calculator() {
        let mut a = assembler(MarketRegime::Bull);
        let dna = a.generate_strategy(UserIntent::Growth, score(80));
        assert_eq!(dna.stats, calculate_portfolio_stats(&dna.assets, a.universe()));
        assert_eq!(dna.market_regime, MarketRegime::Bull);
        assert_eq!(dna.allocation.total(), 100);
        assert!(dna.id.starts_with("strategy_growth_80_"));
        assert!(name_templates(UserIntent::Growth, score(80), MarketRegime::Bull).contains(&dna.name));
    }

    #[test]
    fn test_narrative_wording() {
        let alloc = CategoryAllocation { stocks: 50, bonds: 25, crypto: 0, etfs: 25 };
        let text = generate_narrative(UserIntent::Income, score(20), MarketRegime::Bear, &alloc);
        assert_eq!(
            text,
            "Optimized for bear market conditions using defensive positioning factors. \
             This conservative income strategy allocates 50% to growth stocks, 25% to bonds, \
             25% to diversified ETFs. Emphasizes dividend-paying assets and yield generation."
        );
    }

    #[test]
    fn test_names_follow_band_and_regime() {
        let names = name_templates(UserIntent::Stability, score(75), MarketRegime::Sideways);
        assert_eq!(
            names,
            [
                "Aggressive Stability Fund".to_string(),
                "Adaptive Balanced Strategy".to_string(),
                "Core Aggressive Portfolio".to_string(),
            ]
        );
    }

    #[test]
    fn test_largest_remainder_rounding() {
        let u = AssetUniverse::standard();
        let third = 1.0 / 3.0;
        let weights: Vec<AssetWeight> = ["MSFT", "BND", "SPY"]
            .iter()
            .map(|t| AssetWeight { asset: u.get(t).cloned().unwrap(), weight: third })
            .collect();
        let alloc = CategoryAllocation::from_weights(&weights);
        assert_eq!(alloc.total(), 100);
        assert_eq!(alloc.crypto, 0);
        assert!([alloc.stocks, alloc.bonds, alloc.etfs].iter().all(|p| *p == 33 || *p == 34));
        assert_eq!(CategoryAllocation::from_weights(&[]), CategoryAllocation::default());
    }

    #[test]
    fn test_standard_sixty_forty() {
        let u = AssetUniverse::standard();
        let dna = standard_60_40(&u).unwrap();
        assert_eq!(dna.id, "standard_60_40");
        assert_eq!(dna.risk_score.get(), 50);
        assert_eq!(dna.allocation, CategoryAllocation { stocks: 0, bonds: 40, crypto: 0, etfs: 60 });
        assert!((dna.stats.volatility - 0.0951).abs() < 1e-3);

        let no_bonds = AssetUniverse::new(vec![u.get("SPY").cloned().unwrap()]);
        assert_eq!(
            standard_60_40(&no_bonds).map(|d| d.id),
            Err(StrategyError::UnknownTicker("BND".to_string()))
        );
    }

    #[test]
    fn test_fallback_to_universe_is_noted() {
        // Nothing here survives the Sideways yield filter.
        let hot = Asset::new(
            "HOT",
            "Hot Stock",
            Sector::Technology,
            10.0,
            AssetMetrics {
                momentum_12m: 0.9,
                earnings_growth: 0.5,
                volatility: 0.6,
                beta: 2.0,
                dividend_yield: 0.0,
            },
        );
        let mut a = StrategyAssembler::new(
            Arc::new(AssetUniverse::new(vec![hot])),
            FixedRegimeDetector(MarketRegime::Sideways),
            StdRng::seed_from_u64(1),
        );
        let dna = a.generate_strategy(UserIntent::Income, score(90));
        assert!(!dna.notes.is_empty());
        assert_eq!(dna.assets.len(), 1);
        assert_eq!(dna.allocation.crypto, 100);
    }

    #[test]
    fn test_unbucketable_universe_still_sums_to_100() {
        // A lone high-volatility tech name fills no balanced bucket.
        let hot = Asset::new(
            "HOT",
            "Hot Stock",
            Sector::Technology,
            10.0,
            AssetMetrics {
                momentum_12m: 0.9,
                earnings_growth: 0.5,
                volatility: 0.6,
                beta: 2.0,
                dividend_yield: 0.0,
            },
        );
        let mut a = StrategyAssembler::new(
            Arc::new(AssetUniverse::new(vec![hot])),
            FixedRegimeDetector(MarketRegime::Bull),
            StdRng::seed_from_u64(3),
        );
        let dna = a.generate_strategy(UserIntent::Growth, score(50));
        assert_eq!(dna.assets.len(), 1);
        assert!((dna.assets[0].weight - 1.0).abs() < 1e-12);
        assert_eq!(dna.allocation.total(), 100);
        assert!(dna.notes.iter().any(|n| n.contains("equal weight")));
        assert!(dna.stats.volatility > 0.0);
    }

    #[test]
    fn test_serialized_field_names() {
        let u = AssetUniverse::standard();
        let json = serde_json::to_value(standard_60_40(&u).unwrap()).unwrap();
        assert_eq!(json["riskScore"], 50);
        assert_eq!(json["marketRegime"], "Sideways");
        assert!(json["stats"]["meanReturn"].is_number());
        assert!(json["stats"]["maxDrawdown"].is_number());
        assert_eq!(json["allocation"]["etfs"], 60);
        assert!(json.get("notes").is_none());
    }

    fn any_intent() -> impl Strategy<Value = UserIntent> {
        prop_oneof![
            Just(UserIntent::Growth),
            Just(UserIntent::Income),
            Just(UserIntent::Stability)
        ]
    }

    proptest! {
        #[test]
        fn prop_generated_strategies_are_consistent(
            intent in any_intent(),
            risk in 0i64..=100,
            seed in any::<u64>(),
        ) {
            let universe = Arc::new(AssetUniverse::standard());
            let mut a = StrategyAssembler::new(
                universe.clone(),
                WeightedRegimeDetector::new(StdRng::seed_from_u64(seed)),
                StdRng::seed_from_u64(seed),
            );
            let dna = a.generate_strategy(intent, score(risk));
            prop_assert!(!dna.assets.is_empty());
            prop_assert_eq!(dna.allocation.total(), 100);
            let total: f64 = dna.assets.iter().map(|w| w.weight).sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            prop_assert_eq!(dna.stats, calculate_portfolio_stats(&dna.assets, &universe));
        }
    }
}
