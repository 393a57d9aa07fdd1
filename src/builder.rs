use crate::constraints::{ConstraintResult, Goal, BuilderState, apply_constraints, constraint_summary};
use crate::optimizer::{AssetWeight, normalize_weights};
use crate::stats::{PortfolioStats, RiskMetrics, calculate_portfolio_stats, portfolio_yield, risk_metrics};
use crate::strategy::UserIntent;
use crate::universe::{Asset, AssetCategory, AssetUniverse, Sector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MAX_STOCK_POSITIONS: usize = 8;
pub const MAX_CRYPTO_POSITIONS: usize = 2;
pub const MAX_BOND_POSITIONS: usize = 3;
/// Hand-picked baskets are assumed to diversify better than the raw
/// covariance suggests.
pub const DIVERSIFICATION_FACTOR: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorTag {
    Momentum,
    Tech,
    Dividends,
    Growth,
    Value,
}

impl FactorTag {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "momentum" => Some(Self::Momentum),
            "tech" => Some(Self::Tech),
            "dividends" => Some(Self::Dividends),
            "growth" => Some(Self::Growth),
            "value" => Some(Self::Value),
            _ => None,
        }
    }

    fn keeps(self, asset: &Asset) -> bool {
        let m = &asset.metrics;
        match self {
            Self::Momentum => m.momentum_12m > 0.30,
            Self::Tech => asset.sector == Sector::Technology || asset.ticker == "QQQ",
            Self::Dividends => m.dividend_yield > 0.025,
            Self::Growth => m.momentum_12m > 0.15 || m.earnings_growth > 0.10,
            Self::Value => m.volatility < 0.25 && m.dividend_yield > 0.02,
        }
    }
}

/// Goal as the closest strategy intent, for vibe labels.
pub fn goal_intent(goal: Goal) -> UserIntent {
    match goal {
        Goal::Grow => UserIntent::Growth,
        Goal::Balance => UserIntent::Stability,
        Goal::Preserve => UserIntent::Income,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPortfolio {
    pub constraints: ConstraintResult,
    pub summary: Vec<String>,
    pub assets: Vec<AssetWeight>,
    pub stats: PortfolioStats,
    pub risk_metrics: RiskMetrics,
    pub dividend_yield: f64,
    pub description: String,
    pub failure_mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

fn filter_by_factors(universe: &AssetUniverse, factors: &[String]) -> (Vec<Asset>, Option<String>) {
    let mut assets: Vec<Asset> = universe.assets().to_vec();
    for raw in factors {
        match FactorTag::parse(raw) {
            Some(tag) => assets.retain(|a| tag.keeps(a)),
            None => debug!("Ignoring unknown factor tag '{}'", raw),
        }
    }

    if assets.is_empty() {
        let note = format!(
            "No assets matched factors [{}]; using the full universe.",
            factors.join(", ")
        );
        info!("{}", note);
        return (universe.assets().to_vec(), Some(note));
    }
    (assets, None)
}

fn has_tag(factors: &[String], tag: FactorTag) -> bool {
    factors.iter().any(|f| FactorTag::parse(f) == Some(tag))
}

fn spread(weights: &mut Vec<AssetWeight>, picks: &[Asset], percent: u32) {
    if picks.is_empty() || percent == 0 {
        return;
    }
    let each = percent as f64 / 100.0 / picks.len() as f64;
    for asset in picks {
        match weights.iter_mut().find(|w| w.asset.ticker == asset.ticker) {
            Some(existing) => existing.weight += each,
            None => weights.push(AssetWeight {
                asset: asset.clone(),
                weight: each,
            }),
        }
    }
}

fn select_assets(universe: &AssetUniverse, state: &BuilderState, pool: &[Asset]) -> Vec<AssetWeight> {
    let alloc = state.allocation;
    let mut weights = Vec::new();

    let mut stocks: Vec<Asset> = pool.iter().filter(|a| !a.is_bond()).cloned().collect();
    if has_tag(&state.factors, FactorTag::Dividends) && !has_tag(&state.factors, FactorTag::Momentum) {
        stocks.sort_by(|a, b| b.metrics.dividend_yield.total_cmp(&a.metrics.dividend_yield));
    } else {
        stocks.sort_by(|a, b| b.metrics.momentum_12m.total_cmp(&a.metrics.momentum_12m));
    }
    stocks.truncate(MAX_STOCK_POSITIONS);
    spread(&mut weights, &stocks, alloc.stocks);

    let mut crypto: Vec<Asset> = pool
        .iter()
        .filter(|a| a.category == AssetCategory::CryptoProxy)
        .take(MAX_CRYPTO_POSITIONS)
        .cloned()
        .collect();
    if crypto.is_empty() {
        crypto = pool
            .iter()
            .filter(|a| a.sector == Sector::Technology)
            .take(MAX_CRYPTO_POSITIONS)
            .cloned()
            .collect();
    }
    spread(&mut weights, &crypto, alloc.crypto);

    let mut bonds: Vec<Asset> = pool
        .iter()
        .filter(|a| a.is_bond())
        .take(MAX_BOND_POSITIONS)
        .cloned()
        .collect();
    if bonds.is_empty() {
        bonds = universe
            .assets()
            .iter()
            .filter(|a| a.is_bond())
            .take(MAX_BOND_POSITIONS)
            .cloned()
            .collect();
    }
    spread(&mut weights, &bonds, alloc.bonds);

    normalize_weights(&mut weights);
    weights
}

/// "Balanced Growth Strategy focused on Tech with 60% Stocks, 10% Crypto, 30% Bonds allocation."
pub fn describe(state: &BuilderState) -> String {
    let mut text = match state.goal {
        Goal::Grow => "Aggressive Growth Strategy",
        Goal::Balance => "Balanced Growth Strategy",
        Goal::Preserve => "Conservative Preservation Strategy",
    }
    .to_string();

    if !state.factors.is_empty() {
        text.push_str(" focused on ");
        text.push_str(&state.factors.join(", "));
    }

    let a = state.allocation;
    let parts: Vec<String> = [(a.stocks, "Stocks"), (a.crypto, "Crypto"), (a.bonds, "Bonds")]
        .iter()
        .filter(|(p, _)| *p > 0)
        .map(|(p, label)| format!("{}% {}", p, label))
        .collect();
    if !parts.is_empty() {
        text.push_str(&format!(" with {} allocation", parts.join(", ")));
    }

    text.push('.');
    text
}

pub fn failure_mode(state: &BuilderState) -> String {
    let a = state.allocation;
    let mut risks = Vec::new();

    if a.crypto > 15 {
        risks.push("high cryptocurrency volatility");
    }
    if has_tag(&state.factors, FactorTag::Tech) {
        risks.push("technology sector concentration");
    }
    if has_tag(&state.factors, FactorTag::Momentum) {
        risks.push("momentum reversals in bear markets");
    }
    if a.bonds < 20 {
        risks.push("lack of defensive assets during market stress");
    }
    if has_tag(&state.factors, FactorTag::Growth) && a.bonds < 30 {
        risks.push("growth stock underperformance during rising interest rates");
    }

    if risks.is_empty() {
        return "This balanced strategy has moderate risk across multiple scenarios.".to_string();
    }
    format!("This strategy may underperform due to {}.", risks.join(", "))
}

/// Constrains the requested split, fills each bucket from the factor-filtered
/// universe and scores the result.
pub fn build_custom_portfolio(universe: &AssetUniverse, state: &BuilderState) -> CustomPortfolio {
    let constraints = apply_constraints(state);
    let constrained = BuilderState {
        allocation: constraints.allocation,
        ..state.clone()
    };

    let (pool, note) = filter_by_factors(universe, &state.factors);
    let assets = select_assets(universe, &constrained, &pool);

    let raw = calculate_portfolio_stats(&assets, universe);
    let stats = PortfolioStats {
        volatility: raw.volatility * DIVERSIFICATION_FACTOR,
        ..raw
    };

    info!(
        "Custom {} portfolio: {} positions, return {:.2}%, vol {:.2}%",
        state.goal,
        assets.len(),
        stats.mean_return * 100.0,
        stats.volatility * 100.0
    );

    CustomPortfolio {
        summary: constraint_summary(state.goal, state.risk),
        risk_metrics: risk_metrics(&stats, goal_intent(state.goal)),
        dividend_yield: portfolio_yield(&assets),
        description: describe(&constrained),
        failure_mode: failure_mode(&constrained),
        notes: note.into_iter().collect(),
        constraints,
        assets,
        stats,
    }
}
