use crate::config::RISK_FREE_RATE;
use crate::optimizer::AssetWeight;
use crate::strategy::UserIntent;
use crate::universe::AssetUniverse;
use serde::{Deserialize, Serialize};

/// Drawdown proxy never exceeds this.
pub const MAX_DRAWDOWN_CAP: f64 = 0.95;
/// Volatility multiple used for the drawdown proxy.
pub const DRAWDOWN_VOLATILITY_MULTIPLE: f64 = 2.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStats {
    pub mean_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
}

/// Weighted momentum as expected return, full covariance volatility and a
/// capped drawdown proxy. Correlations come from `universe`, looked up per
/// ticker pair. An empty slice yields zeros.
pub fn calculate_portfolio_stats(weights: &[AssetWeight], universe: &AssetUniverse) -> PortfolioStats {
    if weights.is_empty() {
        return PortfolioStats::default();
    }

    let mut mean_return = 0.0;
    let mut drawdown = 0.0;
    for w in weights {
        mean_return += w.weight * w.asset.metrics.momentum_12m;
        drawdown += w.weight * w.asset.metrics.volatility * DRAWDOWN_VOLATILITY_MULTIPLE;
    }

    let mut variance = 0.0;
    for wi in weights {
        for wj in weights {
            let corr = if wi.asset.ticker == wj.asset.ticker {
                1.0
            } else {
                universe.correlation(&wi.asset.ticker, &wj.asset.ticker)
            };
            variance += wi.weight
                * wj.weight
                * wi.asset.metrics.volatility
                * wj.asset.metrics.volatility
                * corr;
        }
    }

    PortfolioStats {
        mean_return,
        // Rounding can leave a tiny negative radicand.
        volatility: variance.max(0.0).sqrt(),
        max_drawdown: drawdown.min(MAX_DRAWDOWN_CAP),
    }
}

/// Weighted dividend yield.
pub fn portfolio_yield(weights: &[AssetWeight]) -> f64 {
    weights
        .iter()
        .map(|w| w.weight * w.asset.metrics.dividend_yield)
        .sum()
}

pub fn sharpe_ratio(stats: &PortfolioStats, risk_free: f64) -> f64 {
    if stats.volatility > 0.0 {
        (stats.mean_return - risk_free) / stats.volatility
    } else {
        0.0
    }
}

/// Rough chance of a meaningful drawdown, two decimals, capped at 0.95.
pub fn drawdown_probability(stats: &PortfolioStats) -> f64 {
    let p = ((stats.volatility + stats.max_drawdown) / 2.0).min(MAX_DRAWDOWN_CAP);
    (p * 100.0).round() / 100.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub typical_year: f64,
    /// Mean minus two standard deviations.
    pub bad_year: f64,
    pub vibe: String,
    pub sharpe_ratio: f64,
    pub drawdown_probability: f64,
}

pub fn risk_vibe(stats: &PortfolioStats, intent: UserIntent) -> &'static str {
    if stats.volatility < 0.15 {
        "Defensive Shield"
    } else if stats.volatility > 0.30 {
        "Rocket Fuel"
    } else {
        match intent {
            UserIntent::Growth => "Growth Engine",
            UserIntent::Income => "Income Generator",
            UserIntent::Stability => "Balanced",
        }
    }
}

pub fn risk_metrics(stats: &PortfolioStats, intent: UserIntent) -> RiskMetrics {
    RiskMetrics {
        typical_year: stats.mean_return,
        bad_year: stats.mean_return - 2.0 * stats.volatility,
        vibe: risk_vibe(stats, intent).to_string(),
        sharpe_ratio: sharpe_ratio(stats, RISK_FREE_RATE),
        drawdown_probability: drawdown_probability(stats),
    }
}
