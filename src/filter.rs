use crate::regime::MarketRegime;
use crate::strategy::UserIntent;
use crate::universe::{Asset, AssetUniverse, Sector};
use tracing::{debug, info};

fn keep_for_regime(asset: &Asset, regime: MarketRegime) -> bool {
    let m = &asset.metrics;
    match regime {
        MarketRegime::Bear => {
            m.volatility < 0.30
                || matches!(asset.sector, Sector::Bonds | Sector::Etf | Sector::Utilities)
                || m.dividend_yield > 0.03
        }
        MarketRegime::Bull => m.momentum_12m > 0.20 || asset.sector == Sector::Technology,
        MarketRegime::Sideways => m.dividend_yield > 0.02 && m.volatility < 0.35,
    }
}

fn keep_for_intent(asset: &Asset, intent: UserIntent) -> bool {
    let m = &asset.metrics;
    match intent {
        UserIntent::Growth => {
            m.momentum_12m > 0.25 || asset.sector == Sector::Technology || m.earnings_growth > 0.15
        }
        UserIntent::Income => {
            m.dividend_yield > 0.02
                || matches!(asset.sector, Sector::Bonds | Sector::Utilities | Sector::RealEstate)
        }
        UserIntent::Stability => m.volatility < 0.30 && m.beta < 1.2,
    }
}

/// Keeps assets suited to the regime and orders them: Bear by ascending
/// volatility, Bull by descending momentum, Sideways by descending yield.
/// The sort is stable, so ties keep catalog order.
pub fn filter_by_regime(assets: &[Asset], regime: MarketRegime) -> Vec<Asset> {
    let mut kept: Vec<Asset> = assets
        .iter()
        .filter(|a| keep_for_regime(a, regime))
        .cloned()
        .collect();

    match regime {
        MarketRegime::Bear => {
            kept.sort_by(|a, b| a.metrics.volatility.total_cmp(&b.metrics.volatility))
        }
        MarketRegime::Bull => {
            kept.sort_by(|a, b| b.metrics.momentum_12m.total_cmp(&a.metrics.momentum_12m))
        }
        MarketRegime::Sideways => {
            kept.sort_by(|a, b| b.metrics.dividend_yield.total_cmp(&a.metrics.dividend_yield))
        }
    }

    debug!("{} regime filter kept {}/{} assets", regime, kept.len(), assets.len());
    kept
}

/// Narrows further by intent; preserves the incoming order.
pub fn filter_by_intent(assets: &[Asset], intent: UserIntent) -> Vec<Asset> {
    let kept: Vec<Asset> = assets
        .iter()
        .filter(|a| keep_for_intent(a, intent))
        .cloned()
        .collect();
    debug!("{} intent filter kept {}/{} assets", intent, kept.len(), assets.len());
    kept
}

/// Result of candidate selection. `note` is set when the filters came up
/// empty and the unfiltered universe was used instead.
#[derive(Clone, Debug)]
pub struct Candidates {
    pub assets: Vec<Asset>,
    pub note: Option<String>,
}

/// Regime filter first, then intent filter. Never returns an empty set
/// while the universe itself is non-empty.
pub fn select_candidates(
    universe: &AssetUniverse,
    regime: MarketRegime,
    intent: UserIntent,
) -> Candidates {
    let by_regime = filter_by_regime(universe.assets(), regime);
    let assets = filter_by_intent(&by_regime, intent);

    if assets.is_empty() {
        let note = format!(
            "No assets matched both the {} regime and {} intent filters; using the full universe.",
            regime, intent
        );
        info!("{}", note);
        return Candidates {
            assets: universe.assets().to_vec(),
            note: Some(note),
        };
    }

    Candidates { assets, note: None }
}
