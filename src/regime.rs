use crate::config::{DEFAULT_REGIME_WEIGHTS, REGIME_TREND_THRESHOLD_PCT};
use crate::quotes::Quote;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 3] = [Self::Bull, Self::Bear, Self::Sideways];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bull => "Bull",
            Self::Bear => "Bear",
            Self::Sideways => "Sideways",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bull" | "bullish" => Ok(Self::Bull),
            "bear" | "bearish" => Ok(Self::Bear),
            "sideways" | "neutral" => Ok(Self::Sideways),
            other => Err(format!("unknown market regime '{}'", other)),
        }
    }
}

/// Classifies current market conditions. Implementations may keep state
/// (an RNG, a cached quote) but must always return one of the three regimes.
pub trait RegimeDetector {
    fn detect_market_regime(&mut self) -> MarketRegime;
}

impl<T: RegimeDetector + ?Sized> RegimeDetector for Box<T> {
    fn detect_market_regime(&mut self) -> MarketRegime {
        (**self).detect_market_regime()
    }
}

/// Categorical draw over Bull / Bear / Sideways.
pub struct WeightedRegimeDetector<R: Rng> {
    rng: R,
    weights: [f64; 3],
}

impl<R: Rng> WeightedRegimeDetector<R> {
    pub fn new(rng: R) -> Self {
        Self::with_weights(rng, DEFAULT_REGIME_WEIGHTS)
    }

    /// Weights follow `MarketRegime::ALL` order. Negative, non-finite or
    /// all-zero weights fall back to the defaults.
    pub fn with_weights(rng: R, weights: [f64; 3]) -> Self {
        let usable = weights.iter().all(|w| w.is_finite() && *w >= 0.0)
            && WeightedIndex::new(weights).is_ok();
        let weights = if usable {
            weights
        } else {
            warn!(
                "Invalid regime weights {:?}; using defaults {:?}",
                weights, DEFAULT_REGIME_WEIGHTS
            );
            DEFAULT_REGIME_WEIGHTS
        };
        Self { rng, weights }
    }

    pub fn weights(&self) -> [f64; 3] {
        self.weights
    }
}

impl<R: Rng> RegimeDetector for WeightedRegimeDetector<R> {
    fn detect_market_regime(&mut self) -> MarketRegime {
        let regime = match WeightedIndex::new(self.weights) {
            Ok(dist) => MarketRegime::ALL[dist.sample(&mut self.rng)],
            Err(_) => MarketRegime::Sideways,
        };
        debug!("Sampled market regime: {}", regime);
        regime
    }
}

/// Always reports the same regime.
#[derive(Clone, Copy, Debug)]
pub struct FixedRegimeDetector(pub MarketRegime);

impl RegimeDetector for FixedRegimeDetector {
    fn detect_market_regime(&mut self) -> MarketRegime {
        self.0
    }
}

/// Index daily move above `+threshold_pct` is Bull, below `-threshold_pct`
/// is Bear, anything in between is Sideways.
pub fn regime_from_index_quote(quote: &Quote, threshold_pct: f64) -> MarketRegime {
    let threshold = threshold_pct.abs();
    if !quote.change_percent.is_finite() {
        return MarketRegime::Sideways;
    }
    if quote.change_percent > threshold {
        MarketRegime::Bull
    } else if quote.change_percent < -threshold {
        MarketRegime::Bear
    } else {
        MarketRegime::Sideways
    }
}

/// Indicator-driven detector over a pre-fetched index quote.
#[derive(Clone, Debug)]
pub struct QuoteRegimeDetector {
    quote: Quote,
    threshold_pct: f64,
}

impl QuoteRegimeDetector {
    pub fn new(quote: Quote) -> Self {
        Self {
            quote,
            threshold_pct: REGIME_TREND_THRESHOLD_PCT,
        }
    }

    pub fn with_threshold(mut self, threshold_pct: f64) -> Self {
        self.threshold_pct = threshold_pct;
        self
    }
}

impl RegimeDetector for QuoteRegimeDetector {
    fn detect_market_regime(&mut self) -> MarketRegime {
        let regime = regime_from_index_quote(&self.quote, self.threshold_pct);
        debug!(
            "{} moved {:.2}% -> {} regime",
            self.quote.symbol, self.quote.change_percent, regime
        );
        regime
    }
}
