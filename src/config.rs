use crate::error::{Result, StrategyError};
use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads for Monte Carlo paths",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

// ── Simulation Defaults ─────────────────────────────────────────────────────
/// Monte Carlo paths per projection.
pub const DEFAULT_ITERATIONS: usize = 500;
/// Trading days per year; one GBM step per day.
pub const DEFAULT_STEPS_PER_YEAR: usize = 252;
pub const DEFAULT_INITIAL_INVESTMENT: f64 = 10_000.0;
pub const DEFAULT_HORIZON_YEARS: u32 = 10;
/// Upper bounds on a single projection; every path is kept in memory.
pub const MAX_ITERATIONS: usize = 100_000;
pub const MAX_STEPS_PER_YEAR: usize = 100_000;
pub const MAX_HORIZON_YEARS: u32 = 100;
/// Paths used for the 60/40 baseline median.
pub const BASELINE_PATHS: usize = 100;
pub const BASELINE_RETURN: f64 = 0.07;
pub const BASELINE_VOLATILITY: f64 = 0.10;

// ── Strategy Defaults ───────────────────────────────────────────────────────
/// Scores strictly below this are conservative.
pub const LOW_RISK_THRESHOLD: u8 = 30;
/// Scores strictly above this are aggressive.
pub const HIGH_RISK_THRESHOLD: u8 = 70;
/// Bull / Bear / Sideways draw weights for the randomized regime detector.
pub const DEFAULT_REGIME_WEIGHTS: [f64; 3] = [0.6, 0.2, 0.2];
/// Index move (in percent) that flips the quote-driven regime to Bull or Bear.
pub const REGIME_TREND_THRESHOLD_PCT: f64 = 0.5;
pub const RISK_FREE_RATE: f64 = 0.03;

// ── Market Data ─────────────────────────────────────────────────────────────
pub const QUOTE_CACHE_TTL_SECS: u64 = 300;
pub const REGIME_INDEX_SYMBOL: &str = "SPY";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuoteProviderMode {
    Live,
    Fixture,
}

impl QuoteProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fixture => "fixture",
        }
    }
}

pub fn configured_quote_provider_mode() -> QuoteProviderMode {
    let provider = std::env::var("STRATSIM_QUOTE_PROVIDER")
        .unwrap_or_else(|_| "fixture".to_string())
        .trim()
        .to_ascii_lowercase();

    match provider.as_str() {
        "live" | "yahoo" | "yfinance" => QuoteProviderMode::Live,
        "fixture" | "mock" => QuoteProviderMode::Fixture,
        other => {
            warn!(
                "Unknown STRATSIM_QUOTE_PROVIDER={} ; defaulting to fixture. Allowed values: live | fixture",
                other
            );
            QuoteProviderMode::Fixture
        }
    }
}

/// Knobs of a Monte Carlo run. `seed = None` draws from OS entropy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationConfig {
    pub iterations: usize,
    pub steps_per_year: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            steps_per_year: DEFAULT_STEPS_PER_YEAR,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Defaults overlaid with `STRATSIM_ITERATIONS` / `STRATSIM_SEED`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(raw) = std::env::var("STRATSIM_ITERATIONS") {
            match raw.trim().parse::<usize>() {
                Ok(v) if v > 0 => cfg.iterations = v,
                _ => warn!("Ignoring invalid STRATSIM_ITERATIONS={}", raw),
            }
        }
        if let Ok(raw) = std::env::var("STRATSIM_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(v) => cfg.seed = Some(v),
                Err(_) => warn!("Ignoring invalid STRATSIM_SEED={}", raw),
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(StrategyError::InvalidIterations(as_i64(self.iterations)));
        }
        if self.steps_per_year == 0 || self.steps_per_year > MAX_STEPS_PER_YEAR {
            return Err(StrategyError::InvalidStepsPerYear(as_i64(self.steps_per_year)));
        }
        Ok(())
    }
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
