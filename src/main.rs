use clap::Parser;
use rand::Rng;
use std::sync::Arc;
use strategy_sim::builder::build_custom_portfolio;
use strategy_sim::config::{
    self, DEFAULT_HORIZON_YEARS, DEFAULT_INITIAL_INVESTMENT, QuoteProviderMode, SimulationConfig,
};
use strategy_sim::constraints::{Allocation, BuilderState, Goal};
use strategy_sim::quotes::{QuoteProvider, refresh_prices};
use strategy_sim::regime::{FixedRegimeDetector, MarketRegime, RegimeDetector, WeightedRegimeDetector};
use strategy_sim::report;
use strategy_sim::simulation::{rng_from_seed, run_monte_carlo, simulate_baseline};
use strategy_sim::stats::risk_metrics;
use strategy_sim::strategy::{RiskScore, StrategyAssembler, UserIntent, standard_60_40};
use strategy_sim::universe::AssetUniverse;
use strategy_sim::webui;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "strategy-sim: portfolio strategy synthesis and Monte Carlo projection",
    after_help = "EXAMPLES:
    # Growth strategy at risk 80, projected over 10 years
    cargo run --release -- --intent growth --risk 80

    # Reproducible income strategy in a bear market, with the 60/40 comparator
    cargo run --release -- --intent income --risk 25 --regime bear --seed 42 --baseline

    # Custom builder allocation
    cargo run --release -- --builder --goal preserve --risk 20 --stocks 70 --crypto 10 --bonds 20

    # Launch WebUI
    cargo run --release -- --webui"
)]
struct Args {
    /// Investment intent (growth|income|stability)
    #[arg(long, default_value = "growth")]
    intent: UserIntent,

    /// Risk score from 0 (cautious) to 100 (aggressive)
    #[arg(long, default_value_t = 50)]
    risk: i64,

    /// Projection horizon in years
    #[arg(long, default_value_t = DEFAULT_HORIZON_YEARS)]
    years: u32,

    /// Starting portfolio value
    #[arg(long, default_value_t = DEFAULT_INITIAL_INVESTMENT)]
    initial: f64,

    /// Number of Monte Carlo paths (default: 500, or STRATSIM_ITERATIONS)
    #[arg(long)]
    iterations: Option<usize>,

    /// Time steps per simulated year (default: 252)
    #[arg(long)]
    steps_per_year: Option<usize>,

    /// RNG seed for reproducible runs (default: STRATSIM_SEED, else random)
    #[arg(long)]
    seed: Option<u64>,

    /// Force the market regime (bull|bear|sideways) instead of sampling it
    #[arg(long)]
    regime: Option<MarketRegime>,

    /// Also print the standard 60/40 portfolio for comparison
    #[arg(long)]
    baseline: bool,

    /// Build a custom portfolio from --goal / --stocks / --crypto / --bonds
    #[arg(long)]
    builder: bool,

    /// Builder goal (grow|balance|preserve)
    #[arg(long, default_value = "balance")]
    goal: Goal,

    /// Builder stock percentage
    #[arg(long, default_value_t = 60)]
    stocks: u32,

    /// Builder crypto percentage
    #[arg(long, default_value_t = 0)]
    crypto: u32,

    /// Builder bond percentage
    #[arg(long, default_value_t = 40)]
    bonds: u32,

    /// Builder factor tags, comma-separated (e.g., Momentum,Dividends)
    #[arg(long)]
    factors: Option<String>,

    /// Fetch live prices and detect the regime from the index ETF
    #[arg(long)]
    live_quotes: bool,

    /// Launch in WebUI mode
    #[arg(long)]
    webui: bool,

    /// WebUI server port
    #[arg(long, default_value_t = 8080)]
    webui_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    config::init_cpu_parallelism();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strategy_sim=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let args = Args::parse();

    let mut sim = SimulationConfig::from_env();
    if let Some(n) = args.iterations {
        sim.iterations = n;
    }
    if let Some(n) = args.steps_per_year {
        sim.steps_per_year = n;
    }
    if args.seed.is_some() {
        sim.seed = args.seed;
    }
    sim.validate()?;

    let mode = if args.live_quotes {
        QuoteProviderMode::Live
    } else {
        config::configured_quote_provider_mode()
    };

    let mut universe = Arc::new(AssetUniverse::standard());
    for issue in universe.validation_issues() {
        warn!("Asset universe: {}", issue);
    }
    let provider = QuoteProvider::from_mode(mode, universe.clone());
    if mode == QuoteProviderMode::Live {
        universe = Arc::new(refresh_prices(&universe, &provider).await);
    }

    if args.webui {
        match webui::run_webui_server(args.webui_port, universe, provider, sim).await {
            Ok(_) => info!("WebUI exited."),
            Err(e) => error!("WebUI failed: {}", e),
        }
        return Ok(());
    }

    let risk = RiskScore::new(args.risk)?;
    let mut rng = rng_from_seed(sim.seed);

    if args.builder {
        let factors: Vec<String> = args
            .factors
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let state = BuilderState {
            goal: args.goal,
            risk,
            factors,
            allocation: Allocation {
                stocks: args.stocks,
                crypto: args.crypto,
                bonds: args.bonds,
            },
        };
        let portfolio = build_custom_portfolio(&universe, &state);
        report::print_custom_portfolio(&portfolio);

        let projection = run_monte_carlo(&portfolio.stats, args.initial, args.years, &sim, &mut rng)?;
        let baseline = simulate_baseline(args.initial, args.years, sim.steps_per_year, &mut rng)?;
        report::print_projection(&projection, Some(&baseline));
        return Ok(());
    }

    let detector: Box<dyn RegimeDetector> = match args.regime {
        Some(regime) => Box::new(FixedRegimeDetector(regime)),
        None if mode == QuoteProviderMode::Live => match provider.index_regime_detector().await {
            Ok(detector) => Box::new(detector),
            Err(e) => {
                warn!("Index quote unavailable ({}); sampling the regime instead", e);
                Box::new(WeightedRegimeDetector::new(rng_from_seed(Some(rng.r#gen()))))
            }
        },
        None => Box::new(WeightedRegimeDetector::new(rng_from_seed(Some(rng.r#gen())))),
    };
    let name_rng = rng_from_seed(Some(rng.r#gen()));

    let mut assembler = StrategyAssembler::new(universe.clone(), detector, name_rng);
    let dna = assembler.generate_strategy(args.intent, risk);
    report::print_strategy(&dna, &risk_metrics(&dna.stats, dna.intent));

    if args.baseline {
        let comparator = standard_60_40(&universe)?;
        report::print_strategy(&comparator, &risk_metrics(&comparator.stats, comparator.intent));
    }

    let projection = run_monte_carlo(&dna.stats, args.initial, args.years, &sim, &mut rng)?;
    let baseline = simulate_baseline(args.initial, args.years, sim.steps_per_year, &mut rng)?;
    report::print_projection(&projection, Some(&baseline));

    Ok(())
}
