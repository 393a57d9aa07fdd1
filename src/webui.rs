use crate::builder::{CustomPortfolio, build_custom_portfolio};
use crate::config::{
    DEFAULT_HORIZON_YEARS, DEFAULT_INITIAL_INVESTMENT, MAX_HORIZON_YEARS, MAX_ITERATIONS, SimulationConfig,
};
use crate::constraints::{Allocation, BuilderState, ConstraintResult, Goal};
use crate::error::StrategyError;
use crate::quotes::QuoteProvider;
use crate::regime::{FixedRegimeDetector, MarketRegime, RegimeDetector, WeightedRegimeDetector};
use crate::simulation::{MonteCarloResult, SimulationPath, rng_from_seed, run_monte_carlo, simulate_baseline};
use crate::stats::{RiskMetrics, risk_metrics};
use crate::strategy::{RiskScore, StrategyAssembler, StrategyDna, UserIntent, standard_60_40};
use crate::universe::{Asset, AssetUniverse};
use anyhow::Result;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
struct WebState {
    universe: Arc<AssetUniverse>,
    quotes: Arc<QuoteProvider>,
    config: SimulationConfig,
    last_strategy: Arc<Mutex<Option<StrategyDna>>>,
}

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Serialize)]
struct UniverseResponse {
    assets: Vec<Asset>,
    correlations: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrategyRequest {
    intent: String,
    #[serde(alias = "risk_score")]
    risk_score: i64,
    seed: Option<u64>,
    regime: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateRequest {
    #[serde(flatten)]
    strategy: StrategyRequest,
    #[serde(alias = "initial_investment")]
    initial_investment: Option<f64>,
    years: Option<i64>,
    iterations: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    strategy: StrategyDna,
    projection: MonteCarloResult,
    baseline: SimulationPath,
    risk_metrics: RiskMetrics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuilderRequest {
    goal: String,
    risk: i64,
    #[serde(default)]
    factors: Vec<String>,
    allocation: Allocation,
    #[serde(alias = "initial_investment")]
    initial_investment: Option<f64>,
    years: Option<i64>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct BuilderResponse {
    constraints: ConstraintResult,
    portfolio: CustomPortfolio,
    projection: MonteCarloResult,
}

#[derive(Debug, Deserialize)]
struct QuotesRequest {
    symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
struct QuotesResponse {
    prices: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
}

pub async fn run_webui_server(
    port: u16,
    universe: Arc<AssetUniverse>,
    quotes: QuoteProvider,
    config: SimulationConfig,
) -> Result<()> {
    let state = WebState {
        universe,
        quotes: Arc::new(quotes),
        config,
        last_strategy: Arc::new(Mutex::new(None)),
    };

    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("WebUI listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/universe", get(universe))
        .route("/api/strategy", post(strategy))
        .route("/api/strategy/last", get(last_strategy))
        .route("/api/strategy/baseline", get(baseline))
        .route("/api/simulate", post(simulate))
        .route("/api/builder", post(builder))
        .route("/api/quotes", post(quotes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn universe(State(state): State<WebState>) -> Json<UniverseResponse> {
    Json(UniverseResponse {
        assets: state.universe.assets().to_vec(),
        correlations: state.universe.correlation_matrix().to_vec(),
    })
}

async fn strategy(State(state): State<WebState>, Json(req): Json<StrategyRequest>) -> ApiResult<StrategyDna> {
    let seed = req.seed.or(state.config.seed);
    let dna = assemble(&state.universe, &req, seed)?;
    *state.last_strategy.lock().await = Some(dna.clone());
    Ok(Json(dna))
}

async fn last_strategy(State(state): State<WebState>) -> ApiResult<StrategyDna> {
    let last = state.last_strategy.lock().await.clone();
    last.map(Json)
        .ok_or_else(|| api_err(StatusCode::NOT_FOUND, "no strategy generated yet"))
}

async fn baseline(State(state): State<WebState>) -> ApiResult<StrategyDna> {
    standard_60_40(&state.universe).map(Json).map_err(strategy_err)
}

async fn simulate(State(state): State<WebState>, Json(req): Json<SimulateRequest>) -> ApiResult<SimulateResponse> {
    let initial = req.initial_investment.unwrap_or(DEFAULT_INITIAL_INVESTMENT);
    let years = horizon(req.years)?;
    let mut config = state.config;
    if let Some(n) = req.iterations {
        config.iterations = usize::try_from(n)
            .ok()
            .filter(|n| (1..=MAX_ITERATIONS).contains(n))
            .ok_or_else(|| strategy_err(StrategyError::InvalidIterations(n)))?;
    }
    config.seed = req.strategy.seed.or(config.seed);

    let dna = assemble(&state.universe, &req.strategy, config.seed)?;
    *state.last_strategy.lock().await = Some(dna.clone());

    let stats = dna.stats;
    let (projection, baseline) = tokio::task::spawn_blocking(move || {
        let mut rng = rng_from_seed(config.seed);
        let projection = run_monte_carlo(&stats, initial, years, &config, &mut rng)?;
        let baseline = simulate_baseline(initial, years, config.steps_per_year, &mut rng)?;
        Ok::<_, StrategyError>((projection, baseline))
    })
    .await
    .map_err(internal_err)?
    .map_err(strategy_err)?;

    let metrics = risk_metrics(&dna.stats, dna.intent);
    Ok(Json(SimulateResponse {
        strategy: dna,
        projection,
        baseline,
        risk_metrics: metrics,
    }))
}

async fn builder(State(state): State<WebState>, Json(req): Json<BuilderRequest>) -> ApiResult<BuilderResponse> {
    let goal: Goal = req
        .goal
        .parse()
        .map_err(|e: String| api_err(StatusCode::BAD_REQUEST, &e))?;
    let risk = RiskScore::new(req.risk).map_err(strategy_err)?;
    let initial = req.initial_investment.unwrap_or(DEFAULT_INITIAL_INVESTMENT);
    let years = horizon(req.years)?;
    let mut config = state.config;
    config.seed = req.seed.or(config.seed);

    let builder_state = BuilderState {
        goal,
        risk,
        factors: req.factors,
        allocation: req.allocation,
    };

    let universe = state.universe.clone();
    let (portfolio, projection) = tokio::task::spawn_blocking(move || {
        let portfolio = build_custom_portfolio(&universe, &builder_state);
        let mut rng = rng_from_seed(config.seed);
        let projection = run_monte_carlo(&portfolio.stats, initial, years, &config, &mut rng)?;
        Ok::<_, StrategyError>((portfolio, projection))
    })
    .await
    .map_err(internal_err)?
    .map_err(strategy_err)?;

    Ok(Json(BuilderResponse {
        constraints: portfolio.constraints.clone(),
        portfolio,
        projection,
    }))
}

async fn quotes(State(state): State<WebState>, Json(req): Json<QuotesRequest>) -> ApiResult<QuotesResponse> {
    let mut symbols: Vec<String> = req
        .symbols
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    symbols.sort();
    symbols.dedup();

    if symbols.is_empty() {
        return Err(api_err(StatusCode::BAD_REQUEST, "symbols cannot be empty"));
    }

    let (found, failed) = state.quotes.quotes(&symbols).await;
    let prices = found.into_iter().map(|q| (q.symbol, q.price)).collect();
    Ok(Json(QuotesResponse { prices, failed }))
}

fn assemble(
    universe: &Arc<AssetUniverse>,
    req: &StrategyRequest,
    seed: Option<u64>,
) -> std::result::Result<StrategyDna, (StatusCode, Json<ApiError>)> {
    let intent: UserIntent = req
        .intent
        .parse()
        .map_err(|e: String| api_err(StatusCode::BAD_REQUEST, &e))?;
    let risk = RiskScore::new(req.risk_score).map_err(strategy_err)?;

    let mut rng = rng_from_seed(seed);
    let detector: Box<dyn RegimeDetector + Send> = match req.regime.as_deref() {
        Some(raw) => {
            let regime: MarketRegime = raw
                .parse()
                .map_err(|e: String| api_err(StatusCode::BAD_REQUEST, &e))?;
            Box::new(FixedRegimeDetector(regime))
        }
        None => Box::new(WeightedRegimeDetector::new(rng_from_seed(Some(rng.r#gen())))),
    };

    let mut assembler = StrategyAssembler::new(universe.clone(), detector, rng);
    Ok(assembler.generate_strategy(intent, risk))
}

fn horizon(years: Option<i64>) -> std::result::Result<u32, (StatusCode, Json<ApiError>)> {
    match years {
        None => Ok(DEFAULT_HORIZON_YEARS),
        Some(y) => u32::try_from(y)
            .ok()
            .filter(|y| (1..=MAX_HORIZON_YEARS).contains(y))
            .ok_or_else(|| strategy_err(StrategyError::InvalidHorizon(y))),
    }
}

fn api_err(status: StatusCode, msg: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: msg.to_string(),
        }),
    )
}

fn strategy_err(err: StrategyError) -> (StatusCode, Json<ApiError>) {
    api_err(StatusCode::BAD_REQUEST, &err.to_string())
}

fn internal_err<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ApiError>) {
    error!("WebUI request failed: {}", err);
    api_err(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuoteProviderMode;

    fn state() -> WebState {
        let universe = Arc::new(AssetUniverse::standard());
        WebState {
            quotes: Arc::new(QuoteProvider::from_mode(QuoteProviderMode::Fixture, universe.clone())),
            universe,
            config: SimulationConfig {
                iterations: 40,
                steps_per_year: 12,
                seed: Some(11),
            },
            last_strategy: Arc::new(Mutex::new(None)),
        }
    }

    fn strategy_request(intent: &str, risk: i64) -> StrategyRequest {
        StrategyRequest {
            intent: intent.to_string(),
            risk_score: risk,
            seed: Some(5),
            regime: Some("bull".to_string()),
        }
    }

    #[tokio::test]
    async fn test_strategy_is_remembered() {
        let s = state();
        assert!(last_strategy(State(s.clone())).await.is_err());

        let Json(dna) = strategy(State(s.clone()), Json(strategy_request("growth", 80)))
            .await
            .unwrap();
        assert_eq!(dna.market_regime, MarketRegime::Bull);
        assert!(!dna.assets.is_empty());

        let Json(last) = last_strategy(State(s)).await.unwrap();
        assert_eq!(last.id, dna.id);
    }

    #[tokio::test]
    async fn test_bad_inputs_are_400() {
        let s = state();
        let (status, Json(body)) = strategy(State(s.clone()), Json(strategy_request("growth", 101)))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("101"));

        let (status, _) = strategy(State(s.clone()), Json(strategy_request("yolo", 50)))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = SimulateRequest {
            strategy: strategy_request("income", 20),
            initial_investment: None,
            years: Some(0),
            iterations: None,
        };
        let (status, _) = simulate(State(s), Json(req)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_simulation_is_400() {
        let s = state();
        let req = SimulateRequest {
            strategy: strategy_request("growth", 60),
            initial_investment: None,
            years: Some(5),
            iterations: Some(100_000_000),
        };
        let (status, Json(body)) = simulate(State(s.clone()), Json(req)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("100000000"));

        let req = BuilderRequest {
            goal: "Grow".to_string(),
            risk: 60,
            factors: vec![],
            allocation: Allocation {
                stocks: 70,
                crypto: 10,
                bonds: 20,
            },
            initial_investment: None,
            years: Some(i64::from(MAX_HORIZON_YEARS) + 1),
            seed: None,
        };
        let (status, _) = builder(State(s), Json(req)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_simulate_returns_bands() {
        let req = SimulateRequest {
            strategy: strategy_request("stability", 40),
            initial_investment: Some(5_000.0),
            years: Some(3),
            iterations: Some(25),
        };
        let Json(resp) = simulate(State(state()), Json(req)).await.unwrap();
        assert_eq!(resp.projection.paths.len(), 25);
        assert_eq!(resp.projection.percentiles.p50.len(), 4);
        assert_eq!(resp.baseline.len(), 4);
        assert_eq!(resp.projection.percentiles.p10[0].value, 5_000.0);
        assert!(resp.projection.final_values.p10 <= resp.projection.final_values.p90);
    }

    #[tokio::test]
    async fn test_builder_applies_constraints() {
        let req = BuilderRequest {
            goal: "Preserve".to_string(),
            risk: 20,
            factors: vec![],
            allocation: Allocation {
                stocks: 80,
                crypto: 10,
                bonds: 10,
            },
            initial_investment: None,
            years: Some(2),
            seed: None,
        };
        let Json(resp) = builder(State(state()), Json(req)).await.unwrap();
        assert_eq!(resp.constraints.allocation.total(), 100);
        assert!(!resp.constraints.adjustments.is_empty());
        assert_eq!(resp.projection.percentiles.p50.len(), 3);
    }

    #[tokio::test]
    async fn test_quotes_dedup_and_validate() {
        let s = state();
        let req = QuotesRequest {
            symbols: vec![" spy".to_string(), "SPY".to_string(), "bnd ".to_string()],
        };
        let Json(resp) = quotes(State(s.clone()), Json(req)).await.unwrap();
        assert_eq!(resp.prices.len(), 2);
        assert!(resp.prices.contains_key("SPY"));
        assert!(resp.failed.is_empty());

        let empty = QuotesRequest {
            symbols: vec!["  ".to_string()],
        };
        let (status, Json(body)) = quotes(State(s), Json(empty)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "symbols cannot be empty");
    }

    #[tokio::test]
    async fn test_baseline_and_universe() {
        let s = state();
        let Json(dna) = baseline(State(s.clone())).await.unwrap();
        assert_eq!(dna.assets.len(), 2);
        let Json(u) = universe(State(s)).await;
        assert_eq!(u.correlations.len(), u.assets.len());
    }
}
