use crate::config::{
    BASELINE_PATHS, BASELINE_RETURN, BASELINE_VOLATILITY, MAX_HORIZON_YEARS, MAX_STEPS_PER_YEAR,
    SimulationConfig,
};
use crate::error::{Result, StrategyError};
use crate::stats::PortfolioStats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Open01};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationPoint {
    pub year: u32,
    pub value: f64,
}

/// Year-boundary values of one trial, year 0 through the horizon.
pub type SimulationPath = Vec<SimulationPoint>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: SimulationPath,
    pub p50: SimulationPath,
    pub p90: SimulationPath,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalValues {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub mean: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub paths: Vec<SimulationPath>,
    pub percentiles: Percentiles,
    pub final_values: FinalValues,
}

/// Seeded generator, or OS entropy when no seed is given.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Box-Muller over two uniforms on the open interval (0, 1).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = Open01.sample(rng);
    let u2: f64 = Open01.sample(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn check_inputs(initial_value: f64, years: u32, steps_per_year: usize) -> Result<()> {
    if !(initial_value.is_finite() && initial_value > 0.0) {
        return Err(StrategyError::InvalidInitialInvestment(initial_value));
    }
    if years == 0 || years > MAX_HORIZON_YEARS {
        return Err(StrategyError::InvalidHorizon(i64::from(years)));
    }
    let steps = i64::try_from(steps_per_year).unwrap_or(i64::MAX);
    if steps_per_year == 0 || steps_per_year > MAX_STEPS_PER_YEAR {
        return Err(StrategyError::InvalidStepsPerYear(steps));
    }
    if (years as usize).checked_mul(steps_per_year).is_none() {
        return Err(StrategyError::InvalidStepsPerYear(steps));
    }
    Ok(())
}

fn gbm_path<R: Rng + ?Sized>(
    initial_value: f64,
    mean_return: f64,
    volatility: f64,
    years: u32,
    steps_per_year: usize,
    rng: &mut R,
) -> SimulationPath {
    let dt = 1.0 / steps_per_year as f64;
    let drift = mean_return * dt;
    let shock = volatility * dt.sqrt();
    let total_steps = years as usize * steps_per_year;

    let mut path = Vec::with_capacity(years as usize + 1);
    path.push(SimulationPoint { year: 0, value: initial_value });

    let mut value = initial_value;
    for step in 1..=total_steps {
        let z = standard_normal(rng);
        value *= (drift + shock * z).exp();
        if step % steps_per_year == 0 {
            path.push(SimulationPoint {
                year: (step / steps_per_year) as u32,
                value,
            });
        }
    }

    path
}

/// One discretized geometric Brownian motion trial, recording year 0 and
/// every year boundary.
pub fn simulate_path<R: Rng + ?Sized>(
    initial_value: f64,
    mean_return: f64,
    volatility: f64,
    years: u32,
    steps_per_year: usize,
    rng: &mut R,
) -> Result<SimulationPath> {
    check_inputs(initial_value, years, steps_per_year)?;
    Ok(gbm_path(initial_value, mean_return, volatility, years, steps_per_year, rng))
}

/// Index of the `p` quantile in an ascending sample of length `n`.
pub fn percentile_index(n: usize, p: f64) -> usize {
    ((n as f64 * p).floor() as usize).min(n.saturating_sub(1))
}

fn pick(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[percentile_index(sorted.len(), p)]
}

fn sorted_column(paths: &[SimulationPath], year: usize) -> Vec<f64> {
    let mut values: Vec<f64> = paths
        .iter()
        .map(|p| p.get(year).map(|pt| pt.value).unwrap_or(0.0))
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Runs `config.iterations` independent paths on the rayon pool and
/// reduces them to per-year percentile bands and final-value statistics.
///
/// One seed per path is drawn from `rng` up front, so the result depends
/// only on `rng`'s state, never on thread scheduling.
pub fn run_monte_carlo<R: Rng + ?Sized>(
    stats: &PortfolioStats,
    initial_investment: f64,
    years: u32,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<MonteCarloResult> {
    check_inputs(initial_investment, years, config.steps_per_year)?;
    config.validate()?;

    let seeds: Vec<u64> = (0..config.iterations).map(|_| rng.r#gen()).collect();
    let steps = config.steps_per_year;
    let (mu, sigma) = (stats.mean_return, stats.volatility);

    let paths: Vec<SimulationPath> = seeds
        .into_par_iter()
        .map(|seed| {
            let mut path_rng = StdRng::seed_from_u64(seed);
            gbm_path(initial_investment, mu, sigma, years, steps, &mut path_rng)
        })
        .collect();

    let mut p10 = Vec::with_capacity(years as usize + 1);
    let mut p50 = Vec::with_capacity(years as usize + 1);
    let mut p90 = Vec::with_capacity(years as usize + 1);
    for year in 0..=years {
        let column = sorted_column(&paths, year as usize);
        p10.push(SimulationPoint { year, value: pick(&column, 0.1) });
        p50.push(SimulationPoint { year, value: pick(&column, 0.5) });
        p90.push(SimulationPoint { year, value: pick(&column, 0.9) });
    }

    let finals = sorted_column(&paths, years as usize);
    let mean = finals.iter().sum::<f64>() / finals.len() as f64;
    let final_values = FinalValues {
        p10: pick(&finals, 0.1),
        p50: pick(&finals, 0.5),
        p90: pick(&finals, 0.9),
        mean,
    };

    debug!(
        "Monte Carlo: {} paths x {} years (mu={:.4}, sigma={:.4})",
        paths.len(),
        years,
        mu,
        sigma
    );
    info!(
        "Projection after {} years: p10={:.0} p50={:.0} p90={:.0} mean={:.0}",
        years, final_values.p10, final_values.p50, final_values.p90, final_values.mean
    );

    Ok(MonteCarloResult {
        paths,
        percentiles: Percentiles { p10, p50, p90 },
        final_values,
    })
}

/// Median path of a classic 60/40 portfolio proxy (7% return, 10% vol).
pub fn simulate_baseline<R: Rng + ?Sized>(
    initial_investment: f64,
    years: u32,
    steps_per_year: usize,
    rng: &mut R,
) -> Result<SimulationPath> {
    let stats = PortfolioStats {
        mean_return: BASELINE_RETURN,
        volatility: BASELINE_VOLATILITY,
        max_drawdown: 0.0,
    };
    let config = SimulationConfig {
        iterations: BASELINE_PATHS,
        steps_per_year,
        seed: None,
    };
    let result = run_monte_carlo(&stats, initial_investment, years, &config, rng)?;
    Ok(result.percentiles.p50)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(mean_return: f64, volatility: f64) -> PortfolioStats {
        PortfolioStats {
            mean_return,
            volatility,
            max_drawdown: 0.0,
        }
    }

    fn config(iterations: usize, steps_per_year: usize) -> SimulationConfig {
        SimulationConfig {
            iterations,
            steps_per_year,
            seed: None,
        }
    }

    #[test]
    fn test_zero_volatility_is_exponential_growth() {
        let mut rng = StdRng::seed_from_u64(1);
        let path = simulate_path(10_000.0, 0.07, 0.0, 10, 252, &mut rng).unwrap();
        assert_eq!(path.len(), 11);
        for point in &path {
            let expected = 10_000.0 * (0.07 * point.year as f64).exp();
            assert!(
                (point.value - expected).abs() / expected < 1e-9,
                "year {}: {} vs {}",
                point.year,
                point.value,
                expected
            );
        }
    }

    #[test]
    fn test_path_shape() {
        let mut rng = StdRng::seed_from_u64(2);
        let path = simulate_path(500.0, 0.1, 0.3, 3, 12, &mut rng).unwrap();
        let years: Vec<u32> = path.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![0, 1, 2, 3]);
        assert_eq!(path[0].value, 500.0);
        assert!(path.iter().all(|p| p.value > 0.0 && p.value.is_finite()));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            simulate_path(0.0, 0.1, 0.1, 5, 252, &mut rng),
            Err(StrategyError::InvalidInitialInvestment(0.0))
        );
        assert_eq!(
            simulate_path(100.0, 0.1, 0.1, 0, 252, &mut rng),
            Err(StrategyError::InvalidHorizon(0))
        );
        assert_eq!(
            run_monte_carlo(&stats(0.1, 0.1), 100.0, 5, &config(0, 252), &mut rng),
            Err(StrategyError::InvalidIterations(0))
        );
    }

    #[test]
    fn test_huge_step_counts_are_rejected() {
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(
            simulate_path(100.0, 0.1, 0.1, 10, usize::MAX, &mut rng),
            Err(StrategyError::InvalidStepsPerYear(i64::MAX))
        );
        assert_eq!(
            run_monte_carlo(&stats(0.1, 0.1), 100.0, 5, &config(10, usize::MAX / 2), &mut rng),
            Err(StrategyError::InvalidStepsPerYear((usize::MAX / 2) as i64))
        );
        assert_eq!(
            simulate_path(100.0, 0.1, 0.1, MAX_HORIZON_YEARS + 1, 12, &mut rng),
            Err(StrategyError::InvalidHorizon(i64::from(MAX_HORIZON_YEARS) + 1))
        );
    }

    #[test]
    fn test_standard_normal_moments() {
        let mut rng = StdRng::seed_from_u64(4);
        let n = 50_000;
        let draws: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.02, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.03, "variance {}", var);
    }

    #[test]
    fn test_median_matches_analytic_band() {
        let mut rng = StdRng::seed_from_u64(2024);
        let result =
            run_monte_carlo(&stats(0.07, 0.10), 10_000.0, 10, &config(1000, 252), &mut rng).unwrap();
        assert_eq!(result.paths.len(), 1000);
        assert_eq!(result.percentiles.p50.len(), 11);
        let p50 = result.final_values.p50;
        assert!((15_000.0..=24_000.0).contains(&p50), "p50 {}", p50);
        assert!(result.final_values.p10 < p50 && p50 < result.final_values.p90);
        assert!(result.final_values.mean > 0.0);
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            run_monte_carlo(&stats(0.12, 0.25), 1_000.0, 5, &config(64, 52), &mut rng).unwrap()
        };
        assert_eq!(run(77), run(77));
        assert_ne!(run(77).final_values, run(78).final_values);
    }

    #[test]
    fn test_percentile_index() {
        assert_eq!(percentile_index(1000, 0.1), 100);
        assert_eq!(percentile_index(1000, 0.5), 500);
        assert_eq!(percentile_index(10, 0.9), 9);
        assert_eq!(percentile_index(1, 0.9), 0);
        assert_eq!(percentile_index(3, 1.0), 2);
    }

    #[test]
    fn test_baseline_is_median_of_sixty_forty_proxy() {
        let mut rng = StdRng::seed_from_u64(11);
        let path = simulate_baseline(10_000.0, 10, 252, &mut rng).unwrap();
        assert_eq!(path.len(), 11);
        assert_eq!(path[0].value, 10_000.0);
        let last = path[10].value;
        assert!((13_000.0..=30_000.0).contains(&last), "baseline final {}", last);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_percentiles_ordered(
            seed in any::<u64>(),
            iterations in 1usize..60,
            years in 1u32..6,
            mu in -0.5f64..1.5,
            sigma in 0.0f64..0.8,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let r = run_monte_carlo(&stats(mu, sigma), 1_000.0, years, &config(iterations, 12), &mut rng)
                .unwrap();
            for y in 0..=years as usize {
                let (a, b, c) = (
                    r.percentiles.p10[y].value,
                    r.percentiles.p50[y].value,
                    r.percentiles.p90[y].value,
                );
                prop_assert!(a <= b && b <= c, "year {}: {} {} {}", y, a, b, c);
            }
            prop_assert!(r.final_values.p10 <= r.final_values.p50);
            prop_assert!(r.final_values.p50 <= r.final_values.p90);
        }
    }
}
