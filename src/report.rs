use crate::builder::CustomPortfolio;
use crate::optimizer::AssetWeight;
use crate::simulation::{MonteCarloResult, SimulationPath};
use crate::stats::RiskMetrics;
use crate::strategy::StrategyDna;
use std::fmt::Write;

const RULE_TOP: &str = "╔════════════════════════════════════════════════════════════╗";
const RULE_MID: &str = "╠════════════════════════════════════════════════════════════╣";
const RULE_BOT: &str = "╚════════════════════════════════════════════════════════════╝";

fn row(out: &mut String, text: &str) {
    let _ = writeln!(out, "║  {:<58}║", text);
}

fn holdings(out: &mut String, assets: &[AssetWeight]) {
    row(out, "Symbol   Weight   Sector        Mom.12M   Vol     Yield");
    let _ = writeln!(out, "{}", RULE_MID);

    let mut sorted: Vec<&AssetWeight> = assets.iter().collect();
    sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    for w in sorted {
        let m = &w.asset.metrics;
        row(
            out,
            &format!(
                "{:<6} {:>7.2}%   {:<12} {:>+7.1}%  {:>5.1}%  {:>5.2}%",
                w.asset.ticker,
                w.weight * 100.0,
                w.asset.sector.as_str(),
                m.momentum_12m * 100.0,
                m.volatility * 100.0,
                m.dividend_yield * 100.0
            ),
        );
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub fn render_strategy(dna: &StrategyDna) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", RULE_TOP);
    row(&mut out, &dna.name);
    let _ = writeln!(out, "{}", RULE_MID);
    row(&mut out, &format!("Intent / Risk / Regime : {} / {} / {}", dna.intent, dna.risk_score.get(), dna.market_regime));
    row(&mut out, &format!("Expected Annual Return : {:>+7.2}%", dna.stats.mean_return * 100.0));
    row(&mut out, &format!("Portfolio Volatility   : {:>7.2}%", dna.stats.volatility * 100.0));
    row(&mut out, &format!("Max Drawdown (proxy)   : {:>7.2}%", dna.stats.max_drawdown * 100.0));
    let a = &dna.allocation;
    row(
        &mut out,
        &format!("Stocks {}% | Bonds {}% | Crypto {}% | ETFs {}%", a.stocks, a.bonds, a.crypto, a.etfs),
    );
    let _ = writeln!(out, "{}", RULE_MID);
    holdings(&mut out, &dna.assets);
    let _ = writeln!(out, "{}", RULE_MID);
    for line in wrap(&dna.narrative, 58) {
        row(&mut out, &line);
    }
    for note in &dna.notes {
        for line in wrap(&format!("Note: {}", note), 58) {
            row(&mut out, &line);
        }
    }
    let _ = writeln!(out, "{}", RULE_BOT);
    out
}

pub fn render_risk_metrics(m: &RiskMetrics) -> String {
    let mut out = String::new();
    row(&mut out, &format!("Vibe                   : {}", m.vibe));
    row(&mut out, &format!("Typical Year           : {:>+7.2}%", m.typical_year * 100.0));
    row(&mut out, &format!("Bad Year (-2σ)         : {:>+7.2}%", m.bad_year * 100.0));
    row(&mut out, &format!("Sharpe Ratio           : {:>7.2}", m.sharpe_ratio));
    row(&mut out, &format!("Drawdown Probability   : {:>6.0}%", m.drawdown_probability * 100.0));
    out
}

/// Per-year band table, with the 60/40 median alongside when given.
pub fn render_projection(result: &MonteCarloResult, baseline: Option<&SimulationPath>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", RULE_TOP);
    row(&mut out, &format!("Monte Carlo Projection ({} paths)", result.paths.len()));
    let _ = writeln!(out, "{}", RULE_MID);
    row(&mut out, "Year        P10          P50          P90     60/40");
    let _ = writeln!(out, "{}", RULE_MID);

    let p = &result.percentiles;
    for (i, mid) in p.p50.iter().enumerate() {
        let base = baseline
            .and_then(|b| b.get(i))
            .map(|pt| format!("{:>9.0}", pt.value))
            .unwrap_or_else(|| format!("{:>9}", "-"));
        row(
            &mut out,
            &format!(
                "{:>4}  {:>11.0}  {:>11.0}  {:>11.0} {}",
                mid.year, p.p10[i].value, mid.value, p.p90[i].value, base
            ),
        );
    }

    let f = &result.final_values;
    let _ = writeln!(out, "{}", RULE_MID);
    row(&mut out, &format!("Final P10 / P50 / P90  : {:.0} / {:.0} / {:.0}", f.p10, f.p50, f.p90));
    row(&mut out, &format!("Final Mean             : {:.0}", f.mean));
    let _ = writeln!(out, "{}", RULE_BOT);
    out
}

pub fn render_custom_portfolio(p: &CustomPortfolio) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", RULE_TOP);
    for line in wrap(&p.description, 58) {
        row(&mut out, &line);
    }
    let _ = writeln!(out, "{}", RULE_MID);
    for s in &p.summary {
        row(&mut out, s);
    }
    for adj in &p.constraints.adjustments {
        row(&mut out, &format!("* {}", adj));
    }
    let _ = writeln!(out, "{}", RULE_MID);
    row(&mut out, &format!("Expected Annual Return : {:>+7.2}%", p.stats.mean_return * 100.0));
    row(&mut out, &format!("Portfolio Volatility   : {:>7.2}%", p.stats.volatility * 100.0));
    row(&mut out, &format!("Dividend Yield         : {:>7.2}%", p.dividend_yield * 100.0));
    out.push_str(&render_risk_metrics(&p.risk_metrics));
    let _ = writeln!(out, "{}", RULE_MID);
    holdings(&mut out, &p.assets);
    let _ = writeln!(out, "{}", RULE_MID);
    for line in wrap(&p.failure_mode, 58) {
        row(&mut out, &line);
    }
    for note in &p.notes {
        row(&mut out, &format!("Note: {}", note));
    }
    let _ = writeln!(out, "{}", RULE_BOT);
    out
}

pub fn print_strategy(dna: &StrategyDna, metrics: &RiskMetrics) {
    let mut text = render_strategy(dna);
    // Slot the metrics block in above the closing rule.
    if let Some(pos) = text.rfind(RULE_BOT) {
        text.insert_str(pos, &format!("{}\n{}", RULE_MID, render_risk_metrics(metrics)));
    }
    print!("{}", text);
}

pub fn print_projection(result: &MonteCarloResult, baseline: Option<&SimulationPath>) {
    print!("{}", render_projection(result, baseline));
}

pub fn print_custom_portfolio(p: &CustomPortfolio) {
    print!("{}", render_custom_portfolio(p));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::simulation::run_monte_carlo;
    use crate::stats::risk_metrics;
    use crate::strategy::standard_60_40;
    use crate::universe::AssetUniverse;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_strategy_report_lists_holdings() {
        let u = AssetUniverse::standard();
        let dna = standard_60_40(&u).unwrap();
        let text = render_strategy(&dna);
        assert!(text.contains("Standard 60/40 Portfolio"));
        assert!(text.contains("SPY"));
        assert!(text.contains("BND"));
        assert!(text.contains("ETFs 60%"));
        // SPY carries the larger weight and is listed first.
        assert!(text.find("SPY").unwrap() < text.find("BND    ").unwrap());
        let m = risk_metrics(&dna.stats, dna.intent);
        assert!(render_risk_metrics(&m).contains("Defensive Shield"));
    }

    #[test]
    fn test_projection_report_has_a_row_per_year() {
        let u = AssetUniverse::standard();
        let dna = standard_60_40(&u).unwrap();
        let cfg = SimulationConfig { iterations: 20, steps_per_year: 12, seed: None };
        let mut rng = StdRng::seed_from_u64(9);
        let result = run_monte_carlo(&dna.stats, 10_000.0, 3, &cfg, &mut rng).unwrap();
        let text = render_projection(&result, None);
        assert!(text.contains("20 paths"));
        let rows = text.lines().filter(|l| l.trim_start_matches("║").trim_start().starts_with(char::is_numeric)).count();
        assert_eq!(rows, 4);
    }

    #[test]
    fn test_wrap() {
        let lines = wrap("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
        assert!(wrap("", 10).is_empty());
    }
}
