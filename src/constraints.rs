use crate::config::{HIGH_RISK_THRESHOLD, LOW_RISK_THRESHOLD};
use crate::strategy::RiskScore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Goal {
    Grow,
    Balance,
    Preserve,
}

impl Goal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grow => "Grow",
            Self::Balance => "Balance",
            Self::Preserve => "Preserve",
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Goal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grow" => Ok(Self::Grow),
            "balance" => Ok(Self::Balance),
            "preserve" => Ok(Self::Preserve),
            other => Err(format!("unknown goal '{}' (expected grow|balance|preserve)", other)),
        }
    }
}

/// Integer percentages; not required to sum to 100 until constrained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub stocks: u32,
    pub crypto: u32,
    pub bonds: u32,
}

impl Allocation {
    pub fn total(&self) -> u32 {
        self.stocks.saturating_add(self.crypto).saturating_add(self.bonds)
    }

    fn get(&self, bucket: Bucket) -> i64 {
        match bucket {
            Bucket::Stocks => self.stocks as i64,
            Bucket::Crypto => self.crypto as i64,
            Bucket::Bonds => self.bonds as i64,
        }
    }

    fn set(&mut self, bucket: Bucket, value: i64) {
        let v = value.max(0) as u32;
        match bucket {
            Bucket::Stocks => self.stocks = v,
            Bucket::Crypto => self.crypto = v,
            Bucket::Bonds => self.bonds = v,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuilderState {
    pub goal: Goal,
    pub risk: RiskScore,
    #[serde(default)]
    pub factors: Vec<String>,
    pub allocation: Allocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintResult {
    pub allocation: Allocation,
    pub violations: Vec<String>,
    pub adjustments: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bucket {
    Stocks,
    Crypto,
    Bonds,
}

impl Bucket {
    const ALL: [Bucket; 3] = [Self::Stocks, Self::Crypto, Self::Bonds];
    /// Order in which normalization hands out the rounding remainder.
    const REMAINDER_ORDER: [Bucket; 3] = [Self::Stocks, Self::Bonds, Self::Crypto];

    fn idx(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::Stocks => "Stocks",
            Self::Crypto => "Crypto",
            Self::Bonds => "Bonds",
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Bound {
    Cap(i64),
    Floor(i64),
}

struct Rule {
    bucket: Bucket,
    bound: Bound,
    violation: &'static str,
    verb: &'static str,
    reason: &'static str,
}

const fn cap(
    bucket: Bucket,
    n: i64,
    violation: &'static str,
    verb: &'static str,
    reason: &'static str,
) -> Rule {
    Rule { bucket, bound: Bound::Cap(n), violation, verb, reason }
}

const fn floor(bucket: Bucket, n: i64, violation: &'static str, reason: &'static str) -> Rule {
    Rule { bucket, bound: Bound::Floor(n), violation, verb: "increased to", reason }
}

const PRESERVE_RULES: &[Rule] = &[
    cap(Bucket::Crypto, 5, "Crypto allocation too high for Preserve goal", "capped at", "for capital preservation"),
    cap(Bucket::Stocks, 40, "Stock allocation too high for Preserve goal", "capped at", "for capital preservation"),
    floor(Bucket::Bonds, 50, "Bond allocation too low for Preserve goal", "for preservation"),
];

const BALANCE_RULES: &[Rule] = &[
    cap(Bucket::Crypto, 15, "Crypto allocation too high for Balance goal", "capped at", "for balanced approach"),
    cap(Bucket::Stocks, 70, "Stock allocation too high for Balance goal", "capped at", "for balanced approach"),
];

const GROW_RULES: &[Rule] = &[
    cap(Bucket::Crypto, 25, "Crypto allocation exceeds prudent limits", "capped at", "for risk management"),
];

const LOW_RISK_RULES: &[Rule] = &[
    floor(Bucket::Bonds, 50, "Bond allocation too low for low risk tolerance", "for low risk"),
    cap(Bucket::Crypto, 5, "Crypto allocation too high for low risk tolerance", "limited to", "for low risk tolerance"),
    cap(Bucket::Stocks, 45, "Stock allocation too high for low risk tolerance", "limited to", "for low risk tolerance"),
];

const HIGH_RISK_RULES: &[Rule] = &[
    cap(Bucket::Bonds, 30, "Bond allocation too high for aggressive risk", "capped at", "for aggressive growth"),
];

/// Goal rules, then risk rules, in application order.
fn active_rules(goal: Goal, risk: RiskScore) -> Vec<&'static Rule> {
    let goal_rules = match goal {
        Goal::Preserve => PRESERVE_RULES,
        Goal::Balance => BALANCE_RULES,
        Goal::Grow => GROW_RULES,
    };
    let risk_rules: &[Rule] = if risk.get() < LOW_RISK_THRESHOLD {
        LOW_RISK_RULES
    } else if risk.get() > HIGH_RISK_THRESHOLD {
        HIGH_RISK_RULES
    } else {
        &[]
    };
    goal_rules.iter().chain(risk_rules.iter()).collect()
}

/// Folds the rules into one [lo, hi] interval per bucket. A later rule
/// wins on conflict. Stocks absorb any shortfall when the caps cannot
/// reach 100 together.
fn resolve_bounds(rules: &[&Rule]) -> [(i64, i64); 3] {
    let mut bounds = [(0i64, 100i64); 3];

    for rule in rules {
        let (lo, hi) = &mut bounds[rule.bucket.idx()];
        match rule.bound {
            Bound::Cap(n) => {
                *hi = (*hi).min(n);
                if *lo > *hi {
                    *lo = *hi;
                }
            }
            Bound::Floor(n) => {
                *lo = (*lo).max(n);
                if *lo > *hi {
                    *hi = *lo;
                }
            }
        }
    }

    let s = Bucket::Stocks.idx();
    let others_hi: i64 = bounds[Bucket::Crypto.idx()].1 + bounds[Bucket::Bonds.idx()].1;
    if bounds[s].1 + others_hi < 100 {
        bounds[s].0 = 100 - others_hi;
        bounds[s].1 = bounds[s].1.max(bounds[s].0);
    }

    bounds
}

fn within(value: i64, (lo, hi): (i64, i64)) -> bool {
    (lo..=hi).contains(&value)
}

/// Clamps a requested split to the goal and risk limits and renormalizes it
/// to exactly 100. Every clamp leaves one violation and one adjustment.
/// Applying it again to its own output changes nothing.
pub fn apply_constraints(state: &BuilderState) -> ConstraintResult {
    let rules = active_rules(state.goal, state.risk);
    let bounds = resolve_bounds(&rules);
    let mut allocation = state.allocation;
    let mut violations = Vec::new();
    let mut adjustments = Vec::new();

    for rule in &rules {
        let b = rule.bucket;
        let (lo, hi) = bounds[b.idx()];
        let value = allocation.get(b);
        let (threshold, fired, suffix) = match rule.bound {
            Bound::Cap(n) => {
                let t = n.max(lo);
                (t, value > t, "")
            }
            Bound::Floor(n) => {
                let t = n.min(hi);
                (t, value < t, " minimum")
            }
        };
        if fired {
            allocation.set(b, threshold);
            violations.push(rule.violation.to_string());
            adjustments.push(format!(
                "{} {} {}%{} {}",
                b.label(),
                rule.verb,
                threshold,
                suffix,
                rule.reason
            ));
        }
    }

    let in_bounds = Bucket::ALL
        .iter()
        .all(|b| within(allocation.get(*b), bounds[b.idx()]));
    if allocation.total() != 100 || !in_bounds {
        allocation = normalize(allocation, &bounds);
        adjustments.push("Allocations normalized to sum to 100%".to_string());
    }

    debug!(
        "Constraints for {} / risk {}: {:?} -> {:?} ({} adjustments)",
        state.goal,
        state.risk.get(),
        state.allocation,
        allocation,
        adjustments.len()
    );

    ConstraintResult {
        allocation,
        violations,
        adjustments,
    }
}

/// Proportional rescale to 100, rounded and clamped to `bounds`; the
/// leftover goes to stocks, then bonds, then crypto.
fn normalize(allocation: Allocation, bounds: &[(i64, i64); 3]) -> Allocation {
    let total: i64 = Bucket::ALL.iter().map(|b| allocation.get(*b)).sum();
    let mut out = Allocation::default();

    for b in Bucket::ALL {
        let (lo, hi) = bounds[b.idx()];
        let scaled = if total == 0 {
            lo
        } else {
            (allocation.get(b) as f64 * 100.0 / total as f64).round() as i64
        };
        out.set(b, scaled.clamp(lo, hi));
    }

    let mut diff = 100 - out.total() as i64;
    for b in Bucket::REMAINDER_ORDER {
        if diff == 0 {
            break;
        }
        let (lo, hi) = bounds[b.idx()];
        let v = out.get(b);
        let step = if diff > 0 {
            diff.min(hi - v)
        } else {
            -((-diff).min(v - lo))
        };
        out.set(b, v + step);
        diff -= step;
    }

    out
}

/// Human-readable list of the limits in force.
pub fn constraint_summary(goal: Goal, risk: RiskScore) -> Vec<String> {
    let mut lines: Vec<&str> = match goal {
        Goal::Preserve => vec!["Risk Cap: Conservative", "Crypto Limit: 5%", "Bond Minimum: 50%"],
        Goal::Balance => vec!["Risk Cap: Moderate", "Crypto Limit: 15%", "Equity Limit: 70%"],
        Goal::Grow => vec!["Risk Cap: High", "Crypto Limit: 25%", "Growth Focus: Enabled"],
    };
    if risk.get() < LOW_RISK_THRESHOLD {
        lines.push("Low Risk: Bond Heavy");
    } else if risk.get() > HIGH_RISK_THRESHOLD {
        lines.push("High Risk: Growth Heavy");
    }
    lines.into_iter().map(String::from).collect()
}
