use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calendar::{days_between, DAYS_PER_YEAR};
use crate::error::RealtyError;
use crate::types::{DatedAmount, Money, Rate, Years};
use crate::RealtyResult;

pub const DEFAULT_XIRR_GUESS: Rate = dec!(0.10);
const NPV_TOLERANCE: Decimal = dec!(0.000001);
const STEP_TOLERANCE: Decimal = dec!(0.0000001);
const MAX_XIRR_ITERATIONS: u32 = 100;
const DERIVATIVE_NUDGE: Rate = dec!(0.01);
const RATE_FLOOR: Rate = dec!(-0.99);
const RATE_CEILING: Rate = dec!(10);

/// Newton-Raphson settings for the XIRR solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Starting rate for the iteration
    pub initial_guess: Rate,
    /// Hard cap on Newton steps
    pub max_iterations: u32,
    /// Converged when |NPV| falls below this
    pub npv_tolerance: Decimal,
    /// Converged when a Newton step moves the rate by less than this
    pub step_tolerance: Decimal,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_guess: DEFAULT_XIRR_GUESS,
            max_iterations: MAX_XIRR_ITERATIONS,
            npv_tolerance: NPV_TOLERANCE,
            step_tolerance: STEP_TOLERANCE,
        }
    }
}

/// A converged XIRR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XirrSolution {
    pub rate: Rate,
    pub iterations: u32,
    /// NPV at the last evaluated iterate
    pub npv: Money,
}

/// Outcome of a rate computation that must never be mistaken for a number
/// when it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RateOutcome {
    Solved { rate: Rate, iterations: u32 },
    /// The inputs cannot define a rate (degenerate ledger, undefined inputs)
    NotComputable { reason: String },
    /// The solver hit its iteration cap or left the representable range
    DidNotConverge { iterations: u32, last_npv: Decimal },
}

impl RateOutcome {
    pub fn rate(&self) -> Option<Rate> {
        match self {
            RateOutcome::Solved { rate, .. } => Some(*rate),
            _ => None,
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, RateOutcome::Solved { .. })
    }

    /// Human-readable reason for an unsolved outcome, `None` when solved.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            RateOutcome::Solved { .. } => None,
            RateOutcome::NotComputable { reason } => Some(format!("not computable: {reason}")),
            RateOutcome::DidNotConverge {
                iterations,
                last_npv,
            } => Some(format!(
                "did not converge after {iterations} iterations (last NPV {})",
                last_npv.round_dp(6)
            )),
        }
    }
}

impl From<RealtyResult<XirrSolution>> for RateOutcome {
    fn from(result: RealtyResult<XirrSolution>) -> Self {
        match result {
            Ok(s) => RateOutcome::Solved {
                rate: s.rate,
                iterations: s.iterations,
            },
            Err(RealtyError::ConvergenceFailure {
                iterations,
                last_delta,
                ..
            }) => RateOutcome::DidNotConverge {
                iterations,
                last_npv: last_delta,
            },
            Err(e) => RateOutcome::NotComputable {
                reason: e.to_string(),
            },
        }
    }
}

/// Net Present Value of a series of periodic cash flows
pub fn npv(rate: Rate, cash_flows: &[Money]) -> RealtyResult<Money> {
    if rate <= dec!(-1) {
        return Err(RealtyError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        result += cf / discount;
    }

    Ok(result)
}

/// Date-weighted NPV on Actual/365, discounted to the earliest flow's date.
pub fn xnpv(rate: Rate, flows: &[DatedAmount]) -> RealtyResult<Money> {
    if rate <= dec!(-1) {
        return Err(RealtyError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    if flows.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let base = earliest_date(flows);
    let timed: Vec<(Years, Money)> = flows
        .iter()
        .map(|f| (Decimal::from(days_between(base, f.date)) / DAYS_PER_YEAR, f.amount))
        .collect();

    npv_and_derivative(&timed, rate)
        .map(|(npv, _)| npv)
        .ok_or_else(|| RealtyError::DivisionByZero {
            context: format!("XNPV discount factor at rate {rate}"),
        })
}

/// Extended IRR for irregular cash flow dates using Newton-Raphson.
pub fn xirr(flows: &[DatedAmount], guess: Rate) -> RealtyResult<Rate> {
    let config = SolverConfig {
        initial_guess: guess,
        ..SolverConfig::default()
    };
    xirr_with_config(flows, &config).map(|s| s.rate)
}

/// XIRR folded into a [`RateOutcome`]; never fails.
pub fn solve_xirr(flows: &[DatedAmount], config: &SolverConfig) -> RateOutcome {
    xirr_with_config(flows, config).into()
}

/// Newton-Raphson XIRR.
///
/// Flows may arrive in any order; they are sorted internally and timed in
/// Actual/365 years from the earliest date. Iteration stops when |NPV| is
/// below `npv_tolerance` or a step moves the rate by less than
/// `step_tolerance`. A zero derivative nudges the rate up by 1% instead of
/// dividing by zero. Iterates are kept inside (-99%, 1000%].
pub fn xirr_with_config(flows: &[DatedAmount], config: &SolverConfig) -> RealtyResult<XirrSolution> {
    let timed = prepare_flows(flows)?;

    let mut rate = config.initial_guess;
    let mut last_npv = Decimal::ZERO;

    for i in 0..config.max_iterations {
        let (npv_val, dnpv) = match npv_and_derivative(&timed, rate) {
            Some(v) => v,
            None => {
                warn!(rate = %rate, iteration = i, "XIRR discount factor out of range");
                return Err(RealtyError::ConvergenceFailure {
                    function: "XIRR".into(),
                    iterations: i,
                    last_delta: last_npv,
                });
            }
        };
        last_npv = npv_val;

        if npv_val.abs() < config.npv_tolerance {
            debug!(rate = %rate, iterations = i, "XIRR converged on NPV");
            return Ok(XirrSolution {
                rate,
                iterations: i,
                npv: npv_val,
            });
        }

        if dnpv.is_zero() {
            rate += DERIVATIVE_NUDGE;
            continue;
        }

        let step = match npv_val.checked_div(dnpv) {
            Some(s) => s,
            None => {
                return Err(RealtyError::ConvergenceFailure {
                    function: "XIRR".into(),
                    iterations: i,
                    last_delta: npv_val,
                })
            }
        };
        let raw = rate - step;
        let next = raw.max(RATE_FLOOR).min(RATE_CEILING);

        // a clamped iterate says nothing about convergence
        if next == raw && step.abs() < config.step_tolerance {
            debug!(rate = %next, iterations = i + 1, "XIRR converged on step");
            return Ok(XirrSolution {
                rate: next,
                iterations: i + 1,
                npv: npv_val,
            });
        }

        rate = next;
    }

    warn!(
        iterations = config.max_iterations,
        last_npv = %last_npv,
        "XIRR did not converge"
    );
    Err(RealtyError::ConvergenceFailure {
        function: "XIRR".into(),
        iterations: config.max_iterations,
        last_delta: last_npv,
    })
}

/// Growth factor `(1 + rate)^years`.
pub fn compound_factor(rate: Rate, years: Years) -> RealtyResult<Decimal> {
    let base = Decimal::ONE + rate;
    if base <= Decimal::ZERO {
        return Err(RealtyError::InvalidInput {
            field: "rate".into(),
            reason: "Rate must be greater than -100%".into(),
        });
    }
    base.checked_powd(years).ok_or_else(|| RealtyError::DivisionByZero {
        context: format!("compound factor (1 + {rate})^{years} out of range"),
    })
}

fn earliest_date(flows: &[DatedAmount]) -> NaiveDate {
    flows
        .iter()
        .map(|f| f.date)
        .min()
        .unwrap_or(NaiveDate::MIN)
}

/// Sort, validate and convert to (years from first date, amount).
fn prepare_flows(flows: &[DatedAmount]) -> RealtyResult<Vec<(Years, Money)>> {
    if flows.len() < 2 {
        return Err(RealtyError::InsufficientData(
            "XIRR requires at least 2 cash flows".into(),
        ));
    }

    let mut sorted = flows.to_vec();
    sorted.sort_by_key(|f| f.date);

    let first = sorted[0].date;
    let last = sorted[sorted.len() - 1].date;
    if first == last {
        return Err(RealtyError::InsufficientData(
            "XIRR requires cash flows on at least 2 distinct dates".into(),
        ));
    }

    let has_inflow = sorted.iter().any(|f| f.amount > Decimal::ZERO);
    let has_outflow = sorted.iter().any(|f| f.amount < Decimal::ZERO);
    if !has_inflow || !has_outflow {
        return Err(RealtyError::InsufficientData(
            "XIRR requires at least one inflow and one outflow".into(),
        ));
    }

    Ok(sorted
        .into_iter()
        .map(|f| (Decimal::from(days_between(first, f.date)) / DAYS_PER_YEAR, f.amount))
        .collect())
}

/// NPV(r) = Σ a / (1+r)^t and dNPV/dr = Σ -t·a / (1+r)^(t+1).
/// `None` when a discount factor leaves the representable range.
fn npv_and_derivative(timed: &[(Years, Money)], rate: Rate) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut npv_val = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;

    for (years, amount) in timed {
        let growth = one_plus_r.checked_powd(*years)?;
        if growth.is_zero() {
            return None;
        }
        npv_val = npv_val.checked_add(amount.checked_div(growth)?)?;
        let denom = growth.checked_mul(one_plus_r)?;
        dnpv = dnpv.checked_sub(years.checked_mul(*amount)?.checked_div(denom)?)?;
    }

    Some((npv_val, dnpv))
}
