use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use realty_returns_core::amortization::{
    calculate_emi, calculate_loan_balance, generate_amortization_schedule,
};
use realty_returns_core::time_value::{solve_xirr, xnpv, RateOutcome, SolverConfig};
use realty_returns_core::types::{with_metadata, DatedAmount, Money, Rate};

use crate::input;

// ---------------------------------------------------------------------------
// XIRR
// ---------------------------------------------------------------------------

/// Arguments for an XIRR calculation
#[derive(Args)]
pub struct XirrArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Dated flow as DATE:AMOUNT, repeatable (e.g. --flow 2024-01-01:-1000)
    #[arg(long = "flow", allow_hyphen_values = true)]
    pub flows: Vec<String>,

    /// Starting guess for the solver
    #[arg(long, allow_hyphen_values = true)]
    pub guess: Option<Decimal>,

    /// Iteration cap
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct XirrRequest {
    pub flows: Vec<DatedAmount>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Serialize)]
pub struct XirrResponse {
    pub xirr: RateOutcome,
    /// XNPV at the solved rate, when there is one
    pub residual_npv: Option<Money>,
    pub flow_count: usize,
}

pub fn run_xirr(args: XirrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let mut request: XirrRequest = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if !args.flows.is_empty() {
        XirrRequest {
            flows: args
                .flows
                .iter()
                .map(|f| parse_flow(f))
                .collect::<Result<Vec<_>, _>>()?,
            solver: SolverConfig::default(),
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--flow DATE:AMOUNT (repeated), --input or stdin required".into());
    };

    if let Some(guess) = args.guess {
        request.solver.initial_guess = guess;
    }
    if let Some(cap) = args.max_iterations {
        request.solver.max_iterations = cap;
    }

    let outcome = solve_xirr(&request.flows, &request.solver);
    let residual_npv = match outcome.rate() {
        Some(rate) => xnpv(rate, &request.flows).ok(),
        None => None,
    };

    let mut warnings = Vec::new();
    if let Some(reason) = outcome.failure_reason() {
        warnings.push(format!("XIRR {reason}"));
    }

    let response = XirrResponse {
        xirr: outcome,
        residual_npv,
        flow_count: request.flows.len(),
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(serde_json::to_value(with_metadata(
        "XIRR (Newton-Raphson, Actual/365)",
        &request,
        warnings,
        elapsed,
        response,
    ))?)
}

/// `2024-01-31:-1500.25` into a dated amount.
fn parse_flow(raw: &str) -> Result<DatedAmount, Box<dyn std::error::Error>> {
    let (date, amount) = raw
        .split_once(':')
        .ok_or_else(|| format!("Flow '{raw}' must look like DATE:AMOUNT"))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Flow '{raw}': bad date: {e}"))?;
    let amount: Decimal = amount
        .trim()
        .parse()
        .map_err(|e| format!("Flow '{raw}': bad amount: {e}"))?;
    Ok(DatedAmount::new(date, amount))
}

// ---------------------------------------------------------------------------
// Loans
// ---------------------------------------------------------------------------

#[derive(Args, Serialize)]
pub struct EmiArgs {
    /// Amount borrowed
    #[arg(long)]
    pub principal: Decimal,

    /// Annual interest rate (e.g. 0.085)
    #[arg(long)]
    pub rate: Rate,

    /// Tenure in months
    #[arg(long)]
    pub term_months: u32,
}

#[derive(Debug, Serialize)]
pub struct EmiResponse {
    pub emi: Money,
    pub total_paid: Money,
    pub total_interest: Money,
}

pub fn run_emi(args: EmiArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let emi = calculate_emi(args.principal, args.rate, args.term_months);
    let total_paid = emi * Decimal::from(args.term_months);

    let mut warnings = Vec::new();
    if emi.is_zero() {
        warnings.push("Degenerate loan terms; instalment is zero".to_string());
    }

    let response = EmiResponse {
        emi,
        total_paid,
        total_interest: total_paid - args.principal,
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(serde_json::to_value(with_metadata(
        "Level EMI (monthly compounding)",
        &args,
        warnings,
        elapsed,
        response,
    ))?)
}

#[derive(Args, Serialize)]
pub struct AmortizeArgs {
    #[arg(long)]
    pub principal: Decimal,

    #[arg(long)]
    pub rate: Rate,

    #[arg(long)]
    pub term_months: u32,

    /// Loan start date; the first instalment falls one month later
    #[arg(long)]
    pub start_date: NaiveDate,
}

pub fn run_amortize(args: AmortizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let schedule =
        generate_amortization_schedule(args.principal, args.rate, args.term_months, args.start_date)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(serde_json::to_value(with_metadata(
        "Amortization schedule (level EMI)",
        &args,
        Vec::new(),
        elapsed,
        schedule,
    ))?)
}

#[derive(Args, Serialize)]
pub struct LoanBalanceArgs {
    #[arg(long)]
    pub principal: Decimal,

    #[arg(long)]
    pub rate: Rate,

    #[arg(long)]
    pub term_months: u32,

    /// Instalments already paid
    #[arg(long, allow_hyphen_values = true)]
    pub months_elapsed: i64,
}

#[derive(Debug, Serialize)]
pub struct LoanBalanceResponse {
    pub outstanding_balance: Money,
    pub emi: Money,
}

pub fn run_loan_balance(args: LoanBalanceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let response = LoanBalanceResponse {
        outstanding_balance: calculate_loan_balance(
            args.principal,
            args.rate,
            args.term_months,
            args.months_elapsed,
        ),
        emi: calculate_emi(args.principal, args.rate, args.term_months),
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(serde_json::to_value(with_metadata(
        "Outstanding balance (closed form)",
        &args,
        Vec::new(),
        elapsed,
        response,
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_flow() {
        let flow = parse_flow("2024-01-31:-1500.25").unwrap();
        assert_eq!(flow.date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(flow.amount, dec!(-1500.25));
    }

    #[test]
    fn test_parse_flow_rejects_garbage() {
        assert!(parse_flow("2024-01-31").is_err());
        assert!(parse_flow("31/01/2024:100").is_err());
        assert!(parse_flow("2024-01-31:abc").is_err());
    }
}
