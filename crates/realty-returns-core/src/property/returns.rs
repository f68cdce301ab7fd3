use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::amortization::{AmortizationSchedule, LoanStatus, LoanTerms};
use crate::calendar::{days_between, year_fraction};
use crate::error::RealtyError;
use crate::ledger::{FlowKind, LedgerBuilder, LedgerRow, RecurringStream, Stream, TaxBasis};
use crate::metrics::{self, AbsoluteReturn, MarketBenchmark, ReturnBasis};
use crate::time_value::{solve_xirr, RateOutcome, SolverConfig};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Mortgage taken against the purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanInput {
    /// Amount borrowed; zero means an unleveraged purchase
    pub principal: Money,
    /// Annual interest rate (e.g. 0.085 = 8.5%)
    pub annual_rate: Rate,
    /// Tenure in months
    pub term_months: u32,
    /// Disbursal date; defaults to the purchase date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: LoanStatus,
}

/// Signed one-off movement (tax, fee, refund).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneOffFlow {
    pub date: NaiveDate,
    /// Positive for money received, negative for money paid
    pub amount: Money,
    #[serde(default)]
    pub description: String,
}

/// Input parameters for a leveraged property purchase, hold and sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyInvestmentInput {
    pub purchase_price: Money,
    pub purchase_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan: Option<LoanInput>,
    /// Rent and other recurring receipts
    #[serde(default)]
    pub income: Vec<RecurringStream>,
    /// Maintenance, taxes and other recurring costs
    #[serde(default)]
    pub expenses: Vec<RecurringStream>,
    #[serde(default)]
    pub one_off_flows: Vec<OneOffFlow>,
    pub sale_price: Money,
    pub sale_date: NaiveDate,
    /// Tax and fees paid on the sale
    #[serde(default)]
    pub disposal_costs: Money,
    /// Annual inflation (e.g. 0.05 = 5%)
    #[serde(default)]
    pub inflation_rate: Rate,
    /// Annual return of the passive market alternative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_return: Option<Rate>,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Returns of a property investment over its holding period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Cash put in at purchase (price less loan)
    pub equity_contributed: Money,
    pub emi: Money,
    pub emis_paid: u32,
    /// Principal repaid in a lump sum at sale
    pub outstanding_loan_at_exit: Money,
    pub holding_period_days: i64,
    pub holding_period_years: Years,
    pub total_inflows: Money,
    pub total_outflows: Money,
    pub nominal_profit: Money,
    pub real_profit: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_return: Option<AbsoluteReturn>,
    pub nominal_xirr: RateOutcome,
    pub real_xirr: RateOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<MarketBenchmark>,
    pub cash_flows: Vec<LedgerRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amortization: Option<AmortizationSchedule>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the property ledger and derive XIRR, profit and benchmark figures.
///
/// Only invalid input is an error. Rates that cannot be solved come back as
/// [`RateOutcome`] markers with a matching warning.
pub fn simulate_property_returns(
    input: &PropertyInvestmentInput,
) -> RealtyResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let loan = loan_terms(input);
    let equity = input.purchase_price - loan.as_ref().map_or(Decimal::ZERO, |l| l.principal);

    let mut builder = LedgerBuilder::new(input.purchase_date, input.sale_date)
        .stream(Stream::Acquisition {
            date: input.purchase_date,
            price: input.purchase_price,
        })
        .streams(input.income.iter().cloned().map(Stream::RecurringIncome))
        .streams(input.expenses.iter().cloned().map(Stream::RecurringExpense))
        .streams(input.one_off_flows.iter().map(|f| Stream::OneOff {
            date: f.date,
            amount: f.amount,
            description: f.description.clone(),
        }))
        .stream(Stream::Disposal {
            date: input.sale_date,
            price: input.sale_price,
            costs: input.disposal_costs,
        });
    if let Some(terms) = &loan {
        builder = builder.stream(Stream::Loan(terms.clone()));
    }
    let built = builder.build()?;

    // --- Rates ---
    let flows = built.ledger.solver_flows(TaxBasis::PostTax);
    let nominal_xirr = solve_xirr(&flows, &input.solver);
    if let Some(reason) = nominal_xirr.failure_reason() {
        warnings.push(format!("Nominal XIRR {reason}"));
    }
    let real_xirr = metrics::real_rate(&nominal_xirr, input.inflation_rate);

    // --- Profit ---
    let nominal_profit = metrics::nominal_profit(&built.ledger);
    let real_profit = metrics::real_profit(
        nominal_profit,
        input.inflation_rate,
        input.purchase_date,
        input.sale_date,
    )?;
    let absolute_return = metrics::absolute_return(nominal_profit, equity, input.purchase_price);
    if matches!(
        absolute_return,
        Some(AbsoluteReturn {
            basis: ReturnBasis::AssetPrice,
            ..
        })
    ) {
        warnings.push(
            "Purchase is fully financed; absolute return is measured against the asset price".into(),
        );
    }

    // every entry is a separate movement, so same-date entries are not netted
    let benchmark = input
        .market_return
        .map(|rate| {
            metrics::market_benchmark(&built.ledger.dated_amounts(TaxBasis::PostTax), rate, input.sale_date)
        })
        .transpose()?;

    // --- Loan and cash flow diagnostics ---
    if built.outstanding_at_horizon > Decimal::ZERO {
        warnings.push(format!(
            "Loan outlasts the holding period; outstanding principal of {} is settled at sale",
            built.outstanding_at_horizon.round_dp(2)
        ));
    }
    if let Some(settlement) = &built.settlement {
        warnings.push(format!(
            "Loan closed on {}; {} settled early",
            settlement.date,
            (-settlement.amount).round_dp(2)
        ));
    }
    let negative_months = built
        .ledger
        .entries()
        .iter()
        .filter(|e| e.kind == FlowKind::Periodic && e.amount < Decimal::ZERO)
        .count();
    if negative_months > 0 {
        warnings.push(format!(
            "{negative_months} month(s) have negative net cash flow; instalments and expenses exceed income"
        ));
    }
    if input.sale_price < input.purchase_price * dec!(0.5) {
        warnings.push("Sale price is less than half the purchase price".into());
    }

    let output = SimulationResult {
        equity_contributed: equity,
        emi: loan.as_ref().map_or(Decimal::ZERO, |l| l.emi()),
        emis_paid: built.emis_paid,
        outstanding_loan_at_exit: built.outstanding_at_horizon,
        holding_period_days: days_between(input.purchase_date, input.sale_date),
        holding_period_years: year_fraction(input.purchase_date, input.sale_date),
        total_inflows: built.ledger.total_inflows(),
        total_outflows: built.ledger.total_outflows(),
        nominal_profit,
        real_profit,
        absolute_return,
        nominal_xirr,
        real_xirr,
        benchmark,
        cash_flows: built.ledger.rows(),
        amortization: built.schedule,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Leveraged Property Returns (XIRR, Actual/365)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn loan_terms(input: &PropertyInvestmentInput) -> Option<LoanTerms> {
    input
        .loan
        .as_ref()
        .filter(|l| l.principal > Decimal::ZERO)
        .map(|l| LoanTerms {
            principal: l.principal,
            annual_rate: l.annual_rate,
            term_months: l.term_months,
            start_date: l.start_date.unwrap_or(input.purchase_date),
            first_due_date: l.first_due_date,
            status: l.status,
        })
}

fn validate_input(input: &PropertyInvestmentInput) -> RealtyResult<()> {
    if input.purchase_price <= Decimal::ZERO {
        return Err(RealtyError::invalid("purchase_price", "Purchase price must be positive"));
    }
    if input.sale_price <= Decimal::ZERO {
        return Err(RealtyError::invalid("sale_price", "Sale price must be positive"));
    }
    if input.sale_date <= input.purchase_date {
        return Err(RealtyError::invalid("sale_date", "Sale date must be after the purchase date"));
    }
    if input.disposal_costs < Decimal::ZERO {
        return Err(RealtyError::invalid("disposal_costs", "Disposal costs must not be negative"));
    }
    if input.inflation_rate <= dec!(-1) {
        return Err(RealtyError::invalid("inflation_rate", "Inflation must be greater than -100%"));
    }
    if let Some(loan) = &input.loan {
        if loan.principal < Decimal::ZERO {
            return Err(RealtyError::invalid("loan.principal", "Loan amount must not be negative"));
        }
        if loan.principal > input.purchase_price {
            return Err(RealtyError::invalid("loan.principal", "Loan amount cannot exceed the purchase price"));
        }
        if loan.annual_rate < Decimal::ZERO {
            return Err(RealtyError::invalid("loan.annual_rate", "Loan rate must not be negative"));
        }
        if loan.term_months == 0 {
            return Err(RealtyError::invalid("loan.term_months", "Loan tenure must be at least one month"));
        }
    }
    for stream in input.income.iter().chain(input.expenses.iter()) {
        if stream.amount < Decimal::ZERO {
            return Err(RealtyError::invalid("amount", "Recurring amounts must not be negative"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Escalation;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_input() -> PropertyInvestmentInput {
        PropertyInvestmentInput {
            purchase_price: dec!(10000000),
            purchase_date: d(2023, 10, 16),
            loan: Some(LoanInput {
                principal: dec!(8000000),
                annual_rate: dec!(0.085),
                term_months: 240,
                start_date: None,
                first_due_date: None,
                status: LoanStatus::Running,
            }),
            income: vec![RecurringStream::monthly(dec!(50000))],
            expenses: vec![RecurringStream::annual(dec!(100000))],
            one_off_flows: vec![],
            sale_price: dec!(15000000),
            sale_date: d(2026, 10, 16),
            disposal_costs: Decimal::ZERO,
            inflation_rate: dec!(0.05),
            market_return: Some(dec!(0.12)),
            solver: SolverConfig::default(),
        }
    }

    #[test]
    fn test_equity_and_emi() {
        let result = simulate_property_returns(&sample_input()).unwrap().result;
        assert_eq!(result.equity_contributed, dec!(2000000));
        assert!(result.emi > dec!(69000) && result.emi < dec!(70000), "emi {}", result.emi);
        assert_eq!(result.emis_paid, 36);
        assert_eq!(result.cash_flows[0].net_flow, dec!(-2000000));
    }

    #[test]
    fn test_positive_xirr_and_outlasting_loan_warning() {
        let output = simulate_property_returns(&sample_input()).unwrap();
        let rate = output.result.nominal_xirr.rate().unwrap();
        assert!(rate > Decimal::ZERO);
        assert!(output.warnings.iter().any(|w| w.contains("outlasts")));
        assert!(output.result.outstanding_loan_at_exit > Decimal::ZERO);
    }

    #[test]
    fn test_real_xirr_below_nominal_with_inflation() {
        let result = simulate_property_returns(&sample_input()).unwrap().result;
        let nominal = result.nominal_xirr.rate().unwrap();
        let real = result.real_xirr.rate().unwrap();
        assert!(real < nominal);
        assert!(result.real_profit < result.nominal_profit);
    }

    #[test]
    fn test_unleveraged_purchase() {
        let mut input = sample_input();
        input.loan = None;
        let result = simulate_property_returns(&input).unwrap().result;
        assert_eq!(result.equity_contributed, dec!(10000000));
        assert_eq!(result.emi, Decimal::ZERO);
        assert!(result.amortization.is_none());
        assert_eq!(result.outstanding_loan_at_exit, Decimal::ZERO);
    }

    #[test]
    fn test_fully_financed_warns() {
        let mut input = sample_input();
        if let Some(loan) = input.loan.as_mut() {
            loan.principal = dec!(10000000);
        }
        let output = simulate_property_returns(&input).unwrap();
        let abs = output.result.absolute_return.unwrap();
        assert_eq!(abs.basis, ReturnBasis::AssetPrice);
        assert!(output.warnings.iter().any(|w| w.contains("fully financed")));
    }

    #[test]
    fn test_loan_above_price_rejected() {
        let mut input = sample_input();
        if let Some(loan) = input.loan.as_mut() {
            loan.principal = dec!(10000001);
        }
        match simulate_property_returns(&input).unwrap_err() {
            RealtyError::InvalidInput { field, .. } => assert_eq!(field, "loan.principal"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_same_day_sale_rejected() {
        let mut input = sample_input();
        input.sale_date = input.purchase_date;
        match simulate_property_returns(&input).unwrap_err() {
            RealtyError::InvalidInput { field, .. } => assert_eq!(field, "sale_date"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_escalating_rent_raises_inflows() {
        let flat = simulate_property_returns(&sample_input()).unwrap().result;
        let mut input = sample_input();
        input.income = vec![RecurringStream::monthly(dec!(50000)).escalating(Escalation::Percent(dec!(0.05)))];
        let escalated = simulate_property_returns(&input).unwrap().result;
        assert!(escalated.total_inflows > flat.total_inflows);
    }

    #[test]
    fn test_benchmark_present_when_market_rate_given() {
        let result = simulate_property_returns(&sample_input()).unwrap().result;
        let bench = result.benchmark.unwrap();
        assert!(bench.future_value > bench.total_injected);
        assert_eq!(bench.appreciation, bench.future_value - bench.total_injected);
    }

    #[test]
    fn test_benchmark_injects_each_entry_separately() {
        let mut input = sample_input();
        // lands on a rent date, beside that month's periodic entry
        input.one_off_flows = vec![OneOffFlow {
            date: d(2024, 6, 16),
            amount: dec!(50000),
            description: "Deposit refund".into(),
        }];
        let result = simulate_property_returns(&input).unwrap().result;

        let injected: Money = result.cash_flows.iter().map(|r| r.net_flow.abs()).sum();
        let bench = result.benchmark.unwrap();
        assert!(
            (bench.total_injected - injected).abs() < dec!(0.000001),
            "{} vs {}",
            bench.total_injected,
            injected
        );
    }

    #[test]
    fn test_methodology_and_metadata() {
        let output = simulate_property_returns(&sample_input()).unwrap();
        assert!(output.methodology.contains("XIRR"));
        assert_eq!(output.metadata.precision, "rust_decimal_128bit");
    }
}
