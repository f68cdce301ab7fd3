use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::amortization::{LoanStatus, LoanTerms};
use crate::error::RealtyError;
use crate::ledger::{BuiltLedger, CouponStream, FlowKind, LedgerBuilder, Stream, TaxBasis};
use crate::metrics::{self, MarketBenchmark};
use crate::time_value::{solve_xirr, RateOutcome, SolverConfig};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A loan-funded bond purchase whose coupons service the loan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondCarryInput {
    pub loan_amount: Money,
    /// Annual loan rate (e.g. 0.10 = 10%)
    pub loan_annual_rate: Rate,
    pub loan_tenure_months: u32,
    /// Disbursal and bond settlement date
    pub loan_start_date: NaiveDate,
    /// First instalment and first coupon credit; later ones follow monthly
    pub first_payment_date: NaiveDate,
    pub face_value_per_bond: Money,
    pub annual_coupon_rate: Rate,
    /// Clean price paid per bond
    pub market_price_per_bond: Money,
    /// Accrued interest paid on top of the clean price
    #[serde(default)]
    pub accrued_interest_per_bond: Money,
    pub maturity_date: NaiveDate,
    /// Last coupon date before settlement; accrual starts here
    pub previous_coupon_date: NaiveDate,
    /// Tax deducted at source on coupon interest (0.10 = 10%)
    #[serde(default)]
    pub withholding_rate: Rate,
    #[serde(default)]
    pub inflation_rate: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_return: Option<Rate>,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Rates and totals on one tax basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisReturns {
    pub nominal_xirr: RateOutcome,
    /// XIRR of inflation-deflated flows
    pub real_xirr: RateOutcome,
    pub total_net_cash_flow: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<MarketBenchmark>,
}

/// One line of the carry table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondCarryRow {
    pub date: NaiveDate,
    pub interest_credited: Money,
    pub tax_withheld: Money,
    pub post_tax_interest: Money,
    pub installment: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    pub outstanding_balance: Money,
    pub net_cash_flow: Money,
    pub net_cash_flow_pre_tax: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_market_value: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondCarryResult {
    pub number_of_bonds: u64,
    /// Market price plus accrued interest
    pub net_investment_per_bond: Money,
    pub total_bond_investment: Money,
    /// Loan cash left over after buying whole bonds
    pub residual_loan_cash: Money,
    pub emi: Money,
    pub annual_coupon_income: Money,
    pub redemption_value: Money,
    pub outstanding_loan_at_maturity: Money,
    pub post_tax: BasisReturns,
    pub pre_tax: BasisReturns,
    pub rows: Vec<BondCarryRow>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Simulate a loan-funded bond position from settlement to maturity.
pub fn simulate_bond_carry(input: &BondCarryInput) -> RealtyResult<ComputationOutput<BondCarryResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let net_per_bond = input.market_price_per_bond + input.accrued_interest_per_bond;
    let bonds = (input.loan_amount / net_per_bond).floor();
    let number_of_bonds = bonds.to_u64().unwrap_or(0);
    if number_of_bonds == 0 {
        return Err(RealtyError::invalid(
            "loan_amount",
            "Loan amount does not cover the price of a single bond",
        ));
    }
    let total_investment = bonds * net_per_bond;
    let total_face = bonds * input.face_value_per_bond;

    let loan = LoanTerms {
        principal: input.loan_amount,
        annual_rate: input.loan_annual_rate,
        term_months: input.loan_tenure_months,
        start_date: input.loan_start_date,
        first_due_date: Some(input.first_payment_date),
        status: LoanStatus::Running,
    };
    let emi = loan.emi();

    let built = LedgerBuilder::new(input.loan_start_date, input.maturity_date)
        .first_period(input.first_payment_date)
        .stream(Stream::Acquisition {
            date: input.loan_start_date,
            price: total_investment,
        })
        .stream(Stream::Loan(loan))
        .stream(Stream::Coupon(CouponStream {
            face_value: total_face,
            annual_coupon_rate: input.annual_coupon_rate,
            previous_coupon_date: input.previous_coupon_date,
            withholding_rate: input.withholding_rate,
        }))
        .stream(Stream::Disposal {
            date: input.maturity_date,
            price: total_face,
            costs: Decimal::ZERO,
        })
        .build()?;

    let post_tax = basis_returns(&built, input, TaxBasis::PostTax, &mut warnings)?;
    let pre_tax = basis_returns(&built, input, TaxBasis::PreTax, &mut warnings)?;

    let running = match input.market_return {
        Some(rate) => Some(metrics::running_market_value(
            &built.ledger.dated_amounts(TaxBasis::PostTax),
            rate,
        )?),
        None => None,
    };
    let rows = carry_rows(&built, running.as_deref());

    if built.outstanding_at_horizon > Decimal::ZERO {
        warnings.push(format!(
            "Loan outlasts the bond; outstanding principal of {} is repaid from the redemption",
            built.outstanding_at_horizon.round_dp(2)
        ));
    }
    let negative_carry = built
        .ledger
        .entries()
        .iter()
        .filter(|e| e.kind == FlowKind::Periodic && e.amount < Decimal::ZERO)
        .count();
    if negative_carry > 0 {
        warnings.push(format!(
            "{negative_carry} month(s) of negative carry; post-tax coupon does not cover the instalment"
        ));
    }

    let output = BondCarryResult {
        number_of_bonds,
        net_investment_per_bond: net_per_bond,
        total_bond_investment: total_investment,
        residual_loan_cash: input.loan_amount - total_investment,
        emi,
        annual_coupon_income: total_face * input.annual_coupon_rate,
        redemption_value: total_face,
        outstanding_loan_at_maturity: built.outstanding_at_horizon,
        post_tax,
        pre_tax,
        rows,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Loan-Funded Bond Carry (daily coupon accrual, XIRR Actual/365)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn basis_returns(
    built: &BuiltLedger,
    input: &BondCarryInput,
    basis: TaxBasis,
    warnings: &mut Vec<String>,
) -> RealtyResult<BasisReturns> {
    let label = match basis {
        TaxBasis::PostTax => "post-tax",
        TaxBasis::PreTax => "pre-tax",
    };

    let flows = built.ledger.solver_flows(basis);
    let nominal_xirr = solve_xirr(&flows, &input.solver);
    if let Some(reason) = nominal_xirr.failure_reason() {
        warnings.push(format!("Nominal XIRR ({label}) {reason}"));
    }

    let real_flows = metrics::deflate_flows(&flows, input.loan_start_date, input.inflation_rate)?;
    let real_xirr = solve_xirr(&real_flows, &input.solver);
    if let Some(reason) = real_xirr.failure_reason() {
        warnings.push(format!("Real XIRR ({label}) {reason}"));
    }

    let benchmark = input
        .market_return
        .map(|rate| metrics::market_benchmark(&built.ledger.dated_amounts(basis), rate, input.maturity_date))
        .transpose()?;

    Ok(BasisReturns {
        nominal_xirr,
        real_xirr,
        total_net_cash_flow: built.ledger.net_total(basis),
        benchmark,
    })
}

fn carry_rows(built: &BuiltLedger, running: Option<&[Money]>) -> Vec<BondCarryRow> {
    built
        .ledger
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let detail = &entry.detail;
            let interest = detail.coupon_interest.unwrap_or(Decimal::ZERO);
            let tax = detail.tax_withheld.unwrap_or(Decimal::ZERO);
            // the exit line shows the lump-sum repayment alongside any last instalment
            let installment = match entry.kind {
                FlowKind::Disposal => {
                    detail.installment.unwrap_or(Decimal::ZERO) + built.outstanding_at_horizon
                }
                _ => detail.installment.unwrap_or(Decimal::ZERO),
            };
            BondCarryRow {
                date: entry.date,
                interest_credited: interest,
                tax_withheld: tax,
                post_tax_interest: interest - tax,
                installment,
                interest_paid: detail.loan_interest.unwrap_or(Decimal::ZERO),
                principal_paid: detail.loan_principal.unwrap_or(Decimal::ZERO),
                outstanding_balance: detail.loan_outstanding.unwrap_or(Decimal::ZERO),
                net_cash_flow: entry.net(TaxBasis::PostTax),
                net_cash_flow_pre_tax: entry.net(TaxBasis::PreTax),
                cumulative_market_value: running.and_then(|values| values.get(i).copied()),
            }
        })
        .collect()
}

fn validate_input(input: &BondCarryInput) -> RealtyResult<()> {
    if input.loan_amount <= Decimal::ZERO {
        return Err(RealtyError::invalid("loan_amount", "Loan amount must be positive"));
    }
    if input.loan_annual_rate < Decimal::ZERO {
        return Err(RealtyError::invalid("loan_annual_rate", "Loan rate must not be negative"));
    }
    if input.loan_tenure_months == 0 {
        return Err(RealtyError::invalid("loan_tenure_months", "Loan tenure must be at least one month"));
    }
    if input.face_value_per_bond <= Decimal::ZERO {
        return Err(RealtyError::invalid("face_value_per_bond", "Face value must be positive"));
    }
    if input.annual_coupon_rate < Decimal::ZERO {
        return Err(RealtyError::invalid("annual_coupon_rate", "Coupon rate must not be negative"));
    }
    if input.market_price_per_bond + input.accrued_interest_per_bond <= Decimal::ZERO {
        return Err(RealtyError::invalid(
            "market_price_per_bond",
            "Net investment per bond must be positive",
        ));
    }
    if input.first_payment_date <= input.loan_start_date {
        return Err(RealtyError::invalid(
            "first_payment_date",
            "First payment must fall after the loan start date",
        ));
    }
    if input.maturity_date <= input.first_payment_date {
        return Err(RealtyError::invalid(
            "maturity_date",
            "Bond maturity must fall after the first payment date",
        ));
    }
    if input.previous_coupon_date >= input.first_payment_date {
        return Err(RealtyError::invalid(
            "previous_coupon_date",
            "Previous coupon date must precede the first payment date",
        ));
    }
    if input.inflation_rate < Decimal::ZERO {
        return Err(RealtyError::invalid("inflation_rate", "Inflation must not be negative"));
    }
    if input.withholding_rate < Decimal::ZERO || input.withholding_rate > Decimal::ONE {
        return Err(RealtyError::invalid("withholding_rate", "Withholding rate must be between 0 and 1"));
    }
    Ok(())
}
