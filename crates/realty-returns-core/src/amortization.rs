use chrono::NaiveDate;
use rust_decimal::prelude::MathematicalOps;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::calendar::{add_months, MAX_MONTHLY_STEPS};
use crate::error::RealtyError;
use crate::types::{Money, Rate};
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whether a loan runs its full term or was closed early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoanStatus {
    #[default]
    Running,
    /// Prepaid in full on `end_date`; no instalments fall due from that date on
    Closed { end_date: NaiveDate },
}

/// Terms of a fixed-rate amortizing loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Amount disbursed
    pub principal: Money,
    /// Annual interest rate (e.g. 0.085 = 8.5%)
    pub annual_rate: Rate,
    /// Number of monthly instalments
    pub term_months: u32,
    /// Disbursal date
    pub start_date: NaiveDate,
    /// First instalment date; defaults to one month after `start_date`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: LoanStatus,
}

/// One instalment of an amortization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationRow {
    /// 1-based instalment number
    pub month: u32,
    pub due_date: NaiveDate,
    pub installment: Money,
    pub principal: Money,
    pub interest: Money,
    /// Outstanding balance after this instalment
    pub balance: Money,
}

/// Full payment-by-payment schedule of a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_months: u32,
    /// Level monthly instalment
    pub emi: Money,
    pub rows: Vec<AmortizationRow>,
    pub total_interest: Money,
    pub total_paid: Money,
}

impl LoanTerms {
    pub fn validate(&self) -> RealtyResult<()> {
        validate_loan_parameters(self.principal, self.annual_rate, self.term_months)?;
        if let Some(first_due) = self.first_due_date {
            if first_due <= self.start_date {
                return Err(RealtyError::invalid(
                    "first_due_date",
                    "First instalment must fall after the loan start date",
                ));
            }
        }
        if let LoanStatus::Closed { end_date } = self.status {
            if end_date < self.start_date {
                return Err(RealtyError::invalid(
                    "end_date",
                    "Loan end date must not precede the loan start date",
                ));
            }
        }
        Ok(())
    }

    pub fn emi(&self) -> Money {
        calculate_emi(self.principal, self.annual_rate, self.term_months)
    }

    /// Date of instalment `k` (1-based).
    pub fn due_date(&self, k: u32) -> RealtyResult<NaiveDate> {
        match self.first_due_date {
            Some(first_due) => add_months(first_due, k.saturating_sub(1)),
            None => add_months(self.start_date, k),
        }
    }

    pub fn schedule(&self) -> RealtyResult<AmortizationSchedule> {
        self.validate()?;
        match self.first_due_date {
            Some(first_due) => generate_amortization_schedule_from(
                self.principal,
                self.annual_rate,
                self.term_months,
                first_due,
            ),
            None => generate_amortization_schedule(
                self.principal,
                self.annual_rate,
                self.term_months,
                self.start_date,
            ),
        }
    }

    pub fn closed_on(&self) -> Option<NaiveDate> {
        match self.status {
            LoanStatus::Running => None,
            LoanStatus::Closed { end_date } => Some(end_date),
        }
    }
}

impl AmortizationSchedule {
    /// Balance after `k` instalments, read from the schedule rows.
    pub fn balance_after(&self, k: u32) -> Money {
        if k == 0 {
            return self.principal;
        }
        self.rows
            .iter()
            .take_while(|row| row.month <= k)
            .last()
            .map(|row| row.balance)
            .unwrap_or(self.principal)
    }
}

// ---------------------------------------------------------------------------
// EMI
// ---------------------------------------------------------------------------

/// Level monthly instalment: `P·r·(1+r)^n / ((1+r)^n − 1)` with `r = annual/12`.
///
/// A non-positive principal, a negative rate or a zero term means there is no
/// loan to service and yields zero. At a zero rate the principal is repaid in
/// equal parts.
pub fn calculate_emi(principal: Money, annual_rate: Rate, term_months: u32) -> Money {
    if principal <= Decimal::ZERO || annual_rate < Decimal::ZERO || term_months == 0 {
        return Decimal::ZERO;
    }

    let monthly_rate = annual_rate / dec!(12);
    let straight_line = principal / Decimal::from(term_months);
    if monthly_rate.is_zero() {
        return straight_line;
    }

    // saturates when even the interest alone is beyond decimal range
    let Some(interest_only) = principal.checked_mul(monthly_rate) else {
        return Decimal::MAX;
    };
    match compound(monthly_rate, term_months) {
        Some(growth) => {
            let denominator = growth - Decimal::ONE;
            if denominator.is_zero() {
                return straight_line;
            }
            // (1+r)^n / ((1+r)^n - 1) first, so the product stays in range
            growth
                .checked_div(denominator)
                .and_then(|annuity| interest_only.checked_mul(annuity))
                .unwrap_or(interest_only)
        }
        // (1+r)^n beyond range: the instalment converges on pure interest
        None => interest_only,
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Schedule with instalment `k` due `k` months after `start_date`.
pub fn generate_amortization_schedule(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
    start_date: NaiveDate,
) -> RealtyResult<AmortizationSchedule> {
    build_schedule(principal, annual_rate, term_months, |k| {
        add_months(start_date, k)
    })
}

/// Schedule with the first instalment on `first_due_date` and each later one
/// a calendar month further on.
pub fn generate_amortization_schedule_from(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
    first_due_date: NaiveDate,
) -> RealtyResult<AmortizationSchedule> {
    build_schedule(principal, annual_rate, term_months, |k| {
        add_months(first_due_date, k - 1)
    })
}

fn build_schedule<F>(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
    due_date: F,
) -> RealtyResult<AmortizationSchedule>
where
    F: Fn(u32) -> RealtyResult<NaiveDate>,
{
    validate_loan_parameters(principal, annual_rate, term_months)?;

    let monthly_rate = annual_rate / dec!(12);
    let emi = calculate_emi(principal, annual_rate, term_months);

    let mut rows = Vec::new();
    let mut balance = principal;
    let mut total_interest = Decimal::ZERO;
    let mut total_paid = Decimal::ZERO;

    for month in 1..=term_months {
        let interest = balance
            .checked_mul(monthly_rate)
            .ok_or_else(|| RealtyError::invalid("annual_rate", "Monthly interest exceeds decimal range"))?;
        let principal_part = if month == term_months {
            // last instalment absorbs rounding drift
            balance
        } else {
            (emi - interest).max(Decimal::ZERO).min(balance)
        };
        let installment = principal_part + interest;
        balance = (balance - principal_part).max(Decimal::ZERO);

        total_interest = total_interest
            .checked_add(interest)
            .ok_or_else(|| RealtyError::invalid("annual_rate", "Total interest exceeds decimal range"))?;
        total_paid = total_paid
            .checked_add(installment)
            .ok_or_else(|| RealtyError::invalid("annual_rate", "Total paid exceeds decimal range"))?;

        rows.push(AmortizationRow {
            month,
            due_date: due_date(month)?,
            installment,
            principal: principal_part,
            interest,
            balance,
        });

        if balance.is_zero() {
            break;
        }
    }

    Ok(AmortizationSchedule {
        principal,
        annual_rate,
        term_months,
        emi,
        rows,
        total_interest,
        total_paid,
    })
}

// ---------------------------------------------------------------------------
// Outstanding balance
// ---------------------------------------------------------------------------

/// Closed-form outstanding balance after `months_elapsed` instalments:
/// `P(1+r)^k − E((1+r)^k − 1)/r`, floored at zero.
///
/// `k ≤ 0` returns the full principal and `k ≥ n` returns zero. At a zero rate
/// the balance falls in a straight line.
pub fn calculate_loan_balance(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
    months_elapsed: i64,
) -> Money {
    if principal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if months_elapsed <= 0 {
        return principal;
    }
    if months_elapsed >= i64::from(term_months) {
        return Decimal::ZERO;
    }
    if annual_rate < Decimal::ZERO {
        return principal;
    }

    let k = months_elapsed as u32;
    let monthly_rate = annual_rate / dec!(12);
    if monthly_rate.is_zero() {
        let repaid = principal / Decimal::from(term_months) * Decimal::from(k);
        return (principal - repaid).max(Decimal::ZERO);
    }

    // P((1+r)^n - (1+r)^k) / ((1+r)^n - 1), the same closed form with the
    // ratio taken first so it stays in [0, 1]
    match (compound(monthly_rate, term_months), compound(monthly_rate, k)) {
        (Some(growth_n), Some(growth_k)) => {
            let denominator = growth_n - Decimal::ONE;
            (growth_n - growth_k)
                .checked_div(denominator)
                .and_then(|remaining| principal.checked_mul(remaining))
                .map_or(principal, |balance| balance.max(Decimal::ZERO).min(principal))
        }
        // (1+r)^n beyond range: instalments barely cover interest
        _ => principal,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_loan_parameters(principal: Money, annual_rate: Rate, term_months: u32) -> RealtyResult<()> {
    if principal <= Decimal::ZERO {
        return Err(RealtyError::invalid("principal", "Loan principal must be positive"));
    }
    if annual_rate < Decimal::ZERO {
        return Err(RealtyError::invalid("annual_rate", "Loan rate must not be negative"));
    }
    if term_months == 0 {
        return Err(RealtyError::invalid("term_months", "Loan term must be at least one month"));
    }
    if term_months > MAX_MONTHLY_STEPS {
        return Err(RealtyError::invalid(
            "term_months",
            format!("Loan term must not exceed {MAX_MONTHLY_STEPS} months"),
        ));
    }
    Ok(())
}

/// (1 + r)^n, `None` on overflow.
fn compound(rate: Rate, n: u32) -> Option<Decimal> {
    Decimal::ONE.checked_add(rate)?.checked_powu(u64::from(n))
}
