//! Calendar arithmetic shared by the amortization engine and the ledger builder.
//!
//! Month stepping is always computed from an anchor date: the anchor's
//! day-of-month is kept, clamped to the last day of shorter months. Because
//! every step is taken from the anchor rather than from the previous step, a
//! clamped day reappears as soon as a month long enough for it comes round
//! (Jan 31 → Feb 29 → Mar 31).

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::RealtyError;
use crate::types::Years;
use crate::RealtyResult;

/// Actual/365 denominator.
pub const DAYS_PER_YEAR: Decimal = dec!(365);

/// Hard stop for monthly walks; 100 years of months.
pub(crate) const MAX_MONTHLY_STEPS: u32 = 1200;

/// Date `months` calendar months after `anchor`, day-of-month preserved and
/// clamped at month end.
pub fn add_months(anchor: NaiveDate, months: u32) -> RealtyResult<NaiveDate> {
    anchor
        .checked_add_months(Months::new(months))
        .ok_or_else(|| RealtyError::DateError(format!("{anchor} + {months} months is out of range")))
}

/// Calendar-month distance, ignoring the day of month.
///
/// `months_between(2024-01-31, 2024-02-01) == 1`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end.year() as i64 - start.year() as i64) * 12 + end.month() as i64 - start.month() as i64
}

/// Whole days from `start` to `end` (negative when `end` precedes `start`).
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Actual/365 year fraction.
pub fn year_fraction(start: NaiveDate, end: NaiveDate) -> Years {
    Decimal::from(days_between(start, end)) / DAYS_PER_YEAR
}

/// Monthly dates `first, first+1m, first+2m, ...` strictly before `horizon`.
pub fn monthly_dates_before(first: NaiveDate, horizon: NaiveDate) -> RealtyResult<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    for k in 0..MAX_MONTHLY_STEPS {
        let date = add_months(first, k)?;
        if date >= horizon {
            return Ok(dates);
        }
        dates.push(date);
    }
    Err(RealtyError::DateError(format!(
        "monthly walk from {first} to {horizon} exceeds {MAX_MONTHLY_STEPS} steps"
    )))
}

/// Monthly dates `anchor+1m, anchor+2m, ...` strictly before `horizon`, each
/// stepped from the anchor.
pub fn monthly_dates_after(anchor: NaiveDate, horizon: NaiveDate) -> RealtyResult<Vec<NaiveDate>> {
    let mut dates = monthly_dates_before(anchor, horizon)?;
    if !dates.is_empty() {
        dates.remove(0);
    }
    Ok(dates)
}
