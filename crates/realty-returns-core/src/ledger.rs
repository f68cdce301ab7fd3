//! Chronological cash-flow ledger built from typed streams.
//!
//! A [`LedgerBuilder`] walks from an anchor date to a horizon date and merges
//! every [`Stream`] into one ledger: the anchor entry, one periodic entry per
//! month strictly before the horizon, any one-off or settlement entries, and a
//! horizon entry that closes the position.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::amortization::{calculate_loan_balance, AmortizationSchedule, LoanTerms};
use crate::calendar::{add_months, days_between, monthly_dates_after, monthly_dates_before, DAYS_PER_YEAR};
use crate::error::RealtyError;
use crate::time_value::compound_factor;
use crate::types::{DatedAmount, Money, Rate};
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Acquisition,
    LoanDisbursal,
    Periodic,
    OneOff,
    LoanSettlement,
    Disposal,
}

/// Optional loan and coupon breakdown carried by an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_interest: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_withheld: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_interest: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_principal: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_outstanding: Option<Money>,
}

/// One dated movement of cash. `amount = inflow - outflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowEntry {
    pub date: NaiveDate,
    pub amount: Money,
    pub inflow: Money,
    pub outflow: Money,
    pub kind: FlowKind,
    pub description: String,
    #[serde(default)]
    pub detail: EntryDetail,
}

impl CashFlowEntry {
    pub fn new(
        date: NaiveDate,
        inflow: Money,
        outflow: Money,
        kind: FlowKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date,
            amount: inflow - outflow,
            inflow,
            outflow,
            kind,
            description: description.into(),
            detail: EntryDetail::default(),
        }
    }

    pub fn with_detail(mut self, detail: EntryDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Net amount on the requested tax basis.
    pub fn net(&self, basis: TaxBasis) -> Money {
        match basis {
            TaxBasis::PostTax => self.amount,
            TaxBasis::PreTax => self.amount + self.detail.tax_withheld.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Whether tax withheld at source counts as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBasis {
    #[default]
    PostTax,
    PreTax,
}

/// Display row: gross columns plus running cumulative net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub inflow: Money,
    pub outflow: Money,
    pub net_flow: Money,
    pub cumulative_amount: Money,
}

/// Ordered sequence of cash-flow entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<CashFlowEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CashFlowEntry) {
        self.entries.push(entry);
    }

    /// Stable sort by date; same-date entries keep insertion order.
    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.date);
    }

    pub fn entries(&self) -> &[CashFlowEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_inflows(&self) -> Money {
        self.entries.iter().map(|e| e.inflow).sum()
    }

    pub fn total_outflows(&self) -> Money {
        self.entries.iter().map(|e| e.outflow).sum()
    }

    /// Sum of entry nets on the given basis.
    pub fn net_total(&self, basis: TaxBasis) -> Money {
        self.entries.iter().map(|e| e.net(basis)).sum()
    }

    /// Solver input: same-date entries combined additively, zero nets dropped,
    /// ascending by date.
    pub fn solver_flows(&self, basis: TaxBasis) -> Vec<DatedAmount> {
        let mut by_date: BTreeMap<NaiveDate, Money> = BTreeMap::new();
        for entry in &self.entries {
            *by_date.entry(entry.date).or_insert(Decimal::ZERO) += entry.net(basis);
        }
        by_date
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(date, amount)| DatedAmount::new(date, amount))
            .collect()
    }

    /// Per-entry nets in ledger order, zero entries included.
    pub fn dated_amounts(&self, basis: TaxBasis) -> Vec<DatedAmount> {
        self.entries
            .iter()
            .map(|e| DatedAmount::new(e.date, e.net(basis)))
            .collect()
    }

    pub fn rows(&self) -> Vec<LedgerRow> {
        let mut cumulative = Decimal::ZERO;
        self.entries
            .iter()
            .map(|e| {
                cumulative += e.amount;
                LedgerRow {
                    date: e.date,
                    inflow: e.inflow,
                    outflow: e.outflow,
                    net_flow: e.amount,
                    cumulative_amount: cumulative,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Monthly,
    /// Quoted per year, spread evenly over the months
    Annual,
}

/// Yearly step-up of a recurring amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Escalation {
    #[default]
    None,
    /// Add a fixed amount per calendar year
    FixedAmount(Money),
    /// Compound by a rate per calendar year (0.05 = 5%)
    Percent(Rate),
}

/// A repeating income or expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringStream {
    pub amount: Money,
    #[serde(default)]
    pub frequency: Frequency,
    /// Defaults to the ledger anchor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Inclusive; open-ended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub escalation: Escalation,
}

impl RecurringStream {
    pub fn monthly(amount: Money) -> Self {
        Self {
            amount,
            frequency: Frequency::Monthly,
            start_date: None,
            end_date: None,
            escalation: Escalation::None,
        }
    }

    pub fn annual(amount: Money) -> Self {
        Self {
            frequency: Frequency::Annual,
            ..Self::monthly(amount)
        }
    }

    pub fn escalating(mut self, escalation: Escalation) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn starting(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn ending(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn validate(&self, field: &str) -> RealtyResult<()> {
        if self.amount < Decimal::ZERO {
            return Err(RealtyError::invalid(field, "Recurring amount must not be negative"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(RealtyError::invalid(field, "Stream end date precedes its start date"));
            }
        }
        if let Escalation::Percent(p) = self.escalation {
            if p <= dec!(-1) {
                return Err(RealtyError::invalid(field, "Escalation rate must be greater than -100%"));
            }
        }
        Ok(())
    }

    /// Monthly amount due on `period`, zero outside the active window.
    ///
    /// Escalation steps once per calendar year after the stream's start year.
    pub fn monthly_amount_at(&self, period: NaiveDate, default_start: NaiveDate) -> RealtyResult<Money> {
        let start = self.start_date.unwrap_or(default_start);
        if period < start || self.end_date.is_some_and(|end| period > end) {
            return Ok(Decimal::ZERO);
        }

        let steps = Decimal::from((period.year() - start.year()).max(0));
        let escalated = match self.escalation {
            Escalation::None => self.amount,
            Escalation::FixedAmount(step) => self.amount + step * steps,
            Escalation::Percent(rate) => self.amount * compound_factor(rate, steps)?,
        }
        .max(Decimal::ZERO);

        Ok(match self.frequency {
            Frequency::Monthly => escalated,
            Frequency::Annual => escalated / dec!(12),
        })
    }
}

/// Coupon income accruing daily on a face value, with tax withheld at source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponStream {
    /// Total face value held
    pub face_value: Money,
    pub annual_coupon_rate: Rate,
    /// Accrual starts here
    pub previous_coupon_date: NaiveDate,
    /// Fraction of each coupon withheld (0.10 = 10%)
    #[serde(default)]
    pub withholding_rate: Rate,
}

impl CouponStream {
    pub fn validate(&self) -> RealtyResult<()> {
        if self.face_value <= Decimal::ZERO {
            return Err(RealtyError::invalid("face_value", "Face value must be positive"));
        }
        if self.annual_coupon_rate < Decimal::ZERO {
            return Err(RealtyError::invalid("annual_coupon_rate", "Coupon rate must not be negative"));
        }
        if self.withholding_rate < Decimal::ZERO || self.withholding_rate > Decimal::ONE {
            return Err(RealtyError::invalid(
                "withholding_rate",
                "Withholding rate must be between 0 and 1",
            ));
        }
        Ok(())
    }

    /// (gross interest, tax withheld) accrued from `from` to `to`.
    pub fn accrue(&self, from: NaiveDate, to: NaiveDate) -> (Money, Money) {
        let days = Decimal::from(days_between(from, to).max(0));
        let gross = self.face_value * self.annual_coupon_rate / DAYS_PER_YEAR * days;
        (gross, gross * self.withholding_rate)
    }
}

/// Everything that can feed the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stream {
    Acquisition { date: NaiveDate, price: Money },
    Loan(LoanTerms),
    RecurringIncome(RecurringStream),
    RecurringExpense(RecurringStream),
    Coupon(CouponStream),
    /// Signed: positive is money received
    OneOff {
        date: NaiveDate,
        amount: Money,
        #[serde(default)]
        description: String,
    },
    Disposal {
        date: NaiveDate,
        price: Money,
        #[serde(default)]
        costs: Money,
    },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Ledger plus the loan bookkeeping gathered while building it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltLedger {
    pub ledger: Ledger,
    pub schedule: Option<AmortizationSchedule>,
    /// Instalments paid before the horizon (or before early closure)
    pub emis_paid: u32,
    /// Principal settled in the horizon entry
    pub outstanding_at_horizon: Money,
    /// Early closure settlement, when the loan was closed inside the window
    pub settlement: Option<DatedAmount>,
}

#[derive(Debug, Clone)]
pub struct LedgerBuilder {
    anchor: NaiveDate,
    horizon: NaiveDate,
    first_period: Option<NaiveDate>,
    streams: Vec<Stream>,
}

/// Per-period totals of the loan rows falling due in a window.
#[derive(Default)]
struct DueInstallments {
    count: u32,
    installment: Money,
    interest: Money,
    principal: Money,
    balance: Option<Money>,
}

impl LedgerBuilder {
    pub fn new(anchor: NaiveDate, horizon: NaiveDate) -> Self {
        Self {
            anchor,
            horizon,
            first_period: None,
            streams: Vec::new(),
        }
    }

    pub fn stream(mut self, stream: Stream) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn streams(mut self, streams: impl IntoIterator<Item = Stream>) -> Self {
        self.streams.extend(streams);
        self
    }

    /// First periodic date; defaults to one month after the anchor.
    pub fn first_period(mut self, date: NaiveDate) -> Self {
        self.first_period = Some(date);
        self
    }

    pub fn build(self) -> RealtyResult<BuiltLedger> {
        self.validate()?;

        let loan = self.streams.iter().find_map(|s| match s {
            Stream::Loan(terms) => Some(terms),
            _ => None,
        });
        let schedule = loan.map(|terms| terms.schedule()).transpose()?;
        // a closure on or after the horizon is the same as running to the horizon
        let closure = loan
            .and_then(|terms| terms.closed_on())
            .filter(|end| *end < self.horizon);

        let mut ledger = Ledger::new();

        // --- Anchor / acquisition entries ---
        let mut loan_netted = false;
        for stream in &self.streams {
            if let Stream::Acquisition { date, price } = stream {
                let mut entry = CashFlowEntry::new(*date, Decimal::ZERO, *price, FlowKind::Acquisition, "Purchase");
                if let Some(terms) = loan.filter(|t| !loan_netted && t.start_date == *date) {
                    entry = CashFlowEntry::new(*date, terms.principal, *price, FlowKind::Acquisition, "Purchase net of loan")
                        .with_detail(EntryDetail {
                            loan_outstanding: Some(terms.principal),
                            ..EntryDetail::default()
                        });
                    loan_netted = true;
                }
                ledger.push(entry);
            }
        }
        if let Some(terms) = loan.filter(|_| !loan_netted) {
            ledger.push(
                CashFlowEntry::new(
                    terms.start_date,
                    terms.principal,
                    Decimal::ZERO,
                    FlowKind::LoanDisbursal,
                    "Loan disbursal",
                )
                .with_detail(EntryDetail {
                    loan_outstanding: Some(terms.principal),
                    ..EntryDetail::default()
                }),
            );
        }

        // --- Periodic entries ---
        let coupon = self.streams.iter().find_map(|s| match s {
            Stream::Coupon(c) => Some(c),
            _ => None,
        });
        let periods = match self.first_period {
            Some(first) => monthly_dates_before(first, self.horizon)?,
            None => monthly_dates_after(self.anchor, self.horizon)?,
        };

        let mut window_start = self.anchor;
        let mut last_accrual = coupon.map(|c| c.previous_coupon_date);
        let mut emis_paid = 0u32;
        let mut outstanding = loan.map(|t| t.principal);

        for period in &periods {
            let mut inflow = Decimal::ZERO;
            let mut outflow = Decimal::ZERO;
            let mut detail = EntryDetail::default();

            for stream in &self.streams {
                match stream {
                    Stream::RecurringIncome(s) => inflow += s.monthly_amount_at(*period, self.anchor)?,
                    Stream::RecurringExpense(s) => outflow += s.monthly_amount_at(*period, self.anchor)?,
                    _ => {}
                }
            }

            if let (Some(c), Some(from)) = (coupon, last_accrual) {
                let (gross, tax) = c.accrue(from, *period);
                inflow += gross - tax;
                detail.coupon_interest = Some(gross);
                detail.tax_withheld = Some(tax);
                last_accrual = Some(*period);
            }

            if let Some(schedule) = &schedule {
                let due = due_between(schedule, window_start, *period, closure);
                outflow += due.installment;
                emis_paid += due.count;
                if let Some(balance) = due.balance {
                    outstanding = Some(balance);
                }
                detail.installment = Some(due.installment);
                detail.loan_interest = Some(due.interest);
                detail.loan_principal = Some(due.principal);
                detail.loan_outstanding = outstanding;
            }

            ledger.push(
                CashFlowEntry::new(*period, inflow, outflow, FlowKind::Periodic, "Monthly cash flow")
                    .with_detail(detail),
            );
            window_start = *period;
        }

        // EMIs due after the last period, up to and including the horizon.
        // An instalment scheduled later in the month than the horizon day is
        // not yet due, so the count can trail the calendar-month distance.
        let trailing = match &schedule {
            Some(schedule) => due_between(schedule, window_start, self.horizon, closure),
            None => DueInstallments::default(),
        };
        emis_paid += trailing.count;

        // --- One-off entries ---
        for stream in &self.streams {
            if let Stream::OneOff { date, amount, description } = stream {
                let label = if description.is_empty() { "One-off flow" } else { description.as_str() };
                ledger.push(CashFlowEntry::new(
                    *date,
                    (*amount).max(Decimal::ZERO),
                    (-*amount).max(Decimal::ZERO),
                    FlowKind::OneOff,
                    label,
                ));
            }
        }

        // --- Early loan closure ---
        let settlement = match (loan, closure) {
            (Some(terms), Some(end_date)) => {
                let balance = calculate_loan_balance(
                    terms.principal,
                    terms.annual_rate,
                    terms.term_months,
                    i64::from(emis_paid),
                );
                ledger.push(
                    CashFlowEntry::new(end_date, Decimal::ZERO, balance, FlowKind::LoanSettlement, "Loan closure")
                        .with_detail(EntryDetail {
                            loan_principal: Some(balance),
                            loan_outstanding: Some(Decimal::ZERO),
                            ..EntryDetail::default()
                        }),
                );
                Some(DatedAmount::new(end_date, -balance))
            }
            _ => None,
        };

        let outstanding_at_horizon = match loan {
            Some(terms) if closure.is_none() => calculate_loan_balance(
                terms.principal,
                terms.annual_rate,
                terms.term_months,
                i64::from(emis_paid),
            ),
            _ => Decimal::ZERO,
        };

        // --- Disposals before the horizon ---
        for stream in &self.streams {
            if let Stream::Disposal { date, price, costs } = stream {
                if *date < self.horizon {
                    ledger.push(CashFlowEntry::new(*date, *price, *costs, FlowKind::Disposal, "Disposal"));
                }
            }
        }

        // --- Horizon entry ---
        let mut inflow = Decimal::ZERO;
        let mut outflow = outstanding_at_horizon + trailing.installment;
        for stream in &self.streams {
            if let Stream::Disposal { date, price, costs } = stream {
                if *date == self.horizon {
                    inflow += *price;
                    outflow += *costs;
                }
            }
        }
        let mut detail = EntryDetail::default();
        if let (Some(c), Some(from)) = (coupon, last_accrual) {
            let (gross, tax) = c.accrue(from, self.horizon);
            inflow += gross - tax;
            detail.coupon_interest = Some(gross);
            detail.tax_withheld = Some(tax);
        }
        if loan.is_some() {
            detail.installment = Some(trailing.installment);
            detail.loan_interest = Some(trailing.interest);
            detail.loan_principal = Some(trailing.principal + outstanding_at_horizon);
            detail.loan_outstanding = Some(Decimal::ZERO);
        }
        ledger.push(
            CashFlowEntry::new(self.horizon, inflow, outflow, FlowKind::Disposal, "Exit").with_detail(detail),
        );

        ledger.sort();

        debug!(
            entries = ledger.len(),
            periods = periods.len(),
            emis_paid,
            outstanding = %outstanding_at_horizon,
            "ledger built"
        );

        Ok(BuiltLedger {
            ledger,
            schedule,
            emis_paid,
            outstanding_at_horizon,
            settlement,
        })
    }

    fn validate(&self) -> RealtyResult<()> {
        if self.horizon <= self.anchor {
            return Err(RealtyError::invalid(
                "horizon",
                "Horizon must be strictly after the anchor date (holding period of zero)",
            ));
        }
        if let Some(first) = self.first_period {
            if first <= self.anchor {
                return Err(RealtyError::invalid("first_period", "First period must fall after the anchor date"));
            }
        }

        let in_window = |date: NaiveDate| date >= self.anchor && date <= self.horizon;
        let mut loans = 0;

        for stream in &self.streams {
            match stream {
                Stream::Acquisition { date, price } => {
                    if *price < Decimal::ZERO {
                        return Err(RealtyError::invalid("price", "Acquisition price must not be negative"));
                    }
                    if !in_window(*date) {
                        return Err(RealtyError::invalid("acquisition_date", "Acquisition falls outside the holding period"));
                    }
                }
                Stream::Loan(terms) => {
                    loans += 1;
                    terms.validate()?;
                    if terms.start_date < self.anchor || terms.start_date >= self.horizon {
                        return Err(RealtyError::invalid("loan_start_date", "Loan must start inside the holding period"));
                    }
                }
                Stream::RecurringIncome(s) => s.validate("income")?,
                Stream::RecurringExpense(s) => s.validate("expense")?,
                Stream::Coupon(c) => {
                    c.validate()?;
                    let first = match self.first_period {
                        Some(date) => date,
                        None => add_months(self.anchor, 1)?,
                    };
                    if c.previous_coupon_date >= first.min(self.horizon) {
                        return Err(RealtyError::invalid(
                            "previous_coupon_date",
                            "Previous coupon date must precede the first payment date",
                        ));
                    }
                }
                Stream::OneOff { date, .. } => {
                    if !in_window(*date) {
                        return Err(RealtyError::invalid("one_off_date", format!("One-off flow on {date} falls outside the holding period")));
                    }
                }
                Stream::Disposal { date, price, costs } => {
                    if *price < Decimal::ZERO || *costs < Decimal::ZERO {
                        return Err(RealtyError::invalid("disposal", "Disposal price and costs must not be negative"));
                    }
                    if *date <= self.anchor || *date > self.horizon {
                        return Err(RealtyError::invalid("disposal_date", "Disposal falls outside the holding period"));
                    }
                }
            }
        }

        if loans > 1 {
            return Err(RealtyError::invalid("loan", "At most one loan stream is supported"));
        }
        if self.streams.iter().filter(|s| matches!(s, Stream::Coupon(_))).count() > 1 {
            return Err(RealtyError::invalid("coupon", "At most one coupon stream is supported"));
        }
        Ok(())
    }
}

/// Schedule rows due in `(after, until]` and strictly before any closure date.
fn due_between(
    schedule: &AmortizationSchedule,
    after: NaiveDate,
    until: NaiveDate,
    closure: Option<NaiveDate>,
) -> DueInstallments {
    let mut due = DueInstallments::default();
    for row in schedule.rows.iter().filter(|r| {
        r.due_date > after && r.due_date <= until && closure.map_or(true, |end| r.due_date < end)
    }) {
        due.count += 1;
        due.installment += row.installment;
        due.interest += row.interest;
        due.principal += row.principal;
        due.balance = Some(row.balance);
    }
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amortization::LoanStatus;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn loan(principal: Money, start: NaiveDate) -> LoanTerms {
        LoanTerms {
            principal,
            annual_rate: dec!(0.12),
            term_months: 24,
            start_date: start,
            first_due_date: None,
            status: LoanStatus::Running,
        }
    }

    #[test]
    fn test_zero_holding_period_rejected() {
        let day = d(2024, 1, 1);
        let err = LedgerBuilder::new(day, day).build().unwrap_err();
        match err {
            RealtyError::InvalidInput { field, .. } => assert_eq!(field, "horizon"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_flat_stream_totals_amount_times_periods() {
        let anchor = d(2024, 1, 15);
        let horizon = d(2025, 1, 15);
        let built = LedgerBuilder::new(anchor, horizon)
            .stream(Stream::RecurringIncome(RecurringStream::monthly(dec!(1000))))
            .build()
            .unwrap();

        let periodic: Vec<&CashFlowEntry> = built
            .ledger
            .entries()
            .iter()
            .filter(|e| e.kind == FlowKind::Periodic)
            .collect();
        // Feb 15 .. Dec 15 are strictly before the horizon
        assert_eq!(periodic.len(), 11);
        let total: Money = periodic.iter().map(|e| e.inflow).sum();
        assert_eq!(total, dec!(11000));
    }

    #[test]
    fn test_annual_expense_prorated_and_escalated() {
        let anchor = d(2023, 11, 1);
        let stream = RecurringStream::annual(dec!(1200)).escalating(Escalation::Percent(dec!(0.10)));
        assert_eq!(stream.monthly_amount_at(d(2023, 12, 1), anchor).unwrap(), dec!(100));
        assert_eq!(stream.monthly_amount_at(d(2024, 1, 1), anchor).unwrap(), dec!(110));
        assert_eq!(stream.monthly_amount_at(d(2025, 3, 1), anchor).unwrap(), dec!(121));

        let fixed = RecurringStream::monthly(dec!(500)).escalating(Escalation::FixedAmount(dec!(50)));
        assert_eq!(fixed.monthly_amount_at(d(2025, 6, 1), anchor).unwrap(), dec!(600));
    }

    #[test]
    fn test_stream_window_is_inclusive() {
        let anchor = d(2024, 1, 1);
        let stream = RecurringStream::monthly(dec!(10))
            .starting(d(2024, 3, 1))
            .ending(d(2024, 5, 1));
        assert_eq!(stream.monthly_amount_at(d(2024, 2, 1), anchor).unwrap(), Decimal::ZERO);
        assert_eq!(stream.monthly_amount_at(d(2024, 3, 1), anchor).unwrap(), dec!(10));
        assert_eq!(stream.monthly_amount_at(d(2024, 5, 1), anchor).unwrap(), dec!(10));
        assert_eq!(stream.monthly_amount_at(d(2024, 6, 1), anchor).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_anchor_entry_nets_loan_against_price() {
        let anchor = d(2024, 1, 1);
        let built = LedgerBuilder::new(anchor, d(2025, 1, 1))
            .stream(Stream::Acquisition { date: anchor, price: dec!(1000) })
            .stream(Stream::Loan(loan(dec!(800), anchor)))
            .stream(Stream::Disposal { date: d(2025, 1, 1), price: dec!(1100), costs: Decimal::ZERO })
            .build()
            .unwrap();

        let first = &built.ledger.entries()[0];
        assert_eq!(first.kind, FlowKind::Acquisition);
        assert_eq!(first.inflow, dec!(800));
        assert_eq!(first.outflow, dec!(1000));
        assert_eq!(first.amount, dec!(-200));
        assert!(built.ledger.entries().iter().all(|e| e.kind != FlowKind::LoanDisbursal));
    }

    #[test]
    fn test_emis_stop_at_term_and_horizon_settles_balance() {
        let anchor = d(2024, 1, 1);
        let horizon = d(2025, 1, 1);
        let terms = loan(dec!(2400), anchor);
        let built = LedgerBuilder::new(anchor, horizon)
            .stream(Stream::Acquisition { date: anchor, price: dec!(3000) })
            .stream(Stream::Loan(terms.clone()))
            .build()
            .unwrap();

        // Feb..Dec periods carry instalments 1..11; instalment 12 falls on the horizon
        assert_eq!(built.emis_paid, 12);
        let expected = calculate_loan_balance(dec!(2400), dec!(0.12), 24, 12);
        assert_eq!(built.outstanding_at_horizon, expected);

        let schedule = built.schedule.as_ref().unwrap();
        let last = built.ledger.entries().last().unwrap();
        assert_eq!(last.date, horizon);
        assert_eq!(last.outflow, expected + schedule.rows[11].installment);
        assert_eq!(last.detail.installment, Some(schedule.rows[11].installment));
    }

    #[test]
    fn test_closed_loan_settles_early() {
        let anchor = d(2024, 1, 1);
        let mut terms = loan(dec!(2400), anchor);
        terms.status = LoanStatus::Closed { end_date: d(2024, 4, 10) };
        let built = LedgerBuilder::new(anchor, d(2025, 1, 1))
            .stream(Stream::Loan(terms))
            .build()
            .unwrap();

        assert_eq!(built.emis_paid, 3);
        assert_eq!(built.outstanding_at_horizon, Decimal::ZERO);
        let settlement = built.settlement.unwrap();
        assert_eq!(settlement.date, d(2024, 4, 10));
        assert_eq!(
            settlement.amount,
            -calculate_loan_balance(dec!(2400), dec!(0.12), 24, 3)
        );

        let after_close = built
            .ledger
            .entries()
            .iter()
            .filter(|e| e.kind == FlowKind::Periodic && e.date > d(2024, 4, 10))
            .all(|e| e.outflow.is_zero());
        assert!(after_close);
    }

    #[test]
    fn test_one_off_sign_splits_into_inflow_and_outflow() {
        let built = LedgerBuilder::new(d(2024, 1, 1), d(2024, 6, 1))
            .stream(Stream::OneOff {
                date: d(2024, 2, 10),
                amount: dec!(75),
                description: "Deposit refund".into(),
            })
            .stream(Stream::OneOff {
                date: d(2024, 3, 10),
                amount: dec!(-40),
                description: String::new(),
            })
            .build()
            .unwrap();

        let one_offs: Vec<&CashFlowEntry> = built
            .ledger
            .entries()
            .iter()
            .filter(|e| e.kind == FlowKind::OneOff)
            .collect();
        assert_eq!(one_offs.len(), 2);
        assert_eq!((one_offs[0].inflow, one_offs[0].outflow), (dec!(75), Decimal::ZERO));
        assert_eq!((one_offs[1].inflow, one_offs[1].outflow), (Decimal::ZERO, dec!(40)));
        assert_eq!(one_offs[1].description, "One-off flow");
    }

    #[test]
    fn test_later_day_instalment_not_due_at_horizon() {
        let anchor = d(2023, 10, 31);
        let horizon = d(2026, 10, 16);
        let built = LedgerBuilder::new(anchor, horizon)
            .stream(Stream::Loan(LoanTerms {
                term_months: 240,
                ..loan(dec!(100000), anchor)
            }))
            .build()
            .unwrap();
        // the 36th instalment falls on 31 Oct 2026, after the horizon
        assert_eq!(built.emis_paid, 35);
    }

    #[test]
    fn test_one_off_outside_window_rejected() {
        let err = LedgerBuilder::new(d(2024, 1, 1), d(2024, 6, 1))
            .stream(Stream::OneOff {
                date: d(2024, 7, 1),
                amount: dec!(-50),
                description: "Repairs".into(),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, RealtyError::InvalidInput { .. }));
    }

    #[test]
    fn test_two_loans_rejected() {
        let anchor = d(2024, 1, 1);
        let err = LedgerBuilder::new(anchor, d(2025, 1, 1))
            .stream(Stream::Loan(loan(dec!(100), anchor)))
            .stream(Stream::Loan(loan(dec!(200), anchor)))
            .build()
            .unwrap_err();
        assert!(matches!(err, RealtyError::InvalidInput { .. }));
    }

    #[test]
    fn test_solver_flows_merge_same_date_and_drop_zero() {
        let day = d(2024, 3, 1);
        let mut ledger = Ledger::new();
        ledger.push(CashFlowEntry::new(d(2024, 1, 1), Decimal::ZERO, dec!(100), FlowKind::Acquisition, "a"));
        ledger.push(CashFlowEntry::new(d(2024, 2, 1), dec!(5), dec!(5), FlowKind::Periodic, "p"));
        ledger.push(CashFlowEntry::new(day, dec!(60), Decimal::ZERO, FlowKind::OneOff, "x"));
        ledger.push(CashFlowEntry::new(day, dec!(60), Decimal::ZERO, FlowKind::Disposal, "y"));

        let flows = ledger.solver_flows(TaxBasis::PostTax);
        assert_eq!(
            flows,
            vec![
                DatedAmount::new(d(2024, 1, 1), dec!(-100)),
                DatedAmount::new(day, dec!(120)),
            ]
        );
        let rows = ledger.rows();
        assert_eq!(rows.last().unwrap().cumulative_amount, dec!(20));
    }

    #[test]
    fn test_coupon_accrues_since_last_payment() {
        let anchor = d(2024, 1, 1);
        let coupon = CouponStream {
            face_value: dec!(365000),
            annual_coupon_rate: dec!(0.10),
            previous_coupon_date: d(2023, 12, 1),
            withholding_rate: dec!(0.10),
        };
        let built = LedgerBuilder::new(anchor, d(2024, 3, 1))
            .first_period(d(2024, 1, 5))
            .stream(Stream::Coupon(coupon))
            .build()
            .unwrap();

        let entries = built.ledger.entries();
        // Dec 1 -> Jan 5 is 35 days at 100/day
        assert_eq!(entries[0].detail.coupon_interest, Some(dec!(3500)));
        assert_eq!(entries[0].detail.tax_withheld, Some(dec!(350)));
        assert_eq!(entries[0].inflow, dec!(3150));
        // Jan 5 -> Feb 5 is 31 days
        assert_eq!(entries[1].detail.coupon_interest, Some(dec!(3100)));
        // Feb 5 -> Mar 1 is 25 days, paid in the horizon entry
        let last = entries.last().unwrap();
        assert_eq!(last.detail.coupon_interest, Some(dec!(2500)));
        assert_eq!(last.net(TaxBasis::PreTax), dec!(2500));
    }
}
