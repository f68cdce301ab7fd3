use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use realty_returns_core::amortization::LoanStatus;
use realty_returns_core::ledger::RecurringStream;
use realty_returns_core::property::{self, LoanInput, PropertyInvestmentInput};
use realty_returns_core::time_value::SolverConfig;

use crate::input;

/// Arguments for a leveraged property simulation
#[derive(Args)]
pub struct PropertyArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Purchase price of the property
    #[arg(long)]
    pub purchase_price: Option<Decimal>,

    /// Purchase date (YYYY-MM-DD)
    #[arg(long)]
    pub purchase_date: Option<NaiveDate>,

    /// Amount borrowed against the purchase
    #[arg(long)]
    pub loan_amount: Option<Decimal>,

    /// Annual loan interest rate (e.g. 0.085)
    #[arg(long)]
    pub loan_rate: Option<Decimal>,

    /// Loan tenure in months
    #[arg(long)]
    pub loan_term_months: Option<u32>,

    /// Monthly rent received
    #[arg(long)]
    pub monthly_rent: Option<Decimal>,

    /// Annual maintenance and holding costs
    #[arg(long)]
    pub annual_expenses: Option<Decimal>,

    /// Expected sale price
    #[arg(long)]
    pub sale_price: Option<Decimal>,

    /// Sale date (YYYY-MM-DD)
    #[arg(long)]
    pub sale_date: Option<NaiveDate>,

    /// Tax and fees paid on the sale
    #[arg(long, default_value = "0")]
    pub disposal_costs: Decimal,

    /// Annual inflation rate
    #[arg(long, default_value = "0")]
    pub inflation: Decimal,

    /// Annual return of the passive market alternative
    #[arg(long, allow_hyphen_values = true)]
    pub market_return: Option<Decimal>,
}

pub fn run_property(args: PropertyArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let property_input: PropertyInvestmentInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        from_flags(args)?
    };

    debug!(
        purchase = %property_input.purchase_date,
        sale = %property_input.sale_date,
        leveraged = property_input.loan.is_some(),
        "running property simulation"
    );
    let result = property::simulate_property_returns(&property_input)?;
    Ok(serde_json::to_value(result)?)
}

fn from_flags(args: PropertyArgs) -> Result<PropertyInvestmentInput, Box<dyn std::error::Error>> {
    let purchase_price = args
        .purchase_price
        .ok_or("--purchase-price is required (or provide --input)")?;
    let purchase_date = args
        .purchase_date
        .ok_or("--purchase-date is required (or provide --input)")?;
    let sale_price = args
        .sale_price
        .ok_or("--sale-price is required (or provide --input)")?;
    let sale_date = args
        .sale_date
        .ok_or("--sale-date is required (or provide --input)")?;

    let loan = match args.loan_amount {
        Some(principal) if !principal.is_zero() => Some(LoanInput {
            principal,
            annual_rate: args.loan_rate.ok_or("--loan-rate is required with --loan-amount")?,
            term_months: args
                .loan_term_months
                .ok_or("--loan-term-months is required with --loan-amount")?,
            start_date: None,
            first_due_date: None,
            status: LoanStatus::Running,
        }),
        _ => None,
    };

    Ok(PropertyInvestmentInput {
        purchase_price,
        purchase_date,
        loan,
        income: args.monthly_rent.map(RecurringStream::monthly).into_iter().collect(),
        expenses: args.annual_expenses.map(RecurringStream::annual).into_iter().collect(),
        one_off_flows: Vec::new(),
        sale_price,
        sale_date,
        disposal_costs: args.disposal_costs,
        inflation_rate: args.inflation,
        market_return: args.market_return,
        solver: SolverConfig::default(),
    })
}
