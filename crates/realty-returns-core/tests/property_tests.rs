use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use realty_returns_core::amortization::calculate_loan_balance;
use realty_returns_core::ledger::{Escalation, LedgerBuilder, RecurringStream, Stream, TaxBasis};
use realty_returns_core::property::{simulate_property_returns, PropertyInvestmentInput};
use realty_returns_core::RealtyError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// 10M purchase, 8M loan at 8.5% over 20 years, held 3 years, sold at 15M,
/// 50k monthly rent and 100k annual expenses.
fn reference_input() -> PropertyInvestmentInput {
    let json = r#"{
        "purchase_price": "10000000",
        "purchase_date": "2023-10-16",
        "loan": {
            "principal": "8000000",
            "annual_rate": "0.085",
            "term_months": 240
        },
        "income": [ { "amount": "50000" } ],
        "expenses": [ { "amount": "100000", "frequency": "annual" } ],
        "sale_price": "15000000",
        "sale_date": "2026-10-16",
        "inflation_rate": "0.06"
    }"#;
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_reference_scenario_ledger_shape() {
    let output = simulate_property_returns(&reference_input()).unwrap();
    let rows = &output.result.cash_flows;

    assert_eq!(rows[0].date, d(2023, 10, 16));
    assert_eq!(rows[0].net_flow, dec!(-2000000));
    assert_eq!(rows[0].inflow, dec!(8000000));
    assert_eq!(rows[0].outflow, dec!(10000000));

    let last = rows.last().unwrap();
    assert_eq!(last.date, d(2026, 10, 16));
    let balance = calculate_loan_balance(dec!(8000000), dec!(0.085), 240, 36);
    assert_eq!(output.result.outstanding_loan_at_exit, balance);
    assert_eq!(last.inflow, dec!(15000000));
    // the final entry carries the sale, the 36th instalment and the payoff
    let emi = output.result.emi;
    let expected_net = dec!(15000000) - balance - emi;
    assert!((last.net_flow - expected_net).abs() < dec!(0.000001));

    // anchor + 35 monthly entries + exit
    assert_eq!(rows.len(), 37);
    for row in rows.windows(2) {
        assert!(row[0].date <= row[1].date);
    }
}

#[test]
fn test_reference_scenario_returns() {
    let result = simulate_property_returns(&reference_input()).unwrap().result;

    let nominal = result.nominal_xirr.rate().expect("nominal XIRR should solve");
    assert!(nominal > Decimal::ZERO);
    let real = result.real_xirr.rate().expect("real XIRR should solve");
    assert!((real - ((Decimal::ONE + nominal) / dec!(1.06) - Decimal::ONE)).abs() < dec!(0.0000001));

    assert_eq!(
        result.nominal_profit,
        result.total_inflows - result.total_outflows
    );
    assert!(result.real_profit < result.nominal_profit);
    assert_eq!(result.holding_period_days, 1096);
}

#[test]
fn test_zero_inflation_real_equals_nominal() {
    let mut input = reference_input();
    input.inflation_rate = Decimal::ZERO;
    let result = simulate_property_returns(&input).unwrap().result;
    assert_eq!(result.real_profit, result.nominal_profit);
    assert_eq!(result.real_xirr.rate(), result.nominal_xirr.rate());
}

#[test]
fn test_disposal_costs_and_one_offs_reduce_profit() {
    let base = simulate_property_returns(&reference_input()).unwrap().result;

    let mut input = reference_input();
    input.disposal_costs = dec!(300000);
    input.one_off_flows = serde_json::from_str(
        r#"[{ "date": "2024-06-01", "amount": "-50000", "description": "Stamp duty" }]"#,
    )
    .unwrap();
    let taxed = simulate_property_returns(&input).unwrap().result;

    let difference = base.nominal_profit - taxed.nominal_profit;
    assert!((difference - dec!(350000)).abs() < dec!(0.000001), "got {difference}");
    assert!(taxed.nominal_xirr.rate().unwrap() < base.nominal_xirr.rate().unwrap());
}

#[test]
fn test_zero_holding_period_rejected() {
    let mut input = reference_input();
    input.sale_date = input.purchase_date;
    assert!(matches!(
        simulate_property_returns(&input),
        Err(RealtyError::InvalidInput { .. })
    ));
}

#[test]
fn test_month_end_purchase_keeps_day_of_month() {
    let built = LedgerBuilder::new(d(2024, 1, 31), d(2024, 6, 1))
        .stream(Stream::Acquisition {
            date: d(2024, 1, 31),
            price: dec!(1000),
        })
        .stream(Stream::RecurringIncome(
            RecurringStream::monthly(dec!(10)).escalating(Escalation::None),
        ))
        .stream(Stream::Disposal {
            date: d(2024, 6, 1),
            price: dec!(1100),
            costs: Decimal::ZERO,
        })
        .build()
        .unwrap();

    let dates: Vec<NaiveDate> = built.ledger.entries().iter().map(|e| e.date).collect();
    assert_eq!(
        dates,
        vec![
            d(2024, 1, 31),
            d(2024, 2, 29),
            d(2024, 3, 31),
            d(2024, 4, 30),
            d(2024, 5, 31),
            d(2024, 6, 1),
        ]
    );
    assert_eq!(built.ledger.net_total(TaxBasis::PostTax), dec!(140));
}
