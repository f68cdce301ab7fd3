use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::calendar::year_fraction;
use crate::error::RealtyError;
use crate::ledger::Ledger;
use crate::time_value::{compound_factor, RateOutcome};
use crate::types::{DatedAmount, Money, Rate};
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Profit
// ---------------------------------------------------------------------------

/// Simple sum of every inflow less every outflow.
pub fn nominal_profit(ledger: &Ledger) -> Money {
    ledger.total_inflows() - ledger.total_outflows()
}

/// Nominal profit deflated over the holding period:
/// `nominal / (1 + inflation)^(days/365)`.
pub fn real_profit(
    nominal: Money,
    inflation: Rate,
    anchor: NaiveDate,
    horizon: NaiveDate,
) -> RealtyResult<Money> {
    if horizon <= anchor {
        return Err(RealtyError::invalid(
            "holding_period",
            "Holding period must be longer than zero days",
        ));
    }
    validate_inflation(inflation)?;
    if inflation.is_zero() {
        return Ok(nominal);
    }
    let factor = compound_factor(inflation, year_fraction(anchor, horizon))?;
    Ok(nominal / factor)
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Fisher relation `(1 + n) / (1 + i) - 1`.
pub fn fisher_real_rate(nominal: Rate, inflation: Rate) -> RealtyResult<Rate> {
    if nominal == dec!(-1) {
        return Err(RealtyError::invalid("nominal_rate", "Real rate is undefined for a -100% nominal rate"));
    }
    if inflation == dec!(-1) {
        return Err(RealtyError::DivisionByZero {
            context: "Fisher real rate with -100% inflation".into(),
        });
    }
    if inflation.is_zero() {
        return Ok(nominal);
    }
    Ok((Decimal::ONE + nominal) / (Decimal::ONE + inflation) - Decimal::ONE)
}

/// Real rate carried through a [`RateOutcome`]; unsolved nominals pass
/// through unchanged.
pub fn real_rate(nominal: &RateOutcome, inflation: Rate) -> RateOutcome {
    match nominal {
        RateOutcome::Solved { rate, iterations } => match fisher_real_rate(*rate, inflation) {
            Ok(real) => RateOutcome::Solved {
                rate: real,
                iterations: *iterations,
            },
            Err(e) => RateOutcome::NotComputable {
                reason: e.to_string(),
            },
        },
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnBasis {
    Equity,
    /// Fully financed purchase, measured against the asset price
    AssetPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteReturn {
    pub rate: Rate,
    pub basis: ReturnBasis,
}

/// Profit over equity; falls back to the asset price when no equity was put in.
pub fn absolute_return(profit: Money, equity: Money, asset_price: Money) -> Option<AbsoluteReturn> {
    if equity > Decimal::ZERO {
        Some(AbsoluteReturn {
            rate: profit / equity,
            basis: ReturnBasis::Equity,
        })
    } else if equity.is_zero() && asset_price > Decimal::ZERO {
        Some(AbsoluteReturn {
            rate: profit / asset_price,
            basis: ReturnBasis::AssetPrice,
        })
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Inflation
// ---------------------------------------------------------------------------

/// Restate each flow in `base`-date money.
pub fn deflate_flows(flows: &[DatedAmount], base: NaiveDate, inflation: Rate) -> RealtyResult<Vec<DatedAmount>> {
    validate_inflation(inflation)?;
    flows
        .iter()
        .map(|f| {
            let factor = compound_factor(inflation, year_fraction(base, f.date))?;
            Ok(DatedAmount::new(f.date, f.amount / factor))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Market benchmark
// ---------------------------------------------------------------------------

/// What the same cash movements would have grown to in a passive market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBenchmark {
    pub market_rate: Rate,
    /// Σ |amount| of every movement up to the horizon
    pub total_injected: Money,
    pub future_value: Money,
    /// `future_value - total_injected`
    pub appreciation: Money,
}

/// Every movement, in or out, treated as money put into the market and
/// compounded to `horizon`. Movements after the horizon are ignored.
pub fn market_future_value(flows: &[DatedAmount], market_rate: Rate, horizon: NaiveDate) -> RealtyResult<Money> {
    validate_market_rate(market_rate)?;
    let mut fv = Decimal::ZERO;
    for flow in flows.iter().filter(|f| f.date <= horizon) {
        let factor = compound_factor(market_rate, year_fraction(flow.date, horizon))?;
        fv += flow.amount.abs() * factor;
    }
    Ok(fv)
}

/// Running market value after each movement, in input order.
pub fn running_market_value(flows: &[DatedAmount], market_rate: Rate) -> RealtyResult<Vec<Money>> {
    validate_market_rate(market_rate)?;
    let mut values = Vec::with_capacity(flows.len());
    let mut running = Decimal::ZERO;
    let mut previous: Option<NaiveDate> = None;

    for flow in flows {
        if let Some(prev) = previous {
            running *= compound_factor(market_rate, year_fraction(prev, flow.date))?;
        }
        running += flow.amount.abs();
        values.push(running);
        previous = Some(flow.date);
    }
    Ok(values)
}

pub fn market_appreciation(flows: &[DatedAmount], future_value: Money) -> Money {
    future_value - total_injected(flows)
}

pub fn market_benchmark(flows: &[DatedAmount], market_rate: Rate, horizon: NaiveDate) -> RealtyResult<MarketBenchmark> {
    let future_value = market_future_value(flows, market_rate, horizon)?;
    let injected: Vec<DatedAmount> = flows.iter().copied().filter(|f| f.date <= horizon).collect();
    Ok(MarketBenchmark {
        market_rate,
        total_injected: total_injected(&injected),
        future_value,
        appreciation: market_appreciation(&injected, future_value),
    })
}

fn total_injected(flows: &[DatedAmount]) -> Money {
    flows.iter().map(|f| f.amount.abs()).sum()
}

fn validate_inflation(inflation: Rate) -> RealtyResult<()> {
    if inflation <= dec!(-1) {
        return Err(RealtyError::invalid("inflation_rate", "Inflation must be greater than -100%"));
    }
    Ok(())
}

fn validate_market_rate(rate: Rate) -> RealtyResult<()> {
    if rate <= dec!(-1) {
        return Err(RealtyError::invalid("market_return", "Market return must be greater than -100%"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CashFlowEntry, FlowKind};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_nominal_profit_is_simple_sum() {
        let mut ledger = Ledger::new();
        ledger.push(CashFlowEntry::new(d(2024, 1, 1), dec!(800), dec!(1000), FlowKind::Acquisition, "buy"));
        ledger.push(CashFlowEntry::new(d(2024, 2, 1), dec!(50), dec!(20), FlowKind::Periodic, "month"));
        ledger.push(CashFlowEntry::new(d(2025, 1, 1), dec!(1200), dec!(790), FlowKind::Disposal, "sell"));
        assert_eq!(nominal_profit(&ledger), dec!(240));
    }

    #[test]
    fn test_real_profit_equals_nominal_at_zero_inflation() {
        let nominal = dec!(12345.67);
        let real = real_profit(nominal, Decimal::ZERO, d(2023, 10, 16), d(2026, 10, 16)).unwrap();
        assert_eq!(real, nominal);
    }

    #[test]
    fn test_real_profit_deflates() {
        let real = real_profit(dec!(1100), dec!(0.10), d(2023, 1, 1), d(2024, 1, 1)).unwrap();
        assert_eq!(real, dec!(1000));
    }

    #[test]
    fn test_real_profit_rejects_zero_holding_period() {
        let day = d(2024, 5, 1);
        assert!(matches!(
            real_profit(dec!(10), dec!(0.05), day, day),
            Err(RealtyError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_fisher_real_rate() {
        let real = fisher_real_rate(dec!(0.155), dec!(0.05)).unwrap();
        assert_eq!(real, dec!(0.10));
        assert!(fisher_real_rate(dec!(0.1), dec!(-1)).is_err());
        assert!(fisher_real_rate(dec!(-1), dec!(0.05)).is_err());
    }

    #[test]
    fn test_real_rate_passes_failures_through() {
        let failed = RateOutcome::DidNotConverge {
            iterations: 100,
            last_npv: dec!(3),
        };
        assert_eq!(real_rate(&failed, dec!(0.05)), failed);

        let solved = RateOutcome::Solved {
            rate: dec!(0.155),
            iterations: 4,
        };
        assert_eq!(real_rate(&solved, dec!(0.05)).rate(), Some(dec!(0.10)));
    }

    #[test]
    fn test_absolute_return_bases() {
        let on_equity = absolute_return(dec!(500), dec!(2000), dec!(10000)).unwrap();
        assert_eq!(on_equity.rate, dec!(0.25));
        assert_eq!(on_equity.basis, ReturnBasis::Equity);

        let financed = absolute_return(dec!(500), Decimal::ZERO, dec!(10000)).unwrap();
        assert_eq!(financed.rate, dec!(0.05));
        assert_eq!(financed.basis, ReturnBasis::AssetPrice);

        assert!(absolute_return(dec!(500), dec!(-1), dec!(10000)).is_none());
    }

    #[test]
    fn test_deflate_flows() {
        let flows = vec![
            DatedAmount::new(d(2023, 1, 1), dec!(-1000)),
            DatedAmount::new(d(2024, 1, 1), dec!(1100)),
        ];
        let real = deflate_flows(&flows, d(2023, 1, 1), dec!(0.10)).unwrap();
        assert_eq!(real[0].amount, dec!(-1000));
        assert_eq!(real[1].amount, dec!(1000));
    }

    #[test]
    fn test_market_benchmark_uses_absolute_values() {
        let flows = vec![
            DatedAmount::new(d(2023, 1, 1), dec!(-1000)),
            DatedAmount::new(d(2024, 1, 1), dec!(-100)),
            DatedAmount::new(d(2025, 1, 1), dec!(500)),
            DatedAmount::new(d(2026, 1, 1), dec!(999)),
        ];
        let horizon = d(2024, 1, 1);
        let bench = market_benchmark(&flows, dec!(0.10), horizon).unwrap();
        // the 2025 and 2026 flows fall after the horizon
        assert_eq!(bench.future_value, dec!(1200));
        assert_eq!(bench.total_injected, dec!(1100));
        assert_eq!(bench.appreciation, dec!(100));
    }

    #[test]
    fn test_running_market_value() {
        let flows = vec![
            DatedAmount::new(d(2023, 1, 1), dec!(-1000)),
            DatedAmount::new(d(2024, 1, 1), dec!(200)),
        ];
        let running = running_market_value(&flows, dec!(0.10)).unwrap();
        assert_eq!(running, vec![dec!(1000), dec!(1300)]);
    }
}
