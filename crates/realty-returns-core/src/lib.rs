pub mod amortization;
pub mod calendar;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod time_value;
pub mod types;

#[cfg(feature = "property")]
pub mod property;

#[cfg(feature = "bond_carry")]
pub mod bond_carry;

pub use error::RealtyError;
pub use types::*;

/// Standard result type for all realty-returns computations
pub type RealtyResult<T> = Result<T, RealtyError>;
