use clap::Args;
use serde_json::Value;
use tracing::debug;

use realty_returns_core::bond_carry::{self, BondCarryInput};

use crate::input;

/// Arguments for a loan-funded bond carry simulation
#[derive(Args)]
pub struct BondCarryArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_bond_carry(args: BondCarryArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let carry_input: BondCarryInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for bond carry".into());
    };
    debug!(
        loan = %carry_input.loan_amount,
        maturity = %carry_input.maturity_date,
        "running bond carry simulation"
    );
    let result = bond_carry::simulate_bond_carry(&carry_input)?;
    Ok(serde_json::to_value(result)?)
}
