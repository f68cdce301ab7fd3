mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::bond_carry::BondCarryArgs;
use commands::primitives::{AmortizeArgs, EmiArgs, LoanBalanceArgs, XirrArgs};
use commands::property::PropertyArgs;

/// Leveraged property and carry-trade returns
#[derive(Parser)]
#[command(
    name = "realty",
    version,
    about = "Leveraged real-estate and carry-trade return calculations",
    long_about = "Builds dated cash-flow ledgers for leveraged investments and reports \
                  XIRR, real returns, profit and a passive-market benchmark. \
                  All maths in 128-bit decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log solver and ledger diagnostics to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Leveraged property purchase held to a sale date
    Property(PropertyArgs),
    /// Borrow to buy coupon bonds, hold to maturity
    BondCarry(BondCarryArgs),
    /// Annualised internal rate of return of dated flows
    Xirr(XirrArgs),
    /// Level monthly instalment of a loan
    Emi(EmiArgs),
    /// Month-by-month amortization schedule
    Amortize(AmortizeArgs),
    /// Outstanding principal after a number of instalments
    LoanBalance(LoanBalanceArgs),
    /// Show version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("realty_returns_core=debug,realty=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // stdout carries the result, so logs stay on stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Property(args) => commands::property::run_property(args),
        Commands::BondCarry(args) => commands::bond_carry::run_bond_carry(args),
        Commands::Xirr(args) => commands::primitives::run_xirr(args),
        Commands::Emi(args) => commands::primitives::run_emi(args),
        Commands::Amortize(args) => commands::primitives::run_amortize(args),
        Commands::LoanBalance(args) => commands::primitives::run_loan_balance(args),
        Commands::Version => {
            println!("realty {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
