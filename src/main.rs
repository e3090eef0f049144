use accountability_ledger::{report, utils, Args};
use anyhow::Result;
use clap::Parser;
use tracing::error;

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);
    utils::validate_args(&args)?;

    if let Err(e) = report::run(&args) {
        error!(action = "fail", component = "main", error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}
