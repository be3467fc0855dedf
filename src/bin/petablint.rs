use std::process::ExitCode;

use clap::Parser;
use petab::cli::{cmd_lint, Args};
use petab::logger::setup_log;

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let settings = args.settings()?;
    setup_log(&settings.log_level)?;

    let report = cmd_lint(&args)?;
    if report.has_errors() {
        eprintln!("{}", report);
        return Ok(ExitCode::FAILURE);
    }
    if report.is_empty() {
        println!("PEtab format check completed successfully.");
    } else {
        println!("{}", report);
        println!("PEtab format check completed with warnings.");
    }
    Ok(ExitCode::SUCCESS)
}
