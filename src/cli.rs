//! Command line interface of `petablint`
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::problem::{LintReport, Problem, ProblemFiles};
use crate::settings::{read_settings, Settings};

/// Check a PEtab problem for correctness
#[derive(Debug, Parser)]
#[command(name = "petablint", version, about)]
pub struct Args {
    /// PEtab problem file (YAML)
    #[arg(short = 'y', long = "yaml", conflicts_with_all = ["measurements", "conditions", "observables", "parameters"])]
    pub yaml: Option<PathBuf>,

    /// Model file (JSON)
    #[arg(short = 's', long = "model")]
    pub model: Option<PathBuf>,

    /// Measurement table
    #[arg(short = 'm', long = "measurements")]
    pub measurements: Option<PathBuf>,

    /// Condition table
    #[arg(short = 'c', long = "conditions")]
    pub conditions: Option<PathBuf>,

    /// Observable table
    #[arg(short = 'o', long = "observables")]
    pub observables: Option<PathBuf>,

    /// Parameter table
    #[arg(short = 'p', long = "parameters")]
    pub parameters: Option<PathBuf>,

    /// Mapping table
    #[arg(long = "mapping")]
    pub mapping: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(long = "settings")]
    pub settings: Option<PathBuf>,

    /// More verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = read_settings(self.settings.as_deref())
            .context("Failed to read settings")?;
        if self.verbose {
            settings.log_level = "debug".to_string();
        }
        Ok(settings)
    }

    fn problem_files(&self) -> ProblemFiles {
        let list = |p: &Option<PathBuf>| p.iter().cloned().collect::<Vec<_>>();
        ProblemFiles {
            model: self.model.clone(),
            conditions: list(&self.conditions),
            measurements: list(&self.measurements),
            observables: list(&self.observables),
            parameters: list(&self.parameters),
            mapping: list(&self.mapping),
            experiments: Vec::new(),
        }
    }
}

/// Load the problem given on the command line
pub fn load_problem(args: &Args) -> Result<Problem> {
    if let Some(yaml) = &args.yaml {
        return Problem::from_yaml(yaml)
            .with_context(|| format!("Failed to load problem from {}", yaml.display()));
    }
    let files = args.problem_files();
    if files.measurements.is_empty()
        && files.conditions.is_empty()
        && files.observables.is_empty()
        && files.parameters.is_empty()
    {
        bail!("Neither a YAML file nor any table was given");
    }
    Problem::from_files(&files).context("Failed to load problem tables")
}

/// Lint the problem given on the command line
pub fn cmd_lint(args: &Args) -> Result<LintReport> {
    let problem = load_problem(args)?;
    tracing::info!("{}", problem);
    let report = problem.lint();
    report.log();
    Ok(report)
}
