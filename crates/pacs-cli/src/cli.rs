use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "PaCS-RS Contributors",
    version,
    about = "PaCS CLI - Drives parallel cascade selection molecular dynamics trials on GROMACS, AMBER or NAMD.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to this file instead of the trial's run log
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a trial, resuming it if an earlier run was interrupted.
    Run(TrialArgs),
    /// Print how far each cycle of a trial has progressed, without running anything.
    Status(TrialArgs),
}

/// Arguments shared by every subcommand that addresses a trial.
#[derive(Args, Debug, Clone)]
pub struct TrialArgs {
    /// Trial number (1 to 999).
    #[arg(short, long, required = true, value_name = "INT")]
    pub trial: u32,

    /// Path to the trial configuration file in TOML format.
    #[arg(short = 'f', long = "file", required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override `max-cycle` from the config file.
    #[arg(long, value_name = "INT")]
    pub max_cycle: Option<u32>,

    /// Override `n-replica` from the config file.
    #[arg(long, value_name = "INT")]
    pub n_replica: Option<u32>,

    /// Override `n-parallel` from the config file.
    #[arg(long, value_name = "INT")]
    pub n_parallel: Option<usize>,

    /// Override `working-dir` from the config file.
    #[arg(long, value_name = "PATH")]
    pub working_dir: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S analysis.threshold=0.15
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}
