//! CLI argument parsing for the conformance harness.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "challenger",
    version,
    about = "Conformance harness for the API Challenges task-tracking service",
    after_help = "Commands:\n  run                          Run every challenge scenario against the service\n  catalog                      List the declared challenge catalog\n  progress --session <id>      Show a session's progress snapshot\n  init --config <path>         Write a config stub\n\nExamples:\n  challenger init --config challenger.json\n  challenger run --config challenger.json\n  challenger run --base-url http://localhost:4567/ --only 1,2,3 --json\n  challenger progress --session 0f1e2d3c --database",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Log every exchange (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Catalog(CatalogArgs),
    Progress(ProgressArgs),
    Init(InitArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Run the challenge scenarios against a live service")]
pub struct RunArgs {
    /// Config file (defaults to ./challenger.json when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Service base URL, overriding the config file
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Per-request timeout, overriding the config file
    #[arg(long, value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Only run these challenge ids (session creation always runs)
    #[arg(
        long,
        value_name = "ID,ID..",
        value_delimiter = ',',
        value_parser = clap::value_parser!(u8).range(1..=59)
    )]
    pub only: Vec<u8>,

    /// Do not re-query the service catalog after the run
    #[arg(long)]
    pub skip_reconcile: bool,

    /// Emit the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "List the declared challenge catalog")]
pub struct CatalogArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Fetch the progress snapshot of an existing session")]
pub struct ProgressArgs {
    /// Session identifier (the X-CHALLENGER value)
    #[arg(long, value_name = "ID")]
    pub session: String,

    /// Read the durable-storage document instead of the live snapshot
    #[arg(long)]
    pub database: bool,

    /// Config file (defaults to ./challenger.json when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Service base URL, overriding the config file
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Emit the raw document as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Write a harness config stub")]
pub struct InitArgs {
    /// Where to write the config
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}
