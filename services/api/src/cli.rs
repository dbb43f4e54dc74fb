use crate::demo::{run_demo, run_sweep, DemoArgs, SweepArgs};
use crate::server;
use caseflow::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Caseflow",
    about = "Distribute legal cases to lawyers and keep offers moving",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and background scheduler (default command)
    Serve(ServeArgs),
    /// Expire overdue offers in a marketplace snapshot and redistribute once
    Sweep(SweepArgs),
    /// Walk through distribution, expiry, retry limits and declines on sample data
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the in-memory marketplace from a JSON snapshot
    #[arg(long)]
    pub(crate) snapshot: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sweep(args) => run_sweep(args),
        Command::Demo(args) => run_demo(args),
    }
}
