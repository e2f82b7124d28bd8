use crate::commands::{run_export, run_seed, ExportArgs, SeedArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use intake_gateway::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Charity Intake Gateway",
    about = "Serve the charity website's form intake API and manage its spending data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Write the spending collection as CSV
    Export(ExportArgs),
    /// Append spending records from a JSON array file
    Seed(SeedArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Export(args) => run_export(args).await,
        Command::Seed(args) => run_seed(args).await,
    }
}
