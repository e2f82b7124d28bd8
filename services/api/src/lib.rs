mod cli;
mod commands;
mod infra;
mod routes;
mod server;

use intake_gateway::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
