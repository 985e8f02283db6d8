use anyhow::Result;
use arca::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    arca::telemetry::init(cli.verbose);
    cli.run().await
}
