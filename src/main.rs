use anyhow::Result;
use clap::{Parser, Subcommand};
use rate_relay::cli;

#[derive(Parser)]
#[command(
    name = "rate-relay",
    about = "Scrapes P2P exchange-rate quotes and relays a representative price downstream",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP front door and the periodic scheduler (default)
    Serve {
        /// Listen port (overrides RELAY_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one extraction cycle and print the result as JSON
    Scrape,
    /// Run one full cycle: extract, then deliver to the destination
    Update,
    /// Diagnose listing-page selectors
    Inspect {
        /// Page to inspect (defaults to the configured listing URL)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => cli::serve::run(None).await,
        Some(Commands::Serve { port }) => cli::serve::run(port).await,
        Some(Commands::Scrape) => cli::scrape_cmd::run().await,
        Some(Commands::Update) => cli::update_cmd::run().await,
        Some(Commands::Inspect { url }) => cli::inspect_cmd::run(url.as_deref()).await,
    }
}
