use anyhow::Result;
use clap::{Parser, Subcommand};
use proxydeck_backend::api;
use proxydeck_backend::bootstrap;
use proxydeck_backend::config::DeckConfig;
use proxydeck_backend::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Control console for a fleet of rotating proxy workers")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP console: worker API plus operator pages
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();
    let config = DeckConfig::from_env();
    let resources = bootstrap::initialize(&config)?;

    tracing::info!(
        data_dir = %config.paths.data_dir.display(),
        directories_created = ?resources.directories_created,
        admin_path = %config.admin_path,
        "bootstrap complete"
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => api::serve_http(config, resources.services).await,
    }
}
