// Vigil security data engine
// Main entry point for the vigil binary

use clap::Parser;
use vigil_engine::cli::{CacheAction, Cli, Command};
use vigil_engine::config::Config;
use vigil_engine::handlers::{
    handle_analyze, handle_cache_list, handle_cache_show, handle_route, handle_sources,
    handle_tool, handle_tools, OutputFormat,
};
use vigil_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Vigil v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Analyze { query } => {
            tracing::info!("Analyzing: {}", query);
            handle_analyze(query, &config, format).await
        }

        Command::Sources => handle_sources(&config, format).await,

        Command::Tool { name, args } => {
            tracing::info!("Dispatching tool: {}", name);
            handle_tool(name, args, &config, format).await
        }

        Command::Tools => handle_tools(format),

        Command::Route { query } => handle_route(query, format),

        Command::Cache { action } => {
            tracing::info!("Cache inspection: {:?}", action);
            match action {
                CacheAction::List { limit } => handle_cache_list(limit, &config, format).await,
                CacheAction::Show { key } => handle_cache_show(key, &config, format).await,
            }
        }
    }
}
