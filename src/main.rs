use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailpixel::link::CidArgs;
use mailpixel::RuntimeConfig;
use std::path::PathBuf;
use tracing::info;

/// Email open-tracking pixel service backed by a spreadsheet
#[derive(Parser)]
#[command(name = "mailpixel")]
#[command(version)]
#[command(about = "Email open-tracking pixel service backed by a spreadsheet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT", global = true)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tracking identifier and pixel URL for one email
    Cid(CidArgs),
    /// Start the HTTP server (default if no subcommand given)
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Cid(args)) => args.run(),
        Some(Commands::Serve) | None => run_server(cli),
    }
}

fn run_server(cli: Cli) -> Result<()> {
    // Build tokio runtime and run async server
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try default locations, fall back to defaults
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    // Step 3: Initialize tracing early; run_with_config calls it again (idempotent)
    mailpixel::init_tracing(&config.server);
    display_startup_info(&config);

    // Step 4: Run server with resolved config
    mailpixel::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
}

fn display_startup_info(config: &RuntimeConfig) {
    info!("╭─────────────────────────────────────────────────");
    info!("│ mailpixel v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Listen address: http://{}", config.server.listen_addr);
    info!("│ Sheet: {}", config.sheets.sheet_name);
    match config.sheets.document_id.as_deref() {
        Some(id) if !id.trim().is_empty() => info!("│ Document: {}", id.trim()),
        _ => info!("│ Document: (not configured)"),
    }
    info!("│ Dedup window: {} ms", config.tracking.dedup_window_ms);
    info!(
        "│ Create missing rows: {}",
        if config.tracking.create_missing_rows {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!("│ Log level: {}", config.server.log_level);
    info!("╰─────────────────────────────────────────────────");
}
