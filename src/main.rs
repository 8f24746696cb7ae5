use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use wordpress_mcp_rs::config::{AppConfig, DEFAULT_CONFIG_PATH};
use wordpress_mcp_rs::diagnostics::Diagnostics;
use wordpress_mcp_rs::logging::{init_logging, LogConfig};
use wordpress_mcp_rs::{McpServer, WordPressHandler};

#[derive(Parser, Debug)]
#[command(name = "wordpress-mcp-rs", version, about = "Multi-site WordPress publishing over MCP")]
struct Cli {
    /// Site configuration file
    #[arg(short, long, env = "WP_MCP_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Log filter, overrides logging.level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server (default)
    Serve {
        /// Listen on TCP instead of stdio, e.g. 127.0.0.1:8080
        #[arg(long)]
        bind: Option<String>,
    },
    /// Check configuration, credentials and connectivity
    Diagnose {
        /// Skip network checks
        #[arg(long)]
        offline: bool,
    },
    /// Write a sample configuration file
    GenerateConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(&cli.config, cli.log_level, bind).await,
        Command::Diagnose { offline } => diagnose(&cli.config, cli.log_level, offline).await,
        Command::GenerateConfig { force } => generate_config(&cli.config, force),
    }
}

async fn serve(config_path: &Path, log_level: Option<String>, bind: Option<String>) -> Result<()> {
    let config = AppConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let mut log_config = LogConfig::from(&config.logging);
    if let Some(level) = log_level {
        log_config = log_config.with_level(level);
    }
    let _guard = init_logging(&log_config)?;

    info!("Starting wordpress-mcp-rs {}", env!("CARGO_PKG_VERSION"));
    let handler = WordPressHandler::from_config(&config)?;
    let server = McpServer::new(Arc::new(handler));

    match bind {
        Some(addr) => server.run(&addr).await?,
        None => server.run_stdio().await?,
    }
    info!("Server stopped");
    Ok(())
}

async fn diagnose(config_path: &Path, log_level: Option<String>, offline: bool) -> Result<()> {
    let log_config = LogConfig::default().with_level(log_level.unwrap_or_else(|| "warn".to_string()));
    let _guard = init_logging(&log_config)?;

    let mut diagnostics = Diagnostics::new(config_path);
    if offline {
        diagnostics = diagnostics.offline();
    }
    let report = diagnostics.run().await;
    println!("{}", report.render_text());

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn generate_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    AppConfig::generate_sample_config(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("Sample configuration written to {}", path.display());
    Ok(())
}
