use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use ember_server::bootstrap;
use ember_server::config::ServerConfig;
use ember_server::feed;

/// Rule-driven alert batching and incident escalation. Reads JSON-lines
/// events and alerts from stdin.
#[derive(Parser, Debug)]
#[command(name = "ember", version, about)]
struct Cli {
    /// Path to the TOML config file. Built-in defaults apply when absent.
    #[arg(long, env = "EMBER_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `ember=debug`. Overrides RUST_LOG.
    #[arg(long, env = "EMBER_LOG")]
    log_filter: Option<String>,
}

fn init_tracing(directive: Option<&str>) -> anyhow::Result<()> {
    let filter = match directive {
        Some(d) => EnvFilter::try_new(d)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ember=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref())?;

    let config = match &cli.config {
        Some(path) => {
            let config = ServerConfig::load(path)?;
            tracing::info!(path = %path.display(), "loaded config");
            config
        }
        None => ServerConfig::default(),
    };

    let ctx = bootstrap::build_context(&config).await?;
    ctx.start();
    tracing::info!("ember started");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let result = feed::run(&ctx, BufReader::new(tokio::io::stdin()), shutdown).await;

    ctx.stop().await;
    let stats = result?;
    tracing::info!(
        records = stats.records,
        rejected = stats.rejected,
        incidents_opened = stats.incidents_opened,
        "ember stopped"
    );
    Ok(())
}
