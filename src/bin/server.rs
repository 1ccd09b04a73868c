//! slidekick server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use slidekick::SlidekickConfig;
use slidekick::inference::GeminiLiveConnector;
use slidekick::server::{RevealMdConverter, Services, SlidekickServer};
use slidekick::session::SessionSettings;
use slidekick::summary::GeminiTextGenerator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Voice-controlled slide deck backend.
#[derive(Parser)]
#[command(name = "slidekick-server", version, about)]
struct Cli {
    /// Path to TOML configuration file (defaults to the user config path).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(short, long)]
    port: Option<u16>,
}

/// How long shutdown waits for sessions and background work.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Load and validate the config. Also returns the env overrides that were
/// ignored, since logging is not installed yet.
fn load_config(cli: &Cli) -> anyhow::Result<(SlidekickConfig, Vec<String>)> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(SlidekickConfig::default_config_path);
    let mut config = if path.exists() {
        SlidekickConfig::from_file(&path)?
    } else if cli.config.is_some() {
        anyhow::bail!("config file not found: {}", path.display());
    } else {
        SlidekickConfig::default()
    };

    let ignored = config.apply_env_overrides();
    if let Some(host) = &cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    Ok((config, ignored))
}

/// Install stderr logging plus an optional daily-rolling file. The returned
/// guard flushes the file writer and must live until exit.
fn init_tracing(config: &SlidekickConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.logging.log_dir {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let appender = tracing_appender::rolling::daily(dir, "slidekick.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .ok();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, ignored_overrides) = load_config(&cli)?;
    let _log_guard = init_tracing(&config);
    for message in &ignored_overrides {
        warn!("{message}");
    }

    info!("slidekick v{}", env!("CARGO_PKG_VERSION"));

    let generator = GeminiTextGenerator::new(&config.summary, config.live.api_key.clone())?;
    let services = Services {
        connector: Arc::new(GeminiLiveConnector::new(config.live.clone())),
        generator: Some(Arc::new(generator)),
        converter: Arc::new(RevealMdConverter::new(
            config.server.converter_command.clone(),
        )?),
        session: SessionSettings::from(&config),
    };

    let mut server = SlidekickServer::start(&config.server, services).await?;
    info!(port = server.port(), "ready");

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");
    server.stop(SHUTDOWN_GRACE).await;

    Ok(())
}
