use anyhow::Result;
use clap::Parser;
use livecast_engine::config::Config;
use livecast_engine::manager::StreamManager;
use livecast_engine::repository::sqlite::{
    self, SqliteChannelRepository, SqliteMediaRepository, SqlitePlaylistItemRepository,
};
use livecast_engine::repository::Repositories;
use livecast_engine::web::WebServer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "livecast-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Core engine for a 24/7 per-channel HLS streaming service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address (overrides config file)
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("livecast_engine={},tower_http=info", cli.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting livecast-engine v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(Some(&cli.config))?;
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let pool = sqlite::connect(&config.database).await?;
    sqlite::migrate(&pool).await?;
    info!(url = %config.database.url, "database connection established");

    let repositories = Repositories {
        channels: Arc::new(SqliteChannelRepository::new(pool.clone())),
        media: Arc::new(SqliteMediaRepository::new(pool.clone())),
        playlist_items: Arc::new(SqlitePlaylistItemRepository::new(pool)),
    };

    let manager = StreamManager::new(config.clone(), repositories);
    let handle = manager.start();
    info!("batch coordinator and cleanup sweep started");

    let server = WebServer::new(&config, manager.clone())?;

    tokio::select! {
        result = server.serve() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    manager.stop(handle).await;
    info!("livecast-engine stopped");
    Ok(())
}
