//! mirrorcat - voice occupancy mirror bot for Discord.
//!
//! Mirrors voice channel member counts into read-only status channel
//! names, with rename debouncing and crash recovery.

use mirrorcat::bot::{self, Handler};
use mirrorcat::config::Config;
use mirrorcat::registry::Database;
use mirrorcat::{http, metrics};
use serenity::all::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the subscriber so RUST_LOG from it takes effect.
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        status_category = %config.mirror.status_category,
        prefix = %config.bot.command_prefix,
        "Starting mirrorcat"
    );

    let token = std::env::var("DISCORD_TOKEN")
        .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN is not set; the bot cannot log in"))?;

    // The registry is optional: without it the bot still works, but
    // tracked channels do not survive a restart.
    let registry = match &config.database {
        Some(database) => match Database::new(&database.path).await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "Registry unavailable, running without persistence");
                None
            }
        },
        None => {
            info!("No database configured, running without persistence");
            None
        }
    };

    // Liveness and Prometheus metrics endpoint.
    // Convention: http_port = 0 disables the HTTP endpoint (used by tests).
    let http_port = config.server.effective_http_port();
    if http_port == 0 {
        info!("HTTP endpoint disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(http_port).await;
        });
        info!(port = http_port, "Liveness HTTP server started");
    }

    let handler = Handler::new(config, registry);
    let mut client = Client::builder(&token, bot::gateway_intents())
        .event_handler(handler)
        .await?;

    client.start().await?;

    Ok(())
}
