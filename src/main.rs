//! imgbot - Telegram image generation bot

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use imgbot::{Bot, Config};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Telegram image generation bot
#[derive(Parser, Debug)]
#[command(name = "imgbot", version, about = "Generate images from Telegram prompts")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the configured one
    #[arg(short, long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Secrets may live in .env
    dotenvy::dotenv().ok();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.db_path = Some(database);
    }
    config.validate()?;

    init_tracing(&config.error_log)?;

    let bot = Arc::new(Bot::new(config).await?);

    let signal_bot = bot.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal_bot.shutdown();
        }
    });

    bot.run().await?;

    Ok(())
}

/// Console output filtered by RUST_LOG, plus errors appended to `error_log`
fn init_tracing(error_log: &str) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(error_log)
        .with_context(|| format!("failed to open error log {}", error_log))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| "imgbot=info".into()),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_filter(LevelFilter::ERROR),
        )
        .init();

    Ok(())
}
