use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fxline::api::{self, AppState};
use fxline::config::ServerConfig;
use fxline::notify::{LogNotifier, Notifier, WebhookNotifier};
use fxline::scheduler::start_daily_scheduler;
use fxline::{Platform, PlatformOptions, Store};

#[derive(Parser, Debug)]
#[command(name = "fxline-node", version, about = "FXLine referral and investment platform")]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API (and the daily scheduler unless disabled)
    Serve,

    /// Run FS accrual and the counter reset once for a day, then exit
    RunDaily {
        /// YYYY-MM-DD (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Recompute cached level counts from the tree and repair drift
    Reconcile,
}

fn init_tracing() {
    let filter = std::env::var("FXLINE_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn build_notifier(config: &ServerConfig) -> Result<Arc<dyn Notifier>> {
    Ok(match config.mail_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    })
}

fn open_platform(config: &ServerConfig) -> Result<Arc<Platform>> {
    let store = Store::open(&config.data_dir)
        .map_err(|e| anyhow!("failed to open store at {}: {}", config.data_dir.display(), e))?;
    let options = PlatformOptions {
        sponsor_id_max_attempts: config.sponsor_id_max_attempts,
        ..PlatformOptions::default()
    };
    let platform = Platform::new(store, build_notifier(config)?, options)?;
    Ok(Arc::new(platform))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = ServerConfig::load()?;

    let admin_token_mask = match config.admin_token.as_deref() {
        Some(t) => format!("set (len={})", t.len()),
        None => "unset".to_string(),
    };
    info!(admin_token = %admin_token_mask, data_dir = %config.data_dir.display(), "fxline starting up");

    let platform = open_platform(&config)?;

    match cli.cmd.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, platform).await,
        Commands::RunDaily { date } => {
            let day = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = platform.jobs.run_day(day).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            platform.store.flush()?;
            Ok(())
        }
        Commands::Reconcile => {
            let report = platform.referrals.reconcile_all()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            platform.store.flush()?;
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig, platform: Arc<Platform>) -> Result<()> {
    if config.scheduler_enabled {
        start_daily_scheduler(
            platform.jobs.clone(),
            config.accrual_hour_utc,
            config.reset_hour_utc,
            config.scheduler_tick_secs,
        );
    } else {
        info!("[SCHEDULER] disabled by config");
    }

    let state = AppState::new(platform.clone(), config.admin_token.clone());
    let app = api::router(state, config.max_body_bytes, &config.cors_origins);

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;
    info!(listen = %addr, "fxline listening");

    let store = platform.store.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested, flushing store");
            if let Err(e) = store.flush() {
                tracing::error!("store flush failed: {}", e);
            }
        })
        .await?;
    Ok(())
}
