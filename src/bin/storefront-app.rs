use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use storefront::app::{AppState, router};
use storefront::config::SiteConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Site config (YAML). Compiled defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    storefront::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting storefront-app");

    let config = SiteConfig::load(args.config.as_deref()).context("load site config")?;
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; admin endpoints will reject every request");
    }
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "install ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
