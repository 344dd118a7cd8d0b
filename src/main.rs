use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    storefront::logging::init().context("init logging")?;

    let cli = storefront::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config =
        storefront::config::SiteConfig::load(cli.config.as_deref()).context("load site config")?;

    match cli.command {
        storefront::cli::Command::FetchListings(args) => {
            storefront::export::run(&config, args)
                .await
                .context("fetch-listings")?;
        }
        storefront::cli::Command::Listings(args) => {
            storefront::inspect::listings(&config, args)
                .await
                .context("listings")?;
        }
        storefront::cli::Command::Categorize(args) => {
            storefront::inspect::categorize(&config, args).context("categorize")?;
        }
    }

    Ok(())
}
