use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sgx_client::{RetryPolicy, SgxClient, SgxClientConfig};
use sgxpipe_common::Config;
use sgxpipe_crawler::{LocalStorage, Pipeline};
use sgxpipe_store::{IngestionStore, MemoryStore};

#[derive(Parser)]
#[command(name = "sgxpipe", about = "Crawl and ingest corporate disclosure filings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Source the company catalog and seed the crawl queue
    Seed,
    /// Seed the queue, then crawl every pending company
    Run,
    /// Reset stalled queue entries back to pending
    Recover,
    /// Link the securities ticker list to canonical companies
    Tickers,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let client = Arc::new(SgxClient::new(SgxClientConfig {
        company_api_url: config.company_api_url.clone(),
        count_api_url: config.count_api_url.clone(),
        corporate_info_url: config.corporate_info_url.clone(),
        securities_url: config.securities_url.clone(),
        cms_url: config.cms_url.clone(),
        origin: "https://www.sgx.com".to_string(),
        period_start: config.period_start.clone(),
        period_end: config.period_end.clone(),
        timeout: config.request_timeout,
        retry: RetryPolicy::new(config.max_retries, config.backoff_factor, config.request_timeout),
    }));
    let storage = Arc::new(LocalStorage::new(&config.raw_data_dir));
    let ingest = IngestionStore::new(MemoryStore::new());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let pipeline = Pipeline::new(client, storage, ingest, config, cancel);

    match cli.command {
        Command::Seed => {
            let seeded = pipeline.seed().await?;
            info!(seeded, "Company queue seeded");
        }
        Command::Run => {
            pipeline.seed().await?;
            pipeline.run().await?;
        }
        Command::Recover => {
            let reset = pipeline.recover().await?;
            info!(reset, "Queue entries reset to pending");
        }
        Command::Tickers => {
            pipeline.seed().await?;
            for link in pipeline.link_tickers().await? {
                match link.matched_name {
                    Some(name) => info!(
                        ticker = link.ticker.as_str(),
                        company = name.as_str(),
                        confidence = link.confidence,
                        "Linked"
                    ),
                    None => info!(
                        ticker = link.ticker.as_str(),
                        display_name = link.display_name.as_str(),
                        "Unlinked"
                    ),
                }
            }
        }
    }

    Ok(())
}
