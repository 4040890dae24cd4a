//! HTTP server for the order book.
//!
//! Configuration is read from the environment; see [`dire_order_book::config`].
//! With `JOURNAL_PATH` set, the journal is replayed before the listener opens.

use dire_order_book::api::{self, ApiConfig};
use dire_order_book::config::ServerConfig;
use dire_order_book::journal::FileJournal;
use dire_order_book::BookRegistry;
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    if let Err(e) = run().await {
        error!("server failed err={}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    let registry = match &config.journal_path {
        Some(path) => {
            let entries = FileJournal::load(path)?;
            let journal = FileJournal::open(path)?;
            let registry = BookRegistry::with_journal(Arc::new(journal));
            let applied = registry.recover(&entries)?;
            info!("journal replayed path={} entries={}", path.display(), applied);
            registry
        }
        None => BookRegistry::new(),
    };
    for market_id in &config.limit_markets {
        registry.limit_book(*market_id);
    }
    for market_id in &config.auction_markets {
        registry.auction_book(*market_id);
    }

    let app = api::create_router_with(
        Arc::new(registry),
        ApiConfig {
            create_markets: config.create_markets,
        },
    );
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
