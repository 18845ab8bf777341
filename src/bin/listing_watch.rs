//! listing-watch: listing page watcher
//!
//! Polls a listing page on a fixed interval and announces entries that were
//! not there before. State survives restarts through a JSON state file.
//!
//! ## Configuration
//! - `listing-watch.yaml` in the working directory, if present
//! - path given as first argument or `--config <path>`
//! - `LISTING_WATCH_CONFIG`: path to a config file
//! - `LISTING_WATCH__<SECTION>__<KEY>`: single overrides
//!   (e.g. `LISTING_WATCH__SCRAPE__INTERVAL_SECS=30`)
//! - `LISTING_WATCH_LOG`: log filter (default: info)

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use listing_watch::config::Config;
use listing_watch::notify::build_notifier;
use listing_watch::record::Record;
use listing_watch::services::Scheduler;
use listing_watch::sources::HtmlListingSource;
use listing_watch::storage::SnapshotStore;
use listing_watch::utils::bootstrap::{cancel_on_shutdown_signal, init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = parse_config_path();
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(config.log.json);

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let source = HtmlListingSource::new(&config.scrape).map_err(|e| {
        error!("Failed to set up listing source: {}", e);
        e
    })?;
    info!(url = %source.page_url(), "Listing source ready");

    let notifier = build_notifier(&config.notify, config.retry.policy()).map_err(|e| {
        error!("Failed to set up notifications: {}", e);
        e
    })?;

    let store: SnapshotStore<Record> = SnapshotStore::load(&config.storage.state_file)
        .await
        .map_err(|e| {
            error!("Failed to load state: {}", e);
            e
        })?;
    info!(
        file = %config.storage.state_file.display(),
        records = store.record_count(),
        first_run = store.first_run(),
        "State loaded"
    );

    let cancel = CancellationToken::new();
    cancel_on_shutdown_signal(cancel.clone());

    let scheduler = Scheduler::new(
        config.scheduler_config(),
        store,
        Arc::new(source),
        notifier,
    );
    scheduler.run(cancel).await;

    info!("Shutdown complete");
    Ok(())
}
