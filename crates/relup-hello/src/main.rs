//! Minimal program that keeps itself up to date from GitHub releases.

mod logging;
mod paths;
mod settings;

use std::sync::Arc;

use log::{error, info, warn};
use relup::{UpdateOutcome, Updater};

use crate::settings::HelloSettings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let settings = HelloSettings::load();
    logging::init_logging(settings.debug_logging, settings.max_log_size_bytes);

    println!("Hello from relup-hello version {VERSION}");

    let interval = settings.updater.check_interval();
    let updater = Arc::new(
        Updater::new(
            VERSION,
            settings.owner,
            settings.repo,
            settings.file_prefix,
        )
        .with_config(settings.updater),
    );

    let (first, handle) = updater.start_background(interval).await;
    match first {
        Ok(UpdateOutcome::Updated { version }) => {
            info!("Updated to {version}; restart relup-hello to run it");
        }
        Ok(UpdateOutcome::NoUpdateAvailable { .. }) => {
            info!("relup-hello {VERSION} is up to date");
        }
        Err(error) if error.is_no_binary() => {
            warn!("Latest release has no build for {}", relup::platform());
        }
        Err(error) => error!("{error}"),
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {error}");
    }
    info!("Shutting down background updater");
    handle.shutdown().await;
}
