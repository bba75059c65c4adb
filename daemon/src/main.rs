mod catalog;
mod config;
mod control;
mod picker;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use catalog::{load_catalog, CatalogSource};
use config::PickerConfig;
use picker::Picker;
use server::{HostLink, PickerServer};
use stickerpicker_core::{Clock, FileStorage, KeyValueStorage, SystemClock, WidgetRelay};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = PickerConfig::load()?;
    info!(
        host_socket = %config.server.host_socket_path.display(),
        control_socket = %config.server.control_socket_path.display(),
        storage = %config.storage.path.display(),
        catalog = %config.catalog.base,
        homeserver = %config.catalog.homeserver_url,
        frequently_used_limit = config.catalog.frequently_used_limit,
        widget_id = ?config.widget.widget_id,
        upload_file = config.widget.upload_file,
        "loaded stickerpicker config"
    );

    let storage: Arc<dyn KeyValueStorage> = Arc::new(
        FileStorage::open(&config.storage.path).with_context(|| {
            format!("failed to open storage {}", config.storage.path.display())
        })?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let host = HostLink::default();
    let mut relay = WidgetRelay::new(host.clone(), clock.clone())
        .with_upload_capability(config.widget.upload_file);
    if let Some(widget_id) = config.widget.widget_id.clone().filter(|id| !id.is_empty()) {
        relay = relay.bound_to(widget_id);
    }

    let mut picker = Picker::new(
        storage,
        clock,
        relay,
        &config.catalog.homeserver_url,
        config.catalog.frequently_used_limit,
    );

    let source: Arc<dyn CatalogSource> = Arc::from(catalog::source_for(&config.catalog.base)?);
    match load_catalog(source.as_ref(), &config.catalog.homeserver_url).await {
        Ok(catalog) => picker.apply_catalog(catalog),
        Err(error) => warn!("failed to load sticker catalog: {error:#}"),
    }

    let server = PickerServer::new(
        config.server.clone(),
        picker,
        host,
        source,
        config.catalog.homeserver_url.clone(),
    );
    server.run().await
}
