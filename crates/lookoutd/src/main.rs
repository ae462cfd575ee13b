use anyhow::Result;
use lookout_core::AdmissionGate;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod notify;
mod pipeline;
mod sqlite;
mod store;

use dbus_interface::{LookoutService, BUS_NAME, OBJECT_PATH};
use notify::BroadcastNotifier;
use pipeline::DetectionPipeline;
use sqlite::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lookoutd starting");

    let config = config::Config::from_env();
    tracing::info!(
        cooldown_secs = config.cooldown_secs,
        threshold = config.similarity_threshold,
        db = %config.db_path.display(),
        "configuration loaded"
    );

    // The cache lives exactly as long as this process; a restart forgets
    // every face and the first sighting afterwards alerts again.
    let gate = Arc::new(AdmissionGate::new(
        config.cooldown(),
        config.similarity_threshold,
    ));
    let store = Arc::new(SqliteStore::open(&config.db_path).await?);
    let notifier = Arc::new(BroadcastNotifier::new(config.notify_capacity));
    let alerts = notifier.subscribe();

    let pipeline = Arc::new(DetectionPipeline::new(
        gate,
        store,
        notifier,
        config.list_limit,
    ));
    let service = LookoutService::new(pipeline, &config);

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    let forwarder = tokio::spawn(dbus_interface::forward_notifications(conn.clone(), alerts));

    tracing::info!(
        bus = if config.session_bus { "session" } else { "system" },
        name = BUS_NAME,
        "lookoutd ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("lookoutd shutting down");
    forwarder.abort();

    Ok(())
}
