//! Booking request intake and lifecycle service for the Sharmar boat
//! marketplace: storefront submissions, idempotent creation, anti-abuse
//! filtering, owner approve/decline, and draft/publish reconciliation.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod notify;
pub mod routes;
pub mod services;
pub mod store;
pub mod translate;
pub mod util;

use crate::catalog::{BoatCatalog, HttpCatalog};
use crate::config::AppConfig;
use crate::notify::{NoopNotifier, Notifier, ResendNotifier};
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::BookingStore;
use anyhow::Context;
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::build().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.rust_log))
        .init();
    tracing::info!("starting sharmar-booking");

    let tz: Tz = config
        .booking
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid booking.timezone: {e}"))?;

    let store: Arc<dyn BookingStore> = if config.database.url == "memory" {
        tracing::warn!("database.url is \"memory\"; bookings will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        let pg = PgStore::connect(&config.database)
            .await
            .context("failed to connect to the database")?;
        tracing::info!("database connected, migrations applied");
        Arc::new(pg)
    };

    let catalog: Arc<dyn BoatCatalog> = Arc::new(HttpCatalog::new(config.catalog.clone()));

    let notifier: Arc<dyn Notifier> = if config.email.resend_api_key.trim().is_empty() {
        tracing::warn!("email.resend_api_key not set; admin notifications disabled");
        Arc::new(NoopNotifier)
    } else {
        Arc::new(ResendNotifier::new(&config.email))
    };

    let state = services::AppState::new(store, catalog, notifier, tz, &config);
    let app = routes::create_router(state);

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .context("invalid server.host")?,
        config.server.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
