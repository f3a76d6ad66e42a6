//! Storefront - storefront and admin API server

use anyhow::{Context as _, Result};
use chrono::Duration;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::http::{self, AppState};
use storefront::services::{EventPublisher, LogPublisher, NatsPublisher};
use storefront::store::local::FileKeyValueStore;
use storefront::store::postgres::PgStore;
use storefront::{Config, SessionRegistry, Storefront};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;
    let store = PgStore::connect(&cfg.database_url, cfg.database_max_connections).await?;
    sqlx::migrate!("./migrations").run(store.pool()).await?;

    let events: Arc<dyn EventPublisher> = match &cfg.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, logging events instead");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };
    let device = FileKeyValueStore::open(&cfg.local_storage_dir).await.context("device storage")?;

    let storefront = Storefront::new(Arc::new(store), Arc::new(device))
        .with_status_policy(cfg.order_status_policy)
        .with_events(events);
    let registry = SessionRegistry::with_limits(storefront, cfg.session_capacity, Duration::minutes(cfg.session_idle_minutes));
    let app = http::router(AppState::new(registry));

    let addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(policy = ?cfg.order_status_policy, "storefront listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
