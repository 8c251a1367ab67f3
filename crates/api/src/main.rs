use std::sync::Arc;

use anyhow::Context;

use procura_api::app::{build_app_with, services::{AppServices, SharedStore}};
use procura_infra::{
    config::Settings,
    store::{InMemoryProcurementStore, PostgresProcurementStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::load().context("failed to load settings")?;

    procura_observability::tracing::init(settings.log.format, &settings.log.level);
    tracing::info!(environment = %settings.environment, "starting procura-api");

    let store: SharedStore = match settings.database.url.as_deref() {
        Some(url) => {
            let store = PostgresProcurementStore::connect(url, settings.database.max_connections)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to run migrations")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("database.url not set; using the in-memory store");
            Arc::new(InMemoryProcurementStore::new())
        }
    };

    let services = AppServices::new(
        store,
        settings.listing,
        settings.inventory.low_stock_threshold,
    );
    let app = build_app_with(Arc::new(services), settings.auth.jwt_secret.clone());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
