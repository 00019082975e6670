use std::sync::Arc;

use anyhow::Context;

use stockbill_api::app::{self, InventoryServices};
use stockbill_infra::config::InventoryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockbill_observability::init();

    let config = InventoryConfig::from_env().context("invalid inventory configuration")?;
    let app = app::build_inventory_app(Arc::new(InventoryServices::from_config(&config)));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    tracing::info!(addr = %listener.local_addr()?, "inventory service listening");

    axum::serve(listener, app).await.context("inventory server failed")
}
