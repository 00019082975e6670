use std::sync::Arc;

use anyhow::Context;

use stockbill_api::app::{self, BillingServices};
use stockbill_infra::config::BillingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockbill_observability::init();

    let config = BillingConfig::from_env().context("invalid billing configuration")?;
    let services = BillingServices::from_config(&config).context("failed to build inventory client")?;
    let app = app::build_billing_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        inventory_url = %config.inventory_url,
        timeout_ms = config.inventory_timeout.as_millis() as u64,
        "billing service listening"
    );

    axum::serve(listener, app).await.context("billing server failed")
}
