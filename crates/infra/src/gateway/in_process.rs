use std::sync::Arc;
use std::time::Duration;

use tracing::{error, instrument};

use stockbill_core::ProductId;
use stockbill_inventory::{Product, ReservationBatch, ReservationOutcome};
use stockbill_invoicing::ProductInfo;

use super::{ensure_outcome_count, GatewayError, InventoryGateway, DEFAULT_TIMEOUT};
use crate::inventory_service::InventoryService;
use crate::ledger::BalanceLedger;

/// Gateway to an inventory service living in the same process.
///
/// Calls run on the blocking pool under the same deadline an HTTP client
/// would have, so the invoice authority sees identical failure modes.
#[derive(Debug)]
pub struct InProcessInventoryClient<L> {
    service: Arc<InventoryService<L>>,
    timeout: Duration,
}

impl<L> Clone for InProcessInventoryClient<L> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            timeout: self.timeout,
        }
    }
}

impl<L> InProcessInventoryClient<L>
where
    L: BalanceLedger + 'static,
{
    pub fn new(service: Arc<InventoryService<L>>) -> Self {
        Self::with_timeout(service, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(service: Arc<InventoryService<L>>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    async fn call<T, F>(&self, f: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&InventoryService<L>) -> T + Send + 'static,
    {
        let service = self.service.clone();
        let task = tokio::task::spawn_blocking(move || f(&service));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join)) => {
                error!(error = %join, "inventory call aborted");
                Err(GatewayError::Transport(join.to_string()))
            }
            Err(_) => {
                error!(timeout_ms = self.timeout.as_millis() as u64, "inventory call timed out");
                Err(GatewayError::Timeout(self.timeout))
            }
        }
    }
}

fn product_info(product: &Product) -> ProductInfo {
    ProductInfo {
        id: product.id_typed(),
        code: product.code().to_string(),
        description: product.description().to_string(),
        balance: product.balance(),
    }
}

#[async_trait::async_trait]
impl<L> InventoryGateway for InProcessInventoryClient<L>
where
    L: BalanceLedger + 'static,
{
    #[instrument(skip(self, id), fields(product_id = %id))]
    async fn fetch_product(&self, id: ProductId) -> Result<ProductInfo, GatewayError> {
        self.call(move |service| service.get_product(&id).ok().map(|p| product_info(&p)))
            .await?
            .ok_or(GatewayError::ProductNotFound(id))
    }

    #[instrument(skip(self, batch), fields(items = batch.items.len()))]
    async fn reserve(&self, batch: ReservationBatch) -> Result<Vec<ReservationOutcome>, GatewayError> {
        let expected = batch.items.len();
        let outcomes = self.call(move |service| service.reserve_batch(&batch)).await?;
        ensure_outcome_count(expected, outcomes)
    }
}
