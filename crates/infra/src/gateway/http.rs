use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{error, instrument};

use stockbill_core::ProductId;
use stockbill_inventory::{ReservationBatch, ReservationOutcome};
use stockbill_invoicing::ProductInfo;

use super::{ensure_outcome_count, GatewayError, InventoryGateway, DEFAULT_TIMEOUT};

/// Gateway to a remote inventory service over its JSON HTTP surface.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        let mapped = if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        };
        error!(error = %mapped, "inventory call failed");
        mapped
    }

    async fn decode<T: DeserializeOwned>(&self, res: reqwest::Response) -> Result<T, GatewayError> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "inventory returned an error status");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        res.json::<T>().await.map_err(|e| self.transport_error(e))
    }
}

#[async_trait::async_trait]
impl InventoryGateway for HttpInventoryClient {
    #[instrument(skip(self, id), fields(product_id = %id))]
    async fn fetch_product(&self, id: ProductId) -> Result<ProductInfo, GatewayError> {
        let res = self
            .client
            .get(format!("{}/api/products/{}", self.base_url, id))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if res.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::ProductNotFound(id));
        }
        self.decode(res).await
    }

    #[instrument(skip(self, batch), fields(items = batch.items.len()))]
    async fn reserve(&self, batch: ReservationBatch) -> Result<Vec<ReservationOutcome>, GatewayError> {
        let expected = batch.items.len();
        let res = self
            .client
            .post(format!("{}/api/products/reserve", self.base_url))
            .json(&batch)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let outcomes: Vec<ReservationOutcome> = self.decode(res).await?;
        ensure_outcome_count(expected, outcomes)
    }
}
