//! Inventory client adapter.
//!
//! The invoice authority only ever talks to inventory through
//! [`InventoryGateway`]. Adapters own the network deadline and collapse every
//! transport-level problem (refused connection, timeout, non-success status,
//! malformed body) into [`GatewayError`]. A call that *succeeds* but denies
//! some lines is not an error here: it comes back as a list of outcomes.

pub mod http;
pub mod in_process;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use stockbill_core::{ErrorKind, ProductId};
use stockbill_inventory::{ReservationBatch, ReservationOutcome, ReservationRequest};
use stockbill_invoicing::{Invoice, ProductInfo};

pub use http::HttpInventoryClient;
pub use in_process::InProcessInventoryClient;

/// Deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Inventory answered, and the product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("inventory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("inventory transport error: {0}")]
    Transport(String),

    #[error("inventory returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed inventory response: {0}")]
    Decode(String),

    /// Reservation answered with the wrong number of outcomes.
    #[error("inventory returned {got} outcomes for {expected} items")]
    OutcomeMismatch { expected: usize, got: usize },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::ProductNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::RemoteUnavailable,
        }
    }
}

/// Remote inventory capability used by the invoice authority.
#[async_trait::async_trait]
pub trait InventoryGateway: Send + Sync {
    async fn fetch_product(&self, id: ProductId) -> Result<ProductInfo, GatewayError>;

    /// Submit a batch. On `Ok`, the outcomes are one per item, in order.
    async fn reserve(&self, batch: ReservationBatch) -> Result<Vec<ReservationOutcome>, GatewayError>;
}

#[async_trait::async_trait]
impl<G> InventoryGateway for Arc<G>
where
    G: InventoryGateway + ?Sized,
{
    async fn fetch_product(&self, id: ProductId) -> Result<ProductInfo, GatewayError> {
        (**self).fetch_product(id).await
    }

    async fn reserve(&self, batch: ReservationBatch) -> Result<Vec<ReservationOutcome>, GatewayError> {
        (**self).reserve(batch).await
    }
}

/// Map an invoice's line items, in stored order, to a batch keyed by the
/// invoice id.
pub fn reservation_batch_for(invoice: &Invoice) -> ReservationBatch {
    let items = invoice
        .items()
        .iter()
        .map(|line| ReservationRequest {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect();
    ReservationBatch::keyed(invoice.id_typed().to_string(), items)
}

pub(crate) fn ensure_outcome_count(
    expected: usize,
    outcomes: Vec<ReservationOutcome>,
) -> Result<Vec<ReservationOutcome>, GatewayError> {
    if outcomes.len() != expected {
        return Err(GatewayError::OutcomeMismatch {
            expected,
            got: outcomes.len(),
        });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockbill_core::InvoiceId;
    use stockbill_invoicing::InvoiceLineItem;

    #[test]
    fn batch_follows_line_order_and_is_keyed_by_invoice() {
        let (a, b) = (ProductId::new(), ProductId::new());
        let line = |product_id, quantity| InvoiceLineItem {
            product_id,
            product_code: "X".to_string(),
            description: "x".to_string(),
            quantity,
        };
        let invoice = Invoice::open(InvoiceId::new(), 1, vec![line(b, 2), line(a, 5)], Utc::now()).unwrap();

        let batch = reservation_batch_for(&invoice);

        assert_eq!(batch.idempotency_key, Some(invoice.id_typed().to_string()));
        assert_eq!(
            batch.items,
            vec![
                ReservationRequest { product_id: b, quantity: 2 },
                ReservationRequest { product_id: a, quantity: 5 },
            ]
        );
    }

    #[test]
    fn only_missing_product_is_not_a_remote_failure() {
        assert_eq!(GatewayError::ProductNotFound(ProductId::new()).kind(), ErrorKind::NotFound);
        for err in [
            GatewayError::Timeout(DEFAULT_TIMEOUT),
            GatewayError::Transport("refused".into()),
            GatewayError::Status { status: 500, body: String::new() },
            GatewayError::Decode("eof".into()),
            GatewayError::OutcomeMismatch { expected: 2, got: 1 },
        ] {
            assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        }
    }

    #[test]
    fn outcome_count_must_match() {
        let id = ProductId::new();
        let one = vec![ReservationOutcome::applied(id, 1)];
        assert!(ensure_outcome_count(1, one.clone()).is_ok());
        assert_eq!(
            ensure_outcome_count(2, one),
            Err(GatewayError::OutcomeMismatch { expected: 2, got: 1 })
        );
    }
}
