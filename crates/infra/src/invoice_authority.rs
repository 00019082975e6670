//! Invoice authority: creation and the close/commit protocol.
//!
//! Closing runs in three steps against the store:
//!
//! 1. `claim_for_close` checks OPEN and marks the invoice as being closed, so a
//!    concurrent close fails fast with [`InvoicingError::CloseInProgress`].
//! 2. One reservation call goes to inventory with no store lock held. The
//!    batch is keyed by the invoice id, so a retry after a partial failure
//!    does not debit the lines that already went through.
//! 3. `complete_close` re-validates and flips the status to CLOSED.
//!
//! Any failure in step 2 releases the claim and leaves the invoice OPEN.
//! Nothing is retried here; retrying is the caller's decision.

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use stockbill_core::{DomainError, ErrorKind, InvoiceId, ProductId};
use stockbill_inventory::{all_succeeded, ReservationOutcome};
use stockbill_invoicing::{Invoice, InvoiceLineItem, NewInvoiceItem};

use crate::gateway::{reservation_batch_for, GatewayError, InventoryGateway};
use crate::invoice_store::{CloseClaimError, InvoiceStore};

/// Why the reservation step of a close failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationFailure {
    /// The call itself failed; nothing is known about what inventory applied.
    Unavailable(GatewayError),
    /// Inventory answered and denied at least one line. Successful lines in
    /// `outcomes` have been applied.
    Denied { outcomes: Vec<ReservationOutcome> },
}

impl ReservationFailure {
    /// Outcomes that were denied (empty for `Unavailable`).
    pub fn denied(&self) -> Vec<&ReservationOutcome> {
        match self {
            ReservationFailure::Unavailable(_) => Vec::new(),
            ReservationFailure::Denied { outcomes } => outcomes.iter().filter(|o| !o.success).collect(),
        }
    }
}

impl std::fmt::Display for ReservationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationFailure::Unavailable(e) => write!(f, "inventory unavailable: {e}"),
            ReservationFailure::Denied { .. } => {
                let detail: Vec<String> = self
                    .denied()
                    .iter()
                    .map(|o| {
                        format!(
                            "{}: {}",
                            o.product_id,
                            o.error_message.as_deref().unwrap_or("denied")
                        )
                    })
                    .collect();
                write!(f, "inventory denied {}", detail.join("; "))
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoicingError {
    #[error("invoice must have at least one item")]
    NoItems,

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("lookup of product {product_id} failed: {source}")]
    ProductLookupFailed {
        product_id: ProductId,
        source: GatewayError,
    },

    #[error("insufficient stock for product {code}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        code: String,
        available: i64,
        requested: i64,
    },

    #[error("invoice {0} not found")]
    NotFound(InvoiceId),

    #[error("invoice {number} is already closed")]
    AlreadyClosed { invoice_id: InvoiceId, number: u64 },

    #[error("invoice {0} is already being closed")]
    CloseInProgress(InvoiceId),

    #[error("reservation failed: {0}")]
    ReservationFailed(ReservationFailure),

    #[error(transparent)]
    Store(#[from] DomainError),
}

impl InvoicingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvoicingError::NoItems | InvoicingError::InvalidQuantity { .. } => ErrorKind::Validation,
            InvoicingError::ProductLookupFailed { source, .. } => source.kind(),
            InvoicingError::InsufficientStock { .. } => ErrorKind::BusinessDenial,
            InvoicingError::NotFound(_) => ErrorKind::NotFound,
            InvoicingError::AlreadyClosed { .. } | InvoicingError::CloseInProgress(_) => ErrorKind::Conflict,
            InvoicingError::ReservationFailed(ReservationFailure::Unavailable(_)) => {
                ErrorKind::RemoteUnavailable
            }
            InvoicingError::ReservationFailed(ReservationFailure::Denied { .. }) => {
                ErrorKind::BusinessDenial
            }
            InvoicingError::Store(e) => e.kind(),
        }
    }
}

impl From<CloseClaimError> for InvoicingError {
    fn from(value: CloseClaimError) -> Self {
        match value {
            CloseClaimError::NotFound(id) => InvoicingError::NotFound(id),
            CloseClaimError::AlreadyClosed { invoice_id, number } => {
                InvoicingError::AlreadyClosed { invoice_id, number }
            }
            CloseClaimError::InProgress(id) => InvoicingError::CloseInProgress(id),
            other @ CloseClaimError::NotClaimed(_) => InvoicingError::Store(other.into()),
        }
    }
}

/// Releases a close claim unless the close completed.
struct ClaimGuard<'a, S: InvoiceStore> {
    store: &'a S,
    id: InvoiceId,
    armed: bool,
}

impl<S: InvoiceStore> ClaimGuard<'_, S> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: InvoiceStore> Drop for ClaimGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.store.release_close(&self.id);
        }
    }
}

#[derive(Debug)]
pub struct InvoiceAuthority<S, G> {
    store: S,
    inventory: G,
}

impl<S, G> InvoiceAuthority<S, G>
where
    S: InvoiceStore,
    G: InventoryGateway,
{
    pub fn new(store: S, inventory: G) -> Self {
        Self { store, inventory }
    }

    /// Run the creation checks and build the line snapshots without
    /// persisting anything. One remote read per item.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn validate_items(&self, items: &[NewInvoiceItem]) -> Result<Vec<InvoiceLineItem>, InvoicingError> {
        if items.is_empty() {
            return Err(InvoicingError::NoItems);
        }
        if let Some(bad) = items.iter().find(|i| i.quantity <= 0) {
            return Err(InvoicingError::InvalidQuantity {
                product_id: bad.product_id,
                quantity: bad.quantity,
            });
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self.inventory.fetch_product(item.product_id).await.map_err(|source| {
                InvoicingError::ProductLookupFailed {
                    product_id: item.product_id,
                    source,
                }
            })?;

            // Advisory only: the balance can still move before close.
            if item.quantity > product.balance {
                return Err(InvoicingError::InsufficientStock {
                    product_id: product.id,
                    code: product.code,
                    available: product.balance,
                    requested: item.quantity,
                });
            }
            lines.push(InvoiceLineItem::snapshot(&product, item.quantity));
        }
        Ok(lines)
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn create_invoice(&self, items: Vec<NewInvoiceItem>) -> Result<Invoice, InvoicingError> {
        let lines = self.validate_items(&items).await?;
        let invoice = self.store.create(InvoiceId::new(), lines, Utc::now())?;
        info!(invoice_id = %invoice.id_typed(), number = invoice.number(), "invoice created");
        Ok(invoice)
    }

    pub fn get_invoice(&self, id: &InvoiceId) -> Result<Invoice, InvoicingError> {
        self.store.get(id).ok_or(InvoicingError::NotFound(*id))
    }

    /// All invoices, by sequence number.
    pub fn list_invoices(&self) -> Vec<Invoice> {
        self.store.list()
    }

    #[instrument(skip(self, id), fields(invoice_id = %id))]
    pub async fn close_invoice(&self, id: InvoiceId) -> Result<Invoice, InvoicingError> {
        let invoice = self.store.claim_for_close(&id)?;
        let claim = ClaimGuard {
            store: &self.store,
            id,
            armed: true,
        };

        let outcomes = match self.inventory.reserve(reservation_batch_for(&invoice)).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(number = invoice.number(), error = %e, "reservation call failed; invoice stays open");
                return Err(InvoicingError::ReservationFailed(ReservationFailure::Unavailable(e)));
            }
        };

        if !all_succeeded(&outcomes) {
            let failure = ReservationFailure::Denied { outcomes };
            let denied: Vec<String> = failure.denied().iter().map(|o| o.product_id.to_string()).collect();
            warn!(
                number = invoice.number(),
                denied = ?denied,
                "reservation partially committed; invoice stays open"
            );
            return Err(InvoicingError::ReservationFailed(failure));
        }

        let closed = self.store.complete_close(&id, Utc::now())?;
        claim.disarm();
        info!(number = closed.number(), "invoice closed");
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{Notify, Semaphore};

    use super::*;
    use crate::gateway::InProcessInventoryClient;
    use crate::inventory_service::InventoryService;
    use crate::invoice_store::InMemoryInvoiceStore;
    use crate::ledger::InMemoryBalanceLedger;
    use stockbill_inventory::{
        DebitError, DenialReason, NewProduct, Product, ProductUpdate, ReservationBatch,
    };
    use stockbill_invoicing::{InvoiceStatus, ProductInfo};

    type Inventory = Arc<InventoryService<InMemoryBalanceLedger>>;
    type Authority<G> = InvoiceAuthority<InMemoryInvoiceStore, G>;

    fn inventory() -> Inventory {
        Arc::new(InventoryService::new(InMemoryBalanceLedger::new()))
    }

    fn add(inventory: &Inventory, code: &str, balance: i64) -> ProductId {
        inventory
            .create_product(NewProduct {
                code: code.to_string(),
                description: format!("{code} description"),
                balance,
            })
            .unwrap()
            .id_typed()
    }

    fn restock(inventory: &Inventory, id: ProductId, code: &str, balance: i64) {
        inventory
            .update_product(
                &id,
                ProductUpdate {
                    code: code.to_string(),
                    description: format!("{code} description"),
                    balance,
                },
            )
            .unwrap();
    }

    fn balance(inventory: &Inventory, id: ProductId) -> i64 {
        inventory.get_product(&id).unwrap().balance()
    }

    fn item(product_id: ProductId, quantity: i64) -> NewInvoiceItem {
        NewInvoiceItem { product_id, quantity }
    }

    fn authority(inventory: &Inventory) -> Authority<InProcessInventoryClient<InMemoryBalanceLedger>> {
        InvoiceAuthority::new(
            InMemoryInvoiceStore::new(),
            InProcessInventoryClient::new(inventory.clone()),
        )
    }

    #[tokio::test]
    async fn create_then_close_debits_and_closes() {
        let inv = inventory();
        let p = add(&inv, "P", 10);
        let authority = authority(&inv);

        let invoice = authority.create_invoice(vec![item(p, 4)]).await.unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.number(), 1);
        assert_eq!(invoice.items().len(), 1);
        assert_eq!(invoice.items()[0].quantity, 4);
        assert_eq!(invoice.items()[0].product_code, "P");
        assert_eq!(balance(&inv, p), 10);

        let closed = authority.close_invoice(invoice.id_typed()).await.unwrap();
        assert_eq!(closed.status(), InvoiceStatus::Closed);
        assert!(closed.closed_at().is_some());
        assert_eq!(balance(&inv, p), 6);
    }

    #[tokio::test]
    async fn creation_over_observed_balance_is_refused_and_not_persisted() {
        let inv = inventory();
        let p = add(&inv, "P", 2);
        let authority = authority(&inv);

        let err = authority.create_invoice(vec![item(p, 4)]).await.unwrap_err();
        assert!(matches!(
            err,
            InvoicingError::InsufficientStock { available: 2, requested: 4, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::BusinessDenial);
        assert!(authority.list_invoices().is_empty());
    }

    #[tokio::test]
    async fn creation_input_errors() {
        let inv = inventory();
        let p = add(&inv, "P", 2);
        let authority = authority(&inv);

        assert_eq!(authority.create_invoice(vec![]).await, Err(InvoicingError::NoItems));
        assert_eq!(
            authority.create_invoice(vec![item(p, 0)]).await,
            Err(InvoicingError::InvalidQuantity { product_id: p, quantity: 0 })
        );

        let missing = ProductId::new();
        let err = authority.create_invoice(vec![item(missing, 1)]).await.unwrap_err();
        assert_eq!(
            err,
            InvoicingError::ProductLookupFailed {
                product_id: missing,
                source: GatewayError::ProductNotFound(missing),
            }
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(authority.list_invoices().is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_product_rename() {
        let inv = inventory();
        let p = add(&inv, "OLD", 5);
        let authority = authority(&inv);

        let invoice = authority.create_invoice(vec![item(p, 1)]).await.unwrap();
        restock(&inv, p, "NEW", 5);

        let stored = authority.get_invoice(&invoice.id_typed()).unwrap();
        assert_eq!(stored.items()[0].product_code, "OLD");
    }

    #[tokio::test]
    async fn validate_items_persists_nothing() {
        let inv = inventory();
        let p = add(&inv, "P", 5);
        let authority = authority(&inv);

        let lines = authority.validate_items(&[item(p, 5)]).await.unwrap();
        assert_eq!(lines[0].description, "P description");
        assert!(authority.list_invoices().is_empty());
        assert_eq!(balance(&inv, p), 5);
    }

    #[tokio::test]
    async fn second_close_is_already_closed_and_has_no_effect() {
        let inv = inventory();
        let p = add(&inv, "P", 10);
        let authority = authority(&inv);

        let invoice = authority.create_invoice(vec![item(p, 4)]).await.unwrap();
        authority.close_invoice(invoice.id_typed()).await.unwrap();

        let err = authority.close_invoice(invoice.id_typed()).await.unwrap_err();
        assert_eq!(
            err,
            InvoicingError::AlreadyClosed {
                invoice_id: invoice.id_typed(),
                number: 1
            }
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(balance(&inv, p), 6);
    }

    #[tokio::test]
    async fn close_of_unknown_invoice_is_not_found() {
        let inv = inventory();
        let authority = authority(&inv);
        let id = InvoiceId::new();
        assert_eq!(authority.close_invoice(id).await, Err(InvoicingError::NotFound(id)));
    }

    #[tokio::test]
    async fn partial_denial_keeps_invoice_open_and_earlier_debit_applied() {
        let inv = inventory();
        let a = add(&inv, "A", 10);
        let b = add(&inv, "B", 3);
        let authority = authority(&inv);

        let invoice = authority
            .create_invoice(vec![item(a, 4), item(b, 2)])
            .await
            .unwrap();
        restock(&inv, b, "B", 0);

        let err = authority.close_invoice(invoice.id_typed()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessDenial);
        match &err {
            InvoicingError::ReservationFailed(failure) => {
                let denied = failure.denied();
                assert_eq!(denied.len(), 1);
                assert_eq!(denied[0].product_id, b);
                assert_eq!(denied[0].error_reason, Some(DenialReason::InsufficientBalance));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(balance(&inv, a), 6);
        assert!(authority.get_invoice(&invoice.id_typed()).unwrap().is_open());
    }

    #[tokio::test]
    async fn retry_after_partial_denial_does_not_double_debit() {
        let inv = inventory();
        let a = add(&inv, "A", 10);
        let b = add(&inv, "B", 3);
        let authority = authority(&inv);

        let invoice = authority
            .create_invoice(vec![item(a, 4), item(b, 2)])
            .await
            .unwrap();
        restock(&inv, b, "B", 0);
        authority.close_invoice(invoice.id_typed()).await.unwrap_err();

        restock(&inv, b, "B", 5);
        let closed = authority.close_invoice(invoice.id_typed()).await.unwrap();

        assert_eq!(closed.status(), InvoiceStatus::Closed);
        assert_eq!(balance(&inv, a), 6);
        assert_eq!(balance(&inv, b), 3);
    }

    /// Gateway whose reservation waits at a gate after announcing itself.
    struct GatedInventory<G> {
        inner: G,
        entered: Arc<Notify>,
        gate: Arc<Semaphore>,
    }

    #[async_trait::async_trait]
    impl<G: InventoryGateway> InventoryGateway for GatedInventory<G> {
        async fn fetch_product(&self, id: ProductId) -> Result<ProductInfo, GatewayError> {
            self.inner.fetch_product(id).await
        }

        async fn reserve(&self, batch: ReservationBatch) -> Result<Vec<ReservationOutcome>, GatewayError> {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
            self.inner.reserve(batch).await
        }
    }

    #[tokio::test]
    async fn concurrent_close_is_rejected_while_first_is_in_flight() {
        let inv = inventory();
        let p = add(&inv, "P", 10);
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Semaphore::new(0));
        let authority = Arc::new(InvoiceAuthority::new(
            InMemoryInvoiceStore::new(),
            GatedInventory {
                inner: InProcessInventoryClient::new(inv.clone()),
                entered: entered.clone(),
                gate: gate.clone(),
            },
        ));

        let invoice = authority.create_invoice(vec![item(p, 4)]).await.unwrap();
        let id = invoice.id_typed();

        let first = tokio::spawn({
            let authority = authority.clone();
            async move { authority.close_invoice(id).await }
        });
        entered.notified().await;

        let second = authority.close_invoice(id).await.unwrap_err();
        assert_eq!(second, InvoicingError::CloseInProgress(id));
        assert_eq!(second.kind(), ErrorKind::Conflict);

        gate.add_permits(1);
        let closed = first.await.unwrap().unwrap();
        assert_eq!(closed.status(), InvoiceStatus::Closed);
        assert_eq!(balance(&inv, p), 6);
    }

    struct DownInventory<G> {
        inner: G,
    }

    #[async_trait::async_trait]
    impl<G: InventoryGateway> InventoryGateway for DownInventory<G> {
        async fn fetch_product(&self, id: ProductId) -> Result<ProductInfo, GatewayError> {
            self.inner.fetch_product(id).await
        }

        async fn reserve(&self, _batch: ReservationBatch) -> Result<Vec<ReservationOutcome>, GatewayError> {
            Err(GatewayError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn transport_failure_is_remote_unavailable_and_releases_claim() {
        let inv = inventory();
        let p = add(&inv, "P", 10);
        let authority = InvoiceAuthority::new(
            InMemoryInvoiceStore::new(),
            DownInventory {
                inner: InProcessInventoryClient::new(inv.clone()),
            },
        );
        let invoice = authority.create_invoice(vec![item(p, 4)]).await.unwrap();

        for _ in 0..2 {
            let err = authority.close_invoice(invoice.id_typed()).await.unwrap_err();
            assert!(matches!(
                err,
                InvoicingError::ReservationFailed(ReservationFailure::Unavailable(GatewayError::Transport(_)))
            ));
            assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        }
        assert!(authority.get_invoice(&invoice.id_typed()).unwrap().is_open());
        assert_eq!(balance(&inv, p), 10);
    }

    /// Ledger whose debits stall, to drive the client past its deadline.
    struct SlowLedger {
        inner: InMemoryBalanceLedger,
        delay: Duration,
    }

    impl crate::ledger::BalanceLedger for SlowLedger {
        fn insert(&self, product: Product) -> stockbill_core::DomainResult<Product> {
            self.inner.insert(product)
        }

        fn get(&self, id: &ProductId) -> Option<Product> {
            self.inner.get(id)
        }

        fn list(&self) -> Vec<Product> {
            self.inner.list()
        }

        fn update(
            &self,
            id: &ProductId,
            update: ProductUpdate,
            now: chrono::DateTime<Utc>,
        ) -> stockbill_core::DomainResult<Product> {
            self.inner.update(id, update, now)
        }

        fn remove(&self, id: &ProductId) -> stockbill_core::DomainResult<Product> {
            self.inner.remove(id)
        }

        fn debit(&self, id: &ProductId, quantity: i64, now: chrono::DateTime<Utc>) -> Result<i64, DebitError> {
            std::thread::sleep(self.delay);
            self.inner.debit(id, quantity, now)
        }
    }

    #[tokio::test]
    async fn timeout_is_remote_unavailable_and_invoice_stays_open() {
        let inv = Arc::new(InventoryService::new(SlowLedger {
            inner: InMemoryBalanceLedger::new(),
            delay: Duration::from_millis(300),
        }));
        let p = inv
            .create_product(NewProduct {
                code: "P".to_string(),
                description: "slow".to_string(),
                balance: 10,
            })
            .unwrap()
            .id_typed();
        let timeout = Duration::from_millis(50);
        let authority = InvoiceAuthority::new(
            InMemoryInvoiceStore::new(),
            InProcessInventoryClient::with_timeout(inv.clone(), timeout),
        );

        let invoice = authority.create_invoice(vec![item(p, 4)]).await.unwrap();
        let err = authority.close_invoice(invoice.id_typed()).await.unwrap_err();

        assert_eq!(
            err,
            InvoicingError::ReservationFailed(ReservationFailure::Unavailable(GatewayError::Timeout(timeout)))
        );
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert!(authority.get_invoice(&invoice.id_typed()).unwrap().is_open());
    }

    #[tokio::test]
    async fn concurrent_creations_get_distinct_numbers() {
        let inv = inventory();
        let p = add(&inv, "P", 1_000);
        let authority = Arc::new(authority(&inv));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let authority = authority.clone();
                tokio::spawn(async move { authority.create_invoice(vec![item(p, 1)]).await.unwrap().number() })
            })
            .collect();

        let mut numbers = Vec::new();
        for h in handles {
            numbers.push(h.await.unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=20).collect::<Vec<u64>>());

        let listed: Vec<u64> = authority.list_invoices().iter().map(|i| i.number()).collect();
        assert_eq!(listed, (1..=20).collect::<Vec<u64>>());
    }
}
