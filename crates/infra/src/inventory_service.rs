//! Inventory service: product CRUD and batch reservation over a ledger.
//!
//! Batch reservation is **not** atomic across items. Each line is
//! debited on its own, in order, and a later failure does not undo an earlier
//! success. Callers that see any failed outcome must treat the batch as
//! partially committed.
//!
//! Batches carrying an idempotency key are journaled per `(key, line index)`:
//! a line that was applied once is answered from the journal on every later
//! submission instead of being debited again. A resubmitted line must carry
//! the same product and quantity; otherwise it is denied with
//! `idempotency_mismatch` and nothing is debited.
//!
//! The journal keeps at most `journal_capacity` keys. When a new key would
//! exceed it, the oldest key is forgotten, and a later resubmission under that
//! key debits again like a fresh batch.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use stockbill_core::{DomainError, DomainResult, ProductId};
use stockbill_inventory::{
    DebitError, NewProduct, Product, ProductUpdate, ReservationBatch, ReservationOutcome,
    ReservationRequest,
};

use crate::ledger::BalanceLedger;

/// Keys remembered by the idempotency journal unless configured otherwise.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct AppliedLine {
    product_id: ProductId,
    quantity: i64,
    outcome: ReservationOutcome,
}

impl AppliedLine {
    fn matches(&self, item: &ReservationRequest) -> bool {
        self.product_id == item.product_id && self.quantity == item.quantity
    }
}

type AppliedLines = HashMap<usize, AppliedLine>;

#[derive(Debug, Default)]
struct Journal {
    entries: HashMap<String, Arc<Mutex<AppliedLines>>>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct InventoryService<L> {
    ledger: L,
    journal: Mutex<Journal>,
    journal_capacity: usize,
}

impl<L> InventoryService<L>
where
    L: BalanceLedger,
{
    pub fn new(ledger: L) -> Self {
        Self::with_journal_capacity(ledger, DEFAULT_JOURNAL_CAPACITY)
    }

    /// `capacity` is clamped to at least one key.
    pub fn with_journal_capacity(ledger: L, capacity: usize) -> Self {
        Self {
            ledger,
            journal: Mutex::new(Journal::default()),
            journal_capacity: capacity.max(1),
        }
    }

    #[instrument(skip(self, new), fields(code = %new.code))]
    pub fn create_product(&self, new: NewProduct) -> DomainResult<Product> {
        let product = Product::create(ProductId::new(), new, Utc::now())?;
        let product = self.ledger.insert(product)?;
        info!(product_id = %product.id_typed(), balance = product.balance(), "product created");
        Ok(product)
    }

    pub fn get_product(&self, id: &ProductId) -> DomainResult<Product> {
        self.ledger
            .get(id)
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))
    }

    pub fn list_products(&self) -> Vec<Product> {
        self.ledger.list()
    }

    #[instrument(skip(self, id, update), fields(product_id = %id))]
    pub fn update_product(&self, id: &ProductId, update: ProductUpdate) -> DomainResult<Product> {
        let product = self.ledger.update(id, update, Utc::now())?;
        info!(code = product.code(), balance = product.balance(), "product updated");
        Ok(product)
    }

    #[instrument(skip(self, id), fields(product_id = %id))]
    pub fn delete_product(&self, id: &ProductId) -> DomainResult<()> {
        self.ledger.remove(id)?;
        info!("product deleted");
        Ok(())
    }

    /// Advisory: true if a debit of `quantity` would succeed right now.
    /// Takes no reservation; the balance may change before any debit.
    pub fn check_availability(&self, id: &ProductId, quantity: i64) -> DomainResult<bool> {
        Ok(self.get_product(id)?.can_reserve(quantity))
    }

    /// Debit every item independently, in order. Always returns one outcome
    /// per input item, in input order.
    #[instrument(skip(self, batch), fields(items = batch.items.len(), key = batch.idempotency_key.as_deref()))]
    pub fn reserve_batch(&self, batch: &ReservationBatch) -> Vec<ReservationOutcome> {
        let outcomes = match &batch.idempotency_key {
            Some(key) => {
                let applied = self.applied_lines(key);
                let mut applied = applied.lock().unwrap_or_else(PoisonError::into_inner);
                self.reserve_items(batch, Some(&mut *applied))
            }
            None => self.reserve_items(batch, None),
        };

        let denied: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.product_id.to_string())
            .collect();
        if denied.is_empty() {
            info!("batch reserved");
        } else {
            warn!(denied = ?denied, "batch partially committed");
        }
        outcomes
    }

    fn reserve_items(
        &self,
        batch: &ReservationBatch,
        mut applied: Option<&mut AppliedLines>,
    ) -> Vec<ReservationOutcome> {
        let mut outcomes = Vec::with_capacity(batch.items.len());

        for (line, item) in batch.items.iter().enumerate() {
            if let Some(previous) = applied.as_deref().and_then(|a| a.get(&line)) {
                let outcome = if previous.matches(item) {
                    previous.outcome.as_replay()
                } else {
                    warn!(line, product_id = %item.product_id, "keyed line differs from applied line");
                    ReservationOutcome::mismatched(item.product_id, self.balance_of(&item.product_id), line)
                };
                outcomes.push(outcome);
                continue;
            }

            let outcome = match self.ledger.debit(&item.product_id, item.quantity, Utc::now()) {
                Ok(new_balance) => ReservationOutcome::applied(item.product_id, new_balance),
                Err(err) => {
                    let current = match &err {
                        DebitError::InsufficientBalance { available, .. } => *available,
                        DebitError::NotFound(_) => 0,
                        DebitError::InvalidQuantity(_) => self.balance_of(&item.product_id),
                    };
                    ReservationOutcome::denied(item.product_id, current, &err)
                }
            };

            if outcome.success {
                if let Some(applied) = applied.as_deref_mut() {
                    applied.insert(
                        line,
                        AppliedLine {
                            product_id: item.product_id,
                            quantity: item.quantity,
                            outcome: outcome.clone(),
                        },
                    );
                }
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    fn balance_of(&self, id: &ProductId) -> i64 {
        self.ledger.get(id).map(|p| p.balance()).unwrap_or(0)
    }

    fn applied_lines(&self, key: &str) -> Arc<Mutex<AppliedLines>> {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lines) = journal.entries.get(key) {
            return lines.clone();
        }

        while journal.order.len() >= self.journal_capacity {
            let Some(oldest) = journal.order.pop_front() else {
                break;
            };
            journal.entries.remove(&oldest);
            debug!(key = %oldest, "idempotency key evicted");
        }

        let lines = Arc::new(Mutex::new(AppliedLines::new()));
        journal.entries.insert(key.to_string(), lines.clone());
        journal.order.push_back(key.to_string());
        lines
    }
}
