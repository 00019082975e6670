//! Balance ledger boundary.
//!
//! The ledger owns product balances and its own lock discipline. Nothing
//! outside it ever touches the underlying map; every mutation goes through one
//! of the atomic operations below.

pub mod in_memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use stockbill_core::{DomainResult, ProductId};
use stockbill_inventory::{DebitError, Product, ProductUpdate};

pub use in_memory::InMemoryBalanceLedger;

/// Product-id → balance store with an atomic check-and-debit.
pub trait BalanceLedger: Send + Sync {
    /// Insert a new product. Fails with `Conflict` if its code is taken.
    fn insert(&self, product: Product) -> DomainResult<Product>;

    fn get(&self, id: &ProductId) -> Option<Product>;

    /// All products, ordered by code.
    fn list(&self) -> Vec<Product>;

    /// Replace code/description/balance. A rename onto another product's
    /// code fails with `Conflict`.
    fn update(&self, id: &ProductId, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<Product>;

    fn remove(&self, id: &ProductId) -> DomainResult<Product>;

    /// Read-check-write on one product, indivisible with respect to every
    /// other debit or update of the same product. Returns the new balance.
    fn debit(&self, id: &ProductId, quantity: i64, now: DateTime<Utc>) -> Result<i64, DebitError>;
}

impl<S> BalanceLedger for Arc<S>
where
    S: BalanceLedger + ?Sized,
{
    fn insert(&self, product: Product) -> DomainResult<Product> {
        (**self).insert(product)
    }

    fn get(&self, id: &ProductId) -> Option<Product> {
        (**self).get(id)
    }

    fn list(&self) -> Vec<Product> {
        (**self).list()
    }

    fn update(&self, id: &ProductId, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<Product> {
        (**self).update(id, update, now)
    }

    fn remove(&self, id: &ProductId) -> DomainResult<Product> {
        (**self).remove(id)
    }

    fn debit(&self, id: &ProductId, quantity: i64, now: DateTime<Utc>) -> Result<i64, DebitError> {
        (**self).debit(id, quantity, now)
    }
}
