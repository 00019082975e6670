use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use stockbill_core::{DomainError, DomainResult, ProductId};
use stockbill_inventory::{DebitError, Product, ProductUpdate};

use super::BalanceLedger;

#[derive(Debug, Default)]
struct Index {
    products: HashMap<ProductId, Arc<Mutex<Product>>>,
    codes: HashMap<String, ProductId>,
}

/// In-memory balance ledger (volatile; empty after restart).
///
/// Lock order is always index → product. Debits and reads take the index
/// read lock plus the one product mutex, so debits on different products run
/// in parallel. Structural changes (insert, update, remove) take the index
/// write lock, which excludes every debit while a code is being renamed.
#[derive(Debug, Default)]
pub struct InMemoryBalanceLedger {
    index: RwLock<Index>,
}

impl InMemoryBalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock(product: &Mutex<Product>) -> MutexGuard<'_, Product> {
    product.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BalanceLedger for InMemoryBalanceLedger {
    fn insert(&self, product: Product) -> DomainResult<Product> {
        let mut index = self.write();

        if index.codes.contains_key(product.code()) {
            return Err(DomainError::conflict(format!(
                "product code '{}' already exists",
                product.code()
            )));
        }
        if index.products.contains_key(&product.id_typed()) {
            return Err(DomainError::conflict(format!(
                "product {} already exists",
                product.id_typed()
            )));
        }

        index.codes.insert(product.code().to_string(), product.id_typed());
        index
            .products
            .insert(product.id_typed(), Arc::new(Mutex::new(product.clone())));
        Ok(product)
    }

    fn get(&self, id: &ProductId) -> Option<Product> {
        let index = self.read();
        index.products.get(id).map(|p| lock(p).clone())
    }

    fn list(&self) -> Vec<Product> {
        let index = self.read();
        let mut products: Vec<Product> = index.products.values().map(|p| lock(p).clone()).collect();
        products.sort_by(|a, b| a.code().cmp(b.code()));
        products
    }

    fn update(&self, id: &ProductId, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<Product> {
        let mut index = self.write();

        let slot = index
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))?;

        let new_code = Product::normalized_code(&update).to_string();
        if let Some(owner) = index.codes.get(&new_code) {
            if owner != id {
                return Err(DomainError::conflict(format!(
                    "product code '{new_code}' already exists"
                )));
            }
        }

        let mut product = lock(&slot);
        let old_code = product.code().to_string();
        product.apply_update(update, now)?;

        if old_code != product.code() {
            index.codes.remove(&old_code);
            index.codes.insert(product.code().to_string(), *id);
        }
        Ok(product.clone())
    }

    fn remove(&self, id: &ProductId) -> DomainResult<Product> {
        let mut index = self.write();

        let slot = index
            .products
            .remove(id)
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))?;
        let product = lock(&slot).clone();
        index.codes.remove(product.code());
        Ok(product)
    }

    #[instrument(skip(self, id, now), fields(product_id = %id))]
    fn debit(&self, id: &ProductId, quantity: i64, now: DateTime<Utc>) -> Result<i64, DebitError> {
        let index = self.read();
        let slot = index.products.get(id).ok_or(DebitError::NotFound(*id))?;

        let mut product = lock(slot);
        let new_balance = product.debit(quantity, now)?;
        debug!(new_balance, "balance debited");
        Ok(new_balance)
    }
}
