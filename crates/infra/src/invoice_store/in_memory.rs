use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stockbill_core::{DomainResult, InvoiceId};
use stockbill_invoicing::{Invoice, InvoiceLineItem};

use super::{CloseClaimError, InvoiceStore};

#[derive(Debug, Default)]
struct State {
    invoices: HashMap<InvoiceId, Invoice>,
    last_number: u64,
    closing: HashSet<InvoiceId>,
}

/// In-memory invoice store (volatile; the counter restarts at zero).
///
/// One process-wide reader/writer lock: listings share it, every
/// read-modify-write (including the counter increment) is exclusive.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    state: RwLock<State>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn create(
        &self,
        id: InvoiceId,
        items: Vec<InvoiceLineItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        let mut state = self.write();

        let number = state.last_number + 1;
        let invoice = Invoice::open(id, number, items, now)?;

        state.last_number = number;
        state.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    fn get(&self, id: &InvoiceId) -> Option<Invoice> {
        self.read().invoices.get(id).cloned()
    }

    fn list(&self) -> Vec<Invoice> {
        let state = self.read();
        let mut invoices: Vec<Invoice> = state.invoices.values().cloned().collect();
        invoices.sort_by_key(|i| i.number());
        invoices
    }

    fn claim_for_close(&self, id: &InvoiceId) -> Result<Invoice, CloseClaimError> {
        let mut state = self.write();

        let invoice = state
            .invoices
            .get(id)
            .cloned()
            .ok_or(CloseClaimError::NotFound(*id))?;
        if !invoice.is_open() {
            return Err(CloseClaimError::AlreadyClosed {
                invoice_id: *id,
                number: invoice.number(),
            });
        }
        if !state.closing.insert(*id) {
            return Err(CloseClaimError::InProgress(*id));
        }
        Ok(invoice)
    }

    fn release_close(&self, id: &InvoiceId) {
        self.write().closing.remove(id);
    }

    fn complete_close(&self, id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice, CloseClaimError> {
        let mut state = self.write();

        if !state.closing.contains(id) {
            return Err(CloseClaimError::NotClaimed(*id));
        }
        let invoice = state
            .invoices
            .get_mut(id)
            .ok_or(CloseClaimError::NotFound(*id))?;
        let number = invoice.number();
        invoice
            .close(now)
            .map_err(|_| CloseClaimError::AlreadyClosed { invoice_id: *id, number })?;
        let closed = invoice.clone();

        state.closing.remove(id);
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use stockbill_core::{DomainError, ProductId};
    use stockbill_invoicing::InvoiceStatus;

    fn line(quantity: i64) -> InvoiceLineItem {
        InvoiceLineItem {
            product_id: ProductId::new(),
            product_code: "P-1".to_string(),
            description: "Widget".to_string(),
            quantity,
        }
    }

    fn store_with_invoice() -> (InMemoryInvoiceStore, Invoice) {
        let store = InMemoryInvoiceStore::new();
        let invoice = store.create(InvoiceId::new(), vec![line(1)], Utc::now()).unwrap();
        (store, invoice)
    }

    #[test]
    fn numbers_start_at_one_and_increase() {
        let store = InMemoryInvoiceStore::new();
        let first = store.create(InvoiceId::new(), vec![line(1)], Utc::now()).unwrap();
        let second = store.create(InvoiceId::new(), vec![line(2)], Utc::now()).unwrap();
        assert_eq!(first.number(), 1);
        assert_eq!(second.number(), 2);
    }

    #[test]
    fn rejected_invoice_does_not_consume_a_number() {
        let store = InMemoryInvoiceStore::new();
        let err = store.create(InvoiceId::new(), vec![], Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let ok = store.create(InvoiceId::new(), vec![line(1)], Utc::now()).unwrap();
        assert_eq!(ok.number(), 1);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn concurrent_creation_yields_unique_contiguous_numbers() {
        let store = Arc::new(InMemoryInvoiceStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            store
                                .create(InvoiceId::new(), vec![line(1)], Utc::now())
                                .unwrap()
                                .number()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut numbers: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        numbers.sort_unstable();

        assert_eq!(numbers, (1..=200).collect::<Vec<u64>>());
    }

    #[test]
    fn list_is_ordered_by_number() {
        let store = InMemoryInvoiceStore::new();
        for _ in 0..5 {
            store.create(InvoiceId::new(), vec![line(1)], Utc::now()).unwrap();
        }
        let numbers: Vec<u64> = store.list().iter().map(|i| i.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn second_claim_while_closing_is_in_progress() {
        let (store, invoice) = store_with_invoice();
        let id = invoice.id_typed();

        store.claim_for_close(&id).unwrap();
        assert_eq!(store.claim_for_close(&id), Err(CloseClaimError::InProgress(id)));

        store.release_close(&id);
        assert!(store.claim_for_close(&id).is_ok());
    }

    #[test]
    fn complete_close_flips_status_and_ends_claim() {
        let (store, invoice) = store_with_invoice();
        let id = invoice.id_typed();

        store.claim_for_close(&id).unwrap();
        let closed = store.complete_close(&id, Utc::now()).unwrap();
        assert_eq!(closed.status(), InvoiceStatus::Closed);
        assert!(closed.closed_at().is_some());

        let err = store.claim_for_close(&id).unwrap_err();
        assert_eq!(err, CloseClaimError::AlreadyClosed { invoice_id: id, number: 1 });
    }

    #[test]
    fn complete_close_requires_a_claim() {
        let (store, invoice) = store_with_invoice();
        let id = invoice.id_typed();

        assert_eq!(
            store.complete_close(&id, Utc::now()),
            Err(CloseClaimError::NotClaimed(id))
        );
        assert!(store.get(&id).unwrap().is_open());
    }

    #[test]
    fn claim_on_unknown_invoice_is_not_found() {
        let store = InMemoryInvoiceStore::new();
        let id = InvoiceId::new();
        assert_eq!(store.claim_for_close(&id), Err(CloseClaimError::NotFound(id)));
    }

    #[test]
    fn claim_errors_map_to_taxonomy() {
        use stockbill_core::ErrorKind;
        let id = InvoiceId::new();
        assert_eq!(CloseClaimError::NotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(CloseClaimError::InProgress(id).kind(), ErrorKind::Conflict);
        assert!(matches!(
            DomainError::from(CloseClaimError::AlreadyClosed { invoice_id: id, number: 3 }),
            DomainError::Conflict(_)
        ));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: interleaving valid and invalid creations still yields 1..=n with no gaps.
            #[test]
            fn numbers_are_gapless_over_valid_creations(pattern in proptest::collection::vec(any::<bool>(), 1..60)) {
                let store = InMemoryInvoiceStore::new();
                let mut assigned = Vec::new();
                for valid in &pattern {
                    let items = if *valid { vec![line(1)] } else { vec![] };
                    if let Ok(invoice) = store.create(InvoiceId::new(), items, Utc::now()) {
                        assigned.push(invoice.number());
                    }
                }
                let expected: Vec<u64> = (1..=assigned.len() as u64).collect();
                prop_assert_eq!(assigned, expected);
            }
        }
    }
}
