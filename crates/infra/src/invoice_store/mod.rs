//! Invoice store boundary.
//!
//! Owns the invoices, the sequence counter and the set of invoices currently
//! being closed. Callers only see snapshots.

pub mod in_memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockbill_core::{DomainError, DomainResult, ErrorKind, InvoiceId};
use stockbill_invoicing::{Invoice, InvoiceLineItem};

pub use in_memory::InMemoryInvoiceStore;

/// Why an invoice could not be claimed for (or finish) closing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CloseClaimError {
    #[error("invoice {0} not found")]
    NotFound(InvoiceId),

    #[error("invoice {number} is already closed")]
    AlreadyClosed { invoice_id: InvoiceId, number: u64 },

    #[error("invoice {0} is already being closed")]
    InProgress(InvoiceId),

    #[error("invoice {0} was not claimed for closing")]
    NotClaimed(InvoiceId),
}

impl CloseClaimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloseClaimError::NotFound(_) => ErrorKind::NotFound,
            CloseClaimError::AlreadyClosed { .. }
            | CloseClaimError::InProgress(_)
            | CloseClaimError::NotClaimed(_) => ErrorKind::Conflict,
        }
    }
}

impl From<CloseClaimError> for DomainError {
    fn from(value: CloseClaimError) -> Self {
        match value {
            CloseClaimError::NotFound(id) => DomainError::not_found(format!("invoice {id}")),
            other => DomainError::conflict(other.to_string()),
        }
    }
}

pub trait InvoiceStore: Send + Sync {
    /// Assign the next sequence number and persist a new OPEN invoice, as one
    /// step under the store's exclusive lock. A number is consumed only when
    /// the invoice is actually stored.
    fn create(
        &self,
        id: InvoiceId,
        items: Vec<InvoiceLineItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice>;

    fn get(&self, id: &InvoiceId) -> Option<Invoice>;

    /// All invoices, ordered by sequence number.
    fn list(&self) -> Vec<Invoice>;

    /// Check OPEN and mark the invoice as being closed, atomically.
    fn claim_for_close(&self, id: &InvoiceId) -> Result<Invoice, CloseClaimError>;

    /// Drop a claim without changing the invoice (close failed).
    fn release_close(&self, id: &InvoiceId);

    /// Re-validate OPEN + claim, then flip to CLOSED and drop the claim.
    fn complete_close(&self, id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice, CloseClaimError>;
}

impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    fn create(
        &self,
        id: InvoiceId,
        items: Vec<InvoiceLineItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        (**self).create(id, items, now)
    }

    fn get(&self, id: &InvoiceId) -> Option<Invoice> {
        (**self).get(id)
    }

    fn list(&self) -> Vec<Invoice> {
        (**self).list()
    }

    fn claim_for_close(&self, id: &InvoiceId) -> Result<Invoice, CloseClaimError> {
        (**self).claim_for_close(id)
    }

    fn release_close(&self, id: &InvoiceId) {
        (**self).release_close(id)
    }

    fn complete_close(&self, id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice, CloseClaimError> {
        (**self).complete_close(id, now)
    }
}
