use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbill_core::{DomainError, DomainResult, Entity, InvoiceId, ProductId};

/// Invoice status lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Open,
    Closed,
}

/// What the invoicing side knows about a product (fetched live from inventory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: ProductId,
    pub code: String,
    pub description: String,
    pub balance: i64,
}

/// Requested line, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Invoice line with the product code/description captured at creation time.
///
/// The snapshot is never refreshed: renaming the product later does not
/// change what a printed invoice shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub product_id: ProductId,
    pub product_code: String,
    pub description: String,
    pub quantity: i64,
}

impl InvoiceLineItem {
    pub fn snapshot(product: &ProductInfo, quantity: i64) -> Self {
        Self {
            product_id: product.id,
            product_code: product.code.clone(),
            description: product.description.clone(),
            quantity,
        }
    }
}

/// Entity: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    number: u64,
    status: InvoiceStatus,
    items: Vec<InvoiceLineItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Build a new OPEN invoice.
    ///
    /// `number` comes from the store's sequence counter and must be positive.
    pub fn open(
        id: InvoiceId,
        number: u64,
        items: Vec<InvoiceLineItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if number == 0 {
            return Err(DomainError::invariant("invoice number must be positive"));
        }
        if items.is_empty() {
            return Err(DomainError::validation("invoice must have at least one item"));
        }
        if let Some(line) = items.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "invalid quantity {} for product {}",
                line.quantity, line.product_id
            )));
        }
        Ok(Self {
            id,
            number,
            status: InvoiceStatus::Open,
            items,
            created_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn items(&self) -> &[InvoiceLineItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_open(&self) -> bool {
        self.status == InvoiceStatus::Open
    }

    /// OPEN → CLOSED. Sets `closed_at` exactly once.
    pub fn close(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::conflict(format!(
                "invoice {} is already closed",
                self.number
            )));
        }
        self.status = InvoiceStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
