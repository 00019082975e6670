use serde::Deserialize;

use stockbill_core::{ErrorKind, InvoiceId, ProductId};
use stockbill_inventory::{NewProduct, ProductUpdate, ReservationBatch, ReservationRequest};
use stockbill_invoicing::NewInvoiceItem;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub code: String,
    pub description: String,
    pub balance: i64,
}

impl From<ProductRequest> for NewProduct {
    fn from(value: ProductRequest) -> Self {
        NewProduct {
            code: value.code,
            description: value.description,
            balance: value.balance,
        }
    }
}

impl From<ProductRequest> for ProductUpdate {
    fn from(value: ProductRequest) -> Self {
        ProductUpdate {
            code: value.code,
            description: value.description,
            balance: value.balance,
        }
    }
}

/// Reservation body: either a full batch object or a bare list of items.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReserveRequest {
    Batch(ReservationBatch),
    Items(Vec<ReservationRequest>),
}

impl From<ReserveRequest> for ReservationBatch {
    fn from(value: ReserveRequest) -> Self {
        match value {
            ReserveRequest::Batch(batch) => batch,
            ReserveRequest::Items(items) => ReservationBatch::new(items),
        }
    }
}

/// `?quantity=N` on the availability check.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    #[serde(default)]
    pub items: Vec<InvoiceItemRequest>,
}

impl CreateInvoiceRequest {
    pub fn into_items(self) -> Result<Vec<NewInvoiceItem>, axum::response::Response> {
        self.items
            .into_iter()
            .map(|item| {
                Ok(NewInvoiceItem {
                    product_id: parse_product_id(&item.product_id)?,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}

// -------------------------
// Path parsing
// -------------------------

pub fn parse_product_id(s: &str) -> Result<ProductId, axum::response::Response> {
    s.parse()
        .map_err(|_| errors::kind_error(ErrorKind::Validation, "invalid_id", "invalid product id"))
}

pub fn parse_invoice_id(s: &str) -> Result<InvoiceId, axum::response::Response> {
    s.parse()
        .map_err(|_| errors::kind_error(ErrorKind::Validation, "invalid_id", "invalid invoice id"))
}
