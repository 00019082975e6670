//! Invoicing domain module.
//!
//! This crate contains business rules for invoices (creation, the
//! OPEN → CLOSED transition, line-item snapshots), implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod invoice;

pub use invoice::{Invoice, InvoiceLineItem, InvoiceStatus, NewInvoiceItem, ProductInfo};
