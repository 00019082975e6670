//! Inventory domain module.
//!
//! This crate contains business rules for products and stock balances,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Locking and atomicity live with the ledger in `stockbill-infra`.

pub mod product;
pub mod reservation;

pub use product::{DebitError, NewProduct, Product, ProductUpdate};
pub use reservation::{
    all_succeeded, DenialReason, ReservationBatch, ReservationOutcome, ReservationRequest,
};
