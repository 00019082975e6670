//! `stockbill-core`: shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns)
//! used by both the inventory and the invoicing side.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{InvoiceId, ProductId};
