//! Infrastructure layer: stores, services, the inventory client adapter and config.

pub mod config;
pub mod gateway;
pub mod inventory_service;
pub mod invoice_authority;
pub mod invoice_store;
pub mod ledger;
