//! HTTP surfaces for the inventory and billing services.

pub mod app;
