use axum::{routing::get, Router};

pub mod invoices;
pub mod products;
pub mod system;

/// Routes served by the inventory service.
pub fn inventory_router() -> Router {
    Router::new()
        .route("/health", get(system::inventory_health))
        .nest("/api/products", products::router())
}

/// Routes served by the billing service.
pub fn billing_router() -> Router {
    Router::new()
        .route("/health", get(system::billing_health))
        .nest("/api/invoices", invoices::router())
}
