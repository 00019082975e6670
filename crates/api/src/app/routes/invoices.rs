use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::services::BillingServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/print", post(print_invoice))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<BillingServices>>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let items = match body.into_items() {
        Ok(items) => items,
        Err(res) => return res,
    };
    match services.authority.create_invoice(items).await {
        Ok(invoice) => (StatusCode::CREATED, Json(invoice)).into_response(),
        Err(e) => errors::invoicing_error_to_response(e),
    }
}

pub async fn list_invoices(Extension(services): Extension<Arc<BillingServices>>) -> axum::response::Response {
    let items = services.authority.list_invoices();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.authority.get_invoice(&id) {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => errors::invoicing_error_to_response(e),
    }
}

/// Close the invoice: reserve its items at inventory, then flip to CLOSED.
pub async fn print_invoice(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.authority.close_invoice(id).await {
        Ok(invoice) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "invoice closed",
                "invoice": invoice,
            })),
        )
            .into_response(),
        Err(e) => errors::invoicing_error_to_response(e),
    }
}
