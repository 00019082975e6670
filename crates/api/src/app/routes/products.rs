use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockbill_inventory::ReservationBatch;

use crate::app::services::InventoryServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/reserve", post(reserve))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/:id/availability", get(check_availability))
}

pub async fn create_product(
    Extension(services): Extension<Arc<InventoryServices>>,
    Json(body): Json<dto::ProductRequest>,
) -> axum::response::Response {
    match services.inventory.create_product(body.into()) {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_products(Extension(services): Extension<Arc<InventoryServices>>) -> axum::response::Response {
    let items = services.inventory.list_products();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<InventoryServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.inventory.get_product(&id) {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<InventoryServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ProductRequest>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.inventory.update_product(&id, body.into()) {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<InventoryServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.inventory.delete_product(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Advisory only: nothing is reserved.
pub async fn check_availability(
    Extension(services): Extension<Arc<InventoryServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::AvailabilityQuery>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.inventory.check_availability(&id, query.quantity) {
        Ok(available) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "product_id": id,
                "quantity": query.quantity,
                "available": available,
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Always 200 with one outcome per item; denials are in the outcomes.
pub async fn reserve(
    Extension(services): Extension<Arc<InventoryServices>>,
    Json(body): Json<dto::ReserveRequest>,
) -> axum::response::Response {
    let batch = ReservationBatch::from(body);
    let inventory = services.inventory.clone();

    match tokio::task::spawn_blocking(move || inventory.reserve_batch(&batch)).await {
        Ok(outcomes) => (StatusCode::OK, Json(outcomes)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "reservation task failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "reservation task failed")
        }
    }
}
