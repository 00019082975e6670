use axum::{http::StatusCode, response::IntoResponse, Json};

pub async fn inventory_health() -> impl IntoResponse {
    health("inventory")
}

pub async fn billing_health() -> impl IntoResponse {
    health("billing")
}

fn health(service: &'static str) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": service,
        })),
    )
}
