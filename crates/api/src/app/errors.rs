use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockbill_core::{DomainError, ErrorKind};
use stockbill_infra::invoice_authority::{InvoicingError, ReservationFailure};

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::RemoteUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::BusinessDenial => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let code = match &err {
        DomainError::Validation(_) => "validation_error",
        DomainError::InvariantViolation(_) => "invariant_violation",
        DomainError::InvalidId(_) => "invalid_id",
        DomainError::NotFound(_) => "not_found",
        DomainError::Conflict(_) => "conflict",
    };
    kind_error(err.kind(), code, err.to_string())
}

pub fn invoicing_error_to_response(err: InvoicingError) -> axum::response::Response {
    let kind = err.kind();
    match &err {
        InvoicingError::NoItems => kind_error(kind, "no_items", err.to_string()),
        InvoicingError::InvalidQuantity { .. } => kind_error(kind, "invalid_quantity", err.to_string()),
        InvoicingError::ProductLookupFailed { product_id, .. } => kind_error_with(
            kind,
            "product_lookup_failed",
            err.to_string(),
            json!({ "product_id": product_id }),
        ),
        InvoicingError::InsufficientStock {
            product_id,
            code,
            available,
            requested,
        } => kind_error_with(
            kind,
            "insufficient_stock",
            err.to_string(),
            json!({
                "product_id": product_id,
                "product_code": code,
                "available": available,
                "requested": requested,
            }),
        ),
        InvoicingError::NotFound(_) => kind_error(kind, "not_found", err.to_string()),
        InvoicingError::AlreadyClosed { .. } => kind_error(kind, "already_closed", err.to_string()),
        InvoicingError::CloseInProgress(_) => kind_error(kind, "close_in_progress", err.to_string()),
        InvoicingError::ReservationFailed(ReservationFailure::Unavailable(_)) => {
            kind_error(kind, "inventory_unavailable", err.to_string())
        }
        InvoicingError::ReservationFailed(ReservationFailure::Denied { outcomes }) => kind_error_with(
            kind,
            "reservation_denied",
            err.to_string(),
            json!({ "outcomes": outcomes }),
        ),
        InvoicingError::Store(inner) => domain_error_to_response(inner.clone()),
    }
}

/// Error body for a classified failure. `retryable` tells the caller whether
/// the same request may succeed later without changes.
pub fn kind_error(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status_for(kind),
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "retryable": kind.is_retryable(),
        })),
    )
        .into_response()
}

/// Like [`kind_error`], with a `details` object for the caller to display.
pub fn kind_error_with(
    kind: ErrorKind,
    code: &'static str,
    message: impl Into<String>,
    details: serde_json::Value,
) -> axum::response::Response {
    (
        status_for(kind),
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "retryable": kind.is_retryable(),
            "details": details,
        })),
    )
        .into_response()
}

/// Unclassified failure (e.g. a panicked worker task).
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
