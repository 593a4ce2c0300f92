use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockflow_infra::{ServiceError, StoreError};

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        ServiceError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "stock move not found"),
        ServiceError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::InsufficientStock {
            warehouse_id,
            product_id,
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock for product {product_id} in warehouse {warehouse_id}"
                ),
                "warehouse_id": warehouse_id,
                "product_id": product_id,
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            let message = match e {
                StoreError::Backend(_) => "storage backend failure".to_string(),
                other => other.to_string(),
            };
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
        ServiceError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

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

/// Parse a path identifier, mapping failures to a 400 `invalid_id` response.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
