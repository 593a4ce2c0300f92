use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use stockflow_core::{ProductId, WarehouseId};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:warehouse_id/:product_id", get(get_balance))
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path((warehouse_id, product_id)): Path<(String, String)>,
) -> axum::response::Response {
    let warehouse_id: WarehouseId = match errors::parse_id(&warehouse_id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.moves.balance(warehouse_id, product_id).await {
        Ok(quantity) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "warehouse_id": warehouse_id,
                "product_id": product_id,
                "quantity": quantity,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
