use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use stockflow_core::StockMoveId;
use stockflow_inventory::{NewLine, StockMove};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_move))
        .route("/:id", get(get_move))
        .route("/:id/lines", put(replace_lines))
        .route("/:id/submit", post(submit_move))
        .route("/:id/approve", post(approve_move))
        .route("/:id/reject", post(reject_move))
        .route("/:id/history", get(get_history))
        .route("/:id/authorization", get(explain_authorization))
}

fn parse_move_id(id: &str) -> Result<StockMoveId, axum::response::Response> {
    errors::parse_id(id, "stock move")
}

fn move_response(status: StatusCode, result: Result<StockMove, stockflow_infra::ServiceError>) -> axum::response::Response {
    match result {
        Ok(m) => (status, Json(dto::move_to_json(&m))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_move(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Json(body): Json<dto::CreateMoveRequest>,
) -> axum::response::Response {
    let result = services.moves.create(ctx.actor(), body.into()).await;
    move_response(StatusCode::CREATED, result)
}

pub async fn get_move(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    move_response(StatusCode::OK, services.moves.get(move_id).await)
}

/// `PUT /moves/:id/lines`: any authenticated caller may edit a draft; only its
/// creator can submit it afterwards.
pub async fn replace_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReplaceLinesRequest>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let lines = body.lines.into_iter().map(NewLine::from).collect();
    move_response(StatusCode::OK, services.moves.replace_lines(move_id, lines).await)
}

pub async fn submit_move(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    move_response(StatusCode::OK, services.moves.submit(ctx.actor(), move_id).await)
}

pub async fn approve_move(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    move_response(StatusCode::OK, services.moves.approve(ctx.actor(), move_id).await)
}

pub async fn reject_move(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RejectRequest>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    move_response(
        StatusCode::OK,
        services.moves.reject(ctx.actor(), move_id, &body.reason).await,
    )
}

pub async fn get_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.moves.history(move_id).await {
        Ok(history) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "move_id": move_id,
                "entries": history,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Explain whether the caller may perform `?action=` on the move.
pub async fn explain_authorization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::AuthorizationQuery>,
) -> axum::response::Response {
    let move_id = match parse_move_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.moves.explain(ctx.actor(), move_id, query.action).await {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
