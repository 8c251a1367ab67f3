use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::warn;

use procura_auth::AuthzError;
use procura_infra::ProcurementError;

pub fn procurement_error_to_response(err: ProcurementError) -> axum::response::Response {
    match err {
        ProcurementError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ProcurementError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        e @ ProcurementError::AlreadyProcessed { .. } => {
            json_error(StatusCode::CONFLICT, "already_processed", e.to_string())
        }
        ProcurementError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ProcurementError::InsufficientStock {
            item_id,
            item_name,
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock for {item_name}: available {available}, requested {requested}"
                ),
                "item_id": item_id.to_string(),
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        ProcurementError::Invariant(msg) => {
            warn!(error = %msg, "invariant violated");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation", msg)
        }
        ProcurementError::Store(e) => {
            warn!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn forbidden(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
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

pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
