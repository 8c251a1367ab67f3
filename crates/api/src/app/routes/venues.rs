use std::sync::Arc;

use axum::{Router, extract::Extension, http::StatusCode, routing::get};

use crate::app::routes::common::json_ok;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", get(list_active_venues))
}

/// Venues that accept new requests, by name.
pub async fn list_active_venues(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.requests.active_venues().await {
        Ok(venues) => json_ok(
            StatusCode::OK,
            serde_json::Value::Array(venues.iter().map(dto::venue_to_json).collect()),
        ),
        Err(e) => errors::procurement_error_to_response(e),
    }
}
