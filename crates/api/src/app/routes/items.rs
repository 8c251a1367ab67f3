use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};

use procura_core::ItemId;

use crate::app::routes::common::json_ok;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items))
        .route("/:id/availability", get(get_availability))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger.catalog().await {
        Ok(items) => json_ok(
            StatusCode::OK,
            serde_json::Value::Array(items.iter().map(dto::availability_to_json).collect()),
        ),
        Err(e) => errors::procurement_error_to_response(e),
    }
}

pub async fn get_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.position(id).await {
        Ok(availability) => json_ok(StatusCode::OK, dto::availability_to_json(&availability)),
        Err(e) => errors::procurement_error_to_response(e),
    }
}
