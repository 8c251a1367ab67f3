use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode};

use crate::app::routes::common::json_ok;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub async fn get_dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services
        .dashboard
        .stats(authz::request_scope(&principal))
        .await
    {
        Ok(stats) => json_ok(StatusCode::OK, dto::dashboard_to_json(&stats)),
        Err(e) => errors::procurement_error_to_response(e),
    }
}
