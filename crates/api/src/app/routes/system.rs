use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use procura_auth::Role;

use crate::authz;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let scope = authz::request_scope(&principal);

    Json(serde_json::json!({
        "user_id": principal.user_id().to_string(),
        "name": principal.name(),
        "roles": principal.roles().iter().map(Role::as_str).collect::<Vec<_>>(),
        "sees_all_requests": scope.owner().is_none(),
    }))
}
