use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};

use procura_auth::Permission;
use procura_core::RequestId;
use procura_infra::store::RequestQuery;
use procura_procurement::Decision;
use tracing::warn;

use crate::app::routes::common::{clock, json_ok};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/:id", get(get_request))
        .route("/:id/decision", post(decide_request))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateRequestBody>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&principal, &Permission::CREATE_REQUEST) {
        return errors::forbidden(e);
    }

    let input = match body.into_new_request() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (today, now) = clock();
    match services
        .requests
        .create(principal.user_id(), input, today, now)
        .await
    {
        Ok(details) => json_ok(StatusCode::CREATED, dto::request_to_json(&details)),
        Err(e) => errors::procurement_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<dto::ListRequestsParams>,
) -> axum::response::Response {
    let filter = match params.filter() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let query = RequestQuery::new(authz::request_scope(&principal))
        .with_filter(filter)
        .with_pagination(services.listing.pagination(params.page, params.per_page));

    match services.requests.list(&query).await {
        Ok(page) => json_ok(StatusCode::OK, dto::page_to_json(&page)),
        Err(e) => errors::procurement_error_to_response(e),
    }
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .requests
        .get(id, authz::request_scope(&principal))
        .await
    {
        Ok(details) => json_ok(StatusCode::OK, dto::request_to_json(&details)),
        Err(e) => errors::procurement_error_to_response(e),
    }
}

pub async fn decide_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DecisionBody>,
) -> axum::response::Response {
    let grant = match authz::approval_grant(&principal) {
        Ok(g) => g,
        Err(e) => return errors::forbidden(e),
    };

    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let decision: Decision = match body.status.parse() {
        Ok(d) => d,
        Err(e) => {
            return errors::procurement_error_to_response(
                procura_infra::ProcurementError::from(e),
            );
        }
    };

    let (_, now) = clock();
    match services
        .approvals
        .decide(id, decision, grant, body.notes, now)
        .await
    {
        Ok(outcome) => {
            // The decision is committed; a failed join only thins the body.
            let mut json = match services.requests.details(outcome.request.clone()).await {
                Ok(details) => dto::request_to_json(&details),
                Err(e) => {
                    warn!(request_id = %id, error = %e, "decided request could not be joined");
                    dto::decided_request_to_json(&outcome.request)
                }
            };
            if let Some(obj) = json.as_object_mut() {
                obj.insert("event_type".into(), outcome.event.event_type().into());
            }
            json_ok(StatusCode::OK, json)
        }
        Err(e) => errors::procurement_error_to_response(e),
    }
}
