use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, NaiveDate, Utc};

/// Current instant and the calendar day request dates are checked against.
///
/// Days are UTC days.
pub fn clock() -> (NaiveDate, DateTime<Utc>) {
    let now = Utc::now();
    (now.date_naive(), now)
}

pub fn json_ok(status: StatusCode, body: serde_json::Value) -> axum::response::Response {
    (status, Json(body)).into_response()
}
