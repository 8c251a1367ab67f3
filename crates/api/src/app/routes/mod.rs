use axum::{Router, routing::get};

pub mod common;
pub mod dashboard;
pub mod items;
pub mod procurement;
pub mod system;
pub mod venues;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/dashboard", get(dashboard::get_dashboard))
        .nest("/venues", venues::router())
        .nest("/items", items::router())
        .nest("/procurement-requests", procurement::router())
}
