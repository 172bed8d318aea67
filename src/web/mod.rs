pub mod projects;
pub mod questionnaires;
pub mod reports;
pub mod responses;

use axum::routing::get;
use axum::Router;

use crate::state::SharedState;

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/questionnaire", questionnaires::router(state.clone()))
        .nest("/api/response", responses::router(state.clone()))
        .nest("/api/project", projects::router(state.clone()))
        .nest("/api/report", reports::router(state))
}
