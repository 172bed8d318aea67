use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, ResponseBundle, ResponseSummary};
use crate::error::ServiceError;
use crate::services::response::{self, SubmitAnswer, SubmitResponse};
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
        .route("/version/:id", get(by_version))
        .route("/user/:id", get(by_user))
        .route("/project/:id", get(by_project))
        .with_state(state)
}

async fn create(
    State(state): State<SharedState>,
    Json(payload): Json<SubmitResponse>,
) -> Result<(StatusCode, Json<ResponseBundle>), ServiceError> {
    let bundle = response::submit(&state.pool, payload).await?;
    Ok((StatusCode::CREATED, Json(bundle)))
}

async fn fetch(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ResponseBundle>, ServiceError> {
    let bundle = db::get_response_bundle(&state.pool, id)
        .await?
        .ok_or(ServiceError::NotFound("response"))?;
    Ok(Json(bundle))
}

#[derive(Deserialize)]
struct UpdateAnswers {
    answers: Vec<SubmitAnswer>,
}

async fn update(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAnswers>,
) -> Result<Json<ResponseBundle>, ServiceError> {
    let bundle = response::update(&state.pool, id, payload.answers).await?;
    Ok(Json(bundle))
}

async fn remove(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    if db::delete_response(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound("response"))
    }
}

async fn by_version(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ResponseSummary>>, ServiceError> {
    let rows = db::list_responses_by_version(&state.pool, id).await?;
    Ok(Json(rows))
}

async fn by_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ResponseSummary>>, ServiceError> {
    let rows = db::list_responses_by_user(&state.pool, id).await?;
    Ok(Json(rows))
}

async fn by_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ResponseSummary>>, ServiceError> {
    let rows = db::list_responses_by_project(&state.pool, id).await?;
    Ok(Json(rows))
}
