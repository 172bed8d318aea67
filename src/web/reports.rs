use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::{self, ReportImage, StoredReport};
use crate::domain::Indicator;
use crate::error::ServiceError;
use crate::middleware::rate_limit_middleware;
use crate::services::report::{question_stats_for, ReportBundle};
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    // Only generation fans out to the LLM, so only it is capped; reads and
    // image attachment stay uncapped.
    let capped_generate = post(generate).layer(from_fn_with_state(
        state.limiter.clone(),
        rate_limit_middleware,
    ));
    Router::new()
        // :id is the response id; for the images route it is the report id.
        .route("/:id", capped_generate.get(fetch))
        .route("/:id/images", post(add_image))
        .with_state(state)
}

async fn generate(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<ReportBundle>), ServiceError> {
    let bundle = state.reports.generate_report(id).await?;
    Ok((StatusCode::CREATED, Json(bundle)))
}

#[derive(Serialize)]
struct ReportView {
    report: StoredReport,
    question_stats_text: BTreeMap<Indicator, String>,
}

async fn fetch(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ReportView>, ServiceError> {
    let report = db::get_report_by_response(&state.pool, id)
        .await?
        .ok_or(ServiceError::NotFound("report"))?;

    // Rebuilt from the live answers so edits made after generation show up.
    let question_stats_text = match db::get_response_bundle(&state.pool, id).await? {
        Some(bundle) => question_stats_for(&bundle),
        None => BTreeMap::new(),
    };

    Ok(Json(ReportView {
        report,
        question_stats_text,
    }))
}

#[derive(Deserialize)]
struct NewImage {
    url: String,
    #[serde(default)]
    caption: Option<String>,
}

async fn add_image(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<NewImage>,
) -> Result<(StatusCode, Json<ReportImage>), ServiceError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(ServiceError::BadRequest("image url is required".to_string()));
    }
    if !db::report_exists(&state.pool, id).await? {
        return Err(ServiceError::NotFound("report"));
    }
    let image = db::insert_report_image(&state.pool, id, url, payload.caption.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(image)))
}
