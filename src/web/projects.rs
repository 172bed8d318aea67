use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, NewPriority, PriorityRow, ProjectRow};
use crate::domain::Indicator;
use crate::error::ServiceError;
use crate::state::SharedState;

const MAX_PROJECTS_PER_USER: i64 = 5;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:id", get(fetch).delete(remove))
        .route("/user/:id", get(by_user))
        .route("/:id/priorities", get(priorities).put(set_priorities))
        .with_state(state)
}

#[derive(Deserialize)]
struct NewProject {
    user_id: Uuid,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create(
    State(state): State<SharedState>,
    Json(payload): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectRow>), ServiceError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ServiceError::BadRequest(
            "project name is required".to_string(),
        ));
    }
    let owned = db::count_projects(&state.pool, payload.user_id).await?;
    if owned >= MAX_PROJECTS_PER_USER {
        return Err(ServiceError::BadRequest(format!(
            "a user can keep at most {MAX_PROJECTS_PER_USER} projects, delete one first"
        )));
    }
    let project = db::create_project(
        &state.pool,
        payload.user_id,
        name,
        payload.description.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn fetch(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ProjectRow>, ServiceError> {
    let project = db::get_project(&state.pool, id)
        .await?
        .ok_or(ServiceError::NotFound("project"))?;
    Ok(Json(project))
}

async fn remove(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    if db::delete_project(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound("project"))
    }
}

async fn by_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ProjectRow>>, ServiceError> {
    let rows = db::list_projects_by_user(&state.pool, id).await?;
    Ok(Json(rows))
}

async fn priorities(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PriorityRow>>, ServiceError> {
    if db::get_project(&state.pool, id).await?.is_none() {
        return Err(ServiceError::NotFound("project"));
    }
    let rows = db::list_project_priorities(&state.pool, id).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct PriorityEntry {
    indicator: String,
    rank: i32,
    #[serde(default)]
    weight: Option<f64>,
}

async fn set_priorities(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<Vec<PriorityEntry>>,
) -> Result<Json<Vec<PriorityRow>>, ServiceError> {
    if db::get_project(&state.pool, id).await?.is_none() {
        return Err(ServiceError::NotFound("project"));
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(payload.len());
    for entry in &payload {
        let indicator = Indicator::try_from(entry.indicator.as_str()).map_err(|_| {
            ServiceError::BadRequest(format!("unknown indicator '{}'", entry.indicator))
        })?;
        if !seen.insert(indicator) {
            return Err(ServiceError::BadRequest(format!(
                "indicator '{}' listed more than once",
                indicator.as_str()
            )));
        }
        entries.push(NewPriority {
            indicator,
            rank: entry.rank,
            weight: entry.weight,
        });
    }

    let rows = db::replace_project_priorities(&state.pool, id, &entries).await?;
    Ok(Json(rows))
}
