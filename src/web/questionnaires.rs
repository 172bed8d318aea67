use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::db::{self, GroupWithLatest, QuestionnaireVersionDetail};
use crate::error::ServiceError;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/groups", get(groups))
        .route("/:id", get(version_detail))
        .with_state(state)
}

async fn groups(
    State(state): State<SharedState>,
) -> Result<Json<Vec<GroupWithLatest>>, ServiceError> {
    let rows = db::list_groups(&state.pool).await?;
    Ok(Json(rows))
}

async fn version_detail(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<QuestionnaireVersionDetail>, ServiceError> {
    let detail = db::get_version_detail(&state.pool, id)
        .await?
        .ok_or(ServiceError::NotFound("questionnaire version"))?;
    Ok(Json(detail))
}
