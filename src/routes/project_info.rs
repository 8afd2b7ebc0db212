use super::{validate_max_results, validate_project_key};
use crate::error::AppError;
use crate::jira_client::DEFAULT_MAX_RESULTS;
use crate::models::ProjectOverview;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct InfoQuery {
    max_results: Option<i64>,
}

pub async fn project_info(
    State(state): State<AppState>,
    Path(project_key): Path<String>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<ProjectOverview>, AppError> {
    let project_key = validate_project_key(&project_key)?;
    let max_results = validate_max_results(query.max_results, DEFAULT_MAX_RESULTS)?;

    let overview = state
        .importer
        .project_overview(&project_key, max_results)
        .await?;
    Ok(Json(overview))
}
