use super::{validate_bucket, validate_max_results};
use crate::error::AppError;
use crate::importer::SearchImportRequest;
use crate::models::SearchImportResult;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

const DEFAULT_SEARCH_RESULTS: usize = 50;

#[derive(Deserialize)]
pub struct SearchPayload {
    #[serde(default)]
    jql: String,
    #[serde(default = "default_bucket")]
    bucket: String,
    #[serde(default)]
    include_subtasks: bool,
    max_results: Option<i64>,
}

fn default_bucket() -> String {
    "jira-docs".to_string()
}

pub async fn search_issues(
    State(state): State<AppState>,
    payload: Result<Json<SearchPayload>, JsonRejection>,
) -> Result<Json<SearchImportResult>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let jql = payload.jql.trim();
    if jql.is_empty() {
        return Err(AppError::Validation("jql must not be empty".to_string()));
    }

    let request = SearchImportRequest {
        jql: jql.to_string(),
        bucket: validate_bucket(&payload.bucket)?,
        include_subtasks: payload.include_subtasks,
        max_results: validate_max_results(payload.max_results, DEFAULT_SEARCH_RESULTS)?,
    };
    let result = state.importer.import_search(&request).await?;
    Ok(Json(result))
}
