use super::{validate_bucket, validate_max_results, validate_project_key};
use crate::error::AppError;
use crate::importer::ImportRequest;
use crate::jira_client::DEFAULT_MAX_RESULTS;
use crate::models::ImportResult;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct ProjectImportPayload {
    #[serde(default)]
    project_key: String,
    #[serde(default = "default_bucket")]
    bucket: String,
    #[serde(default = "default_include_subtasks")]
    include_subtasks: bool,
    max_results: Option<i64>,
    issue_type: Option<String>,
}

fn default_bucket() -> String {
    "jira-project-docs".to_string()
}

fn default_include_subtasks() -> bool {
    true
}

impl ProjectImportPayload {
    fn validate(self) -> Result<ImportRequest, AppError> {
        Ok(ImportRequest {
            project_key: validate_project_key(&self.project_key)?,
            bucket: validate_bucket(&self.bucket)?,
            include_subtasks: self.include_subtasks,
            max_results: validate_max_results(self.max_results, DEFAULT_MAX_RESULTS)?,
            issue_type: self
                .issue_type
                .map(|issue_type| issue_type.trim().to_string())
                .filter(|issue_type| !issue_type.is_empty()),
        })
    }
}

pub async fn import_project(
    State(state): State<AppState>,
    payload: Result<Json<ProjectImportPayload>, JsonRejection>,
) -> Result<Json<ImportResult>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let request = payload.validate()?;

    let result = state.importer.process_project_issues(&request).await?;
    Ok(Json(result))
}
