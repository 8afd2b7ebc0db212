use super::validate_bucket;
use crate::error::AppError;
use crate::importer::{IssueImportRequest, IssuePreview};
use crate::jira_client::{is_issue_key, issue_key_from_url};
use crate::models::IssueImportResult;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct IssueImportPayload {
    #[serde(default)]
    url: String,
    #[serde(default = "default_bucket")]
    bucket: String,
    #[serde(default = "default_include_subtasks")]
    include_subtasks: bool,
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    #[serde(default = "default_include_subtasks")]
    include_subtasks: bool,
}

fn default_bucket() -> String {
    "jira-docs".to_string()
}

fn default_include_subtasks() -> bool {
    true
}

impl IssueImportPayload {
    fn validate(self) -> Result<IssueImportRequest, AppError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("url must not be empty".to_string()));
        }
        let issue_key = issue_key_from_url(url).ok_or_else(|| {
            AppError::Validation(format!("Could not extract issue key from URL: {url}"))
        })?;

        Ok(IssueImportRequest {
            issue_key,
            bucket: validate_bucket(&self.bucket)?,
            include_subtasks: self.include_subtasks,
        })
    }
}

pub async fn import_issue(
    State(state): State<AppState>,
    payload: Result<Json<IssueImportPayload>, JsonRejection>,
) -> Result<Json<IssueImportResult>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let request = payload.validate()?;

    let result = state.importer.import_issue(&request).await?;
    Ok(Json(result))
}

pub async fn preview_issue(
    State(state): State<AppState>,
    Path(issue_key): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<IssuePreview>, AppError> {
    let issue_key = issue_key.trim();
    if !is_issue_key(issue_key) {
        return Err(AppError::Validation(format!(
            "'{issue_key}' is not a Jira issue key"
        )));
    }

    let preview = state
        .importer
        .preview_issue(issue_key, query.include_subtasks)
        .await?;
    Ok(Json(preview))
}
