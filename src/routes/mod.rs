mod connection;
mod import;
mod issue;
mod project_info;
mod search;

use crate::error::AppError;
use crate::AppState;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
    let jira_routes = Router::new()
        .route("/project/import", post(import::import_project))
        .route("/project/{project_key}/info", get(project_info::project_info))
        .route("/issue/import", post(issue::import_issue))
        .route("/issue/{issue_key}", get(issue::preview_issue))
        .route("/search", post(search::search_issues))
        .route("/test", get(connection::test_connection));

    Router::new()
        .nest("/api/jira", jira_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(state)
}

/// Project keys end up inside JQL, so only plain key characters are accepted.
fn validate_project_key(raw: &str) -> Result<String, AppError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(AppError::Validation("project_key must not be empty".to_string()));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::Validation(format!(
            "project_key '{key}' may only contain letters, digits and underscores"
        )));
    }
    Ok(key.to_string())
}

fn validate_max_results(value: Option<i64>, default: usize) -> Result<usize, AppError> {
    match value {
        None => Ok(default),
        Some(value) if value > 0 => usize::try_from(value)
            .map_err(|_| AppError::Validation(format!("max_results {value} is too large"))),
        Some(value) => Err(AppError::Validation(format!(
            "max_results must be a positive integer, got {value}"
        ))),
    }
}

fn validate_bucket(raw: &str) -> Result<String, AppError> {
    let bucket = raw.trim();
    if bucket.is_empty() {
        return Err(AppError::Validation("bucket must not be empty".to_string()));
    }
    Ok(bucket.to_string())
}
