use crate::config::JiraConfig;
use crate::models::*;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream};
use regex::Regex;
use reqwest::{header, StatusCode, Url};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Default upper bound on issues fetched for one project.
pub const DEFAULT_MAX_RESULTS: usize = 1000;

static ISSUE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"^[A-Za-z][A-Za-z0-9_]*-\d+$") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });
static ISSUE_URL_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"/(?:browse|issues)/([A-Z][A-Z0-9_]*-\d+)(?:/|$)") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

/// `ABC-12` style key.
pub fn is_issue_key(value: &str) -> bool {
    ISSUE_KEY_RE.is_match(value)
}

/// Extracts the issue key from a browser URL:
/// - `https://example.atlassian.net/browse/ABC-12`
/// - `https://example.atlassian.net/jira/browse/ABC-12`
/// - `https://example.atlassian.net/projects/ABC/issues/ABC-12`
pub fn issue_key_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    ISSUE_URL_PATH_RE
        .captures(parsed.path())
        .and_then(|caps| caps.get(1))
        .map(|key| key.as_str().to_string())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("{0}")]
    NotFound(String),
    #[error("Jira request failed: {0}")]
    ExternalService(String),
    /// Jira rejected the request as malformed, e.g. an unknown issue type in JQL.
    #[error("Jira rejected the request: {0}")]
    InvalidRequest(String),
    #[error("Rate limited by Jira: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TrackerError::ExternalService(format!("request timed out: {err}"))
        } else if err.is_decode() {
            TrackerError::ExternalService(format!("unexpected response body: {err}"))
        } else {
            TrackerError::ExternalService(err.to_string())
        }
    }
}

pub type IssueStream<'a> = BoxStream<'a, Result<JiraIssue, TrackerError>>;

/// Read-only view of the issue tracker used by the importer.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_project_info(&self, project_key: &str) -> Result<JiraProject, TrackerError>;

    fn fetch_all_project_issues<'a>(&'a self, project_key: &str, max_results: usize) -> IssueStream<'a>;

    fn fetch_project_issues_by_type<'a>(
        &'a self,
        project_key: &str,
        issue_type: &str,
        max_results: usize,
    ) -> IssueStream<'a>;

    fn search_issues<'a>(&'a self, jql: &str, max_results: usize) -> IssueStream<'a>;

    async fn fetch_issue(&self, issue_key: &str) -> Result<JiraIssue, TrackerError>;

    /// Minimal record (key, summary, status) of a sub-item.
    async fn fetch_sub_item(&self, issue_key: &str) -> Result<SubItem, TrackerError>;

    async fn get_myself(&self) -> Result<JiraUser, TrackerError>;

    fn browse_url(&self, issue_key: &str) -> String;
}

pub struct JiraClient {
    client: reqwest::Client,
    base_url: String,
    user: Option<String>,
    token: String,
    page_size: usize,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            token: config.token.clone(),
            page_size: config.page_size.max(1),
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(header::ACCEPT, "application/json");
        match &self.user {
            Some(user) => request.basic_auth(user, Some(&self.token)),
            None => request.bearer_auth(&self.token),
        }
    }

    async fn _get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, TrackerError> {
        let response = self.request(path).query(query).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TrackerError::ExternalService(
                format!("authentication failed while fetching {what} ({status})"),
            )),
            StatusCode::NOT_FOUND => Err(TrackerError::NotFound(format!("{what} not found"))),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(TrackerError::RateLimited {
                    message: format!("too many requests while fetching {what}"),
                    retry_after,
                })
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(bad_request_error(&error_messages(&body), what))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(TrackerError::ExternalService(format!(
                    "{what} returned {status}: {}",
                    error_messages(&body).join("; ")
                )))
            }
        }
    }

    /// Pages through `/rest/api/2/search` with `startAt`/`maxResults`. This is
    /// the Data Center and Server search API; Jira Cloud has moved to
    /// `/rest/api/3/search/jql` with `nextPageToken` paging.
    fn search_stream<'a>(
        &'a self,
        jql: String,
        max_results: usize,
    ) -> impl Stream<Item = Result<JiraIssue, TrackerError>> + Send + 'a {
        async_stream::try_stream! {
            let mut start_at = 0usize;

            while start_at < max_results {
                let page_len = self.page_size.min(max_results - start_at);
                let page: IssueListResponse = self
                    ._get(
                        "/rest/api/2/search",
                        &[
                            ("jql", jql.clone()),
                            ("startAt", start_at.to_string()),
                            ("maxResults", page_len.to_string()),
                            ("expand", "subtasks".to_string()),
                        ],
                        "issue search",
                    )
                    .await?;

                let total = usize::try_from(page.total).unwrap_or(usize::MAX);
                let received = page.issues.len();
                tracing::debug!(
                    jql = %jql,
                    start_at = page.start_at,
                    page_size = page.max_results,
                    received,
                    total,
                    "Fetched issue page"
                );

                for issue in page.issues.into_iter().take(page_len) {
                    yield issue;
                }

                start_at += received.min(page_len);
                if received == 0 || start_at >= total {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn get_project_info(&self, project_key: &str) -> Result<JiraProject, TrackerError> {
        self._get(
            &format!("/rest/api/2/project/{project_key}"),
            &[],
            &format!("project '{project_key}'"),
        )
        .await
    }

    fn fetch_all_project_issues<'a>(&'a self, project_key: &str, max_results: usize) -> IssueStream<'a> {
        let jql = format!("project = {} ORDER BY key ASC", jql_string(project_key));
        Box::pin(self.search_stream(jql, max_results))
    }

    fn fetch_project_issues_by_type<'a>(
        &'a self,
        project_key: &str,
        issue_type: &str,
        max_results: usize,
    ) -> IssueStream<'a> {
        let jql = format!(
            "project = {} AND issuetype = {} ORDER BY key ASC",
            jql_string(project_key),
            jql_string(issue_type)
        );
        Box::pin(self.search_stream(jql, max_results))
    }

    fn search_issues<'a>(&'a self, jql: &str, max_results: usize) -> IssueStream<'a> {
        Box::pin(self.search_stream(jql.to_string(), max_results))
    }

    async fn fetch_issue(&self, issue_key: &str) -> Result<JiraIssue, TrackerError> {
        self._get(
            &format!("/rest/api/2/issue/{issue_key}"),
            &[],
            &format!("issue '{issue_key}'"),
        )
        .await
    }

    async fn fetch_sub_item(&self, issue_key: &str) -> Result<SubItem, TrackerError> {
        let issue: JiraIssue = self
            ._get(
                &format!("/rest/api/2/issue/{issue_key}"),
                &[("fields", "summary,status".to_string())],
                &format!("issue '{issue_key}'"),
            )
            .await?;

        Ok(SubItem {
            key: issue.key,
            summary: issue.fields.summary,
            status: issue.fields.status.and_then(|status| status.name),
        })
    }

    async fn get_myself(&self) -> Result<JiraUser, TrackerError> {
        self._get("/rest/api/2/myself", &[], "current user").await
    }

    fn browse_url(&self, issue_key: &str) -> String {
        format!("{}/browse/{}", self.base_url, issue_key)
    }
}

/// Quotes a value for use as a JQL string literal.
fn jql_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn error_messages(body: &str) -> Vec<String> {
    match serde_json::from_str::<JiraErrorBody>(body) {
        Ok(parsed) if !parsed.error_messages.is_empty() || !parsed.errors.is_empty() => parsed
            .error_messages
            .into_iter()
            .chain(parsed.errors.into_iter().map(|(field, message)| format!("{field}: {message}")))
            .collect(),
        _ => vec![body.chars().take(200).collect()],
    }
}

/// Jira answers a search on an unknown project with 400 and
/// "The value 'X' does not exist for the field 'project'.".
fn bad_request_error(messages: &[String], what: &str) -> TrackerError {
    let details = messages.join("; ");
    let unknown_project = messages
        .iter()
        .any(|message| message.contains("does not exist for the field 'project'"));
    if unknown_project {
        TrackerError::NotFound(details)
    } else {
        TrackerError::InvalidRequest(format!("{what}: {details}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::{Json, Router};
    use futures_util::TryStreamExt;
    use std::collections::HashMap;

    const ISSUE_COUNT: usize = 250;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String, page_size: usize) -> JiraClient {
        JiraClient::new(&JiraConfig {
            base_url,
            user: Some("dev@example.com".to_string()),
            token: "secret".to_string(),
            timeout: Duration::from_secs(5),
            page_size,
        })
        .unwrap()
    }

    async fn search(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        let start_at: usize = params["startAt"].parse().unwrap();
        let max_results: usize = params["maxResults"].parse().unwrap();
        // Mimic the server-side cap Jira applies regardless of maxResults.
        let end = (start_at + max_results.min(100)).min(ISSUE_COUNT);
        let issues: Vec<serde_json::Value> = (start_at..end)
            .map(|index| {
                serde_json::json!({
                    "key": format!("DEMO-{}", index + 1),
                    "fields": {
                        "summary": format!("Issue {}", index + 1),
                        "issuetype": { "name": "Task" }
                    }
                })
            })
            .collect();
        Json(serde_json::json!({
            "startAt": start_at,
            "maxResults": max_results,
            "total": ISSUE_COUNT,
            "issues": issues
        }))
    }

    async fn project(Path(key): Path<String>) -> Result<Json<serde_json::Value>, StatusCode> {
        if key == "DEMO" {
            Ok(Json(serde_json::json!({ "id": "10000", "key": "DEMO", "name": "Demo project" })))
        } else {
            Err(StatusCode::NOT_FOUND)
        }
    }

    async fn issue(Path(key): Path<String>, headers: HeaderMap) -> Json<serde_json::Value> {
        assert!(headers.contains_key(header::AUTHORIZATION));
        Json(serde_json::json!({
            "key": key,
            "fields": { "summary": "Write migration", "status": { "name": "Done" } }
        }))
    }

    fn fake_jira() -> Router {
        Router::new()
            .route("/rest/api/2/search", get(search))
            .route("/rest/api/2/project/{key}", get(project))
            .route("/rest/api/2/issue/{key}", get(issue))
    }

    #[tokio::test]
    async fn test_pages_through_all_issues() {
        let client = client_for(serve(fake_jira()).await, 100);

        let issues: Vec<JiraIssue> = client
            .fetch_all_project_issues("DEMO", DEFAULT_MAX_RESULTS)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(issues.len(), ISSUE_COUNT);
        assert_eq!(issues[0].key, "DEMO-1");
        assert_eq!(issues[ISSUE_COUNT - 1].key, "DEMO-250");
    }

    #[tokio::test]
    async fn test_stops_at_max_results() {
        let client = client_for(serve(fake_jira()).await, 100);

        let issues: Vec<JiraIssue> = client
            .fetch_all_project_issues("DEMO", 130)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(issues.len(), 130);
        assert_eq!(issues[129].key, "DEMO-130");
    }

    #[tokio::test]
    async fn test_follows_server_side_page_cap() {
        // Requested pages of 500 are truncated to 100 by the tracker.
        let client = client_for(serve(fake_jira()).await, 500);

        let issues: Vec<JiraIssue> = client
            .search_issues("project = DEMO", DEFAULT_MAX_RESULTS)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(issues.len(), ISSUE_COUNT);
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let client = client_for(serve(fake_jira()).await, 100);

        let project = client.get_project_info("DEMO").await.unwrap();
        assert_eq!(project.name, "Demo project");

        let err = client.get_project_info("NOPE").await.unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_sub_item() {
        let client = client_for(serve(fake_jira()).await, 100);

        let sub_item = client.fetch_sub_item("DEMO-4").await.unwrap();

        assert_eq!(
            sub_item,
            SubItem {
                key: "DEMO-4".to_string(),
                summary: Some("Write migration".to_string()),
                status: Some("Done".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let app = Router::new().route(
            "/rest/api/2/search",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "7")], "") }),
        );
        let client = client_for(serve(app).await, 100);

        let err = client
            .fetch_all_project_issues("DEMO", 10)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TrackerError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn test_auth_failure_is_external_service_error() {
        let app = Router::new().route(
            "/rest/api/2/myself",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let client = client_for(serve(app).await, 100);

        let err = client.get_myself().await.unwrap_err();

        assert!(matches!(err, TrackerError::ExternalService(message) if message.contains("authentication failed")));
    }

    #[tokio::test]
    async fn test_search_on_unknown_project_is_not_found() {
        let app = Router::new().route(
            "/rest/api/2/search",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "errorMessages": ["The value 'NOPE' does not exist for the field 'project'."]
                    })),
                )
            }),
        );
        let client = client_for(serve(app).await, 100);

        let err = client
            .fetch_all_project_issues("NOPE", 10)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::NotFound(message) if message.contains("'NOPE' does not exist")));
    }

    #[tokio::test]
    async fn test_unknown_issue_type_is_invalid_request() {
        let app = Router::new().route(
            "/rest/api/2/search",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "errorMessages": ["The value 'Spike' does not exist for the field 'issuetype'."]
                    })),
                )
            }),
        );
        let client = client_for(serve(app).await, 100);

        let err = client
            .fetch_project_issues_by_type("DEMO", "Spike", 10)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::InvalidRequest(message) if message.contains("'issuetype'")));
    }

    #[tokio::test]
    async fn test_slow_tracker_times_out() {
        let app = Router::new().route(
            "/rest/api/2/myself",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "displayName": "Too late" }))
            }),
        );
        let client = JiraClient::new(&JiraConfig {
            base_url: serve(app).await,
            user: None,
            token: "secret".to_string(),
            timeout: Duration::from_millis(200),
            page_size: 100,
        })
        .unwrap();

        let err = client.get_myself().await.unwrap_err();

        assert!(matches!(err, TrackerError::ExternalService(message) if message.contains("timed out")));
    }

    #[tokio::test]
    async fn test_fetch_issue() {
        let client = client_for(serve(fake_jira()).await, 100);

        let issue = client.fetch_issue("DEMO-9").await.unwrap();

        assert_eq!(issue.key, "DEMO-9");
        assert_eq!(issue.fields.summary.as_deref(), Some("Write migration"));
    }

    #[test]
    fn test_other_bad_requests_keep_field_errors() {
        let messages = error_messages(r#"{"errorMessages":[],"errors":{"jql":"Error in the JQL Query"}}"#);
        assert_eq!(messages, vec!["jql: Error in the JQL Query".to_string()]);

        let err = bad_request_error(&messages, "issue search");
        assert_eq!(
            err,
            TrackerError::InvalidRequest("issue search: jql: Error in the JQL Query".to_string())
        );
    }

    #[test]
    fn test_issue_key_from_url() {
        assert_eq!(
            issue_key_from_url("https://example.atlassian.net/browse/DEMO-12"),
            Some("DEMO-12".to_string())
        );
        assert_eq!(
            issue_key_from_url("https://example.atlassian.net/jira/browse/DEMO-12?focusedCommentId=3"),
            Some("DEMO-12".to_string())
        );
        assert_eq!(
            issue_key_from_url("https://example.atlassian.net/projects/DEMO/issues/DEMO-7/"),
            Some("DEMO-7".to_string())
        );
        assert_eq!(issue_key_from_url("https://example.atlassian.net/browse/DEMO"), None);
        assert_eq!(issue_key_from_url("https://example.atlassian.net/browse/DEMO-1x"), None);
        assert_eq!(issue_key_from_url("ftp://example.com/browse/DEMO-1"), None);
        assert_eq!(issue_key_from_url("not a url"), None);
    }

    #[test]
    fn test_is_issue_key() {
        assert!(is_issue_key("DEMO-1"));
        assert!(is_issue_key("demo_2-15"));
        assert!(!is_issue_key("DEMO"));
        assert!(!is_issue_key("DEMO-1/../x"));
        assert!(!is_issue_key("1-DEMO"));
    }

    #[test]
    fn test_jql_string_escapes_quotes() {
        assert_eq!(jql_string("Sub-task"), "\"Sub-task\"");
        assert_eq!(jql_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_browse_url() {
        let client = client_for("https://example.atlassian.net/".to_string(), 100);
        assert_eq!(
            client.browse_url("DEMO-1"),
            "https://example.atlassian.net/browse/DEMO-1"
        );
    }
}
