use crate::blob_store::BlobStore;
use crate::database::DocumentStore;
use crate::error::{AppError, PersistenceError};
use crate::formatter::{format_issue_for_storage, FormattedIssue};
use crate::jira_client::{IssueStream, IssueTracker};
use crate::models::*;
use futures_util::{StreamExt, TryStreamExt};
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub project_key: String,
    pub bucket: String,
    pub include_subtasks: bool,
    pub max_results: usize,
    /// Restricts the import to one issue type when set.
    pub issue_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchImportRequest {
    pub jql: String,
    pub bucket: String,
    pub include_subtasks: bool,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueImportRequest {
    pub issue_key: String,
    pub bucket: String,
    pub include_subtasks: bool,
}

/// Formatted view of one issue, produced without storing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuePreview {
    pub issue_key: String,
    pub formatted_content: FormattedIssue,
    pub subtasks: Vec<SubItem>,
}

/// Why a single issue was not imported. Never fatal to the batch.
#[derive(Error, Debug)]
pub enum IssueFailure {
    #[error("document row write failed: {0}")]
    Row(PersistenceError),
    #[error("blob write failed after document {document_id} was stored: {source}")]
    Blob {
        document_id: i64,
        source: PersistenceError,
    },
    #[error("document row write failed: {row}; blob write failed: {blob}")]
    RowAndBlob {
        row: PersistenceError,
        blob: PersistenceError,
    },
    #[error("import task did not complete: {0}")]
    Aborted(String),
}

/// Only a single-issue import turns an issue failure into a request failure.
impl From<IssueFailure> for AppError {
    fn from(failure: IssueFailure) -> Self {
        match failure {
            IssueFailure::Row(err)
            | IssueFailure::Blob { source: err, .. }
            | IssueFailure::RowAndBlob { row: err, .. } => AppError::Persistence(err),
            IssueFailure::Aborted(message) => AppError::Internal(message),
        }
    }
}

pub struct ProjectImporter {
    tracker: Arc<dyn IssueTracker>,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    concurrency: usize,
}

/// Per-issue pipeline, cloned into each spawned task.
#[derive(Clone)]
struct IssueWorker {
    tracker: Arc<dyn IssueTracker>,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    bucket: Arc<str>,
    include_subtasks: bool,
}

#[derive(Default)]
struct ImportTally {
    document_ids: Vec<i64>,
    processed: usize,
    failed: usize,
}

impl ImportTally {
    fn record(mut self, (issue_key, outcome): (String, Result<i64, IssueFailure>)) -> Self {
        match outcome {
            Ok(document_id) => {
                self.document_ids.push(document_id);
                self.processed += 1;
            }
            Err(err) => {
                tracing::error!(issue_key = %issue_key, error = %err, "Failed to import issue");
                self.failed += 1;
            }
        }
        self
    }
}

impl ProjectImporter {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            tracker,
            documents,
            blobs,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn process_project_issues(&self, request: &ImportRequest) -> Result<ImportResult, AppError> {
        let project = self.tracker.get_project_info(&request.project_key).await?;
        tracing::info!(
            project_key = %project.key,
            project_id = %project.id,
            project_name = %project.name,
            max_results = request.max_results,
            "Importing project issues"
        );

        let stream = match &request.issue_type {
            Some(issue_type) => self.tracker.fetch_project_issues_by_type(
                &request.project_key,
                issue_type,
                request.max_results,
            ),
            None => self
                .tracker
                .fetch_all_project_issues(&request.project_key, request.max_results),
        };
        let issues = collect_issues(stream).await?;
        let total_issues = issues.len();
        let issues_by_type = IssueTypeCounts::tally(&issues);
        debug_assert_eq!(issues_by_type.total(), total_issues);

        let tally = self
            .persist_all(issues, &request.bucket, request.include_subtasks)
            .await;

        let mut message = format!(
            "Successfully processed {} out of {} issues from project '{}'",
            tally.processed, total_issues, project.name
        );
        if tally.failed > 0 {
            message.push_str(&format!(" ({} failed)", tally.failed));
        }
        tracing::info!(
            project_key = %project.key,
            processed = tally.processed,
            failed = tally.failed,
            "Project import finished"
        );

        Ok(ImportResult {
            project_key: request.project_key.clone(),
            project_name: project.name,
            total_issues,
            issues_by_type,
            document_ids: tally.document_ids,
            processed_count: tally.processed,
            failed_count: tally.failed,
            message,
        })
    }

    /// Resolves the project and lists its issues per type without storing anything.
    pub async fn project_overview(&self, project_key: &str, max_results: usize) -> Result<ProjectOverview, AppError> {
        let project = self.tracker.get_project_info(project_key).await?;
        let issues = collect_issues(self.tracker.fetch_all_project_issues(project_key, max_results)).await?;
        let total_issues = issues.len();

        let mut groups = issues.into_iter().into_group_map_by(JiraIssue::issue_type);
        let mut issues_by_type_data = IssuesByTypeData::default();
        for issue_type in IssueType::ALL {
            let briefs = groups.remove(&issue_type).unwrap_or_default().into_iter().map(|issue| IssueBrief {
                summary: issue.fields.summary,
                key: issue.key,
            });
            issues_by_type_data.bucket_mut(issue_type).extend(briefs);
        }

        Ok(ProjectOverview {
            project_key: project_key.to_string(),
            project_name: project.name,
            total_issues,
            issues_by_type: issues_by_type_data.counts(),
            issues_by_type_data,
        })
    }

    /// Imports every issue matching an arbitrary JQL query.
    pub async fn import_search(&self, request: &SearchImportRequest) -> Result<SearchImportResult, AppError> {
        tracing::info!(jql = %request.jql, max_results = request.max_results, "Importing search results");
        let issues = collect_issues(self.tracker.search_issues(&request.jql, request.max_results)).await?;
        let total_found = issues.len();
        if total_found == 0 {
            return Ok(SearchImportResult {
                document_ids: Vec::new(),
                total_found,
                processed_count: 0,
                failed_count: 0,
                message: "No issues found matching the JQL query".to_string(),
            });
        }

        let tally = self
            .persist_all(issues, &request.bucket, request.include_subtasks)
            .await;

        Ok(SearchImportResult {
            message: format!(
                "Successfully processed {} out of {} issues",
                tally.processed, total_found
            ),
            document_ids: tally.document_ids,
            total_found,
            processed_count: tally.processed,
            failed_count: tally.failed,
        })
    }

    /// Imports the single issue `request.issue_key`. Unlike batch imports, a
    /// failed write fails the request.
    pub async fn import_issue(&self, request: &IssueImportRequest) -> Result<IssueImportResult, AppError> {
        let issue = self.tracker.fetch_issue(&request.issue_key).await?;
        let worker = self.worker(&request.bucket, request.include_subtasks);
        let formatted = worker.format(&issue).await;

        let title = formatted.title.clone();
        let filename = formatted.filename.clone();
        let external_link = formatted.external_link.clone();
        let project_name = formatted
            .content
            .project_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        let issue_key = issue.key;
        let task = {
            let issue_key = issue_key.clone();
            tokio::spawn(async move { worker.store(&issue_key, formatted).await })
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(IssueFailure::Aborted(join_err.to_string())),
        };
        let document_id = outcome.inspect_err(|err| {
            tracing::error!(issue_key = %issue_key, error = %err, "Failed to import issue");
        })?;

        Ok(IssueImportResult {
            document_id,
            message: format!("Successfully imported JIRA issue: {issue_key}"),
            title,
            filename,
            issue_key,
            project_name,
            external_link,
        })
    }

    /// Fetches and formats one issue with its sub-items; nothing is stored.
    pub async fn preview_issue(&self, issue_key: &str, include_subtasks: bool) -> Result<IssuePreview, AppError> {
        let issue = self.tracker.fetch_issue(issue_key).await?;
        let sub_items = if include_subtasks {
            fetch_sub_items(self.tracker.as_ref(), &issue).await
        } else {
            Vec::new()
        };
        let external_link = self.tracker.browse_url(&issue.key);
        let formatted_content = format_issue_for_storage(&issue, &sub_items, include_subtasks, &external_link);

        Ok(IssuePreview {
            issue_key: issue.key,
            formatted_content,
            subtasks: sub_items,
        })
    }

    fn worker(&self, bucket: &str, include_subtasks: bool) -> IssueWorker {
        IssueWorker {
            tracker: self.tracker.clone(),
            documents: self.documents.clone(),
            blobs: self.blobs.clone(),
            bucket: Arc::from(bucket),
            include_subtasks,
        }
    }

    /// Runs the per-issue pipeline on at most `concurrency` issues at a time.
    /// Outcomes are folded in fetch order. Each issue runs on its own task, so
    /// an issue already started finishes its writes even if this future is dropped.
    async fn persist_all(&self, issues: Vec<JiraIssue>, bucket: &str, include_subtasks: bool) -> ImportTally {
        let worker = self.worker(bucket, include_subtasks);

        futures_util::stream::iter(issues)
            .map(|issue| {
                let worker = worker.clone();
                let issue_key = issue.key.clone();
                let task = tokio::spawn(async move { worker.import_issue(issue).await });
                async move {
                    let outcome = match task.await {
                        Ok(outcome) => outcome,
                        Err(join_err) => Err(IssueFailure::Aborted(join_err.to_string())),
                    };
                    (issue_key, outcome)
                }
            })
            .buffered(self.concurrency)
            .fold(ImportTally::default(), |tally, outcome| async move { tally.record(outcome) })
            .await
    }
}

impl IssueWorker {
    async fn import_issue(&self, issue: JiraIssue) -> Result<i64, IssueFailure> {
        let formatted = self.format(&issue).await;
        self.store(&issue.key, formatted).await
    }

    async fn format(&self, issue: &JiraIssue) -> FormattedIssue {
        let sub_items = if self.include_subtasks {
            fetch_sub_items(self.tracker.as_ref(), issue).await
        } else {
            Vec::new()
        };

        let external_link = self.tracker.browse_url(&issue.key);
        let formatted = format_issue_for_storage(issue, &sub_items, self.include_subtasks, &external_link);
        tracing::debug!(issue_key = %issue.key, title = %formatted.title, "Formatted issue");
        formatted
    }

    async fn store(&self, issue_key: &str, formatted: FormattedIssue) -> Result<i64, IssueFailure> {
        let (document, text) = formatted.into_document(&self.bucket);

        // Both writes are attempted regardless of the other's outcome.
        let row = self.documents.create_document(&document).await;
        let blob = self
            .blobs
            .put(&self.bucket, &document.filename, text.as_bytes())
            .await;

        match (row, blob) {
            (Ok(document_id), Ok(())) => {
                tracing::info!(issue_key = %issue_key, document_id, "Imported issue");
                Ok(document_id)
            }
            (Ok(document_id), Err(source)) => Err(IssueFailure::Blob { document_id, source }),
            (Err(row), Ok(())) => Err(IssueFailure::Row(row)),
            (Err(row), Err(blob)) => Err(IssueFailure::RowAndBlob { row, blob }),
        }
    }
}

/// Sub-items that fail to load are skipped; the parent is still imported.
async fn fetch_sub_items(tracker: &dyn IssueTracker, issue: &JiraIssue) -> Vec<SubItem> {
    let mut sub_items = Vec::with_capacity(issue.fields.subtasks.len());
    for reference in &issue.fields.subtasks {
        match tracker.fetch_sub_item(&reference.key).await {
            Ok(sub_item) => sub_items.push(sub_item),
            Err(err) => tracing::warn!(
                issue_key = %issue.key,
                sub_item = %reference.key,
                error = %err,
                "Skipping sub-item"
            ),
        }
    }
    sub_items
}

async fn collect_issues(stream: IssueStream<'_>) -> Result<Vec<JiraIssue>, AppError> {
    Ok(stream.try_collect::<Vec<_>>().await?)
}
