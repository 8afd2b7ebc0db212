//! In-process stand-ins for Jira and the two stores.

use crate::blob_store::{BlobError, BlobStore};
use crate::database::{DatabaseError, DocumentStore};
use crate::error::PersistenceError;
use crate::jira_client::{IssueStream, IssueTracker, TrackerError};
use crate::models::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub fn issue(key: &str, type_name: &str, summary: &str) -> JiraIssue {
    let project_key = key.split('-').next().unwrap_or(key);
    JiraIssue {
        key: key.to_string(),
        fields: JiraIssueFields {
            summary: Some(summary.to_string()),
            issue_type: Some(NamedField {
                name: Some(type_name.to_string()),
            }),
            status: Some(NamedField {
                name: Some("To Do".to_string()),
            }),
            project: Some(ProjectRef {
                key: Some(project_key.to_string()),
                name: Some("Demo project".to_string()),
            }),
            ..Default::default()
        },
    }
}

pub fn with_subtasks(mut issue: JiraIssue, keys: &[&str]) -> JiraIssue {
    issue.fields.subtasks = keys
        .iter()
        .map(|key| SubtaskRef {
            key: key.to_string(),
        })
        .collect();
    issue
}

pub fn sub_item(key: &str, summary: &str, status: &str) -> SubItem {
    SubItem {
        key: key.to_string(),
        summary: Some(summary.to_string()),
        status: Some(status.to_string()),
    }
}

pub fn sample_document(issue_key: &str) -> NewDocument {
    let formatted = crate::formatter::format_issue_for_storage(
        &issue(issue_key, "Story", "Sample issue"),
        &[],
        true,
        &format!("https://jira.test/browse/{issue_key}"),
    );
    formatted.into_document("jira-project-docs").0
}

pub struct FakeTracker {
    project: JiraProject,
    issues: Vec<JiraIssue>,
    sub_items: HashMap<String, SubItem>,
    fetch_error: Option<TrackerError>,
}

impl FakeTracker {
    pub fn new(project_key: &str, project_name: &str) -> Self {
        Self {
            project: JiraProject {
                id: "10000".to_string(),
                key: project_key.to_string(),
                name: project_name.to_string(),
            },
            issues: Vec::new(),
            sub_items: HashMap::new(),
            fetch_error: None,
        }
    }

    pub fn with_issues(mut self, issues: Vec<JiraIssue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_sub_item(mut self, sub_item: SubItem) -> Self {
        self.sub_items.insert(sub_item.key.clone(), sub_item);
        self
    }

    pub fn with_fetch_error(mut self, err: TrackerError) -> Self {
        self.fetch_error = Some(err);
        self
    }

    fn stream(&self, filter: impl Fn(&JiraIssue) -> bool, max_results: usize) -> IssueStream<'_> {
        let items: Vec<Result<JiraIssue, TrackerError>> = match &self.fetch_error {
            Some(err) => vec![Err(err.clone())],
            None => self
                .issues
                .iter()
                .filter(|issue| filter(issue))
                .take(max_results)
                .cloned()
                .map(Ok)
                .collect(),
        };
        Box::pin(futures_util::stream::iter(items))
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn get_project_info(&self, project_key: &str) -> Result<JiraProject, TrackerError> {
        if project_key == self.project.key {
            Ok(self.project.clone())
        } else {
            Err(TrackerError::NotFound(format!("project '{project_key}' not found")))
        }
    }

    fn fetch_all_project_issues<'a>(&'a self, project_key: &str, max_results: usize) -> IssueStream<'a> {
        let project_key = project_key.to_string();
        self.stream(move |issue| issue.project_key() == project_key, max_results)
    }

    fn fetch_project_issues_by_type<'a>(
        &'a self,
        project_key: &str,
        issue_type: &str,
        max_results: usize,
    ) -> IssueStream<'a> {
        let project_key = project_key.to_string();
        let issue_type = issue_type.to_string();
        self.stream(
            move |issue| {
                issue.project_key() == project_key
                    && issue
                        .type_name()
                        .is_some_and(|name| name.eq_ignore_ascii_case(&issue_type))
            },
            max_results,
        )
    }

    fn search_issues<'a>(&'a self, _jql: &str, max_results: usize) -> IssueStream<'a> {
        self.stream(|_| true, max_results)
    }

    async fn fetch_issue(&self, issue_key: &str) -> Result<JiraIssue, TrackerError> {
        if let Some(err) = &self.fetch_error {
            return Err(err.clone());
        }
        self.issues
            .iter()
            .find(|issue| issue.key == issue_key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("issue '{issue_key}' not found")))
    }

    async fn fetch_sub_item(&self, issue_key: &str) -> Result<SubItem, TrackerError> {
        self.sub_items
            .get(issue_key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("issue '{issue_key}' not found")))
    }

    async fn get_myself(&self) -> Result<JiraUser, TrackerError> {
        Ok(JiraUser {
            display_name: Some("Import Bot".to_string()),
            name: Some("import-bot".to_string()),
            email: None,
        })
    }

    fn browse_url(&self, issue_key: &str) -> String {
        format!("https://jira.test/browse/{issue_key}")
    }
}

/// Document store keeping rows in memory; fails for configured issue keys.
#[derive(Default)]
pub struct MemoryDocumentStore {
    rows: Mutex<Vec<NewDocument>>,
    failing: HashSet<String>,
}

impl MemoryDocumentStore {
    pub fn failing_for(issue_keys: &[&str]) -> Self {
        Self {
            failing: issue_keys.iter().map(|key| key.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn all(&self) -> Vec<NewDocument> {
        self.rows.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_document(&self, document: &NewDocument) -> Result<i64, PersistenceError> {
        let mut rows = self.rows.lock().unwrap();
        rows.push(document.clone());
        if self.failing.contains(&document.content.issue_key) {
            rows.pop();
            return Err(DatabaseError::Sqlite("disk I/O error".to_string()).into());
        }
        Ok(rows.len() as i64)
    }
}

/// Blob store keeping objects in memory; fails for configured filenames.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(String, String, Vec<u8>)>>,
    failing: HashSet<String>,
    delay: Duration,
}

impl MemoryBlobStore {
    pub fn failing_for(filenames: &[&str]) -> Self {
        Self {
            failing: filenames.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every write takes `delay` before it lands.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn all(&self) -> Vec<(String, String, Vec<u8>)> {
        self.objects.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bucket: &str, filename: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(filename) {
            return Err(BlobError::Io(std::io::Error::other("bucket unavailable")).into());
        }
        self.objects
            .lock()
            .unwrap()
            .push((bucket.to_string(), filename.to_string(), bytes.to_vec()));
        Ok(())
    }
}
