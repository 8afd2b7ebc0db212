use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JiraUser {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "emailAddress")]
    pub email: Option<String>,
}

impl JiraUser {
    pub fn label(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.name.as_deref())
    }
}

#[derive(Deserialize)]
pub struct IssueListResponse {
    #[serde(rename = "startAt", default)]
    pub start_at: u64,
    #[serde(rename = "maxResults", default)]
    pub max_results: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

/// Error body returned by the Jira REST API on non-2xx responses.
#[derive(Deserialize, Default)]
pub struct JiraErrorBody {
    #[serde(rename = "errorMessages", default)]
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub errors: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    #[serde(default)]
    pub fields: JiraIssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraIssueFields {
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "issuetype")]
    pub issue_type: Option<NamedField>,
    pub status: Option<NamedField>,
    pub priority: Option<NamedField>,
    pub assignee: Option<JiraUser>,
    pub reporter: Option<JiraUser>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub project: Option<ProjectRef>,
    #[serde(rename = "customfield_10014")]
    pub epic_link: Option<serde_json::Value>,
    #[serde(rename = "customfield_10015")]
    pub epic_name: Option<serde_json::Value>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedField {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectRef {
    pub key: Option<String>,
    pub name: Option<String>,
}

/// Reference to a sub-item; its details are fetched separately.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubtaskRef {
    pub key: String,
}

impl JiraIssue {
    pub fn type_name(&self) -> Option<&str> {
        self.fields.issue_type.as_ref()?.name.as_deref()
    }

    pub fn issue_type(&self) -> IssueType {
        IssueType::classify(self.type_name().unwrap_or_default())
    }

    /// Project key from the issue's project field, falling back to the
    /// prefix of the issue key (`ABC-12` -> `ABC`).
    pub fn project_key(&self) -> &str {
        self.fields
            .project
            .as_ref()
            .and_then(|project| project.key.as_deref())
            .unwrap_or_else(|| self.key.split('-').next().unwrap_or(&self.key))
    }
}

/// Custom fields hold either a plain string or an object depending on the
/// Jira instance configuration.
pub fn custom_field_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Object(map) => ["key", "name", "value"]
            .iter()
            .find_map(|field| map.get(*field)?.as_str().map(str::to_string)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueType {
    Epic,
    Story,
    Task,
    Subtask,
    Bug,
    Other,
}

impl IssueType {
    pub const ALL: [IssueType; 6] = [
        IssueType::Epic,
        IssueType::Story,
        IssueType::Task,
        IssueType::Subtask,
        IssueType::Bug,
        IssueType::Other,
    ];

    pub fn classify(type_name: &str) -> Self {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "epic" => IssueType::Epic,
            "story" => IssueType::Story,
            "task" => IssueType::Task,
            "sub-task" | "subtask" | "sub task" => IssueType::Subtask,
            "bug" => IssueType::Bug,
            _ => IssueType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeCounts {
    pub epics: usize,
    pub stories: usize,
    pub tasks: usize,
    pub subtasks: usize,
    pub bugs: usize,
    pub other: usize,
}

impl IssueTypeCounts {
    pub fn tally(issues: &[JiraIssue]) -> Self {
        issues.iter().fold(Self::default(), |mut counts, issue| {
            *counts.slot(issue.issue_type()) += 1;
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.epics + self.stories + self.tasks + self.subtasks + self.bugs + self.other
    }

    fn slot(&mut self, issue_type: IssueType) -> &mut usize {
        match issue_type {
            IssueType::Epic => &mut self.epics,
            IssueType::Story => &mut self.stories,
            IssueType::Task => &mut self.tasks,
            IssueType::Subtask => &mut self.subtasks,
            IssueType::Bug => &mut self.bugs,
            IssueType::Other => &mut self.other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueBrief {
    pub key: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuesByTypeData {
    pub epics: Vec<IssueBrief>,
    pub stories: Vec<IssueBrief>,
    pub tasks: Vec<IssueBrief>,
    pub subtasks: Vec<IssueBrief>,
    pub bugs: Vec<IssueBrief>,
    pub other: Vec<IssueBrief>,
}

impl IssuesByTypeData {
    pub fn bucket_mut(&mut self, issue_type: IssueType) -> &mut Vec<IssueBrief> {
        match issue_type {
            IssueType::Epic => &mut self.epics,
            IssueType::Story => &mut self.stories,
            IssueType::Task => &mut self.tasks,
            IssueType::Subtask => &mut self.subtasks,
            IssueType::Bug => &mut self.bugs,
            IssueType::Other => &mut self.other,
        }
    }

    pub fn counts(&self) -> IssueTypeCounts {
        IssueTypeCounts {
            epics: self.epics.len(),
            stories: self.stories.len(),
            tasks: self.tasks.len(),
            subtasks: self.subtasks.len(),
            bugs: self.bugs.len(),
            other: self.other.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubItem {
    pub key: String,
    pub summary: Option<String>,
    pub status: Option<String>,
}

/// Structured record stored as a document's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContent {
    pub issue_key: String,
    pub summary: String,
    pub description: Option<String>,
    pub issue_type: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub project_key: String,
    pub project_name: Option<String>,
    pub epic_link: Option<String>,
    pub epic_name: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub subtasks: Vec<SubItem>,
    pub url: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub content: IssueContent,
    pub filename: String,
    pub bucket: String,
    pub external_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub project_key: String,
    pub project_name: String,
    pub total_issues: usize,
    pub issues_by_type: IssueTypeCounts,
    pub document_ids: Vec<i64>,
    pub processed_count: usize,
    pub failed_count: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOverview {
    pub project_key: String,
    pub project_name: String,
    pub total_issues: usize,
    pub issues_by_type: IssueTypeCounts,
    pub issues_by_type_data: IssuesByTypeData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueImportResult {
    pub document_id: i64,
    pub title: String,
    pub filename: String,
    pub issue_key: String,
    pub project_name: String,
    pub external_link: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchImportResult {
    pub document_ids: Vec<i64>,
    pub total_found: usize,
    pub processed_count: usize,
    pub failed_count: usize,
    pub message: String,
}
