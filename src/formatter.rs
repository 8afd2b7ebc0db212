//! Turns a raw Jira issue into the structured record and text body that get
//! stored. Everything here is pure: identical input gives identical output.

use crate::models::*;
use serde::Serialize;

const MAX_SLUG_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedIssue {
    pub title: String,
    pub filename: String,
    pub text: String,
    pub content: IssueContent,
    pub external_link: String,
}

impl FormattedIssue {
    pub fn into_document(self, bucket: &str) -> (NewDocument, String) {
        let document = NewDocument {
            content: self.content,
            filename: self.filename,
            bucket: bucket.to_string(),
            external_link: Some(self.external_link),
        };
        (document, self.text)
    }
}

/// Formats `issue` for storage. `sub_items` are rendered only when
/// `include_subtasks` is set; fetching them is the caller's job.
pub fn format_issue_for_storage(
    issue: &JiraIssue,
    sub_items: &[SubItem],
    include_subtasks: bool,
    external_link: &str,
) -> FormattedIssue {
    let fields = &issue.fields;
    let summary = fields
        .summary
        .clone()
        .unwrap_or_else(|| "No summary".to_string());
    let description = fields
        .description
        .as_deref()
        .map(clean_html_content)
        .filter(|text| !text.is_empty());
    let project_key = issue.project_key().to_string();
    let project_name = fields.project.as_ref().and_then(|project| project.name.clone());

    let subtasks = if include_subtasks {
        sub_items.to_vec()
    } else {
        Vec::new()
    };

    let content = IssueContent {
        issue_key: issue.key.clone(),
        summary: summary.clone(),
        description,
        issue_type: issue.type_name().unwrap_or("Unknown").to_string(),
        status: named(fields.status.as_ref()),
        priority: named(fields.priority.as_ref()),
        assignee: user_label(fields.assignee.as_ref()),
        reporter: user_label(fields.reporter.as_ref()),
        project_key,
        project_name,
        epic_link: custom_field_text(fields.epic_link.as_ref()),
        epic_name: custom_field_text(fields.epic_name.as_ref()),
        created: fields.created.clone(),
        updated: fields.updated.clone(),
        subtasks,
        url: external_link.to_string(),
        source: "jira".to_string(),
    };

    FormattedIssue {
        title: format!("{}: {}", issue.key, summary),
        filename: derive_filename(&content.project_key, &issue.key, &summary),
        text: render_text(&content),
        content,
        external_link: external_link.to_string(),
    }
}

fn named(field: Option<&NamedField>) -> Option<String> {
    field.and_then(|field| field.name.clone())
}

fn user_label(user: Option<&JiraUser>) -> Option<String> {
    user.and_then(|user| user.label()).map(str::to_string)
}

fn render_text(content: &IssueContent) -> String {
    let or = |value: &Option<String>, fallback: &str| {
        value.clone().unwrap_or_else(|| fallback.to_string())
    };
    let epic = content
        .epic_name
        .clone()
        .or_else(|| content.epic_link.clone())
        .unwrap_or_else(|| "No epic".to_string());

    let mut lines = vec![
        format!("# JIRA Issue: {}", content.issue_key),
        String::new(),
        format!("**Summary:** {}", content.summary),
        format!("**Type:** {}", content.issue_type),
        format!("**Status:** {}", or(&content.status, "Unknown")),
        format!("**Priority:** {}", or(&content.priority, "None")),
        format!("**Assignee:** {}", or(&content.assignee, "Unassigned")),
        format!("**Reporter:** {}", or(&content.reporter, "Unknown")),
        format!(
            "**Project:** {} ({})",
            or(&content.project_name, "Unknown Project"),
            content.project_key
        ),
        format!("**Epic:** {epic}"),
        format!("**Created:** {}", or(&content.created, "Unknown")),
        format!("**Updated:** {}", or(&content.updated, "Unknown")),
        String::new(),
        "## Description".to_string(),
        or(&content.description, "No description"),
        String::new(),
    ];

    if !content.subtasks.is_empty() {
        lines.push("## Subtasks".to_string());
        lines.push(String::new());
        for sub_item in &content.subtasks {
            lines.push(format!(
                "- **{}:** {} ({})",
                sub_item.key,
                or(&sub_item.summary, "No summary"),
                or(&sub_item.status, "Unknown")
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Strips tags, decodes the common entities and collapses whitespace.
pub fn clean_html_content(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `jira-{project}-{issue}-{slug}.txt`. Distinct for well-formed Jira keys
/// (`PROJ-123`); path separators inside a key are replaced with `_`, so keys
/// differing only in `/`, `\` or `_` can collide.
pub fn derive_filename(project_key: &str, issue_key: &str, summary: &str) -> String {
    let project = path_safe(project_key);
    let issue = path_safe(issue_key);
    let slug = slugify(summary);
    if slug.is_empty() {
        format!("jira-{project}-{issue}.txt")
    } else {
        format!("jira-{project}-{issue}-{slug}.txt")
    }
}

fn path_safe(key: &str) -> String {
    key.chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect()
}

fn slugify(summary: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;

    for c in summary.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }

    // ASCII-only at this point, so byte truncation is safe.
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}
