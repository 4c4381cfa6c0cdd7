use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

use super::SourceTracker;
use crate::model::source_item::{Assignee, Attachment, SourceItem, SourceStatus};
use crate::sync::timestamp;

const PAGE_SIZE: usize = 100;

/// Jira source tracker. Fetches the project's epics page by page via the
/// search endpoint and flattens them into `SourceItem`s.
pub struct JiraTracker {
    base_url: String,
    auth_header: String,
    project_key: String,
    client: reqwest::Client,
}

impl JiraTracker {
    pub fn new(
        base_url: String,
        pat: String,
        project_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Jira HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {pat}"),
            project_key,
            client,
        })
    }

    /// The browse URL shown in the rendered description, derived from the
    /// REST base URL.
    fn issue_url(&self, key: &str) -> String {
        let site = self.base_url.replace("/rest/api/latest", "");
        format!("{site}/projects/{}/issues/{key}", self.project_key)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
    /// Total match count. Some servers omit it, in which case only the page
    /// size decides when to stop.
    total: Option<usize>,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    description: Option<String>,
    status: Option<StatusField>,
    assignee: Option<AssigneeField>,
    #[serde(default)]
    attachment: Vec<AttachmentField>,
    updated: Option<String>,
}

#[derive(Deserialize)]
struct StatusField {
    name: String,
    #[serde(default)]
    id: String,
    #[serde(rename = "statusCategory")]
    status_category: Option<StatusCategory>,
}

#[derive(Deserialize)]
struct StatusCategory {
    key: String,
}

#[derive(Deserialize)]
struct AssigneeField {
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(rename = "emailAddress", default)]
    email_address: String,
    #[serde(rename = "accountId", default)]
    account_id: String,
}

#[derive(Deserialize)]
struct AttachmentField {
    #[serde(default)]
    filename: String,
    /// Jira calls the download URL `content`.
    #[serde(default)]
    content: String,
    thumbnail: Option<String>,
}

/// A page run ends on a short page, or once the reported total is reached.
fn search_exhausted(fetched: usize, seen: usize, total: Option<usize>) -> bool {
    fetched < PAGE_SIZE || total.is_some_and(|total| seen >= total)
}

#[async_trait]
impl SourceTracker for JiraTracker {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn fetch_items(&self) -> Result<Vec<SourceItem>> {
        let url = format!("{}/search", self.base_url);
        let jql = format!("project = {} AND issuetype = Epic", self.project_key);
        let mut items = Vec::new();
        let mut start_at = 0;

        loop {
            debug!("requesting issues {start_at} to {}", start_at + PAGE_SIZE - 1);
            let query = json!({
                "jql": jql,
                "fields": ["key", "summary", "description", "status", "assignee", "attachment", "updated"],
                "startAt": start_at,
                "maxResults": PAGE_SIZE,
            });

            let resp = self
                .client
                .post(&url)
                .header("Authorization", &self.auth_header)
                .header("Content-Type", "application/json")
                .json(&query)
                .send()
                .await
                .context("Jira search request failed")?
                .error_for_status()
                .context("Jira search returned an error status")?;

            let page: SearchResponse = resp
                .json()
                .await
                .context("Failed to parse Jira search response")?;
            let fetched = page.issues.len();

            for issue in page.issues {
                items.push(self.flatten(issue));
            }

            if search_exhausted(fetched, items.len(), page.total) {
                break;
            }
            start_at += PAGE_SIZE;
        }

        info!(
            "{}: fetched {} issue(s) for project {}",
            self.name(),
            items.len(),
            self.project_key
        );
        Ok(items)
    }
}

impl JiraTracker {
    fn flatten(&self, issue: JiraIssue) -> SourceItem {
        let fields = issue.fields;
        let updated = fields
            .updated
            .map(|raw| timestamp::normalize(&raw))
            .unwrap_or_default();

        SourceItem {
            url: self.issue_url(&issue.key),
            key: issue.key,
            title: fields.summary.unwrap_or_default(),
            description: fields.description.unwrap_or_default(),
            status: fields.status.map(|s| SourceStatus {
                name: s.name,
                id: s.id,
                category: s.status_category.map(|c| c.key),
            }),
            assignee: fields.assignee.map(|a| Assignee {
                display_name: a.display_name,
                email: a.email_address,
                account_id: a.account_id,
            }),
            attachments: fields
                .attachment
                .into_iter()
                .map(|a| Attachment {
                    filename: a.filename,
                    url: a.content,
                    thumbnail: a.thumbnail,
                })
                .collect(),
            updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_page_without_total_keeps_paging() {
        // A server that omits `total` must not stop after the first page.
        assert!(!search_exhausted(PAGE_SIZE, PAGE_SIZE, None));
        assert!(!search_exhausted(PAGE_SIZE, PAGE_SIZE * 2, None));
    }

    #[test]
    fn short_page_always_ends_the_run() {
        assert!(search_exhausted(PAGE_SIZE - 1, PAGE_SIZE - 1, None));
        assert!(search_exhausted(0, 0, Some(500)));
    }

    #[test]
    fn reported_total_ends_the_run_when_reached() {
        assert!(search_exhausted(PAGE_SIZE, PAGE_SIZE, Some(PAGE_SIZE)));
        assert!(!search_exhausted(PAGE_SIZE, PAGE_SIZE, Some(PAGE_SIZE + 50)));
    }

    #[test]
    fn search_response_tolerates_missing_total() {
        let page: SearchResponse = serde_json::from_str(r#"{"issues": []}"#).unwrap();
        assert!(page.total.is_none());
        assert!(page.issues.is_empty());
    }
}
