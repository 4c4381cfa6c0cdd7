use log::warn;
use serde::{Deserialize, Serialize};

/// One issue fetched from the source tracker, already flattened from the
/// API shape. Immutable for the duration of a reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub key: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SourceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Last-modified timestamp, already normalized (no fractional seconds or
    /// zone suffix).
    #[serde(default)]
    pub updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignee {
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Attachment {
    /// An attachment needs both a filename and a URL to be linkable.
    pub fn is_valid(&self) -> bool {
        !self.filename.is_empty() && !self.url.is_empty()
    }
}

impl SourceItem {
    pub fn status_name(&self) -> &str {
        self.status.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Validate the item; returns one message per problem, empty when clean.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.key.is_empty() {
            errors.push("source key is required".to_string());
        } else if !is_valid_key(&self.key) {
            errors.push(format!("invalid source key format: {}", self.key));
        }
        if self.title.is_empty() {
            errors.push("title is required".to_string());
        }
        if self.url.is_empty() {
            errors.push("url is required".to_string());
        }
        errors
    }

    /// Render the enriched Markdown body the board item carries: issue link,
    /// assignee, description, and attachment links. Attachments missing a
    /// filename or URL are logged and left out.
    pub fn build_markdown_description(&self) -> String {
        let mut parts = Vec::new();

        parts.push(format!("**Issue:** [**{}**]({})", self.key, self.url));

        if let Some(assignee) = &self.assignee {
            if !assignee.display_name.is_empty() {
                let mut text = assignee.display_name.clone();
                if !assignee.email.is_empty() {
                    text.push_str(&format!(" ({})", assignee.email));
                }
                parts.push(format!("**Assignee:** {text}"));
            }
        }

        let body = if self.description.is_empty() {
            "No description provided in the tracker."
        } else {
            &self.description
        };
        parts.push(format!("**Description:**\n\n{body}"));

        let (valid, invalid): (Vec<_>, Vec<_>) =
            self.attachments.iter().partition(|a| a.is_valid());
        if !valid.is_empty() {
            parts.push("**Attachments:**".to_string());
            for attachment in &valid {
                parts.push(format!("- [{}]({})", attachment.filename, attachment.url));
            }
        }
        if !invalid.is_empty() {
            warn!(
                "{} has {} attachment(s) missing a filename or URL; skipped",
                self.key,
                invalid.len()
            );
        }

        parts.join("\n\n")
    }
}

/// Source keys look like `PREFIX-123`: an uppercase project prefix, a dash,
/// and an issue number.
fn is_valid_key(key: &str) -> bool {
    match key.split_once('-') {
        Some((prefix, number)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_uppercase())
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
