use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item fetched from the destination board. Read-only input to the
/// reconciliation pass; the engine never mutates it, it only emits write
/// intents against its `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Description,
    #[serde(default)]
    pub status_id: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_updated_at: String,
    /// Custom field values keyed by field id. The correlation key and the
    /// sync watermark live in here.
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl BoardItem {
    /// Text value of a custom field, if the field is present and text-typed.
    pub fn text_field(&self, field_id: &str) -> Option<&str> {
        match self.fields.get(field_id)? {
            FieldValue::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text { text: String },
    Selection { selection: Vec<String> },
    Other(Value),
}

/// The board API returns descriptions in three encodings depending on the
/// media type the item was written with: a bare string, an object wrapping a
/// markdown body, or a block-structured rich-text document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    MarkdownWrapped {
        markdown: String,
        #[serde(default, rename = "richText")]
        rich_text: bool,
    },
    PlainText(String),
    BlockTree(Value),
}

impl Default for Description {
    fn default() -> Self {
        Description::PlainText(String::new())
    }
}

impl Description {
    /// Extract a plain-text form, used for diagnostic content comparison.
    pub fn plain_text(&self) -> String {
        match self {
            Description::PlainText(s) => s.clone(),
            Description::MarkdownWrapped { markdown, .. } => markdown.clone(),
            Description::BlockTree(value) => flatten_blocks(value),
        }
    }
}

/// Flatten a rich-text block document to plain text. Inline text runs inside
/// a block concatenate as-is (a bold span splits one sentence into several
/// `text` nodes), while sibling blocks become separate lines.
fn flatten_blocks(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => {
            let lines: Vec<String> = blocks
                .iter()
                .map(flatten_blocks)
                .filter(|line| !line.is_empty())
                .collect();
            lines.join("\n")
        }
        Value::Object(node) => {
            if is_text_node(node) {
                return node
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
            }
            match node.get("content") {
                Some(Value::Array(children))
                    if children.iter().all(|c| c.as_object().is_some_and(is_text_node)) =>
                {
                    children.iter().map(flatten_blocks).collect()
                }
                Some(content) => flatten_blocks(content),
                None => String::new(),
            }
        }
        _ => String::new(),
    }
}

fn is_text_node(node: &serde_json::Map<String, Value>) -> bool {
    node.get("type").and_then(Value::as_str) == Some("text")
}
