use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{json, Value};

use super::BoardWriter;
use crate::model::board_item::BoardItem;
use crate::model::item_draft::ItemDraft;
use crate::model::source_item::SourceItem;
use crate::sync::mapping::{FieldDef, MappingContext, StatusDef, StatusMapper, SyncFields};

const PAGE_SIZE: usize = 1000;
/// Media type under which descriptions are sent and patched as Markdown.
const MARKDOWN_MEDIA_TYPE: &str = "application/vnd.airfocus.markdown+json";

/// HTTP client for the destination board workspace: schema fetch, item
/// search, create, and JSON-Patch update.
pub struct BoardClient {
    base_url: String,
    auth_header: String,
    workspace_id: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WorkspaceResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Embedded,
}

#[derive(Deserialize, Default)]
struct Embedded {
    /// Keyed by field id on the wire; the keys are redundant with the `id`
    /// inside each value, so only the values are kept.
    #[serde(default, deserialize_with = "ordered_values")]
    fields: Vec<FieldDef>,
    #[serde(default, deserialize_with = "ordered_values")]
    statuses: Vec<StatusDef>,
}

/// Collect the values of a JSON map in document order. The board lists
/// statuses in column order and the last-resort status fallback is "first
/// status on the board", so sorting by key would pick the wrong one.
fn ordered_values<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedValues<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedValues<T> {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of keyed definitions")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut values = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((IgnoredAny, value)) = access.next_entry::<IgnoredAny, T>()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_map(OrderedValues(PhantomData))
}

#[derive(Deserialize)]
struct ItemSearchResponse {
    #[serde(default)]
    items: Vec<BoardItem>,
}

impl BoardClient {
    pub fn new(
        base_url: String,
        api_key: String,
        workspace_id: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build board HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {api_key}"),
            workspace_id,
            client,
        })
    }

    /// Fetch the workspace schema (custom fields and statuses) into an
    /// immutable mapping context for this run.
    pub async fn fetch_schema(&self) -> Result<MappingContext> {
        let url = format!("{}/workspaces/{}", self.base_url, self.workspace_id);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .context("Workspace schema request failed")?
            .error_for_status()
            .context("Workspace schema request returned an error status")?;
        let workspace: WorkspaceResponse = resp
            .json()
            .await
            .context("Failed to parse workspace schema")?;

        let Embedded { fields, statuses } = workspace.embedded;
        info!(
            "workspace schema: {} field(s), {} status(es)",
            fields.len(),
            statuses.len()
        );
        Ok(MappingContext::new(fields, statuses))
    }

    /// Fetch every item in the workspace, page by page.
    pub async fn fetch_items(&self) -> Result<Vec<BoardItem>> {
        let url = format!(
            "{}/workspaces/{}/items/search",
            self.base_url, self.workspace_id
        );
        let mut items = Vec::new();
        let mut offset = 0;

        loop {
            debug!("requesting board items at offset {offset}");
            let payload = json!({
                "filters": {},
                "pagination": {"limit": PAGE_SIZE, "offset": offset},
            });
            let resp = self
                .client
                .post(&url)
                .header("Authorization", &self.auth_header)
                .json(&payload)
                .send()
                .await
                .context("Board item search failed")?
                .error_for_status()
                .context("Board item search returned an error status")?;
            let page: ItemSearchResponse = resp
                .json()
                .await
                .context("Failed to parse board item search response")?;

            let fetched = page.items.len();
            items.extend(page.items);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        info!("fetched {} board item(s)", items.len());
        Ok(items)
    }

    async fn create(&self, payload: &Value) -> Result<()> {
        let url = format!("{}/workspaces/{}/items", self.base_url, self.workspace_id);
        self.client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", MARKDOWN_MEDIA_TYPE)
            .json(payload)
            .send()
            .await
            .context("Item create request failed")?
            .error_for_status()
            .context("Item create returned an error status")?;
        Ok(())
    }

    async fn patch(&self, item_id: &str, ops: &Value) -> Result<()> {
        let url = format!(
            "{}/workspaces/{}/items/{item_id}",
            self.base_url, self.workspace_id
        );
        self.client
            .patch(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", MARKDOWN_MEDIA_TYPE)
            .json(ops)
            .send()
            .await
            .context("Item patch request failed")?
            .error_for_status()
            .context("Item patch returned an error status")?;
        Ok(())
    }
}

/// The write side of a run: owns the client, the schema snapshot, and the
/// status/field configuration needed to turn a source item into payloads.
pub struct BoardSyncWriter {
    client: BoardClient,
    context: MappingContext,
    status_mapping: BTreeMap<String, Vec<String>>,
    default_status: String,
    fields: SyncFields,
}

impl BoardSyncWriter {
    pub fn new(
        client: BoardClient,
        context: MappingContext,
        status_mapping: BTreeMap<String, Vec<String>>,
        default_status: String,
        fields: SyncFields,
    ) -> Self {
        Self {
            client,
            context,
            status_mapping,
            default_status,
            fields,
        }
    }

    fn draft(&self, source: &SourceItem) -> ItemDraft {
        let mapper = StatusMapper::new(&self.context, &self.status_mapping, &self.default_status);
        ItemDraft::from_source(source, &mapper)
    }
}

#[async_trait]
impl BoardWriter for BoardSyncWriter {
    async fn create_item(&self, source: &SourceItem) -> Result<()> {
        let payload = self.draft(source).create_payload(&self.context, &self.fields)?;
        self.client.create(&payload).await
    }

    async fn update_item(&self, item_id: &str, source: &SourceItem) -> Result<()> {
        let ops = self.draft(source).patch_ops(&self.context, &self.fields)?;
        self.client.patch(item_id, &ops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_keeps_board_order_not_key_order() {
        // Status ids sort the other way round; document order must win.
        let workspace: WorkspaceResponse = serde_json::from_str(
            r#"{
                "_embedded": {
                    "fields": {
                        "f-z": {"id": "f-z", "name": "JIRA-KEY", "typeId": "text"},
                        "f-a": {"id": "f-a", "name": "SYNCED-AT", "typeId": "text"}
                    },
                    "statuses": {
                        "st-z": {"id": "st-z", "name": "Backlog"},
                        "st-a": {"id": "st-a", "name": "Done", "default": true}
                    }
                }
            }"#,
        )
        .unwrap();
        let statuses: Vec<&str> = workspace
            .embedded
            .statuses
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(statuses, vec!["Backlog", "Done"]);
        let fields: Vec<&str> = workspace
            .embedded
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(fields, vec!["JIRA-KEY", "SYNCED-AT"]);
    }

    #[test]
    fn missing_embedded_sections_default_to_empty() {
        let workspace: WorkspaceResponse = serde_json::from_str(r#"{"_embedded": {}}"#).unwrap();
        assert!(workspace.embedded.fields.is_empty());
        assert!(workspace.embedded.statuses.is_empty());
    }
}
