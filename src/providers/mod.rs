pub mod board;
pub mod jira;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::source_item::SourceItem;

/// Upstream issue tracker: read-only source of truth.
#[async_trait]
pub trait SourceTracker: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_items(&self) -> Result<Vec<SourceItem>>;
}

/// Destination board write surface the reconciliation driver dispatches to.
/// One call per action; failures are per-record and reported back, never
/// fatal for the batch.
#[async_trait]
pub trait BoardWriter: Send + Sync {
    async fn create_item(&self, source: &SourceItem) -> Result<()>;
    async fn update_item(&self, item_id: &str, source: &SourceItem) -> Result<()>;
}
