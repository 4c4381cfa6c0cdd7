use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use super::driver::SyncAction;
use super::mapping::{MappingContext, StatusMapper};
use super::resolver::{Resolver, SkipReason, UpdateReason};
use super::{apply, Reconciler};
use crate::model::board_item::BoardItem;
use crate::model::source_item::{SourceItem, SourceStatus};
use crate::providers::BoardWriter;

/// A board writer that records calls and can be told to fail for one key.
struct MockWriter {
    created: Arc<Mutex<Vec<String>>>,
    updated: Arc<Mutex<Vec<String>>>,
    fail_key: Option<String>,
}

impl MockWriter {
    fn new() -> Self {
        Self {
            created: Arc::new(Mutex::new(Vec::new())),
            updated: Arc::new(Mutex::new(Vec::new())),
            fail_key: None,
        }
    }

    fn failing_on(key: &str) -> Self {
        Self {
            fail_key: Some(key.to_string()),
            ..Self::new()
        }
    }
}

#[async_trait]
impl BoardWriter for MockWriter {
    async fn create_item(&self, source: &SourceItem) -> Result<()> {
        if self.fail_key.as_deref() == Some(source.key.as_str()) {
            anyhow::bail!("simulated create failure");
        }
        self.created.lock().unwrap().push(source.key.clone());
        Ok(())
    }

    async fn update_item(&self, _item_id: &str, source: &SourceItem) -> Result<()> {
        if self.fail_key.as_deref() == Some(source.key.as_str()) {
            anyhow::bail!("simulated update failure");
        }
        self.updated.lock().unwrap().push(source.key.clone());
        Ok(())
    }
}

fn source(key: &str, status: &str, updated: &str) -> SourceItem {
    SourceItem {
        key: key.to_string(),
        url: format!("https://tracker.example.com/browse/{key}"),
        title: format!("Title {key}"),
        description: String::new(),
        status: Some(SourceStatus {
            name: status.to_string(),
            id: "1".to_string(),
            category: None,
        }),
        assignee: None,
        attachments: vec![],
        updated: updated.to_string(),
    }
}

fn board(id: &str, key: &str, watermark: &str, created: &str, updated: &str) -> BoardItem {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Board {key}"),
        "createdAt": created,
        "lastUpdatedAt": updated,
        "fields": {
            "f-key": {"text": key},
            "f-mark": {"text": watermark},
        },
    }))
    .unwrap()
}

fn reconciler<'a>(
    ctx: &'a MappingContext,
    mapping: &'a BTreeMap<String, Vec<String>>,
    terminal: &'a [String],
) -> Reconciler<'a> {
    Reconciler {
        resolver: Resolver {
            mapper: StatusMapper::new(ctx, mapping, "Draft"),
            watermark_field_id: Some("f-mark".to_string()),
            offset_hours: 0,
        },
        key_field_id: Some("f-key".to_string()),
        terminal_statuses: terminal,
    }
}

#[test]
fn unmatched_source_items_become_creates() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![source("PROJ-1", "Open", "2025-06-01T10:00:00")];
    let plan = r.plan(&sources, &[]);
    assert!(matches!(&plan.actions[0], SyncAction::Create(s) if s.key == "PROJ-1"));
}

#[test]
fn terminal_status_is_skipped_before_matching() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec!["Done".to_string()];
    let r = reconciler(&ctx, &mapping, &terminal);

    // No board match exists, yet a terminal item must not become a create.
    let sources = vec![source("PROJ-1", "Done", "2025-01-01T00:00:00")];
    let plan = r.plan(&sources, &[]);
    assert!(matches!(
        &plan.actions[0],
        SyncAction::Skip { key, reason: SkipReason::Terminal } if key == "PROJ-1"
    ));
}

#[test]
fn second_run_with_no_changes_produces_zero_updates() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    // Board state exactly as the last sync left it: watermark matches the
    // source timestamp, item never edited since creation.
    let sources = vec![source("PROJ-2", "Open", "2025-05-01T10:00:00")];
    let boards = vec![board(
        "it-1",
        "PROJ-2",
        "2025-05-01T10:00:00",
        "2025-05-01T10:00:05Z",
        "2025-05-01T10:00:05Z",
    )];
    let plan = r.plan(&sources, &boards);
    assert!(matches!(
        &plan.actions[0],
        SyncAction::Skip { reason: SkipReason::UpToDate, .. }
    ));
}

#[test]
fn newer_source_produces_update_with_matched_item_id() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![source("PROJ-2", "Open", "2025-06-01T10:00:00")];
    let boards = vec![board(
        "it-1",
        "PROJ-2",
        "2025-05-01T10:00:00",
        "2025-05-01T10:00:05Z",
        "2025-05-01T10:00:05Z",
    )];
    let plan = r.plan(&sources, &boards);
    assert!(matches!(
        &plan.actions[0],
        SyncAction::Update { item_id, reason: UpdateReason::SourceNewer, .. } if item_id == "it-1"
    ));
}

#[test]
fn plan_preserves_source_input_order() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec!["Done".to_string()];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![
        source("PROJ-3", "Open", "2025-06-01T10:00:00"),
        source("PROJ-1", "Done", "2025-06-01T10:00:00"),
        source("PROJ-2", "Open", "2025-06-01T10:00:00"),
    ];
    let plan = r.plan(&sources, &[]);
    let keys: Vec<&str> = plan.actions.iter().map(|a| a.key()).collect();
    assert_eq!(keys, vec!["PROJ-3", "PROJ-1", "PROJ-2"]);
}

#[tokio::test]
async fn apply_dispatches_creates_and_updates() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![
        source("PROJ-1", "Open", "2025-06-01T10:00:00"),
        source("PROJ-2", "Open", "2025-06-01T10:00:00"),
    ];
    let boards = vec![board(
        "it-2",
        "PROJ-2",
        "2025-05-01T10:00:00",
        "2025-05-01T10:00:05Z",
        "2025-05-01T10:00:05Z",
    )];
    let plan = r.plan(&sources, &boards);

    let writer = MockWriter::new();
    let (_tx, rx) = watch::channel(false);
    let report = apply(plan, &writer, 4, rx).await;

    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 0);
    assert!(report.errors.is_empty());
    assert_eq!(writer.created.lock().unwrap().as_slice(), &["PROJ-1"]);
    assert_eq!(writer.updated.lock().unwrap().as_slice(), &["PROJ-2"]);
}

#[tokio::test]
async fn write_failure_is_isolated_to_that_record() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![
        source("PROJ-1", "Open", "2025-06-01T10:00:00"),
        source("PROJ-2", "Open", "2025-06-01T10:00:00"),
        source("PROJ-3", "Open", "2025-06-01T10:00:00"),
    ];
    let plan = r.plan(&sources, &[]);

    let writer = MockWriter::failing_on("PROJ-2");
    let (_tx, rx) = watch::channel(false);
    let report = apply(plan, &writer, 1, rx).await;

    assert_eq!(report.created, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, "PROJ-2");
    assert_eq!(report.errors[0].stage, "create");
    assert!(report.errors[0].message.contains("simulated create failure"));
}

#[tokio::test]
async fn cancellation_stops_issuing_writes() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![
        source("PROJ-1", "Open", "2025-06-01T10:00:00"),
        source("PROJ-2", "Open", "2025-06-01T10:00:00"),
    ];
    let plan = r.plan(&sources, &[]);

    let writer = MockWriter::new();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let report = apply(plan, &writer, 4, rx).await;

    assert_eq!(report.created, 0);
    assert_eq!(report.skipped, 2);
    assert!(writer.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_correlation_keys_surface_as_errors() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let r = reconciler(&ctx, &mapping, &terminal);

    let sources = vec![source("PROJ-1", "Open", "2025-06-01T10:00:00")];
    let boards = vec![
        board(
            "it-1",
            "PROJ-1",
            "2025-05-01T10:00:00",
            "2025-05-01T10:00:05Z",
            "2025-05-01T10:00:05Z",
        ),
        board(
            "it-2",
            "PROJ-1",
            "2025-05-01T10:00:00",
            "2025-05-01T10:00:05Z",
            "2025-05-01T10:00:05Z",
        ),
    ];
    let plan = r.plan(&sources, &boards);
    assert_eq!(plan.duplicates, vec!["PROJ-1".to_string()]);

    let writer = MockWriter::new();
    let (_tx, rx) = watch::channel(false);
    let report = apply(plan, &writer, 1, rx).await;
    assert!(report
        .errors
        .iter()
        .any(|e| e.stage == "match" && e.key == "PROJ-1"));
}

#[test]
fn unresolved_key_field_treats_everything_as_unmatched() {
    let ctx = MappingContext::default();
    let mapping = BTreeMap::new();
    let terminal = vec![];
    let mut r = reconciler(&ctx, &mapping, &terminal);
    r.key_field_id = None;

    let sources = vec![source("PROJ-1", "Open", "2025-06-01T10:00:00")];
    let boards = vec![board(
        "it-1",
        "PROJ-1",
        "2025-05-01T10:00:00",
        "2025-05-01T10:00:05Z",
        "2025-05-01T10:00:05Z",
    )];
    let plan = r.plan(&sources, &boards);
    assert!(matches!(&plan.actions[0], SyncAction::Create(_)));
}
