use anyhow::{bail, Result};
use log::warn;
use tokio::sync::watch;

use crate::config::{self, AppConfig};
use crate::model::board_item::BoardItem;
use crate::model::source_item::SourceItem;
use crate::providers::board::{BoardClient, BoardSyncWriter};
use crate::providers::jira::JiraTracker;
use crate::providers::SourceTracker;
use crate::snapshot;
use crate::sync::matcher::CorrelationIndex;
use crate::sync::{self, MappingContext, Reconciler, Resolver, StatusMapper, SyncAction};

const SCHEMA_PREFIX: &str = "workspace_schema";
const SOURCE_PREFIX: &str = "source_items";
const BOARD_PREFIX: &str = "board_items";

pub async fn dispatch(args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        None | Some("run") => run().await,
        Some("fetch") => fetch().await,
        Some("plan") => plan().await,
        Some("help") | Some("--help") | Some("-h") => {
            print_help();
            Ok(())
        }
        Some(other) => bail!("Unknown command '{other}'. Run 'boardsync --help' for usage."),
    }
}

/// Fetch the workspace schema and both batches, snapshotting each to the
/// data directory for audit and for offline planning.
async fn fetch() -> Result<()> {
    let config = config::load_config()?;
    let (schema, sources, boards) = fetch_batches(&config).await?;
    println!(
        "Fetched {} field(s)/{} status(es), {} source item(s), {} board item(s)",
        schema.fields.len(),
        schema.statuses.len(),
        sources.len(),
        boards.len()
    );
    Ok(())
}

/// Decide without writing: reconcile the latest snapshots and print the
/// verdict per source item, including what would change on updates.
async fn plan() -> Result<()> {
    let config = config::load_config()?;
    let dir = config::data_dir();

    // A missing source snapshot is structural; a missing board snapshot just
    // means no prior destination state, so everything becomes a create.
    let sources: Vec<SourceItem> = snapshot::load(&dir, SOURCE_PREFIX)?;
    let boards: Vec<BoardItem> = snapshot::load_or_default(&dir, BOARD_PREFIX)?;
    let schema: MappingContext = snapshot::load_or_default(&dir, SCHEMA_PREFIX)?;
    if schema.statuses.is_empty() {
        warn!("workspace schema snapshot is empty; status mapping will degrade");
    }

    let reconciler = build_reconciler(&config, &schema);
    let plan = reconciler.plan(&sources, &boards);

    let index = CorrelationIndex::build(&boards, &plan_key_field(&reconciler));
    for action in &plan.actions {
        match action {
            SyncAction::Create(source) => println!("create  {} — {}", source.key, source.title),
            SyncAction::Update {
                item_id,
                reason,
                source,
            } => {
                println!("update  {} -> board item {item_id} ({reason:?})", source.key);
                if let Some(board) = index.get(&source.key) {
                    let (_, diffs) = reconciler.resolver.content_differs(source, board);
                    for diff in diffs {
                        println!("        would change {diff}");
                    }
                }
            }
            SyncAction::Skip { key, reason } => println!("skip    {key} ({reason})"),
        }
    }
    for key in &plan.duplicates {
        println!("warning duplicate correlation key on the board: {key}");
    }
    Ok(())
}

/// Full pass: fetch fresh batches, snapshot them, reconcile, and apply the
/// writes. Ctrl-C stops issuing new writes and drains in-flight ones.
async fn run() -> Result<()> {
    let config = config::load_config()?;
    let (schema, sources, boards) = fetch_batches(&config).await?;

    let reconciler = build_reconciler(&config, &schema);
    let plan = reconciler.plan(&sources, &boards);

    let client = BoardClient::new(
        config.board.base_url.clone(),
        config.board.api_key.clone(),
        config.board.workspace_id.clone(),
        config.sync.write_timeout(),
    )?;
    let writer = BoardSyncWriter::new(
        client,
        schema.clone(),
        config.sync.status_mapping.clone(),
        config.sync.default_status.clone(),
        config.sync.fields.clone(),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let report = sync::apply(plan, &writer, config.sync.write_parallelism, cancel_rx).await;

    println!(
        "Run complete: {} created, {} updated, {} skipped ({} total)",
        report.created, report.updated, report.skipped, report.total
    );
    if report.overwrote_local_edits > 0 {
        println!(
            "  {} update(s) overwrote local board edits",
            report.overwrote_local_edits
        );
    }
    if !report.errors.is_empty() {
        println!("  {} error(s):", report.errors.len());
        for error in &report.errors {
            println!("    {} [{}]: {}", error.key, error.stage, error.message);
        }
    }
    Ok(())
}

async fn fetch_batches(
    config: &AppConfig,
) -> Result<(MappingContext, Vec<SourceItem>, Vec<BoardItem>)> {
    let tracker = JiraTracker::new(
        config.tracker.base_url.clone(),
        config.tracker.pat.clone(),
        config.tracker.project_key.clone(),
        config.sync.write_timeout(),
    )?;
    let client = BoardClient::new(
        config.board.base_url.clone(),
        config.board.api_key.clone(),
        config.board.workspace_id.clone(),
        config.sync.write_timeout(),
    )?;

    let schema = client.fetch_schema().await?;
    let sources = tracker.fetch_items().await?;
    let boards = client.fetch_items().await?;

    let dir = config::data_dir();
    snapshot::save(&dir, SCHEMA_PREFIX, &schema)?;
    snapshot::save(&dir, SOURCE_PREFIX, &sources)?;
    snapshot::save(&dir, BOARD_PREFIX, &boards)?;

    Ok((schema, sources, boards))
}

fn build_reconciler<'a>(config: &'a AppConfig, schema: &'a MappingContext) -> Reconciler<'a> {
    let mapper = StatusMapper::new(
        schema,
        &config.sync.status_mapping,
        &config.sync.default_status,
    );
    Reconciler {
        resolver: Resolver {
            mapper,
            watermark_field_id: schema
                .field_id(&config.sync.fields.watermark_field)
                .map(String::from),
            offset_hours: config.sync.local_offset_hours,
        },
        key_field_id: schema
            .field_id(&config.sync.fields.key_field)
            .map(String::from),
        terminal_statuses: &config.sync.terminal_statuses,
    }
}

fn plan_key_field(reconciler: &Reconciler<'_>) -> String {
    reconciler.key_field_id.clone().unwrap_or_default()
}

pub fn print_help() {
    println!("boardsync — reconcile a source issue tracker with a work-tracking board\n");
    println!("USAGE:");
    println!("  boardsync [run]   Fetch both sides, snapshot, reconcile, and write");
    println!("  boardsync fetch   Fetch both sides and snapshot only");
    println!("  boardsync plan    Dry-run against the latest snapshots; no writes");
    println!();
    println!("Configuration lives in ~/.boardsync/config.toml; snapshots and the");
    println!("audit trail in ~/.boardsync/data. Set RUST_LOG for verbose logging.");
}
