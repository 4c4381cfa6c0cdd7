use futures::stream::{self, StreamExt};
use log::{info, warn};
use tokio::sync::watch;

use super::error::RecordError;
use super::matcher::CorrelationIndex;
use super::resolver::{Resolver, SkipReason, UpdateReason, Verdict};
use crate::model::board_item::BoardItem;
use crate::model::source_item::SourceItem;
use crate::providers::BoardWriter;

/// One write intent, consumed by the board writer. Skips are carried so the
/// plan is a complete, auditable account of the pass.
#[derive(Debug, Clone)]
pub enum SyncAction {
    Create(SourceItem),
    Update {
        item_id: String,
        reason: UpdateReason,
        source: SourceItem,
    },
    Skip {
        key: String,
        reason: SkipReason,
    },
}

impl SyncAction {
    pub fn key(&self) -> &str {
        match self {
            SyncAction::Create(source) => &source.key,
            SyncAction::Update { source, .. } => &source.key,
            SyncAction::Skip { key, .. } => key,
        }
    }
}

/// The full decision set for one pass, in source input order.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
    /// Correlation keys claimed by more than one board item.
    pub duplicates: Vec<String>,
}

/// Aggregated outcome of applying a plan. The run always completes; failures
/// land in `errors` rather than aborting the batch.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub overwrote_local_edits: usize,
    pub errors: Vec<RecordError>,
}

/// Per-run reconciliation pass: terminal filter, correlation lookup, conflict
/// resolution.
pub struct Reconciler<'a> {
    pub resolver: Resolver<'a>,
    /// Field id holding the correlation key on board items.
    pub key_field_id: Option<String>,
    /// Source status names excluded from sync entirely.
    pub terminal_statuses: &'a [String],
}

impl Reconciler<'_> {
    /// Walk the source batch in input order and decide an action for each
    /// item. Pure: no writes are issued here.
    pub fn plan(&self, sources: &[SourceItem], boards: &[BoardItem]) -> SyncPlan {
        let index = self
            .key_field_id
            .as_deref()
            .map(|id| CorrelationIndex::build(boards, id));
        let duplicates = index
            .as_ref()
            .map(|i| i.duplicates.clone())
            .unwrap_or_default();
        if index.is_none() {
            warn!("correlation field unresolved; every source item will look unmatched");
        }

        let mut actions = Vec::with_capacity(sources.len());
        for source in sources {
            // Terminal statuses are filtered out before matching: completed
            // source items are never created or updated.
            let status = source.status_name();
            if self.terminal_statuses.iter().any(|t| t == status) {
                actions.push(SyncAction::Skip {
                    key: source.key.clone(),
                    reason: SkipReason::Terminal,
                });
                continue;
            }

            let matched = index.as_ref().and_then(|i| i.get(&source.key));
            match self.resolver.decide(source, matched) {
                Verdict::Create => actions.push(SyncAction::Create(source.clone())),
                Verdict::Update(reason) => {
                    // decide() only returns Update for matched pairs.
                    let item_id = matched.map(|b| b.id.clone()).unwrap_or_default();
                    actions.push(SyncAction::Update {
                        item_id,
                        reason,
                        source: source.clone(),
                    });
                }
                Verdict::Skip(reason) => actions.push(SyncAction::Skip {
                    key: source.key.clone(),
                    reason,
                }),
            }
        }

        SyncPlan {
            actions,
            duplicates,
        }
    }
}

/// Apply a plan against the board writer with bounded fan-out. Writes for
/// different source keys are independent, so up to `parallelism` of them run
/// concurrently; results are reduced after the fan-in. A triggered `cancel`
/// stops issuing new writes and lets in-flight ones finish.
pub async fn apply(
    plan: SyncPlan,
    writer: &dyn BoardWriter,
    parallelism: usize,
    cancel: watch::Receiver<bool>,
) -> ReconcileReport {
    let mut report = ReconcileReport {
        total: plan.actions.len(),
        ..Default::default()
    };
    for key in &plan.duplicates {
        report.errors.push(RecordError::new(
            key.clone(),
            "match",
            "duplicate correlation key on the board",
        ));
    }

    enum Applied {
        Created(String),
        Updated(String, UpdateReason),
        Skipped(String, SkipReason),
        Failed(RecordError),
    }

    let outcomes: Vec<Applied> = stream::iter(plan.actions)
        .map(|action| {
            let cancel = cancel.clone();
            async move {
                if *cancel.borrow() {
                    return Applied::Skipped(action.key().to_string(), SkipReason::Cancelled);
                }
                match action {
                    SyncAction::Skip { key, reason } => Applied::Skipped(key, reason),
                    SyncAction::Create(source) => match writer.create_item(&source).await {
                        Ok(()) => Applied::Created(source.key),
                        Err(err) => Applied::Failed(RecordError::new(
                            source.key,
                            "create",
                            err.to_string(),
                        )),
                    },
                    SyncAction::Update {
                        item_id,
                        reason,
                        source,
                    } => match writer.update_item(&item_id, &source).await {
                        Ok(()) => Applied::Updated(source.key, reason),
                        Err(err) => Applied::Failed(RecordError::new(
                            source.key,
                            "update",
                            err.to_string(),
                        )),
                    },
                }
            }
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            Applied::Created(key) => {
                info!("created board item for {key}");
                report.created += 1;
            }
            Applied::Updated(key, reason) => {
                match reason {
                    UpdateReason::SourceNewer => info!("updated board item for {key}"),
                    UpdateReason::OverwritesLocalEdits => {
                        warn!("updated board item for {key}, overwriting local board edits");
                        report.overwrote_local_edits += 1;
                    }
                }
                report.updated += 1;
            }
            Applied::Skipped(key, reason) => {
                info!("skipped {key} ({reason})");
                report.skipped += 1;
            }
            Applied::Failed(error) => {
                warn!("{} failed at {}: {}", error.key, error.stage, error.message);
                report.errors.push(error);
            }
        }
    }

    info!(
        "run complete: {} created, {} updated, {} skipped, {} error(s)",
        report.created,
        report.updated,
        report.skipped,
        report.errors.len()
    );
    report
}
