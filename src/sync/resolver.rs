use std::fmt;

use chrono::Duration;
use log::{debug, warn};

use super::mapping::StatusMapper;
use super::timestamp;
use crate::model::board_item::BoardItem;
use crate::model::source_item::SourceItem;

/// Tolerance absorbing clock skew and write latency between the board
/// recording a sync write and the watermark stamped into it. A board edit
/// inside this window is indistinguishable from the sync write itself.
pub const GRACE_SECONDS: i64 = 30;

/// Outcome of the per-pair decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Create,
    Update(UpdateReason),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    /// The source changed after the last sync write.
    SourceNewer,
    /// The board item was edited directly after the last sync write. The
    /// source still wins, but this overwrites human edits and is reported
    /// in its own category.
    OverwritesLocalEdits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Source status is in the configured terminal set.
    Terminal,
    /// Nothing changed on either side since the last sync.
    UpToDate,
    /// The run was cancelled before this write was issued.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Terminal => write!(f, "terminal status"),
            SkipReason::UpToDate => write!(f, "up to date"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Decides, for one source item and its matched board item (if any), whether
/// to create, update, or leave alone. The comparison is three-way: source
/// modification time vs. board modification time vs. the watermark recorded
/// at the last sync write.
pub struct Resolver<'a> {
    pub mapper: StatusMapper<'a>,
    /// Field id holding the watermark on board items; `None` when the field
    /// is not present in the workspace schema.
    pub watermark_field_id: Option<String>,
    /// Offset applied to board UTC timestamps to align them with the
    /// source's locally-reported ones.
    pub offset_hours: i64,
}

impl Resolver<'_> {
    pub fn decide(&self, source: &SourceItem, matched: Option<&BoardItem>) -> Verdict {
        let Some(board) = matched else {
            return Verdict::Create;
        };

        let watermark = self
            .watermark_field_id
            .as_deref()
            .and_then(|id| board.text_field(id))
            .map(timestamp::normalize)
            .unwrap_or_default();

        let source_updated = timestamp::normalize(&source.updated);

        // Missing data on either side forces a conservative update; favor
        // freshness over staleness.
        let source_newer = source_updated.is_empty()
            || watermark.is_empty()
            || source_updated.as_str() > watermark.as_str();

        let locally_modified = self.board_locally_modified(board, &watermark);

        if locally_modified {
            warn!(
                "{}: board item {} was edited after the last sync; source wins, local edits will be overwritten",
                source.key, board.id
            );
            return Verdict::Update(UpdateReason::OverwritesLocalEdits);
        }
        if source_newer {
            debug!(
                "{}: source updated {} is newer than watermark {:?}",
                source.key, source_updated, watermark
            );
            return Verdict::Update(UpdateReason::SourceNewer);
        }
        Verdict::Skip(SkipReason::UpToDate)
    }

    /// True when the board item was touched after creation AND that touch
    /// landed more than the grace window after the last sync write. Without
    /// a watermark there is nothing to compare against, so this cannot fire.
    fn board_locally_modified(&self, board: &BoardItem, watermark: &str) -> bool {
        if watermark.is_empty() {
            return false;
        }
        let created = timestamp::normalize(&board.created_at);
        let updated = timestamp::normalize(&board.last_updated_at);
        if created == updated {
            return false;
        }

        let local_updated = match timestamp::to_local(&board.last_updated_at, self.offset_hours) {
            Ok(local) => local,
            // Degraded comparison: no offset, no grace arithmetic.
            Err(_) => return updated.as_str() > watermark,
        };

        match (timestamp::parse(&local_updated), timestamp::parse(watermark)) {
            (Some(local), Some(mark)) => local > mark + Duration::seconds(GRACE_SECONDS),
            _ => local_updated.as_str() > watermark,
        }
    }

    /// Diagnostic content comparison: does not gate the verdict, but reports
    /// which facets would change if the update were applied. Returns whether
    /// anything differs plus one line per differing facet.
    pub fn content_differs(&self, source: &SourceItem, board: &BoardItem) -> (bool, Vec<String>) {
        let mut diffs = Vec::new();

        if source.title != board.name {
            diffs.push(format!(
                "title: '{}' vs board '{}'",
                source.title, board.name
            ));
        }

        let rendered = source.build_markdown_description();
        let board_text = board.description.plain_text();
        if rendered != board_text {
            diffs.push("description: rendered body differs from board content".to_string());
        }

        let mapped = self.mapper.resolve(source.status_name()).unwrap_or_default();
        if mapped != board.status_id {
            diffs.push(format!(
                "status: mapped '{}' vs board '{}'",
                mapped, board.status_id
            ));
        }

        (!diffs.is_empty(), diffs)
    }
}
