use thiserror::Error;

/// Failures the reconciliation engine reports as typed errors. Both are
/// recoverable: an unparsable timestamp degrades that record to string
/// comparison, and a missing correlation field skips the write.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not parse timestamp '{raw}'")]
    TimestampParse { raw: String },

    #[error("board field '{name}' not found in workspace schema")]
    FieldMissing { name: String },
}

/// One per-record failure in a run report: a write or match problem carried
/// as a stage plus message. The run keeps going; these are aggregated
/// instead of propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub key: String,
    pub stage: &'static str,
    pub message: String,
}

impl RecordError {
    pub fn new(key: impl Into<String>, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stage,
            message: message.into(),
        }
    }
}
