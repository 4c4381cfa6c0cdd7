pub mod driver;
pub mod error;
pub mod mapping;
pub mod matcher;
pub mod resolver;
pub mod timestamp;

pub use driver::{apply, ReconcileReport, Reconciler, SyncAction, SyncPlan};
pub use error::{RecordError, SyncError};
pub use mapping::{MappingContext, StatusMapper};
pub use resolver::{Resolver, SkipReason, UpdateReason, Verdict};

#[cfg(test)]
mod tests;
