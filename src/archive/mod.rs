pub mod cds_client;
pub mod inspector;
pub mod raw_store;
pub mod retrieval;
pub mod temp_manager;

pub use cds_client::{CdsClient, CdsCredentials};
pub use inspector::{ArchiveInspector, ArchiveSummary, RawFormat};
pub use raw_store::{RawDataset, RawStatus, RawStore};
pub use retrieval::{DecisionSource, FetchOutcome, FixedDecision, RetrievalManager, RetryPolicy};
pub use temp_manager::TempFileManager;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Remote archive the raw reanalysis files come from
#[async_trait]
pub trait ArchiveService: Send + Sync {
    fn name(&self) -> &str;

    /// Run one retrieval request against `dataset` and write the delivered
    /// file to `dest`. Returns the number of bytes written.
    async fn retrieve(&self, dataset: &str, request: &serde_json::Value, dest: &Path) -> Result<u64>;
}

/// What to do when a unit's raw data is already on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExistingDataPolicy {
    /// Ask the configured decision source
    #[default]
    Prompt,
    SkipExisting,
    ForceOverwrite,
}

impl ExistingDataPolicy {
    pub fn from_flags(overwrite: bool, assume_yes: bool) -> Self {
        if overwrite {
            ExistingDataPolicy::ForceOverwrite
        } else if assume_yes {
            ExistingDataPolicy::SkipExisting
        } else {
            ExistingDataPolicy::Prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_flags() {
        assert_eq!(
            ExistingDataPolicy::from_flags(true, true),
            ExistingDataPolicy::ForceOverwrite
        );
        assert_eq!(
            ExistingDataPolicy::from_flags(false, true),
            ExistingDataPolicy::SkipExisting
        );
        assert_eq!(
            ExistingDataPolicy::from_flags(false, false),
            ExistingDataPolicy::Prompt
        );
    }
}
