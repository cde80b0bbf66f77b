use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::error::{ProcessingError, Result};
use crate::models::report::FailureKind;
use crate::models::request::RetrievalUnit;
use crate::models::station::DatasetKind;
use crate::utils::atomic::write_json_atomic;

/// Pipeline stages in completion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Pending,
    Retrieved,
    Extracted,
    Corrected,
    Encoded,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "PENDING",
            Stage::Retrieved => "RETRIEVED",
            Stage::Extracted => "EXTRACTED",
            Stage::Corrected => "CORRECTED",
            Stage::Encoded => "ENCODED",
            Stage::Done => "DONE",
        }
    }

    pub fn next(&self) -> Stage {
        match self {
            Stage::Pending => Stage::Retrieved,
            Stage::Retrieved => Stage::Extracted,
            Stage::Extracted => Stage::Corrected,
            Stage::Corrected => Stage::Encoded,
            Stage::Encoded | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The stage that was being attempted
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

/// Persisted progress of one retrieval unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub station: String,
    pub year: i32,
    pub kind: DatasetKind,
    pub signature: String,
    /// Highest stage completed
    pub stage: Stage,
    pub failure: Option<StageFailure>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(unit: &RetrievalUnit) -> Self {
        Self {
            station: unit.station_id().to_string(),
            year: unit.year,
            kind: unit.kind,
            signature: unit.signature.clone(),
            stage: Stage::Pending,
            failure: None,
            updated_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Load the unit's state, starting afresh when nothing usable is on disk.
    pub fn load_for(unit: &RetrievalUnit, path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(state)) if state.signature == unit.signature => state,
            Ok(Some(_)) => {
                warn!("Request for {} changed since last run, starting over", unit);
                Self::new(unit)
            }
            Ok(None) => Self::new(unit),
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                Self::new(unit)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn has_completed(&self, stage: Stage) -> bool {
        self.stage >= stage
    }

    pub fn is_finished(&self) -> bool {
        self.has_completed(Stage::Encoded)
    }

    pub fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
        self.failure = None;
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, stage: Stage, error: &ProcessingError) {
        self.failure = Some(StageFailure {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        });
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::{build_units, DataFormat};
    use crate::models::station::StationRequest;
    use tempfile::TempDir;

    fn unit() -> RetrievalUnit {
        let station = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .year(2021)
            .kinds(vec![DatasetKind::Surface])
            .build()
            .unwrap();
        build_units(&[station], DataFormat::Csv).remove(0)
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Pending < Stage::Retrieved);
        assert!(Stage::Encoded < Stage::Done);
        assert_eq!(Stage::Extracted.next(), Stage::Corrected);
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn test_state_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("2021_surface.json");
        let unit = unit();

        let mut state = PipelineState::load_for(&unit, &path);
        assert_eq!(state.stage, Stage::Pending);

        state.advance(Stage::Retrieved);
        state.record_failure(
            Stage::Extracted,
            &ProcessingError::Validation("too many rejects".into()),
        );
        state.save(&path).unwrap();

        let loaded = PipelineState::load_for(&unit, &path);
        assert_eq!(loaded.stage, Stage::Retrieved);
        assert!(loaded.has_completed(Stage::Retrieved));
        assert!(!loaded.is_finished());
        let failure = loaded.failure.unwrap();
        assert_eq!(failure.stage, Stage::Extracted);
        assert_eq!(failure.kind, FailureKind::Validation);
    }

    #[test]
    fn test_changed_signature_resets_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let unit = unit();

        let mut state = PipelineState::new(&unit);
        state.signature = "stale".to_string();
        state.advance(Stage::Encoded);
        state.save(&path).unwrap();

        assert_eq!(PipelineState::load_for(&unit, &path).stage, Stage::Pending);
    }
}
