use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

use crate::error::Result;
use crate::models::request::RetrievalUnit;
use crate::models::state::Stage;
use crate::models::station::DatasetKind;
use crate::utils::atomic::write_json_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Auth,
    Format,
    Validation,
    Encoding,
    Io,
    Config,
    Prerequisite,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Done,
    SkippedAlreadyDone,
    Failed {
        stage: Stage,
        kind: FailureKind,
        reason: String,
    },
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UnitOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub station: String,
    pub year: i32,
    pub kind: DatasetKind,
    pub outcome: UnitOutcome,
    pub rejected_records: usize,
    pub corrected_fields: usize,
}

impl UnitReport {
    pub fn new(unit: &RetrievalUnit, outcome: UnitOutcome) -> Self {
        Self {
            station: unit.station_id().to_string(),
            year: unit.year,
            kind: unit.kind,
            outcome,
            rejected_records: 0,
            corrected_fields: 0,
        }
    }

    pub fn with_corrections(mut self, rejected: usize, corrected: usize) -> Self {
        self.rejected_records = rejected;
        self.corrected_fields = corrected;
        self
    }

    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.station, self.year, self.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.units.iter().all(|u| u.outcome.is_success())
    }

    pub fn count_done(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Done))
    }

    pub fn count_skipped(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::SkippedAlreadyDone))
    }

    pub fn count_failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| predicate(&u.outcome)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| !u.outcome.is_success())
    }

    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!("Run Report ({})\n", self.action));
        summary.push_str("==========\n");
        summary.push_str(&format!("Units: {}\n", self.units.len()));
        summary.push_str(&format!("Done: {}\n", self.count_done()));
        summary.push_str(&format!("Skipped (already done): {}\n", self.count_skipped()));
        summary.push_str(&format!("Failed: {}\n", self.count_failed()));
        summary.push_str(&format!(
            "Elapsed: {:.1}s\n",
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        ));

        let failures: Vec<&UnitReport> = self.failures().collect();
        if !failures.is_empty() {
            summary.push_str("\nFailures:\n");
            for unit in failures {
                if let UnitOutcome::Failed {
                    stage,
                    kind,
                    reason,
                } = &unit.outcome
                {
                    summary.push_str(&format!(
                        "  {} at {} [{:?}]: {}\n",
                        unit.label(),
                        stage,
                        kind,
                        reason
                    ));
                }
            }
        }

        summary
    }

    /// Write the report as `run-{timestamp}.json` under `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!(
            "run-{}.json",
            self.started_at.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        write_json_atomic(&path, self)?;
        Ok(path)
    }
}

/// One write-once slot per unit, read after every unit has finished.
pub struct ReportSlots {
    slots: Vec<OnceLock<UnitReport>>,
}

impl ReportSlots {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns false if the slot was already written.
    pub fn fill(&self, index: usize, report: UnitReport) -> bool {
        match self.slots.get(index) {
            Some(slot) => slot.set(report).is_ok(),
            None => false,
        }
    }

    pub fn to_report(
        &self,
        units: &[RetrievalUnit],
        action: &str,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let reports = self
            .slots
            .iter()
            .zip(units)
            .map(|(slot, unit)| match slot.get() {
                Some(report) => report.clone(),
                None => {
                    warn!("Unit {} finished without reporting", unit);
                    UnitReport::new(
                        unit,
                        UnitOutcome::Failed {
                            stage: Stage::Pending,
                            kind: FailureKind::Internal,
                            reason: "unit did not report an outcome".to_string(),
                        },
                    )
                }
            })
            .collect();

        RunReport {
            action: action.to_string(),
            started_at,
            finished_at: Utc::now(),
            units: reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::{build_units, DataFormat};
    use crate::models::station::StationRequest;
    use tempfile::TempDir;

    fn units() -> Vec<RetrievalUnit> {
        let station = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .year(2021)
            .build()
            .unwrap();
        build_units(&[station], DataFormat::Csv)
    }

    #[test]
    fn test_slots_are_write_once() {
        let units = units();
        let slots = ReportSlots::new(units.len());

        assert!(slots.fill(0, UnitReport::new(&units[0], UnitOutcome::Done)));
        assert!(!slots.fill(0, UnitReport::new(&units[0], UnitOutcome::SkippedAlreadyDone)));
        assert!(!slots.fill(5, UnitReport::new(&units[0], UnitOutcome::Done)));

        let report = slots.to_report(&units, "all", Utc::now());
        assert_eq!(report.units[0].outcome, UnitOutcome::Done);
        // Slot 1 was never filled
        assert!(matches!(
            report.units[1].outcome,
            UnitOutcome::Failed {
                kind: FailureKind::Internal,
                ..
            }
        ));
        assert!(!report.is_success());
    }

    #[test]
    fn test_report_summary_and_save() {
        let units = units();
        let slots = ReportSlots::new(units.len());
        slots.fill(0, UnitReport::new(&units[0], UnitOutcome::SkippedAlreadyDone));
        slots.fill(
            1,
            UnitReport::new(
                &units[1],
                UnitOutcome::Failed {
                    stage: Stage::Retrieved,
                    kind: FailureKind::Auth,
                    reason: "HTTP 401".to_string(),
                },
            ),
        );
        let report = slots.to_report(&units, "download", Utc::now());

        assert_eq!(report.count_skipped(), 1);
        assert_eq!(report.count_failed(), 1);
        let summary = report.generate_summary();
        assert!(summary.contains("SiteA/2021/upperair at RETRIEVED [Auth]: HTTP 401"));

        let dir = TempDir::new().unwrap();
        let path = report.save(dir.path()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"status\": \"skipped_already_done\""));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("run-"));
    }
}
