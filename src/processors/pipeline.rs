//! Pipeline Orchestrator: drives every unit through its stages and
//! collects one report slot per unit.

use chrono::Utc;
use rayon::ThreadPool;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::archive::{ExistingDataPolicy, FetchOutcome, RawStore, RetrievalManager};
use crate::error::{ProcessingError, Result};
use crate::models::{
    CorrectedSeries, ExtractedSeries, PipelineState, ReportSlots, RetrievalUnit, RunReport, Stage,
    UnitOutcome, UnitReport,
};
use crate::processors::anomaly_corrector::{AnomalyCorrector, CorrectionConfig, CorrectionSummary};
use crate::processors::extractor::extract;
use crate::utils::atomic::{remove_if_exists, write_atomic, write_json_atomic};
use crate::utils::filename::DataLayout;
use crate::utils::progress::ProgressReporter;
use crate::writers::{encode, encode_interim};

/// Which slice of the stage chain a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineAction {
    Download,
    Process,
    Encode,
    #[default]
    All,
}

impl PipelineAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineAction::Download => "download",
            PipelineAction::Process => "process",
            PipelineAction::Encode => "encode",
            PipelineAction::All => "all",
        }
    }

    /// First and last stage this action runs
    pub fn stages(&self) -> (Stage, Stage) {
        match self {
            PipelineAction::Download => (Stage::Retrieved, Stage::Retrieved),
            PipelineAction::Process => (Stage::Extracted, Stage::Corrected),
            PipelineAction::Encode => (Stage::Encoded, Stage::Done),
            PipelineAction::All => (Stage::Retrieved, Stage::Done),
        }
    }
}

impl fmt::Display for PipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub action: PipelineAction,
    pub policy: ExistingDataPolicy,
    pub max_workers: usize,
    pub correction: CorrectionConfig,
    pub silent: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            action: PipelineAction::All,
            policy: ExistingDataPolicy::SkipExisting,
            max_workers: num_cpus::get(),
            correction: CorrectionConfig::default(),
            silent: true,
        }
    }
}

/// The corrected series plus what correction did to it
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CorrectedCheckpoint {
    summary: CorrectionSummary,
    series: CorrectedSeries,
}

/// Stage that has to be complete before `stage` can run
fn prerequisite(stage: Stage) -> Stage {
    match stage {
        Stage::Pending | Stage::Retrieved => Stage::Pending,
        Stage::Extracted => Stage::Retrieved,
        Stage::Corrected => Stage::Extracted,
        Stage::Encoded => Stage::Corrected,
        Stage::Done => Stage::Encoded,
    }
}

struct Worker {
    layout: DataLayout,
    store: RawStore,
    retrieval: Option<Arc<RetrievalManager>>,
    options: PipelineOptions,
    pool: Arc<ThreadPool>,
}

pub struct Pipeline {
    layout: DataLayout,
    retrieval: Option<Arc<RetrievalManager>>,
    options: PipelineOptions,
    pool: Arc<ThreadPool>,
}

impl Pipeline {
    pub fn new(layout: DataLayout, options: PipelineOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_workers.max(1))
            .thread_name(|i| format!("metprep-cpu-{}", i))
            .build()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;

        Ok(Self {
            layout,
            retrieval: None,
            options,
            pool: Arc::new(pool),
        })
    }

    /// Needed by any action that downloads
    pub fn with_retrieval(mut self, retrieval: RetrievalManager) -> Self {
        self.retrieval = Some(Arc::new(retrieval));
        self
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Run every unit concurrently and persist the run report. Unit
    /// failures are recorded in the report, never returned.
    pub async fn run(&self, units: &[RetrievalUnit]) -> Result<RunReport> {
        let started_at = Utc::now();
        let action = self.options.action;
        info!("Starting {} for {} units", action, units.len());

        let worker = Arc::new(Worker {
            layout: self.layout.clone(),
            store: RawStore::new(self.layout.clone()),
            retrieval: self.retrieval.clone(),
            options: self.options,
            pool: Arc::clone(&self.pool),
        });
        let slots = Arc::new(ReportSlots::new(units.len()));
        let progress = ProgressReporter::new(
            units.len() as u64,
            &format!("Running {}", action),
            self.options.silent,
        );

        let mut join_set = JoinSet::new();
        for (index, unit) in units.iter().cloned().enumerate() {
            let worker = Arc::clone(&worker);
            let slots = Arc::clone(&slots);
            join_set.spawn(async move {
                let report = worker.run_unit(&unit).await;
                slots.fill(index, report);
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!("Unit task aborted: {}", e);
            }
            progress.increment(1);
        }

        let report = slots.to_report(units, action.as_str(), started_at);
        progress.finish_with_message(&format!(
            "{} done, {} skipped, {} failed",
            report.count_done(),
            report.count_skipped(),
            report.count_failed()
        ));

        let path = report.save(&self.layout.reports_dir())?;
        info!("Run report written to {}", path.display());
        Ok(report)
    }
}

impl Worker {
    async fn run_unit(&self, unit: &RetrievalUnit) -> UnitReport {
        let state_path = self.layout.state_file(unit);
        let mut state = PipelineState::load_for(unit, &state_path);
        let mut stage = self.options.action.stages().0;

        let result = self.drive(unit, &mut state, &mut stage).await;
        match result {
            Ok(report) => report,
            Err(e) => {
                match &e {
                    ProcessingError::Encoding(_) => error!("{}: encoding defect: {}", unit, e),
                    ProcessingError::Format { .. } => error!("{}: {}", unit, e),
                    _ => error!("{} failed at {}: {}", unit, stage, e),
                }
                state.record_failure(stage, &e);
                if let Err(save) = state.save(&state_path) {
                    warn!("Could not record failure for {}: {}", unit, save);
                }
                UnitReport::new(
                    unit,
                    UnitOutcome::Failed {
                        stage,
                        kind: e.kind(),
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Remove what stages from `first` onwards produced and rewind the state.
    fn rewind(&self, unit: &RetrievalUnit, state: &mut PipelineState, first: Stage) -> Result<()> {
        for path in self.layout.derived_artifacts(unit, first) {
            remove_if_exists(&path)?;
        }

        let floor = prerequisite(first);
        if state.stage > floor {
            state.stage = floor;
        }
        state.failure = None;
        Ok(())
    }

    async fn drive(
        &self,
        unit: &RetrievalUnit,
        state: &mut PipelineState,
        current: &mut Stage,
    ) -> Result<UnitReport> {
        let state_path = self.layout.state_file(unit);
        let action = self.options.action;
        let (first, last) = action.stages();

        if self.options.policy == ExistingDataPolicy::ForceOverwrite
            && state.stage >= prerequisite(first)
        {
            info!("Overwriting {} from {}", unit, first);
            self.rewind(unit, state, first)?;
        } else if state.is_finished() && !self.layout.processed_output(unit).exists() {
            warn!("{}: processed output is missing, encoding again", unit);
            state.stage = Stage::Corrected;
        }

        if action != PipelineAction::Download && state.has_completed(last) {
            info!("{} already at {}, skipping", unit, state.stage);
            return Ok(UnitReport::new(unit, UnitOutcome::SkippedAlreadyDone));
        }

        if !state.has_completed(prerequisite(first)) {
            return Err(ProcessingError::Prerequisite {
                stage: first.to_string(),
                reason: format!(
                    "{} needs {} first but is at {}",
                    unit,
                    prerequisite(first),
                    state.stage
                ),
            });
        }

        // Download always consults the raw store; the others resume
        let mut stage = if action == PipelineAction::Download {
            first
        } else {
            first.max(state.stage.next())
        };

        let mut extracted: Option<ExtractedSeries> = None;
        let mut corrected: Option<CorrectedCheckpoint> = None;
        let mut skipped_download = false;

        loop {
            *current = stage;
            match stage {
                Stage::Pending | Stage::Done => {}
                Stage::Retrieved => skipped_download = self.retrieve(unit, state).await?,
                Stage::Extracted => extracted = Some(self.extract(unit).await?),
                Stage::Corrected => corrected = Some(self.correct(unit, extracted.take()).await?),
                Stage::Encoded => corrected = Some(self.encode(unit, corrected.take()).await?),
            }
            state.advance(stage);
            state.save(&state_path)?;
            info!("{} reached {}", unit, stage);

            if stage >= last {
                break;
            }
            stage = stage.next();
        }

        let outcome = if skipped_download && action == PipelineAction::Download {
            UnitOutcome::SkippedAlreadyDone
        } else {
            UnitOutcome::Done
        };
        let report = UnitReport::new(unit, outcome);
        Ok(match corrected {
            Some(c) => report.with_corrections(c.summary.rejected_records, c.summary.corrected_fields),
            None => report,
        })
    }

    /// CPU-bound work on the rayon pool, off the async runtime.
    async fn cpu<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || pool.install(job)).await?
    }

    /// Returns true when existing raw data was kept.
    async fn retrieve(&self, unit: &RetrievalUnit, state: &mut PipelineState) -> Result<bool> {
        let retrieval = self.retrieval.as_ref().ok_or_else(|| {
            ProcessingError::Config("downloads need an archive service".to_string())
        })?;
        match retrieval.fetch(unit, self.options.policy).await {
            FetchOutcome::Skipped(_) => Ok(true),
            FetchOutcome::Fetched(_) => {
                if state.stage > Stage::Retrieved {
                    // Everything derived from the old archive is stale now
                    self.rewind(unit, state, Stage::Extracted)?;
                }
                Ok(false)
            }
            FetchOutcome::Failed(e) => Err(e),
        }
    }

    async fn extract(&self, unit: &RetrievalUnit) -> Result<ExtractedSeries> {
        let store = self.store.clone();
        let checkpoint = self.layout.extracted_checkpoint(unit);
        let owned = unit.clone();

        self.cpu(move || {
            let dataset = store.lookup(&owned).ok_or_else(|| ProcessingError::Prerequisite {
                stage: Stage::Extracted.to_string(),
                reason: format!("no complete raw archive for {}, run download first", owned),
            })?;
            let (series, _) = extract(&dataset.path, &owned)?;
            write_json_atomic(&checkpoint, &series)?;
            Ok(series)
        })
        .await
    }

    async fn correct(
        &self,
        unit: &RetrievalUnit,
        extracted: Option<ExtractedSeries>,
    ) -> Result<CorrectedCheckpoint> {
        let extracted_path = self.layout.extracted_checkpoint(unit);
        let corrected_path = self.layout.corrected_checkpoint(unit);
        let interim_path = self.layout.interim_file(unit);
        let corrector = AnomalyCorrector::new(self.options.correction)
            .with_station_elevation(unit.station.elevation);
        let station = Arc::clone(&unit.station);
        let label = unit.label();

        self.cpu(move || {
            let series = match extracted {
                Some(series) => series,
                None => load_checkpoint(&extracted_path, Stage::Corrected)?,
            };
            let (series, summary) = corrector.correct(&series)?;
            if summary.rejected_records > 0 || summary.corrected_fields > 0 {
                warn!(
                    "{}: {} records rejected, {} fields corrected, {} calm hours",
                    label, summary.rejected_records, summary.corrected_fields, summary.calm_records
                );
            }

            let checkpoint = CorrectedCheckpoint { summary, series };
            write_json_atomic(&corrected_path, &checkpoint)?;
            write_atomic(&interim_path, &encode_interim(&checkpoint.series, &station)?)?;
            Ok(checkpoint)
        })
        .await
    }

    async fn encode(
        &self,
        unit: &RetrievalUnit,
        corrected: Option<CorrectedCheckpoint>,
    ) -> Result<CorrectedCheckpoint> {
        let corrected_path = self.layout.corrected_checkpoint(unit);
        let output = self.layout.processed_output(unit);
        let station = Arc::clone(&unit.station);
        let year = unit.year;

        self.cpu(move || {
            let checkpoint: CorrectedCheckpoint = match corrected {
                Some(checkpoint) => checkpoint,
                None => load_checkpoint(&corrected_path, Stage::Encoded)?,
            };
            let text = encode(&checkpoint.series, &station, year)?;
            write_atomic(&output, text.as_bytes())?;
            Ok(checkpoint)
        })
        .await
    }
}

/// Reload a checkpoint written by an earlier run; `stage` is the one that needs it.
fn load_checkpoint<T: DeserializeOwned>(path: &Path, stage: Stage) -> Result<T> {
    if !path.exists() {
        return Err(ProcessingError::Prerequisite {
            stage: stage.to_string(),
            reason: format!("checkpoint {} is missing", path.display()),
        });
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_stages() {
        assert_eq!(
            PipelineAction::Process.stages(),
            (Stage::Extracted, Stage::Corrected)
        );
        assert_eq!(prerequisite(Stage::Extracted), Stage::Retrieved);
        assert_eq!(prerequisite(Stage::Encoded), Stage::Corrected);
        assert_eq!(prerequisite(Stage::Retrieved), Stage::Pending);
    }

    #[test]
    fn test_missing_checkpoint_is_prerequisite_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_checkpoint::<ExtractedSeries>(&dir.path().join("x.json"), Stage::Corrected)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Prerequisite { .. }));
    }
}
