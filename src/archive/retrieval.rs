//! Retrieval Manager: turns one unit into a committed raw archive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::archive::raw_store::{RawDataset, RawStore};
use crate::archive::{ArchiveService, ExistingDataPolicy};
use crate::error::{ProcessingError, Result};
use crate::models::RetrievalUnit;
use crate::utils::constants::{
    DEFAULT_INITIAL_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_SECS,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Answers "keep the raw data already on disk?" for `Prompt` policy runs
pub trait DecisionSource: Send + Sync {
    fn keep_existing(&self, unit: &RetrievalUnit, existing: &RawDataset) -> bool;
}

/// Always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub bool);

impl DecisionSource for FixedDecision {
    fn keep_existing(&self, _unit: &RetrievalUnit, _existing: &RawDataset) -> bool {
        self.0
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(RawDataset),
    Skipped(RawDataset),
    Failed(ProcessingError),
}

impl FetchOutcome {
    pub fn into_result(self) -> Result<RawDataset> {
        match self {
            FetchOutcome::Fetched(dataset) | FetchOutcome::Skipped(dataset) => Ok(dataset),
            FetchOutcome::Failed(err) => Err(err),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FetchOutcome::Skipped(_))
    }
}

/// Bounded attempts with exponential backoff between them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

pub struct RetrievalManager {
    service: Arc<dyn ArchiveService>,
    store: RawStore,
    requests: Arc<Semaphore>,
    retry: RetryPolicy,
    request_timeout: Duration,
    decisions: Arc<dyn DecisionSource>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RetrievalManager {
    pub fn new(service: Arc<dyn ArchiveService>, store: RawStore) -> Self {
        Self {
            service,
            store,
            requests: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_REQUESTS)),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            decisions: Arc::new(FixedDecision(true)),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.requests = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_decision_source(mut self, decisions: Arc<dyn DecisionSource>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn store(&self) -> &RawStore {
        &self.store
    }

    fn signature_lock(&self, signature: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(signature.to_string()).or_default())
    }

    /// Make sure the unit's raw archive exists according to `policy`.
    /// Never panics or propagates; failures come back as `Failed`.
    pub async fn fetch(&self, unit: &RetrievalUnit, policy: ExistingDataPolicy) -> FetchOutcome {
        let lock = self.signature_lock(&unit.signature);
        let _guard = lock.lock().await;

        match self.fetch_locked(unit, policy).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Retrieval of {} failed: {}", unit, e);
                FetchOutcome::Failed(e)
            }
        }
    }

    async fn fetch_locked(
        &self,
        unit: &RetrievalUnit,
        policy: ExistingDataPolicy,
    ) -> Result<FetchOutcome> {
        if let Some(existing) = self.store.lookup(unit) {
            let keep = match policy {
                ExistingDataPolicy::SkipExisting => true,
                ExistingDataPolicy::ForceOverwrite => false,
                ExistingDataPolicy::Prompt => {
                    let decisions = Arc::clone(&self.decisions);
                    let (unit, dataset) = (unit.clone(), existing.clone());
                    tokio::task::spawn_blocking(move || decisions.keep_existing(&unit, &dataset))
                        .await?
                }
            };
            if keep {
                info!("Raw data for {} already present, skipping download", unit);
                return Ok(FetchOutcome::Skipped(existing));
            }
        }

        if self.store.has_any(unit) {
            info!("Removing previous raw data for {}", unit);
            self.store.delete(unit)?;
        }

        match self.download(unit).await {
            Ok(dataset) => Ok(FetchOutcome::Fetched(dataset)),
            Err(e) => {
                if let Err(cleanup) = self.store.discard(unit) {
                    warn!("Could not discard partial data for {}: {}", unit, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn download(&self, unit: &RetrievalUnit) -> Result<RawDataset> {
        let partial = self.store.begin(unit)?;
        let dataset = unit.kind.dataset_name();
        let mut staged: Vec<(String, PathBuf)> = Vec::with_capacity(12);

        for month in 1..=12 {
            let request = unit.monthly_request(month);
            let dest = partial.join(format!("{:02}.part", month));
            let bytes = self.retrieve_with_retry(unit, dataset, &request, &dest).await?;
            debug!("{}: month {:02} delivered {} bytes", unit, month, bytes);
            staged.push((unit.month_member_stem(month), dest));
        }

        let store = self.store.clone();
        let owned = unit.clone();
        let dataset =
            tokio::task::spawn_blocking(move || store.commit(&owned, &staged)).await??;
        info!(
            "Fetched {} ({} bytes, sha256 {})",
            unit,
            dataset.size,
            &dataset.checksum[..12.min(dataset.checksum.len())]
        );
        Ok(dataset)
    }

    async fn retrieve_with_retry(
        &self,
        unit: &RetrievalUnit,
        dataset: &str,
        request: &serde_json::Value,
        dest: &Path,
    ) -> Result<u64> {
        let mut attempt = 0;
        loop {
            let result = {
                let _permit = self
                    .requests
                    .acquire()
                    .await
                    .map_err(|_| ProcessingError::Cancelled)?;
                match tokio::time::timeout(
                    self.request_timeout,
                    self.service.retrieve(dataset, request, dest),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProcessingError::network(
                        format!(
                            "{} request timed out after {}s",
                            self.service.name(),
                            self.request_timeout.as_secs()
                        ),
                        true,
                    )),
                }
            };

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if !e.is_retryable() || attempt + 1 >= self.retry.max_attempts => {
                    return Err(e)
                }
                Err(e) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        unit,
                        attempt + 1,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{build_units, DataFormat, StationRequest};
    use crate::utils::filename::DataLayout;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` calls with the given error, then writes a
    /// small CSV per call.
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        retryable: bool,
    }

    #[async_trait]
    impl ArchiveService for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn retrieve(&self, _: &str, request: &serde_json::Value, dest: &Path) -> Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ProcessingError::network("HTTP 503: busy", self.retryable));
            }
            let body = format!("valid_time,latitude,longitude\n{}\n", request["month"][0]);
            tokio::fs::write(dest, &body).await?;
            Ok(body.len() as u64)
        }
    }

    fn unit() -> RetrievalUnit {
        let station = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .year(2021)
            .build()
            .unwrap();
        build_units(&[station], DataFormat::Csv).remove(0)
    }

    fn manager(dir: &TempDir, service: Arc<Flaky>) -> RetrievalManager {
        RetrievalManager::new(service, RawStore::new(DataLayout::new(dir.path()))).with_retry(
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
        )
    }

    fn flaky(failures: usize, retryable: bool) -> Arc<Flaky> {
        Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            failures,
            retryable,
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(30),
        };
        assert_eq!(retry.backoff(0), Duration::from_secs(5));
        assert_eq!(retry.backoff(1), Duration::from_secs(10));
        assert_eq!(retry.backoff(3), Duration::from_secs(30));
        assert_eq!(retry.backoff(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let dir = TempDir::new().unwrap();
        let service = flaky(1, true);
        let manager = manager(&dir, Arc::clone(&service));
        let unit = unit();

        let outcome = manager.fetch(&unit, ExistingDataPolicy::SkipExisting).await;
        let dataset = outcome.into_result().unwrap();
        assert_eq!(dataset.members.len(), 12);
        assert_eq!(service.calls.load(Ordering::SeqCst), 13);
        assert!(manager.store().lookup(&unit).is_some());
    }

    #[tokio::test]
    async fn test_permanent_failure_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let service = flaky(1, false);
        let manager = manager(&dir, Arc::clone(&service));
        let unit = unit();

        let outcome = manager.fetch(&unit, ExistingDataPolicy::SkipExisting).await;
        assert!(matches!(outcome, FetchOutcome::Failed(ProcessingError::Network { .. })));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(!manager.store().has_any(&unit));
    }

    #[tokio::test]
    async fn test_existing_data_policies() {
        let dir = TempDir::new().unwrap();
        let service = flaky(0, true);
        let manager = manager(&dir, Arc::clone(&service));
        let unit = unit();

        manager.fetch(&unit, ExistingDataPolicy::SkipExisting).await.into_result().unwrap();
        assert!(manager.fetch(&unit, ExistingDataPolicy::SkipExisting).await.is_skipped());
        assert!(manager.fetch(&unit, ExistingDataPolicy::Prompt).await.is_skipped());
        assert_eq!(service.calls.load(Ordering::SeqCst), 12);

        let outcome = manager.fetch(&unit, ExistingDataPolicy::ForceOverwrite).await;
        assert!(matches!(outcome, FetchOutcome::Fetched(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 24);

        let declining = manager.with_decision_source(Arc::new(FixedDecision(false)));
        let outcome = declining.fetch(&unit, ExistingDataPolicy::Prompt).await;
        assert!(matches!(outcome, FetchOutcome::Fetched(_)));
    }
}
