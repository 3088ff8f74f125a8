//! # Batch Orchestrator
//!
//! Runs an analysis task over a batch of assets, one asset at a time:
//!
//! 1. Enumerates assets and selects the work list for the run mode.
//! 2. Uploads each asset and queries the analysis service with a bounded,
//!    fixed-delay retry.
//! 3. Extracts and repairs the response into a valid record.
//! 4. Persists the record (except in dry runs) and tallies the outcome.
//!
//! A failing item never aborts the run. Only configuration problems detected
//! before the first external call do.

use crate::assets::{Asset, AssetError, AssetSource};
use crate::errors::{AnalysisError, StoreError};
use crate::extract::ExtractionFailure;
use crate::providers::ai::{AnalysisService, UploadedAsset};
use crate::providers::db::storage::{FeatureStore, IdentityFilter};
use crate::record::ValidatedRecord;
use crate::repair::{RepairError, RepairLoop, RepairPolicy, Resolution};
use crate::tasks::AnalysisTask;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_CALL_ATTEMPTS: u32 = 3;
pub const DEFAULT_CALL_DELAY: Duration = Duration::from_secs(5);

/// Errors that abort a whole run before any asset is processed.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Failed to enumerate assets: {0}")]
    Assets(#[from] AssetError),
    #[error("Failed to list completed assets: {0}")]
    Store(#[from] StoreError),
}

/// Why a single item ended up FAILED.
#[derive(Error, Debug)]
pub enum ItemFailure {
    #[error("Upload failed: {0}")]
    Upload(#[source] AnalysisError),
    #[error("Analysis failed after {attempts} attempts: {last}")]
    CallsExhausted { attempts: u32, last: AnalysisError },
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),
    #[error(transparent)]
    Repair(#[from] RepairError),
    #[error("Persisting failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Process the first asset only and never persist.
    Dry,
    /// Process every asset of a fixed subset, regardless of prior completion.
    Restricted,
    /// Process only assets not yet marked done in the store.
    Incremental,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Dry => write!(f, "dry"),
            RunMode::Restricted => write!(f, "restricted-set"),
            RunMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Bounded retry with a fixed delay before every attempt. The delay doubles
/// as settling time for freshly uploaded assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CALL_ATTEMPTS,
            delay: DEFAULT_CALL_DELAY,
        }
    }
}

/// Every selected item starts `Pending` and ends `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub asset: Asset,
    pub status: ItemStatus,
}

/// Per-run counters. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Items selected for processing.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Assets excluded because they were already done, or duplicated an
    /// identity earlier in the listing.
    pub skipped: usize,
    /// Successful items whose store document did not exist beforehand.
    pub not_found: usize,
    pub failed_ids: Vec<String>,
    pub not_found_ids: Vec<String>,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {}, Success: {}, Fail: {}, Skipped: {}, Not found: {}",
            self.total, self.succeeded, self.failed, self.skipped, self.not_found
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub stats: RunStats,
    pub items: Vec<WorkItem>,
    /// The record produced by a dry run, if it succeeded.
    pub preview: Option<(String, ValidatedRecord)>,
}

enum ItemOutcome {
    Done {
        record: ValidatedRecord,
        existed: Option<bool>,
    },
    Failed(ItemFailure),
}

pub struct BatchOrchestrator {
    service: Box<dyn AnalysisService>,
    store: Box<dyn FeatureStore>,
    task: AnalysisTask,
    retry: RetryPolicy,
    repair: RepairLoop,
}

impl fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("task", &self.task.name())
            .field("store", &self.store.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    pub fn new(
        service: Box<dyn AnalysisService>,
        store: Box<dyn FeatureStore>,
        task: AnalysisTask,
    ) -> Self {
        Self {
            service,
            store,
            task,
            retry: RetryPolicy::default(),
            repair: RepairLoop::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
        self.repair = RepairLoop::new(policy);
        self
    }

    pub fn task(&self) -> &AnalysisTask {
        &self.task
    }

    /// Identities already done for this task according to the store.
    pub async fn completed_identities(&self) -> Result<HashSet<String>, StoreError> {
        let filter = IdentityFilter::HasFields(self.task.completion_fields());
        Ok(self.store.list_identities(&filter).await?.into_iter().collect())
    }

    /// Runs the task over the assets from `source` in the given mode.
    #[instrument(skip(self, source), fields(task = %self.task.name()))]
    pub async fn run(
        &self,
        mode: RunMode,
        source: &dyn AssetSource,
    ) -> Result<RunReport, OrchestratorError> {
        let defective = self.task.schema().defective_fallbacks();
        if !defective.is_empty() {
            error!(
                "Schema '{}' has inadmissible fallbacks for: {}. Items needing them will fail.",
                self.task.schema().name(),
                defective.join(", ")
            );
        }

        let assets = source.list()?;
        let mut stats = RunStats::default();
        let work = self.select_work(mode, assets, &mut stats).await?;
        stats.total = work.len();
        info!(
            "Starting {} run of '{}' over {} assets ({} skipped).",
            mode,
            self.task.name(),
            stats.total,
            stats.skipped
        );

        let persist = mode != RunMode::Dry;
        let mut items: Vec<WorkItem> = work
            .into_iter()
            .map(|asset| WorkItem {
                asset,
                status: ItemStatus::Pending,
            })
            .collect();
        let mut preview = None;

        for item in items.iter_mut() {
            let asset = &item.asset;
            let outcome = self.process_item(asset, persist).await;
            item.status = match outcome {
                ItemOutcome::Done { record, existed } => {
                    stats.succeeded += 1;
                    if existed == Some(false) {
                        stats.not_found += 1;
                        stats.not_found_ids.push(asset.id.clone());
                    }
                    if !persist {
                        preview = Some((asset.id.clone(), record));
                    }
                    ItemStatus::Done
                }
                ItemOutcome::Failed(failure) => {
                    error!(asset = %asset.id, "Item failed: {}", failure);
                    stats.failed += 1;
                    stats.failed_ids.push(asset.id.clone());
                    ItemStatus::Failed
                }
            };
        }
        debug_assert!(items.iter().all(|i| i.status != ItemStatus::Pending));

        info!("Batch '{}' done. {}", self.task.name(), stats);
        Ok(RunReport {
            mode,
            stats,
            items,
            preview,
        })
    }

    async fn select_work(
        &self,
        mode: RunMode,
        assets: Vec<Asset>,
        stats: &mut RunStats,
    ) -> Result<Vec<Asset>, OrchestratorError> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(assets.len());
        for asset in assets {
            if seen.insert(asset.id.clone()) {
                unique.push(asset);
            } else {
                warn!("Duplicate asset identity '{}' ignored: {}", asset.id, asset.path.display());
                stats.skipped += 1;
            }
        }

        Ok(match mode {
            RunMode::Dry => unique.into_iter().take(1).collect(),
            RunMode::Restricted => unique,
            RunMode::Incremental => {
                let done = self.completed_identities().await?;
                let (skip, todo): (Vec<Asset>, Vec<Asset>) =
                    unique.into_iter().partition(|a| done.contains(&a.id));
                stats.skipped += skip.len();
                todo
            }
        })
    }

    #[instrument(skip(self, asset), fields(asset = %asset.id))]
    async fn process_item(&self, asset: &Asset, persist: bool) -> ItemOutcome {
        match self.try_process_item(asset, persist).await {
            Ok((record, existed)) => ItemOutcome::Done { record, existed },
            Err(failure) => ItemOutcome::Failed(failure),
        }
    }

    async fn try_process_item(
        &self,
        asset: &Asset,
        persist: bool,
    ) -> Result<(ValidatedRecord, Option<bool>), ItemFailure> {
        let uploaded = self
            .service
            .upload(asset)
            .await
            .map_err(ItemFailure::Upload)?;

        let raw = self.analyze_with_retry(&uploaded).await?;
        let candidate = self.task.extract(&raw)?;
        let outcome = self
            .repair
            .run(&self.task, self.service.as_ref(), candidate, &raw)
            .await?;

        match &outcome.resolution {
            Resolution::Valid => info!("Successfully validated output."),
            Resolution::Corrected { corrective_calls } => {
                info!("Validated after {} corrective re-queries.", corrective_calls)
            }
            Resolution::Fallback { fields, .. } => {
                warn!("Validated with fallbacks for: {}", fields.join(", "))
            }
        }

        if !persist {
            return Ok((outcome.record, None));
        }
        let existed = self.store.upsert(&asset.id, &outcome.record).await?;
        if !existed {
            warn!("No existing document for {}; created one.", asset.id);
        }
        Ok((outcome.record, Some(existed)))
    }

    async fn analyze_with_retry(&self, uploaded: &UploadedAsset) -> Result<String, ItemFailure> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.retry.delay).await;
            match self.service.analyze(uploaded, self.task.prompt()).await {
                Ok(raw) => {
                    debug!("Raw response text: {}", raw);
                    return Ok(raw);
                }
                Err(e) => {
                    error!("Attempt {} failed: {}", attempt, e);
                    if attempt < attempts {
                        info!("Waiting {:?} before retrying...", self.retry.delay);
                    }
                    last = Some(e);
                }
            }
        }
        warn!("Max retries reached. Aborting analysis.");
        Err(ItemFailure::CallsExhausted {
            attempts,
            last: last.unwrap_or(AnalysisError::EmptyResponse),
        })
    }
}
