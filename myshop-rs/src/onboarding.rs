//! Per-seller onboarding progress behind an injected storage trait.
//!
//! Handlers only see [`OnboardingStore`]. The server wires up
//! [`FileOnboardingStore`], which keeps one JSON document per seller under
//! `<data_dir>/onboarding/`; tests use [`MemoryOnboardingStore`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    StoreProfile,
    FirstProduct,
    Payments,
    Shipping,
    Launch,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 5] = [
        OnboardingStep::StoreProfile,
        OnboardingStep::FirstProduct,
        OnboardingStep::Payments,
        OnboardingStep::Shipping,
        OnboardingStep::Launch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OnboardingStep::StoreProfile => "store_profile",
            OnboardingStep::FirstProduct => "first_product",
            OnboardingStep::Payments => "payments",
            OnboardingStep::Shipping => "shipping",
            OnboardingStep::Launch => "launch",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown onboarding step: {0}")]
pub struct UnknownStep(String);

impl FromStr for OnboardingStep {
    type Err = UnknownStep;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        OnboardingStep::ALL
            .into_iter()
            .find(|step| step.as_str() == raw)
            .ok_or_else(|| UnknownStep(raw.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProgress {
    #[serde(default)]
    pub completed: BTreeSet<OnboardingStep>,
}

impl OnboardingProgress {
    /// Marks `step` done. Returns false if it already was.
    pub fn complete(&mut self, step: OnboardingStep) -> bool {
        self.completed.insert(step)
    }

    pub fn next_step(&self) -> Option<OnboardingStep> {
        OnboardingStep::ALL
            .into_iter()
            .find(|step| !self.completed.contains(step))
    }

    pub fn is_finished(&self) -> bool {
        self.next_step().is_none()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid seller id for storage: {0:?}")]
    InvalidKey(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("corrupt onboarding record {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait OnboardingStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, seller_id: &str) -> Result<OnboardingProgress, StoreError>;

    async fn save(&self, seller_id: &str, progress: &OnboardingProgress) -> Result<(), StoreError>;

    /// Marks `step` done and returns the updated progress. Concurrent calls
    /// for the same seller never lose each other's steps.
    async fn complete(
        &self,
        seller_id: &str,
        step: OnboardingStep,
    ) -> Result<OnboardingProgress, StoreError>;

    async fn clear(&self, seller_id: &str) -> Result<(), StoreError>;
}

/// Seller ids usable as storage keys: non-empty ASCII alphanumerics, `-`, `_`.
pub fn is_storable_key(seller_id: &str) -> bool {
    !seller_id.is_empty()
        && seller_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_key(seller_id: &str) -> Result<(), StoreError> {
    if is_storable_key(seller_id) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(seller_id.to_string()))
    }
}

#[derive(Debug)]
pub struct FileOnboardingStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
    tmp_counter: AtomicU64,
}

impl FileOnboardingStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("onboarding"),
            locks: DashMap::new(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    fn record_path(&self, seller_id: &str) -> Result<PathBuf, StoreError> {
        validate_key(seller_id)?;
        Ok(self.root.join(format!("{seller_id}.json")))
    }

    async fn lock_seller(&self, seller_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .entry(seller_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }

    async fn read_record(&self, path: &Path) -> Result<OnboardingProgress, StoreError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(OnboardingProgress::default());
            }
            Err(err) => return Err(io_error(path)(err)),
        };
        serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    async fn write_record(
        &self,
        path: &Path,
        progress: &OnboardingProgress,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_error(&self.root))?;

        let body = serde_json::to_vec_pretty(progress).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{n}.tmp", std::process::id()));
        tokio::fs::write(&tmp, body).await.map_err(io_error(&tmp))?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(path)(err));
        }
        debug!(path = %path.display(), "onboarding progress saved");
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl OnboardingStore for FileOnboardingStore {
    async fn load(&self, seller_id: &str) -> Result<OnboardingProgress, StoreError> {
        let path = self.record_path(seller_id)?;
        self.read_record(&path).await
    }

    async fn save(&self, seller_id: &str, progress: &OnboardingProgress) -> Result<(), StoreError> {
        let path = self.record_path(seller_id)?;
        let _guard = self.lock_seller(seller_id).await;
        self.write_record(&path, progress).await
    }

    async fn complete(
        &self,
        seller_id: &str,
        step: OnboardingStep,
    ) -> Result<OnboardingProgress, StoreError> {
        let path = self.record_path(seller_id)?;
        let _guard = self.lock_seller(seller_id).await;
        let mut progress = self.read_record(&path).await?;
        if progress.complete(step) {
            self.write_record(&path, &progress).await?;
        }
        Ok(progress)
    }

    async fn clear(&self, seller_id: &str) -> Result<(), StoreError> {
        let path = self.record_path(seller_id)?;
        let _guard = self.lock_seller(seller_id).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path)(err)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryOnboardingStore {
    records: DashMap<String, OnboardingProgress>,
}

impl MemoryOnboardingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OnboardingStore for MemoryOnboardingStore {
    async fn load(&self, seller_id: &str) -> Result<OnboardingProgress, StoreError> {
        validate_key(seller_id)?;
        Ok(self
            .records
            .get(seller_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, seller_id: &str, progress: &OnboardingProgress) -> Result<(), StoreError> {
        validate_key(seller_id)?;
        self.records.insert(seller_id.to_string(), progress.clone());
        Ok(())
    }

    async fn complete(
        &self,
        seller_id: &str,
        step: OnboardingStep,
    ) -> Result<OnboardingProgress, StoreError> {
        validate_key(seller_id)?;
        let mut entry = self.records.entry(seller_id.to_string()).or_default();
        entry.complete(step);
        Ok(entry.value().clone())
    }

    async fn clear(&self, seller_id: &str) -> Result<(), StoreError> {
        validate_key(seller_id)?;
        self.records.remove(seller_id);
        Ok(())
    }
}
