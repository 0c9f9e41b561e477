//! The `CrashStorage` capability: external object-store collaborator.
//! The core only sees this trait; concrete backends (S3, GCS, ...)
//! live outside this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::submission::CrashSubmission;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage write failed for crash {crash_id}: {reason}")]
    WriteFailed { crash_id: String, reason: String },
}

#[async_trait]
pub trait CrashStorage: Send + Sync {
    async fn save(&self, submission: &CrashSubmission) -> Result<(), StorageError>;

    /// Optional health check; default is a no-op success.
    async fn check_health(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Reference in-memory implementation, useful for tests and for
/// running the collector standalone without an object store.
#[derive(Default)]
pub struct MemoryCrashStorage {
    saved: Mutex<HashMap<String, CrashSubmission>>,
}

impl MemoryCrashStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, crash_id: &str) -> bool {
        self.saved.lock().unwrap().contains_key(crash_id)
    }

    pub fn len(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CrashStorage for MemoryCrashStorage {
    async fn save(&self, submission: &CrashSubmission) -> Result<(), StorageError> {
        self.saved
            .lock()
            .unwrap()
            .insert(submission.crash_id.clone(), submission.clone());
        Ok(())
    }
}

/// Test helper: a storage backend that fails the first `fail_times`
/// calls for a given crash id, then succeeds forever after.
pub struct FlakyCrashStorage {
    inner: MemoryCrashStorage,
    fail_times: usize,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FlakyCrashStorage {
    pub fn new(fail_times: usize) -> Self {
        FlakyCrashStorage {
            inner: MemoryCrashStorage::new(),
            fail_times,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, crash_id: &str) -> bool {
        self.inner.contains(crash_id)
    }

    pub fn attempts_for(&self, crash_id: &str) -> usize {
        *self.attempts.lock().unwrap().get(crash_id).unwrap_or(&0)
    }
}

#[async_trait]
impl CrashStorage for FlakyCrashStorage {
    async fn save(&self, submission: &CrashSubmission) -> Result<(), StorageError> {
        let should_fail = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(submission.crash_id.clone()).or_insert(0);
            *count += 1;
            *count <= self.fail_times
        };
        if should_fail {
            return Err(StorageError::WriteFailed {
                crash_id: submission.crash_id.clone(),
                reason: "simulated transient failure".to_string(),
            });
        }
        self.inner.save(submission).await
    }
}

/// Test helper: always fails.
#[derive(Default)]
pub struct AlwaysFailingCrashStorage;

#[async_trait]
impl CrashStorage for AlwaysFailingCrashStorage {
    async fn save(&self, submission: &CrashSubmission) -> Result<(), StorageError> {
        Err(StorageError::WriteFailed {
            crash_id: submission.crash_id.clone(),
            reason: "storage always fails".to_string(),
        })
    }
}
