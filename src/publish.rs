//! The `CrashPublish` capability: external message-queue collaborator.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::submission::CrashSubmission;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish backend unavailable: {0}")]
    Unavailable(String),
    #[error("publish failed for crash {crash_id}: {reason}")]
    PublishFailed { crash_id: String, reason: String },
}

#[async_trait]
pub trait CrashPublish: Send + Sync {
    async fn publish(&self, submission: &CrashSubmission) -> Result<(), PublishError>;

    async fn check_health(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Reference in-memory implementation: records published crash ids in
/// order of publication.
#[derive(Default)]
pub struct MemoryCrashPublish {
    published: Mutex<Vec<String>>,
}

impl MemoryCrashPublish {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_ids(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    pub fn contains(&self, crash_id: &str) -> bool {
        self.published.lock().unwrap().iter().any(|id| id == crash_id)
    }
}

#[async_trait]
impl CrashPublish for MemoryCrashPublish {
    async fn publish(&self, submission: &CrashSubmission) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(submission.crash_id.clone());
        Ok(())
    }
}

/// Test helper: always fails.
#[derive(Default)]
pub struct AlwaysFailingCrashPublish;

#[async_trait]
impl CrashPublish for AlwaysFailingCrashPublish {
    async fn publish(&self, submission: &CrashSubmission) -> Result<(), PublishError> {
        Err(PublishError::PublishFailed {
            crash_id: submission.crash_id.clone(),
            reason: "publish always fails".to_string(),
        })
    }
}
