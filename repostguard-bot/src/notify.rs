//! Notification collaborator: reply, remove, report.

use async_trait::async_trait;

/// Notification faults. All of them are treated as "skip this item" by the
/// pipeline; a lost notification is the only externally visible failure mode.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Side-effecting calls against the platform hosting the stream.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a comment under the item; returns the new comment's id.
    async fn reply(&self, item_id: &str, text: &str) -> Result<String, NotifyError>;

    /// Remove a comment previously created by [`Notifier::reply`].
    async fn remove(&self, reply_id: &str) -> Result<(), NotifyError>;

    /// File a report against the item.
    async fn report(&self, item_id: &str, reason: &str) -> Result<(), NotifyError>;
}
