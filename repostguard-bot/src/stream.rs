//! Submission stream collaborator.
//!
//! The stream source owns position tracking and "already seen" bookkeeping,
//! and only promises best-effort de-duplication: the same item can arrive
//! more than once, which is why the matcher carries a self-match guard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One posted item as delivered by the stream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Unique, stable id assigned by the stream source.
    pub id: String,
    /// True for self-contained text posts with no image.
    pub is_self: bool,
    /// The posted link. Only trusted as an image when it carries a
    /// recognized image extension.
    pub url: String,
    /// Source-supplied thumbnail, the fallback when `url` is not a direct
    /// image link.
    pub thumbnail_url: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub author: String,
}

/// Stream faults, split by how the pipeline must react.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream service itself is unavailable; the pipeline backs off and
    /// retries without losing position.
    #[error("stream service unavailable: {0}")]
    Transient(String),

    /// Anything else; logged and ignored, consumption continues.
    #[error("stream failure: {0}")]
    Other(String),
}

/// Yields submissions in arrival order.
#[async_trait]
pub trait SubmissionStream: Send {
    /// Pull the next item, blocking until one arrives. Back-pressure is
    /// implicit: the pipeline never pulls while an item is in flight.
    async fn next(&mut self) -> Result<Submission, StreamError>;
}
