//! Repostguard bot - stream ingestion and repost flagging.
//!
//! Wires `repostguard-core` to its external collaborators: a submission
//! stream, an image fetcher, and a notifier. The concrete Reddit
//! implementations live in [`reddit`]; everything else is written against
//! the collaborator traits so tests can drive the pipeline with mocks.

pub mod config;
pub mod fetch;
pub mod notify;
pub mod pipeline;
pub mod reddit;
pub mod stream;

pub use config::Config;
pub use fetch::{HttpMediaFetcher, MediaFetcher};
pub use notify::{Notifier, NotifyError};
pub use pipeline::{IngestionPipeline, ItemOutcome, PipelineConfig, SkipReason};
pub use reddit::{RedditNotifier, RedditStream};
pub use stream::{StreamError, Submission, SubmissionStream};
