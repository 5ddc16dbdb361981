//! The ingestion state machine.
//!
//! One logical consumer drives everything: pull an item, fingerprint it,
//! match it, notify, persist, repeat. There is no overlap between items and
//! no internal parallelism; back-pressure is the stream pull itself.
//!
//! States:
//!
//! - `Consuming` pulls and processes items one at a time.
//! - `Backoff` is entered when the stream service itself is unavailable; the
//!   pipeline sleeps a fixed interval and resumes. Position is preserved by
//!   the stream collaborator.
//! - `Shutdown` is terminal and only entered on the external stop signal,
//!   which is honored *between* items, never mid-item.
//!
//! Per-item faults never escape the loop: fetch/decode failures, degenerate
//! fingerprints, and text posts skip the item at debug severity, and any
//! unexpected fault skips the item at error severity. Only a transient
//! upstream failure changes state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use repostguard_core::{
    extract, find_matches, ItemRecord, MatchOutcome, RankedMatch, RecordStore,
};

use crate::fetch::{decode_luma, resolve_image_url, MediaFetcher};
use crate::notify::Notifier;
use crate::stream::{StreamError, Submission, SubmissionStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Consuming,
    Backoff,
    Shutdown,
}

/// Why an item was skipped without any state mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TextPost,
    FetchFailed,
    DecodeFailed,
    NoFingerprint,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TextPost => "self-contained text post",
            Self::FetchFailed => "image fetch failed",
            Self::DecodeFailed => "image decode failed",
            Self::NoFingerprint => "image has no exploitable structure",
        };
        f.write_str(s)
    }
}

/// Outcome of fully processing one item, inspected by the driver loop.
#[derive(Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Item fingerprinted and persisted; `matches` near-duplicates reported.
    Stored { matches: usize },
    /// Nothing written, nothing sent.
    Skipped(SkipReason),
    /// The item was already in the store under its own id: a re-delivery.
    /// No notification, no duplicate write.
    SelfMatch,
}

/// A fault inside the per-item step that is not one of the expected skip
/// conditions. Logged with context, item skipped, loop continues.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UnexpectedFault(String);

/// Knobs the driver loop needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fixed wait before leaving `Backoff`.
    pub backoff: Duration,
    /// Reason string attached to reports.
    pub report_reason: String,
}

/// The per-item pipeline plus its driver state machine.
pub struct IngestionPipeline<S, F, N> {
    stream: S,
    fetcher: F,
    notifier: N,
    store: Arc<dyn RecordStore>,
    config: PipelineConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S, F, N> IngestionPipeline<S, F, N>
where
    S: SubmissionStream,
    F: MediaFetcher,
    N: Notifier,
{
    pub fn new(
        stream: S,
        fetcher: F,
        notifier: N,
        store: Arc<dyn RecordStore>,
        config: PipelineConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream,
            fetcher,
            notifier,
            store,
            config,
            shutdown,
        }
    }

    /// Consume until the shutdown signal fires. Never returns early on item
    /// faults; resilience to single bad items is a hard requirement.
    pub async fn run(mut self) {
        let mut state = State::Consuming;
        info!("ingestion pipeline started");

        loop {
            match state {
                State::Shutdown => {
                    info!("ingestion pipeline stopped");
                    return;
                }
                State::Backoff => {
                    warn!(
                        seconds = self.config.backoff.as_secs(),
                        "stream unavailable, backing off"
                    );
                    tokio::time::sleep(self.config.backoff).await;
                    state = State::Consuming;
                }
                State::Consuming => {
                    if *self.shutdown.borrow() {
                        state = State::Shutdown;
                        continue;
                    }

                    // The pull is the only cancellation point; an item in
                    // flight always completes.
                    let pulled = tokio::select! {
                        _ = self.shutdown.changed() => {
                            state = State::Shutdown;
                            continue;
                        }
                        pulled = self.stream.next() => pulled,
                    };

                    match pulled {
                        Ok(submission) => match self.process_item(&submission).await {
                            Ok(ItemOutcome::Stored { matches: 0 }) => {
                                debug!(item_id = %submission.id, "item stored, no matches");
                            }
                            Ok(ItemOutcome::Stored { matches }) => {
                                info!(item_id = %submission.id, matches, "probable repost handled");
                            }
                            Ok(ItemOutcome::Skipped(reason)) => {
                                debug!(item_id = %submission.id, %reason, "item skipped");
                            }
                            Ok(ItemOutcome::SelfMatch) => {
                                debug!(item_id = %submission.id, "re-delivered item ignored");
                            }
                            Err(fault) => {
                                error!(item_id = %submission.id, error = %fault, "unexpected failure, item skipped");
                            }
                        },
                        Err(StreamError::Transient(msg)) => {
                            error!(error = %msg, "stream service unavailable");
                            state = State::Backoff;
                        }
                        Err(StreamError::Other(msg)) => {
                            error!(error = %msg, "stream fault, continuing");
                        }
                    }
                }
            }
        }
    }

    /// Run the full per-item pipeline: classify, fetch, decode, fingerprint,
    /// match, notify, persist.
    #[instrument(level = "debug", skip_all, fields(item_id = %submission.id))]
    pub async fn process_item(
        &self,
        submission: &Submission,
    ) -> Result<ItemOutcome, UnexpectedFault> {
        if submission.is_self {
            return Ok(ItemOutcome::Skipped(SkipReason::TextPost));
        }

        let url = resolve_image_url(submission);
        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(url, error = %e, "image fetch failed");
                return Ok(ItemOutcome::Skipped(SkipReason::FetchFailed));
            }
        };

        let image = match decode_luma(&bytes) {
            Ok(image) => image,
            Err(e) => {
                debug!(url, error = %e, "image decode failed");
                return Ok(ItemOutcome::Skipped(SkipReason::DecodeFailed));
            }
        };

        let Some(fp) = extract(&image) else {
            return Ok(ItemOutcome::Skipped(SkipReason::NoFingerprint));
        };

        let matches = match find_matches(self.store.as_ref(), fp, &submission.id)
            .await
            .map_err(|e| UnexpectedFault(format!("match query failed: {e}")))?
        {
            MatchOutcome::SelfMatch => return Ok(ItemOutcome::SelfMatch),
            MatchOutcome::Matches(matches) => matches,
        };

        if !matches.is_empty() {
            let text = self.render_notification(&matches).await?;
            let reply_id = self
                .notifier
                .reply(&submission.id, &text)
                .await
                .map_err(|e| UnexpectedFault(format!("reply failed: {e}")))?;
            // The comment is for moderators; hide it from regular readers.
            self.notifier
                .remove(&reply_id)
                .await
                .map_err(|e| UnexpectedFault(format!("reply removal failed: {e}")))?;
            self.notifier
                .report(&submission.id, &self.config.report_reason)
                .await
                .map_err(|e| UnexpectedFault(format!("report failed: {e}")))?;
        }

        // Both writes happen even when nothing matched; every fingerprinted
        // item becomes part of the index.
        let item = ItemRecord {
            id: submission.id.clone(),
            author: submission.author.clone(),
            created_at: submission.created_at,
            title: submission.title.clone(),
            confirmed_repost: !matches.is_empty(),
        };
        self.store
            .create_item(&item)
            .await
            .map_err(|e| UnexpectedFault(format!("item insert failed: {e}")))?;
        self.store
            .upsert_fingerprint(fp, &submission.id)
            .await
            .map_err(|e| UnexpectedFault(format!("fingerprint upsert failed: {e}")))?;

        Ok(ItemOutcome::Stored {
            matches: matches.len(),
        })
    }

    /// Render the ranked notification body, one row per match.
    async fn render_notification(
        &self,
        matches: &[RankedMatch],
    ) -> Result<String, UnexpectedFault> {
        let now = Utc::now();
        let mut text = String::from("Possible repost of:\n");

        for (rank, m) in matches.iter().enumerate() {
            let item = self
                .store
                .get_item(&m.item_id)
                .await
                .map_err(|e| UnexpectedFault(format!("item lookup failed: {e}")))?;

            let row = match item {
                Some(item) => {
                    let marker = if item.confirmed_repost {
                        " [previously reported]"
                    } else {
                        ""
                    };
                    format!(
                        "\n{}. \"{}\" by {}, {} ago (distance {}): https://redd.it/{}{}",
                        rank + 1,
                        item.title,
                        item.author,
                        format_age(now, item.created_at),
                        m.distance,
                        m.item_id,
                        marker,
                    )
                }
                // Fingerprint rows can predate item metadata in migrated
                // databases; the link still lets a reader open the item.
                None => format!(
                    "\n{}. https://redd.it/{} (distance {})",
                    rank + 1,
                    m.item_id,
                    m.distance
                ),
            };
            text.push_str(&row);
        }

        Ok(text)
    }
}

/// Age since creation: whole days when at least one day old, else whole
/// hours. Truncating, never rounding.
fn format_age(now: DateTime<Utc>, created_at: DateTime<Utc>) -> String {
    fn count(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    }

    let secs = (now - created_at).num_seconds().max(0);
    let days = secs / 86_400;
    if days >= 1 {
        count(days, "day")
    } else {
        count(secs / 3_600, "hour")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_format_age_hours_below_one_day() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "0 hours");
        assert_eq!(format_age(now, now - TimeDelta::minutes(59)), "0 hours");
        assert_eq!(format_age(now, now - TimeDelta::hours(1)), "1 hour");
        assert_eq!(format_age(now, now - TimeDelta::hours(5)), "5 hours");
        assert_eq!(format_age(now, now - TimeDelta::hours(23)), "23 hours");
    }

    #[test]
    fn test_format_age_days_truncate_and_singularize() {
        let now = Utc::now();
        assert_eq!(format_age(now, now - TimeDelta::hours(24)), "1 day");
        assert_eq!(format_age(now, now - TimeDelta::hours(47)), "1 day");
        assert_eq!(format_age(now, now - TimeDelta::days(2)), "2 days");
        assert_eq!(format_age(now, now - TimeDelta::days(365)), "365 days");
    }

    #[test]
    fn test_format_age_future_timestamp_clamped() {
        let now = Utc::now();
        assert_eq!(format_age(now, now + TimeDelta::hours(3)), "0 hours");
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::NoFingerprint.to_string(),
            "image has no exploitable structure"
        );
    }
}
