//! Reddit collaborators: listing-poll stream and OAuth notifier.
//!
//! The stream polls `/r/<subreddit>/new.json` through the public listing API
//! with a `before` cursor, so position survives a backoff without re-reading
//! the whole page. The first poll only primes the cursor (existing items are
//! never replayed on startup). Listing de-duplication is best effort, which
//! the downstream self-match guard accounts for.
//!
//! The notifier talks to `oauth.reddit.com` with a bearer token:
//! `/api/comment` to post the ranked reply, `/api/remove` to hide the bot's
//! own comment from readers, and `/api/report` to surface the item in the
//! mod queue.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::notify::{Notifier, NotifyError};
use crate::stream::{StreamError, Submission, SubmissionStream};

const PUBLIC_BASE_URL: &str = "https://www.reddit.com";
const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";

/// Check if a reqwest error is transient and worth a backoff-and-retry.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient service condition.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

// ===========================================================================
// Listing stream
// ===========================================================================

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: ListingPost,
}

#[derive(Debug, Deserialize)]
struct ListingPost {
    id: String,
    /// Fullname ("t3_<id>"), the listing cursor token.
    name: String,
    is_self: bool,
    #[serde(default)]
    url: String,
    /// "self", "default", or an actual URL.
    #[serde(default)]
    thumbnail: String,
    created_utc: f64,
    title: String,
    author: String,
}

impl ListingPost {
    fn into_submission(self) -> Submission {
        let created_at =
            DateTime::from_timestamp(self.created_utc as i64, 0).unwrap_or(DateTime::UNIX_EPOCH);
        Submission {
            id: self.id,
            is_self: self.is_self,
            url: self.url,
            thumbnail_url: self.thumbnail,
            created_at,
            title: self.title,
            author: self.author,
        }
    }
}

/// Polls a subreddit's new-submission listing in arrival order.
pub struct RedditStream {
    client: Client,
    base_url: String,
    subreddit: String,
    poll_interval: Duration,
    /// Fullname of the newest item already handed out.
    before: Option<String>,
    primed: bool,
    buffer: VecDeque<Submission>,
}

impl RedditStream {
    pub fn new(
        subreddit: &str,
        user_agent: &str,
        poll_interval: Duration,
    ) -> Result<Self, StreamError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StreamError::Other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: PUBLIC_BASE_URL.to_string(),
            subreddit: subreddit.to_string(),
            poll_interval,
            before: None,
            primed: false,
            buffer: VecDeque::new(),
        })
    }

    /// Point the stream at a different listing host. Test hook.
    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn poll(&mut self) -> Result<(), StreamError> {
        let mut url = format!(
            "{}/r/{}/new.json?limit=100&raw_json=1",
            self.base_url, self.subreddit
        );
        if let Some(before) = &self.before {
            url.push_str("&before=");
            url.push_str(before);
        }

        let response = self.client.get(&url).send().await.map_err(|e| {
            if is_transient_error(&e) {
                StreamError::Transient(format!("listing request failed: {e}"))
            } else {
                StreamError::Other(format!("listing request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let err = format!("listing returned status {status}");
            return Err(if is_transient_status(status) {
                StreamError::Transient(err)
            } else {
                StreamError::Other(err)
            });
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| StreamError::Other(format!("failed to parse listing: {e}")))?;

        // Listings are newest first
        let children = listing.data.children;

        if !self.primed {
            // First poll only establishes the cursor; everything already on
            // the page predates this run.
            self.primed = true;
            if let Some(newest) = children.first() {
                self.before = Some(newest.data.name.clone());
            }
            debug!(
                subreddit = %self.subreddit,
                skipped = children.len(),
                "listing cursor primed"
            );
            return Ok(());
        }

        if let Some(newest) = children.first() {
            self.before = Some(newest.data.name.clone());
        }
        for child in children.into_iter().rev() {
            self.buffer.push_back(child.data.into_submission());
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionStream for RedditStream {
    async fn next(&mut self) -> Result<Submission, StreamError> {
        loop {
            if let Some(submission) = self.buffer.pop_front() {
                return Ok(submission);
            }
            if let Err(e) = self.poll().await {
                // The driver resumes pulling right after a non-transient
                // fault, so pace the next listing request here; a sticky
                // failure must not turn into a request storm. Transient
                // faults wait in the driver's backoff instead.
                if matches!(e, StreamError::Other(_)) {
                    tokio::time::sleep(self.poll_interval).await;
                }
                return Err(e);
            }
            if self.buffer.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

// ===========================================================================
// OAuth notifier
// ===========================================================================

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentJson,
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    data: Option<CommentData>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    things: Vec<CommentThing>,
}

#[derive(Debug, Deserialize)]
struct CommentThing {
    data: CommentThingData,
}

#[derive(Debug, Deserialize)]
struct CommentThingData {
    name: String,
}

/// Bearer-token notifier against the OAuth API.
pub struct RedditNotifier {
    client: Client,
    base_url: String,
    token: String,
}

impl RedditNotifier {
    pub fn new(token: String, user_agent: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: OAUTH_BASE_URL.to_string(),
            token,
        })
    }

    /// Point the notifier at a different API host. Test hook.
    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<reqwest::Response, NotifyError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("{path} returned {status}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl Notifier for RedditNotifier {
    async fn reply(&self, item_id: &str, text: &str) -> Result<String, NotifyError> {
        let thing_id = format!("t3_{item_id}");
        let response = self
            .post_form(
                "/api/comment",
                &[("api_type", "json"), ("thing_id", &thing_id), ("text", text)],
            )
            .await?;

        let parsed: CommentResponse = response.json().await?;
        if !parsed.json.errors.is_empty() {
            warn!(item_id, errors = ?parsed.json.errors, "comment API reported errors");
        }
        parsed
            .json
            .data
            .and_then(|d| d.things.into_iter().next())
            .map(|t| t.data.name)
            .ok_or_else(|| NotifyError::Rejected("comment response carried no id".to_string()))
    }

    async fn remove(&self, reply_id: &str) -> Result<(), NotifyError> {
        self.post_form("/api/remove", &[("id", reply_id), ("spam", "false")])
            .await?;
        Ok(())
    }

    async fn report(&self, item_id: &str, reason: &str) -> Result<(), NotifyError> {
        let thing_id = format!("t3_{item_id}");
        self.post_form(
            "/api/report",
            &[("thing_id", &thing_id), ("reason", reason), ("api_type", "json")],
        )
        .await?;
        Ok(())
    }
}
