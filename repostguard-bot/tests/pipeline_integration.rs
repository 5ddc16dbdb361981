//! End-to-end pipeline tests with mock collaborators and the in-memory store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use image::GrayImage;
use tokio::sync::watch;

use repostguard_core::{extract, Fingerprint, ItemRecord, MemoryStore, RecordStore};

use repostguard_bot::fetch::{FetchError, MediaFetcher};
use repostguard_bot::notify::{Notifier, NotifyError};
use repostguard_bot::pipeline::{IngestionPipeline, PipelineConfig};
use repostguard_bot::stream::{StreamError, Submission, SubmissionStream};

/// Synthesize a 9x8 grayscale PNG whose difference hash is exactly `bits`.
///
/// Each row starts at mid-gray and walks left to right in +-15 steps chosen
/// from the target bit pattern, so the strict neighbor comparisons reproduce
/// the pattern even through resampling.
fn png_for(bits: u64) -> Vec<u8> {
    let mut img = GrayImage::new(9, 8);
    for y in 0..8u32 {
        let mut value: i16 = 120;
        img.put_pixel(0, y, image::Luma([value as u8]));
        for x in 1..9u32 {
            let bit_index = 63 - (y * 8 + (x - 1));
            if bits & (1u64 << bit_index) != 0 {
                value += 15;
            } else {
                value -= 15;
            }
            img.put_pixel(x, y, image::Luma([value as u8]));
        }
    }

    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn submission(id: &str, url: &str) -> Submission {
    Submission {
        id: id.to_string(),
        is_self: false,
        url: url.to_string(),
        thumbnail_url: String::new(),
        created_at: Utc::now() - TimeDelta::hours(5),
        title: format!("title {id}"),
        author: format!("author {id}"),
    }
}

/// Queue-backed stream that raises the shutdown signal once drained, so
/// `run()` terminates deterministically.
struct MockStream {
    queue: VecDeque<Result<Submission, StreamError>>,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl SubmissionStream for MockStream {
    async fn next(&mut self) -> Result<Submission, StreamError> {
        match self.queue.pop_front() {
            Some(next) => next,
            None => {
                let _ = self.shutdown.send(true);
                std::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
        }
    }
}

struct MockFetcher {
    images: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.images
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(reqwest::StatusCode::NOT_FOUND))
    }
}

#[derive(Default)]
struct NotifyLog {
    replies: Vec<(String, String)>,
    removed: Vec<String>,
    reports: Vec<(String, String)>,
}

#[derive(Clone, Default)]
struct MockNotifier {
    log: Arc<Mutex<NotifyLog>>,
    fail_replies: bool,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn reply(&self, item_id: &str, text: &str) -> Result<String, NotifyError> {
        if self.fail_replies {
            return Err(NotifyError::Rejected("mock outage".to_string()));
        }
        let mut log = self.log.lock().unwrap();
        log.replies.push((item_id.to_string(), text.to_string()));
        Ok(format!("t1_mock{}", log.replies.len()))
    }

    async fn remove(&self, reply_id: &str) -> Result<(), NotifyError> {
        self.log.lock().unwrap().removed.push(reply_id.to_string());
        Ok(())
    }

    async fn report(&self, item_id: &str, reason: &str) -> Result<(), NotifyError> {
        self.log
            .lock()
            .unwrap()
            .reports
            .push((item_id.to_string(), reason.to_string()));
        Ok(())
    }
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        backoff: Duration::from_millis(20),
        report_reason: "Possible repost: check comments".to_string(),
    }
}

async fn run_pipeline(
    items: Vec<Result<Submission, StreamError>>,
    images: HashMap<String, Vec<u8>>,
    store: Arc<MemoryStore>,
    notifier: MockNotifier,
) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stream = MockStream {
        queue: items.into(),
        shutdown: shutdown_tx,
    };
    let fetcher = MockFetcher { images };

    IngestionPipeline::new(
        stream,
        fetcher,
        notifier,
        store,
        pipeline_config(),
        shutdown_rx,
    )
    .run()
    .await;
}

const BITS_A: u64 = 0xF0F0_F0F0_F0F0_F0F0;
const BITS_B: u64 = BITS_A ^ 0b111; // Hamming distance 3 from A

#[test]
fn test_png_synthesis_reproduces_exact_fingerprints() {
    for bits in [0u64, u64::MAX, BITS_A, BITS_B, 0xDEAD_BEEF_CAFE_BABE] {
        let decoded = image::load_from_memory(&png_for(bits)).unwrap().to_luma8();
        assert_eq!(extract(&decoded), Some(Fingerprint::from_bits(bits)));
    }
}

#[tokio::test]
async fn test_full_repost_scenario() {
    let store = Arc::new(MemoryStore::new());
    let notifier = MockNotifier::default();
    let images = HashMap::from([
        ("https://i.example/a.png".to_string(), png_for(BITS_A)),
        ("https://i.example/b.png".to_string(), png_for(BITS_B)),
    ]);

    // A first, then B at distance 3, then B again (duplicate delivery)
    let items = vec![
        Ok(submission("A", "https://i.example/a.png")),
        Ok(submission("B", "https://i.example/b.png")),
        Ok(submission("B", "https://i.example/b.png")),
    ];
    run_pipeline(items, images, store.clone(), notifier.clone()).await;

    // Exactly one notification, for B referencing A
    let log = notifier.log.lock().unwrap();
    assert_eq!(log.replies.len(), 1);
    let (replied_to, text) = &log.replies[0];
    assert_eq!(replied_to, "B");
    assert!(text.starts_with("Possible repost of:"));
    assert!(text.contains("title A"));
    assert!(text.contains("author A"));
    assert!(text.contains("5 hours ago"));
    assert!(text.contains("(distance 3)"));
    // Every row links to the matched item so a reader can open it
    assert!(text.contains("https://redd.it/A"));

    // The bot's own comment was hidden and the item reported
    assert_eq!(log.removed, vec!["t1_mock1"]);
    assert_eq!(
        log.reports,
        vec![("B".to_string(), "Possible repost: check comments".to_string())]
    );
    drop(log);

    // Both fingerprints stored once, no duplicate from the re-delivery
    let record_a = store
        .find_exact(Fingerprint::from_bits(BITS_A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record_a.item_ids, vec!["A"]);
    let record_b = store
        .find_exact(Fingerprint::from_bits(BITS_B))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record_b.item_ids, vec!["B"]);

    let item_a = store.get_item("A").await.unwrap().unwrap();
    assert!(!item_a.confirmed_repost);
    let item_b = store.get_item("B").await.unwrap().unwrap();
    assert!(item_b.confirmed_repost);
    assert_eq!(store.item_count(), 2);
}

#[tokio::test]
async fn test_bad_items_are_skipped_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let notifier = MockNotifier::default();
    let images = HashMap::from([
        // Flat image: degenerate fingerprint
        (
            "https://i.example/flat.png".to_string(),
            {
                let img = GrayImage::from_pixel(32, 32, image::Luma([80]));
                let mut buf = std::io::Cursor::new(Vec::new());
                image::DynamicImage::ImageLuma8(img)
                    .write_to(&mut buf, image::ImageFormat::Png)
                    .unwrap();
                buf.into_inner()
            },
        ),
        // Bytes that do not decode
        ("https://i.example/garbage.png".to_string(), vec![1, 2, 3]),
    ]);

    let mut text_post = submission("T", "https://i.example/unused.png");
    text_post.is_self = true;

    let items = vec![
        Ok(text_post),
        Ok(submission("F", "https://i.example/missing.png")), // 404
        Ok(submission("G", "https://i.example/garbage.png")),
        Ok(submission("U", "https://i.example/flat.png")),
    ];
    run_pipeline(items, images, store.clone(), notifier.clone()).await;

    assert_eq!(store.item_count(), 0);
    assert_eq!(store.fingerprint_count(), 0);
    assert!(notifier.log.lock().unwrap().replies.is_empty());
}

#[tokio::test]
async fn test_transient_stream_failure_backs_off_and_resumes() {
    let store = Arc::new(MemoryStore::new());
    let notifier = MockNotifier::default();
    let images = HashMap::from([("https://i.example/a.png".to_string(), png_for(BITS_A))]);

    let items = vec![
        Err(StreamError::Transient("service down".to_string())),
        Err(StreamError::Other("odd payload".to_string())),
        Ok(submission("A", "https://i.example/a.png")),
    ];
    run_pipeline(items, images, store.clone(), notifier.clone()).await;

    // The item after both failures was still consumed and stored
    assert_eq!(store.item_count(), 1);
    assert!(store.get_item("A").await.unwrap().is_some());
}

#[tokio::test]
async fn test_notifier_outage_skips_item_without_partial_writes() {
    let store = Arc::new(MemoryStore::new());

    // Seed an earlier item so B will match
    store
        .upsert_fingerprint(Fingerprint::from_bits(BITS_A), "A")
        .await
        .unwrap();
    store
        .create_item(&ItemRecord {
            id: "A".to_string(),
            author: "author A".to_string(),
            created_at: Utc::now() - TimeDelta::days(2),
            title: "title A".to_string(),
            confirmed_repost: false,
        })
        .await
        .unwrap();

    let notifier = MockNotifier {
        fail_replies: true,
        ..MockNotifier::default()
    };
    let images = HashMap::from([("https://i.example/b.png".to_string(), png_for(BITS_B))]);
    let items = vec![Ok(submission("B", "https://i.example/b.png"))];
    run_pipeline(items, images, store.clone(), notifier.clone()).await;

    // The unexpected fault skipped the item entirely: no B row, no B
    // fingerprint, and the loop still reached shutdown cleanly.
    assert!(store.get_item("B").await.unwrap().is_none());
    assert!(store
        .find_exact(Fingerprint::from_bits(BITS_B))
        .await
        .unwrap()
        .is_none());
}
