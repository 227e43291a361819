use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;

use crate::db::{InsertOutcome, LinkStore};
use crate::extract::{extract_urls, process_url};
use crate::models::{LinkRecord, LinkSource};
use crate::services::PageFetcher;

const MAX_CONCURRENT_URLS: usize = 4;

/// What happened to one URL of an inbound message.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    SkippedDuplicate { url: String },
    Inserted(Box<LinkRecord>),
    Error { url: String, reason: String },
}

impl IngestOutcome {
    pub fn url(&self) -> &str {
        match self {
            IngestOutcome::SkippedDuplicate { url } | IngestOutcome::Error { url, .. } => url,
            IngestOutcome::Inserted(record) => &record.url,
        }
    }
}

/// Turns chat messages into stored, enriched links.
pub struct Ingestor {
    store: Arc<dyn LinkStore>,
    fetcher: Arc<dyn PageFetcher>,
    fetch_timeout: Duration,
}

impl Ingestor {
    pub fn new(store: Arc<dyn LinkStore>, fetcher: Arc<dyn PageFetcher>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            fetcher,
            fetch_timeout,
        }
    }

    /// One outcome per distinct URL, in the order the URLs appear. A failure
    /// on one URL does not affect the others.
    pub async fn ingest_message(&self, text: &str, source: LinkSource) -> Vec<IngestOutcome> {
        let urls = extract_urls(text);
        if urls.is_empty() {
            tracing::debug!("No URLs found in message");
            return Vec::new();
        }

        stream::iter(urls)
            .map(|url| self.ingest_url(url, source))
            .buffered(MAX_CONCURRENT_URLS)
            .collect()
            .await
    }

    /// Ingests `text` on its own task so the caller can keep receiving
    /// messages while pages are fetched.
    pub fn spawn_message(
        self: &Arc<Self>,
        text: String,
        source: LinkSource,
    ) -> JoinHandle<Vec<IngestOutcome>> {
        let ingestor = Arc::clone(self);
        tokio::spawn(async move {
            let outcomes = ingestor.ingest_message(&text, source).await;
            for outcome in &outcomes {
                if let IngestOutcome::Error { reason, .. } = outcome {
                    tracing::warn!(url = %outcome.url(), reason = %reason, "Link not stored");
                }
            }
            outcomes
        })
    }

    async fn ingest_url(&self, url: String, source: LinkSource) -> IngestOutcome {
        // Cheap early exit; the insert below is what actually guarantees uniqueness.
        match self.store.find_by_url(&url).await {
            Ok(Some(_)) => {
                tracing::info!(url = %url, "URL already in library");
                return IngestOutcome::SkippedDuplicate { url };
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Lookup failed");
                return IngestOutcome::Error {
                    url,
                    reason: e.to_string(),
                };
            }
        }

        tracing::info!(url = %url, "Extracting metadata");
        let link = process_url(self.fetcher.as_ref(), &url, self.fetch_timeout)
            .await
            .with_source(source);

        match self.store.insert(link).await {
            Ok(InsertOutcome::Inserted(record)) => {
                tracing::info!(
                    url = %url,
                    title = %record.title,
                    nested_links = record.nested_links.len(),
                    "Saved link"
                );
                IngestOutcome::Inserted(Box::new(record))
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::info!(url = %url, "URL stored concurrently; skipping");
                IngestOutcome::SkippedDuplicate { url }
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to store link");
                IngestOutcome::Error {
                    url,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    use crate::db::Repository;
    use crate::error::{AppError, Result};
    use crate::models::{NewLink, NotificationFlag};

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("offline") {
                return None;
            }
            Some(format!(
                "<html><head><title>Page {url}</title></head><body><p>Some readable text.</p></body></html>"
            ))
        }
    }

    /// Holds every fetch until `Barrier` has seen all expected callers.
    struct GatedFetcher(Barrier);

    #[async_trait]
    impl PageFetcher for GatedFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Option<String> {
            self.0.wait().await;
            Some(format!("<html><body><p>Gated page {url}</p></body></html>"))
        }
    }

    /// Fails every insert of a URL containing "broken".
    struct FlakyStore(Repository);

    #[async_trait]
    impl LinkStore for FlakyStore {
        async fn find_by_url(&self, url: &str) -> Result<Option<LinkRecord>> {
            self.0.find_by_url(url).await
        }

        async fn insert(&self, link: NewLink) -> Result<InsertOutcome> {
            if link.url.contains("broken") {
                return Err(AppError::Other(anyhow::anyhow!("store unavailable")));
            }
            self.0.insert(link).await
        }

        async fn find_pending_scheduled(
            &self,
            now: DateTime<Utc>,
            max_count: usize,
        ) -> Result<Vec<LinkRecord>> {
            self.0.find_pending_scheduled(now, max_count).await
        }

        async fn set_notification_flag(&self, id: i64, flag: NotificationFlag) -> Result<()> {
            self.0.set_notification_flag(id, flag).await
        }
    }

    async fn open_repo() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn repeated_url_in_one_message_is_stored_once() {
        let (_dir, repo) = open_repo().await;
        let repo = Arc::new(repo);
        let fetcher = Arc::new(CountingFetcher::default());
        let ingestor = Ingestor::new(repo.clone(), fetcher.clone(), Duration::from_secs(1));

        let outcomes = ingestor
            .ingest_message(
                "Check this: https://example.com/a and https://example.com/a again",
                LinkSource::Telegram,
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], IngestOutcome::Inserted(r) if r.url == "https://example.com/a"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn second_message_reports_duplicate_without_fetching() {
        let (_dir, repo) = open_repo().await;
        let repo = Arc::new(repo);
        let fetcher = Arc::new(CountingFetcher::default());
        let ingestor = Ingestor::new(repo.clone(), fetcher.clone(), Duration::from_secs(1));

        ingestor
            .ingest_message("https://example.com/a", LinkSource::Telegram)
            .await;
        let outcomes = ingestor
            .ingest_message("again: https://example.com/a.", LinkSource::Cli)
            .await;

        assert!(matches!(
            &outcomes[..],
            [IngestOutcome::SkippedDuplicate { url }] if url == "https://example.com/a"
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn concurrent_messages_race_to_a_single_record() {
        let (_dir, repo) = open_repo().await;
        let repo = Arc::new(repo);
        let ingestor = Arc::new(Ingestor::new(
            repo.clone(),
            Arc::new(CountingFetcher::default()),
            Duration::from_secs(1),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ingestor = ingestor.clone();
                tokio::spawn(async move {
                    ingestor
                        .ingest_message("https://example.com/race", LinkSource::Telegram)
                        .await
                })
            })
            .collect();

        let mut inserted = 0;
        let mut skipped = 0;
        for handle in handles {
            for outcome in handle.await.unwrap() {
                match outcome {
                    IngestOutcome::Inserted(_) => inserted += 1,
                    IngestOutcome::SkippedDuplicate { .. } => skipped += 1,
                    IngestOutcome::Error { reason, .. } => panic!("unexpected error: {reason}"),
                }
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(skipped, 3);
        assert_eq!(repo.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn store_failure_is_isolated_to_its_url() {
        let (_dir, repo) = open_repo().await;
        let store = Arc::new(FlakyStore(repo));
        let ingestor = Ingestor::new(
            store.clone(),
            Arc::new(CountingFetcher::default()),
            Duration::from_secs(1),
        );

        let outcomes = ingestor
            .ingest_message(
                "https://a.test/1 https://broken.test/2 https://offline.test/3",
                LinkSource::Telegram,
            )
            .await;

        let urls: Vec<_> = outcomes.iter().map(IngestOutcome::url).collect();
        assert_eq!(urls, vec!["https://a.test/1", "https://broken.test/2", "https://offline.test/3"]);
        assert!(matches!(outcomes[0], IngestOutcome::Inserted(_)));
        assert!(matches!(outcomes[1], IngestOutcome::Error { .. }));
        match &outcomes[2] {
            IngestOutcome::Inserted(record) => {
                assert_eq!(record.tags, vec!["Error"]);
                assert_eq!(record.content, None);
                assert_eq!(record.reading_time, 0);
            }
            other => panic!("expected placeholder record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn message_without_urls_has_no_outcomes() {
        let (_dir, repo) = open_repo().await;
        let ingestor = Ingestor::new(
            Arc::new(repo),
            Arc::new(CountingFetcher::default()),
            Duration::from_secs(1),
        );
        assert!(ingestor
            .ingest_message("just chatting", LinkSource::Telegram)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn spawned_messages_are_ingested_concurrently() {
        let (_dir, repo) = open_repo().await;
        let repo = Arc::new(repo);
        let ingestor = Arc::new(Ingestor::new(
            repo.clone(),
            Arc::new(GatedFetcher(Barrier::new(2))),
            Duration::from_secs(1),
        ));

        // Each fetch waits for the other, so this only finishes if both
        // messages are in flight at once.
        let first = ingestor.spawn_message("https://one.test".to_string(), LinkSource::Telegram);
        let second = ingestor.spawn_message("https://two.test".to_string(), LinkSource::Telegram);
        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .expect("messages were ingested one after another");

        assert!(matches!(&first[..], [IngestOutcome::Inserted(_)]));
        assert!(matches!(&second[..], [IngestOutcome::Inserted(_)]));
        assert_eq!(repo.stats().await.unwrap().total, 2);
    }
}
