mod repository;
mod schema;

pub use repository::Repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{LinkRecord, NewLink, NotificationFlag};

/// Result of an insert-if-absent.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(LinkRecord),
    Duplicate,
}

/// Storage operations the ingestion path and the scheduler depend on.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn find_by_url(&self, url: &str) -> Result<Option<LinkRecord>>;

    /// Atomic on `url`: a concurrent insert of the same URL yields `Duplicate`.
    async fn insert(&self, link: NewLink) -> Result<InsertOutcome>;

    /// Unread records inside a reminder window at `now` whose flag for
    /// that window is unset, soonest first, at most `max_count`.
    async fn find_pending_scheduled(
        &self,
        now: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<LinkRecord>>;

    async fn set_notification_flag(&self, id: i64, flag: NotificationFlag) -> Result<()>;
}
