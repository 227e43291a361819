use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "No Title";
pub const MAX_TAGS: usize = 5;

/// Channel a link arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    #[default]
    Telegram,
    Cli,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::Telegram => "telegram",
            LinkSource::Cli => "cli",
        }
    }
}

impl fmt::Display for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(LinkSource::Telegram),
            "cli" => Ok(LinkSource::Cli),
            other => Err(format!("unknown link source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub domain: String,
    pub reading_time: u32,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub nested_links: Vec<String>,
    pub is_read: bool,
    pub is_favorite: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub notification_1hr_sent: bool,
    pub notification_now_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source: LinkSource,
}

/// Enriched payload produced by the metadata pipeline, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub domain: String,
    pub reading_time: u32,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub nested_links: Vec<String>,
    pub source: LinkSource,
}

impl NewLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: DEFAULT_TITLE.to_string(),
            summary: String::new(),
            content: None,
            author: None,
            tags: Vec::new(),
            domain: "unknown".to_string(),
            reading_time: 0,
            image_url: None,
            video_url: None,
            nested_links: Vec::new(),
            source: LinkSource::default(),
        }
    }

    pub fn with_source(mut self, source: LinkSource) -> Self {
        self.source = source;
        self
    }
}

/// Which reminder a notification flag guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationFlag {
    HourBefore,
    AtTime,
}

impl NotificationFlag {
    pub fn column(&self) -> &'static str {
        match self {
            NotificationFlag::HourBefore => "notification_1hr_sent",
            NotificationFlag::AtTime => "notification_now_sent",
        }
    }
}

/// User-initiated edits. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct LinkUpdate {
    pub is_read: Option<bool>,
    pub is_favorite: Option<bool>,
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears the schedule.
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

impl LinkUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none()
            && self.is_favorite.is_none()
            && self.tags.is_none()
            && self.scheduled_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkFilter {
    #[default]
    All,
    Unread,
    Favorites,
    Scheduled,
}

impl FromStr for LinkFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(LinkFilter::All),
            "unread" => Ok(LinkFilter::Unread),
            "favorites" | "favorite" => Ok(LinkFilter::Favorites),
            "scheduled" => Ok(LinkFilter::Scheduled),
            other => Err(format!("unknown filter: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStats {
    pub total: i64,
    pub read: i64,
    pub unread: i64,
    pub favorites: i64,
    pub scheduled: i64,
}
