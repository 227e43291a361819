use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    LinkFilter, LinkRecord, LinkSource, LinkStats, LinkUpdate, NewLink, NotificationFlag, MAX_TAGS,
};
use crate::scheduler::{AT_TIME_WINDOW, HOUR_BEFORE_WINDOW};

use super::schema::SCHEMA;
use super::{InsertOutcome, LinkStore};

const LINK_COLUMNS: &str = "id, url, title, summary, content, author, tags, domain, reading_time, \
     image_url, video_url, nested_links, is_read, is_favorite, scheduled_at, \
     notification_1hr_sent, notification_now_sent, source, created_at, updated_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Link operations

    pub async fn get_link(&self, url: &str) -> Result<Option<LinkRecord>> {
        let url = url.to_string();
        let link = self
            .conn
            .call(move |conn| {
                let link = conn
                    .query_row(
                        &format!("SELECT {} FROM links WHERE url = ?1", LINK_COLUMNS),
                        params![url],
                        link_from_row,
                    )
                    .optional()?;
                Ok(link)
            })
            .await?;
        Ok(link)
    }

    pub async fn insert_link(&self, link: NewLink) -> Result<Option<LinkRecord>> {
        let tags_json = serde_json::to_string(&link.tags)?;
        let nested_json = serde_json::to_string(&link.nested_links)?;
        let now = format_timestamp(Utc::now());

        let record = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO links (url, title, summary, content, author, tags, domain, reading_time,
                                          image_url, video_url, nested_links, source, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                       ON CONFLICT(url) DO NOTHING"#,
                    params![
                        link.url,
                        link.title,
                        link.summary,
                        link.content,
                        link.author,
                        tags_json,
                        link.domain,
                        link.reading_time,
                        link.image_url,
                        link.video_url,
                        nested_json,
                        link.source.as_str(),
                        now,
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }

                let id = conn.last_insert_rowid();
                let record = conn.query_row(
                    &format!("SELECT {} FROM links WHERE id = ?1", LINK_COLUMNS),
                    params![id],
                    link_from_row,
                )?;
                Ok(Some(record))
            })
            .await?;
        Ok(record)
    }

    /// Newest first.
    pub async fn list_links(
        &self,
        filter: LinkFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LinkRecord>> {
        let condition = match filter {
            LinkFilter::All => "1 = 1",
            LinkFilter::Unread => "is_read = 0",
            LinkFilter::Favorites => "is_favorite = 1",
            LinkFilter::Scheduled => "scheduled_at IS NOT NULL",
        };
        let sql = format!(
            "SELECT {} FROM links WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            LINK_COLUMNS, condition
        );

        let links = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let links = stmt
                    .query_map(params![limit as i64, offset as i64], link_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(links)
            })
            .await?;
        Ok(links)
    }

    /// Applies a user edit. Moving `scheduled_at` re-arms both reminders;
    /// leaving it unchanged keeps the flags as they are.
    pub async fn update_link(&self, url: &str, update: LinkUpdate) -> Result<Option<LinkRecord>> {
        if update.is_empty() {
            return self.get_link(url).await;
        }

        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(is_read) = update.is_read {
            values.push(Value::Integer(is_read as i64));
            assignments.push(format!("is_read = ?{}", values.len()));
        }
        if let Some(is_favorite) = update.is_favorite {
            values.push(Value::Integer(is_favorite as i64));
            assignments.push(format!("is_favorite = ?{}", values.len()));
        }
        if let Some(mut tags) = update.tags {
            tags.truncate(MAX_TAGS);
            values.push(Value::Text(serde_json::to_string(&tags)?));
            assignments.push(format!("tags = ?{}", values.len()));
        }
        if let Some(scheduled_at) = update.scheduled_at {
            values.push(match scheduled_at {
                Some(dt) => Value::Text(format_timestamp(dt)),
                None => Value::Null,
            });
            let n = values.len();
            // SET expressions see the pre-update row
            assignments.push(format!("scheduled_at = ?{n}"));
            assignments.push(format!(
                "notification_1hr_sent = CASE WHEN scheduled_at IS ?{n} THEN notification_1hr_sent ELSE 0 END"
            ));
            assignments.push(format!(
                "notification_now_sent = CASE WHEN scheduled_at IS ?{n} THEN notification_now_sent ELSE 0 END"
            ));
        }

        values.push(Value::Text(format_timestamp(Utc::now())));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(Value::Text(url.to_string()));
        let sql = format!(
            "UPDATE links SET {} WHERE url = ?{}",
            assignments.join(", "),
            values.len()
        );
        let url = url.to_string();

        let record = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
                if changed == 0 {
                    return Ok(None);
                }
                let record = conn.query_row(
                    &format!("SELECT {} FROM links WHERE url = ?1", LINK_COLUMNS),
                    params![url],
                    link_from_row,
                )?;
                Ok(Some(record))
            })
            .await?;
        Ok(record)
    }

    pub async fn delete_link(&self, url: &str) -> Result<bool> {
        let url = url.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM links WHERE url = ?1", params![url])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Distinct tags across the library, sorted.
    pub async fn all_tags(&self) -> Result<Vec<String>> {
        let encoded = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT tags FROM links")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut tags = BTreeSet::new();
        for json in encoded {
            let decoded: Vec<String> = serde_json::from_str(&json)?;
            tags.extend(decoded);
        }
        Ok(tags.into_iter().collect())
    }

    pub async fn stats(&self) -> Result<LinkStats> {
        let stats = self
            .conn
            .call(|conn| {
                let stats = conn.query_row(
                    r#"SELECT COUNT(*),
                              COALESCE(SUM(is_read), 0),
                              COALESCE(SUM(is_favorite), 0),
                              COALESCE(SUM(scheduled_at IS NOT NULL), 0)
                       FROM links"#,
                    [],
                    |row| {
                        let total: i64 = row.get(0)?;
                        let read: i64 = row.get(1)?;
                        Ok(LinkStats {
                            total,
                            read,
                            unread: total - read,
                            favorites: row.get(2)?,
                            scheduled: row.get(3)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}

#[async_trait]
impl LinkStore for Repository {
    async fn find_by_url(&self, url: &str) -> Result<Option<LinkRecord>> {
        self.get_link(url).await
    }

    async fn insert(&self, link: NewLink) -> Result<InsertOutcome> {
        Ok(match self.insert_link(link).await? {
            Some(record) => InsertOutcome::Inserted(record),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn find_pending_scheduled(
        &self,
        now: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<LinkRecord>> {
        // Only records inside a window with its flag unset, so records that
        // are not due yet never take up the per-tick cap.
        let offset = |minutes: i64| format_timestamp(now + chrono::Duration::minutes(minutes));
        let (hour_from, hour_to) = (offset(HOUR_BEFORE_WINDOW.0), offset(HOUR_BEFORE_WINDOW.1));
        let (at_from, at_to) = (offset(AT_TIME_WINDOW.0), offset(AT_TIME_WINDOW.1));
        let sql = format!(
            r#"SELECT {} FROM links
               WHERE scheduled_at IS NOT NULL
                 AND is_read = 0
                 AND ((notification_1hr_sent = 0 AND scheduled_at BETWEEN ?1 AND ?2)
                   OR (notification_now_sent = 0 AND scheduled_at BETWEEN ?3 AND ?4))
               ORDER BY scheduled_at ASC
               LIMIT ?5"#,
            LINK_COLUMNS
        );

        let links = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let links = stmt
                    .query_map(
                        params![hour_from, hour_to, at_from, at_to, max_count as i64],
                        link_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(links)
            })
            .await?;
        Ok(links)
    }

    async fn set_notification_flag(&self, id: i64, flag: NotificationFlag) -> Result<()> {
        let sql = format!(
            "UPDATE links SET {} = 1, updated_at = ?1 WHERE id = ?2",
            flag.column()
        );
        let now = format_timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![now, id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Fixed-width UTC form, so lexical order in SQL equals time order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn json_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn link_from_row(row: &Row) -> rusqlite::Result<LinkRecord> {
    Ok(LinkRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        content: row.get(4)?,
        author: row.get(5)?,
        tags: json_list(row, 6)?,
        domain: row.get(7)?,
        reading_time: row.get(8)?,
        image_url: row.get(9)?,
        video_url: row.get(10)?,
        nested_links: json_list(row, 11)?,
        is_read: row.get::<_, i64>(12)? != 0,
        is_favorite: row.get::<_, i64>(13)? != 0,
        scheduled_at: row
            .get::<_, Option<String>>(14)?
            .and_then(|s| parse_datetime(&s)),
        notification_1hr_sent: row.get::<_, i64>(15)? != 0,
        notification_now_sent: row.get::<_, i64>(16)? != 0,
        source: row
            .get::<_, String>(17)?
            .parse()
            .unwrap_or_default(),
        created_at: row
            .get::<_, String>(18)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(19)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn open_repo() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (dir, repo)
    }

    fn link(url: &str) -> NewLink {
        let mut link = NewLink::new(url);
        link.title = format!("Title of {}", url);
        link.tags = vec!["Code".to_string(), "Development".to_string()];
        link.nested_links = vec!["https://example.org/ref".to_string()];
        link.reading_time = 3;
        link
    }

    async fn schedule(repo: &Repository, url: &str, at: DateTime<Utc>) -> LinkRecord {
        repo.update_link(
            url,
            LinkUpdate {
                scheduled_at: Some(Some(at)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap()
    }

    #[tokio::test]
    async fn insert_round_trips_fields_and_rejects_duplicates() {
        let (_dir, repo) = open_repo().await;

        let first = repo.insert(link("https://github.com/a")).await.unwrap();
        let record = match first {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::Duplicate => panic!("first insert reported duplicate"),
        };
        assert_eq!(record.url, "https://github.com/a");
        assert_eq!(record.tags, vec!["Code", "Development"]);
        assert_eq!(record.nested_links, vec!["https://example.org/ref"]);
        assert_eq!(record.reading_time, 3);
        assert_eq!(record.source, LinkSource::Telegram);
        assert!(!record.is_read && !record.is_favorite);
        assert!(record.scheduled_at.is_none());

        let second = repo.insert(link("https://github.com/a")).await.unwrap();
        assert!(matches!(second, InsertOutcome::Duplicate));
        assert_eq!(repo.stats().await.unwrap().total, 1);

        let found = repo.find_by_url("https://github.com/a").await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));
        assert!(repo.find_by_url("https://github.com/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_scan_returns_only_due_reminders() {
        let (_dir, repo) = open_repo().await;
        let now = Utc::now();

        for url in [
            "https://a.test",
            "https://b.test",
            "https://c.test",
            "https://d.test",
            "https://e.test",
            "https://f.test",
            "https://g.test",
            "https://h.test",
        ] {
            repo.insert_link(link(url)).await.unwrap();
        }
        schedule(&repo, "https://a.test", now + Duration::minutes(60)).await;
        schedule(&repo, "https://b.test", now + Duration::minutes(1)).await;
        let read = schedule(&repo, "https://c.test", now + Duration::minutes(5)).await;
        repo.update_link(&read.url, LinkUpdate { is_read: Some(true), ..Default::default() })
            .await
            .unwrap();
        schedule(&repo, "https://d.test", now - Duration::minutes(30)).await;
        let done = schedule(&repo, "https://e.test", now + Duration::minutes(2)).await;
        repo.set_notification_flag(done.id, NotificationFlag::AtTime)
            .await
            .unwrap();
        // f.test stays unscheduled
        schedule(&repo, "https://g.test", now + Duration::minutes(30)).await;
        let hour_done = schedule(&repo, "https://h.test", now + Duration::minutes(58)).await;
        repo.set_notification_flag(hour_done.id, NotificationFlag::HourBefore)
            .await
            .unwrap();

        let pending = repo.find_pending_scheduled(now, 100).await.unwrap();
        let urls: Vec<_> = pending.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://b.test", "https://a.test"]);

        let capped = repo.find_pending_scheduled(now, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].url, "https://b.test");
    }

    #[tokio::test]
    async fn rescheduling_rearms_flags_but_same_time_does_not() {
        let (_dir, repo) = open_repo().await;
        let at = Utc::now() + Duration::minutes(60);
        repo.insert_link(link("https://a.test")).await.unwrap();
        let record = schedule(&repo, "https://a.test", at).await;

        repo.set_notification_flag(record.id, NotificationFlag::HourBefore)
            .await
            .unwrap();

        let same = schedule(&repo, "https://a.test", at).await;
        assert!(same.notification_1hr_sent);

        let moved = schedule(&repo, "https://a.test", at + Duration::hours(2)).await;
        assert!(!moved.notification_1hr_sent);
        assert!(!moved.notification_now_sent);

        let cleared = repo
            .update_link(
                "https://a.test",
                LinkUpdate {
                    scheduled_at: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.scheduled_at.is_none());
    }

    #[tokio::test]
    async fn user_actions_update_tags_stats_and_delete() {
        let (_dir, repo) = open_repo().await;
        repo.insert_link(link("https://a.test")).await.unwrap();
        repo.insert_link(link("https://b.test")).await.unwrap();

        let updated = repo
            .update_link(
                "https://a.test",
                LinkUpdate {
                    is_favorite: Some(true),
                    is_read: Some(true),
                    tags: Some((1..=7).map(|n| format!("t{n}")).collect()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.tags.len(), MAX_TAGS);
        assert!(updated.is_favorite && updated.is_read);

        let stats = repo.stats().await.unwrap();
        assert_eq!(
            stats,
            LinkStats {
                total: 2,
                read: 1,
                unread: 1,
                favorites: 1,
                scheduled: 0
            }
        );

        let unread = repo.list_links(LinkFilter::Unread, 50, 0).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].url, "https://b.test");

        let tags = repo.all_tags().await.unwrap();
        assert!(tags.contains(&"t1".to_string()));
        assert!(tags.contains(&"Code".to_string()));

        assert!(repo.delete_link("https://a.test").await.unwrap());
        assert!(!repo.delete_link("https://a.test").await.unwrap());
        assert!(repo
            .update_link("https://a.test", LinkUpdate { is_read: Some(false), ..Default::default() })
            .await
            .unwrap()
            .is_none());
    }
}
