//! Reading reminders.
//!
//! A single loop wakes every poll interval, looks at scheduled unread links
//! and sends at most one message per reminder window:
//!
//! ```text
//! minutes until scheduled_at:  65 ... 55        2 ... -2
//!                              [ hour-before ]  [ at-time ]
//! ```
//!
//! A window's flag is only set after the channel accepts the message, so a
//! failed send is retried on the next tick for as long as the window lasts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db::LinkStore;
use crate::error::Result;
use crate::models::{LinkRecord, NotificationFlag};
use crate::services::NotificationChannel;

/// Inclusive bounds, in minutes before `scheduled_at`.
pub const HOUR_BEFORE_WINDOW: (i64, i64) = (55, 65);
pub const AT_TIME_WINDOW: (i64, i64) = (-2, 2);

const TITLE_CHARS: usize = 50;

/// Minutes from `now` until `scheduled_at`; negative once it has passed.
pub fn minutes_until(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (scheduled_at - now).num_milliseconds() as f64 / 60_000.0
}

/// The reminder due for a record at this instant, if any.
pub fn due_reminder(
    minutes_until: f64,
    hour_sent: bool,
    now_sent: bool,
) -> Option<NotificationFlag> {
    let within = |(low, high): (i64, i64)| (low as f64..=high as f64).contains(&minutes_until);

    if within(HOUR_BEFORE_WINDOW) && !hour_sent {
        Some(NotificationFlag::HourBefore)
    } else if within(AT_TIME_WINDOW) && !now_sent {
        Some(NotificationFlag::AtTime)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub candidates: usize,
    pub dispatched: usize,
    pub failed: usize,
}

pub struct NotificationScheduler {
    store: Arc<dyn LinkStore>,
    channel: Arc<dyn NotificationChannel>,
    chat_id: String,
    poll_interval: Duration,
    max_candidates: usize,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn LinkStore>,
        channel: Arc<dyn NotificationChannel>,
        chat_id: String,
        poll_interval: Duration,
        max_candidates: usize,
    ) -> Self {
        Self {
            store,
            channel,
            chat_id,
            poll_interval,
            max_candidates,
        }
    }

    /// Runs until the task is dropped. Tick errors are logged and the loop
    /// sleeps the full interval regardless of how long the tick took.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.poll_interval.as_secs(),
            "Notification loop started"
        );

        loop {
            match self.tick(Utc::now()).await {
                Ok(report) => tracing::debug!(
                    candidates = report.candidates,
                    dispatched = report.dispatched,
                    failed = report.failed,
                    "Reminder check complete"
                ),
                Err(e) => tracing::error!("Error checking scheduled readings: {}", e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let links = self
            .store
            .find_pending_scheduled(now, self.max_candidates)
            .await?;

        let mut report = TickReport {
            candidates: links.len(),
            ..Default::default()
        };
        if links.len() == self.max_candidates {
            tracing::warn!(
                cap = self.max_candidates,
                "Candidate cap reached; later schedules wait for the next tick"
            );
        }

        for link in &links {
            let Some(scheduled_at) = link.scheduled_at else {
                continue;
            };
            let minutes = minutes_until(scheduled_at, now);
            tracing::debug!(
                link_id = link.id,
                minutes_until = minutes,
                hour_sent = link.notification_1hr_sent,
                now_sent = link.notification_now_sent,
                "Evaluating scheduled reading"
            );

            let Some(reminder) = due_reminder(
                minutes,
                link.notification_1hr_sent,
                link.notification_now_sent,
            ) else {
                continue;
            };

            let message = reminder_message(reminder, link, scheduled_at);
            if let Err(e) = self.channel.send(&self.chat_id, &message).await {
                // Flag stays unset; retried next tick while the window lasts.
                tracing::warn!(link_id = link.id, ?reminder, error = %e, "Failed to send reminder");
                report.failed += 1;
                continue;
            }

            if let Err(e) = self.store.set_notification_flag(link.id, reminder).await {
                // Delivered but unrecorded; the next tick repeats it.
                tracing::error!(link_id = link.id, ?reminder, error = %e, "Failed to record reminder");
                report.failed += 1;
                continue;
            }
            tracing::info!(link_id = link.id, ?reminder, url = %link.url, "Reminder sent");
            report.dispatched += 1;
        }

        Ok(report)
    }
}

fn reminder_message(
    reminder: NotificationFlag,
    link: &LinkRecord,
    scheduled_at: DateTime<Utc>,
) -> String {
    let title = escape_html(&truncate_chars(&link.title, TITLE_CHARS));
    let url = escape_html(&link.url);

    match reminder {
        NotificationFlag::HourBefore => format!(
            "⏰ <b>Upcoming Reading Reminder!</b>\n\n\
             🔖 <b>{title}</b>\n\n\
             📅 Scheduled in: <b>1 hour</b>\n\
             ⏱️ Reading time: ~{} min\n\n\
             🔗 {url}\n\n\
             <i>Get ready! 📚</i>",
            link.reading_time
        ),
        NotificationFlag::AtTime => format!(
            "🚨 <b>Time to Read NOW!</b>\n\n\
             🔖 <b>{title}</b>\n\n\
             ⏰ Scheduled: <b>{} UTC</b>\n\
             ⏱️ Reading time: ~{} min\n\n\
             🔗 {url}\n\n\
             <i>Start reading now! 📖</i>",
            scheduled_at.format("%I:%M %p"),
            link.reading_time
        ),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
