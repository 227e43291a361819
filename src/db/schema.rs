pub const SCHEMA: &str = r#"
-- links table
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT 'No Title',
    summary TEXT NOT NULL DEFAULT '',
    content TEXT,
    author TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    domain TEXT NOT NULL DEFAULT 'unknown',
    reading_time INTEGER NOT NULL DEFAULT 0 CHECK (reading_time >= 0),
    image_url TEXT,
    video_url TEXT,
    nested_links TEXT NOT NULL DEFAULT '[]',
    is_read INTEGER NOT NULL DEFAULT 0,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    scheduled_at TEXT,
    notification_1hr_sent INTEGER NOT NULL DEFAULT 0,
    notification_now_sent INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL DEFAULT 'telegram',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_created_at ON links(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_links_is_read ON links(is_read);
CREATE INDEX IF NOT EXISTS idx_links_scheduled_at ON links(scheduled_at);
"#;
