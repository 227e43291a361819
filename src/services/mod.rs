mod content_fetcher;
mod telegram;

pub use content_fetcher::{HttpFetcher, PageFetcher};
pub use telegram::{NotificationChannel, TelegramClient};
