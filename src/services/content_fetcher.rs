use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;

use crate::error::Result;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Source of raw page content for the enrichment pipeline.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `None` on any failure, including the timeout elapsing.
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    async fn try_fetch(&self, url: &str, timeout: Duration) -> Result<Option<String>> {
        let response = self.client.get(url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", url, response.status());
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<String> {
        match self.try_fetch(url, timeout).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }
}
