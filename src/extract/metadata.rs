use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

use crate::models::{NewLink, DEFAULT_TITLE};
use crate::services::PageFetcher;

use super::media::{extract_media, meta_property};
use super::tags::auto_tag;
use super::urls::find_nested_links;

const SUMMARY_CHARS: usize = 400;
const WORDS_PER_MINUTE: usize = 200;
const TEXT_WIDTH: usize = 100;

const CONTENT_ROOTS: &[&str] = &["main", "article", "[role='main']", "body"];
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "iframe", "form",
];

/// Fetch and enrich a URL. Never fails: fetch or extraction problems come
/// back as sentinel payloads tagged accordingly.
pub async fn process_url(fetcher: &dyn PageFetcher, url: &str, timeout: Duration) -> NewLink {
    let Some(html) = fetcher.fetch(url, timeout).await else {
        tracing::debug!(url = %url, "fetch failed; storing error placeholder");
        return fetch_failed(url);
    };
    enrich(url, &html)
}

fn enrich(url: &str, html: &str) -> NewLink {
    let document = Html::parse_document(html);
    let domain = extract_domain(url);

    let text = match body_text(&document) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "failed to convert HTML to text");
            return NewLink {
                title: "Error Processing URL".to_string(),
                summary: format!("Exception: {}", e),
                tags: vec!["Error".to_string()],
                domain,
                ..NewLink::new(url)
            };
        }
    };

    if text.is_empty() {
        return NewLink {
            title: "No Content Extracted".to_string(),
            summary: "Unable to extract text from this URL.".to_string(),
            domain,
            ..NewLink::new(url)
        };
    }

    let title = page_title(&document).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let media = extract_media(url, &document);
    let tags = auto_tag(&title, &text, &domain);

    NewLink {
        summary: summarize(&text),
        reading_time: estimate_reading_time(&text),
        author: page_author(&document),
        nested_links: find_nested_links(&text, url),
        image_url: media.image_url,
        video_url: media.video_url,
        content: Some(text),
        title,
        tags,
        domain,
        ..NewLink::new(url)
    }
}

fn fetch_failed(url: &str) -> NewLink {
    NewLink {
        title: "Error: Unable to fetch content".to_string(),
        summary: "Could not download content from URL.".to_string(),
        tags: vec!["Error".to_string()],
        domain: extract_domain(url),
        ..NewLink::new(url)
    }
}

/// Host without a leading `www.`, or `"unknown"`.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
        .map(|host| host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Minutes at 200 wpm, rounded half up, at least one for non-empty text.
pub fn estimate_reading_time(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    let minutes = (words + WORDS_PER_MINUTE / 2) / WORDS_PER_MINUTE;
    minutes.max(1) as u32
}

/// First 400 characters, with `...` when cut.
pub fn summarize(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn page_title(document: &Html) -> Option<String> {
    meta_property(document, "og:title").or_else(|| {
        let selector = Selector::parse("title").ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

fn page_author(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="author"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|a| !a.is_empty())
        .map(str::to_string)
        .or_else(|| meta_property(document, "article:author"))
}

/// Readable text of the main content area, boilerplate removed.
fn body_text(document: &Html) -> Result<String, html2text::Error> {
    let root_html = CONTENT_ROOTS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next().map(|el| el.html()))
        .unwrap_or_else(|| document.html());

    let content_html = strip_boilerplate(&root_html);
    let text = html2text::from_read(content_html.as_bytes(), TEXT_WIDTH)?;

    Ok(text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn strip_boilerplate(html: &str) -> String {
    let mut fragment = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse(&BOILERPLATE.join(", ")) else {
        return html.to_string();
    };

    // Detaching a subtree also drops any boilerplate nested inside it.
    let ids: Vec<_> = fragment.select(&selector).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }
    fragment.root_element().html()
}
