use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

fn message_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid URL regex"))
}

fn nested_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"]+|www\.[^\s<>"]+"#).expect("valid nested URL regex")
    })
}

fn clean(token: &str) -> &str {
    token.trim_end_matches(TRAILING_PUNCTUATION)
}

/// Pull `http(s)://` URLs out of a chat message, in first-seen order.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    message_url_re()
        .find_iter(text)
        .map(|m| clean(m.as_str()))
        .filter(|url| !url.ends_with("://"))
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}

/// URL-like tokens (schemed or bare `www.`) inside extracted body text,
/// minus the page's own URL. Order carries no meaning.
pub fn find_nested_links(text: &str, source_url: &str) -> Vec<String> {
    let found: HashSet<&str> = nested_url_re()
        .find_iter(text)
        .map(|m| clean(m.as_str()))
        .filter(|url| !url.is_empty() && *url != source_url)
        .collect();
    found.into_iter().map(str::to_string).collect()
}
