use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaLinks {
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

/// Preview media for a page: OpenGraph tags, with YouTube links turned
/// into an embed URL and a thumbnail.
pub fn extract_media(url: &str, document: &Html) -> MediaLinks {
    let mut media = MediaLinks {
        image_url: meta_property(document, "og:image"),
        video_url: None,
    };

    if let Some(video_id) = youtube_video_id(url) {
        media.video_url = Some(format!("https://www.youtube.com/embed/{}", video_id));
        if media.image_url.is_none() {
            media.image_url = Some(format!(
                "https://img.youtube.com/vi/{}/maxresdefault.jpg",
                video_id
            ));
        }
    }

    if media.video_url.is_none() {
        media.video_url = meta_property(document, "og:video");
    }

    media
}

pub(crate) fn meta_property(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[property="{}"]"#, property)).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;

    let id = if host == "youtu.be" || host.ends_with(".youtu.be") {
        parsed.path_segments()?.next().map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .or_else(|| {
                let mut segments = parsed.path_segments()?;
                match segments.next()? {
                    "shorts" | "embed" | "live" => segments.next().map(str::to_string),
                    _ => None,
                }
            })
    } else {
        None
    };

    id.filter(|id| !id.is_empty())
}
