//! Lexical URL discovery and page enrichment.

mod media;
mod metadata;
mod tags;
mod urls;

pub use metadata::process_url;
pub use urls::extract_urls;
