//! Link-card metadata scraping.
//!
//! Cards are best-effort: any failure to fetch or parse the target page
//! results in `None` and the post goes out with a plain link facet.

use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::client::BlueskyClient;
use crate::http::{HttpRequest, METADATA_TIMEOUT};
use crate::image::ImageIngester;
use crate::models::{LinkCard, Session};

pub const MAX_TITLE_BYTES: usize = 300;
pub const MAX_DESCRIPTION_BYTES: usize = 1000;

const TITLE_KEYS: [&str; 2] = ["og:title", "twitter:title"];
const DESCRIPTION_KEYS: [&str; 3] = ["og:description", "twitter:description", "description"];
const IMAGE_KEYS: [&str; 2] = ["og:image", "twitter:image"];

/// Metadata found in a page, before truncation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Extracts title, description and thumbnail candidate from `html`.
///
/// Each field takes the first non-empty value in priority order: OpenGraph,
/// then Twitter card, then the plain HTML fallback.
pub fn extract_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);

    let title = first_meta(&document, &TITLE_KEYS).or_else(|| title_tag(&document));
    let description = first_meta(&document, &DESCRIPTION_KEYS);
    let image = first_meta(&document, &IMAGE_KEYS);

    PageMetadata {
        title,
        description,
        image,
    }
}

fn first_meta(document: &Html, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| meta_content(document, key))
}

/// Content of the first `<meta>` whose `property` or `name` equals `key`,
/// compared case-insensitively. Entities are already decoded by the parser.
fn meta_content(document: &Html, key: &str) -> Option<String> {
    let selector = Selector::parse("meta[content]").ok()?;

    document
        .select(&selector)
        .find(|el| {
            let attrs = el.value();
            [attrs.attr("property"), attrs.attr("name")]
                .into_iter()
                .flatten()
                .any(|value| value.trim().eq_ignore_ascii_case(key))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn title_tag(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Truncates to at most `max_bytes`, backing off to a character boundary.
pub fn truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Resolves a thumbnail candidate against the page URL.
///
/// Absolute http(s) URLs pass through unchanged; relative references are
/// joined against the page's scheme and host. Anything else is rejected.
pub fn resolve_thumbnail_url(candidate: &str, page_url: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return None;
    }

    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https").then(|| url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let page = Url::parse(page_url).ok()?;
            let host = page.host_str()?;
            let origin = match page.port() {
                Some(port) => format!("{}://{}:{}/", page.scheme(), host, port),
                None => format!("{}://{}/", page.scheme(), host),
            };
            let base = Url::parse(&origin).ok()?;
            let resolved = if candidate.starts_with("//") {
                base.join(candidate).ok()?
            } else {
                base.join(candidate.trim_start_matches('/')).ok()?
            };
            Some(resolved.to_string())
        }
        Err(_) => None,
    }
}

pub struct LinkCardResolver {
    client: BlueskyClient,
    images: ImageIngester,
}

impl LinkCardResolver {
    pub fn new(client: BlueskyClient) -> Self {
        let images = ImageIngester::new(client.clone());
        Self { client, images }
    }

    pub async fn resolve(&self, url: &str, session: &Session) -> Option<LinkCard> {
        let html = self.fetch_page(url).await?;
        let metadata = extract_metadata(&html);

        let Some(title) = metadata.title else {
            info!("No title found at {}, posting without link card", url);
            return None;
        };

        let thumbnail = match metadata
            .image
            .as_deref()
            .and_then(|candidate| resolve_thumbnail_url(candidate, url))
        {
            Some(image_url) => self.images.ingest(&image_url, session).await,
            None => None,
        };

        Some(LinkCard {
            source_url: url.to_string(),
            title: truncate_bytes(&title, MAX_TITLE_BYTES),
            description: truncate_bytes(
                metadata.description.as_deref().unwrap_or(""),
                MAX_DESCRIPTION_BYTES,
            ),
            thumbnail,
        })
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let response = match self
            .client
            .transport()
            .send(HttpRequest::get(url, METADATA_TIMEOUT))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Failed to fetch {}: {}", url, e);
                return None;
            }
        };

        if !response.is_success() {
            debug!("Fetching {} returned HTTP {}", url, response.status);
            return None;
        }

        let html = response.text();
        if html.trim().is_empty() {
            return None;
        }
        Some(html)
    }
}
