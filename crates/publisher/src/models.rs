use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (handle or email) and app password.
#[derive(Clone, Default)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identifier.trim().is_empty() || self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authenticated session, created fresh for every publish attempt.
#[derive(Clone)]
pub struct Session {
    pub did: String,
    pub access_jwt: String,
    pub handle: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"<redacted>")
            .finish()
    }
}

/// Read-only view of the content item to publish, supplied by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: String,
    pub title: String,
    pub permalink: String,
    pub excerpt: String,
}

impl ContentSource {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        permalink: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            permalink: permalink.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Host-side lifecycle status of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    Draft,
    Pending,
    Scheduled,
    Private,
    Published,
    Trashed,
}

/// A hyperlink annotation over `text[byte_start..byte_end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFacet {
    pub byte_start: usize,
    pub byte_end: usize,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub text: String,
    pub facets: Vec<LinkFacet>,
}

impl RenderedPost {
    /// The link the card is built for, if the text links anywhere.
    pub fn link_target(&self) -> Option<&str> {
        self.facets.first().map(|f| f.target.as_str())
    }
}

/// Uploaded image, referenced from a card by its remote blob reference.
#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub mime_type: &'static str,
    pub raw_bytes: Bytes,
    pub blob_ref: serde_json::Value,
}

/// Link preview built from the target page's metadata.
#[derive(Debug, Clone)]
pub struct LinkCard {
    pub source_url: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<ImageBlob>,
}
