//! Publishes blog posts to Bluesky as rich posts with a link card.
//!
//! The host application owns content, settings and lifecycle hooks; it hands
//! a [`ContentSource`] and an immutable [`Config`] to a
//! [`PublicationPipeline`], which authenticates, renders the text with a
//! byte-exact link facet, scrapes a link card (with an optional uploaded
//! thumbnail) and records the result so each item is posted at most once.

// Public modules
pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod http;
pub mod image;
pub mod link_card;
pub mod models;
pub mod pipeline;
pub mod record;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use client::BlueskyClient;
pub use compose::{ContentComposer, DEFAULT_TEMPLATE};
pub use config::Config;
pub use error::{AutoPostError, Result};
pub use http::{HttpTransport, ReqwestTransport};
pub use image::ImageIngester;
pub use link_card::LinkCardResolver;
pub use models::{
    ContentSource, ContentStatus, Credentials, ImageBlob, LinkCard, LinkFacet, RenderedPost,
    Session,
};
pub use pipeline::{Diagnostic, PublicationPipeline, PublishResult, SkipReason};
pub use session::SessionManager;
pub use state::{ItemLock, JsonFileStateStore, MemoryStateStore, PublicationRecord, StateStore};
