//! End-to-end publication of one content item.
//!
//! A run is strictly sequential: authenticate, render, resolve the link card,
//! create the post, record it. Only authentication and post creation abort a
//! run; card and thumbnail problems just drop the embed. A run that does not
//! publish leaves the state store untouched so the next trigger starts over.

use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use crate::client::BlueskyClient;
use crate::compose::ContentComposer;
use crate::config::Config;
use crate::error::{AutoPostError, Result};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::link_card::LinkCardResolver;
use crate::models::{ContentSource, ContentStatus};
use crate::record::PostRecord;
use crate::session::SessionManager;
use crate::state::{ItemLock, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingCredentials,
    ManualOverride,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "auto-posting is disabled"),
            SkipReason::MissingCredentials => write!(f, "identifier or app password not configured"),
            SkipReason::ManualOverride => write!(f, "auto-posting switched off for this item"),
        }
    }
}

#[derive(Debug)]
pub enum PublishResult {
    Published { uri: String },
    AlreadyPublished,
    Skipped(SkipReason),
    AuthFailed(AutoPostError),
    PublishFailed(AutoPostError),
}

impl PublishResult {
    /// What the trigger reports back to the host.
    pub fn succeeded(&self) -> bool {
        matches!(self, PublishResult::Published { .. })
    }
}

impl fmt::Display for PublishResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishResult::Published { uri } => write!(f, "published as {}", uri),
            PublishResult::AlreadyPublished => write!(f, "already published"),
            PublishResult::Skipped(reason) => write!(f, "skipped: {}", reason),
            PublishResult::AuthFailed(e) => write!(f, "authentication failed: {}", e),
            PublishResult::PublishFailed(e) => write!(f, "publish failed: {}", e),
        }
    }
}

/// Outcome of an interactive diagnostic, with a reason for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub success: bool,
    pub message: String,
}

impl Diagnostic {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per content id, held from the idempotency check through
/// the state write. Entries live only while someone holds or awaits them.
#[derive(Default)]
pub struct PublishLocks {
    locks: LockMap,
}

impl PublishLocks {
    pub async fn acquire(&self, id: &str) -> PublishGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };

        PublishGuard {
            id: id.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

pub struct PublishGuard {
    id: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only the map's own reference left: nobody is waiting.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

/// Both holds needed before touching an item: the in-process guard and the
/// store's cross-process lock.
struct Exclusive {
    _item: ItemLock,
    _guard: PublishGuard,
}

/// Which gate a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Needs auto-posting enabled.
    Automatic,
    /// Operator-initiated; only needs credentials.
    Manual,
}

pub struct PublicationPipeline {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn StateStore>,
    locks: PublishLocks,
}

impl PublicationPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn StateStore>) -> Self {
        Self {
            transport,
            store,
            locks: PublishLocks::default(),
        }
    }

    /// Pipeline over the production `reqwest` transport.
    pub fn with_store(store: Arc<dyn StateStore>) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new()?), store))
    }

    fn client(&self, config: &Config) -> BlueskyClient {
        BlueskyClient::new(Arc::clone(&self.transport), config.service_url.clone())
    }

    async fn lock(&self, id: &str) -> Result<Exclusive> {
        let guard = self.locks.acquire(id).await;

        let store = Arc::clone(&self.store);
        let owned_id = id.to_string();
        let item = tokio::task::spawn_blocking(move || store.lock_item(&owned_id))
            .await
            .map_err(AutoPostError::state)??;

        Ok(Exclusive {
            _item: item,
            _guard: guard,
        })
    }

    /// Publishes `source` at most once.
    pub async fn publish(&self, source: &ContentSource, config: &Config) -> PublishResult {
        let _lock = match self.lock(&source.id).await {
            Ok(lock) => lock,
            Err(e) => return PublishResult::PublishFailed(e),
        };
        self.publish_locked(source, config, Trigger::Automatic).await
    }

    /// Automatic trigger for a content item entering a publishable state.
    /// Honours the per-item manual override.
    pub async fn on_publishable_transition(
        &self,
        source: &ContentSource,
        config: &Config,
    ) -> PublishResult {
        let _lock = match self.lock(&source.id).await {
            Ok(lock) => lock,
            Err(e) => return PublishResult::PublishFailed(e),
        };

        let record = match self.store.load(&source.id) {
            Ok(record) => record,
            Err(e) => {
                error!("Could not read publication state for {}: {}", source.id, e);
                return PublishResult::PublishFailed(e);
            }
        };

        if record.posted {
            info!("Content {} already published, skipping", source.id);
            return PublishResult::AlreadyPublished;
        }
        if !record.auto_publish_allowed() {
            info!("Auto-posting switched off for content {}", source.id);
            return PublishResult::Skipped(SkipReason::ManualOverride);
        }

        self.publish_locked(source, config, Trigger::Automatic).await
    }

    /// Fires the automatic trigger only when the item moves into `Published`
    /// from any other status.
    pub async fn on_status_change(
        &self,
        old: ContentStatus,
        new: ContentStatus,
        source: &ContentSource,
        config: &Config,
    ) -> Option<PublishResult> {
        if new != ContentStatus::Published || old == ContentStatus::Published {
            return None;
        }
        Some(self.on_publishable_transition(source, config).await)
    }

    /// Manual re-trigger: clears the posted flag and publishes again, even
    /// with auto-posting disabled. If the attempt does not publish, the
    /// previous record is restored.
    pub async fn republish(&self, source: &ContentSource, config: &Config) -> PublishResult {
        let _lock = match self.lock(&source.id).await {
            Ok(lock) => lock,
            Err(e) => return PublishResult::PublishFailed(e),
        };

        let previous = match self.store.load(&source.id) {
            Ok(record) => record,
            Err(e) => return PublishResult::PublishFailed(e),
        };
        if let Err(e) = self.store.clear_posted(&source.id) {
            return PublishResult::PublishFailed(e);
        }

        let result = self.publish_locked(source, config, Trigger::Manual).await;

        if !result.succeeded() {
            if let Err(e) = self.store.save(&source.id, &previous) {
                error!("Failed to restore publication state for {}: {}", source.id, e);
            }
        }
        result
    }

    /// Checks that the configured credentials can open a session.
    pub async fn test_connection(&self, config: &Config) -> Diagnostic {
        if config.credentials.is_empty() {
            return Diagnostic::failed("Identifier or app password is not configured");
        }

        let sessions = SessionManager::new(self.client(config));
        match sessions.authenticate(&config.credentials).await {
            Ok(session) => Diagnostic::ok(format!(
                "Connected as {}",
                session.handle.as_deref().unwrap_or(&session.did)
            )),
            Err(e) => Diagnostic::failed(format!(
                "Authentication failed ({}). Check the identifier and app password.",
                e
            )),
        }
    }

    async fn publish_locked(
        &self,
        source: &ContentSource,
        config: &Config,
        trigger: Trigger,
    ) -> PublishResult {
        match self.store.is_posted(&source.id) {
            Ok(true) => {
                info!("Content {} already published, skipping", source.id);
                return PublishResult::AlreadyPublished;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Could not read publication state for {}: {}", source.id, e);
                return PublishResult::PublishFailed(e);
            }
        }

        if trigger == Trigger::Automatic && !config.enabled {
            return PublishResult::Skipped(SkipReason::Disabled);
        }
        if config.credentials.is_empty() {
            warn!("Identifier or app password not configured");
            return PublishResult::Skipped(SkipReason::MissingCredentials);
        }

        let client = self.client(config);

        let session = match SessionManager::new(client.clone())
            .authenticate(&config.credentials)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create session: {}", e);
                return PublishResult::AuthFailed(e);
            }
        };

        let post = ContentComposer::render(&config.template, source);

        let card = match post.link_target() {
            Some(target) => LinkCardResolver::new(client.clone()).resolve(target, &session).await,
            None => None,
        };

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = PostRecord::new(&post, card.as_ref(), created_at);

        let created = match client.create_post(&session, &record).await {
            Ok(created) => created,
            Err(e) => {
                error!("Failed to publish content {}: {}", source.id, e);
                return PublishResult::PublishFailed(e);
            }
        };

        if let Err(e) = self.store.mark_posted(&source.id, &created.uri) {
            error!(
                "Published content {} as {} but could not record it: {}",
                source.id, created.uri, e
            );
        }

        info!("Published content {} as {}", source.id, created.uri);
        PublishResult::Published { uri: created.uri }
    }
}
