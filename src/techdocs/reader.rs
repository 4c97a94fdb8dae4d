//! Content state of the docs reader.
//!
//! The controller owns two streams per input: the page content for the
//! current path and a sync of the stored docs for the current entity. Both
//! run as spawned tasks and are guarded by generation counters, so a result
//! that arrives after the input changed is dropped instead of flashing stale
//! content.

use super::api::{SyncResult, TechDocsStorageApi};
use super::guard::Generation;
use crate::errors::PortalError;
use crate::observability::{Metrics, TracingHooks};
use crate::types::EntityRef;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What the reader shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderInput {
    /// Entity whose docs are shown.
    pub entity: EntityRef,
    /// Page path inside the docs site.
    pub path: String,
}

/// Progress of the background docs sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for the backend to report anything.
    Checking,
    /// The backend is building the docs.
    Building,
    /// A newer build is available and the shown content is stale.
    BuildReady,
    /// A newer build is available and no content was shown, so it is being
    /// loaded.
    BuildReadyReload,
    /// The shown content is current.
    UpToDate,
    /// The sync failed.
    Error,
}

/// Status shown to the reader, derived from content and sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    /// Still working out what to show.
    Checking,
    /// No content yet and the first build is running.
    InitialBuild,
    /// Content shown while a newer build runs.
    ContentStaleRefreshing,
    /// Content shown and a newer build is ready.
    ContentStaleReady,
    /// Content shown and building a newer version failed.
    ContentStaleError,
    /// Nothing to show.
    ContentNotFound,
    /// Content shown and current.
    ContentFresh,
}

impl ReaderStatus {
    /// True once content or a definite absence of content is known.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Checking | Self::InitialBuild)
    }
}

/// Snapshot of the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderState {
    /// Current input, if any has been set.
    pub input: Option<ReaderInput>,
    /// Rendered page HTML.
    pub content: Option<String>,
    /// A content fetch is in flight.
    pub content_loading: bool,
    /// Why the last content fetch failed.
    pub content_error: Option<String>,
    /// Sync progress for the current entity.
    pub sync: SyncState,
    /// Why the sync failed.
    pub sync_error: Option<String>,
    /// Build output received so far.
    pub build_log: Vec<String>,
}

impl Default for ReaderState {
    fn default() -> Self {
        Self {
            input: None,
            content: None,
            content_loading: false,
            content_error: None,
            sync: SyncState::Checking,
            sync_error: None,
            build_log: Vec::new(),
        }
    }
}

impl ReaderState {
    /// Non-empty content, if any.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref().filter(|content| !content.is_empty())
    }

    /// Derives the display status.
    pub fn status(&self) -> ReaderStatus {
        if self.content_loading {
            return ReaderStatus::Checking;
        }
        if self.sync == SyncState::BuildReadyReload {
            return ReaderStatus::Checking;
        }

        if self.content().is_none() {
            return match self.sync {
                SyncState::Checking => ReaderStatus::Checking,
                SyncState::Building => ReaderStatus::InitialBuild,
                _ => ReaderStatus::ContentNotFound,
            };
        }

        match self.sync {
            SyncState::Building => ReaderStatus::ContentStaleRefreshing,
            SyncState::BuildReady => ReaderStatus::ContentStaleReady,
            SyncState::Error => ReaderStatus::ContentStaleError,
            SyncState::Checking | SyncState::BuildReadyReload | SyncState::UpToDate => {
                ReaderStatus::ContentFresh
            }
        }
    }
}

struct ReaderInner {
    state: ReaderState,
    content_generation: Generation,
    sync_generation: Generation,
}

struct ReaderShared {
    storage: Arc<dyn TechDocsStorageApi>,
    metrics: Arc<Metrics>,
    inner: Mutex<ReaderInner>,
    tx: watch::Sender<ReaderState>,
}

/// Drives [`ReaderState`] from the current input.
///
/// Cloning yields another handle to the same controller. Changing the input
/// must happen inside a tokio runtime.
#[derive(Clone)]
pub struct ReaderStateController {
    shared: Arc<ReaderShared>,
}

impl std::fmt::Debug for ReaderStateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderStateController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ReaderStateController {
    /// Creates an idle controller.
    pub fn new(storage: Arc<dyn TechDocsStorageApi>, metrics: Arc<Metrics>) -> Self {
        let (tx, _) = watch::channel(ReaderState::default());
        Self {
            shared: Arc::new(ReaderShared {
                storage,
                metrics,
                inner: Mutex::new(ReaderInner {
                    state: ReaderState::default(),
                    content_generation: Generation::default(),
                    sync_generation: Generation::default(),
                }),
                tx,
            }),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> ReaderState {
        self.shared.lock().state.clone()
    }

    /// Subscribes to snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ReaderState> {
        self.shared.tx.subscribe()
    }

    /// Waits until a snapshot satisfies `predicate` and returns it.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&ReaderState) -> bool) -> ReaderState {
        let mut rx = self.subscribe();
        loop {
            let current = self.state();
            if predicate(&current) {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Points the reader at `entity` and `path`.
    ///
    /// A path change on the same entity reloads the content and keeps the
    /// sync. An entity change resets everything and starts a new sync. Setting
    /// the current input again does nothing.
    pub fn set_input(&self, entity: EntityRef, path: impl Into<String>) {
        let input = ReaderInput {
            entity,
            path: path.into(),
        };

        let mut inner = self.shared.lock();
        if inner.state.input.as_ref() == Some(&input) {
            return;
        }

        let entity_changed = inner
            .state
            .input
            .as_ref()
            .map_or(true, |previous| previous.entity != input.entity);

        debug!(
            entity = %input.entity,
            path = %input.path,
            entity_changed,
            "Reader input changed"
        );

        inner.state.input = Some(input.clone());
        let content_token = Self::begin_content(&mut inner);

        let sync_token = if entity_changed {
            let token = inner.sync_generation.advance();
            inner.state.sync = SyncState::Checking;
            inner.state.sync_error = None;
            inner.state.build_log.clear();
            Some(token)
        } else {
            None
        };

        self.shared.publish(&inner);
        drop(inner);

        self.spawn_content(content_token, input.clone());
        if let Some(token) = sync_token {
            self.spawn_sync(token, input.entity);
        }
    }

    /// Reloads the content of the current input, e.g. after a newer build
    /// became ready.
    pub fn refresh_content(&self) {
        let mut inner = self.shared.lock();
        let Some(input) = inner.state.input.clone() else {
            return;
        };
        let token = Self::begin_content(&mut inner);
        self.shared.publish(&inner);
        drop(inner);

        self.spawn_content(token, input);
    }

    /// Drops every outstanding result. Used when the page goes away.
    pub fn close(&self) {
        let mut inner = self.shared.lock();
        inner.content_generation.advance();
        inner.sync_generation.advance();
        inner.state.content_loading = false;
        self.shared.publish(&inner);
    }

    fn begin_content(inner: &mut ReaderInner) -> u64 {
        let token = inner.content_generation.advance();
        inner.state.content = None;
        inner.state.content_error = None;
        inner.state.content_loading = true;
        token
    }

    fn spawn_content(&self, token: u64, input: ReaderInput) {
        let shared = Arc::clone(&self.shared);
        shared.metrics.record_fetch_issued();

        tokio::spawn(async move {
            let result = shared
                .storage
                .get_entity_docs(&input.entity, &input.path)
                .await;
            shared.apply_content(token, &input, result);
        });
    }

    fn spawn_sync(&self, token: u64, entity: EntityRef) {
        let shared = Arc::clone(&self.shared);
        shared.metrics.record_fetch_issued();

        tokio::spawn(async move {
            let (log_tx, mut log_rx) = mpsc::unbounded_channel();
            let sync = shared.storage.sync_entity_docs(&entity, log_tx);
            tokio::pin!(sync);

            let result = loop {
                tokio::select! {
                    biased;
                    Some(line) = log_rx.recv() => shared.apply_log(token, line),
                    result = &mut sync => break result,
                }
            };
            while let Ok(line) = log_rx.try_recv() {
                shared.apply_log(token, line);
            }

            if let Some(reload) = shared.apply_sync(token, &entity, result) {
                let controller = ReaderStateController {
                    shared: Arc::clone(&shared),
                };
                controller.spawn_content(reload.0, reload.1);
            }
        });
    }
}

impl ReaderShared {
    fn lock(&self) -> MutexGuard<'_, ReaderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &ReaderInner) {
        self.tx.send_replace(inner.state.clone());
    }

    fn apply_content(&self, token: u64, input: &ReaderInput, result: Result<String, PortalError>) {
        let mut inner = self.lock();
        if !inner.content_generation.is_current(token) {
            self.metrics.record_fetch_discarded();
            TracingHooks::on_stale_discarded("reader_content", &input.entity.to_string());
            return;
        }
        self.metrics.record_fetch_applied();

        inner.state.content_loading = false;
        match result {
            Ok(html) => {
                inner.state.content = Some(html);
                inner.state.content_error = None;
            }
            Err(error) => {
                warn!(entity = %input.entity, path = %input.path, error = %error, "Failed to load docs page");
                inner.state.content = None;
                inner.state.content_error = Some(error.message().to_string());
            }
        }

        // Loading content after a finished build brings the reader up to date.
        if matches!(
            inner.state.sync,
            SyncState::BuildReady | SyncState::BuildReadyReload
        ) {
            inner.state.sync = SyncState::UpToDate;
        }

        self.publish(&inner);
    }

    fn apply_log(&self, token: u64, line: String) {
        let mut inner = self.lock();
        if !inner.sync_generation.is_current(token) {
            return;
        }
        if inner.state.sync == SyncState::Checking {
            inner.state.sync = SyncState::Building;
        }
        inner.state.build_log.push(line);
        self.publish(&inner);
    }

    /// Applies a finished sync. Returns the content reload to start, if any.
    fn apply_sync(
        &self,
        token: u64,
        entity: &EntityRef,
        result: Result<SyncResult, PortalError>,
    ) -> Option<(u64, ReaderInput)> {
        let mut inner = self.lock();
        if !inner.sync_generation.is_current(token) {
            self.metrics.record_fetch_discarded();
            TracingHooks::on_stale_discarded("reader_sync", &entity.to_string());
            return None;
        }
        self.metrics.record_fetch_applied();

        let mut reload = None;
        match result {
            Ok(SyncResult::Cached) => {
                inner.state.sync = SyncState::UpToDate;
            }
            Ok(SyncResult::Updated) => {
                info!(entity = %entity, "Newer docs build available");
                if inner.state.content().is_some() {
                    inner.state.sync = SyncState::BuildReady;
                } else {
                    inner.state.sync = SyncState::BuildReadyReload;
                    if let Some(input) = inner.state.input.clone() {
                        let token = ReaderStateController::begin_content(&mut inner);
                        reload = Some((token, input));
                    }
                }
            }
            Err(error) => {
                warn!(entity = %entity, error = %error, "Docs sync failed");
                inner.state.sync = SyncState::Error;
                inner.state.sync_error = Some(error.message().to_string());
            }
        }

        self.publish(&inner);
        reload
    }
}
