//! Per-page state of the docs reader.
//!
//! A [`TechDocsPage`] is mounted once per entity. Mounting starts the entity
//! metadata fetch; [`TechDocsPage::on_ready`] starts the docs metadata fetch.
//! Both run concurrently and publish into one [`PageContext`], which
//! subscribers observe through a watch channel.

use super::api::TechDocsApi;
use super::guard::{FetchGuard, FetchKey};
use super::reader::ReaderStateController;
use super::route::RouteParams;
use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use crate::observability::{Metrics, TracingHooks};
use crate::types::{EntityRef, TechDocsEntityMetadata, TechDocsMetadata};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// State of one fetch stream.
#[derive(Debug, Clone)]
pub enum Fetch<T> {
    /// Not requested.
    Idle,
    /// In flight.
    Loading,
    /// Succeeded.
    Loaded(T),
    /// Failed.
    Failed(Arc<PortalError>),
}

impl<T> Fetch<T> {
    /// The loaded value.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            _ => None,
        }
    }

    /// The failure.
    pub fn error(&self) -> Option<&Arc<PortalError>> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// True while in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// True once loaded or failed.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Loaded(_) | Self::Failed(_))
    }
}

/// Coarse lifecycle of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePhase {
    /// Entity metadata is still loading.
    LoadingMetadata,
    /// Entity metadata failed. Terminal.
    NotFound(String),
    /// Entity metadata loaded, reader not ready yet.
    ReadyPending,
    /// Reader ready. Docs metadata is loading, loaded or failed.
    Ready,
}

/// Snapshot of a page's state.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// Page instance.
    pub page_id: Uuid,
    /// Entity the page shows.
    pub entity_ref: EntityRef,
    /// Catalog entity behind the docs.
    pub entity_metadata: Fetch<TechDocsEntityMetadata>,
    /// Built site metadata.
    pub techdocs_metadata: Fetch<TechDocsMetadata>,
    /// Whether the reader reported ready.
    pub is_ready: bool,
}

impl PageContext {
    fn new(page_id: Uuid, entity_ref: EntityRef) -> Self {
        Self {
            page_id,
            entity_ref,
            entity_metadata: Fetch::Loading,
            techdocs_metadata: Fetch::Idle,
            is_ready: false,
        }
    }

    /// Derives the phase.
    pub fn phase(&self) -> PagePhase {
        match &self.entity_metadata {
            Fetch::Failed(error) => PagePhase::NotFound(error.message().to_string()),
            Fetch::Idle | Fetch::Loading => PagePhase::LoadingMetadata,
            Fetch::Loaded(_) if self.is_ready => PagePhase::Ready,
            Fetch::Loaded(_) => PagePhase::ReadyPending,
        }
    }

    /// Loaded entity metadata.
    pub fn entity_metadata(&self) -> Option<&TechDocsEntityMetadata> {
        self.entity_metadata.value()
    }

    /// Loaded docs metadata.
    pub fn techdocs_metadata(&self) -> Option<&TechDocsMetadata> {
        self.techdocs_metadata.value()
    }

    /// Why docs metadata could not be loaded. Never fatal to the page.
    pub fn techdocs_metadata_error(&self) -> Option<&Arc<PortalError>> {
        self.techdocs_metadata.error()
    }

    /// True while either fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.entity_metadata.is_loading() || self.techdocs_metadata.is_loading()
    }
}

/// Output of [`TechDocsPage::render`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered<R> {
    /// The entity could not be loaded.
    NotFound {
        /// Error message.
        message: String,
    },
    /// The caller's output.
    Page(R),
}

struct PageInner {
    context: PageContext,
    mounted: bool,
    entity_guard: FetchGuard,
    docs_guard: FetchGuard,
}

struct PageShared {
    api: Arc<dyn TechDocsApi>,
    metrics: Arc<Metrics>,
    inner: Mutex<PageInner>,
    tx: watch::Sender<PageContext>,
}

/// A mounted docs page. Cloning yields another handle to the same page.
#[derive(Clone)]
pub struct TechDocsPage {
    shared: Arc<PageShared>,
}

impl std::fmt::Debug for TechDocsPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechDocsPage")
            .field("context", &self.context())
            .finish_non_exhaustive()
    }
}

impl TechDocsPage {
    /// Mounts a page for `entity_ref` and starts the entity metadata fetch.
    /// Must be called inside a tokio runtime.
    pub fn mount(api: Arc<dyn TechDocsApi>, entity_ref: EntityRef, metrics: Arc<Metrics>) -> Self {
        let page_id = Uuid::new_v4();
        let context = PageContext::new(page_id, entity_ref.clone());
        let (tx, _) = watch::channel(context.clone());

        let page = Self {
            shared: Arc::new(PageShared {
                api,
                metrics,
                inner: Mutex::new(PageInner {
                    context,
                    mounted: true,
                    entity_guard: FetchGuard::default(),
                    docs_guard: FetchGuard::default(),
                }),
                tx,
            }),
        };

        TracingHooks::on_page_mounted(&entity_ref.to_string(), &page_id.to_string());

        let key = FetchKey::entity_metadata(page_id, entity_ref);
        page.shared.lock().entity_guard.issue(key.clone());
        page.spawn_entity_fetch(key);
        page
    }

    /// Mounts a page for the entity a route points at.
    pub fn mount_route(api: Arc<dyn TechDocsApi>, route: &RouteParams, metrics: Arc<Metrics>) -> Self {
        Self::mount(api, route.entity_ref(), metrics)
    }

    /// Page instance id.
    pub fn id(&self) -> Uuid {
        self.shared.tx.borrow().page_id
    }

    /// Entity the page shows.
    pub fn entity_ref(&self) -> EntityRef {
        self.shared.tx.borrow().entity_ref.clone()
    }

    /// Current snapshot.
    pub fn context(&self) -> PageContext {
        self.shared.lock().context.clone()
    }

    /// Subscribes to snapshots.
    pub fn subscribe(&self) -> watch::Receiver<PageContext> {
        self.shared.tx.subscribe()
    }

    /// Waits until a snapshot satisfies `predicate` and returns it.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&PageContext) -> bool) -> PageContext {
        let mut rx = self.subscribe();
        loop {
            let current = self.context();
            if predicate(&current) || !self.is_mounted() {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.context();
            }
        }
    }

    /// Whether the page is still mounted.
    pub fn is_mounted(&self) -> bool {
        self.shared.lock().mounted
    }

    /// Marks the reader ready and starts the docs metadata fetch.
    ///
    /// Readiness only ever goes from false to true; later calls do nothing.
    /// A page whose entity failed to load never fetches docs metadata.
    pub fn on_ready(&self) {
        let mut inner = self.shared.lock();
        if !inner.mounted || inner.context.is_ready {
            return;
        }
        inner.context.is_ready = true;

        if matches!(inner.context.phase(), PagePhase::NotFound(_)) {
            debug!(entity = %inner.context.entity_ref, "Reader ready on a missing entity");
            self.shared.publish(&inner);
            return;
        }

        let key = FetchKey::docs_metadata(
            inner.context.page_id,
            inner.context.entity_ref.clone(),
            true,
        );
        inner.docs_guard.issue(key.clone());
        inner.context.techdocs_metadata = Fetch::Loading;
        self.shared.publish(&inner);
        drop(inner);

        self.spawn_docs_fetch(key);
    }

    /// Renders with `f` unless the entity could not be loaded.
    pub fn render<R>(&self, f: impl FnOnce(&PageContext) -> R) -> Rendered<R> {
        let context = self.context();
        match context.phase() {
            PagePhase::NotFound(message) => Rendered::NotFound { message },
            _ => Rendered::Page(f(&context)),
        }
    }

    /// Unmounts the page. Results still in flight are dropped on arrival.
    pub fn unmount(&self) {
        let mut inner = self.shared.lock();
        if !inner.mounted {
            return;
        }
        inner.mounted = false;
        inner.entity_guard.close();
        inner.docs_guard.close();
        debug!(entity = %inner.context.entity_ref, page = %inner.context.page_id, "Page unmounted");
        self.shared.publish(&inner);
    }

    fn spawn_entity_fetch(&self, key: FetchKey) {
        let shared = Arc::clone(&self.shared);
        shared.metrics.record_fetch_issued();

        tokio::spawn(async move {
            let result = shared.api.get_entity_metadata(&key.entity).await;
            shared.apply_entity(key, result);
        });
    }

    fn spawn_docs_fetch(&self, key: FetchKey) {
        let shared = Arc::clone(&self.shared);
        shared.metrics.record_fetch_issued();

        tokio::spawn(async move {
            let result = shared.api.get_techdocs_metadata(&key.entity).await;
            shared.apply_docs(key, result);
        });
    }
}

impl PageShared {
    fn lock(&self) -> MutexGuard<'_, PageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &PageInner) {
        self.tx.send_replace(inner.context.clone());
    }

    fn discard(&self, key: &FetchKey) {
        self.metrics.record_fetch_discarded();
        TracingHooks::on_stale_discarded(key.stream.as_str(), &key.entity.to_string());
    }

    fn apply_entity(&self, key: FetchKey, result: PortalResult<TechDocsEntityMetadata>) {
        let mut inner = self.lock();
        if !inner.mounted || !inner.entity_guard.settle(&key) {
            self.discard(&key);
            return;
        }
        self.metrics.record_fetch_applied();

        match result {
            Ok(metadata) => {
                inner.context.entity_metadata = Fetch::Loaded(metadata);
            }
            Err(error) => {
                warn!(entity = %key.entity, error = %error, "Entity metadata unavailable");
                inner.context.entity_metadata =
                    Fetch::Failed(Arc::new(error.reclassify(PortalErrorKind::EntityNotFound)));
                if inner.docs_guard.is_pending() {
                    inner.docs_guard.close();
                    inner.context.techdocs_metadata = Fetch::Idle;
                }
            }
        }

        self.publish(&inner);
    }

    fn apply_docs(&self, key: FetchKey, result: PortalResult<TechDocsMetadata>) {
        let mut inner = self.lock();
        let not_found = matches!(inner.context.phase(), PagePhase::NotFound(_));
        if !inner.mounted || not_found || !inner.docs_guard.settle(&key) {
            self.discard(&key);
            return;
        }
        self.metrics.record_fetch_applied();

        inner.context.techdocs_metadata = match result {
            Ok(metadata) => Fetch::Loaded(metadata),
            Err(error) => {
                warn!(entity = %key.entity, error = %error, "Docs metadata unavailable");
                Fetch::Failed(Arc::new(
                    error.reclassify(PortalErrorKind::DocsMetadataUnavailable),
                ))
            }
        };

        self.publish(&inner);
    }
}

/// Owns the page and reader for the current route and replaces the page
/// whenever navigation moves to another entity.
pub struct TechDocsPageHost {
    api: Arc<dyn TechDocsApi>,
    metrics: Arc<Metrics>,
    reader: ReaderStateController,
    current: Option<(RouteParams, TechDocsPage)>,
}

impl std::fmt::Debug for TechDocsPageHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechDocsPageHost")
            .field("route", &self.route())
            .finish_non_exhaustive()
    }
}

impl TechDocsPageHost {
    /// Creates a host with no page mounted.
    pub fn new(api: Arc<dyn TechDocsApi>, reader: ReaderStateController, metrics: Arc<Metrics>) -> Self {
        Self {
            api,
            metrics,
            reader,
            current: None,
        }
    }

    /// Navigates to `route` and returns the page now mounted.
    ///
    /// Moving to another entity unmounts the old page and mounts a new one.
    /// Moving within the same entity keeps the page and only updates the
    /// reader.
    pub fn navigate(&mut self, route: RouteParams) -> TechDocsPage {
        let reuse = self
            .current
            .as_ref()
            .filter(|(current, _)| current.same_entity(&route))
            .map(|(_, page)| page.clone());

        let page = match reuse {
            Some(page) => page,
            None => {
                if let Some((_, old)) = self.current.take() {
                    old.unmount();
                }
                let page = TechDocsPage::mount_route(Arc::clone(&self.api), &route, Arc::clone(&self.metrics));
                self.watch_reader_ready(&page);
                page
            }
        };

        self.reader.set_input(route.entity_ref(), route.path.clone());
        self.current = Some((route, page.clone()));
        page
    }

    /// Mounted page, if any.
    pub fn page(&self) -> Option<&TechDocsPage> {
        self.current.as_ref().map(|(_, page)| page)
    }

    /// Current route, if any.
    pub fn route(&self) -> Option<&RouteParams> {
        self.current.as_ref().map(|(route, _)| route)
    }

    /// The reader shared by all pages of this host.
    pub fn reader(&self) -> &ReaderStateController {
        &self.reader
    }

    /// Unmounts the current page and stops the reader.
    pub fn close(&mut self) {
        if let Some((_, page)) = self.current.take() {
            page.unmount();
        }
        self.reader.close();
    }

    /// Calls [`TechDocsPage::on_ready`] once the reader shows content for the
    /// page's entity.
    fn watch_reader_ready(&self, page: &TechDocsPage) {
        let page = page.clone();
        let entity = page.entity_ref();
        let mut rx = self.reader.subscribe();

        tokio::spawn(async move {
            loop {
                let shows_page = {
                    let state = rx.borrow_and_update();
                    let same_entity = state
                        .input
                        .as_ref()
                        .map_or(false, |input| input.entity == entity);
                    same_entity && !state.content_loading && state.content().is_some()
                };
                if shows_page {
                    page.on_ready();
                    return;
                }
                if !page.is_mounted() || rx.changed().await.is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityMeta};
    use pretty_assertions::assert_eq;

    fn context() -> PageContext {
        PageContext::new(Uuid::new_v4(), EntityRef::new("Component", "default", "svc"))
    }

    fn loaded_entity() -> TechDocsEntityMetadata {
        TechDocsEntityMetadata {
            entity: Entity {
                api_version: "backstage.io/v1alpha1".to_string(),
                kind: "Component".to_string(),
                metadata: EntityMeta {
                    name: "svc".to_string(),
                    ..Default::default()
                },
                spec: serde_json::Value::Null,
                relations: vec![],
            },
            location_metadata: None,
        }
    }

    #[test]
    fn test_initial_phase() {
        let ctx = context();
        assert_eq!(ctx.phase(), PagePhase::LoadingMetadata);
        assert!(ctx.is_loading());
        assert!(!ctx.is_ready);
    }

    #[test]
    fn test_phase_follows_readiness() {
        let mut ctx = context();
        ctx.entity_metadata = Fetch::Loaded(loaded_entity());
        assert_eq!(ctx.phase(), PagePhase::ReadyPending);

        ctx.is_ready = true;
        assert_eq!(ctx.phase(), PagePhase::Ready);
    }

    #[test]
    fn test_docs_failure_does_not_change_phase() {
        let mut ctx = context();
        ctx.entity_metadata = Fetch::Loaded(loaded_entity());
        ctx.is_ready = true;
        ctx.techdocs_metadata = Fetch::Failed(Arc::new(PortalError::new(
            PortalErrorKind::DocsMetadataUnavailable,
            "no build",
        )));

        assert_eq!(ctx.phase(), PagePhase::Ready);
        assert_eq!(ctx.techdocs_metadata_error().unwrap().message(), "no build");
    }

    #[test]
    fn test_entity_failure_is_not_found() {
        let mut ctx = context();
        ctx.entity_metadata = Fetch::Failed(Arc::new(PortalError::not_found("no such entity")));
        assert_eq!(ctx.phase(), PagePhase::NotFound("no such entity".to_string()));
    }
}
