//! Memoized access to authenticated GitHub clients.
//!
//! Every request is keyed by its target (host or entity) and the joined
//! scope list, so callers may build a fresh `vec!["repo"]` on every call
//! without triggering another credential round-trip. A request started once
//! is shared by all later callers with the same key, whether it is still in
//! flight or already settled. Failures are shared too: nothing is retried
//! until the inputs change.

use super::api::{GithubOctokitApi, GraphqlWithOwnerRepo, RestWithOwnerRepo};
use super::graphql::GraphqlClient;
use super::rest::RestClient;
use super::scopes::{ScopeKey, ScopeSet};
use super::source::entity_source_location;
use crate::errors::{PortalError, PortalResult};
use crate::observability::{Metrics, TracingHooks};
use crate::types::{Entity, EntityRef};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Result shared between every caller of one memoized request.
pub type SharedResult<T> = Result<T, Arc<PortalError>>;

type SharedRequest<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

/// Tri-state view of an asynchronous value.
#[derive(Debug, Clone)]
pub enum AsyncState<T> {
    /// Not settled yet.
    Loading,
    /// Settled with an error.
    Error(Arc<PortalError>),
    /// Settled with a value.
    Value(T),
}

impl<T> AsyncState<T> {
    /// Returns true while the value is pending.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The value, if settled successfully.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if settled with one.
    pub fn error(&self) -> Option<&Arc<PortalError>> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Maps the value arm.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AsyncState<U> {
        match self {
            Self::Loading => AsyncState::Loading,
            Self::Error(error) => AsyncState::Error(error),
            Self::Value(value) => AsyncState::Value(f(value)),
        }
    }
}

impl<T> From<SharedResult<T>> for AsyncState<T> {
    fn from(result: SharedResult<T>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Error(error),
        }
    }
}

/// The entity in scope for entity-bound client lookups.
#[derive(Debug, Clone)]
pub enum EntityContext {
    /// The entity is still being fetched.
    Loading,
    /// Fetching the entity failed.
    Error(Arc<PortalError>),
    /// The entity is available.
    Loaded(Entity),
    /// Called outside of any entity context.
    Absent,
}

/// Handle to a memoized client request.
#[derive(Clone)]
pub struct ClientRequest<T: Clone> {
    inner: SharedRequest<T>,
}

impl<T: Clone> fmt::Debug for ClientRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRequest")
            .field("settled", &self.inner.peek().is_some())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ClientRequest<T> {
    /// Current state without waiting.
    pub fn state(&self) -> AsyncState<T> {
        match self.inner.peek() {
            None => AsyncState::Loading,
            Some(Ok(value)) => AsyncState::Value(value.clone()),
            Some(Err(error)) => AsyncState::Error(Arc::clone(error)),
        }
    }

    /// Waits for the request to settle.
    pub async fn resolve(&self) -> SharedResult<T> {
        self.inner.clone().await
    }

    /// Returns true if both handles point at the same underlying request.
    pub fn same_request(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ClientTarget {
    Host(String),
    Entity {
        entity_ref: EntityRef,
        source: Option<String>,
    },
}

impl ClientTarget {
    fn for_entity(entity: &Entity) -> Self {
        Self::Entity {
            entity_ref: entity.entity_ref(),
            source: entity_source_location(entity).ok(),
        }
    }
}

impl fmt::Display for ClientTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(host) => f.write_str(host),
            Self::Entity { entity_ref, .. } => write!(f, "{}", entity_ref),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    target: ClientTarget,
    scopes: ScopeKey,
}

struct MemoCache<T> {
    transport: &'static str,
    entries: Mutex<HashMap<ClientKey, SharedRequest<T>>>,
}

impl<T: Clone + Send + Sync + 'static> MemoCache<T> {
    fn new(transport: &'static str) -> Self {
        Self {
            transport,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_start<F>(&self, key: ClientKey, metrics: &Metrics, start: F) -> ClientRequest<T>
    where
        F: FnOnce() -> BoxFuture<'static, PortalResult<T>>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = entries.get(&key) {
            metrics.record_client_cache_hit();
            debug!(
                transport = self.transport,
                client_for = %key.target,
                scopes = %key.scopes,
                "Reusing memoized GitHub client request"
            );
            return ClientRequest {
                inner: existing.clone(),
            };
        }

        metrics.record_client_constructed();
        TracingHooks::on_client_constructed(
            self.transport,
            &key.target.to_string(),
            key.scopes.as_str(),
        );

        let shared = start().map(|result| result.map_err(Arc::new)).boxed().shared();
        entries.insert(key, shared.clone());
        drop(entries);

        // Drive the request in the background so `state()` settles without
        // anyone awaiting it. Outside a runtime it is driven by `resolve()`.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(shared.clone().map(|_| ()));
        }

        ClientRequest { inner: shared }
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Memoizing façade over a [`GithubOctokitApi`].
pub struct GithubClientFactory {
    api: Arc<dyn GithubOctokitApi>,
    metrics: Arc<Metrics>,
    rest: MemoCache<Arc<RestClient>>,
    rest_for_entity: MemoCache<RestWithOwnerRepo>,
    graphql: MemoCache<Arc<GraphqlClient>>,
    graphql_for_entity: MemoCache<GraphqlWithOwnerRepo>,
}

impl GithubClientFactory {
    /// Creates a factory with its own metrics.
    pub fn new(api: Arc<dyn GithubOctokitApi>) -> Self {
        Self::with_metrics(api, Arc::new(Metrics::new()))
    }

    /// Creates a factory reporting into shared metrics.
    pub fn with_metrics(api: Arc<dyn GithubOctokitApi>, metrics: Arc<Metrics>) -> Self {
        Self {
            api,
            metrics,
            rest: MemoCache::new("rest"),
            rest_for_entity: MemoCache::new("rest"),
            graphql: MemoCache::new("graphql"),
            graphql_for_entity: MemoCache::new("graphql"),
        }
    }

    /// Metrics for this factory.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// REST client for a GitHub host.
    pub fn rest(&self, hostname: &str, scopes: impl Into<ScopeSet>) -> ClientRequest<Arc<RestClient>> {
        let scopes = scopes.into();
        let key = ClientKey {
            target: ClientTarget::Host(hostname.to_string()),
            scopes: scopes.key(),
        };
        let api = Arc::clone(&self.api);
        let hostname = hostname.to_string();

        self.rest.get_or_start(key, &self.metrics, move || {
            async move { api.get_rest(&hostname, scopes.as_slice()).await }.boxed()
        })
    }

    /// REST client and repository for an explicitly supplied entity.
    pub fn rest_for_custom_entity(
        &self,
        entity: &Entity,
        scopes: impl Into<ScopeSet>,
    ) -> ClientRequest<RestWithOwnerRepo> {
        let scopes = scopes.into();
        let key = ClientKey {
            target: ClientTarget::for_entity(entity),
            scopes: scopes.key(),
        };
        let api = Arc::clone(&self.api);
        let entity = entity.clone();

        self.rest_for_entity
            .get_or_start(key, &self.metrics, move || {
                async move { api.get_rest_for_entity(&entity, scopes.as_slice()).await }.boxed()
            })
    }

    /// REST client and repository for the entity in scope, folded with the
    /// entity's own loading state.
    pub fn rest_for_entity(
        &self,
        current: &EntityContext,
        scopes: impl Into<ScopeSet>,
    ) -> AsyncState<RestWithOwnerRepo> {
        match current {
            EntityContext::Loaded(entity) => self.rest_for_custom_entity(entity, scopes).state(),
            other => Self::without_entity(other),
        }
    }

    /// Waits for [`Self::rest_for_entity`] to settle.
    pub async fn resolve_rest_for_entity(
        &self,
        current: &EntityContext,
        scopes: impl Into<ScopeSet>,
    ) -> SharedResult<RestWithOwnerRepo> {
        match current {
            EntityContext::Loaded(entity) => self.rest_for_custom_entity(entity, scopes).resolve().await,
            other => Err(Self::entity_error(other)),
        }
    }

    /// GraphQL client for a GitHub host.
    pub fn graphql(&self, hostname: &str, scopes: impl Into<ScopeSet>) -> ClientRequest<Arc<GraphqlClient>> {
        let scopes = scopes.into();
        let key = ClientKey {
            target: ClientTarget::Host(hostname.to_string()),
            scopes: scopes.key(),
        };
        let api = Arc::clone(&self.api);
        let hostname = hostname.to_string();

        self.graphql.get_or_start(key, &self.metrics, move || {
            async move { api.get_graphql(&hostname, scopes.as_slice()).await }.boxed()
        })
    }

    /// GraphQL client and repository for an explicitly supplied entity.
    pub fn graphql_for_custom_entity(
        &self,
        entity: &Entity,
        scopes: impl Into<ScopeSet>,
    ) -> ClientRequest<GraphqlWithOwnerRepo> {
        let scopes = scopes.into();
        let key = ClientKey {
            target: ClientTarget::for_entity(entity),
            scopes: scopes.key(),
        };
        let api = Arc::clone(&self.api);
        let entity = entity.clone();

        self.graphql_for_entity
            .get_or_start(key, &self.metrics, move || {
                async move { api.get_graphql_for_entity(&entity, scopes.as_slice()).await }.boxed()
            })
    }

    /// GraphQL client and repository for the entity in scope.
    pub fn graphql_for_entity(
        &self,
        current: &EntityContext,
        scopes: impl Into<ScopeSet>,
    ) -> AsyncState<GraphqlWithOwnerRepo> {
        match current {
            EntityContext::Loaded(entity) => self.graphql_for_custom_entity(entity, scopes).state(),
            other => Self::without_entity(other),
        }
    }

    /// Waits for [`Self::graphql_for_entity`] to settle.
    pub async fn resolve_graphql_for_entity(
        &self,
        current: &EntityContext,
        scopes: impl Into<ScopeSet>,
    ) -> SharedResult<GraphqlWithOwnerRepo> {
        match current {
            EntityContext::Loaded(entity) => {
                self.graphql_for_custom_entity(entity, scopes).resolve().await
            }
            other => Err(Self::entity_error(other)),
        }
    }

    /// Forgets every memoized request.
    pub fn clear(&self) {
        self.rest.clear();
        self.rest_for_entity.clear();
        self.graphql.clear();
        self.graphql_for_entity.clear();
    }

    fn without_entity<T>(current: &EntityContext) -> AsyncState<T> {
        match current {
            EntityContext::Loading => AsyncState::Loading,
            other => AsyncState::Error(Self::entity_error(other)),
        }
    }

    fn entity_error(current: &EntityContext) -> Arc<PortalError> {
        match current {
            EntityContext::Error(error) => Arc::clone(error),
            _ => Arc::new(PortalError::no_current_entity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PortalErrorKind;

    #[test]
    fn test_async_state_from_result() {
        let ok: AsyncState<u32> = AsyncState::from(Ok(3));
        assert_eq!(ok.value(), Some(&3));
        assert_eq!(ok.map(|v| v * 2).value(), Some(&6));

        let err: AsyncState<u32> =
            AsyncState::from(Err(Arc::new(PortalError::authentication("bad token"))));
        assert_eq!(*err.error().unwrap().kind(), PortalErrorKind::BadCredentials);
        assert!(!err.is_loading());
    }

    #[test]
    fn test_entity_error_short_circuit() {
        let loading: AsyncState<()> = GithubClientFactory::without_entity(&EntityContext::Loading);
        assert!(loading.is_loading());

        let absent: AsyncState<()> = GithubClientFactory::without_entity(&EntityContext::Absent);
        assert_eq!(
            *absent.error().unwrap().kind(),
            PortalErrorKind::NoCurrentEntity
        );

        let failed: AsyncState<()> = GithubClientFactory::without_entity(&EntityContext::Error(
            Arc::new(PortalError::entity_not_found("gone")),
        ));
        assert_eq!(*failed.error().unwrap().kind(), PortalErrorKind::EntityNotFound);
    }

    #[test]
    fn test_resolve_outside_runtime() {
        use crate::config::PortalConfig;
        use crate::github::api::ScmGithubOctokitApi;
        use crate::mocks::CountingScmAuth;

        let auth = Arc::new(CountingScmAuth::new("ghp_test"));
        let api = ScmGithubOctokitApi::new(PortalConfig::default(), auth.clone()).unwrap();
        let factory = GithubClientFactory::new(Arc::new(api));

        let request = factory.rest("github.com", ["repo"]);
        assert!(request.state().is_loading());

        let client = tokio_test::block_on(request.resolve()).unwrap();
        assert_eq!(client.base_url(), "https://api.github.com");
        assert!(request.state().value().is_some());
        assert_eq!(auth.calls(), 1);
    }
}
