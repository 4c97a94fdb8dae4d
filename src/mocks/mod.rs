//! Scripted test doubles and fixtures.

use crate::auth::{CredentialsRequest, ScmAuthApi, ScmCredentials};
use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use crate::techdocs::{SyncResult, TechDocsApi, TechDocsStorageApi};
use crate::types::{EntityRef, TechDocsEntityMetadata, TechDocsMetadata};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// A scripted reply. Errors are stored as kind and message because
/// [`PortalError`] is not `Clone`.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    /// Succeed with the value.
    Ok(T),
    /// Fail with an error of this kind.
    Err(PortalErrorKind, String),
}

impl<T: Clone> MockReply<T> {
    fn to_result(&self) -> PortalResult<T> {
        match self {
            Self::Ok(value) => Ok(value.clone()),
            Self::Err(kind, message) => Err(PortalError::new(kind.clone(), message.clone())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pass_gate(gates: &Mutex<HashMap<EntityRef, Arc<Notify>>>, entity: &EntityRef) {
    let gate = lock(gates).get(entity).cloned();
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

fn not_scripted<T>(what: &str, entity: &EntityRef) -> PortalResult<T> {
    Err(PortalError::not_found(format!("No {} scripted for {}", what, entity)))
}

#[derive(Debug, Default)]
struct TechDocsScript {
    entities: HashMap<EntityRef, MockReply<TechDocsEntityMetadata>>,
    techdocs: HashMap<EntityRef, MockReply<TechDocsMetadata>>,
    entity_calls: Vec<EntityRef>,
    techdocs_calls: Vec<EntityRef>,
}

/// Scripted [`TechDocsApi`].
///
/// Replies are keyed by entity. A gate registered for an entity holds the
/// reply until [`Notify::notify_one`] is called on it.
#[derive(Debug, Clone, Default)]
pub struct MockTechDocsApi {
    script: Arc<Mutex<TechDocsScript>>,
    entity_gates: Arc<Mutex<HashMap<EntityRef, Arc<Notify>>>>,
    techdocs_gates: Arc<Mutex<HashMap<EntityRef, Arc<Notify>>>>,
}

impl MockTechDocsApi {
    /// Creates an empty mock. Unscripted lookups fail with `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts entity metadata, keyed by the entity's own reference.
    pub fn with_entity(self, metadata: TechDocsEntityMetadata) -> Self {
        let entity = metadata.entity.entity_ref();
        lock(&self.script)
            .entities
            .insert(entity, MockReply::Ok(metadata));
        self
    }

    /// Scripts an entity metadata failure.
    pub fn with_entity_error(self, entity: &EntityRef, kind: PortalErrorKind, message: &str) -> Self {
        lock(&self.script)
            .entities
            .insert(entity.clone(), MockReply::Err(kind, message.to_string()));
        self
    }

    /// Scripts docs metadata.
    pub fn with_techdocs(self, entity: &EntityRef, metadata: TechDocsMetadata) -> Self {
        lock(&self.script)
            .techdocs
            .insert(entity.clone(), MockReply::Ok(metadata));
        self
    }

    /// Scripts a docs metadata failure.
    pub fn with_techdocs_error(self, entity: &EntityRef, kind: PortalErrorKind, message: &str) -> Self {
        lock(&self.script)
            .techdocs
            .insert(entity.clone(), MockReply::Err(kind, message.to_string()));
        self
    }

    /// Holds entity metadata replies for `entity` until released.
    pub fn gate_entity(&self, entity: &EntityRef) -> Arc<Notify> {
        Arc::clone(lock(&self.entity_gates).entry(entity.clone()).or_default())
    }

    /// Holds docs metadata replies for `entity` until released.
    pub fn gate_techdocs(&self, entity: &EntityRef) -> Arc<Notify> {
        Arc::clone(lock(&self.techdocs_gates).entry(entity.clone()).or_default())
    }

    /// Entity metadata requests so far.
    pub fn entity_calls(&self) -> Vec<EntityRef> {
        lock(&self.script).entity_calls.clone()
    }

    /// Docs metadata requests so far.
    pub fn techdocs_calls(&self) -> Vec<EntityRef> {
        lock(&self.script).techdocs_calls.clone()
    }
}

#[async_trait]
impl TechDocsApi for MockTechDocsApi {
    async fn get_entity_metadata(&self, entity: &EntityRef) -> PortalResult<TechDocsEntityMetadata> {
        let reply = {
            let mut script = lock(&self.script);
            script.entity_calls.push(entity.clone());
            script.entities.get(entity).cloned()
        };
        pass_gate(&self.entity_gates, entity).await;
        match reply {
            Some(reply) => reply.to_result(),
            None => not_scripted("entity metadata", entity),
        }
    }

    async fn get_techdocs_metadata(&self, entity: &EntityRef) -> PortalResult<TechDocsMetadata> {
        let reply = {
            let mut script = lock(&self.script);
            script.techdocs_calls.push(entity.clone());
            script.techdocs.get(entity).cloned()
        };
        pass_gate(&self.techdocs_gates, entity).await;
        match reply {
            Some(reply) => reply.to_result(),
            None => not_scripted("docs metadata", entity),
        }
    }
}

/// Scripted outcome of a docs sync.
#[derive(Debug, Clone)]
pub struct SyncScript {
    /// Build log lines emitted before the result.
    pub logs: Vec<String>,
    /// Final result.
    pub result: MockReply<SyncResult>,
}

impl SyncScript {
    /// A sync that finds the docs current.
    pub fn cached() -> Self {
        Self {
            logs: Vec::new(),
            result: MockReply::Ok(SyncResult::Cached),
        }
    }

    /// A sync that builds and publishes new docs.
    pub fn updated(logs: &[&str]) -> Self {
        Self {
            logs: logs.iter().map(|line| line.to_string()).collect(),
            result: MockReply::Ok(SyncResult::Updated),
        }
    }

    /// A sync that fails.
    pub fn failed(logs: &[&str], message: &str) -> Self {
        Self {
            logs: logs.iter().map(|line| line.to_string()).collect(),
            result: MockReply::Err(PortalErrorKind::BuildFailed, message.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct StorageScript {
    pages: HashMap<(EntityRef, String), MockReply<String>>,
    syncs: HashMap<EntityRef, SyncScript>,
    page_calls: Vec<(EntityRef, String)>,
    sync_calls: Vec<EntityRef>,
}

/// Scripted [`TechDocsStorageApi`].
///
/// Pages are keyed by entity and path. Each page fetch takes the reply that
/// is scripted at the time of the call, so a test can swap the content while
/// a sync runs.
#[derive(Debug, Clone, Default)]
pub struct MockStorageApi {
    script: Arc<Mutex<StorageScript>>,
    page_gates: Arc<Mutex<HashMap<EntityRef, Arc<Notify>>>>,
    sync_gates: Arc<Mutex<HashMap<EntityRef, Arc<Notify>>>>,
}

impl MockStorageApi {
    /// Creates an empty mock. Unscripted pages fail with `NotFound`, and an
    /// unscripted sync reports the docs as cached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the HTML of one page.
    pub fn with_page(self, entity: &EntityRef, path: &str, html: &str) -> Self {
        self.set_page(entity, path, html);
        self
    }

    /// Replaces the HTML of one page.
    pub fn set_page(&self, entity: &EntityRef, path: &str, html: &str) {
        lock(&self.script).pages.insert(
            (entity.clone(), path.to_string()),
            MockReply::Ok(html.to_string()),
        );
    }

    /// Scripts a sync.
    pub fn with_sync(self, entity: &EntityRef, sync: SyncScript) -> Self {
        lock(&self.script).syncs.insert(entity.clone(), sync);
        self
    }

    /// Holds page replies for `entity` until released.
    pub fn gate_pages(&self, entity: &EntityRef) -> Arc<Notify> {
        Arc::clone(lock(&self.page_gates).entry(entity.clone()).or_default())
    }

    /// Holds the sync result for `entity` until released. Logs are sent
    /// before waiting.
    pub fn gate_sync(&self, entity: &EntityRef) -> Arc<Notify> {
        Arc::clone(lock(&self.sync_gates).entry(entity.clone()).or_default())
    }

    /// Page requests so far.
    pub fn page_calls(&self) -> Vec<(EntityRef, String)> {
        lock(&self.script).page_calls.clone()
    }

    /// Sync requests so far.
    pub fn sync_calls(&self) -> Vec<EntityRef> {
        lock(&self.script).sync_calls.clone()
    }
}

#[async_trait]
impl TechDocsStorageApi for MockStorageApi {
    async fn get_entity_docs(&self, entity: &EntityRef, path: &str) -> PortalResult<String> {
        lock(&self.script)
            .page_calls
            .push((entity.clone(), path.to_string()));
        pass_gate(&self.page_gates, entity).await;

        let reply = lock(&self.script)
            .pages
            .get(&(entity.clone(), path.to_string()))
            .cloned();
        match reply {
            Some(reply) => reply.to_result(),
            None => not_scripted("page", entity),
        }
    }

    async fn sync_entity_docs(
        &self,
        entity: &EntityRef,
        logs: UnboundedSender<String>,
    ) -> PortalResult<SyncResult> {
        let script = {
            let mut script = lock(&self.script);
            script.sync_calls.push(entity.clone());
            script.syncs.get(entity).cloned()
        }
        .unwrap_or_else(SyncScript::cached);

        for line in script.logs {
            let _ = logs.send(line);
        }
        pass_gate(&self.sync_gates, entity).await;
        script.result.to_result()
    }
}

/// [`ScmAuthApi`] that hands out one token and counts requests.
#[derive(Debug)]
pub struct CountingScmAuth {
    token: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<CredentialsRequest>>,
}

impl CountingScmAuth {
    /// Creates a provider returning `token` for every host.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of credential requests served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests served so far.
    pub fn requests(&self) -> Vec<CredentialsRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ScmAuthApi for CountingScmAuth {
    async fn get_credentials(&self, request: CredentialsRequest) -> PortalResult<ScmCredentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request);
        Ok(ScmCredentials::bearer(self.token.clone()))
    }
}

/// Test fixtures.
pub mod fixtures {
    use crate::types::*;
    use std::collections::HashMap;

    /// Reference to a `Component` in the default namespace.
    pub fn entity_ref(name: &str) -> EntityRef {
        EntityRef::new("Component", DEFAULT_NAMESPACE, name)
    }

    /// A bare `Component`.
    pub fn entity(name: &str) -> Entity {
        Entity {
            api_version: "backstage.io/v1alpha1".to_string(),
            kind: "Component".to_string(),
            metadata: EntityMeta {
                name: name.to_string(),
                namespace: Some(DEFAULT_NAMESPACE.to_string()),
                ..Default::default()
            },
            spec: serde_json::json!({
                "type": "service",
                "owner": "team-a",
                "lifecycle": "production",
            }),
            relations: vec![],
        }
    }

    /// A `Component` whose source lives at `location`.
    pub fn entity_with_source(name: &str, location: &str) -> Entity {
        let mut entity = entity(name);
        entity.metadata.annotations = HashMap::from([(
            SOURCE_LOCATION_ANNOTATION.to_string(),
            location.to_string(),
        )]);
        entity
    }

    /// Entity metadata as the docs backend returns it.
    pub fn entity_metadata(name: &str) -> TechDocsEntityMetadata {
        TechDocsEntityMetadata {
            entity: entity_with_source(name, &format!("url:https://github.com/acme/{}/tree/main/", name)),
            location_metadata: Some(LocationSpec {
                location_type: "url".to_string(),
                target: format!("https://github.com/acme/{}/tree/main/catalog-info.yaml", name),
            }),
        }
    }

    /// Docs site metadata.
    pub fn techdocs_metadata(site_name: &str) -> TechDocsMetadata {
        TechDocsMetadata {
            site_name: site_name.to_string(),
            site_description: format!("Documentation for {}", site_name),
            etag: Some("etag-1".to_string()),
            build_timestamp: None,
            files: Some(vec!["index.html".to_string()]),
        }
    }
}
