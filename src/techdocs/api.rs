//! Docs backend interfaces and their HTTP implementation.

use crate::client::{HttpTransport, RequestAuth, EVENT_STREAM, JSON};
use crate::config::PortalConfig;
use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use crate::types::{EntityRef, TechDocsEntityMetadata, TechDocsMetadata};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use url::Url;

/// Metadata lookups used by the docs page.
#[async_trait]
pub trait TechDocsApi: Send + Sync {
    /// Fetches the catalog entity behind a docs site.
    async fn get_entity_metadata(&self, entity: &EntityRef) -> PortalResult<TechDocsEntityMetadata>;

    /// Fetches the metadata of the built docs site.
    async fn get_techdocs_metadata(&self, entity: &EntityRef) -> PortalResult<TechDocsMetadata>;
}

/// Outcome of a docs sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    /// The stored docs were already current.
    Cached,
    /// A new build was published.
    Updated,
}

/// Content access used by the reader.
#[async_trait]
pub trait TechDocsStorageApi: Send + Sync {
    /// Fetches the rendered HTML of one docs page.
    async fn get_entity_docs(&self, entity: &EntityRef, path: &str) -> PortalResult<String>;

    /// Asks the backend to bring the stored docs up to date. Build output is
    /// forwarded line by line to `logs` while the sync runs.
    async fn sync_entity_docs(
        &self,
        entity: &EntityRef,
        logs: UnboundedSender<String>,
    ) -> PortalResult<SyncResult>;
}

/// HTTP client for the docs backend.
#[derive(Clone)]
pub struct TechDocsClient {
    transport: HttpTransport,
    base_url: Url,
    storage_url: Url,
    auth: RequestAuth,
}

impl std::fmt::Debug for TechDocsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechDocsClient")
            .field("base_url", &self.base_url.as_str())
            .field("storage_url", &self.storage_url.as_str())
            .finish_non_exhaustive()
    }
}

impl TechDocsClient {
    /// Creates a client from the portal configuration.
    pub fn new(config: &PortalConfig) -> PortalResult<Self> {
        config.validate()?;
        Ok(Self {
            transport: HttpTransport::new(config)?,
            base_url: parse_base(&config.techdocs.base_url)?,
            storage_url: parse_base(&config.techdocs.storage_url())?,
            auth: RequestAuth::none(),
        })
    }

    /// Sends a backend identity token with every request.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.auth = RequestAuth::bearer(
            format!("Bearer {}", token.expose_secret()),
            HashMap::new(),
        );
        self
    }

    fn endpoint<'a>(&self, base: &Url, segments: impl IntoIterator<Item = &'a str>) -> PortalResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PortalError::new(
                    PortalErrorKind::InvalidBaseUrl,
                    format!("Cannot append a path to {}", base),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn entity_endpoint(&self, base: &Url, prefix: &[&str], entity: &EntityRef) -> PortalResult<Url> {
        let segments = prefix
            .iter()
            .copied()
            .chain([entity.namespace.as_str(), entity.kind.as_str(), entity.name.as_str()]);
        self.endpoint(base, segments)
    }
}

fn parse_base(raw: &str) -> PortalResult<Url> {
    Url::parse(raw).map_err(|e| {
        PortalError::new(
            PortalErrorKind::InvalidBaseUrl,
            format!("Invalid docs URL {}: {}", raw, e),
        )
    })
}

#[async_trait]
impl TechDocsApi for TechDocsClient {
    async fn get_entity_metadata(&self, entity: &EntityRef) -> PortalResult<TechDocsEntityMetadata> {
        let url = self.entity_endpoint(&self.base_url, &["metadata", "entity"], entity)?;
        debug!(entity = %entity, url = %url, "Fetching entity metadata");
        self.transport.get_json(url.as_str(), &self.auth, JSON).await
    }

    async fn get_techdocs_metadata(&self, entity: &EntityRef) -> PortalResult<TechDocsMetadata> {
        let url = self.entity_endpoint(&self.base_url, &["metadata", "techdocs"], entity)?;
        debug!(entity = %entity, url = %url, "Fetching docs metadata");
        self.transport.get_json(url.as_str(), &self.auth, JSON).await
    }
}

#[async_trait]
impl TechDocsStorageApi for TechDocsClient {
    async fn get_entity_docs(&self, entity: &EntityRef, path: &str) -> PortalResult<String> {
        let page_segments = path.split('/').filter(|segment| !segment.is_empty());
        let mut url = self.entity_endpoint(&self.storage_url, &[], entity)?;
        url = self.endpoint(&url, page_segments.chain(["index.html"]))?;

        debug!(entity = %entity, path = %path, "Fetching docs page");
        self.transport
            .get_text(url.as_str(), &self.auth, "text/html")
            .await
            .map_err(|e| {
                if *e.kind() == PortalErrorKind::NotFound {
                    PortalError::not_found(format!(
                        "Page not found: {}. This could be because there is no index.md file in the root of the docs directory of this repository.",
                        path
                    ))
                } else {
                    e
                }
            })
    }

    async fn sync_entity_docs(
        &self,
        entity: &EntityRef,
        logs: UnboundedSender<String>,
    ) -> PortalResult<SyncResult> {
        let url = self.entity_endpoint(&self.base_url, &["sync"], entity)?;
        debug!(entity = %entity, "Syncing docs");

        let response = self
            .transport
            .get_response(url.as_str(), &self.auth, EVENT_STREAM)
            .await?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                PortalError::new(
                    PortalErrorKind::ConnectionFailed,
                    format!("Sync stream interrupted: {}", e),
                )
                .with_cause(e)
            })?;
            for event in decoder.push(&chunk) {
                if let Some(result) = handle_sync_event(event, &logs)? {
                    return Ok(result);
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if let Some(result) = handle_sync_event(event, &logs)? {
                return Ok(result);
            }
        }

        Err(PortalError::new(
            PortalErrorKind::UnexpectedFormat,
            format!("Sync stream for {} ended without a result", entity),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct SyncFinish {
    updated: bool,
}

fn handle_sync_event(
    event: SseEvent,
    logs: &UnboundedSender<String>,
) -> PortalResult<Option<SyncResult>> {
    match event.event.as_str() {
        "log" => {
            let line = serde_json::from_str::<String>(&event.data).unwrap_or(event.data);
            // The receiver may be gone if the reader moved on.
            let _ = logs.send(line);
            Ok(None)
        }
        "finish" => {
            let finish: SyncFinish = serde_json::from_str(&event.data).map_err(|e| {
                PortalError::deserialization(format!("Invalid sync finish event: {}", e))
            })?;
            Ok(Some(if finish.updated {
                SyncResult::Updated
            } else {
                SyncResult::Cached
            }))
        }
        "error" => {
            let message = serde_json::from_str::<String>(&event.data).unwrap_or(event.data);
            Err(PortalError::new(PortalErrorKind::BuildFailed, message))
        }
        other => {
            warn!(event = %other, "Ignoring unknown sync event");
            Ok(None)
        }
    }
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            if let Some(event) = self.line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events
    }

    fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: self.event.take().unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn event(event: &str, data: &str) -> SseEvent {
        SseEvent {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();

        assert!(decoder.push(b"event: log\ndata: \"Step").is_empty());
        let events = decoder.push(b" 1\"\r\n\r\nevent: finish\ndata: {\"updated\":true}\n\n");

        assert_eq!(
            events,
            vec![
                event("log", "\"Step 1\""),
                event("finish", "{\"updated\":true}"),
            ]
        );
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_ignores_comments_and_joins_data() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keepalive\ndata: a\ndata: b\n\n");
        assert_eq!(events, vec![event("message", "a\nb")]);
    }

    #[test]
    fn test_decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: finish\ndata: {\"updated\":false}").is_empty());
        assert_eq!(decoder.finish(), Some(event("finish", "{\"updated\":false}")));
    }

    #[test]
    fn test_sync_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(handle_sync_event(event("log", "\"building\""), &tx).unwrap(), None);
        assert_eq!(rx.try_recv().unwrap(), "building");

        assert_eq!(
            handle_sync_event(event("finish", "{\"updated\":false}"), &tx).unwrap(),
            Some(SyncResult::Cached)
        );

        let err = handle_sync_event(event("error", "\"mkdocs failed\""), &tx).unwrap_err();
        assert_eq!(*err.kind(), PortalErrorKind::BuildFailed);
        assert_eq!(err.message(), "mkdocs failed");
    }

    #[test]
    fn test_endpoints_are_percent_encoded() {
        let config = PortalConfig::builder()
            .techdocs_base_url("http://backend.local/api/techdocs/")
            .build()
            .unwrap();
        let client = TechDocsClient::new(&config).unwrap();
        let entity = EntityRef::new("Component", "default", "my service");

        let url = client
            .entity_endpoint(&client.base_url, &["metadata", "entity"], &entity)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://backend.local/api/techdocs/metadata/entity/default/Component/my%20service"
        );
    }
}
