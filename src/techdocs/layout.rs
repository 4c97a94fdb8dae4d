//! Composes the page view model from page and reader state.

use super::page::{PageContext, PagePhase};
use super::reader::{ReaderState, ReaderStatus};
use crate::types::{TechDocsEntityMetadata, TechDocsMetadata};

/// Options for [`compose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Offer in-docs search.
    pub with_search: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self { with_search: true }
    }
}

/// View model of the docs page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageView {
    /// The entity could not be loaded.
    NotFound {
        /// Error message.
        message: String,
    },
    /// Normal page.
    Page(PageBody),
}

/// Parts of a normal page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBody {
    /// Header, once any metadata is known.
    pub header: Option<PageHeader>,
    /// Status banner, absent when content is fresh.
    pub status: Option<StatusIndicator>,
    /// Whether to show the search box.
    pub search: bool,
    /// Rendered content.
    pub content: Option<String>,
    /// Advisory message about docs metadata that failed to load.
    pub advisory: Option<String>,
}

/// Page header.
#[derive(Debug, Clone, PartialEq)]
pub struct PageHeader {
    /// Title.
    pub title: String,
    /// Subtitle.
    pub subtitle: String,
    /// Labels shown under the title.
    pub labels: Vec<HeaderLabel>,
}

/// One header label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLabel {
    /// Label name.
    pub label: String,
    /// Label value.
    pub value: String,
    /// Link target.
    pub url: Option<String>,
}

impl HeaderLabel {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
            url: None,
        }
    }
}

/// Severity of a status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Indeterminate progress.
    Progress,
    /// Informational.
    Info,
    /// Good news.
    Success,
    /// Failure.
    Error,
}

/// Status banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    /// Reader status it reflects.
    pub status: ReaderStatus,
    /// Severity.
    pub severity: Severity,
    /// Message text.
    pub message: Option<String>,
}

/// Subtitle used when the site has no description.
pub const DEFAULT_SUBTITLE: &str = "Home";

/// Composes the page view. Pure.
pub fn compose(page: &PageContext, reader: &ReaderState, options: LayoutOptions) -> PageView {
    match page.phase() {
        PagePhase::NotFound(message) => PageView::NotFound { message },
        PagePhase::LoadingMetadata | PagePhase::ReadyPending | PagePhase::Ready => {
            PageView::Page(PageBody {
                header: header(page.entity_metadata(), page.techdocs_metadata()),
                status: status_indicator(reader),
                search: options.with_search && !page.is_ready,
                content: reader.content().map(str::to_string),
                advisory: page
                    .techdocs_metadata_error()
                    .map(|error| error.message().to_string()),
            })
        }
    }
}

fn header(
    entity: Option<&TechDocsEntityMetadata>,
    docs: Option<&TechDocsMetadata>,
) -> Option<PageHeader> {
    if entity.is_none() && docs.is_none() {
        return None;
    }

    let title = docs
        .map(|docs| docs.site_name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| {
            entity.map(|entity| {
                let meta = &entity.entity.metadata;
                meta.title.clone().unwrap_or_else(|| meta.name.clone())
            })
        })
        .unwrap_or_default();

    // Doc sites without a description report the literal "None".
    let subtitle = docs
        .map(|docs| docs.site_description.as_str())
        .filter(|description| !description.is_empty() && *description != "None")
        .unwrap_or(DEFAULT_SUBTITLE)
        .to_string();

    Some(PageHeader {
        title,
        subtitle,
        labels: entity.map(labels).unwrap_or_default(),
    })
}

fn labels(metadata: &TechDocsEntityMetadata) -> Vec<HeaderLabel> {
    let entity = &metadata.entity;
    let mut labels = vec![HeaderLabel::new(
        &entity.kind,
        entity.entity_ref().to_string(),
    )];

    let owners: Vec<&str> = entity
        .relations
        .iter()
        .filter(|relation| relation.relation_type == "ownedBy")
        .map(|relation| relation.target_ref.as_str())
        .collect();
    if !owners.is_empty() {
        labels.push(HeaderLabel::new("Owner", owners.join(", ")));
    } else if let Some(owner) = entity.spec_str("owner") {
        labels.push(HeaderLabel::new("Owner", owner));
    }

    if let Some(lifecycle) = entity.spec_str("lifecycle") {
        labels.push(HeaderLabel::new("Lifecycle", lifecycle));
    }

    if let Some(location) = metadata
        .location_metadata
        .as_ref()
        .filter(|location| location.location_type == "url")
    {
        labels.push(HeaderLabel {
            url: Some(location.target.clone()),
            ..HeaderLabel::new("Source", location.target.clone())
        });
    }

    labels
}

fn status_indicator(reader: &ReaderState) -> Option<StatusIndicator> {
    let status = reader.status();
    let (severity, message) = match status {
        ReaderStatus::ContentFresh => return None,
        ReaderStatus::Checking => (Severity::Progress, None),
        ReaderStatus::InitialBuild => (
            Severity::Info,
            Some("Documentation is accessed for the first time and is being prepared. The subsequent loads are much faster.".to_string()),
        ),
        ReaderStatus::ContentStaleRefreshing => (
            Severity::Info,
            Some("A newer version of this documentation is being prepared and will be available shortly.".to_string()),
        ),
        ReaderStatus::ContentStaleReady => (
            Severity::Success,
            Some("A newer version of this documentation is now available, please refresh to view.".to_string()),
        ),
        ReaderStatus::ContentStaleError => (
            Severity::Error,
            Some(match &reader.sync_error {
                Some(error) => format!("Building a newer version of this documentation failed. {}", error),
                None => "Building a newer version of this documentation failed.".to_string(),
            }),
        ),
        ReaderStatus::ContentNotFound => (
            Severity::Error,
            Some(
                reader
                    .content_error
                    .clone()
                    .or_else(|| reader.sync_error.clone())
                    .unwrap_or_else(|| "Documentation not found".to_string()),
            ),
        ),
    };

    Some(StatusIndicator {
        status,
        severity,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PortalError, PortalErrorKind};
    use crate::techdocs::page::Fetch;
    use crate::techdocs::reader::SyncState;
    use crate::types::{Entity, EntityMeta, EntityRef, EntityRelation, LocationSpec};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;

    fn entity_metadata() -> TechDocsEntityMetadata {
        TechDocsEntityMetadata {
            entity: Entity {
                api_version: "backstage.io/v1alpha1".to_string(),
                kind: "Component".to_string(),
                metadata: EntityMeta {
                    name: "svc".to_string(),
                    title: Some("Service".to_string()),
                    ..Default::default()
                },
                spec: serde_json::json!({"owner": "team-a", "lifecycle": "production"}),
                relations: vec![EntityRelation {
                    relation_type: "ownedBy".to_string(),
                    target_ref: "group:default/team-a".to_string(),
                }],
            },
            location_metadata: Some(LocationSpec {
                location_type: "url".to_string(),
                target: "https://github.com/acme/svc".to_string(),
            }),
        }
    }

    fn docs_metadata(description: &str) -> TechDocsMetadata {
        TechDocsMetadata {
            site_name: "Service Docs".to_string(),
            site_description: description.to_string(),
            etag: None,
            build_timestamp: None,
            files: None,
        }
    }

    fn page() -> PageContext {
        PageContext {
            page_id: Uuid::new_v4(),
            entity_ref: EntityRef::new("Component", "default", "svc"),
            entity_metadata: Fetch::Loading,
            techdocs_metadata: Fetch::Idle,
            is_ready: false,
        }
    }

    fn fresh_reader(content: &str) -> ReaderState {
        ReaderState {
            content: Some(content.to_string()),
            sync: SyncState::UpToDate,
            ..Default::default()
        }
    }

    fn body(view: PageView) -> PageBody {
        match view {
            PageView::Page(body) => body,
            PageView::NotFound { message } => panic!("unexpected not found: {}", message),
        }
    }

    #[test]
    fn test_not_found() {
        let mut ctx = page();
        ctx.entity_metadata = Fetch::Failed(Arc::new(PortalError::not_found("missing")));

        let view = compose(&ctx, &fresh_reader("<p/>"), LayoutOptions::default());
        assert_eq!(view, PageView::NotFound { message: "missing".to_string() });
    }

    #[test]
    fn test_loading_page_has_no_header() {
        let view = body(compose(&page(), &ReaderState::default(), LayoutOptions::default()));
        assert_eq!(view.header, None);
        assert_eq!(view.status.unwrap().severity, Severity::Progress);
        assert!(view.search);
        assert_eq!(view.content, None);
    }

    #[test]
    fn test_header_prefers_docs_metadata() {
        let mut ctx = page();
        ctx.entity_metadata = Fetch::Loaded(entity_metadata());
        ctx.techdocs_metadata = Fetch::Loaded(docs_metadata("None"));
        ctx.is_ready = true;

        let view = body(compose(&ctx, &fresh_reader("<p/>"), LayoutOptions::default()));
        let header = view.header.unwrap();
        assert_eq!(header.title, "Service Docs");
        assert_eq!(header.subtitle, DEFAULT_SUBTITLE);
        assert_eq!(
            header.labels,
            vec![
                HeaderLabel::new("Component", "component:default/svc"),
                HeaderLabel::new("Owner", "group:default/team-a"),
                HeaderLabel::new("Lifecycle", "production"),
                HeaderLabel {
                    label: "Source".to_string(),
                    value: "https://github.com/acme/svc".to_string(),
                    url: Some("https://github.com/acme/svc".to_string()),
                },
            ]
        );
        assert_eq!(view.status, None);
        assert!(!view.search);
        assert_eq!(view.content.as_deref(), Some("<p/>"));
    }

    #[test]
    fn test_header_falls_back_to_entity_title() {
        let mut ctx = page();
        ctx.entity_metadata = Fetch::Loaded(entity_metadata());

        let header = body(compose(&ctx, &fresh_reader("<p/>"), LayoutOptions::default()))
            .header
            .unwrap();
        assert_eq!(header.title, "Service");
        assert_eq!(header.subtitle, DEFAULT_SUBTITLE);
    }

    #[test]
    fn test_search_respects_option() {
        let view = body(compose(
            &page(),
            &ReaderState::default(),
            LayoutOptions { with_search: false },
        ));
        assert!(!view.search);
    }

    #[test]
    fn test_empty_content_is_omitted() {
        let view = body(compose(&page(), &fresh_reader(""), LayoutOptions::default()));
        assert_eq!(view.content, None);
        assert_eq!(view.status.unwrap().status, ReaderStatus::ContentNotFound);
    }

    #[test]
    fn test_docs_metadata_error_is_advisory() {
        let mut ctx = page();
        ctx.entity_metadata = Fetch::Loaded(entity_metadata());
        ctx.is_ready = true;
        ctx.techdocs_metadata = Fetch::Failed(Arc::new(PortalError::new(
            PortalErrorKind::DocsMetadataUnavailable,
            "metadata missing",
        )));

        let view = body(compose(&ctx, &fresh_reader("<p/>"), LayoutOptions::default()));
        assert_eq!(view.advisory.as_deref(), Some("metadata missing"));
        assert_eq!(view.content.as_deref(), Some("<p/>"));
    }

    #[test]
    fn test_stale_error_message() {
        let reader = ReaderState {
            content: Some("<p/>".to_string()),
            sync: SyncState::Error,
            sync_error: Some("mkdocs exited with 1".to_string()),
            ..Default::default()
        };
        let status = body(compose(&page(), &reader, LayoutOptions::default()))
            .status
            .unwrap();
        assert_eq!(status.severity, Severity::Error);
        assert!(status.message.unwrap().ends_with("mkdocs exited with 1"));
    }
}
