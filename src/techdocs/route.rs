//! Docs route parameters.

use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use crate::types::EntityRef;

/// Route prefix the docs reader is mounted under.
pub const DOCS_ROUTE_PREFIX: &str = "/docs";

/// Parameters of `/docs/:namespace/:kind/:name/*`.
///
/// Values are taken as they appear in the route. Nothing checks that the
/// entity exists or that the kind is known; a bad route surfaces later as an
/// entity metadata failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteParams {
    /// Entity namespace.
    pub namespace: String,
    /// Entity kind.
    pub kind: String,
    /// Entity name.
    pub name: String,
    /// Page path inside the docs site, possibly empty.
    pub path: String,
}

impl RouteParams {
    /// Creates route parameters directly.
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
            path: path.into(),
        }
    }

    /// Parses a location such as `/docs/default/Component/svc/guides/setup/`.
    ///
    /// The `/docs` prefix is optional. Query string and fragment are dropped.
    pub fn parse(location: &str) -> PortalResult<Self> {
        let location = location
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        let relative = location
            .strip_prefix(DOCS_ROUTE_PREFIX)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(location)
            .trim_start_matches('/');

        let mut parts = relative.splitn(4, '/');
        let mut next = |what: &str| {
            parts
                .next()
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    PortalError::new(
                        PortalErrorKind::InvalidParameter,
                        format!("Docs route {} is missing the {} segment", location, what),
                    )
                })
        };

        let namespace = next("namespace")?;
        let kind = next("kind")?;
        let name = next("name")?;
        let path = parts.next().unwrap_or_default().to_string();

        Ok(Self {
            namespace,
            kind,
            name,
            path,
        })
    }

    /// Entity the route points at.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind.clone(), self.namespace.clone(), self.name.clone())
    }

    /// True if both routes point at the same entity.
    pub fn same_entity(&self, other: &RouteParams) -> bool {
        self.namespace == other.namespace && self.kind == other.kind && self.name == other.name
    }
}
