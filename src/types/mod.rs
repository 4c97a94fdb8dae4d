//! Core data types shared by the TechDocs page and the GitHub client factory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Annotation holding the entity's source code location.
pub const SOURCE_LOCATION_ANNOTATION: &str = "backstage.io/source-location";

/// Annotation holding the location that registered the entity.
pub const MANAGED_BY_LOCATION_ANNOTATION: &str = "backstage.io/managed-by-location";

/// Namespace used when an entity does not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Reference to a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind, e.g. `Component`.
    pub kind: String,
    /// Entity namespace.
    pub namespace: String,
    /// Entity name.
    pub name: String,
}

impl EntityRef {
    /// Creates a new entity reference.
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// URL path segment `namespace/kind/name` used by the docs backend.
    pub fn to_path(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.kind.to_lowercase(),
            self.namespace.to_lowercase(),
            self.name
        )
    }
}

/// Entity metadata block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Entity name.
    pub name: String,
    /// Entity namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Annotations.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Relation from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelation {
    /// Relation type, e.g. `ownedBy`.
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Target entity reference string.
    #[serde(rename = "targetRef")]
    pub target_ref: String,
}

/// Catalog entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// API version of the entity envelope.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Entity kind.
    pub kind: String,
    /// Metadata block.
    pub metadata: EntityMeta,
    /// Kind-specific spec, kept untyped.
    #[serde(default)]
    pub spec: serde_json::Value,
    /// Relations to other entities.
    #[serde(default)]
    pub relations: Vec<EntityRelation>,
}

impl Entity {
    /// Reference to this entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(
            self.kind.clone(),
            self.metadata
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            self.metadata.name.clone(),
        )
    }

    /// Looks up an annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Reads a string field from `spec`.
    pub fn spec_str(&self, field: &str) -> Option<&str> {
        self.spec.get(field).and_then(|value| value.as_str())
    }
}

/// Location an entity was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    /// Location type, e.g. `url`.
    #[serde(rename = "type")]
    pub location_type: String,
    /// Location target.
    pub target: String,
}

/// Entity metadata as returned by the docs backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechDocsEntityMetadata {
    /// The entity itself.
    #[serde(flatten)]
    pub entity: Entity,
    /// Where the entity was read from.
    #[serde(
        rename = "locationMetadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub location_metadata: Option<LocationSpec>,
}

/// Metadata of a built docs site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechDocsMetadata {
    /// Site name from the docs configuration.
    pub site_name: String,
    /// Site description.
    #[serde(default)]
    pub site_description: String,
    /// ETag of the build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Build time, written by the generator as epoch milliseconds.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub build_timestamp: Option<DateTime<Utc>>,
    /// Files included in the build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

/// Repository coordinates parsed from a source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRepo {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl fmt::Display for OwnerRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
