//! Resolves an entity's source location into repository coordinates.

use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use crate::types::{Entity, OwnerRepo, MANAGED_BY_LOCATION_ANNOTATION, SOURCE_LOCATION_ANNOTATION};
use url::Url;

/// Repository an entity's source lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepository {
    /// SCM host, e.g. `github.com`.
    pub host: String,
    /// Owner and repository name.
    pub owner_repo: OwnerRepo,
}

/// Reads the entity's source location annotation, falling back to the
/// location that registered it, and returns the bare target URL.
pub fn entity_source_location(entity: &Entity) -> PortalResult<String> {
    let raw = entity
        .annotation(SOURCE_LOCATION_ANNOTATION)
        .or_else(|| entity.annotation(MANAGED_BY_LOCATION_ANNOTATION))
        .ok_or_else(|| {
            PortalError::new(
                PortalErrorKind::InvalidSourceLocation,
                format!(
                    "Entity {} has no {} annotation",
                    entity.entity_ref(),
                    SOURCE_LOCATION_ANNOTATION
                ),
            )
        })?;

    Ok(strip_location_type(raw).to_string())
}

/// Drops a `url:` / `github:` style type prefix from a location reference.
fn strip_location_type(raw: &str) -> &str {
    match raw.split_once(':') {
        Some((prefix, rest)) if !rest.starts_with("//") && !prefix.is_empty() => rest,
        _ => raw,
    }
}

/// Parses `https://host/owner/repo[.git][/tree/...]`.
pub fn parse_git_url(target: &str) -> PortalResult<SourceRepository> {
    let invalid = |reason: &str| {
        PortalError::new(
            PortalErrorKind::InvalidSourceLocation,
            format!("Cannot parse repository from {}: {}", target, reason),
        )
    };

    let url = Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

    let mut segments = url
        .path_segments()
        .ok_or_else(|| invalid("missing path"))?
        .filter(|segment| !segment.is_empty());

    let owner = segments.next().ok_or_else(|| invalid("missing owner"))?;
    let repo = segments.next().ok_or_else(|| invalid("missing repository"))?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    Ok(SourceRepository {
        host: host.to_string(),
        owner_repo: OwnerRepo {
            owner: owner.to_string(),
            repo: repo.to_string(),
        },
    })
}

/// Resolves the repository for an entity.
pub fn entity_source_repository(entity: &Entity) -> PortalResult<SourceRepository> {
    let target = entity_source_location(entity)?;
    parse_git_url(&target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityMeta;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn entity_with(annotations: &[(&str, &str)]) -> Entity {
        Entity {
            api_version: "backstage.io/v1alpha1".to_string(),
            kind: "Component".to_string(),
            metadata: EntityMeta {
                name: "svc".to_string(),
                annotations: annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
                ..Default::default()
            },
            spec: serde_json::Value::Null,
            relations: vec![],
        }
    }

    #[test]
    fn test_source_location_with_type_prefix() {
        let entity = entity_with(&[(
            SOURCE_LOCATION_ANNOTATION,
            "url:https://github.com/acme/svc/tree/main/",
        )]);

        let repo = entity_source_repository(&entity).unwrap();
        assert_eq!(
            repo,
            SourceRepository {
                host: "github.com".to_string(),
                owner_repo: OwnerRepo {
                    owner: "acme".to_string(),
                    repo: "svc".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_falls_back_to_managed_by_location() {
        let entity = entity_with(&[(
            MANAGED_BY_LOCATION_ANNOTATION,
            "github:https://ghe.example.net/platform/catalog.git",
        )]);

        let repo = entity_source_repository(&entity).unwrap();
        assert_eq!(repo.host, "ghe.example.net");
        assert_eq!(repo.owner_repo.to_string(), "platform/catalog");
    }

    #[test]
    fn test_missing_annotation() {
        let err = entity_source_repository(&entity_with(&[])).unwrap_err();
        assert_eq!(*err.kind(), PortalErrorKind::InvalidSourceLocation);
    }

    #[test]
    fn test_url_without_repo() {
        let err = parse_git_url("https://github.com/acme").unwrap_err();
        assert_eq!(*err.kind(), PortalErrorKind::InvalidSourceLocation);
    }

    #[test]
    fn test_bare_url_is_not_stripped() {
        assert_eq!(
            strip_location_type("https://github.com/acme/svc"),
            "https://github.com/acme/svc"
        );
    }
}
