//! Keys that decide whether a finished fetch may still be applied.

use crate::types::EntityRef;
use uuid::Uuid;

/// Which page stream a fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStream {
    /// Catalog entity metadata.
    EntityMetadata,
    /// Built docs site metadata.
    DocsMetadata,
}

impl FetchStream {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityMetadata => "entity_metadata",
            Self::DocsMetadata => "docs_metadata",
        }
    }
}

/// Identity of one issued fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    /// Stream the fetch belongs to.
    pub stream: FetchStream,
    /// Page instance that issued it.
    pub page_id: Uuid,
    /// Entity it was issued for.
    pub entity: EntityRef,
    /// Readiness at issue time. Always false for entity metadata.
    pub ready: bool,
}

impl FetchKey {
    /// Key for an entity metadata fetch.
    pub fn entity_metadata(page_id: Uuid, entity: EntityRef) -> Self {
        Self {
            stream: FetchStream::EntityMetadata,
            page_id,
            entity,
            ready: false,
        }
    }

    /// Key for a docs metadata fetch.
    pub fn docs_metadata(page_id: Uuid, entity: EntityRef, ready: bool) -> Self {
        Self {
            stream: FetchStream::DocsMetadata,
            page_id,
            entity,
            ready,
        }
    }
}

/// Tracks the latest key requested on one stream.
#[derive(Debug, Default)]
pub struct FetchGuard {
    latest: Option<FetchKey>,
}

impl FetchGuard {
    /// Records `key` as the only one whose result may be applied.
    pub fn issue(&mut self, key: FetchKey) {
        self.latest = Some(key);
    }

    /// True if a result for `key` may be applied.
    pub fn accepts(&self, key: &FetchKey) -> bool {
        self.latest.as_ref() == Some(key)
    }

    /// True if a fetch has been issued and not yet settled or closed.
    pub fn is_pending(&self) -> bool {
        self.latest.is_some()
    }

    /// Marks the stream as settled for `key`. Returns false if `key` was stale.
    pub fn settle(&mut self, key: &FetchKey) -> bool {
        if self.accepts(key) {
            self.latest = None;
            true
        } else {
            false
        }
    }

    /// Rejects every outstanding result.
    pub fn close(&mut self) {
        self.latest = None;
    }
}

/// Monotonic counter for streams keyed only by recency.
#[derive(Debug, Default, Clone, Copy)]
pub struct Generation(u64);

impl Generation {
    /// Starts a new generation and returns its token.
    pub fn advance(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    /// True if `token` belongs to the current generation.
    pub fn is_current(&self, token: u64) -> bool {
        self.0 == token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> EntityRef {
        EntityRef::new("Component", "default", name)
    }

    #[test]
    fn test_guard_accepts_latest_key_only() {
        let page = Uuid::new_v4();
        let mut guard = FetchGuard::default();

        let first = FetchKey::docs_metadata(page, entity("a"), true);
        guard.issue(first.clone());
        assert!(guard.accepts(&first));

        let other_page = FetchKey::docs_metadata(Uuid::new_v4(), entity("a"), true);
        assert!(!guard.accepts(&other_page));

        let not_ready = FetchKey::docs_metadata(page, entity("a"), false);
        assert!(!guard.accepts(&not_ready));

        assert!(guard.settle(&first));
        assert!(!guard.accepts(&first));
        assert!(!guard.is_pending());
    }

    #[test]
    fn test_closed_guard_rejects_everything() {
        let key = FetchKey::entity_metadata(Uuid::new_v4(), entity("a"));
        let mut guard = FetchGuard::default();
        guard.issue(key.clone());
        guard.close();
        assert!(!guard.settle(&key));
    }

    #[test]
    fn test_generation() {
        let mut generation = Generation::default();
        let first = generation.advance();
        let second = generation.advance();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }
}
