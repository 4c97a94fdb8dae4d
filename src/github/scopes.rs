//! OAuth scope lists used as cache keys.

use std::fmt;

const SCOPE_SEPARATOR: &str = "$$";

/// Ordered list of OAuth scopes requested for a client.
///
/// Two sets compare equal when they hold the same scopes in the same order,
/// regardless of which allocation they came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ScopeSet {
    scopes: Vec<String>,
}

impl ScopeSet {
    /// Creates a scope set from any list of strings.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// The scopes in request order.
    pub fn as_slice(&self) -> &[String] {
        &self.scopes
    }

    /// Stable key derived from the content.
    pub fn key(&self) -> ScopeKey {
        ScopeKey(self.scopes.join(SCOPE_SEPARATOR))
    }

    /// Returns true if no scopes were requested.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl From<&[&str]> for ScopeSet {
    fn from(scopes: &[&str]) -> Self {
        Self::new(scopes.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for ScopeSet {
    fn from(scopes: [&str; N]) -> Self {
        Self::new(scopes)
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        Self { scopes }
    }
}

impl From<&[String]> for ScopeSet {
    fn from(scopes: &[String]) -> Self {
        Self {
            scopes: scopes.to_vec(),
        }
    }
}

/// Joined form of a [`ScopeSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// The joined key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
