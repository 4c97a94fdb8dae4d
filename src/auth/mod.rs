//! Credential resolution for source-control hosts.

use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use url::Url;

/// Request for credentials against one SCM URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsRequest {
    /// URL of the host the token is for, e.g. `https://github.com/`.
    pub url: String,
    /// OAuth scopes the caller needs.
    pub scopes: Vec<String>,
}

impl CredentialsRequest {
    /// Creates a request for `https://{host}/`.
    pub fn for_host(host: &str, scopes: &[String]) -> Self {
        Self {
            url: format!("https://{}/", host),
            scopes: scopes.to_vec(),
        }
    }

    /// Host part of the request URL.
    pub fn host(&self) -> PortalResult<String> {
        let url = Url::parse(&self.url).map_err(|e| {
            PortalError::new(
                PortalErrorKind::InvalidParameter,
                format!("Invalid credentials URL {}: {}", self.url, e),
            )
        })?;
        url.host_str().map(str::to_string).ok_or_else(|| {
            PortalError::new(
                PortalErrorKind::InvalidParameter,
                format!("Credentials URL {} has no host", self.url),
            )
        })
    }
}

/// Token issued for an SCM host.
#[derive(Debug, Clone)]
pub struct ScmCredentials {
    /// Access token.
    pub token: SecretString,
    /// Extra headers to send alongside the token.
    pub headers: HashMap<String, String>,
}

impl ScmCredentials {
    /// Creates credentials from a bare token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            headers: HashMap::new(),
        }
    }

    /// Value for the Authorization header.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// Gets the token prefix for logging.
    pub fn token_prefix(&self) -> &'static str {
        let exposed = self.token.expose_secret();
        if exposed.starts_with("ghp_") {
            "ghp_***"
        } else if exposed.starts_with("github_pat_") {
            "github_pat_***"
        } else if exposed.starts_with("gho_") {
            "gho_***"
        } else if exposed.starts_with("ghs_") {
            "ghs_***"
        } else {
            "***"
        }
    }
}

/// Resolves credentials for SCM hosts.
#[async_trait]
pub trait ScmAuthApi: Send + Sync {
    /// Gets credentials for the request's URL with the requested scopes.
    async fn get_credentials(&self, request: CredentialsRequest) -> PortalResult<ScmCredentials>;
}

/// Fixed per-host tokens.
#[derive(Debug, Default)]
pub struct StaticScmAuth {
    tokens: HashMap<String, SecretString>,
}

impl StaticScmAuth {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for `host`.
    pub fn with_token(mut self, host: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens
            .insert(host.into().to_lowercase(), SecretString::new(token.into()));
        self
    }
}

#[async_trait]
impl ScmAuthApi for StaticScmAuth {
    async fn get_credentials(&self, request: CredentialsRequest) -> PortalResult<ScmCredentials> {
        let host = request.host()?.to_lowercase();
        self.tokens
            .get(&host)
            .map(|token| ScmCredentials {
                token: token.clone(),
                headers: HashMap::new(),
            })
            .ok_or_else(|| {
                PortalError::new(
                    PortalErrorKind::MissingAuth,
                    format!("No token configured for {}", host),
                )
            })
    }
}

/// Environment variable token provider.
pub struct EnvScmAuth {
    token_var: String,
}

impl EnvScmAuth {
    /// Creates a provider from the GITHUB_TOKEN environment variable.
    pub fn from_github_token() -> Self {
        Self {
            token_var: "GITHUB_TOKEN".to_string(),
        }
    }

    /// Creates a provider from a custom environment variable.
    pub fn from_env_var(var_name: impl Into<String>) -> Self {
        Self {
            token_var: var_name.into(),
        }
    }
}

#[async_trait]
impl ScmAuthApi for EnvScmAuth {
    async fn get_credentials(&self, _request: CredentialsRequest) -> PortalResult<ScmCredentials> {
        // Re-read on every call so rotated tokens are picked up.
        std::env::var(&self.token_var)
            .map(ScmCredentials::bearer)
            .map_err(|_| {
                PortalError::new(
                    PortalErrorKind::MissingAuth,
                    format!("Environment variable {} not set", self.token_var),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_prefix() {
        assert_eq!(ScmCredentials::bearer("ghp_xxxxxxxxxxxx").token_prefix(), "ghp_***");
        assert_eq!(ScmCredentials::bearer("gho_xxxxxxxxxxxx").token_prefix(), "gho_***");
        assert_eq!(ScmCredentials::bearer("plain").token_prefix(), "***");
    }

    #[test]
    fn test_request_host() {
        let request = CredentialsRequest::for_host("ghe.example.net", &["repo".to_string()]);
        assert_eq!(request.url, "https://ghe.example.net/");
        assert_eq!(request.host().unwrap(), "ghe.example.net");
    }

    #[tokio::test]
    async fn test_static_provider() {
        let auth = StaticScmAuth::new().with_token("GitHub.com", "ghp_test");
        let credentials = auth
            .get_credentials(CredentialsRequest::for_host("github.com", &[]))
            .await
            .unwrap();
        assert_eq!(credentials.auth_header(), "Bearer ghp_test");

        let missing = auth
            .get_credentials(CredentialsRequest::for_host("ghe.example.net", &[]))
            .await
            .unwrap_err();
        assert_eq!(*missing.kind(), PortalErrorKind::MissingAuth);
    }

    #[tokio::test]
    async fn test_env_provider_missing_var() {
        let auth = EnvScmAuth::from_env_var("INTEGRATIONS_PORTAL_TEST_TOKEN_UNSET");
        let err = auth
            .get_credentials(CredentialsRequest::for_host("github.com", &[]))
            .await
            .unwrap_err();
        assert_eq!(*err.kind(), PortalErrorKind::MissingAuth);
    }
}
