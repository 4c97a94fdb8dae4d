//! Configuration types for the portal integrations.

use crate::errors::{PortalError, PortalErrorKind};
use std::time::Duration;

/// Public GitHub host.
pub const GITHUB_COM_HOST: &str = "github.com";

/// REST base URL for github.com.
pub const GITHUB_COM_API_BASE_URL: &str = "https://api.github.com";

/// GraphQL endpoint for github.com.
pub const GITHUB_COM_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Default GitHub API version (date-based).
pub const DEFAULT_API_VERSION: &str = "2022-11-28";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "integrations-portal/0.1.0";

/// Default TechDocs backend base URL.
pub const DEFAULT_TECHDOCS_BASE_URL: &str = "http://localhost:7007/api/techdocs";

/// One GitHub (or GitHub Enterprise) installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubIntegrationConfig {
    /// Host name, e.g. `github.com` or `ghe.example.net`.
    pub host: String,
    /// REST API base URL override.
    pub api_base_url: Option<String>,
    /// GraphQL endpoint override.
    pub graphql_url: Option<String>,
}

impl GithubIntegrationConfig {
    /// Creates an integration for `host` with derived endpoints.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_base_url: None,
            graphql_url: None,
        }
    }

    /// Overrides the REST base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Overrides the GraphQL endpoint.
    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = Some(url.into());
        self
    }

    /// REST base URL for this installation.
    ///
    /// github.com uses the public API host, enterprise installs serve the
    /// API under `/api/v3`.
    pub fn rest_base_url(&self) -> String {
        match &self.api_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.host == GITHUB_COM_HOST => GITHUB_COM_API_BASE_URL.to_string(),
            None => format!("https://{}/api/v3", self.host),
        }
    }

    /// GraphQL endpoint for this installation.
    pub fn graphql_endpoint(&self) -> String {
        match (&self.graphql_url, &self.api_base_url) {
            (Some(url), _) => url.clone(),
            (None, _) if self.host == GITHUB_COM_HOST => GITHUB_COM_GRAPHQL_URL.to_string(),
            (None, Some(api)) if api.trim_end_matches('/').ends_with("/api/v3") => {
                format!("{}/graphql", api.trim_end_matches('/').trim_end_matches("/v3"))
            }
            (None, _) => format!("https://{}/api/graphql", self.host),
        }
    }
}

/// TechDocs backend configuration.
#[derive(Debug, Clone)]
pub struct TechDocsConfig {
    /// Backend API base URL (metadata and sync endpoints).
    pub base_url: String,
    /// Static docs storage URL. Defaults to `{base_url}/static/docs`.
    pub storage_url: Option<String>,
}

impl TechDocsConfig {
    /// Resolved storage URL.
    pub fn storage_url(&self) -> String {
        match &self.storage_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/static/docs", self.base_url.trim_end_matches('/')),
        }
    }
}

impl Default for TechDocsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TECHDOCS_BASE_URL.to_string(),
            storage_url: None,
        }
    }
}

/// Portal integrations configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// TechDocs backend configuration.
    pub techdocs: TechDocsConfig,
    /// Configured GitHub installations.
    pub github: Vec<GithubIntegrationConfig>,
    /// GitHub API version header.
    pub api_version: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            techdocs: TechDocsConfig::default(),
            github: vec![GithubIntegrationConfig::new(GITHUB_COM_HOST)],
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PortalConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder::new()
    }

    /// Finds the GitHub integration serving `host`.
    pub fn github_integration(&self, host: &str) -> Option<&GithubIntegrationConfig> {
        self.github
            .iter()
            .find(|integration| integration.host.eq_ignore_ascii_case(host))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), PortalError> {
        validate_url("TechDocs base URL", &self.techdocs.base_url)?;
        if let Some(ref storage) = self.techdocs.storage_url {
            validate_url("TechDocs storage URL", storage)?;
        }

        for integration in &self.github {
            if integration.host.is_empty() {
                return Err(PortalError::configuration("GitHub integration host cannot be empty"));
            }
            if let Some(ref url) = integration.api_base_url {
                validate_url("GitHub API base URL", url)?;
            }
            if let Some(ref url) = integration.graphql_url {
                validate_url("GitHub GraphQL URL", url)?;
            }
        }

        if self.user_agent.is_empty() {
            return Err(PortalError::configuration("User-Agent is required by GitHub API"));
        }

        Ok(())
    }
}

fn validate_url(what: &str, url: &str) -> Result<(), PortalError> {
    if url.is_empty() {
        return Err(PortalError::new(
            PortalErrorKind::InvalidBaseUrl,
            format!("{} cannot be empty", what),
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(PortalError::new(
            PortalErrorKind::InvalidBaseUrl,
            format!("{} must start with http:// or https://", what),
        ));
    }
    Ok(())
}

/// Builder for PortalConfig.
#[derive(Debug, Default)]
pub struct PortalConfigBuilder {
    techdocs_base_url: Option<String>,
    techdocs_storage_url: Option<String>,
    github: Vec<GithubIntegrationConfig>,
    api_version: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl PortalConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TechDocs backend base URL.
    pub fn techdocs_base_url(mut self, url: impl Into<String>) -> Self {
        self.techdocs_base_url = Some(url.into());
        self
    }

    /// Sets the TechDocs static storage URL.
    pub fn techdocs_storage_url(mut self, url: impl Into<String>) -> Self {
        self.techdocs_storage_url = Some(url.into());
        self
    }

    /// Adds a GitHub integration. Without any, github.com is configured.
    pub fn github_integration(mut self, integration: GithubIntegrationConfig) -> Self {
        self.github.push(integration);
        self
    }

    /// Sets the GitHub API version.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<PortalConfig, PortalError> {
        let github = if self.github.is_empty() {
            vec![GithubIntegrationConfig::new(GITHUB_COM_HOST)]
        } else {
            self.github
        };

        let config = PortalConfig {
            techdocs: TechDocsConfig {
                base_url: self
                    .techdocs_base_url
                    .unwrap_or_else(|| DEFAULT_TECHDOCS_BASE_URL.to_string()),
                storage_url: self.techdocs_storage_url,
            },
            github,
            api_version: self.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}
