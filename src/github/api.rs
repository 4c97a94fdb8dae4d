//! Client construction for GitHub hosts and catalog entities.

use super::graphql::GraphqlClient;
use super::rest::RestClient;
use super::source::entity_source_repository;
use crate::auth::{CredentialsRequest, ScmAuthApi, ScmCredentials};
use crate::client::HttpTransport;
use crate::config::{GithubIntegrationConfig, PortalConfig};
use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use crate::types::{Entity, OwnerRepo};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// REST client plus the repository an entity lives in.
#[derive(Debug, Clone)]
pub struct RestWithOwnerRepo {
    /// Client for the entity's host.
    pub client: Arc<RestClient>,
    /// Repository coordinates.
    pub owner_repo: OwnerRepo,
}

/// GraphQL client plus the repository an entity lives in.
#[derive(Debug, Clone)]
pub struct GraphqlWithOwnerRepo {
    /// Client for the entity's host.
    pub client: Arc<GraphqlClient>,
    /// Repository coordinates.
    pub owner_repo: OwnerRepo,
}

/// Builds authenticated GitHub clients.
#[async_trait]
pub trait GithubOctokitApi: Send + Sync {
    /// Gets a REST client for a GitHub host.
    async fn get_rest(&self, hostname: &str, scopes: &[String]) -> PortalResult<Arc<RestClient>>;

    /// Gets a REST client for the host an entity's source lives on.
    async fn get_rest_for_entity(
        &self,
        entity: &Entity,
        scopes: &[String],
    ) -> PortalResult<RestWithOwnerRepo>;

    /// Gets a GraphQL client for a GitHub host.
    async fn get_graphql(&self, hostname: &str, scopes: &[String]) -> PortalResult<Arc<GraphqlClient>>;

    /// Gets a GraphQL client for the host an entity's source lives on.
    async fn get_graphql_for_entity(
        &self,
        entity: &Entity,
        scopes: &[String],
    ) -> PortalResult<GraphqlWithOwnerRepo>;
}

/// Default implementation backed by configured integrations and an
/// [`ScmAuthApi`].
pub struct ScmGithubOctokitApi {
    config: PortalConfig,
    transport: HttpTransport,
    auth: Arc<dyn ScmAuthApi>,
}

impl ScmGithubOctokitApi {
    /// Creates the API.
    pub fn new(config: PortalConfig, auth: Arc<dyn ScmAuthApi>) -> PortalResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self {
            config,
            transport,
            auth,
        })
    }

    async fn credentials_for(&self, hostname: &str, scopes: &[String]) -> PortalResult<ScmCredentials> {
        let credentials = self
            .auth
            .get_credentials(CredentialsRequest::for_host(hostname, scopes))
            .await?;
        debug!(
            host = %hostname,
            token = credentials.token_prefix(),
            "Resolved GitHub credentials"
        );
        Ok(credentials)
    }

    fn integration(&self, hostname: &str) -> PortalResult<&GithubIntegrationConfig> {
        self.config.github_integration(hostname).ok_or_else(|| {
            PortalError::new(
                PortalErrorKind::UnknownIntegration,
                format!("No GitHub integration configured for host {}", hostname),
            )
        })
    }
}

#[async_trait]
impl GithubOctokitApi for ScmGithubOctokitApi {
    async fn get_rest(&self, hostname: &str, scopes: &[String]) -> PortalResult<Arc<RestClient>> {
        let base_url = self.integration(hostname)?.rest_base_url();
        let credentials = self.credentials_for(hostname, scopes).await?;
        Ok(Arc::new(RestClient::new(
            self.transport.clone(),
            base_url,
            &credentials,
        )))
    }

    async fn get_rest_for_entity(
        &self,
        entity: &Entity,
        scopes: &[String],
    ) -> PortalResult<RestWithOwnerRepo> {
        let source = entity_source_repository(entity)?;
        let client = self.get_rest(&source.host, scopes).await?;
        Ok(RestWithOwnerRepo {
            client,
            owner_repo: source.owner_repo,
        })
    }

    async fn get_graphql(&self, hostname: &str, scopes: &[String]) -> PortalResult<Arc<GraphqlClient>> {
        let endpoint = self.integration(hostname)?.graphql_endpoint();
        let credentials = self.credentials_for(hostname, scopes).await?;
        Ok(Arc::new(GraphqlClient::new(
            self.transport.clone(),
            endpoint,
            &credentials,
        )))
    }

    async fn get_graphql_for_entity(
        &self,
        entity: &Entity,
        scopes: &[String],
    ) -> PortalResult<GraphqlWithOwnerRepo> {
        let source = entity_source_repository(entity)?;
        let client = self.get_graphql(&source.host, scopes).await?;
        Ok(GraphqlWithOwnerRepo {
            client,
            owner_repo: source.owner_repo,
        })
    }
}
