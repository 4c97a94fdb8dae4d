//! GitHub REST and GraphQL clients resolved from hosts or catalog entities.

pub mod api;
pub mod factory;
pub mod graphql;
pub mod rest;
pub mod scopes;
pub mod source;

pub use api::{GithubOctokitApi, GraphqlWithOwnerRepo, RestWithOwnerRepo, ScmGithubOctokitApi};
pub use factory::{AsyncState, ClientRequest, EntityContext, GithubClientFactory, SharedResult};
pub use graphql::{GraphQLError, GraphQLLocation, GraphQLResponse, GraphqlClient};
pub use rest::RestClient;
pub use scopes::{ScopeKey, ScopeSet};
pub use source::{entity_source_location, entity_source_repository, parse_git_url, SourceRepository};
