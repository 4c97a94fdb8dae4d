//! # Developer Portal Integrations
//!
//! State and clients behind two developer portal features:
//! - A docs reader page: entity and docs metadata loading gated on reader
//!   readiness, stale-result guards across navigation, the reader's content
//!   and build-sync state, and a pure layout step producing a view model
//! - A GitHub client factory: REST and GraphQL clients resolved from a host
//!   or a catalog entity, memoized by OAuth scope content
//! - HTTP clients for the docs backend and GitHub
//! - Structured logging and counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_portal::techdocs::{compose, LayoutOptions, RouteParams, TechDocsPageHost};
//! use integrations_portal::{Metrics, PortalConfig, ReaderStateController, TechDocsClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PortalConfig::builder()
//!         .techdocs_base_url("http://localhost:7007/api/techdocs")
//!         .build()?;
//!
//!     let client = Arc::new(TechDocsClient::new(&config)?);
//!     let metrics = Arc::new(Metrics::new());
//!     let reader = ReaderStateController::new(client.clone(), metrics.clone());
//!     let mut host = TechDocsPageHost::new(client, reader, metrics);
//!
//!     let page = host.navigate(RouteParams::parse("/docs/default/Component/my-service")?);
//!     let context = page.wait_for(|ctx| !ctx.is_loading()).await;
//!     let view = compose(&context, &host.reader().state(), LayoutOptions::default());
//!     println!("{:?}", view);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// HTTP transport
pub mod client;

// GitHub clients and factory
pub mod github;

// Docs reader page
pub mod techdocs;

// Observability
pub mod observability;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{CredentialsRequest, EnvScmAuth, ScmAuthApi, ScmCredentials, StaticScmAuth};
pub use config::{GithubIntegrationConfig, PortalConfig, PortalConfigBuilder, TechDocsConfig};
pub use errors::{PortalError, PortalErrorKind, PortalResult};
pub use github::{
    AsyncState, EntityContext, GithubClientFactory, GithubOctokitApi, ScmGithubOctokitApi, ScopeSet,
};
pub use observability::{Metrics, MetricsSnapshot};
pub use techdocs::{
    PageContext, PagePhase, PageView, ReaderStateController, TechDocsApi, TechDocsClient,
    TechDocsPage, TechDocsPageHost, TechDocsStorageApi,
};
pub use types::*;
