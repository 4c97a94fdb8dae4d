//! Error types for the portal integrations.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Result type alias for portal operations.
pub type PortalResult<T> = Result<T, PortalError>;

/// Error kinds for categorizing portal errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortalErrorKind {
    // Configuration errors
    /// Invalid base URL.
    InvalidBaseUrl,
    /// Invalid configuration.
    InvalidConfiguration,
    /// No GitHub integration is configured for the requested host.
    UnknownIntegration,

    // Page errors
    /// The catalog entity behind a docs page does not exist (fatal for the page).
    EntityNotFound,
    /// Docs site metadata could not be fetched (advisory only).
    DocsMetadataUnavailable,
    /// A client was requested for the current entity but none is available.
    NoCurrentEntity,
    /// The entity carries no usable source location.
    InvalidSourceLocation,

    // Authentication errors
    /// No credentials available.
    MissingAuth,
    /// Bad credentials.
    BadCredentials,
    /// Token lacks required scopes.
    InsufficientScopes,

    // Authorization errors
    /// Access forbidden.
    Forbidden,

    // Request errors
    /// Request validation failed.
    ValidationError,
    /// Invalid parameter.
    InvalidParameter,
    /// Unprocessable entity (422).
    UnprocessableEntity,

    // Resource errors
    /// Resource not found (404).
    NotFound,
    /// Resource conflict (409).
    Conflict,

    // Rate limit errors
    /// Primary rate limit exceeded.
    PrimaryRateLimitExceeded,
    /// Secondary rate limit exceeded.
    SecondaryRateLimitExceeded,

    // Network errors
    /// Connection failed.
    ConnectionFailed,
    /// Request timeout.
    Timeout,

    // Server errors
    /// Internal server error (500).
    InternalError,
    /// Bad gateway (502).
    BadGateway,
    /// Service unavailable (503).
    ServiceUnavailable,

    // Response errors
    /// Failed to deserialize response.
    DeserializationError,
    /// Unexpected response format.
    UnexpectedFormat,

    // GraphQL errors
    /// GraphQL query error.
    QueryError,
    /// GraphQL rate limit exceeded.
    GraphQlRateLimitExceeded,

    // Docs build errors
    /// The docs backend reported a failed build.
    BuildFailed,

    // Generic
    /// Unknown error.
    Unknown,
}

impl fmt::Display for PortalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl => write!(f, "invalid_base_url"),
            Self::InvalidConfiguration => write!(f, "invalid_configuration"),
            Self::UnknownIntegration => write!(f, "unknown_integration"),
            Self::EntityNotFound => write!(f, "entity_not_found"),
            Self::DocsMetadataUnavailable => write!(f, "docs_metadata_unavailable"),
            Self::NoCurrentEntity => write!(f, "no_current_entity"),
            Self::InvalidSourceLocation => write!(f, "invalid_source_location"),
            Self::MissingAuth => write!(f, "missing_auth"),
            Self::BadCredentials => write!(f, "bad_credentials"),
            Self::InsufficientScopes => write!(f, "insufficient_scopes"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::InvalidParameter => write!(f, "invalid_parameter"),
            Self::UnprocessableEntity => write!(f, "unprocessable_entity"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::PrimaryRateLimitExceeded => write!(f, "primary_rate_limit_exceeded"),
            Self::SecondaryRateLimitExceeded => write!(f, "secondary_rate_limit_exceeded"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::InternalError => write!(f, "internal_error"),
            Self::BadGateway => write!(f, "bad_gateway"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::DeserializationError => write!(f, "deserialization_error"),
            Self::UnexpectedFormat => write!(f, "unexpected_format"),
            Self::QueryError => write!(f, "query_error"),
            Self::GraphQlRateLimitExceeded => write!(f, "graphql_rate_limit_exceeded"),
            Self::BuildFailed => write!(f, "build_failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Rate limit information extracted from GitHub response headers.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Maximum requests allowed.
    pub limit: u32,
    /// Remaining requests in current window.
    pub remaining: u32,
    /// Time when the rate limit resets.
    pub reset_at: DateTime<Utc>,
    /// Retry-After header value in seconds (if present).
    pub retry_after: Option<u64>,
    /// Resource category.
    pub resource: Option<String>,
}

/// Portal error with detailed information.
#[derive(Error, Debug)]
pub struct PortalError {
    kind: PortalErrorKind,
    message: String,
    status_code: Option<u16>,
    request_id: Option<String>,
    documentation_url: Option<String>,
    rate_limit: Option<RateLimitInfo>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(code) = self.status_code {
            write!(f, " (HTTP {})", code)?;
        }
        if let Some(ref id) = self.request_id {
            write!(f, " [request_id: {}]", id)?;
        }
        Ok(())
    }
}

impl PortalError {
    /// Creates a new portal error.
    pub fn new(kind: PortalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            request_id: None,
            documentation_url: None,
            rate_limit: None,
            cause: None,
        }
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the request ID.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Sets the documentation URL.
    pub fn with_documentation_url(mut self, url: impl Into<String>) -> Self {
        self.documentation_url = Some(url.into());
        self
    }

    /// Sets the rate limit info.
    pub fn with_rate_limit(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = Some(info);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &PortalErrorKind {
        &self.kind
    }

    /// Gets the bare error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Gets the request ID.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Gets the documentation URL.
    pub fn documentation_url(&self) -> Option<&str> {
        self.documentation_url.as_deref()
    }

    /// Gets the rate limit info.
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        self.rate_limit.as_ref()
    }

    /// Returns true if this error must stop a docs page from rendering.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, PortalErrorKind::EntityNotFound)
    }

    /// Returns true if this error is informational only for a docs page.
    pub fn is_advisory(&self) -> bool {
        matches!(self.kind, PortalErrorKind::DocsMetadataUnavailable)
    }

    /// Returns true if the error came from authenticating against an SCM.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self.kind,
            PortalErrorKind::MissingAuth
                | PortalErrorKind::BadCredentials
                | PortalErrorKind::InsufficientScopes
                | PortalErrorKind::Forbidden
        )
    }

    /// Returns true for primary, secondary and GraphQL rate limits.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.kind,
            PortalErrorKind::PrimaryRateLimitExceeded
                | PortalErrorKind::SecondaryRateLimitExceeded
                | PortalErrorKind::GraphQlRateLimitExceeded
        )
    }

    /// Creates an error from an HTTP status code and error response.
    pub fn from_response(
        status: u16,
        message: String,
        documentation_url: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        let kind = Self::kind_from_status(status);
        let mut error = Self::new(kind, message).with_status(status);

        if let Some(url) = documentation_url {
            error = error.with_documentation_url(url);
        }
        if let Some(id) = request_id {
            error = error.with_request_id(id);
        }

        error
    }

    fn kind_from_status(status: u16) -> PortalErrorKind {
        match status {
            400 => PortalErrorKind::ValidationError,
            401 => PortalErrorKind::BadCredentials,
            403 => PortalErrorKind::Forbidden,
            404 => PortalErrorKind::NotFound,
            409 => PortalErrorKind::Conflict,
            422 => PortalErrorKind::UnprocessableEntity,
            429 => PortalErrorKind::SecondaryRateLimitExceeded,
            500 => PortalErrorKind::InternalError,
            502 => PortalErrorKind::BadGateway,
            503 => PortalErrorKind::ServiceUnavailable,
            _ => PortalErrorKind::Unknown,
        }
    }

    /// Re-tags this error with another kind, keeping the message and status.
    pub fn reclassify(mut self, kind: PortalErrorKind) -> Self {
        self.kind = kind;
        self
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::InvalidConfiguration, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::BadCredentials, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::NotFound, message).with_status(404)
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::EntityNotFound, message)
    }

    /// Creates the error returned when no entity is in scope.
    pub fn no_current_entity() -> Self {
        Self::new(
            PortalErrorKind::NoCurrentEntity,
            "No entity is available in the current context",
        )
    }

    /// Creates a primary rate limit error.
    pub fn rate_limited(info: RateLimitInfo) -> Self {
        Self::new(PortalErrorKind::PrimaryRateLimitExceeded, "Rate limit exceeded")
            .with_status(403)
            .with_rate_limit(info)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Timeout, message)
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::DeserializationError, message)
    }
}
