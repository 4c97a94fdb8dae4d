//! HTTP transport shared by the TechDocs and GitHub clients.

use crate::config::PortalConfig;
use crate::errors::{PortalError, PortalErrorKind, PortalResult, RateLimitInfo};
use crate::observability::{redact_header, TracingHooks};
use chrono::DateTime;
use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Client, Method, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::trace;

/// Accept header for GitHub REST calls.
pub const GITHUB_JSON: &str = "application/vnd.github+json";

/// Accept header for plain JSON backends.
pub const JSON: &str = "application/json";

/// Accept header for server-sent event streams.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Authenticated request parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth {
    /// Authorization header value.
    pub authorization: Option<String>,
    /// Extra headers.
    pub headers: HashMap<String, String>,
}

impl RequestAuth {
    /// No authentication.
    pub fn none() -> Self {
        Self::default()
    }

    /// Bearer authentication with extra headers.
    pub fn bearer(authorization: String, headers: HashMap<String, String>) -> Self {
        Self {
            authorization: Some(authorization),
            headers,
        }
    }
}

/// Thin wrapper over `reqwest` that maps failures to [`PortalError`].
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    user_agent: String,
    api_version: String,
}

impl HttpTransport {
    /// Creates a transport from the portal configuration.
    pub fn new(config: &PortalConfig) -> PortalResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                PortalError::new(
                    PortalErrorKind::InvalidConfiguration,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            http,
            user_agent: config.user_agent.clone(),
            api_version: config.api_version.clone(),
        })
    }

    /// Makes a GET request and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: &RequestAuth,
        accept: &str,
    ) -> PortalResult<T> {
        let response = self
            .execute(Method::GET, url, auth, accept, Option::<&()>::None)
            .await?;
        Self::decode(response).await
    }

    /// Makes a GET request and returns the body as text.
    pub async fn get_text(&self, url: &str, auth: &RequestAuth, accept: &str) -> PortalResult<String> {
        let response = self
            .execute(Method::GET, url, auth, accept, Option::<&()>::None)
            .await?;
        response.text().await.map_err(|e| {
            PortalError::new(
                PortalErrorKind::UnexpectedFormat,
                format!("Failed to read response body: {}", e),
            )
        })
    }

    /// Makes a GET request and returns the successful response unread, for
    /// callers that consume the body as a stream.
    pub async fn get_response(&self, url: &str, auth: &RequestAuth, accept: &str) -> PortalResult<Response> {
        self.execute(Method::GET, url, auth, accept, Option::<&()>::None)
            .await
    }

    /// Makes a request with an optional JSON body and decodes the JSON body.
    pub async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: &str,
        auth: &RequestAuth,
        body: Option<&B>,
    ) -> PortalResult<T> {
        let response = self.execute(method, url, auth, GITHUB_JSON, body).await?;
        Self::decode(response).await
    }

    /// Makes a request and discards the response body.
    pub async fn request_no_response<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        auth: &RequestAuth,
        body: Option<&B>,
    ) -> PortalResult<()> {
        self.execute(method, url, auth, GITHUB_JSON, body).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> PortalResult<T> {
        response.json().await.map_err(|e| {
            PortalError::new(
                PortalErrorKind::DeserializationError,
                format!("Failed to deserialize response: {}", e),
            )
        })
    }

    async fn execute<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        auth: &RequestAuth,
        accept: &str,
        body: Option<&B>,
    ) -> PortalResult<Response> {
        let body_bytes = body.map(serde_json::to_vec).transpose().map_err(|e| {
            PortalError::new(
                PortalErrorKind::InvalidParameter,
                format!("Failed to serialize request body: {}", e),
            )
        })?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, accept);

        if accept == GITHUB_JSON {
            request = request.header("X-GitHub-Api-Version", &self.api_version);
        }
        if let Some(ref authorization) = auth.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        for (name, value) in &auth.headers {
            trace!(header = %name, value = %redact_header(name, value), "Adding request header");
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(bytes) = body_bytes {
            request = request.header(CONTENT_TYPE, JSON).body(bytes);
        }

        TracingHooks::on_request_start(method.as_str(), url);
        let started = Instant::now();

        let response = request.send().await.map_err(|e| {
            let error = if e.is_timeout() {
                PortalError::timeout(format!("Request timed out: {}", e))
            } else if e.is_connect() {
                PortalError::new(
                    PortalErrorKind::ConnectionFailed,
                    format!("Connection failed: {}", e),
                )
            } else {
                PortalError::new(PortalErrorKind::Unknown, format!("Request failed: {}", e))
            };
            TracingHooks::on_request_error(method.as_str(), url, &error.to_string());
            error
        })?;

        let status = response.status();
        TracingHooks::on_request_complete(method.as_str(), url, status.as_u16(), started.elapsed());

        let rate_limit = Self::extract_rate_limit(response.headers());
        if let Some(ref info) = rate_limit {
            TracingHooks::on_rate_limit_update(info);
        }

        if !status.is_success() {
            return Err(Self::handle_error_response(response, rate_limit).await);
        }

        Ok(response)
    }

    /// Extracts GitHub rate limit headers, if all are present.
    pub fn extract_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
        let limit = headers
            .get("x-ratelimit-limit")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())?;

        let remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())?;

        let reset_timestamp: i64 = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())?;

        let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

        let retry_after = headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let resource = headers
            .get("x-ratelimit-resource")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Some(RateLimitInfo {
            limit,
            remaining,
            reset_at,
            retry_after,
            resource,
        })
    }

    async fn handle_error_response(response: Response, rate_limit: Option<RateLimitInfo>) -> PortalError {
        let status = response.status();
        let request_id = response
            .headers()
            .get("x-github-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(info) = rate_limit.as_ref().filter(|info| info.remaining == 0) {
                TracingHooks::on_rate_limit_exceeded(info);
                return PortalError::rate_limited(info.clone());
            }
        }

        let body = response.text().await.unwrap_or_default();
        let (message, documentation_url) = parse_error_body(&body)
            .unwrap_or_else(|| (format!("HTTP {} error", status.as_u16()), None));

        let mut error =
            PortalError::from_response(status.as_u16(), message, documentation_url, request_id);

        if let Some(info) = rate_limit {
            error = error.with_rate_limit(info);
        }

        error
    }
}

/// Pulls a message out of a GitHub (`{message}`) or backend
/// (`{error: {message}}`) error body; falls back to the raw text.
fn parse_error_body(body: &str) -> Option<(String, Option<String>)> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some((trimmed.to_string(), None));
    };

    let documentation_url = value
        .get("documentation_url")
        .and_then(|v| v.as_str())
        .map(String::from);

    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
        })
        .map(String::from)
        .unwrap_or_else(|| trimmed.to_string());

    Some((message, documentation_url))
}
