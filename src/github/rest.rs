//! Authenticated GitHub REST client.

use crate::auth::ScmCredentials;
use crate::client::{HttpTransport, RequestAuth, GITHUB_JSON};
use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};

/// GitHub REST client bound to one installation and one token.
#[derive(Clone)]
pub struct RestClient {
    transport: HttpTransport,
    base_url: String,
    auth: RequestAuth,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Creates a REST client.
    pub fn new(transport: HttpTransport, base_url: impl Into<String>, credentials: &ScmCredentials) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: RequestAuth::bearer(credentials.auth_header(), credentials.headers.clone()),
        }
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Makes a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PortalResult<T> {
        let url = self.build_url(path);
        self.transport.get_json(&url, &self.auth, GITHUB_JSON).await
    }

    /// Makes a GET request with query parameters.
    pub async fn get_with_params<T: DeserializeOwned, P: Serialize>(
        &self,
        path: &str,
        params: &P,
    ) -> PortalResult<T> {
        let url = self.build_url(path);
        let query_string = serde_urlencoded::to_string(params).map_err(|e| {
            PortalError::new(
                PortalErrorKind::InvalidParameter,
                format!("Failed to serialize parameters: {}", e),
            )
        })?;

        let full_url = if query_string.is_empty() {
            url
        } else {
            format!("{}?{}", url, query_string)
        };

        self.transport.get_json(&full_url, &self.auth, GITHUB_JSON).await
    }

    /// Makes a POST request.
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> PortalResult<T> {
        let url = self.build_url(path);
        self.transport
            .request_json(Method::POST, &url, &self.auth, Some(body))
            .await
    }

    /// Makes a PATCH request.
    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> PortalResult<T> {
        let url = self.build_url(path);
        self.transport
            .request_json(Method::PATCH, &url, &self.auth, Some(body))
            .await
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, path: &str) -> PortalResult<()> {
        let url = self.build_url(path);
        self.transport
            .request_no_response(Method::DELETE, &url, &self.auth, Option::<&()>::None)
            .await
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;

    #[test]
    fn test_build_url() {
        let transport = HttpTransport::new(&PortalConfig::default()).unwrap();
        let client = RestClient::new(
            transport,
            "https://api.github.com/",
            &ScmCredentials::bearer("ghp_test"),
        );

        assert_eq!(client.base_url(), "https://api.github.com");
        assert_eq!(
            client.build_url("/repos/owner/repo"),
            "https://api.github.com/repos/owner/repo"
        );
        assert_eq!(
            client.build_url("repos/owner/repo"),
            "https://api.github.com/repos/owner/repo"
        );
    }
}
