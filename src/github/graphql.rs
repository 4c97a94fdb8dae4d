//! Authenticated GitHub GraphQL client.

use crate::auth::ScmCredentials;
use crate::client::{HttpTransport, RequestAuth};
use crate::errors::{PortalError, PortalErrorKind, PortalResult};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// GraphQL client bound to one endpoint and one token.
#[derive(Clone)]
pub struct GraphqlClient {
    transport: HttpTransport,
    endpoint: String,
    auth: RequestAuth,
}

impl std::fmt::Debug for GraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GraphqlClient {
    /// Creates a GraphQL client.
    pub fn new(transport: HttpTransport, endpoint: impl Into<String>, credentials: &ScmCredentials) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            auth: RequestAuth::bearer(credentials.auth_header(), credentials.headers.clone()),
        }
    }

    /// Gets the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Executes a GraphQL query with variables.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<serde_json::Value>,
    ) -> PortalResult<GraphQLResponse<T>> {
        self.execute(query, variables, None).await
    }

    /// Executes a GraphQL mutation with variables.
    pub async fn mutation<T: DeserializeOwned>(
        &self,
        mutation: &str,
        variables: Option<serde_json::Value>,
    ) -> PortalResult<GraphQLResponse<T>> {
        self.execute(mutation, variables, None).await
    }

    /// Executes a GraphQL query with an operation name.
    pub async fn query_with_operation<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<serde_json::Value>,
        operation_name: &str,
    ) -> PortalResult<GraphQLResponse<T>> {
        self.execute(query, variables, Some(operation_name)).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<serde_json::Value>,
        operation_name: Option<&str>,
    ) -> PortalResult<GraphQLResponse<T>> {
        let request = GraphQLRequest {
            query: query.to_string(),
            variables,
            operation_name: operation_name.map(String::from),
        };

        let raw: GraphQLRawResponse = self
            .transport
            .request_json(Method::POST, &self.endpoint, &self.auth, Some(&request))
            .await?;

        parse_graphql_response(raw)
    }
}

/// Turns a raw response into a typed one, failing fast on errors that make
/// the data unusable.
fn parse_graphql_response<T: DeserializeOwned>(raw: GraphQLRawResponse) -> PortalResult<GraphQLResponse<T>> {
    let errors = raw
        .errors
        .map(|errs| errs.into_iter().map(GraphQLError::from).collect::<Vec<_>>());

    if let Some(ref err_list) = errors {
        for err in err_list {
            let kind = match err.error_type.as_deref() {
                Some("RATE_LIMITED") => PortalErrorKind::GraphQlRateLimitExceeded,
                Some("FORBIDDEN") => PortalErrorKind::Forbidden,
                Some("INSUFFICIENT_SCOPES") => PortalErrorKind::InsufficientScopes,
                Some("NOT_FOUND") => PortalErrorKind::NotFound,
                _ => continue,
            };
            return Err(PortalError::new(kind, format!("GraphQL error: {}", err.message)));
        }
    }

    let data = raw
        .data
        .filter(|value| !value.is_null())
        .map(|value| {
            serde_json::from_value(value).map_err(|e| {
                PortalError::new(
                    PortalErrorKind::DeserializationError,
                    format!("Failed to deserialize GraphQL data: {}", e),
                )
            })
        })
        .transpose()?;

    Ok(GraphQLResponse { data, errors })
}

#[derive(Debug, Clone, Serialize)]
struct GraphQLRequest {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<serde_json::Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQLRawResponse {
    data: Option<serde_json::Value>,
    errors: Option<Vec<GraphQLRawError>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQLRawError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    path: Option<Vec<serde_json::Value>>,
    locations: Option<Vec<GraphQLLocation>>,
}

/// Typed GraphQL response.
#[derive(Debug, Clone)]
pub struct GraphQLResponse<T> {
    /// Response data (if any).
    pub data: Option<T>,
    /// Non-fatal GraphQL errors.
    pub errors: Option<Vec<GraphQLError>>,
}

impl<T> GraphQLResponse<T> {
    /// Returns true if the response contains errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Consumes the response and returns the data or an error.
    pub fn into_data(self) -> PortalResult<T> {
        self.data.ok_or_else(|| {
            PortalError::new(PortalErrorKind::QueryError, "GraphQL response contains no data")
        })
    }
}

/// GraphQL error item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Error type, e.g. `NOT_FOUND`.
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Path to the failing field.
    pub path: Option<Vec<String>>,
    /// Source locations in the query.
    pub locations: Option<Vec<GraphQLLocation>>,
}

impl From<GraphQLRawError> for GraphQLError {
    fn from(raw: GraphQLRawError) -> Self {
        Self {
            message: raw.message,
            error_type: raw.error_type,
            path: raw.path.map(|p| {
                p.into_iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            }),
            locations: raw.locations,
        }
    }
}

/// Location in GraphQL query source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> GraphQLRawResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_data() {
        let response: GraphQLResponse<serde_json::Value> =
            parse_graphql_response(raw(json!({"data": {"viewer": {"login": "octocat"}}}))).unwrap();
        assert!(!response.has_errors());
        assert_eq!(response.into_data().unwrap()["viewer"]["login"], "octocat");
    }

    #[test]
    fn test_fatal_error_type() {
        let err = parse_graphql_response::<serde_json::Value>(raw(json!({
            "data": null,
            "errors": [{"message": "Could not resolve to a Repository", "type": "NOT_FOUND", "path": ["repository"]}]
        })))
        .unwrap_err();
        assert_eq!(*err.kind(), PortalErrorKind::NotFound);
    }

    #[test]
    fn test_partial_errors_are_kept() {
        let response = parse_graphql_response::<serde_json::Value>(raw(json!({
            "data": {"repository": null},
            "errors": [{"message": "Something odd", "path": ["repository", 0]}]
        })))
        .unwrap();
        assert!(response.has_errors());
        let errors = response.errors.unwrap();
        assert_eq!(errors[0].path, Some(vec!["repository".to_string(), "0".to_string()]));
    }

    #[test]
    fn test_missing_data() {
        let response = parse_graphql_response::<serde_json::Value>(raw(json!({"data": null}))).unwrap();
        let err = response.into_data().unwrap_err();
        assert_eq!(*err.kind(), PortalErrorKind::QueryError);
    }
}
