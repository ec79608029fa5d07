//! GraphQL request execution.
//!
//! [`QueryBackend`] turns a [`GraphqlRequest`] into the `data` member of the
//! response. The production backend posts JSON over reqwest using the
//! transfer crate's retry policy, so query and transfer retries behave alike.

use async_trait::async_trait;
use numerapi_transfer::{AttemptError, RetryPolicy};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::error::{ApiError, ApiResult};

/// One query or mutation to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphqlRequest {
    /// Query text.
    pub query: String,
    /// Variables object, or `null`.
    pub variables: Value,
    /// Whether to send the `Authorization` header.
    #[serde(skip)]
    pub authorization: bool,
}

impl GraphqlRequest {
    /// Unauthenticated request without variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Value::Null,
            authorization: false,
        }
    }

    /// Attach variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Require API keys.
    #[must_use]
    pub const fn authorized(mut self) -> Self {
        self.authorization = true;
        self
    }

    /// First word after `query`/`mutation` and any variable list, for logs.
    pub fn operation_name(&self) -> &str {
        let body = self
            .query
            .split_once('{')
            .map_or(self.query.as_str(), |(_, rest)| rest);
        body.trim_start()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .next()
            .unwrap_or_default()
    }
}

/// Executes GraphQL requests.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Send `request` and return the `data` member of the response.
    async fn execute(&self, request: &GraphqlRequest) -> ApiResult<Value>;
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Value>,
}

/// Messages from an `errors` member: a list of `{message}` or a `{detail}` object.
fn error_messages(errors: &Value) -> Vec<String> {
    match errors {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| item.to_string(), ToString::to_string)
            })
            .collect(),
        Value::Object(map) => vec![
            map.get("detail")
                .and_then(Value::as_str)
                .map_or_else(|| errors.to_string(), ToString::to_string),
        ],
        other => vec![other.to_string()],
    }
}

/// Decode a response body into its `data` member.
pub(crate) fn decode_envelope(body: &[u8]) -> ApiResult<Value> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    if let Some(errors) = envelope.errors.filter(|e| !e.is_null()) {
        return Err(ApiError::Graphql {
            messages: error_messages(&errors),
        });
    }
    match envelope.data {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(ApiError::invalid("response has no data member")),
    }
}

// ============================================================================
// Reqwest Backend
// ============================================================================

/// Production query backend using reqwest.
#[derive(Debug, Clone)]
pub struct HttpQueryBackend {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Option<Credentials>,
    retry: RetryPolicy,
}

impl HttpQueryBackend {
    /// Create a backend for the configured endpoint.
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let endpoint = Url::parse(&config.api_url)?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::ClientBuild)?;
        Ok(Self {
            client,
            endpoint,
            credentials: config.credentials.clone(),
            retry: config.query_retry.clone(),
        })
    }

    async fn post(&self, body: &Value, authorization: Option<&str>) -> Result<Vec<u8>, AttemptError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .json(body);
        if let Some(auth) = authorization {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Connection(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(AttemptError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn execute(&self, request: &GraphqlRequest) -> ApiResult<Value> {
        let authorization = if request.authorization {
            let credentials = self
                .credentials
                .as_ref()
                .ok_or(ApiError::MissingCredentials)?;
            Some(credentials.authorization_header())
        } else {
            None
        };

        debug!(operation = request.operation_name(), "Sending GraphQL request");
        let body = serde_json::to_value(request)?;
        let body = &body;
        let authorization = authorization.as_deref();
        let bytes = self
            .retry
            .run(&self.endpoint, |_attempt| self.post(body, authorization))
            .await
            .map_err(ApiError::from_query_failure)?;

        decode_envelope(&bytes)
    }
}
