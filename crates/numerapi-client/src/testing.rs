//! Scripted query backend for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::graphql::{GraphqlRequest, QueryBackend};

#[derive(Debug, Clone)]
enum Scripted {
    Data(Value),
    Errors(Vec<String>),
}

/// Answers requests by operation name (the first field selected).
///
/// Unscripted operations fail with [`ApiError::InvalidResponse`].
#[derive(Debug, Clone)]
pub struct FakeQueryBackend {
    responses: Arc<Mutex<HashMap<String, Scripted>>>,
    requests: Arc<Mutex<Vec<GraphqlRequest>>>,
    has_credentials: bool,
}

impl Default for FakeQueryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeQueryBackend {
    /// Backend with credentials and no scripted answers.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            has_credentials: true,
        }
    }

    /// Answer `operation` with this `data` member.
    #[must_use]
    pub fn with_response(self, operation: &str, data: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(operation.to_string(), Scripted::Data(data));
        self
    }

    /// Answer `operation` with GraphQL errors.
    #[must_use]
    pub fn with_errors(self, operation: &str, messages: &[&str]) -> Self {
        let messages = messages.iter().map(ToString::to_string).collect();
        self.responses
            .lock()
            .unwrap()
            .insert(operation.to_string(), Scripted::Errors(messages));
        self
    }

    /// Behave as if no API keys were configured.
    #[must_use]
    pub const fn without_credentials(mut self) -> Self {
        self.has_credentials = false;
        self
    }

    /// Requests that reached the backend.
    pub fn requests(&self) -> Vec<GraphqlRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryBackend for FakeQueryBackend {
    async fn execute(&self, request: &GraphqlRequest) -> ApiResult<Value> {
        if request.authorization && !self.has_credentials {
            return Err(ApiError::MissingCredentials);
        }
        self.requests.lock().unwrap().push(request.clone());

        let operation = request.operation_name().to_string();
        let scripted = self.responses.lock().unwrap().get(&operation).cloned();
        match scripted {
            Some(Scripted::Data(data)) => Ok(data),
            Some(Scripted::Errors(messages)) => Err(ApiError::Graphql { messages }),
            None => Err(ApiError::invalid(format!("no scripted response for `{operation}`"))),
        }
    }
}
