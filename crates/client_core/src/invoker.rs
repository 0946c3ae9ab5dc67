use std::{error::Error as StdError, sync::Arc};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use shared::error::{ApiException, ErrorBody, DEFAULT_ERROR_MESSAGE};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    busy::{BusyGuard, BusyIndicator},
    credentials::{Credential, CredentialProvider},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    endpoint: String,
    method: Method,
    payload: Option<Value>,
    requires_auth: bool,
}

impl ActionDescriptor {
    /// Authenticated by default; every backend route the client uses is.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            payload: None,
            requires_auth: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn with_payload<T: Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_json(serde_json::to_value(payload)?))
    }

    pub fn with_json(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Success { data: Value },
    HttpError { status: u16, message: String },
    NetworkError { cause: String },
    AuthError,
}

#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error(transparent)]
    Http(#[from] ApiException),
    #[error("network error: {cause}")]
    Network { cause: String },
    #[error("no access token available")]
    Auth,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success { .. })
    }

    pub fn into_result(self) -> Result<Value, OutcomeError> {
        match self {
            ActionOutcome::Success { data } => Ok(data),
            ActionOutcome::HttpError { status, message } => {
                Err(ApiException::new(status, message).into())
            }
            ActionOutcome::NetworkError { cause } => Err(OutcomeError::Network { cause }),
            ActionOutcome::AuthError => Err(OutcomeError::Auth),
        }
    }
}

#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    async fn invoke(&self, descriptor: &ActionDescriptor) -> ActionOutcome;
}

/// The busy flag is held only between the credential check and the outcome.
pub struct HttpActionInvoker {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    busy: Arc<dyn BusyIndicator>,
}

impl HttpActionInvoker {
    pub fn new(
        base_url: Url,
        credentials: Arc<dyn CredentialProvider>,
        busy: Arc<dyn BusyIndicator>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url,
            credentials,
            busy,
        }
    }

    async fn send(
        &self,
        descriptor: &ActionDescriptor,
        credential: Option<&Credential>,
    ) -> ActionOutcome {
        let url = match self.base_url.join(descriptor.endpoint()) {
            Ok(url) => url,
            Err(err) => {
                return ActionOutcome::NetworkError {
                    cause: format!("invalid endpoint {}: {err}", descriptor.endpoint()),
                }
            }
        };

        let mut request = self.http.request(descriptor.method().clone(), url);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.bearer());
        }
        if let Some(payload) = descriptor.payload() {
            request = request.json(payload);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return ActionOutcome::NetworkError {
                    cause: error_chain(&err),
                }
            }
        };
        let status = response.status();
        match response.bytes().await {
            Ok(body) => classify_response(status, &body),
            Err(err) => ActionOutcome::NetworkError {
                cause: error_chain(&err),
            },
        }
    }
}

#[async_trait]
impl RemoteInvoker for HttpActionInvoker {
    async fn invoke(&self, descriptor: &ActionDescriptor) -> ActionOutcome {
        let credential = if descriptor.requires_auth() {
            let Some(credential) = self.credentials.access_token() else {
                warn!(
                    method = %descriptor.method(),
                    endpoint = descriptor.endpoint(),
                    "no access token available"
                );
                return ActionOutcome::AuthError;
            };
            Some(credential)
        } else {
            None
        };

        let _busy = BusyGuard::acquire(Arc::clone(&self.busy));
        let outcome = self.send(descriptor, credential.as_ref()).await;
        log_outcome(descriptor, &outcome);
        outcome
    }
}

pub(crate) fn classify_response(status: StatusCode, body: &[u8]) -> ActionOutcome {
    let parsed = serde_json::from_slice::<Value>(body);
    if status.is_success() {
        return match parsed {
            Ok(data) => ActionOutcome::Success { data },
            Err(err) => ActionOutcome::NetworkError {
                cause: format!("invalid JSON in {status} response: {err}"),
            },
        };
    }

    // Error bodies are read leniently: anything unparseable gets the default.
    let message = match parsed {
        Ok(body) => ErrorBody::message_from_value(&body),
        Err(_) => DEFAULT_ERROR_MESSAGE.to_string(),
    };
    ActionOutcome::HttpError {
        status: status.as_u16(),
        message,
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut cause = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        cause.push_str(": ");
        cause.push_str(&inner.to_string());
        source = inner.source();
    }
    cause
}

fn log_outcome(descriptor: &ActionDescriptor, outcome: &ActionOutcome) {
    let method = descriptor.method();
    let endpoint = descriptor.endpoint();
    match outcome {
        ActionOutcome::Success { .. } => info!(%method, endpoint, "remote action succeeded"),
        ActionOutcome::HttpError { status, message } => {
            warn!(%method, endpoint, status, message, "remote action rejected")
        }
        ActionOutcome::NetworkError { cause } => {
            error!(%method, endpoint, cause, "remote action failed in transport")
        }
        ActionOutcome::AuthError => {}
    }
}

#[cfg(test)]
#[path = "tests/invoker_tests.rs"]
mod tests;
