use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_ERROR_MESSAGE: &str = "Unknown error. Please, try again.";

/// Error body the backend sends on non-2xx responses. Views use `error`,
/// the activity middleware uses `detail`, a few friendship paths use `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: Option<String>,
    pub detail: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    /// Picks `error`, then `detail`, then `message`; empty strings are skipped.
    pub fn first_message(&self) -> Option<&str> {
        [&self.error, &self.detail, &self.message]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|m| !m.is_empty())
    }

    /// Lenient extraction: non-object bodies and non-string fields are ignored.
    pub fn from_value(body: &Value) -> Self {
        let field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            error: field("error"),
            detail: field("detail"),
            message: field("message"),
        }
    }

    pub fn message_from_value(body: &Value) -> String {
        Self::from_value(body)
            .first_message()
            .unwrap_or(DEFAULT_ERROR_MESSAGE)
            .to_string()
    }
}

#[derive(Debug, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiException {
    pub status: u16,
    pub message: String,
}

impl ApiException {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}
