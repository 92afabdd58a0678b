use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayErrorCode {
    /// Payload could not be decoded into the expected wire shape.
    InvalidPayload,
    /// Image or tool-result source shape the target protocol cannot express.
    UnsupportedSource,
    /// Content block kind that has no counterpart on the target side.
    UnsupportedContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayError {
    pub code: RelayErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RelayError {
    pub fn new(code: RelayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(RelayErrorCode::InvalidPayload, message)
    }
}

impl Display for RelayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for RelayError {}
