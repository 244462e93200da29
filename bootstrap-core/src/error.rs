//! Error descriptors reported to the control plane

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types sent in the `Lambda-Runtime-Function-Error-Type` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Input bytes could not be decoded into the handler's input type
    DecodeError,
    /// The handler itself returned a failure
    HandlerError,
    /// The handler output could not be encoded
    EncodeError,
    /// A callback handler dropped its completion without resolving it
    CompletionDropped,
    /// The handler panicked while running on the runtime's task
    HandlerPanic,
    /// The runtime failed before entering the invocation loop
    InitError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecodeError => "Runtime.DecodeError",
            Self::HandlerError => "Runtime.HandlerError",
            Self::EncodeError => "Runtime.EncodeError",
            Self::CompletionDropped => "Runtime.CompletionDropped",
            Self::HandlerPanic => "Runtime.HandlerPanic",
            Self::InitError => "Runtime.InitError",
        }
    }
}

/// The only structured error information sent to the control plane.
///
/// On the wire the body is `{"errorMessage": "..."}`; the error type travels
/// in a request header so the body keeps that exact shape.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[error("{error_message}")]
pub struct ErrorDescriptor {
    pub error_message: String,
    #[serde(skip)]
    pub error_type: Option<ErrorType>,
}

impl ErrorDescriptor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            error_type: None,
        }
    }

    pub fn with_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    pub fn message(&self) -> &str {
        &self.error_message
    }

    /// Header value for the error type, falling back to a generic handler error
    pub fn error_type_str(&self) -> &'static str {
        self.error_type.unwrap_or(ErrorType::HandlerError).as_str()
    }

    /// Encode the wire body
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"errorMessage":{}}}"#,
                serde_json::Value::String(self.error_message.clone())
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_format() {
        let descriptor = ErrorDescriptor::new("boom").with_type(ErrorType::HandlerError);

        let json = descriptor.to_json();
        assert_eq!(json, r#"{"errorMessage":"boom"}"#);
        assert_eq!(descriptor.error_type_str(), "Runtime.HandlerError");
    }

    #[test]
    fn test_descriptor_escapes_message() {
        let descriptor = ErrorDescriptor::new(r#"bad "quote""#);

        let decoded: serde_json::Value = serde_json::from_str(&descriptor.to_json()).unwrap();
        assert_eq!(decoded["errorMessage"], r#"bad "quote""#);
    }

    #[test]
    fn test_init_error_header_value() {
        let descriptor = ErrorDescriptor::new("missing _HANDLER").with_type(ErrorType::InitError);

        assert_eq!(descriptor.error_type_str(), "Runtime.InitError");
        assert_eq!(descriptor.to_json(), r#"{"errorMessage":"missing _HANDLER"}"#);
    }

    #[test]
    fn test_untyped_descriptor_falls_back_to_handler_error() {
        assert_eq!(ErrorDescriptor::new("x").error_type_str(), "Runtime.HandlerError");
    }
}
