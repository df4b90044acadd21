// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol error object carried in error replies.
//!
//! Wire shape: `{"code": string, "message": string, "data"?: any}`.
//! Codes are dotted strings; the `system.*` codes are predefined by the
//! protocol, applications use their own prefixes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CODE_ACCESS_DENIED: &str = "system.accessDenied";
pub const CODE_NOT_FOUND: &str = "system.notFound";
pub const CODE_METHOD_NOT_FOUND: &str = "system.methodNotFound";
pub const CODE_INVALID_PARAMS: &str = "system.invalidParams";
pub const CODE_INVALID_QUERY: &str = "system.invalidQuery";
pub const CODE_INTERNAL_ERROR: &str = "system.internalError";
pub const CODE_TIMEOUT: &str = "system.timeout";

/// A protocol-level error, sent to the gateway inside an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Error {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach additional error data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Replace the default message of a predefined error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn access_denied() -> Self {
        Self::new(CODE_ACCESS_DENIED, "Access denied")
    }

    pub fn not_found() -> Self {
        Self::new(CODE_NOT_FOUND, "Not found")
    }

    pub fn method_not_found() -> Self {
        Self::new(CODE_METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(CODE_INVALID_PARAMS, "Invalid parameters")
    }

    pub fn invalid_query() -> Self {
        Self::new(CODE_INVALID_QUERY, "Invalid query")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL_ERROR, message)
    }

    pub fn timeout() -> Self {
        Self::new(CODE_TIMEOUT, "Request timeout")
    }

    /// True for the predefined `system.*` codes.
    pub fn is_system(&self) -> bool {
        self.code.starts_with("system.")
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
