// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply envelope and result payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Reply envelope published on the request's reply subject.
///
/// Serializes externally tagged, so each variant produces exactly one of
/// `{"result": ...}`, `{"resource": {"rid": ...}}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    #[serde(rename = "result")]
    Result(Value),

    #[serde(rename = "resource")]
    Resource(Ref),

    #[serde(rename = "error")]
    Error(Error),
}

/// Encode a reply, falling back to a canned internal error on failure.
///
/// Encoding only fails on pathological values (e.g. non-string map keys);
/// the fallback keeps the exactly-one-reply invariant intact.
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    serde_json::to_vec(reply).unwrap_or_else(|_| {
        br#"{"error":{"code":"system.internalError","message":"Internal error: failed to encode response"}}"#
            .to_vec()
    })
}

/// A resource reference, serialized as `{"rid": string}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub rid: String,
}

impl Ref {
    pub fn new(rid: impl Into<String>) -> Self {
        Self { rid: rid.into() }
    }
}

/// Content of a successful get reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GetResult {
    #[serde(rename = "model")]
    Model(Value),

    #[serde(rename = "collection")]
    Collection(Value),
}

/// Access granted to a connection, as returned in an access reply.
///
/// `call` is a comma-separated list of callable methods, with `"*"`
/// meaning all methods. A value granting nothing is answered with a
/// `system.accessDenied` error instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub get: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,
}

impl Access {
    /// Full access: get plus all call methods.
    pub fn granted() -> Self {
        Self {
            get: true,
            call: Some("*".to_string()),
        }
    }

    /// No access at all.
    pub fn denied() -> Self {
        Self {
            get: false,
            call: None,
        }
    }

    /// Granular access to get and a set of call methods.
    pub fn new(get: bool, call: impl Into<String>) -> Self {
        let call = call.into();
        Self {
            get,
            call: if call.is_empty() { None } else { Some(call) },
        }
    }

    /// True when this value grants nothing.
    pub fn is_denied(&self) -> bool {
        !self.get && self.call.as_deref().unwrap_or("").is_empty()
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
