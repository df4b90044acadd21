// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound request payload.
//!
//! Every `get.*`, `call.*`, `auth.*` and `access.*` message carries this
//! JSON object. `params` and `token` are kept as raw JSON so the service
//! can hand them to application handlers without re-encoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Decoded body of an inbound request message.
///
/// All fields are optional on the wire; an empty message decodes to the
/// default value.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Connection id assigned by the gateway.
    #[serde(default)]
    pub cid: String,

    /// Request parameters, passed through as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,

    /// Access token, passed through as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Box<RawValue>>,

    /// Query portion of the resource id, e.g. `q=foo&limit=5`.
    #[serde(default)]
    pub query: String,

    /// HTTP headers from the client request (auth requests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<HashMap<String, Vec<String>>>,

    /// Host part of the client request URL (auth requests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Network address of the client (auth requests).
    #[serde(default, rename = "remoteAddr", skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,

    /// Path of the client request URL (auth requests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl RequestPayload {
    /// Decode a request payload, treating an empty body as all-defaults.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
