// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus subject construction, parsing and identifier validation.

/// Subject of the system reset event.
pub const SYSTEM_RESET: &str = "system.reset";

/// Request types a service consumes from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Access,
    Get,
    Call,
    Auth,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Access => "access",
            RequestType::Get => "get",
            RequestType::Call => "call",
            RequestType::Auth => "auth",
        }
    }
}

/// A request subject split into its protocol parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedSubject<'a> {
    pub request_type: RequestType,
    pub resource: &'a str,
    pub method: Option<&'a str>,
}

/// Parse an inbound request subject.
///
/// `get.<resource>` and `access.<resource>` carry no method;
/// `call.<resource>.<method>` and `auth.<resource>.<method>` carry the
/// method as the final token. Returns `None` for anything else.
pub fn parse_request(subject: &str) -> Option<ParsedSubject<'_>> {
    let (type_token, rest) = subject.split_once('.')?;
    match type_token {
        "get" | "access" => {
            if rest.is_empty() {
                return None;
            }
            let request_type = if type_token == "get" {
                RequestType::Get
            } else {
                RequestType::Access
            };
            Some(ParsedSubject {
                request_type,
                resource: rest,
                method: None,
            })
        }
        "call" | "auth" => {
            let (resource, method) = rest.rsplit_once('.')?;
            if resource.is_empty() || method.is_empty() {
                return None;
            }
            let request_type = if type_token == "call" {
                RequestType::Call
            } else {
                RequestType::Auth
            };
            Some(ParsedSubject {
                request_type,
                resource,
                method: Some(method),
            })
        }
        _ => None,
    }
}

/// Subject of a resource event, `event.<resource>.<name>`.
pub fn event(resource: &str, name: &str) -> String {
    format!("event.{}.{}", resource, name)
}

/// Subject of a connection token event, `conn.<cid>.token`.
pub fn token(cid: &str) -> String {
    format!("conn.{}.token", cid)
}

/// Validate a connection id: non-empty, no subject-active characters.
pub fn valid_cid(cid: &str) -> bool {
    !cid.is_empty() && !cid.contains(['.', '*', '>'])
}

#[cfg(test)]
#[path = "subject_tests.rs"]
mod tests;
