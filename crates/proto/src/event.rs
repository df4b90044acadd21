// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event payloads published on `event.<resource>.<name>` subjects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sentinel value marking a model property as deleted in a change event.
///
/// Serializes to the literal `{"action":"delete"}`.
pub fn delete_action() -> Value {
    json!({"action": "delete"})
}

/// Payload of a model change event: the new property values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub values: HashMap<String, Value>,
}

/// Payload of a collection add event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddEvent {
    pub value: Value,
    pub idx: usize,
}

/// Payload of a collection remove event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveEvent {
    pub idx: usize,
}

/// Payload of a resource create event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEvent {
    pub data: Value,
}

/// Payload of a resource delete event: an empty object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEvent {}

/// Payload of a connection token event. A null token clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub token: Value,
}

/// Payload of a `system.reset` event.
///
/// Both lists are always present on the wire, empty or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetEvent {
    pub resources: Vec<String>,
    pub access: Vec<String>,
}

/// Payload of a query event, announcing the transient query subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEvent {
    pub subject: String,
}

/// Body of a request arriving on a transient query subject.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

/// Result payload answering a query request: the events that apply to
/// the given query, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub events: Vec<QueryEventEntry>,
}

/// A single event inside a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEventEntry {
    pub event: String,
    pub data: Value,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
