// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event frame construction.
//!
//! Shared by the request object (which buffers frames until its reply)
//! and the resource helper (which publishes immediately). Validation of
//! resource type and event name happens here, before any hook runs.

use std::collections::HashMap;

use res_proto::{
    subject, AddEvent, ChangeEvent, CreateEvent, DeleteEvent, QueryEvent, RemoveEvent, ResetEvent,
    TokenEvent,
};
use serde_json::Value;

use crate::error::Error;
use crate::handler::{Handler, ResourceType};
use crate::outbox::Out;

/// Event names the protocol reserves; custom events must use another.
const RESERVED_EVENTS: &[&str] = &[
    "change",
    "add",
    "remove",
    "create",
    "delete",
    "patch",
    "reaccess",
    "unsubscribe",
    "query",
];

pub(crate) fn change(
    handler: &Handler,
    rname: &str,
    values: &HashMap<String, Value>,
) -> Result<Out, Error> {
    if handler.resource_type() != ResourceType::Model {
        return Err(Error::Usage("change event on non-model resource"));
    }
    frame(rname, "change", &ChangeEvent {
        values: values.clone(),
    })
}

pub(crate) fn add(
    handler: &Handler,
    rname: &str,
    value: &Value,
    idx: usize,
) -> Result<Out, Error> {
    if handler.resource_type() != ResourceType::Collection {
        return Err(Error::Usage("add event on non-collection resource"));
    }
    frame(rname, "add", &AddEvent {
        value: value.clone(),
        idx,
    })
}

pub(crate) fn remove(handler: &Handler, rname: &str, idx: usize) -> Result<Out, Error> {
    if handler.resource_type() != ResourceType::Collection {
        return Err(Error::Usage("remove event on non-collection resource"));
    }
    frame(rname, "remove", &RemoveEvent { idx })
}

pub(crate) fn create(rname: &str, data: &Value) -> Result<Out, Error> {
    frame(rname, "create", &CreateEvent { data: data.clone() })
}

pub(crate) fn delete(rname: &str) -> Result<Out, Error> {
    frame(rname, "delete", &DeleteEvent {})
}

pub(crate) fn custom(rname: &str, event: &str, payload: &Value) -> Result<Out, Error> {
    if RESERVED_EVENTS.contains(&event) {
        return Err(Error::Usage("custom event uses a reserved event name"));
    }
    if event.is_empty() || !event.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidArgument(format!("invalid event name: {}", event)));
    }
    frame(rname, event, payload)
}

pub(crate) fn token(cid: &str, token: Value) -> Result<Out, Error> {
    if !subject::valid_cid(cid) {
        return Err(Error::InvalidArgument(format!(
            "invalid connection id: {}",
            cid
        )));
    }
    Ok(Out::Frame {
        subject: subject::token(cid),
        payload: serde_json::to_vec(&TokenEvent { token })?,
    })
}

pub(crate) fn reset(resources: &[String], access: &[String]) -> Result<Out, Error> {
    Ok(Out::Frame {
        subject: subject::SYSTEM_RESET.to_string(),
        payload: serde_json::to_vec(&ResetEvent {
            resources: resources.to_vec(),
            access: access.to_vec(),
        })?,
    })
}

/// Query event announcing a transient query subject.
pub(crate) fn query_announce(rname: &str, query_subject: &str) -> Result<Out, Error> {
    frame(rname, "query", &QueryEvent {
        subject: query_subject.to_string(),
    })
}

fn frame<T: serde::Serialize>(rname: &str, event: &str, payload: &T) -> Result<Out, Error> {
    Ok(Out::Frame {
        subject: subject::event(rname, event),
        payload: serde_json::to_vec(payload)?,
    })
}
