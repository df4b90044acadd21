// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event emission without a request context.
//!
//! A [`Resource`] exposes the same event surface as a request but no
//! response methods. Events publish immediately since there is no reply
//! to order against. Obtained from [`Service::with`](crate::Service::with)
//! (serialized with the resource's other work) or
//! [`Service::resource`](crate::Service::resource) (direct).

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::emit;
use crate::error::Error;
use crate::handler::Handler;
use crate::outbox::{Out, QueryStart, WeakOutbox};
use crate::query::QueryRequest;
use crate::service::{serialization_key, Core};

/// A resolved resource: name, captured parameters and handler.
pub struct Resource {
    rname: String,
    params: HashMap<String, String>,
    /// Serialization key: resolved group, or the resource name.
    key: String,
    handler: Arc<Handler>,
    outbox: WeakOutbox,
}

impl Resource {
    pub(crate) fn new(
        rname: String,
        params: HashMap<String, String>,
        key: String,
        handler: Arc<Handler>,
        outbox: WeakOutbox,
    ) -> Self {
        Self {
            rname,
            params,
            key,
            handler,
            outbox,
        }
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.rname
    }

    /// Captured value of a pattern parameter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Emit a change event. Model resources only.
    pub fn change_event(&self, values: HashMap<String, Value>) -> Result<(), Error> {
        let out = emit::change(&self.handler, &self.rname, &values)?;
        if let Some(hook) = self.handler.apply_change_fn() {
            hook(self, &values)?;
        }
        self.outbox.send(out);
        Ok(())
    }

    /// Emit an add event. Collection resources only.
    pub fn add_event(&self, value: Value, idx: usize) -> Result<(), Error> {
        let out = emit::add(&self.handler, &self.rname, &value, idx)?;
        if let Some(hook) = self.handler.apply_add_fn() {
            hook(self, &value, idx)?;
        }
        self.outbox.send(out);
        Ok(())
    }

    /// Emit a remove event. Collection resources only.
    pub fn remove_event(&self, idx: usize) -> Result<(), Error> {
        let out = emit::remove(&self.handler, &self.rname, idx)?;
        if let Some(hook) = self.handler.apply_remove_fn() {
            hook(self, idx)?;
        }
        self.outbox.send(out);
        Ok(())
    }

    /// Emit a create event for this resource.
    pub fn create_event(&self, data: Value) -> Result<(), Error> {
        let out = emit::create(&self.rname, &data)?;
        if let Some(hook) = self.handler.apply_create_fn() {
            hook(self, &data)?;
        }
        self.outbox.send(out);
        Ok(())
    }

    /// Emit a delete event for this resource.
    pub fn delete_event(&self) -> Result<(), Error> {
        let out = emit::delete(&self.rname)?;
        if let Some(hook) = self.handler.apply_delete_fn() {
            hook(self)?;
        }
        self.outbox.send(out);
        Ok(())
    }

    /// Emit a custom event.
    pub fn custom_event(&self, event: &str, payload: Value) -> Result<(), Error> {
        let out = emit::custom(&self.rname, event, &payload)?;
        if let Some(hook) = self.handler.apply_custom_fn() {
            hook(self, event, &payload)?;
        }
        self.outbox.send(out);
        Ok(())
    }

    /// Open a query window for this resource.
    pub fn query_event(
        &self,
        callback: impl Fn(&mut QueryRequest) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.outbox.send(Out::StartQuery(QueryStart {
            resource: self.rname.clone(),
            key: self.key.clone(),
            handler: Arc::clone(&self.handler),
            callback: Arc::new(callback),
        }));
        Ok(())
    }
}

/// Service context handed to [`Service::with_group`](crate::Service::with_group)
/// callbacks.
///
/// The callback runs while its group's queue holds the serialization
/// slot; through this context it discriminates between group members,
/// resolving any of them as a [`Resource`] for event emission.
pub struct Group {
    group: String,
    core: Weak<Core>,
}

impl Group {
    pub(crate) fn new(group: String, core: Weak<Core>) -> Self {
        Self { group, core }
    }

    /// Group key the callback is serialized under.
    pub fn name(&self) -> &str {
        &self.group
    }

    /// Resolve a resource for event emission, without further
    /// scheduling; the group's queue already serializes this callback.
    pub fn resource(&self, rname: &str) -> Result<Resource, Error> {
        let core = self
            .core
            .upgrade()
            .ok_or(Error::InvalidState("service is not started"))?;
        let found = core
            .router
            .get(rname)
            .ok_or_else(|| Error::NoMatchingPattern(rname.to_string()))?;
        let key = serialization_key(rname, &found);
        Ok(Resource::new(
            rname.to_string(),
            found.params,
            key,
            found.handler,
            core.outbox.downgrade(),
        ))
    }
}
