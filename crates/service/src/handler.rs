// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler capability model.
//!
//! A handler is an explicit record of the operations it supports. The
//! dispatcher inspects the record before invoking anything, so an
//! unsupported request is answered without entering application code.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::Error;
use crate::request::{AccessRequest, AuthRequest, CallRequest, GetRequest, NewRequest};
use crate::resource::Resource;

pub type AccessFn = Box<dyn Fn(AccessRequest<'_>) -> Result<(), Error> + Send + Sync>;
pub type GetFn = Box<dyn Fn(GetRequest<'_>) -> Result<(), Error> + Send + Sync>;
pub type CallFn = Box<dyn Fn(CallRequest<'_>) -> Result<(), Error> + Send + Sync>;
pub type AuthFn = Box<dyn Fn(AuthRequest<'_>) -> Result<(), Error> + Send + Sync>;
pub type NewFn = Box<dyn Fn(NewRequest<'_>) -> Result<(), Error> + Send + Sync>;

pub type ApplyChangeFn =
    Box<dyn Fn(&Resource, &HashMap<String, Value>) -> Result<(), Error> + Send + Sync>;
pub type ApplyAddFn = Box<dyn Fn(&Resource, &Value, usize) -> Result<(), Error> + Send + Sync>;
pub type ApplyRemoveFn = Box<dyn Fn(&Resource, usize) -> Result<(), Error> + Send + Sync>;
pub type ApplyCreateFn = Box<dyn Fn(&Resource, &Value) -> Result<(), Error> + Send + Sync>;
pub type ApplyDeleteFn = Box<dyn Fn(&Resource) -> Result<(), Error> + Send + Sync>;
pub type ApplyCustomFn = Box<dyn Fn(&Resource, &str, &Value) -> Result<(), Error> + Send + Sync>;

/// Resource type a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceType {
    #[default]
    Unset,
    Model,
    Collection,
}

/// Capability record for a resource pattern.
///
/// Built fluently and registered with
/// [`Service::add_handler`](crate::Service::add_handler):
///
/// ```ignore
/// Handler::model()
///     .access(|mut r| r.granted())
///     .get(move |mut r| r.model(store.read()))
///     .call("set", move |mut r| { /* ... */ r.ok(Value::Null) })
/// ```
#[derive(Default)]
pub struct Handler {
    resource_type: ResourceType,
    access: Option<AccessFn>,
    get: Option<GetFn>,
    calls: HashMap<String, CallFn>,
    auths: HashMap<String, AuthFn>,
    new_call: Option<NewFn>,
    apply_change: Option<ApplyChangeFn>,
    apply_add: Option<ApplyAddFn>,
    apply_remove: Option<ApplyRemoveFn>,
    apply_create: Option<ApplyCreateFn>,
    apply_delete: Option<ApplyDeleteFn>,
    apply_custom: Option<ApplyCustomFn>,
}

impl Handler {
    /// Handler without a declared resource type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for a model resource.
    pub fn model() -> Self {
        Self {
            resource_type: ResourceType::Model,
            ..Self::default()
        }
    }

    /// Handler for a collection resource.
    pub fn collection() -> Self {
        Self {
            resource_type: ResourceType::Collection,
            ..Self::default()
        }
    }

    /// Serve access requests.
    pub fn access(
        mut self,
        f: impl Fn(AccessRequest<'_>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.access = Some(Box::new(f));
        self
    }

    /// Serve get requests.
    pub fn get(
        mut self,
        f: impl Fn(GetRequest<'_>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.get = Some(Box::new(f));
        self
    }

    /// Serve call requests for `method`. Methods match case-insensitively;
    /// registering the same method twice keeps the last callback.
    pub fn call(
        mut self,
        method: &str,
        f: impl Fn(CallRequest<'_>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.calls.insert(method.to_ascii_lowercase(), Box::new(f));
        self
    }

    /// Serve auth requests for `method`.
    pub fn auth(
        mut self,
        method: &str,
        f: impl Fn(AuthRequest<'_>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.auths.insert(method.to_ascii_lowercase(), Box::new(f));
        self
    }

    /// Serve create requests, i.e. calls with the method `new`.
    pub fn create(
        mut self,
        f: impl Fn(NewRequest<'_>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.new_call = Some(Box::new(f));
        self
    }

    /// Hook invoked before a change event for this resource is published.
    pub fn on_change(
        mut self,
        f: impl Fn(&Resource, &HashMap<String, Value>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.apply_change = Some(Box::new(f));
        self
    }

    /// Hook invoked before an add event is published.
    pub fn on_add(
        mut self,
        f: impl Fn(&Resource, &Value, usize) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.apply_add = Some(Box::new(f));
        self
    }

    /// Hook invoked before a remove event is published.
    pub fn on_remove(
        mut self,
        f: impl Fn(&Resource, usize) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.apply_remove = Some(Box::new(f));
        self
    }

    /// Hook invoked before a create event is published.
    pub fn on_create(
        mut self,
        f: impl Fn(&Resource, &Value) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.apply_create = Some(Box::new(f));
        self
    }

    /// Hook invoked before a delete event is published.
    pub fn on_delete(
        mut self,
        f: impl Fn(&Resource) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.apply_delete = Some(Box::new(f));
        self
    }

    /// Hook invoked before a custom event is published.
    pub fn on_custom(
        mut self,
        f: impl Fn(&Resource, &str, &Value) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.apply_custom = Some(Box::new(f));
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub(crate) fn has_get(&self) -> bool {
        self.get.is_some()
    }

    pub(crate) fn has_access(&self) -> bool {
        self.access.is_some()
    }

    pub(crate) fn access_fn(&self) -> Option<&AccessFn> {
        self.access.as_ref()
    }

    pub(crate) fn get_fn(&self) -> Option<&GetFn> {
        self.get.as_ref()
    }

    pub(crate) fn call_fn(&self, method: &str) -> Option<&CallFn> {
        self.calls.get(&method.to_ascii_lowercase())
    }

    pub(crate) fn auth_fn(&self, method: &str) -> Option<&AuthFn> {
        self.auths.get(&method.to_ascii_lowercase())
    }

    pub(crate) fn new_fn(&self) -> Option<&NewFn> {
        self.new_call.as_ref()
    }

    pub(crate) fn apply_change_fn(&self) -> Option<&ApplyChangeFn> {
        self.apply_change.as_ref()
    }

    pub(crate) fn apply_add_fn(&self) -> Option<&ApplyAddFn> {
        self.apply_add.as_ref()
    }

    pub(crate) fn apply_remove_fn(&self) -> Option<&ApplyRemoveFn> {
        self.apply_remove.as_ref()
    }

    pub(crate) fn apply_create_fn(&self) -> Option<&ApplyCreateFn> {
        self.apply_create.as_ref()
    }

    pub(crate) fn apply_delete_fn(&self) -> Option<&ApplyDeleteFn> {
        self.apply_delete.as_ref()
    }

    pub(crate) fn apply_custom_fn(&self) -> Option<&ApplyCustomFn> {
        self.apply_custom.as_ref()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut calls: Vec<&str> = self.calls.keys().map(String::as_str).collect();
        calls.sort_unstable();
        let mut auths: Vec<&str> = self.auths.keys().map(String::as_str).collect();
        auths.sort_unstable();
        f.debug_struct("Handler")
            .field("resource_type", &self.resource_type)
            .field("access", &self.access.is_some())
            .field("get", &self.get.is_some())
            .field("calls", &calls)
            .field("auths", &auths)
            .field("new", &self.new_call.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
