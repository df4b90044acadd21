// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request state machine and the typed request views handed to handlers.
//!
//! A request moves Received -> Handling -> Responded. Exactly one
//! terminal reply is permitted; events emitted before it are buffered
//! and flushed, in order, immediately ahead of the reply. The typed
//! views expose only the surface valid for each request type, so a get
//! handler cannot emit events at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use res_proto::{encode_reply, Access, GetResult, Ref, Reply, RequestPayload};
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use serde_json::Value;
use tracing::{error, warn};

use crate::emit;
use crate::error::Error;
use crate::handler::Handler;
use crate::outbox::{Out, Outbox, QueryStart};
use crate::query::QueryRequest;
use crate::resource::Resource;

/// Protocol type of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Access,
    Get,
    Call,
    Auth,
}

/// An inbound request being handled.
///
/// Owned by the engine; handlers interact through the typed views.
pub struct Request {
    pub(crate) kind: RequestKind,
    pub(crate) rname: String,
    pub(crate) method: Option<String>,
    pub(crate) payload: RequestPayload,
    pub(crate) path_params: HashMap<String, String>,
    /// Serialization key: resolved group, or the resource name.
    pub(crate) key: String,
    pub(crate) handler: Arc<Handler>,
    pub(crate) reply_to: String,
    pub(crate) outbox: Outbox,
    pub(crate) replied: bool,
    pub(crate) queued: Vec<Out>,
}

impl Request {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.replied {
            return Err(Error::DoubleReply);
        }
        Ok(())
    }

    fn resource_view(&self) -> Resource {
        Resource::new(
            self.rname.clone(),
            self.path_params.clone(),
            self.key.clone(),
            Arc::clone(&self.handler),
            self.outbox.downgrade(),
        )
    }

    /// Send the terminal reply, flushing buffered events first.
    pub(crate) fn send_reply(&mut self, reply: Reply) -> Result<(), Error> {
        self.ensure_open()?;
        self.replied = true;
        for event in std::mem::take(&mut self.queued) {
            self.outbox.send(event);
        }
        self.outbox.frame(self.reply_to.clone(), encode_reply(&reply));
        Ok(())
    }

    /// Advise the gateway to extend its wait. Not a terminal reply.
    pub(crate) fn send_timeout(&mut self, duration: Duration) -> Result<(), Error> {
        self.ensure_open()?;
        let payload = format!("timeout:\"{}\"", duration.as_millis()).into_bytes();
        self.outbox.frame(self.reply_to.clone(), payload);
        Ok(())
    }

    pub(crate) fn reply_ok(&mut self, result: Value) -> Result<(), Error> {
        self.send_reply(Reply::Result(result))
    }

    pub(crate) fn reply_error(&mut self, err: res_proto::Error) -> Result<(), Error> {
        self.send_reply(Reply::Error(err))
    }

    pub(crate) fn reply_resource(&mut self, rid: &str) -> Result<(), Error> {
        self.send_reply(Reply::Resource(Ref::new(rid)))
    }

    pub(crate) fn reply_access(&mut self, access: Access) -> Result<(), Error> {
        if access.is_denied() {
            return self.reply_error(res_proto::Error::access_denied());
        }
        let value = serde_json::to_value(access)?;
        self.send_reply(Reply::Result(value))
    }

    pub(crate) fn reply_model(&mut self, model: Value) -> Result<(), Error> {
        self.reply_get(GetResult::Model(model))
    }

    pub(crate) fn reply_collection(&mut self, collection: Value) -> Result<(), Error> {
        self.reply_get(GetResult::Collection(collection))
    }

    fn reply_get(&mut self, result: GetResult) -> Result<(), Error> {
        let value = serde_json::to_value(result)?;
        self.send_reply(Reply::Result(value))
    }

    fn push_event(&mut self, out: Out) {
        self.queued.push(out);
    }

    fn do_change(&mut self, values: HashMap<String, Value>) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::change(&self.handler, &self.rname, &values)?;
        if let Some(hook) = self.handler.apply_change_fn() {
            hook(&self.resource_view(), &values)?;
        }
        self.push_event(out);
        Ok(())
    }

    fn do_add(&mut self, value: Value, idx: usize) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::add(&self.handler, &self.rname, &value, idx)?;
        if let Some(hook) = self.handler.apply_add_fn() {
            hook(&self.resource_view(), &value, idx)?;
        }
        self.push_event(out);
        Ok(())
    }

    fn do_remove(&mut self, idx: usize) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::remove(&self.handler, &self.rname, idx)?;
        if let Some(hook) = self.handler.apply_remove_fn() {
            hook(&self.resource_view(), idx)?;
        }
        self.push_event(out);
        Ok(())
    }

    fn do_create(&mut self, data: Value) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::create(&self.rname, &data)?;
        if let Some(hook) = self.handler.apply_create_fn() {
            hook(&self.resource_view(), &data)?;
        }
        self.push_event(out);
        Ok(())
    }

    fn do_delete(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::delete(&self.rname)?;
        if let Some(hook) = self.handler.apply_delete_fn() {
            hook(&self.resource_view())?;
        }
        self.push_event(out);
        Ok(())
    }

    fn do_custom(&mut self, event: &str, payload: Value) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::custom(&self.rname, event, &payload)?;
        if let Some(hook) = self.handler.apply_custom_fn() {
            hook(&self.resource_view(), event, &payload)?;
        }
        self.push_event(out);
        Ok(())
    }

    fn do_query(
        &mut self,
        callback: impl Fn(&mut QueryRequest) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        self.push_event(Out::StartQuery(QueryStart {
            resource: self.rname.clone(),
            key: self.key.clone(),
            handler: Arc::clone(&self.handler),
            callback: Arc::new(callback),
        }));
        Ok(())
    }

    fn do_token(&mut self, token: Value) -> Result<(), Error> {
        self.ensure_open()?;
        let out = emit::token(&self.payload.cid, token)?;
        self.push_event(out);
        Ok(())
    }
}

/// Close out a handled request: enforce exactly-one-reply and wrap
/// handler failures per protocol rules.
pub(crate) fn finish(mut req: Request, outcome: Result<(), Error>) {
    match outcome {
        Ok(()) => {
            if !req.replied {
                error!(resource = %req.rname, "handler returned without a response");
                let _ = req.reply_error(res_proto::Error::internal_error("missing response"));
            }
        }
        Err(Error::Protocol(err)) => {
            if req.replied {
                warn!(resource = %req.rname, "handler error after response: {}", err);
            } else {
                let _ = req.reply_error(err);
            }
        }
        Err(err) => {
            error!(resource = %req.rname, "handler failed: {}", err);
            if !req.replied {
                let _ = req.reply_error(res_proto::Error::internal_error("Internal error"));
            }
        }
    }
}

/// Map a handler error to a reply, logging non-protocol failures.
pub(crate) fn error_to_reply(err: Error, resource: &str, context: &str) -> Reply {
    match err {
        Error::Protocol(err) => Reply::Error(err),
        other => {
            error!(resource, "{} failed: {}", context, other);
            Reply::Error(res_proto::Error::internal_error("Internal error"))
        }
    }
}

/// View of an access request.
pub struct AccessRequest<'a> {
    pub(crate) req: &'a mut Request,
}

/// View of a get request. Get handlers cannot emit events.
pub struct GetRequest<'a> {
    pub(crate) req: &'a mut Request,
}

/// View of a call request.
pub struct CallRequest<'a> {
    pub(crate) req: &'a mut Request,
}

/// View of an auth request.
pub struct AuthRequest<'a> {
    pub(crate) req: &'a mut Request,
}

/// View of a create request (call with method `new`).
pub struct NewRequest<'a> {
    pub(crate) req: &'a mut Request,
}

macro_rules! impl_request_info {
    ($($view:ident),* $(,)?) => {$(
        impl $view<'_> {
            /// Resource name of the request.
            pub fn resource(&self) -> &str {
                &self.req.rname
            }

            /// Captured value of a pattern parameter.
            pub fn path_param(&self, name: &str) -> Option<&str> {
                self.req.path_params.get(name).map(String::as_str)
            }

            /// Query portion of the resource id.
            pub fn query(&self) -> &str {
                &self.req.payload.query
            }

            /// Connection id of the requesting client.
            pub fn cid(&self) -> &str {
                &self.req.payload.cid
            }

            /// Raw access token JSON, if a token is set.
            pub fn token_raw(&self) -> Option<&str> {
                self.req.payload.token.as_deref().map(RawValue::get)
            }

            /// Deserialize the access token. `None` when no token is set.
            pub fn parse_token<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
                match &self.req.payload.token {
                    Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
                    None => Ok(None),
                }
            }

            /// Advise the gateway to extend its request timeout.
            pub fn timeout(&mut self, duration: Duration) -> Result<(), Error> {
                self.req.send_timeout(duration)
            }

            /// Respond with a not-found error.
            pub fn not_found(&mut self) -> Result<(), Error> {
                self.req.reply_error(res_proto::Error::not_found())
            }

            /// Respond with an invalid-query error.
            pub fn invalid_query(&mut self, message: &str) -> Result<(), Error> {
                let err = if message.is_empty() {
                    res_proto::Error::invalid_query()
                } else {
                    res_proto::Error::invalid_query().with_message(message)
                };
                self.req.reply_error(err)
            }

            /// Respond with an error.
            pub fn error(&mut self, err: res_proto::Error) -> Result<(), Error> {
                self.req.reply_error(err)
            }
        }
    )*};
}

impl_request_info!(AccessRequest, GetRequest, CallRequest, AuthRequest, NewRequest);

macro_rules! impl_request_params {
    ($($view:ident),* $(,)?) => {$(
        impl $view<'_> {
            /// Method name of the request.
            pub fn method(&self) -> &str {
                self.req.method.as_deref().unwrap_or("")
            }

            /// Raw parameter JSON, if parameters were sent.
            pub fn params_raw(&self) -> Option<&str> {
                self.req.payload.params.as_deref().map(RawValue::get)
            }

            /// Deserialize the request parameters. Decoding failures map
            /// to `system.invalidParams` so `?` answers the request.
            pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, Error> {
                let raw = self
                    .req
                    .payload
                    .params
                    .as_deref()
                    .map(RawValue::get)
                    .unwrap_or("null");
                serde_json::from_str(raw).map_err(|e| {
                    Error::Protocol(res_proto::Error::invalid_params().with_message(e.to_string()))
                })
            }

            /// Respond with a method-not-found error.
            pub fn method_not_found(&mut self) -> Result<(), Error> {
                self.req.reply_error(res_proto::Error::method_not_found())
            }

            /// Respond with an invalid-params error.
            pub fn invalid_params(&mut self, message: &str) -> Result<(), Error> {
                let err = if message.is_empty() {
                    res_proto::Error::invalid_params()
                } else {
                    res_proto::Error::invalid_params().with_message(message)
                };
                self.req.reply_error(err)
            }
        }
    )*};
}

impl_request_params!(CallRequest, AuthRequest, NewRequest);

macro_rules! impl_request_events {
    ($($view:ident),* $(,)?) => {$(
        impl $view<'_> {
            /// Emit a change event. Model resources only.
            pub fn change_event(&mut self, values: HashMap<String, Value>) -> Result<(), Error> {
                self.req.do_change(values)
            }

            /// Emit an add event. Collection resources only.
            pub fn add_event(&mut self, value: Value, idx: usize) -> Result<(), Error> {
                self.req.do_add(value, idx)
            }

            /// Emit a remove event. Collection resources only.
            pub fn remove_event(&mut self, idx: usize) -> Result<(), Error> {
                self.req.do_remove(idx)
            }

            /// Emit a create event for this resource.
            pub fn create_event(&mut self, data: Value) -> Result<(), Error> {
                self.req.do_create(data)
            }

            /// Emit a delete event for this resource.
            pub fn delete_event(&mut self) -> Result<(), Error> {
                self.req.do_delete()
            }

            /// Emit a custom event.
            pub fn custom_event(&mut self, event: &str, payload: Value) -> Result<(), Error> {
                self.req.do_custom(event, payload)
            }

            /// Open a query window for this resource.
            pub fn query_event(
                &mut self,
                callback: impl Fn(&mut QueryRequest) -> Result<(), Error> + Send + Sync + 'static,
            ) -> Result<(), Error> {
                self.req.do_query(callback)
            }
        }
    )*};
}

impl_request_events!(AccessRequest, CallRequest, AuthRequest, NewRequest);

impl AccessRequest<'_> {
    /// Respond with the given access.
    ///
    /// A value granting nothing is answered with `system.accessDenied`.
    pub fn access(&mut self, access: Access) -> Result<(), Error> {
        self.req.reply_access(access)
    }

    /// Respond granting full access.
    pub fn granted(&mut self) -> Result<(), Error> {
        self.req.reply_access(Access::granted())
    }

    /// Respond denying all access.
    pub fn denied(&mut self) -> Result<(), Error> {
        self.req.reply_error(res_proto::Error::access_denied())
    }
}

impl GetRequest<'_> {
    /// Respond with a model.
    pub fn model(&mut self, model: Value) -> Result<(), Error> {
        self.req.reply_model(model)
    }

    /// Respond with a collection.
    pub fn collection(&mut self, collection: Value) -> Result<(), Error> {
        self.req.reply_collection(collection)
    }
}

impl CallRequest<'_> {
    /// Respond with a result. Use `Value::Null` for an empty result.
    pub fn ok(&mut self, result: Value) -> Result<(), Error> {
        self.req.reply_ok(result)
    }

    /// Respond with a resource reference.
    pub fn resource_ref(&mut self, rid: &str) -> Result<(), Error> {
        self.req.reply_resource(rid)
    }
}

impl AuthRequest<'_> {
    /// Respond with a result. Use `Value::Null` for an empty result.
    pub fn ok(&mut self, result: Value) -> Result<(), Error> {
        self.req.reply_ok(result)
    }

    /// Set or clear (with `Value::Null`) the token of this connection.
    pub fn token_event(&mut self, token: Value) -> Result<(), Error> {
        self.req.do_token(token)
    }

    /// HTTP headers of the client request.
    pub fn header(&self) -> Option<&HashMap<String, Vec<String>>> {
        self.req.payload.header.as_ref()
    }

    /// Host part of the client request URL.
    pub fn host(&self) -> Option<&str> {
        self.req.payload.host.as_deref()
    }

    /// Network address of the client.
    pub fn remote_addr(&self) -> Option<&str> {
        self.req.payload.remote_addr.as_deref()
    }

    /// Path of the client request URL.
    pub fn uri(&self) -> Option<&str> {
        self.req.payload.uri.as_deref()
    }
}

impl NewRequest<'_> {
    /// Respond with a reference to the created resource.
    pub fn created(&mut self, rid: &str) -> Result<(), Error> {
        self.req.reply_resource(rid)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
