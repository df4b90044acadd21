// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service lifecycle: configuration, serving, and shutdown.
//!
//! A service is configured while stopped (handlers, owned resources,
//! query duration), then serves a bus connection. Serving subscribes
//! one bus subject per owned pattern per request type, announces itself
//! with `system.reset`, and re-announces after every reconnect.
//! Shutdown closes subscriptions, drains the per-resource queues,
//! expires open query windows and flushes the outbound channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use res_proto::{encode_reply, subject, Access, Reply, RequestPayload};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::conn::{Conn, Msg, NatsConn, Subscription};
use crate::dispatch::Dispatcher;
use crate::emit;
use crate::error::Error;
use crate::handler::Handler;
use crate::outbox::{Out, Outbox, QueryStart};
use crate::pattern::{self, Found, Router};
use crate::query::{self, QueryTimers};
use crate::request::{
    finish, AccessRequest, AuthRequest, CallRequest, GetRequest, NewRequest, Request, RequestKind,
};
use crate::resource::{Group, Resource};

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// A RES service: a set of handlers served over a bus connection.
pub struct Service {
    name: String,
    router: Router,
    query_duration: Duration,
    owned: Option<(Vec<String>, Vec<String>)>,
    default_access: Access,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

struct Lifecycle {
    state: State,
    running: Option<Running>,
}

struct Running {
    core: Arc<Core>,
    shutdown_tx: watch::Sender<bool>,
    publisher: JoinHandle<()>,
}

/// Shared internals of a serving cycle.
pub(crate) struct Core {
    pub router: Router,
    pub outbox: Outbox,
    pub conn: Arc<dyn Conn>,
    pub dispatcher: Dispatcher,
    pub timers: Arc<QueryTimers>,
    pub default_access: Access,
    /// Reset pattern lists: (resources, access).
    pub reset: (Vec<String>, Vec<String>),
    /// Handles of every task belonging to this cycle, awaited on shutdown.
    pub tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Service {
    /// Create a service. `name` becomes the pattern prefix for every
    /// registered handler.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            router: Router::new(name.clone()),
            name,
            query_duration: Duration::from_secs(3),
            owned: None,
            default_access: Access::granted(),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: State::Stopped,
                running: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.lifecycle.lock().state
    }

    /// Register a handler under a pattern (merged with the service name).
    pub fn add_handler(&mut self, pattern: &str, handler: Handler) -> Result<(), Error> {
        self.require_stopped()?;
        self.router.add(pattern, Arc::new(handler), None)
    }

    /// Register a handler with a group label. `${param}` references in
    /// the label resolve to captured pattern parameters; the resolved
    /// label becomes the serialization key for matching resources.
    pub fn add_handler_grouped(
        &mut self,
        pattern: &str,
        group: &str,
        handler: Handler,
    ) -> Result<(), Error> {
        self.require_stopped()?;
        self.router.add(pattern, Arc::new(handler), Some(group))
    }

    /// Override the derived reset pattern lists.
    pub fn set_owned_resources(
        &mut self,
        resources: &[&str],
        access: &[&str],
    ) -> Result<(), Error> {
        self.require_stopped()?;
        self.owned = Some((
            resources.iter().map(|s| s.to_string()).collect(),
            access.iter().map(|s| s.to_string()).collect(),
        ));
        Ok(())
    }

    /// Set how long query windows stay open. Default 3 seconds.
    pub fn set_query_duration(&mut self, duration: Duration) -> Result<(), Error> {
        self.require_stopped()?;
        self.query_duration = duration;
        Ok(())
    }

    /// Access answered when a matched handler has no access capability.
    /// Defaults to full access.
    pub fn set_default_access(&mut self, access: Access) -> Result<(), Error> {
        self.require_stopped()?;
        self.default_access = access;
        Ok(())
    }

    fn require_stopped(&self) -> Result<(), Error> {
        if self.lifecycle.lock().state != State::Stopped {
            return Err(Error::InvalidState(
                "configuration requires a stopped service",
            ));
        }
        Ok(())
    }

    /// Connect to a NATS server and serve on it.
    pub async fn serve_url(&self, url: &str) -> Result<(), Error> {
        let conn = NatsConn::connect(url).await?;
        self.serve(conn).await
    }

    /// Start serving on a bus connection. Returns once the service is
    /// started; use [`Service::shutdown`] to stop.
    pub async fn serve<C: Conn>(&self, conn: C) -> Result<(), Error> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != State::Stopped {
                return Err(Error::InvalidState("serve requires a stopped service"));
            }
            lifecycle.state = State::Starting;
        }

        let running = match self.start(Arc::new(conn)).await {
            Ok(running) => running,
            Err(e) => {
                self.lifecycle.lock().state = State::Stopped;
                return Err(e);
            }
        };

        let core = Arc::clone(&running.core);
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.state = State::Started;
            lifecycle.running = Some(running);
        }

        // Initial reset, suppressed when the service owns nothing
        if !(core.reset.0.is_empty() && core.reset.1.is_empty()) {
            match emit::reset(&core.reset.0, &core.reset.1) {
                Ok(out) => core.outbox.send(out),
                Err(e) => warn!("failed to encode system reset: {}", e),
            }
        }

        info!(service = %self.name, "service started");
        Ok(())
    }

    async fn start(&self, conn: Arc<dyn Conn>) -> Result<Running, Error> {
        let handle = Handle::current();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(handle);
        let timers = Arc::new(QueryTimers::new());
        let tasks: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));
        let reset = self
            .owned
            .clone()
            .unwrap_or_else(|| self.router.reset_patterns());

        let core = Arc::new(Core {
            router: self.router.clone(),
            outbox: Outbox::new(out_tx.clone()),
            conn: Arc::clone(&conn),
            dispatcher: dispatcher.clone(),
            timers: Arc::clone(&timers),
            default_access: self.default_access.clone(),
            reset,
            tasks: Arc::clone(&tasks),
        });

        let ctx = PubCtx {
            conn: Arc::clone(&conn),
            dispatcher,
            timers: Arc::clone(&timers),
            query_duration: self.query_duration,
            tasks: Arc::clone(&tasks),
            out_weak: out_tx.downgrade(),
            shutdown: shutdown_rx.clone(),
        };
        drop(out_tx);
        let publisher = tokio::spawn(publish_loop(out_rx, ctx));

        tasks.lock().push(tokio::spawn(query::run_expirations(
            Arc::clone(&timers),
            shutdown_rx.clone(),
        )));
        tasks.lock().push(tokio::spawn(reconnect_loop(
            Arc::clone(&core),
            shutdown_rx.clone(),
        )));

        // One bus subscription per owned pattern per request type; the
        // router resolves fine-grained matching on arrival. Call and
        // auth subjects carry the method as an extra trailing token, so
        // patterns without a full wildcard get a `.*` suffix there.
        let mut subjects = Vec::new();
        for owned in &core.reset.0 {
            let translated = pattern::subject_pattern(owned);
            let with_method = if translated.ends_with('>') {
                translated.clone()
            } else {
                format!("{}.*", translated)
            };
            subjects.push(format!("get.{}", translated));
            subjects.push(format!("call.{}", with_method));
            subjects.push(format!("auth.{}", with_method));
        }
        for owned in &core.reset.1 {
            subjects.push(format!("access.{}", pattern::subject_pattern(owned)));
        }
        subjects.sort();
        subjects.dedup();

        for subject in subjects {
            match conn.subscribe(&subject).await {
                Ok(sub) => {
                    let task = tokio::spawn(subscription_loop(
                        Arc::clone(&core),
                        sub,
                        shutdown_rx.clone(),
                    ));
                    tasks.lock().push(task);
                }
                Err(e) => {
                    // Partial startup: tear down what already runs
                    let _ = shutdown_tx.send(true);
                    let handles: Vec<_> = tasks.lock().drain(..).collect();
                    for task in handles {
                        let _ = task.await;
                    }
                    drop(core);
                    let _ = publisher.await;
                    return Err(Error::Bus(e));
                }
            }
        }

        Ok(Running {
            core,
            shutdown_tx,
            publisher,
        })
    }

    /// Stop serving: close subscriptions, run queued work to completion,
    /// expire query windows, flush outbound messages. A no-op unless the
    /// service is started.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != State::Started {
                debug!(service = %self.name, "shutdown on a service that is not started");
                return Ok(());
            }
            lifecycle.state = State::Stopping;
            lifecycle.running.take()
        };
        let Some(running) = running else {
            self.lifecycle.lock().state = State::Stopped;
            return Ok(());
        };

        let _ = running.shutdown_tx.send(true);
        let handles: Vec<_> = running.core.tasks.lock().drain(..).collect();
        for task in handles {
            let _ = task.await;
        }
        running.core.dispatcher.drain().await;

        // Release the outbound channel so the publisher drains and exits
        let Running {
            core, publisher, ..
        } = running;
        drop(core);
        let _ = publisher.await;

        self.lifecycle.lock().state = State::Stopped;
        info!(service = %self.name, "service stopped");
        Ok(())
    }

    fn started_core(&self) -> Result<Arc<Core>, Error> {
        let lifecycle = self.lifecycle.lock();
        match (&lifecycle.state, &lifecycle.running) {
            (State::Started, Some(running)) => Ok(Arc::clone(&running.core)),
            _ => Err(Error::InvalidState("service is not started")),
        }
    }

    /// Run a callback on the resource's serialized queue, with a
    /// [`Resource`] for emitting out-of-band events.
    pub fn with(
        &self,
        rname: &str,
        callback: impl FnOnce(Resource) + Send + 'static,
    ) -> Result<(), Error> {
        let core = self.started_core()?;
        let found = core
            .router
            .get(rname)
            .ok_or_else(|| Error::NoMatchingPattern(rname.to_string()))?;
        let key = serialization_key(rname, &found);
        let resource = Resource::new(
            rname.to_string(),
            found.params,
            key.clone(),
            found.handler,
            core.outbox.downgrade(),
        );
        if !core
            .dispatcher
            .enqueue(&key, Box::new(move || callback(resource)))
        {
            return Err(Error::InvalidState("service is stopping"));
        }
        Ok(())
    }

    /// Run a callback serialized under an explicit group key.
    ///
    /// The callback receives a [`Group`] context through which it can
    /// resolve any of the group's member resources and emit events.
    pub fn with_group(
        &self,
        group: &str,
        callback: impl FnOnce(Group) + Send + 'static,
    ) -> Result<(), Error> {
        if group.is_empty() {
            return Err(Error::InvalidArgument("empty group".to_string()));
        }
        let core = self.started_core()?;
        let context = Group::new(group.to_string(), Arc::downgrade(&core));
        if !core
            .dispatcher
            .enqueue(group, Box::new(move || callback(context)))
        {
            return Err(Error::InvalidState("service is stopping"));
        }
        Ok(())
    }

    /// Resolve a resource for direct event emission, without scheduling.
    pub fn resource(&self, rname: &str) -> Result<Resource, Error> {
        let core = self.started_core()?;
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

    /// Set or clear (with `Value::Null`) the token of a connection.
    pub fn token_event(&self, cid: &str, token: Value) -> Result<(), Error> {
        if !subject::valid_cid(cid) {
            return Err(Error::InvalidArgument(format!(
                "invalid connection id: {}",
                cid
            )));
        }
        match self.started_core() {
            Ok(core) => {
                let out = emit::token(cid, token)?;
                core.outbox.send(out);
                Ok(())
            }
            Err(_) => {
                debug!(cid, "token event on a service that is not started");
                Ok(())
            }
        }
    }

    /// Publish a system reset for the given patterns, e.g. after the
    /// underlying data changed outside the service.
    pub fn reset(&self, resources: &[&str], access: &[&str]) -> Result<(), Error> {
        if resources.is_empty() && access.is_empty() {
            return Ok(());
        }
        let core = match self.started_core() {
            Ok(core) => core,
            Err(_) => {
                debug!("reset on a service that is not started");
                return Ok(());
            }
        };
        let resources: Vec<String> = resources.iter().map(|s| s.to_string()).collect();
        let access: Vec<String> = access.iter().map(|s| s.to_string()).collect();
        core.outbox.send(emit::reset(&resources, &access)?);
        Ok(())
    }
}

pub(crate) fn serialization_key(rname: &str, found: &Found) -> String {
    if found.group.is_empty() {
        rname.to_string()
    } else {
        found.group.clone()
    }
}

/// Environment of the publisher task. Holds no strong reference to the
/// outbound sender, so the channel closes once the serving cycle drops.
struct PubCtx {
    conn: Arc<dyn Conn>,
    dispatcher: Dispatcher,
    timers: Arc<QueryTimers>,
    query_duration: Duration,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    out_weak: mpsc::WeakUnboundedSender<Out>,
    shutdown: watch::Receiver<bool>,
}

/// Single consumer of the outbound channel; preserves emission order.
async fn publish_loop(mut rx: mpsc::UnboundedReceiver<Out>, ctx: PubCtx) {
    while let Some(out) = rx.recv().await {
        match out {
            Out::Frame { subject, payload } => {
                if let Err(e) = ctx.conn.publish(&subject, payload).await {
                    warn!(subject, "publish failed: {}", e);
                }
            }
            Out::StartQuery(start) => start_query(&ctx, start).await,
        }
    }
}

/// Open a query window: subscribe the transient subject first, then
/// announce it, so no query request can arrive unheard.
async fn start_query(ctx: &PubCtx, start: QueryStart) {
    if *ctx.shutdown.borrow() {
        debug!(resource = %start.resource, "service stopping, ignoring query event");
        return;
    }
    let Some(out_tx) = ctx.out_weak.upgrade() else {
        return;
    };
    let transient = format!("_QUERY.{}", uuid::Uuid::new_v4().simple());
    let sub = match ctx.conn.subscribe(&transient).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(resource = %start.resource, "query subscribe failed: {}", e);
            return;
        }
    };
    let (cancel_tx, cancel_rx) = oneshot::channel();
    ctx.timers
        .set(Instant::now() + ctx.query_duration, cancel_tx);
    let announce = emit::query_announce(&start.resource, &transient);
    let reader = tokio::spawn(query::query_reader(
        sub,
        cancel_rx,
        ctx.shutdown.clone(),
        start,
        Outbox::new(out_tx),
        ctx.dispatcher.clone(),
    ));
    ctx.tasks.lock().push(reader);
    match announce {
        Ok(Out::Frame { subject, payload }) => {
            if let Err(e) = ctx.conn.publish(&subject, payload).await {
                warn!(subject, "query event publish failed: {}", e);
            }
        }
        Ok(Out::StartQuery(_)) => {}
        Err(e) => warn!("failed to encode query event: {}", e),
    }
}

/// Re-announce owned resources after every reconnect, so gateways
/// invalidate caches they kept across the outage.
async fn reconnect_loop(core: Arc<Core>, mut shutdown: watch::Receiver<bool>) {
    let mut reconnects = core.conn.reconnects();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = reconnects.recv() => match received {
                Ok(()) => {
                    info!("connection re-established, resetting owned resources");
                    if core.reset.0.is_empty() && core.reset.1.is_empty() {
                        continue;
                    }
                    match emit::reset(&core.reset.0, &core.reset.1) {
                        Ok(out) => core.outbox.send(out),
                        Err(e) => warn!("failed to encode system reset: {}", e),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}

async fn subscription_loop(
    core: Arc<Core>,
    mut sub: Box<dyn Subscription>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Err(e) = sub.unsubscribe().await {
                    debug!("unsubscribe failed: {}", e);
                }
                break;
            }
            msg = sub.next() => match msg {
                Some(msg) => handle_message(&core, msg),
                None => break,
            }
        }
    }
}

/// Route an inbound message and schedule it on its resource queue.
fn handle_message(core: &Arc<Core>, msg: Msg) {
    let Some(parsed) = subject::parse_request(&msg.subject) else {
        debug!(subject = %msg.subject, "unroutable message, dropping");
        return;
    };
    let Some(reply_to) = msg.reply else {
        warn!(subject = %msg.subject, "request without reply subject, dropping");
        return;
    };
    let kind = match parsed.request_type {
        subject::RequestType::Access => RequestKind::Access,
        subject::RequestType::Get => RequestKind::Get,
        subject::RequestType::Call => RequestKind::Call,
        subject::RequestType::Auth => RequestKind::Auth,
    };
    let rname = parsed.resource.to_string();
    let method = parsed.method.map(str::to_string);

    let Some(found) = core.router.get(&rname) else {
        respond_unmatched(core, kind, &reply_to);
        return;
    };
    let key = serialization_key(&rname, &found);

    let routed = Routed {
        found,
        kind,
        rname,
        method,
        key: key.clone(),
        reply_to,
        payload: msg.payload,
    };
    let task_core = Arc::clone(core);
    let scheduled = core
        .dispatcher
        .enqueue(&key, Box::new(move || process_request(task_core, routed)));
    if !scheduled {
        debug!(key, "service stopping, dropping request");
    }
}

/// A subscription under a wildcard pattern can carry names no handler
/// claims; answer those without entering a resource queue.
fn respond_unmatched(core: &Core, kind: RequestKind, reply_to: &str) {
    let reply = match kind {
        RequestKind::Access => {
            if core.default_access.is_denied() {
                Reply::Error(res_proto::Error::access_denied())
            } else {
                match serde_json::to_value(core.default_access.clone()) {
                    Ok(value) => Reply::Result(value),
                    Err(_) => Reply::Error(res_proto::Error::internal_error("Internal error")),
                }
            }
        }
        RequestKind::Get | RequestKind::Call | RequestKind::Auth => {
            Reply::Error(res_proto::Error::not_found())
        }
    };
    core.outbox.frame(reply_to.to_string(), encode_reply(&reply));
}

struct Routed {
    found: Found,
    kind: RequestKind,
    rname: String,
    method: Option<String>,
    key: String,
    reply_to: String,
    payload: Bytes,
}

/// Runs on the resource's worker: decode, invoke, enforce the reply.
fn process_request(core: Arc<Core>, routed: Routed) {
    let payload = match RequestPayload::decode(&routed.payload) {
        Ok(payload) => payload,
        Err(e) => {
            error!(resource = %routed.rname, "malformed request payload: {}", e);
            core.outbox.frame(
                routed.reply_to,
                encode_reply(&Reply::Error(res_proto::Error::internal_error(
                    "malformed request payload",
                ))),
            );
            return;
        }
    };

    let mut req = Request {
        kind: routed.kind,
        rname: routed.rname,
        method: routed.method,
        payload,
        path_params: routed.found.params,
        key: routed.key,
        handler: routed.found.handler,
        reply_to: routed.reply_to,
        outbox: core.outbox.clone(),
        replied: false,
        queued: Vec::new(),
    };

    match catch_unwind(AssertUnwindSafe(|| dispatch_to_handler(&core, &mut req))) {
        Ok(outcome) => finish(req, outcome),
        Err(_) => {
            error!(resource = %req.rname, "handler panicked");
            if !req.replied {
                let _ = req.reply_error(res_proto::Error::internal_error("Internal error"));
            }
        }
    }
}

/// Capability dispatch per request type; mismatches answered without
/// invoking application code.
fn dispatch_to_handler(core: &Core, req: &mut Request) -> Result<(), Error> {
    let handler = Arc::clone(&req.handler);
    match req.kind {
        RequestKind::Access => match handler.access_fn() {
            Some(f) => f(AccessRequest { req }),
            None => req.reply_access(core.default_access.clone()),
        },
        RequestKind::Get => match handler.get_fn() {
            Some(f) => f(GetRequest { req }),
            None => req.reply_error(res_proto::Error::not_found()),
        },
        RequestKind::Call => {
            let method = req.method.clone().unwrap_or_default();
            if method.eq_ignore_ascii_case("new") {
                if let Some(f) = handler.new_fn() {
                    return f(NewRequest { req });
                }
            }
            match handler.call_fn(&method) {
                Some(f) => f(CallRequest { req }),
                None => req.reply_error(res_proto::Error::method_not_found()),
            }
        }
        RequestKind::Auth => {
            let method = req.method.clone().unwrap_or_default();
            match handler.auth_fn(&method) {
                Some(f) => f(AuthRequest { req }),
                None => req.reply_error(res_proto::Error::method_not_found()),
            }
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
