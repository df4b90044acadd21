// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query-event window management.
//!
//! A query event opens a bounded window during which the gateway may ask
//! the service, over a transient subject, which events apply to a given
//! query. Expirations live in a single deadline set driven by one task;
//! expiry tears down the bus subscription before the callback is
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use res_proto::{encode_reply, QueryEventEntry, QueryResult, Reply};
use serde_json::Value;
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::conn::{Msg, Subscription};
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::handler::{Handler, ResourceType};
use crate::outbox::{Outbox, QueryStart};
use crate::request::error_to_reply;

/// Deadline set for open query windows.
///
/// Insertion wakes the expiration task so an earlier deadline takes
/// effect immediately.
pub(crate) struct QueryTimers {
    state: Mutex<TimerState>,
    wake: Notify,
}

struct TimerState {
    next_id: u64,
    entries: HashMap<u64, TimerEntry>,
}

struct TimerEntry {
    expires_at: Instant,
    cancel: oneshot::Sender<()>,
}

impl QueryTimers {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                next_id: 1,
                entries: HashMap::new(),
            }),
            wake: Notify::new(),
        }
    }

    /// Register an expiration; the cancel side is signalled when it fires.
    ///
    /// Uses a stored-permit wakeup so an insertion racing the expiration
    /// task's sleep cannot be lost.
    pub fn set(&self, expires_at: Instant, cancel: oneshot::Sender<()>) -> u64 {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.insert(id, TimerEntry { expires_at, cancel });
            id
        };
        self.wake.notify_one();
        id
    }

    /// Take all entries due at `now`.
    pub fn fired(&self, now: Instant) -> Vec<oneshot::Sender<()>> {
        let mut state = self.state.lock();
        let due: Vec<u64> = state
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        due.iter()
            .filter_map(|id| state.entries.remove(id))
            .map(|e| e.cancel)
            .collect()
    }

    /// Take every entry, due or not.
    pub fn fire_all(&self) -> Vec<oneshot::Sender<()>> {
        let mut state = self.state.lock();
        state.entries.drain().map(|(_, e)| e.cancel).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let state = self.state.lock();
        state.entries.values().map(|e| e.expires_at).min()
    }

    /// Completes when the deadline set changes.
    pub async fn changed(&self) {
        self.wake.notified().await;
    }
}

/// Expiration task: fires due entries, and everything on shutdown.
pub(crate) async fn run_expirations(timers: Arc<QueryTimers>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let deadline = timers.next_deadline();
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = timers.changed() => {}
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                for cancel in timers.fired(Instant::now()) {
                    let _ = cancel.send(());
                }
            }
        }
    }
    for cancel in timers.fire_all() {
        let _ = cancel.send(());
    }
}

/// Drains a transient query subject until its window expires.
///
/// The shutdown signal is checked with `wait_for` so a reader spawned
/// concurrently with shutdown still tears itself down.
pub(crate) async fn query_reader(
    mut sub: Box<dyn Subscription>,
    mut cancel: oneshot::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
    start: QueryStart,
    outbox: Outbox,
    dispatcher: Dispatcher,
) {
    loop {
        tokio::select! {
            _ = &mut cancel => {
                if let Err(e) = sub.unsubscribe().await {
                    debug!("query unsubscribe failed: {}", e);
                }
                break;
            }
            _ = shutdown.changed() => {
                if !*shutdown.borrow() {
                    continue;
                }
                if let Err(e) = sub.unsubscribe().await {
                    debug!("query unsubscribe failed: {}", e);
                }
                break;
            }
            msg = sub.next() => match msg {
                Some(msg) => handle_query_message(&start, msg, &outbox, &dispatcher),
                None => break,
            }
        }
    }
}

fn handle_query_message(start: &QueryStart, msg: Msg, outbox: &Outbox, dispatcher: &Dispatcher) {
    let Some(reply_to) = msg.reply else {
        warn!(resource = %start.resource, "query request without reply subject, dropping");
        return;
    };
    let request: res_proto::QueryRequest = match serde_json::from_slice(&msg.payload) {
        Ok(request) => request,
        Err(e) => {
            error!(resource = %start.resource, "malformed query request: {}", e);
            outbox.frame(
                reply_to,
                encode_reply(&Reply::Error(res_proto::Error::internal_error(
                    "malformed query request",
                ))),
            );
            return;
        }
    };

    // Run the callback on the resource's serialized queue
    let handler = Arc::clone(&start.handler);
    let callback = Arc::clone(&start.callback);
    let outbox = outbox.clone();
    let resource = start.resource.clone();
    let scheduled = dispatcher.enqueue(
        &start.key,
        Box::new(move || {
            let reply = if request.query.is_empty() {
                Reply::Error(res_proto::Error::invalid_query())
            } else {
                let mut query_request = QueryRequest::new(request.query, handler);
                match callback(&mut query_request) {
                    Ok(()) => query_request.into_reply(),
                    Err(err) => error_to_reply(err, &resource, "query callback"),
                }
            };
            outbox.frame(reply_to, encode_reply(&reply));
        }),
    );
    if !scheduled {
        debug!(resource = %start.resource, "service stopping, dropping query request");
    }
}

/// A single request arriving within a query window.
///
/// The callback records the events that apply to the query; the engine
/// answers with the collected list, or with the overriding reply set by
/// [`QueryRequest::not_found`] or [`QueryRequest::error`].
pub struct QueryRequest {
    query: String,
    handler: Arc<Handler>,
    events: Vec<QueryEventEntry>,
    reply: Option<Reply>,
}

impl QueryRequest {
    pub(crate) fn new(query: String, handler: Arc<Handler>) -> Self {
        Self {
            query,
            handler,
            events: Vec::new(),
            reply: None,
        }
    }

    /// Query string the gateway is asking about.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Record a change event for this query. Model resources only.
    pub fn change_event(&mut self, values: HashMap<String, Value>) -> Result<(), Error> {
        if self.handler.resource_type() != ResourceType::Model {
            return Err(Error::Usage("change event on non-model resource"));
        }
        self.push("change", serde_json::to_value(res_proto::ChangeEvent { values })?);
        Ok(())
    }

    /// Record an add event for this query. Collection resources only.
    pub fn add_event(&mut self, value: Value, idx: usize) -> Result<(), Error> {
        if self.handler.resource_type() != ResourceType::Collection {
            return Err(Error::Usage("add event on non-collection resource"));
        }
        self.push("add", serde_json::to_value(res_proto::AddEvent { value, idx })?);
        Ok(())
    }

    /// Record a remove event for this query. Collection resources only.
    pub fn remove_event(&mut self, idx: usize) -> Result<(), Error> {
        if self.handler.resource_type() != ResourceType::Collection {
            return Err(Error::Usage("remove event on non-collection resource"));
        }
        self.push("remove", serde_json::to_value(res_proto::RemoveEvent { idx })?);
        Ok(())
    }

    /// Answer the query with a not-found error instead of events.
    pub fn not_found(&mut self) {
        self.reply = Some(Reply::Error(res_proto::Error::not_found()));
    }

    /// Answer the query with an error instead of events.
    pub fn error(&mut self, err: res_proto::Error) {
        self.reply = Some(Reply::Error(err));
    }

    fn push(&mut self, event: &str, data: Value) {
        self.events.push(QueryEventEntry {
            event: event.to_string(),
            data,
        });
    }

    pub(crate) fn into_reply(self) -> Reply {
        match self.reply {
            Some(reply) => reply,
            None => Reply::Result(
                serde_json::to_value(QueryResult {
                    events: self.events,
                })
                .unwrap_or(Value::Null),
            ),
        }
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
