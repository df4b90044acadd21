// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound message channel.
//!
//! Every message the service publishes flows through one unbounded
//! channel drained by a single publisher task, so events and replies
//! reach the bus in emission order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Error;
use crate::handler::Handler;
use crate::query::QueryRequest;

/// Callback answering query requests within a query window.
pub(crate) type QueryCallback =
    Arc<dyn Fn(&mut QueryRequest) -> Result<(), Error> + Send + Sync>;

/// An item on the outbound channel.
pub(crate) enum Out {
    /// A frame to publish as-is.
    Frame { subject: String, payload: Vec<u8> },

    /// Open a query window: subscribe a transient subject, register its
    /// expiration, then announce it with a query event.
    StartQuery(QueryStart),
}

pub(crate) struct QueryStart {
    /// Resource the query event belongs to.
    pub resource: String,
    /// Serialization key of the resource (group or resource name).
    pub key: String,
    pub handler: Arc<Handler>,
    pub callback: QueryCallback,
}

/// Sending half of the outbound channel.
#[derive(Clone)]
pub(crate) struct Outbox {
    tx: mpsc::UnboundedSender<Out>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Out>) -> Self {
        Self { tx }
    }

    pub fn send(&self, out: Out) {
        if self.tx.send(out).is_err() {
            debug!("outbound channel closed, dropping message");
        }
    }

    pub fn frame(&self, subject: impl Into<String>, payload: Vec<u8>) {
        self.send(Out::Frame {
            subject: subject.into(),
            payload,
        });
    }

    pub fn downgrade(&self) -> WeakOutbox {
        WeakOutbox {
            tx: self.tx.downgrade(),
        }
    }
}

/// Outbox handle that does not keep the publisher alive.
///
/// Held by application-facing values that may outlive the serving cycle,
/// such as [`crate::Resource`].
#[derive(Clone)]
pub(crate) struct WeakOutbox {
    tx: mpsc::WeakUnboundedSender<Out>,
}

impl WeakOutbox {
    pub fn send(&self, out: Out) {
        match self.tx.upgrade() {
            Some(tx) => {
                if tx.send(out).is_err() {
                    debug!("outbound channel closed, dropping message");
                }
            }
            None => debug!("service stopped, dropping message"),
        }
    }

    pub fn frame(&self, subject: impl Into<String>, payload: Vec<u8>) {
        self.send(Out::Frame {
            subject: subject.into(),
            payload,
        });
    }
}
