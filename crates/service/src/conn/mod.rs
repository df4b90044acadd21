// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus connection abstraction.
//!
//! The runtime only needs publish, subscribe and a reconnect signal, so
//! it consumes this trait instead of a concrete client. [`NatsConn`]
//! adapts `async-nats`; the mock (behind the `test-support` feature)
//! runs everything in memory.

mod nats;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

pub use nats::NatsConn;

/// A message delivered on a bus subscription.
#[derive(Debug, Clone)]
pub struct Msg {
    pub subject: String,
    /// Reply subject from the message envelope, when the sender expects
    /// a response.
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// Bus client failures.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("connection closed")]
    Closed,
}

/// An active bus subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Next message, or `None` once the subscription is closed.
    async fn next(&mut self) -> Option<Msg>;

    /// Tear the subscription down.
    async fn unsubscribe(&mut self) -> Result<(), ConnError>;
}

/// Bus client surface the service consumes.
#[async_trait]
pub trait Conn: Send + Sync + 'static {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ConnError>;

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, ConnError>;

    /// Receiver signalled each time the connection is re-established.
    fn reconnects(&self) -> broadcast::Receiver<()>;
}
