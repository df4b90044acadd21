// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory bus connection for tests.
//!
//! Records every published frame in order and routes injected inbound
//! messages to matching subscriptions using bus wildcard semantics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use super::{Conn, ConnError, Msg, Subscription};

/// Clonable in-memory connection; all clones share the same bus.
#[derive(Clone)]
pub struct MockConn {
    inner: Arc<MockInner>,
}

struct MockInner {
    subs: Mutex<Vec<MockSubEntry>>,
    next_id: AtomicU64,
    published_tx: mpsc::UnboundedSender<Msg>,
    published_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Msg>>,
    reconnect_tx: broadcast::Sender<()>,
}

struct MockSubEntry {
    id: u64,
    subject: String,
    tx: mpsc::UnboundedSender<Msg>,
}

impl MockConn {
    pub fn new() -> Self {
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(MockInner {
                subs: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                published_tx,
                published_rx: tokio::sync::Mutex::new(published_rx),
                reconnect_tx,
            }),
        }
    }

    /// Inject an inbound request message carrying a reply subject.
    pub fn request(&self, subject: &str, reply: &str, payload: &[u8]) {
        self.deliver(subject, Some(reply), payload);
    }

    /// Inject an inbound message without a reply subject.
    pub fn message(&self, subject: &str, payload: &[u8]) {
        self.deliver(subject, None, payload);
    }

    fn deliver(&self, subject: &str, reply: Option<&str>, payload: &[u8]) {
        let msg = Msg {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload: Bytes::copy_from_slice(payload),
        };
        for entry in self.inner.subs.lock().iter() {
            if subject_matches(&entry.subject, subject) {
                let _ = entry.tx.send(msg.clone());
            }
        }
    }

    /// Next published frame, in publish order. `None` after one second
    /// without traffic.
    pub async fn next_published(&self) -> Option<Msg> {
        let mut rx = self.inner.published_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// True when nothing is published within the given window.
    pub async fn no_published(&self, window: Duration) -> bool {
        let mut rx = self.inner.published_rx.lock().await;
        tokio::time::timeout(window, rx.recv()).await.is_err()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subs.lock().len()
    }

    /// True when a subscription exists for exactly this subject.
    pub fn is_subscribed(&self, subject: &str) -> bool {
        self.inner.subs.lock().iter().any(|e| e.subject == subject)
    }

    /// Subjects of all live subscriptions, for diagnostics.
    pub fn subscribed_subjects(&self) -> Vec<String> {
        self.inner
            .subs
            .lock()
            .iter()
            .map(|e| e.subject.clone())
            .collect()
    }

    /// Simulate the connection being re-established.
    pub fn reconnect(&self) {
        let _ = self.inner.reconnect_tx.send(());
    }
}

impl Default for MockConn {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Conn for MockConn {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ConnError> {
        let _ = self.inner.published_tx.send(Msg {
            subject: subject.to_string(),
            reply: None,
            payload: payload.into(),
        });
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, ConnError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subs.lock().push(MockSubEntry {
            id,
            subject: subject.to_string(),
            tx,
        });
        Ok(Box::new(MockSubscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn reconnects(&self) -> broadcast::Receiver<()> {
        self.inner.reconnect_tx.subscribe()
    }
}

struct MockSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Msg>,
    inner: Arc<MockInner>,
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn next(&mut self) -> Option<Msg> {
        self.rx.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<(), ConnError> {
        self.inner.subs.lock().retain(|e| e.id != self.id);
        Ok(())
    }
}

impl Drop for MockSubscription {
    fn drop(&mut self) {
        self.inner.subs.lock().retain(|e| e.id != self.id);
    }
}

/// Bus wildcard matching: `*` matches one token, a terminal `>` matches
/// one or more.
fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
