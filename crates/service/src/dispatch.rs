// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-resource task scheduling.
//!
//! One mutex guards both the accepting flag and the key-to-queue map, so
//! "service is accepting work" and "task is enqueued" are decided
//! atomically. Tasks with the same key run in submission order on a
//! single worker; distinct keys run in parallel on the shared blocking
//! pool.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::error;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Serializes tasks per key across a shared worker pool.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    shared: Arc<Mutex<DispatchState>>,
    idle: Arc<Notify>,
    handle: Handle,
}

struct DispatchState {
    accepting: bool,
    queues: HashMap<String, VecDeque<Task>>,
}

impl Dispatcher {
    pub fn new(handle: Handle) -> Self {
        Self {
            shared: Arc::new(Mutex::new(DispatchState {
                accepting: true,
                queues: HashMap::new(),
            })),
            idle: Arc::new(Notify::new()),
            handle,
        }
    }

    /// Schedule a task under a key. Returns false when the dispatcher is
    /// no longer accepting work.
    pub fn enqueue(&self, key: &str, task: Task) -> bool {
        let mut state = self.shared.lock();
        if !state.accepting {
            return false;
        }
        if let Some(queue) = state.queues.get_mut(key) {
            queue.push_back(task);
            return true;
        }
        state.queues.insert(key.to_string(), VecDeque::from([task]));
        drop(state);
        self.spawn_worker(key.to_string());
        true
    }

    fn spawn_worker(&self, key: String) {
        let shared = Arc::clone(&self.shared);
        let idle = Arc::clone(&self.idle);
        self.handle.spawn_blocking(move || loop {
            let task = {
                let mut state = shared.lock();
                match state.queues.get_mut(&key).and_then(VecDeque::pop_front) {
                    Some(task) => task,
                    None => {
                        state.queues.remove(&key);
                        if state.queues.is_empty() {
                            idle.notify_waiters();
                        }
                        break;
                    }
                }
            };
            // Run outside the lock; keep the queue alive if a task panics
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!(key, "scheduled task panicked");
            }
        });
    }

    /// Stop accepting new work and wait until every queue has drained.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.lock();
                state.accepting = false;
                if state.queues.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
