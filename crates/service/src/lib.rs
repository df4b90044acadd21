// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! res-service: service-side runtime of the RES-Service Protocol.
//!
//! Applications register [`Handler`]s under resource-name patterns on a
//! [`Service`], then serve a bus connection. The runtime routes inbound
//! requests to handlers, serializes all work per resource, and publishes
//! events and replies in emission order.
//!
//! ```ignore
//! let mut service = Service::new("library");
//! service.add_handler(
//!     "book.$id",
//!     Handler::model()
//!         .access(|mut r| r.granted())
//!         .get(move |mut r| r.model(store.model(r.resource()))),
//! )?;
//! service.serve_url("nats://127.0.0.1:4222").await?;
//! ```

pub mod conn;
mod dispatch;
mod emit;
mod error;
mod handler;
mod outbox;
mod pattern;
mod query;
mod request;
mod resource;
mod service;

/// Wire-level protocol types, re-exported for handler code.
pub use res_proto as proto;

#[cfg(any(test, feature = "test-support"))]
pub use conn::mock::MockConn;
pub use conn::{Conn, ConnError, Msg, NatsConn, Subscription};
pub use error::Error;
pub use handler::{Handler, ResourceType};
pub use query::QueryRequest;
pub use request::{AccessRequest, AuthRequest, CallRequest, GetRequest, NewRequest};
pub use resource::{Group, Resource};
pub use service::{Service, State};
