// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the service runtime.

use thiserror::Error as ThisError;

use crate::conn::ConnError;

/// Errors raised by the service runtime.
///
/// Configuration errors surface synchronously from registration and
/// lifecycle calls. A `Protocol` error returned from a handler is sent
/// to the gateway as the error reply; any other error returned from a
/// handler is logged and answered with `system.internalError`.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Pattern contains an invalid token.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Pattern collides with an already registered pattern.
    #[error("pattern already registered: {0}")]
    DuplicatePattern(String),

    /// Group label references a parameter the pattern does not declare,
    /// or is malformed.
    #[error("invalid group: {0}")]
    InvalidGroup(String),

    /// Operation not permitted in the current lifecycle state.
    #[error("invalid service state: {0}")]
    InvalidState(&'static str),

    /// Malformed argument, e.g. a connection id containing `.`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A second terminal response, or an event after the response.
    #[error("response already sent")]
    DoubleReply,

    /// Resource name does not resolve to any registered handler.
    #[error("no handler matches resource: {0}")]
    NoMatchingPattern(String),

    /// Event emitted against the wrong resource type.
    #[error("invalid usage: {0}")]
    Usage(&'static str),

    /// Bus client failure.
    #[error("bus error: {0}")]
    Bus(#[from] ConnError),

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A protocol error, delivered to the gateway as the error reply.
    #[error(transparent)]
    Protocol(#[from] res_proto::Error),
}
