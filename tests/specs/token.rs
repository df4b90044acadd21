// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection token events.

use res_service::{Error, Handler, MockConn, Service};
use serde_json::{json, Value};

use crate::prelude::{expect_published, request_body};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn token_event_sets_and_clears_tokens() {
    let service = Service::new("test");
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    service
        .token_event("conn1", json!({"user": "u"}))
        .unwrap();
    let payload = expect_published(&conn, "conn.conn1.token").await;
    assert_eq!(payload, json!({"token": {"user": "u"}}));

    service.token_event("conn1", Value::Null).unwrap();
    let payload = expect_published(&conn, "conn.conn1.token").await;
    assert_eq!(payload, json!({"token": null}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn token_event_rejects_subject_active_cids() {
    let service = Service::new("test");
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    let err = service.token_event("a.b", Value::Null).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn auth_handler_tokens_its_own_connection_before_the_reply() {
    let mut service = Service::new("test");
    service
        .add_handler(
            "passwd",
            Handler::new().auth("login", |mut r| {
                r.token_event(json!({"user": "admin"}))?;
                r.ok(Value::Null)
            }),
        )
        .unwrap();
    service.set_owned_resources(&["test.>"], &[]).unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("auth.test.passwd.login", "_INBOX.l", &request_body("c7"));

    let token = expect_published(&conn, "conn.c7.token").await;
    assert_eq!(token, json!({"token": {"user": "admin"}}));

    let reply = expect_published(&conn, "_INBOX.l").await;
    assert_eq!(reply, json!({"result": null}));

    service.shutdown().await.unwrap();
}
