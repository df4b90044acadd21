// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query-event windows: announcement, draining, bounded lifetime.

use std::time::Duration;

use res_service::{Handler, MockConn, Service};
use serde_json::{json, Value};

use crate::prelude::{expect_published, request_body};

fn query_service(window: Duration) -> Service {
    let mut service = Service::new("test");
    service.set_query_duration(window).unwrap();
    service
        .add_handler(
            "books",
            Handler::collection()
                .get(|mut r| r.collection(json!([])))
                .call("push", |mut r| {
                    r.add_event(json!("title"), 0)?;
                    r.query_event(|q| {
                        assert_eq!(q.query(), "limit=5");
                        q.add_event(json!("title"), 0)
                    })?;
                    r.ok(Value::Null)
                }),
        )
        .unwrap();
    service
}

/// Drive a push call and return the transient query subject.
async fn open_query_window(conn: &MockConn) -> String {
    conn.request("call.test.books.push", "_INBOX.p", &request_body("c1"));

    let add = expect_published(conn, "event.test.books.add").await;
    assert_eq!(add, json!({"value": "title", "idx": 0}));

    let query_event = expect_published(conn, "event.test.books.query").await;
    let subject = query_event["subject"].as_str().unwrap().to_string();
    assert!(!subject.is_empty());

    let reply = expect_published(conn, "_INBOX.p").await;
    assert_eq!(reply, json!({"result": null}));
    subject
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_event_announces_a_subject_and_answers_queries() {
    let service = query_service(Duration::from_secs(3));
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    let subject = open_query_window(&conn).await;

    conn.request(&subject, "_INBOX.q1", br#"{"query":"limit=5"}"#);
    let answer = expect_published(&conn, "_INBOX.q1").await;
    assert_eq!(
        answer,
        json!({"result": {"events": [
            {"event": "add", "data": {"value": "title", "idx": 0}},
        ]}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_query_is_answered_with_invalid_query() {
    let service = query_service(Duration::from_secs(3));
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    let subject = open_query_window(&conn).await;

    conn.request(&subject, "_INBOX.q2", b"{}");
    let answer = expect_published(&conn, "_INBOX.q2").await;
    assert_eq!(answer["error"]["code"], json!("system.invalidQuery"));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expired_windows_stop_answering() {
    let service = query_service(Duration::from_millis(120));
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    let baseline = conn.subscription_count();
    let subject = open_query_window(&conn).await;
    assert_eq!(conn.subscription_count(), baseline + 1);

    // wait out the window
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(conn.subscription_count(), baseline);

    conn.request(&subject, "_INBOX.q3", br#"{"query":"limit=5"}"#);
    assert!(conn.no_published(Duration::from_millis(200)).await);

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_expires_open_windows() {
    let service = query_service(Duration::from_secs(60));
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    let _subject = open_query_window(&conn).await;
    service.shutdown().await.unwrap();
    assert_eq!(conn.subscription_count(), 0);
}
