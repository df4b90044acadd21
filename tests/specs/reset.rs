// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Initial and reconnect `system.reset` behaviour.

use std::time::Duration;

use res_service::{Handler, MockConn, Service};
use serde_json::json;

use crate::prelude::expect_published;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn initial_reset_lists_get_and_access_patterns() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::model()
                .access(|mut r| r.granted())
                .get(|mut r| r.model(json!({}))),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    let payload = expect_published(&conn, "system.reset").await;
    assert_eq!(
        payload,
        json!({"resources": ["test.>"], "access": ["test.>"]})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn access_only_service_resets_with_empty_resources() {
    let mut service = Service::new("test");
    service
        .add_handler(">", Handler::new().access(|mut r| r.granted()))
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    let payload = expect_published(&conn, "system.reset").await;
    assert_eq!(payload, json!({"resources": [], "access": ["test.>"]}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn service_owning_nothing_sends_no_reset() {
    let service = Service::new("test");
    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    assert!(conn.no_published(Duration::from_millis(200)).await);

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn explicit_owned_resources_override_enumeration() {
    let mut service = Service::new("test");
    service
        .add_handler("model", Handler::model().get(|mut r| r.model(json!({}))))
        .unwrap();
    service
        .set_owned_resources(&["test.custom.>"], &[])
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    let payload = expect_published(&conn, "system.reset").await;
    assert_eq!(payload, json!({"resources": ["test.custom.>"], "access": []}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconnect_repeats_the_reset() {
    let mut service = Service::new("test");
    service
        .add_handler(">", Handler::model().get(|mut r| r.model(json!({}))))
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();

    let first = expect_published(&conn, "system.reset").await;
    conn.reconnect();
    let second = expect_published(&conn, "system.reset").await;
    assert_eq!(first, second);

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn manual_reset_publishes_while_started() {
    let mut service = Service::new("test");
    service
        .add_handler(">", Handler::model().get(|mut r| r.model(json!({}))))
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    service.reset(&["test.model"], &[]).unwrap();
    let payload = expect_published(&conn, "system.reset").await;
    assert_eq!(payload, json!({"resources": ["test.model"], "access": []}));

    service.shutdown().await.unwrap();
}
