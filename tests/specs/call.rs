// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Call request handling: events before the reply, method routing,
//! create requests.

use res_service::{Handler, MockConn, Service};
use serde_json::{json, Value};

use crate::prelude::{expect_published, request_body};

async fn serve_and_sync(service: &Service, conn: &MockConn) {
    service.serve(conn.clone()).await.unwrap();
    // consume the initial reset
    expect_published(conn, "system.reset").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn call_publishes_events_then_reply_in_order() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::collection()
                .get(|mut r| r.collection(json!([])))
                .call("delete", |mut r| {
                    r.remove_event(2)?;
                    r.ok(Value::Null)
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.delete", "_INBOX.x", &request_body("c1"));

    let event = expect_published(&conn, "event.test.model.remove").await;
    assert_eq!(event, json!({"idx": 2}));

    let reply = expect_published(&conn, "_INBOX.x").await;
    assert_eq!(reply, json!({"result": null}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_method_is_method_not_found() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::collection()
                .get(|mut r| r.collection(json!([])))
                .call("delete", |mut r| r.ok(Value::Null)),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.rename", "_INBOX.m", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.m").await;
    assert_eq!(
        reply,
        json!({"error": {"code": "system.methodNotFound", "message": "Method not found"}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn method_names_match_case_insensitively() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .call("set", |mut r| r.ok(json!("done"))),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.SET", "_INBOX.s", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.s").await;
    assert_eq!(reply, json!({"result": "done"}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn create_request_returns_a_resource_reference() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::collection()
                .get(|mut r| r.collection(json!([])))
                .create(|mut r| r.created("test.model.1")),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.new", "_INBOX.n", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.n").await;
    assert_eq!(reply, json!({"resource": {"rid": "test.model.1"}}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn new_method_without_create_capability_is_method_not_found() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::collection().get(|mut r| r.collection(json!([]))),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.new", "_INBOX.n2", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.n2").await;
    assert_eq!(
        reply,
        json!({"error": {"code": "system.methodNotFound", "message": "Method not found"}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handler_protocol_error_becomes_the_reply() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .call("buy", |_r| {
                    Err(res_service::proto::Error::new("store.outOfStock", "Out of stock").into())
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.buy", "_INBOX.b", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.b").await;
    assert_eq!(
        reply,
        json!({"error": {"code": "store.outOfStock", "message": "Out of stock"}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_params_propagate_through_parse() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .call("set", |mut r| {
                    let _value: i64 = r.parse_params()?;
                    r.ok(Value::Null)
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request(
        "call.test.model.set",
        "_INBOX.p",
        br#"{"cid":"c1","params":{"value":"nan"}}"#,
    );
    let reply = expect_published(&conn, "_INBOX.p").await;
    assert_eq!(reply["error"]["code"], json!("system.invalidParams"));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_reply_publishes_only_the_first() {
    let mut service = Service::new("test");
    service
        .add_handler(
            ">",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .call("once", |mut r| {
                    r.ok(json!(1))?;
                    // second terminal reply errors synchronously
                    r.ok(json!(2))
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    serve_and_sync(&service, &conn).await;

    conn.request("call.test.model.once", "_INBOX.d", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.d").await;
    assert_eq!(reply, json!({"result": 1}));
    assert!(
        conn.no_published(std::time::Duration::from_millis(200))
            .await
    );

    service.shutdown().await.unwrap();
}
