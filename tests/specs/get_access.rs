// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Get and access request handling, including capability defaults.

use res_service::proto::Access;
use res_service::{Handler, MockConn, Service};
use serde_json::json;

use crate::prelude::{expect_published, request_body};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_replies_with_model_content() {
    let mut service = Service::new("test");
    service
        .add_handler(
            "model.$id",
            Handler::model().get(|mut r| {
                let id = r.path_param("id").unwrap_or("?").to_string();
                r.model(json!({"id": id, "name": "book"}))
            }),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("get.test.model.42", "_INBOX.g", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.g").await;
    assert_eq!(
        reply,
        json!({"result": {"model": {"id": "42", "name": "book"}}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_replies_with_collection_content() {
    let mut service = Service::new("test");
    service
        .add_handler(
            "books",
            Handler::collection().get(|mut r| {
                r.collection(json!([{"rid": "test.model.1"}, {"rid": "test.model.2"}]))
            }),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("get.test.books", "_INBOX.c", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.c").await;
    assert_eq!(
        reply,
        json!({"result": {"collection": [
            {"rid": "test.model.1"},
            {"rid": "test.model.2"},
        ]}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_without_capability_is_not_found() {
    let mut service = Service::new("test");
    service
        .add_handler("model", Handler::model().call("set", |mut r| r.ok(json!(null))))
        .unwrap();
    // the call-only handler derives no subscriptions; own them explicitly
    service.set_owned_resources(&["test.>"], &[]).unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("get.test.model", "_INBOX.nf", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.nf").await;
    assert_eq!(
        reply,
        json!({"error": {"code": "system.notFound", "message": "Not found"}})
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unclaimed_resource_is_not_found() {
    let mut service = Service::new("test");
    service
        .add_handler("model", Handler::model().get(|mut r| r.model(json!({}))))
        .unwrap();
    service.set_owned_resources(&["test.>"], &[]).unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("get.test.other", "_INBOX.u", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.u").await;
    assert_eq!(reply["error"]["code"], json!("system.notFound"));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn access_handler_grants_and_denies() {
    let mut service = Service::new("test");
    service
        .add_handler(
            "model",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .access(|mut r| {
                    if r.cid() == "friend" {
                        r.granted()
                    } else {
                        r.denied()
                    }
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("access.test.model", "_INBOX.a1", &request_body("friend"));
    let reply = expect_published(&conn, "_INBOX.a1").await;
    assert_eq!(reply, json!({"result": {"get": true, "call": "*"}}));

    conn.request("access.test.model", "_INBOX.a2", &request_body("stranger"));
    let reply = expect_published(&conn, "_INBOX.a2").await;
    assert_eq!(reply["error"]["code"], json!("system.accessDenied"));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_access_capability_grants_by_default() {
    let mut service = Service::new("test");
    service
        .add_handler("model", Handler::model().get(|mut r| r.model(json!({}))))
        .unwrap();
    service
        .set_owned_resources(&["test.>"], &["test.>"])
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("access.test.model", "_INBOX.da", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.da").await;
    assert_eq!(reply, json!({"result": {"get": true, "call": "*"}}));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn configured_default_access_denies() {
    let mut service = Service::new("test");
    service
        .add_handler("model", Handler::model().get(|mut r| r.model(json!({}))))
        .unwrap();
    service
        .set_owned_resources(&["test.>"], &["test.>"])
        .unwrap();
    service.set_default_access(Access::denied()).unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("access.test.model", "_INBOX.dd", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.dd").await;
    assert_eq!(reply["error"]["code"], json!("system.accessDenied"));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn granular_access_lists_call_methods() {
    let mut service = Service::new("test");
    service
        .add_handler(
            "model",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .access(|mut r| r.access(Access::new(true, "set,inc"))),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    expect_published(&conn, "system.reset").await;

    conn.request("access.test.model", "_INBOX.ga", &request_body("c1"));
    let reply = expect_published(&conn, "_INBOX.ga").await;
    assert_eq!(reply, json!({"result": {"get": true, "call": "set,inc"}}));

    service.shutdown().await.unwrap();
}
