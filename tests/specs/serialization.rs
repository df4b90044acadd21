// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-resource serialization: same-resource requests never interleave,
//! distinct resources run in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use res_service::{Handler, MockConn, Service};
use serde_json::{json, Value};

use crate::prelude::request_body;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mark {
    Start,
    End,
}

type Timeline = Arc<Mutex<Vec<(String, Mark, Instant)>>>;

fn span(timeline: &Timeline, resource: &str) -> (Instant, Instant) {
    let entries = timeline.lock();
    let start = entries
        .iter()
        .find(|(r, m, _)| r == resource && *m == Mark::Start)
        .map(|(_, _, t)| *t)
        .unwrap_or_else(|| panic!("no start for {}", resource));
    let end = entries
        .iter()
        .find(|(r, m, _)| r == resource && *m == Mark::End)
        .map(|(_, _, t)| *t)
        .unwrap_or_else(|| panic!("no end for {}", resource));
    (start, end)
}

fn spans(timeline: &Timeline, resource: &str) -> Vec<(Instant, Instant)> {
    let entries = timeline.lock();
    let starts: Vec<Instant> = entries
        .iter()
        .filter(|(r, m, _)| r == resource && *m == Mark::Start)
        .map(|(_, _, t)| *t)
        .collect();
    let ends: Vec<Instant> = entries
        .iter()
        .filter(|(r, m, _)| r == resource && *m == Mark::End)
        .map(|(_, _, t)| *t)
        .collect();
    starts.into_iter().zip(ends).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_resource_calls_serialize_while_others_run_in_parallel() {
    let timeline: Timeline = Arc::new(Mutex::new(Vec::new()));

    let mut service = Service::new("test");
    let t = Arc::clone(&timeline);
    service
        .add_handler(
            ">",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .call("inc", move |mut r| {
                    let resource = r.resource().to_string();
                    t.lock().push((resource.clone(), Mark::Start, Instant::now()));
                    std::thread::sleep(Duration::from_millis(80));
                    t.lock().push((resource, Mark::End, Instant::now()));
                    r.ok(Value::Null)
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    // initial reset
    conn.next_published().await.unwrap();

    conn.request("call.test.model.inc", "_INBOX.1", &request_body("c1"));
    tokio::time::sleep(Duration::from_millis(1)).await;
    conn.request("call.test.model.inc", "_INBOX.2", &request_body("c1"));
    conn.request("call.test.other.inc", "_INBOX.3", &request_body("c1"));

    // three replies, in completion order
    for _ in 0..3 {
        assert!(conn.next_published().await.is_some(), "missing a reply");
    }

    let model_spans = spans(&timeline, "test.model");
    assert_eq!(model_spans.len(), 2, "both model calls must run");
    // the second invocation starts only after the first has finished
    assert!(
        model_spans[1].0 >= model_spans[0].1,
        "same-resource handlers overlapped: {:?}",
        *timeline.lock()
    );

    // the other resource ran while the first model call was sleeping
    let (other_start, other_end) = span(&timeline, "test.other");
    assert!(
        other_end < model_spans[1].0,
        "other resource should not queue behind model"
    );
    assert!(
        other_start < model_spans[0].1,
        "other resource should run in parallel with model"
    );

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn grouped_patterns_share_one_queue() {
    let timeline: Timeline = Arc::new(Mutex::new(Vec::new()));

    let mut service = Service::new("test");
    let t = Arc::clone(&timeline);
    service
        .add_handler_grouped(
            "book.$id",
            "books",
            Handler::model()
                .get(|mut r| r.model(json!({})))
                .call("touch", move |mut r| {
                    let resource = r.resource().to_string();
                    t.lock().push((resource.clone(), Mark::Start, Instant::now()));
                    std::thread::sleep(Duration::from_millis(50));
                    t.lock().push((resource, Mark::End, Instant::now()));
                    r.ok(Value::Null)
                }),
        )
        .unwrap();

    let conn = MockConn::new();
    service.serve(conn.clone()).await.unwrap();
    conn.next_published().await.unwrap();

    // distinct resources, same group: must serialize
    conn.request("call.test.book.1.touch", "_INBOX.1", &request_body("c1"));
    conn.request("call.test.book.2.touch", "_INBOX.2", &request_body("c1"));

    for _ in 0..2 {
        assert!(conn.next_published().await.is_some(), "missing a reply");
    }

    let (_, first_end) = span(&timeline, "test.book.1");
    let (second_start, _) = span(&timeline, "test.book.2");
    assert!(
        second_start >= first_end,
        "grouped resources overlapped: {:?}",
        *timeline.lock()
    );

    service.shutdown().await.unwrap();
}
