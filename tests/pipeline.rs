//! Middleware composition and status classification.

use charon::prelude::*;
use charon_testing::StepSpy;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recording(
    log: &Log,
    name: &'static str,
) -> impl Step<Payload> + 'static {
    let log = log.clone();
    from_fn(
        move |_owner, error, data: Option<Payload>, next: Next<Payload>| -> BoxFuture<'static, ()> {
            log.lock().push(name);
            next.run(error, data)
        },
    )
}

fn status_payload(status: Option<i64>) -> Payload {
    let mut value = json!({ "testProperty": "testValue" });
    if let Some(status) = status {
        value["statusCode"] = json!(status);
    }
    Payload::Value(value)
}

#[tokio::test]
async fn test_slices_recombine_in_order() {
    let log: Log = Arc::default();
    let pipeline = Pipeline::new()
        .with(recording(&log, "spy1"))
        .with(recording(&log, "spy2"))
        .with(recording(&log, "spy3"));
    let node = Node::root("test", Properties::new());

    let rotated = pipeline.slice(1..).concat(&pipeline.slice(0..1));
    assert_eq!(rotated.len(), 3);
    assert_eq!(pipeline.len(), 3);

    let outcome = rotated.complete(&node, None, None).await;
    assert!(outcome.is_some());
    assert_eq!(*log.lock(), vec!["spy2", "spy3", "spy1"]);
}

#[tokio::test]
async fn test_halting_step_never_reaches_callback() {
    let after = StepSpy::<Payload>::new();
    let pipeline = Pipeline::new()
        .with(StepSpy::<Payload>::halting())
        .with(after.clone());
    let node = Node::root("test", Properties::new());

    let outcome = pipeline
        .complete(&node, None, Some(Payload::Value(json!({}))))
        .await;
    assert!(outcome.is_none());
    assert!(!after.called());
}

#[tokio::test]
async fn test_invoke_next_drops_data_on_error() {
    let node = Node::root("test", Properties::new());
    let pipeline = Pipeline::new().with(InvokeNext);

    let (error, data) = pipeline
        .complete(&node, None, Some(Payload::Value(json!(1))))
        .await
        .unwrap();
    assert!(error.is_none());
    assert_eq!(data, Some(Payload::Value(json!(1))));

    let (error, data) = pipeline
        .complete(
            &node,
            Some(Error::consumer("bad")),
            Some(Payload::Value(json!(1))),
        )
        .await
        .unwrap();
    assert_eq!(error.unwrap().kind(), ErrorKind::Consumer);
    assert!(data.is_none());
}

#[tokio::test]
async fn test_status_classification() {
    let cases: &[(Option<i64>, ErrorKind)] = &[
        (Some(400), ErrorKind::Consumer),
        (Some(418), ErrorKind::Consumer),
        (Some(403), ErrorKind::RequestForbidden),
        (Some(404), ErrorKind::ResourceNotFound),
        (Some(409), ErrorKind::ResourceConflict),
        (Some(500), ErrorKind::Service),
        (Some(583), ErrorKind::Service),
        (Some(599), ErrorKind::Service),
        (Some(100), ErrorKind::Runtime),
        (Some(302), ErrorKind::Runtime),
        (Some(601), ErrorKind::Runtime),
        (Some(-18), ErrorKind::Runtime),
        (None, ErrorKind::Runtime),
    ];
    let node = Node::root("test", Properties::new());
    let pipeline = Pipeline::new().with(DetectErrors);

    for (status, kind) in cases {
        let payload = status_payload(*status);
        let (error, data) = pipeline
            .complete(&node, None, Some(payload.clone()))
            .await
            .unwrap();
        let error = error.unwrap_or_else(|| panic!("no error for {status:?}"));

        assert_eq!(error.kind(), *kind, "status {status:?}");
        assert_eq!(error.data(), Some(&payload.to_value()));
        if *kind == ErrorKind::Runtime {
            assert_eq!(error.message(), "Unrecognized HTTP status code");
        } else {
            assert_eq!(error.message(), "");
        }
        assert!(data.is_none(), "status {status:?}");
    }
}

#[tokio::test]
async fn test_success_statuses_pass_through() {
    let node = Node::root("test", Properties::new());
    let pipeline = Pipeline::new().with(DetectErrors);

    for status in [200, 201, 204, 299] {
        let payload = status_payload(Some(status));
        let (error, data) = pipeline
            .complete(&node, None, Some(payload.clone()))
            .await
            .unwrap();
        assert!(error.is_none(), "status {status}");
        assert_eq!(data, Some(payload));
    }
}

#[tokio::test]
async fn test_detect_then_parse() {
    let node = Node::root("test", Properties::new());
    let pipeline = Pipeline::new().with(DetectErrors).with(ParseResource);
    let response = ResponseSpec::new(200, json!({ "name": "charon" }))
        .with_request(RequestSpec::new("http://example.com/boat"));

    let (error, data) = pipeline
        .complete(&node, None, Some(Payload::Response(response)))
        .await
        .unwrap();
    assert!(error.is_none());
    let resource = data.and_then(Payload::into_resource).unwrap();
    assert_eq!(resource.get("name"), Some(&Value::from("charon")));
    assert_eq!(
        resource.link("self").map(|link| link.href.clone()),
        Some("http://example.com/boat".to_string())
    );
}

#[tokio::test]
async fn test_on_success_skips_after_error() {
    let node = Node::root("test", Properties::new());
    let spy = StepSpy::<Payload>::new();
    let pipeline = Pipeline::new()
        .with(DetectErrors)
        .with(on_success(spy.clone()));

    let (error, _) = pipeline
        .complete(&node, None, Some(status_payload(Some(409))))
        .await
        .unwrap();
    assert_eq!(error.unwrap().kind(), ErrorKind::ResourceConflict);
    assert!(!spy.called());

    pipeline
        .complete(&node, None, Some(status_payload(Some(200))))
        .await
        .unwrap();
    assert_eq!(spy.call_count(), 1);
}
