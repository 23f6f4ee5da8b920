//! End-to-end service calls against a mock HTTP server.

use charon::prelude::*;
use charon_testing::{StepSpy, assert_error_kind, assert_field, assert_link, assert_resource};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn request_props(url: &str) -> Properties {
    Properties::new()
        .value("url", url)
        .value("method", "GET")
        .value("headers", json!({ "test": "testHeaderValue" }))
        .value("timeout", 5000)
}

async fn server_with(status: u16, body: Option<Value>) -> MockServer {
    let server = MockServer::start().await;
    let mut template = ResponseTemplate::new(status);
    if let Some(body) = body {
        template = template.set_body_json(body);
    }
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("test", "testHeaderValue"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_success_yields_resource_with_self_link() {
    init_tracing();
    let server = server_with(200, Some(json!({ "data": "foo" }))).await;
    let url = format!("{}/", server.uri());

    let client = Client::new();
    client.initialize(Properties::new());
    let manager = client.resource_manager(Properties::new());
    let call = manager.define_service_call(request_props(&url));

    let outcome = call.call(Some(json!({}))).await.unwrap();
    let resource = assert_resource(&outcome);
    assert_eq!(resource.data(), json!({ "data": "foo" }).as_object().unwrap());
    assert_eq!(resource.all_links(), vec![Link::new("self", url)]);
}

#[tokio::test]
async fn test_callback_runs_on_manager() {
    let server = server_with(200, Some(json!({ "data": "foo" }))).await;

    let client = Client::new();
    client.initialize(Properties::new());
    let manager = client.resource_manager(Properties::new());
    let call = manager.define_service_call(request_props(&format!("{}/", server.uri())));

    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    call.invoke(Some(json!({})), move |owner, outcome| {
        *slot.lock() = Some((owner.clone(), outcome));
    })
    .await;

    let (owner, outcome) = seen.lock().take().unwrap();
    assert_eq!(&owner, manager.node());
    assert_field(assert_resource(&outcome), "data", &json!("foo"));
}

#[tokio::test]
async fn test_client_error_skips_resource_middleware() {
    init_tracing();
    let server = server_with(400, None).await;

    let resource_spy = StepSpy::<Payload>::new();
    let parse_spy = StepSpy::<Payload>::wrapping(ParseResource);
    let client = Client::new();
    client.initialize(
        Properties::new()
            .step("resourceMiddleware", resource_spy.clone())
            .step("parseResource", parse_spy.clone()),
    );
    let manager = client.resource_manager(Properties::new());
    let call = manager.define_service_call(request_props(&format!("{}/", server.uri())));

    let outcome = call.call(Some(json!({}))).await.unwrap();
    let error = assert_error_kind(&outcome, ErrorKind::Consumer);
    assert_eq!(error.data().unwrap()["statusCode"], json!(400));

    assert!(!resource_spy.called());
    let parse_call = parse_spy.first_call().unwrap();
    assert!(parse_spy.called_on(manager.node()));
    assert!(parse_call.error.unwrap().is_consumer());
    assert!(parse_call.data.is_none());
}

#[tokio::test]
async fn test_response_middleware_receives_response_spec() {
    let server = server_with(200, Some(json!({ "data": "foo" }))).await;
    let url = format!("{}/", server.uri());

    let spy = StepSpy::<Payload>::wrapping(DetectErrors);
    let client = Client::new();
    client.initialize(Properties::new().step("responseMiddleware", spy.clone()));
    let manager = client.resource_manager(Properties::new());
    let call = manager.define_service_call(request_props(&url));

    call.call(Some(json!({}))).await.unwrap().unwrap();

    let first = spy.first_call().unwrap();
    assert!(first.error.is_none());
    assert_eq!(first.owner, *manager.node());
    let response = first.data.unwrap();
    let response = response.as_response().unwrap();
    assert_eq!(response.body, json!({ "data": "foo" }));
    assert_eq!(response.status_code, Some(200));
    assert_eq!(
        response.request_spec,
        RequestSpec::new(url)
            .method("GET")
            .header("test", "testHeaderValue")
            .timeout(5000)
    );
}

#[tokio::test]
async fn test_response_middleware_sees_transport_errors() {
    let spy = StepSpy::<Payload>::new();
    let client = Client::new();
    client.initialize(Properties::new().step("responseMiddleware", spy.clone()));
    let manager = client.resource_manager(Properties::new());
    // fails before anything is sent
    let call = manager.define_service_call(request_props("testUrl2"));

    let outcome = call.call(Some(json!({}))).await.unwrap();
    let error = assert_error_kind(&outcome, ErrorKind::Runtime);
    assert_eq!(error.message(), "HTTP client error");

    assert!(spy.called_on(manager.node()));
    assert_eq!(spy.first_call().unwrap().error.unwrap().message(), "HTTP client error");
}

#[tokio::test]
async fn test_custom_parse_resource_transforms_data() {
    let server = server_with(200, Some(json!({ "data": "foo" }))).await;

    let client = Client::factory(Properties::new().step(
        "parseResource",
        from_fn(|_owner, error, data: Option<Payload>, next: Next<Payload>| {
            let transformed = data.and_then(|payload| {
                let body = payload.as_response()?.body["data"].as_str()?.to_string();
                Some(Payload::Value(json!({ "data2": format!("{body}bar") })))
            });
            next.run(error, transformed)
        }),
    ));
    client.initialize(Properties::new());
    let call = client
        .resource_manager(Properties::new())
        .define_service_call(request_props(&format!("{}/", server.uri())));

    let payload = call.call(Some(json!({}))).await.unwrap().unwrap();
    assert_eq!(payload, Payload::Value(json!({ "data2": "foobar" })));
}

#[tokio::test]
async fn test_post_sends_params_as_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_json(json!({ "sed": "awk" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9 })))
        .mount(&server)
        .await;

    let client = Client::new();
    client.initialize(Properties::new().value("rootUrl", server.uri()));
    let call = client.resource_manager(Properties::new()).define_service_call(
        Properties::new()
            .value("url", ":rootUrl/users")
            .value("method", "POST"),
    );

    let outcome = call.call(Some(json!({ "sed": "awk" }))).await.unwrap();
    let resource = assert_resource(&outcome);
    assert_field(resource, "id", &json!(9));
    assert_link(resource, "self", &format!("{}/users", server.uri()));
}

#[tokio::test]
async fn test_not_found_through_declared_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = Client::new();
    client.initialize(Properties::new().value("rootUrl", server.uri()));
    let manager = client.resource_manager(Properties::new());
    manager.declare_service_calls([(
        "getItem",
        Properties::new().value("url", ":rootUrl/items/:id"),
    )]);

    let outcome = Arc::new(Mutex::new(None));
    let slot = outcome.clone();
    manager
        .call("getItem", Some(json!({ "id": 404 })), move |_, result| {
            *slot.lock() = Some(result);
        })
        .await
        .unwrap();

    let result = outcome.lock().take().unwrap();
    let error = assert_error_kind(&result, ErrorKind::ResourceNotFound);
    assert!(error.is_consumer());
    assert_eq!(error.message(), "");
}

#[tokio::test]
async fn test_server_error_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = Client::new();
    client.initialize(Properties::new());
    let call = client
        .resource_manager(Properties::new())
        .define_service_call(Properties::new().value("url", server.uri()));

    let outcome = call.call(None).await.unwrap();
    assert_error_kind(&outcome, ErrorKind::Service);
}
