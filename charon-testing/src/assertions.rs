// Test assertions for service call outcomes

use charon_http_client::{Error, ErrorKind, Payload, RequestSpec, Resource, Result};
use serde_json::Value;

/// Assert that an outcome failed with `kind` exactly
pub fn assert_error_kind(outcome: &Result<Payload>, kind: ErrorKind) -> &Error {
    match outcome {
        Err(error) => {
            assert_eq!(
                error.kind(),
                kind,
                "Expected {}, got {}",
                kind.name(),
                error.name()
            );
            error
        }
        Ok(payload) => panic!("Expected {}, got success: {:?}", kind.name(), payload),
    }
}

/// Assert that an outcome failed with `kind` or one of its descendants
pub fn assert_error_is(outcome: &Result<Payload>, kind: ErrorKind) {
    match outcome {
        Err(error) => assert!(
            error.is(kind),
            "Expected {} to be a {}",
            error.name(),
            kind.name()
        ),
        Ok(payload) => panic!("Expected {}, got success: {:?}", kind.name(), payload),
    }
}

/// Assert that an outcome succeeded with a resource, and return it
pub fn assert_resource(outcome: &Result<Payload>) -> &Resource {
    match outcome {
        Ok(Payload::Resource(resource)) => resource,
        Ok(other) => panic!("Expected a resource, got {:?}", other),
        Err(error) => panic!("Expected a resource, got error: {}", error),
    }
}

/// Assert that a resource has a data field equal to `expected`
pub fn assert_field(resource: &Resource, name: &str, expected: &Value) {
    let actual = resource.get(name);
    assert_eq!(
        actual,
        Some(expected),
        "Expected field '{}' to be {}, got {:?}",
        name,
        expected,
        actual
    );
}

/// Assert that a resource has a link `rel` pointing at `href`
pub fn assert_link(resource: &Resource, rel: &str, href: &str) {
    let actual = resource.link(rel).map(|link| link.href.as_str());
    assert_eq!(
        actual,
        Some(href),
        "Expected link '{}' to be '{}', got {:?}",
        rel,
        href,
        actual
    );
}

/// Assert that a request carries a header, compared case-insensitively by name
pub fn assert_request_header(request: &RequestSpec, name: &str, expected: &str) {
    let actual = request.header_value(name).and_then(Value::as_str);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        name,
        expected,
        actual
    );
}
