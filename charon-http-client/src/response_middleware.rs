//! Default response middleware: status classification and resource parsing.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::middleware::{Next, Step};
use crate::node::Node;
use crate::resource::{Link, Resource, ResourceSpec};
use crate::response::{Payload, ResponseSpec};
use crate::{Error, ErrorKind, Result};

/// Message used when a status code falls outside the classified ranges.
pub const UNRECOGNIZED_STATUS: &str = "Unrecognized HTTP status code";

/// Map a status code to the error kind it represents. `None` means success.
///
/// A missing code, or anything outside 2xx/4xx/5xx, is a runtime error.
pub fn classify_status(status: Option<i64>) -> Option<ErrorKind> {
    match status {
        Some(200..=299) => None,
        Some(403) => Some(ErrorKind::RequestForbidden),
        Some(404) => Some(ErrorKind::ResourceNotFound),
        Some(409) => Some(ErrorKind::ResourceConflict),
        Some(400..=499) => Some(ErrorKind::Consumer),
        Some(500..=599) => Some(ErrorKind::Service),
        _ => Some(ErrorKind::Runtime),
    }
}

/// Turn a payload into an error when its status code is not a success.
///
/// The error carries the whole payload as data.
pub fn detect_errors(payload: Payload) -> Result<Payload> {
    let status = payload.status_code();
    match classify_status(status) {
        None => Ok(payload),
        Some(kind) => {
            let message = if kind == ErrorKind::Runtime {
                UNRECOGNIZED_STATUS
            } else {
                ""
            };
            debug!(status = ?status, error = kind.name(), "Classified response as error");
            Err(Error::new(kind, message).with_data(payload.to_value()))
        }
    }
}

/// Build a resource from a response: object bodies become data, anything
/// else is kept under `meta.body`; the requested URL becomes the `self` link.
pub fn resource_from_response(response: ResponseSpec) -> Resource {
    let ResponseSpec {
        body, request_spec, ..
    } = response;

    let mut spec = match body {
        Value::Object(data) => ResourceSpec::with_data(data),
        Value::Null => ResourceSpec::default(),
        other => ResourceSpec::default().meta("body", other),
    };
    if let Some(url) = request_spec.url {
        spec = spec.link(Link::new("self", url));
    }
    Resource::new(spec)
}

/// Classifies responses by status code.
///
/// An incoming error is forwarded as-is with no data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectErrors;

#[async_trait]
impl Step<Payload> for DetectErrors {
    async fn call(
        &self,
        owner: Node,
        error: Option<Error>,
        data: Option<Payload>,
        next: Next<Payload>,
    ) {
        if let Some(error) = error {
            return next.fail(error).await;
        }
        let outcome = match data {
            Some(payload) => detect_errors(payload),
            None => Err(
                Error::runtime(UNRECOGNIZED_STATUS).with_data(json!({ "statusCode": null }))
            ),
        };
        trace!(node = %owner.label(), ok = outcome.is_ok(), "Detected response status");
        match outcome {
            Ok(payload) => next.ok(payload).await,
            Err(error) => next.fail(error).await,
        }
    }
}

/// Converts response payloads into resources. Other payloads pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseResource;

#[async_trait]
impl Step<Payload> for ParseResource {
    async fn call(
        &self,
        owner: Node,
        error: Option<Error>,
        data: Option<Payload>,
        next: Next<Payload>,
    ) {
        if let Some(error) = error {
            return next.fail(error).await;
        }
        let data = data.map(|payload| match payload {
            Payload::Response(response) => {
                trace!(node = %owner.label(), "Parsing resource from response");
                Payload::Resource(resource_from_response(response))
            }
            other => other,
        });
        next.run(None, data).await
    }
}
