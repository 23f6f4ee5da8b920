//! Responses as seen by middleware, and pipeline payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::RequestSpec;
use crate::resource::Resource;

/// A response as reported by a transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    /// Decoded body: JSON when the content type says so, text otherwise,
    /// `null` when empty.
    #[serde(default)]
    pub body: Value,
    /// Status code. Kept signed and optional so malformed codes can be
    /// classified instead of rejected.
    #[serde(default)]
    pub status_code: Option<i64>,
    /// Response headers, lower-case names.
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// The request that produced this response.
    #[serde(default)]
    pub request_spec: RequestSpec,
}

impl ResponseSpec {
    /// Create a response with a status code and body.
    pub fn new(status_code: i64, body: Value) -> Self {
        Self {
            status_code: Some(status_code),
            body,
            ..Default::default()
        }
    }

    /// Attach the originating request.
    pub fn with_request(mut self, request_spec: RequestSpec) -> Self {
        self.request_spec = request_spec;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Check if the status is 2xx.
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, Some(200..=299))
    }

    /// Response as a JSON value, as recorded in error data.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Data flowing through a service call's middleware.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw response from the transport.
    Response(ResponseSpec),
    /// Parsed resource.
    Resource(Resource),
    /// Anything a custom step produced.
    Value(Value),
}

impl Payload {
    /// Status code carried by the payload, if any.
    ///
    /// Object values are inspected for a `statusCode` key.
    pub fn status_code(&self) -> Option<i64> {
        match self {
            Self::Response(response) => response.status_code,
            Self::Value(value) => value.get("statusCode").and_then(Value::as_i64),
            Self::Resource(_) => None,
        }
    }

    /// JSON view of the payload. Resources render as their data fields.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Response(response) => response.to_value(),
            Self::Resource(resource) => Value::Object(resource.data().clone()),
            Self::Value(value) => value.clone(),
        }
    }

    /// Borrow the resource, if this payload is one.
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// Take the resource, if this payload is one.
    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// Borrow the response, if this payload is one.
    pub fn as_response(&self) -> Option<&ResponseSpec> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }
}

impl From<ResponseSpec> for Payload {
    fn from(response: ResponseSpec) -> Self {
        Self::Response(response)
    }
}

impl From<Resource> for Payload {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let response = ResponseSpec::new(200, json!({ "data": "foo" }))
            .with_request(RequestSpec::new("http://example.com/").param("testProp", "token"));

        assert_eq!(
            response.to_value(),
            json!({
                "body": { "data": "foo" },
                "statusCode": 200,
                "headers": {},
                "requestSpec": { "url": "http://example.com/", "testProp": "token" }
            })
        );
    }

    #[test]
    fn test_status_code_of_payloads() {
        assert_eq!(Payload::from(ResponseSpec::new(404, Value::Null)).status_code(), Some(404));
        assert_eq!(Payload::from(json!({ "statusCode": -18 })).status_code(), Some(-18));
        assert_eq!(Payload::from(json!({ "other": 1 })).status_code(), None);
        assert_eq!(Payload::from(json!("text")).status_code(), None);
    }

    #[test]
    fn test_success_range() {
        assert!(ResponseSpec::new(200, Value::Null).is_success());
        assert!(ResponseSpec::new(299, Value::Null).is_success());
        assert!(!ResponseSpec::new(300, Value::Null).is_success());
        assert!(!ResponseSpec::default().is_success());
    }
}
