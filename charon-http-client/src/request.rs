//! Transport-agnostic request description.

use http::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Request fields every service call resolves, in addition to any declared
/// `serviceCallParams`.
pub const REQUEST_FIELDS: [&str; 5] = ["url", "method", "headers", "body", "timeout"];

/// A transport-agnostic request.
///
/// Unknown service parameters are kept in `params` and serialized inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    /// Target URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP method; the transport defaults to `GET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Timeout in milliseconds, passed through to the transport. Fractional
    /// values round up to the next whole millisecond.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_millis"
    )]
    pub timeout: Option<u64>,
    /// Additional service parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(millis) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if !millis.is_finite() || millis < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "timeout must be a non-negative number of milliseconds, got {millis}"
        )));
    }
    Ok(Some(millis.ceil() as u64))
}

impl RequestSpec {
    /// Create a request for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Set the method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the timeout in milliseconds.
    pub fn timeout(mut self, millis: u64) -> Self {
        self.timeout = Some(millis);
        self
    }

    /// Add a service parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Build a spec from a field map. `null` entries are dropped.
    pub fn from_map(mut fields: Map<String, Value>) -> Result<Self> {
        fields.retain(|_, value| !value.is_null());
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::runtime(format!("Invalid request spec: {e}")).with_source(e))
    }

    /// Spec as a JSON value, as recorded in error data.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parsed HTTP method, `GET` when unset.
    pub fn http_method(&self) -> Result<Method> {
        match &self.method {
            None => Ok(Method::GET),
            Some(name) => Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map_err(|e| Error::runtime(format!("Invalid method: {name}")).with_source(e)),
        }
    }

    /// Whether the method carries a request body.
    pub fn has_body_method(&self) -> bool {
        matches!(
            self.method.as_deref().map(str::to_ascii_uppercase).as_deref(),
            Some("POST" | "PUT" | "PATCH")
        )
    }

    /// Header lookup, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&Value> {
        self.headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }
}
