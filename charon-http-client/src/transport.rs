//! Transports submit request specs and report response specs.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use serde_json::{Map, Value, json};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::{Redirects, TransportConfig};
use crate::request::RequestSpec;
use crate::response::ResponseSpec;
use crate::{Error, Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Submits a request and reports the response.
///
/// Any status code is a successful transmission; status classification
/// happens in response middleware.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transmit(&self, request: &RequestSpec) -> Result<ResponseSpec>;
}

/// Default transport backed by `reqwest`.
///
/// The underlying client is built on first use.
pub struct ReqwestTransport {
    config: TransportConfig,
    client: OnceLock<std::result::Result<reqwest::Client, Error>>,
}

impl ReqwestTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    /// Transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_init(|| build_client(&self.config))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn prepare(
        &self,
        client: &reqwest::Client,
        request: &RequestSpec,
    ) -> std::result::Result<reqwest::RequestBuilder, String> {
        let raw = request
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| "Invalid URL: no URL given".to_string())?;
        let url = url::Url::parse(raw).map_err(|e| format!("Invalid URL \"{raw}\": {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Invalid protocol: {}:", url.scheme()));
        }
        let method = request.http_method().map_err(|e| e.message().to_string())?;

        let mut builder = client.request(method, url);
        let mut has_content_type = false;
        if let Some(headers) = &request.headers {
            for (name, value) in headers {
                has_content_type |= name.eq_ignore_ascii_case(CONTENT_TYPE.as_str());
                builder = builder.header(name.as_str(), header_text(value));
            }
        }

        match &request.body {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => builder = builder.body(text.clone()),
            Some(body) if is_form(request) => {
                let encoded = serde_urlencoded::to_string(body)
                    .map_err(|e| format!("Invalid form body: {e}"))?;
                builder = builder.body(encoded);
            }
            Some(body) => {
                let encoded =
                    serde_json::to_vec(body).map_err(|e| format!("Invalid JSON body: {e}"))?;
                if !has_content_type {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                }
                builder = builder.body(encoded);
            }
        }

        if let Some(millis) = request.timeout {
            builder = builder.timeout(Duration::from_millis(millis));
        }
        Ok(builder)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .field("ready", &self.client.get().is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn transmit(&self, request: &RequestSpec) -> Result<ResponseSpec> {
        let client = self.client()?;
        let builder = self
            .prepare(client, request)
            .map_err(|message| client_error(request, message))?;

        debug!(
            method = request.method.as_deref().unwrap_or("GET"),
            url = request.url.as_deref().unwrap_or_default(),
            "Sending HTTP request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| send_error(request, self.config.connect_timeout, e))?;
        decode(response, request, self.config.connect_timeout).await
    }
}

fn build_client(config: &TransportConfig) -> std::result::Result<reqwest::Client, Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.default_headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::runtime(format!("Invalid default header name: {name}")).with_source(e)
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            Error::runtime(format!("Invalid default header value: {value}")).with_source(e)
        })?;
        headers.insert(name, value);
    }

    let builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .gzip(config.decompress)
        .brotli(config.decompress)
        .redirect(match config.redirects {
            Redirects::Never => Policy::none(),
            Redirects::Limited(max) => Policy::limited(max),
        });

    builder
        .build()
        .map_err(|e| Error::runtime("Failed to build HTTP client").with_source(e))
}

fn is_form(request: &RequestSpec) -> bool {
    request
        .header_value(CONTENT_TYPE.as_str())
        .and_then(Value::as_str)
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn decode(
    response: reqwest::Response,
    request: &RequestSpec,
    connect_timeout: Duration,
) -> Result<ResponseSpec> {
    let status = i64::from(response.status().as_u16());

    let mut headers = Map::new();
    for (name, value) in response.headers() {
        let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match headers.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&text);
            }
            _ => {
                headers.insert(name.as_str().to_string(), Value::String(text));
            }
        }
    }
    let is_json = headers
        .get(CONTENT_TYPE.as_str())
        .and_then(Value::as_str)
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

    let bytes = response.bytes().await.map_err(|e| send_error(request, connect_timeout, e))?;
    trace!(status, bytes = bytes.len(), "Received HTTP response");

    let body = if bytes.is_empty() {
        Value::Null
    } else if is_json {
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(status, error = %e, "Failed to decode JSON body");
                let data = json!({
                    "err": { "message": e.to_string() },
                    "response": {
                        "body": String::from_utf8_lossy(&bytes),
                        "statusCode": status,
                        "headers": headers,
                        "requestSpec": request.to_value(),
                    }
                });
                return Err(Error::parse("Failed to parse resource identified as JSON")
                    .with_data(data)
                    .with_source(e));
            }
        }
    } else {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    };

    Ok(ResponseSpec {
        body,
        status_code: Some(status),
        headers,
        request_spec: request.clone(),
    })
}

fn client_error(request: &RequestSpec, message: String) -> Error {
    warn!(error = %message, "HTTP client error");
    Error::runtime("HTTP client error").with_data(json!({
        "err": { "message": message },
        "request": request.to_value(),
    }))
}

fn send_error(request: &RequestSpec, connect_timeout: Duration, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        return timeout_error(request, connect_timeout, error.to_string()).with_source(error);
    }
    client_error(request, error.to_string()).with_source(error)
}

/// The request's own deadline when it has one, otherwise the connect
/// timeout, which is the only other deadline the client enforces.
fn elapsed_deadline(request: &RequestSpec, connect_timeout: Duration) -> u64 {
    request
        .timeout
        .unwrap_or_else(|| u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX))
}

fn timeout_error(request: &RequestSpec, connect_timeout: Duration, message: String) -> Error {
    let millis = elapsed_deadline(request, connect_timeout);
    warn!(timeout_ms = millis, "HTTP request timed out");
    Error::timeout(format!("Timeout after {millis}ms")).with_data(json!({
        "err": { "message": message, "code": "ETIMEDOUT" },
        "request": request.to_value(),
    }))
}
