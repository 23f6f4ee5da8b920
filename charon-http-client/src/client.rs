//! Client: the root of a configuration tree.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::middleware::Pipeline;
use crate::node::{
    Node, PARSE_RESOURCE, Properties, RESOURCE_MIDDLEWARE, RESPONSE_MIDDLEWARE,
};
use crate::request::RequestSpec;
use crate::resource::{Resource, ResourceSpec};
use crate::resource_manager::ResourceManager;
use crate::response::ResponseSpec;
use crate::response_middleware::{DetectErrors, ParseResource};
use crate::template::ParamSource;
use crate::transport::ReqwestTransport;
use crate::{Error, Result};

/// Entry point of the toolkit.
///
/// A client holds a transport, the response middleware applied to every
/// service call, and shared configuration. Resource managers created from a
/// client delegate to it.
///
/// # Examples
///
/// ```no_run
/// use charon_http_client::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let client = Client::new();
/// client.initialize(Properties::new().value("rootUrl", "https://api.example.com"));
///
/// let users = client.resource_manager(Properties::new());
/// let get_user = users.define_service_call(
///     Properties::new().value("url", ":rootUrl/users/:id"),
/// );
///
/// let user = get_user.call(Some(serde_json::json!({ "id": 7 }))).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    node: Node,
}

impl Client {
    /// Create a client with the default transport and middleware.
    pub fn new() -> Self {
        Self::factory(Properties::new())
    }

    /// Create a client whose properties override the defaults.
    pub fn factory(overrides: Properties) -> Self {
        Self::with_transport_config(TransportConfig::default(), overrides)
    }

    /// Create a client whose default transport uses `config`.
    pub fn with_transport_config(config: TransportConfig, overrides: Properties) -> Self {
        let defaults = Node::root("Charon.Client", Self::defaults(config));
        let node = defaults.extend("client", overrides);
        debug!(node = %node.label(), "Client created");
        Self { node }
    }

    fn defaults(config: TransportConfig) -> Properties {
        Properties::new()
            .transport(ReqwestTransport::new(config))
            .step(RESPONSE_MIDDLEWARE, DetectErrors)
            .step(PARSE_RESOURCE, ParseResource)
            .middleware(RESOURCE_MIDDLEWARE, Pipeline::new())
    }

    /// The node backing this client.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Apply runtime options. Strategies replace properties; values become
    /// config and win over factory values of the same name.
    pub fn initialize(&self, options: Properties) {
        self.node.initialize(options);
    }

    /// Whether [`Client::initialize`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.node.is_initialized()
    }

    /// Current config values.
    pub fn config(&self) -> Map<String, Value> {
        self.node.config()
    }

    /// Resolve a value on the client.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.node.value(name)
    }

    /// Derive a client that inherits everything this client resolves. The
    /// extension starts uninitialized.
    pub fn extend(&self, overrides: Properties) -> Client {
        let node = self
            .node
            .extend(format!("{}+", self.node.label()), overrides);
        Self { node }
    }

    /// Create a resource manager that delegates to this client.
    pub fn resource_manager(&self, overrides: Properties) -> ResourceManager {
        ResourceManager::new(self.clone(), overrides)
    }

    /// Expand a URL template against `sources`, then the client config.
    pub fn template_url(&self, template: &str, sources: &[&dyn ParamSource]) -> String {
        self.node.template_url(template, sources)
    }

    /// Submit a request with the client's transport. No middleware runs.
    pub async fn submit_request(&self, request: RequestSpec) -> Result<ResponseSpec> {
        submit(&self.node, request).await
    }

    /// Build a resource.
    pub fn resource(&self, spec: ResourceSpec) -> Resource {
        Resource::new(spec)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Submit `request` with the transport resolved from `context`.
pub(crate) async fn submit(context: &Node, request: RequestSpec) -> Result<ResponseSpec> {
    let transport = context
        .transport()
        .ok_or_else(|| Error::runtime("No transport configured"))?;

    let result = transport.transmit(&request).await;
    match &result {
        Ok(response) => debug!(
            node = %context.label(),
            status = ?response.status_code,
            "Request completed"
        ),
        Err(error) => warn!(node = %context.label(), error = %error, "Request failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use serde_json::json;

    #[test]
    fn test_defaults_are_installed() {
        let client = Client::new();
        assert!(client.node().transport().is_some());
        assert_eq!(
            client.node().middleware(RESPONSE_MIDDLEWARE).map(|p| p.len()),
            Some(1)
        );
        assert_eq!(client.node().middleware(PARSE_RESOURCE).map(|p| p.len()), Some(1));
        assert_eq!(
            client.node().middleware(RESOURCE_MIDDLEWARE).map(|p| p.len()),
            Some(0)
        );
        assert!(!client.is_initialized());
    }

    #[test]
    fn test_factory_overrides_defaults() {
        let client = Client::factory(
            Properties::new()
                .middleware(RESPONSE_MIDDLEWARE, Pipeline::new())
                .value("headers", json!({ "test": "factory" })),
        );
        assert_eq!(client.node().middleware(RESPONSE_MIDDLEWARE).map(|p| p.len()), Some(0));
        assert_eq!(client.get("headers"), Some(json!({ "test": "factory" })));
        assert!(client.config().is_empty());
    }

    #[test]
    fn test_initialize_values_win_over_factory_values() {
        let client = Client::factory(Properties::new().value("headers", json!({ "a": 1 })));
        client.initialize(Properties::new().value("headers", json!({ "b": 2 })));
        assert_eq!(client.get("headers"), Some(json!({ "b": 2 })));
        assert!(client.is_initialized());
    }

    #[test]
    fn test_extension_inherits_strategies_not_config() {
        let client = Client::factory(Properties::new().value("method", "GET"));
        client.initialize(Properties::new().value("url", "http://example.com/"));
        let extended = client.extend(Properties::new().value("timeout", 10));

        let base_transport = client.node().transport().unwrap();
        let extended_transport = extended.node().transport().unwrap();
        assert!(Arc::ptr_eq(&base_transport, &extended_transport));

        assert_eq!(extended.get("timeout"), Some(json!(10)));
        assert_eq!(extended.get("method"), Some(json!("GET")));
        assert!(!extended.is_initialized());
        assert_eq!(extended.get("url"), None);
        assert!(extended.config().is_empty());
    }

    #[test]
    fn test_template_url_uses_config() {
        let client = Client::new();
        client.initialize(Properties::new().value("rootUrl", "http://example.com"));
        let params = json!({ "id": 1 });
        assert_eq!(
            client.template_url(":rootUrl/items/:id", &[&params]),
            "http://example.com/items/1"
        );
    }

    #[tokio::test]
    async fn test_submit_request_reports_transport_errors() {
        let err = Client::new()
            .submit_request(RequestSpec::new("foo://example.com/"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "HTTP client error");
    }
}
