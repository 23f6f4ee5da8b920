//! Resource managers and the service calls they declare.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::client::{Client, submit};
use crate::middleware::{Pipeline, on_success};
use crate::node::{
    Node, PARSE_RESOURCE, Properties, RESOURCE_MIDDLEWARE, RESPONSE_MIDDLEWARE, Service,
    ServiceCallback,
};
use crate::request::RequestSpec;
use crate::response::Payload;
use crate::{Error, Result};

/// Groups service calls that share configuration.
///
/// A manager delegates to its client: the client's strategies are visible,
/// and of the client's values only the service parameters are.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    node: Node,
    client: Client,
}

impl ResourceManager {
    pub(crate) fn new(client: Client, overrides: Properties) -> Self {
        let node = client.node().delegate("resource-manager", overrides);
        debug!(node = %node.label(), client = %client.node().label(), "Resource manager created");
        Self { node, client }
    }

    /// The node backing this manager.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The client this manager delegates to.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Apply runtime options to the manager.
    pub fn initialize(&self, options: Properties) {
        self.node.initialize(options);
    }

    /// Resolve a value on the manager.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.node.value(name)
    }

    /// Effective config: the client's config overlaid by the manager's.
    pub fn config(&self) -> Map<String, Value> {
        self.node.config()
    }

    /// Define a service call. `overrides` take precedence over the manager,
    /// which takes precedence over the client.
    pub fn define_service_call(&self, overrides: Properties) -> ServiceCall {
        ServiceCall {
            client: self.client.clone(),
            manager: self.node.clone(),
            layer: self.node.scope("service-call", overrides),
            context: self.node.clone(),
        }
    }

    /// Declare named service calls on the manager. Each runs in its own child
    /// extension of the manager.
    pub fn declare_service_calls<I, S>(&self, declarations: I)
    where
        I: IntoIterator<Item = (S, Properties)>,
        S: Into<String>,
    {
        for (name, overrides) in declarations {
            let service = Arc::new(DeclaredCall {
                client: self.client.clone(),
            });
            self.node.declare_service(name, overrides, service);
        }
    }

    /// A declared service call, as a standalone handle.
    pub fn service_call(&self, name: &str) -> Option<ServiceCall> {
        let context = self.node.service_context(name)?;
        Some(ServiceCall {
            client: self.client.clone(),
            manager: self.node.clone(),
            layer: context.clone(),
            context,
        })
    }

    /// Invoke a declared service call by name.
    pub async fn call<F>(&self, name: &str, params: Option<Value>, callback: F) -> Result<()>
    where
        F: FnOnce(&Node, Result<Payload>) + Send + 'static,
    {
        self.node.call(name, params, callback).await
    }
}

/// A configured operation: assemble a request, transmit it, and run the
/// response through middleware.
#[derive(Debug, Clone)]
pub struct ServiceCall {
    client: Client,
    // Keeps the manager alive for declared calls, whose layer refers to it
    // weakly.
    #[allow(dead_code)]
    manager: Node,
    layer: Node,
    context: Node,
}

impl ServiceCall {
    /// The node the callback receives.
    pub fn context(&self) -> &Node {
        &self.context
    }

    /// Request spec the call would send for `params`.
    pub fn request_spec(&self, params: Option<&Value>) -> Result<RequestSpec> {
        assemble(&self.layer, params)
    }

    /// Run the call and report through `callback`.
    ///
    /// If a middleware step ends the chain, `callback` is never invoked.
    pub async fn invoke<F>(&self, params: Option<Value>, callback: F)
    where
        F: FnOnce(&Node, Result<Payload>) + Send + 'static,
    {
        dispatch(
            &self.client,
            &self.layer,
            &self.context,
            params,
            Box::new(callback),
        )
        .await
    }

    /// Run the call and return its outcome.
    ///
    /// Returns `None` when a middleware step ended the chain.
    pub async fn call(&self, params: Option<Value>) -> Option<Result<Payload>> {
        let (tx, rx) = oneshot::channel();
        self.invoke(params, move |_, outcome| {
            let _ = tx.send(outcome);
        })
        .await;
        rx.await.ok()
    }
}

#[async_trait]
impl Service for ServiceCall {
    async fn execute(&self, _context: &Node, params: Option<Value>, callback: ServiceCallback) {
        dispatch(&self.client, &self.layer, &self.context, params, callback).await
    }
}

/// Service registered by [`ResourceManager::declare_service_calls`]. Its
/// bound context is both the configuration layer and the callback context.
struct DeclaredCall {
    client: Client,
}

#[async_trait]
impl Service for DeclaredCall {
    async fn execute(&self, context: &Node, params: Option<Value>, callback: ServiceCallback) {
        dispatch(&self.client, context, context, params, callback).await
    }
}

/// Assemble the request spec from the request fields and declared
/// parameters resolved on `layer`.
fn assemble(layer: &Node, params: Option<&Value>) -> Result<RequestSpec> {
    let mut fields = Map::new();
    for name in layer.service_params() {
        if let Some(value) = layer.value(&name) {
            fields.insert(name, value);
        }
    }
    let mut request = RequestSpec::from_map(fields)?;

    if let Some(params) = params
        && request.has_body_method()
    {
        request.body = Some(params.clone());
    }
    if let Some(url) = &request.url {
        request.url = Some(layer.template_url(url, &[&params]));
    }
    Ok(request)
}

fn response_pipeline(layer: &Node) -> Pipeline<Payload> {
    let mut pipeline = Pipeline::new();
    if let Some(middleware) = layer.middleware(RESPONSE_MIDDLEWARE) {
        pipeline.push(middleware);
    }
    if let Some(middleware) = layer.middleware(PARSE_RESOURCE) {
        pipeline.push(middleware);
    }
    if let Some(middleware) = layer.middleware(RESOURCE_MIDDLEWARE) {
        pipeline.push(on_success(middleware));
    }
    pipeline
}

async fn dispatch(
    client: &Client,
    layer: &Node,
    context: &Node,
    params: Option<Value>,
    callback: ServiceCallback,
) {
    if !client.is_initialized() {
        warn!(node = %context.label(), "Service call on uninitialized client");
        callback(
            context,
            Err(Error::runtime("Client is not initialized")
                .with_data(serde_json::json!({ "node": context.label() }))),
        );
        return;
    }

    let request = match assemble(layer, params.as_ref()) {
        Ok(request) => request,
        Err(error) => {
            callback(context, Err(error));
            return;
        }
    };
    trace!(node = %context.label(), request = ?request, "Service call assembled request");

    let (error, data) = match submit(layer, request).await {
        Ok(response) => (None, Some(Payload::Response(response))),
        Err(error) => (Some(error), None),
    };

    response_pipeline(layer)
        .run(context, error, data, move |owner, error, data| {
            let outcome = match (error, data) {
                (Some(error), _) => Err(error),
                (None, Some(payload)) => Ok(payload),
                (None, None) => Ok(Payload::Value(Value::Null)),
            };
            callback(&owner, outcome);
        })
        .await
}
