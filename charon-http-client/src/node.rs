//! Configuration tree shared by clients, resource managers and service calls.
//!
//! Every object in the toolkit is backed by a [`Node`]. A node holds
//! *properties* (strategies and defaults installed at construction) and
//! *config* (values applied later through [`Node::initialize`]). Lookups walk
//! three links:
//!
//! 1. the node's own config, then its own properties,
//! 2. the *parent*, set by [`Node::extend`]; a child sees everything its
//!    parent resolves,
//! 3. the *owner*, used for delegation: a resource manager sees its client's
//!    strategies, but of the client's values only the service parameters
//!    (request fields and declared `serviceCallParams`).
//!
//! Getter strategies are evaluated on read, so a value installed on the
//! client after a manager was created is still observed by the manager.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use crate::middleware::{Pipeline, Step};
use crate::request::REQUEST_FIELDS;
use crate::response::Payload;
use crate::template::{self, ParamSource};
use crate::transport::Transport;
use crate::{Error, Result};

/// Name of the transport strategy.
pub const TRANSMIT: &str = "transmit";
/// Name of the middleware run on raw responses.
pub const RESPONSE_MIDDLEWARE: &str = "responseMiddleware";
/// Name of the middleware that turns responses into resources.
pub const PARSE_RESOURCE: &str = "parseResource";
/// Name of the middleware run on parsed resources.
pub const RESOURCE_MIDDLEWARE: &str = "resourceMiddleware";
/// Name of the list of extra parameters a service call assembles.
pub const SERVICE_CALL_PARAMS: &str = "serviceCallParams";

/// Getter evaluated against the node it is read from.
pub type Getter = Arc<dyn Fn(&Node) -> Option<Value> + Send + Sync>;

/// A behavior installed on a node.
#[derive(Clone)]
pub enum Strategy {
    /// Middleware over service call payloads.
    Middleware(Pipeline<Payload>),
    /// Transport used to submit requests.
    Transport(Arc<dyn Transport>),
    /// Value computed on read.
    Getter(Getter),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middleware(pipeline) => f.debug_tuple("Middleware").field(pipeline).finish(),
            Self::Transport(_) => f.write_str("Transport"),
            Self::Getter(_) => f.write_str("Getter"),
        }
    }
}

/// A named property: a plain value or a strategy.
#[derive(Debug, Clone)]
pub enum Prop {
    Value(Value),
    Strategy(Strategy),
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Strategy> for Prop {
    fn from(strategy: Strategy) -> Self {
        Self::Strategy(strategy)
    }
}

/// Ordered set of properties used to build or initialize nodes.
///
/// Later entries win over earlier ones with the same name.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<(String, Prop)>,
}

impl Properties {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain value.
    pub fn value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.prop(name, Prop::Value(value.into()))
    }

    /// Add a strategy.
    pub fn strategy(self, name: impl Into<String>, strategy: Strategy) -> Self {
        self.prop(name, Prop::Strategy(strategy))
    }

    /// Add a middleware pipeline.
    pub fn middleware(self, name: impl Into<String>, pipeline: Pipeline<Payload>) -> Self {
        self.strategy(name, Strategy::Middleware(pipeline))
    }

    /// Add a single step as a one-element pipeline.
    pub fn step<S: Step<Payload> + 'static>(self, name: impl Into<String>, step: S) -> Self {
        self.middleware(name, Pipeline::new().with(step))
    }

    /// Set the transport.
    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.strategy(TRANSMIT, Strategy::Transport(Arc::new(transport)))
    }

    /// Set a shared transport.
    pub fn shared_transport(self, transport: Arc<dyn Transport>) -> Self {
        self.strategy(TRANSMIT, Strategy::Transport(transport))
    }

    /// Add a getter.
    pub fn getter<F>(self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Node) -> Option<Value> + Send + Sync + 'static,
    {
        self.strategy(name, Strategy::Getter(Arc::new(getter)))
    }

    /// Declare extra parameters a service call should assemble into its
    /// request spec.
    pub fn service_call_params<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(|name| Value::String(name.into()))
            .collect();
        self.value(SERVICE_CALL_PARAMS, Value::Array(names))
    }

    /// Add a property.
    pub fn prop(mut self, name: impl Into<String>, prop: Prop) -> Self {
        self.entries.push((name.into(), prop));
        self
    }

    /// Append every entry of `other`.
    pub fn merge(mut self, other: Properties) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Plain values from a JSON object.
    pub fn from_json(map: Map<String, Value>) -> Self {
        Self {
            entries: map
                .into_iter()
                .map(|(name, value)| (name, Prop::Value(value)))
                .collect(),
        }
    }

    /// Plain values from environment variables.
    ///
    /// `PREFIX_ROOT_URL=...` becomes the value `rootUrl`.
    pub fn from_env(prefix: &str) -> Self {
        let prefix = format!("{}_", prefix.to_uppercase());
        let mut entries: Vec<(String, Prop)> = env::vars()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(&prefix)?;
                if name.is_empty() {
                    return None;
                }
                Some((camel_case(name), Prop::Value(Value::String(value))))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(prefix = %prefix, count = entries.len(), "Loaded properties from environment");
        Self { entries }
    }

    /// Look up the last entry named `name`.
    pub fn get(&self, name: &str) -> Option<&Prop> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, prop)| prop)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Properties {
    type Item = (String, Prop);
    type IntoIter = std::vec::IntoIter<(String, Prop)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Callback receiving a service call's outcome and the node it ran in.
pub type ServiceCallback = Box<dyn FnOnce(&Node, Result<Payload>) + Send>;

/// A named operation declared on a node.
#[async_trait]
pub trait Service: Send + Sync {
    /// Run in `context`, reporting through `callback`.
    async fn execute(&self, context: &Node, params: Option<Value>, callback: ServiceCallback);
}

#[derive(Clone)]
struct BoundService {
    context: Node,
    service: Arc<dyn Service>,
}

#[derive(Clone)]
enum Link {
    Strong(Node),
    Weak(Weak<NodeInner>),
}

impl Link {
    fn get(&self) -> Option<Node> {
        match self {
            Self::Strong(node) => Some(node.clone()),
            Self::Weak(weak) => weak.upgrade().map(|inner| Node { inner }),
        }
    }
}

struct NodeInner {
    label: String,
    parent: Option<Link>,
    owner: Option<Link>,
    props: RwLock<HashMap<String, Prop>>,
    config: RwLock<Map<String, Value>>,
    initialized: AtomicBool,
    services: RwLock<HashMap<String, BoundService>>,
}

/// Handle to a node. Clones share the same node; equality is identity.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    fn build(label: String, parent: Option<Link>, owner: Option<Link>, props: Properties) -> Self {
        let props = props.into_iter().collect::<HashMap<_, _>>();
        trace!(node = %label, props = props.len(), "Created node");
        Self {
            inner: Arc::new(NodeInner {
                label,
                parent,
                owner,
                props: RwLock::new(props),
                config: RwLock::new(Map::new()),
                initialized: AtomicBool::new(false),
                services: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a node with no parent or owner.
    pub fn root(label: impl Into<String>, props: Properties) -> Self {
        Self::build(label.into(), None, None, props)
    }

    /// Create a child that inherits `self`'s properties and strategies and
    /// overrides them with `props`. Config set by [`Node::initialize`] stays
    /// private to each node. The child starts uninitialized.
    pub fn extend(&self, label: impl Into<String>, props: Properties) -> Self {
        Self::build(
            label.into(),
            Some(Link::Strong(self.clone())),
            None,
            props,
        )
    }

    /// Create a child that is both extended from and owned by `self`. Unlike
    /// [`Node::extend`], it also reads `self`'s config.
    pub fn scope(&self, label: impl Into<String>, props: Properties) -> Self {
        Self::build(
            label.into(),
            Some(Link::Strong(self.clone())),
            Some(Link::Strong(self.clone())),
            props,
        )
    }

    /// Create a node owned by `self`. It sees `self`'s strategies and service
    /// parameters, and overlays its own config on `self`'s.
    pub fn delegate(&self, label: impl Into<String>, props: Properties) -> Self {
        Self::build(
            label.into(),
            None,
            Some(Link::Strong(self.clone())),
            props,
        )
    }

    /// Node label, for logs.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Parent node, if this node was created by [`Node::extend`].
    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.as_ref().and_then(Link::get)
    }

    /// Owner node, if any.
    pub fn owner(&self) -> Option<Node> {
        self.inner.owner.as_ref().and_then(Link::get)
    }

    /// Check if two handles point to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Apply options: strategies become own properties, values become config.
    /// Marks the node initialized. May be called more than once.
    pub fn initialize(&self, options: Properties) {
        let mut values = 0usize;
        let mut strategies = 0usize;
        for (name, prop) in options {
            match prop {
                Prop::Value(value) => {
                    values += 1;
                    self.inner.config.write().insert(name, value);
                }
                Prop::Strategy(strategy) => {
                    strategies += 1;
                    self.inner
                        .props
                        .write()
                        .insert(name, Prop::Strategy(strategy));
                }
            }
        }
        self.inner.initialized.store(true, Ordering::Release);
        debug!(node = %self.label(), values, strategies, "Node initialized");
    }

    /// Whether [`Node::initialize`] has run on this node.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Set an own property.
    pub fn set(&self, name: impl Into<String>, prop: impl Into<Prop>) {
        self.inner.props.write().insert(name.into(), prop.into());
    }

    /// Effective config: this node's own config, overlaid on its owner's.
    /// A parent's config is never included.
    pub fn config(&self) -> Map<String, Value> {
        let mut merged = self.owner().map(|owner| owner.config()).unwrap_or_default();
        for (name, value) in self.inner.config.read().iter() {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Resolve a name to its property. Getters are returned unevaluated.
    ///
    /// Order: own config, own properties, the parent chain's properties,
    /// then the owner. A parent that is also the owner is resolved in full.
    pub fn resolve(&self, name: &str) -> Option<Prop> {
        self.lookup(name, true)
    }

    fn lookup(&self, name: &str, with_config: bool) -> Option<Prop> {
        if with_config && let Some(value) = self.inner.config.read().get(name) {
            return Some(Prop::Value(value.clone()));
        }
        if let Some(prop) = self.inner.props.read().get(name) {
            return Some(prop.clone());
        }

        let owner = self.owner();
        if let Some(parent) = self.parent() {
            let owned = owner.as_ref().is_some_and(|owner| owner.ptr_eq(&parent));
            if let Some(prop) = parent.lookup(name, owned) {
                return Some(prop);
            }
            if owned {
                return None;
            }
        }

        let owner = owner?;
        match owner.resolve(name)? {
            Prop::Strategy(strategy) => Some(Prop::Strategy(strategy)),
            Prop::Value(value) if owner.is_service_param(name) => Some(Prop::Value(value)),
            Prop::Value(_) => None,
        }
    }

    /// Resolve a name to a value, evaluating getters against `self`.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.resolve(name)? {
            Prop::Value(value) => Some(value),
            Prop::Strategy(Strategy::Getter(getter)) => getter(self),
            Prop::Strategy(_) => None,
        }
    }

    /// Resolve a name to a strategy.
    pub fn strategy(&self, name: &str) -> Option<Strategy> {
        match self.resolve(name)? {
            Prop::Strategy(strategy) => Some(strategy),
            Prop::Value(_) => None,
        }
    }

    /// Resolve a middleware pipeline.
    pub fn middleware(&self, name: &str) -> Option<Pipeline<Payload>> {
        match self.strategy(name)? {
            Strategy::Middleware(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    /// Resolve the transport.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        match self.strategy(TRANSMIT)? {
            Strategy::Transport(transport) => Some(transport),
            _ => None,
        }
    }

    /// Names a service call assembles into its request: the request fields
    /// followed by any declared `serviceCallParams`.
    pub fn service_params(&self) -> Vec<String> {
        let mut names: Vec<String> = REQUEST_FIELDS.iter().map(|f| f.to_string()).collect();
        if let Some(Value::Array(extra)) = self.value(SERVICE_CALL_PARAMS) {
            for name in extra.iter().filter_map(Value::as_str) {
                if !names.iter().any(|known| known == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    fn is_service_param(&self, name: &str) -> bool {
        name == SERVICE_CALL_PARAMS || self.service_params().iter().any(|param| param == name)
    }

    /// Expand `template` against `sources`, then this node's config.
    pub fn template_url(&self, template: &str, sources: &[&dyn ParamSource]) -> String {
        let config = self.config();
        let mut all: Vec<&dyn ParamSource> = sources.to_vec();
        all.push(&config);
        template::template_url(template, &all)
    }

    /// Declare a service under `name`, bound to a fresh child extension
    /// holding `props`. Returns the child.
    ///
    /// The child refers back to `self` weakly; it resolves through `self`
    /// for as long as `self` is alive.
    pub fn declare_service(
        &self,
        name: impl Into<String>,
        props: Properties,
        service: Arc<dyn Service>,
    ) -> Node {
        let name = name.into();
        let back = Link::Weak(Arc::downgrade(&self.inner));
        let context = Self::build(
            format!("{}.{}", self.label(), name),
            Some(back.clone()),
            Some(back),
            props,
        );
        debug!(node = %self.label(), service = %name, "Declared service");
        self.inner.services.write().insert(
            name,
            BoundService {
                context: context.clone(),
                service,
            },
        );
        context
    }

    /// Declare several services, each bound to its own child extension.
    pub fn declare_services<I, S>(&self, services: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn Service>)>,
        S: Into<String>,
    {
        for (name, service) in services {
            self.declare_service(name, Properties::new(), service);
        }
    }

    /// Check if a service is declared under `name`.
    pub fn has_service(&self, name: &str) -> bool {
        self.inner.services.read().contains_key(name)
    }

    /// The child extension bound to the service `name`.
    pub fn service_context(&self, name: &str) -> Option<Node> {
        self.inner
            .services
            .read()
            .get(name)
            .map(|bound| bound.context.clone())
    }

    /// Invoke a declared service in its bound context.
    pub async fn call<F>(&self, name: &str, params: Option<Value>, callback: F) -> Result<()>
    where
        F: FnOnce(&Node, Result<Payload>) + Send + 'static,
    {
        let bound = self.inner.services.read().get(name).cloned();
        let Some(bound) = bound else {
            return Err(Error::runtime(format!("No service named \"{name}\"")));
        };
        trace!(node = %self.label(), service = %name, "Calling service");
        bound
            .service
            .execute(&bound.context, params, Box::new(callback))
            .await;
        Ok(())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("label", &self.inner.label)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
