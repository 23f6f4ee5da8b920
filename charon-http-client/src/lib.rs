//! # Charon HTTP Client
//!
//! A hypermedia resource client built from a configuration tree, a
//! continuation-passing middleware pipeline and a typed error taxonomy.
//!
//! ## Features
//!
//! - **Configuration tree**: clients, resource managers and service calls
//!   layer their settings, with the most specific layer winning
//! - **Middleware**: ordered steps that can transform, replace or end a
//!   service call's outcome
//! - **Error taxonomy**: HTTP statuses classified into consumer, service and
//!   runtime errors with `is_a` checks
//! - **Resources**: response bodies wrapped with links and metadata
//! - **URL templates**: `:name` placeholders filled from params and config
//! - **Pluggable transport**: `reqwest` by default, anything implementing
//!   [`Transport`] otherwise
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use charon_http_client::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::new();
//!     client.initialize(Properties::new().value("rootUrl", "https://api.example.com"));
//!
//!     let users = client.resource_manager(Properties::new());
//!     users.declare_service_calls([(
//!         "getUser",
//!         Properties::new().value("url", ":rootUrl/users/:id"),
//!     )]);
//!
//!     users
//!         .call("getUser", Some(json!({ "id": 7 })), |_, outcome| match outcome {
//!             Ok(payload) => println!("user: {}", payload.to_value()),
//!             Err(err) if err.is(ErrorKind::ResourceNotFound) => println!("no such user"),
//!             Err(err) => println!("failed: {err}"),
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Middleware
//!
//! ```rust,no_run
//! use charon_http_client::prelude::*;
//!
//! let client = Client::factory(Properties::new().middleware(
//!     "resourceMiddleware",
//!     Pipeline::new().with(from_fn(
//!         |_owner, error, data: Option<Payload>, next: Next<Payload>| {
//!             tracing::info!(has_error = error.is_some(), "resource received");
//!             next.run(error, data)
//!         },
//!     )),
//! ));
//! ```

mod client;
mod config;
mod error;
mod middleware;
mod node;
mod request;
mod resource;
mod resource_manager;
mod response;
mod response_middleware;
mod template;
mod transport;

pub use client::Client;
pub use config::{Redirects, TransportConfig};
pub use error::{Cause, Error, ErrorKind, Result};
pub use middleware::{FnStep, InvokeNext, Next, OnSuccess, Pipeline, Step, from_fn, on_success};
pub use node::{
    Getter, Node, PARSE_RESOURCE, Prop, Properties, RESOURCE_MIDDLEWARE, RESPONSE_MIDDLEWARE,
    SERVICE_CALL_PARAMS, Service, ServiceCallback, Strategy, TRANSMIT,
};
pub use request::{REQUEST_FIELDS, RequestSpec};
pub use resource::{Link, LinkQuery, Resource, ResourceSpec};
pub use resource_manager::{ResourceManager, ServiceCall};
pub use response::{Payload, ResponseSpec};
pub use response_middleware::{
    DetectErrors, ParseResource, UNRECOGNIZED_STATUS, classify_status, detect_errors,
    resource_from_response,
};
pub use template::{ParamSource, express, placeholders, template_url};
pub use transport::{ReqwestTransport, Transport};

// Re-export common types
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use charon_http_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::{Redirects, TransportConfig};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::middleware::{InvokeNext, Next, Pipeline, Step, from_fn, on_success};
    pub use crate::node::{Node, Properties, Service};
    pub use crate::request::RequestSpec;
    pub use crate::resource::{Link, LinkQuery, Resource, ResourceSpec};
    pub use crate::resource_manager::{ResourceManager, ServiceCall};
    pub use crate::response::{Payload, ResponseSpec};
    pub use crate::response_middleware::{DetectErrors, ParseResource};
    pub use crate::transport::{ReqwestTransport, Transport};
}
