//! Testing utilities for Charon clients.
//!
//! ## Features
//!
//! - **MockTransport** - Records requests and answers with canned replies
//! - **StepSpy** - Records middleware invocations
//! - **Assertions** - Checks for service call outcomes
//!
//! ## Mock Transport
//!
//! ```
//! use charon_http_client::{Client, Properties};
//! use charon_testing::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new().with_reply(200, json!({ "name": "Alice" }));
//!
//! let client = Client::new();
//! client.initialize(Properties::new().transport(transport.clone()));
//!
//! let call = client
//!     .resource_manager(Properties::new())
//!     .define_service_call(Properties::new().value("url", "http://example.com/users/1"));
//!
//! let outcome = call.call(None).await.unwrap();
//! let user = assert_resource(&outcome);
//! assert_field(user, "name", &json!("Alice"));
//! assert_eq!(transport.call_count(), 1);
//! # });
//! ```
//!
//! ## Spying on Middleware
//!
//! ```
//! use charon_http_client::{Node, Pipeline, Properties};
//! use charon_testing::StepSpy;
//! use serde_json::{Value, json};
//!
//! # tokio_test::block_on(async {
//! let spy = StepSpy::<Value>::new();
//! let node = Node::root("test", Properties::new());
//!
//! Pipeline::new()
//!     .with(spy.clone())
//!     .complete(&node, None, Some(json!(1)))
//!     .await;
//!
//! assert!(spy.called_on(&node));
//! # });
//! ```

mod assertions;
mod mock;

pub use assertions::{
    assert_error_is, assert_error_kind, assert_field, assert_link, assert_request_header,
    assert_resource,
};
pub use mock::{MockTransport, SpyCall, StepSpy};
