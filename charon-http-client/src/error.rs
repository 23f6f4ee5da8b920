//! Error taxonomy for service calls.
//!
//! Every failure a service call can report is an [`Error`] tagged with an
//! [`ErrorKind`]. Kinds form a small tree rooted at [`ErrorKind::Base`]:
//!
//! ```text
//! Charon.Error
//! ├── Charon.ConsumerError          (4xx)
//! │   ├── Charon.RequestForbiddenError   (403)
//! │   ├── Charon.ResourceNotFoundError   (404)
//! │   └── Charon.ResourceConflictError   (409)
//! └── Charon.ServiceError           (5xx)
//!     ├── Charon.RuntimeError
//!     ├── Charon.ParseError
//!     └── Charon.TimeoutError
//! ```

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for service call operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared, clonable underlying cause of an [`Error`].
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Kind of a service call error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Root of the taxonomy.
    Base,
    /// Client-caused failure (generic 4xx).
    Consumer,
    /// HTTP 403.
    RequestForbidden,
    /// HTTP 404.
    ResourceNotFound,
    /// HTTP 409.
    ResourceConflict,
    /// Server or transport caused failure (generic 5xx).
    Service,
    /// Unrecognized status code, uninitialized client or transport failure.
    Runtime,
    /// Response body failed structured decoding.
    Parse,
    /// Deadline elapsed before a response arrived.
    Timeout,
}

impl ErrorKind {
    /// Every kind, root first.
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Base,
        ErrorKind::Consumer,
        ErrorKind::RequestForbidden,
        ErrorKind::ResourceNotFound,
        ErrorKind::ResourceConflict,
        ErrorKind::Service,
        ErrorKind::Runtime,
        ErrorKind::Parse,
        ErrorKind::Timeout,
    ];

    /// Namespaced name, e.g. `Charon.ResourceNotFoundError`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Base => "Charon.Error",
            Self::Consumer => "Charon.ConsumerError",
            Self::RequestForbidden => "Charon.RequestForbiddenError",
            Self::ResourceNotFound => "Charon.ResourceNotFoundError",
            Self::ResourceConflict => "Charon.ResourceConflictError",
            Self::Service => "Charon.ServiceError",
            Self::Runtime => "Charon.RuntimeError",
            Self::Parse => "Charon.ParseError",
            Self::Timeout => "Charon.TimeoutError",
        }
    }

    /// Direct parent in the taxonomy.
    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            Self::Base => None,
            Self::Consumer | Self::Service => Some(Self::Base),
            Self::RequestForbidden | Self::ResourceNotFound | Self::ResourceConflict => {
                Some(Self::Consumer)
            }
            Self::Runtime | Self::Parse | Self::Timeout => Some(Self::Service),
        }
    }

    /// Check whether `self` is `ancestor` or descends from it.
    pub fn is_a(self, ancestor: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified service call error.
///
/// `data` carries diagnostic context, usually the response spec or the
/// request that failed.
#[derive(Debug, Clone, Error)]
#[error("{}{}", .kind.name(), message_suffix(.message))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    data: Option<Value>,
    #[source]
    source: Option<Cause>,
}

fn message_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl Error {
    /// Create an error with a message and no data.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    /// Create an error with an empty message.
    pub fn of(kind: ErrorKind) -> Self {
        Self::new(kind, "")
    }

    /// Create an error with an empty message carrying `data`.
    pub fn from_data(kind: ErrorKind, data: Value) -> Self {
        Self::of(kind).with_data(data)
    }

    /// Build an error from loosely typed constructor arguments.
    ///
    /// A leading string is the message. A single non-string argument is
    /// data with an empty message. Data that is not an object or array is
    /// replaced by a `constructorError` record instead of failing.
    pub fn from_args(kind: ErrorKind, args: &[Value]) -> Self {
        match args {
            [] => Self::of(kind),
            [Value::String(message)] => Self::new(kind, message.clone()),
            [Value::String(message), data, ..] => {
                Self::new(kind, message.clone()).with_data(data.clone())
            }
            [data, ..] => Self::from_data(kind, data.clone()),
        }
    }

    /// Attach diagnostic data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Null => None,
            Value::Object(_) | Value::Array(_) => Some(data),
            other => Some(json!({
                "constructorError": format!("invalid error data type: {}", type_name(&other)),
                "originalData": other,
            })),
        };
        self
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Generic client-caused error.
    pub fn consumer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Consumer, message)
    }

    /// Generic service-caused error.
    pub fn service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Service, message)
    }

    /// Runtime failure inside the client.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Body decoding failure.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    /// Deadline failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Namespaced error name.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Error message, possibly empty.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Diagnostic data, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Check whether this error is of `kind` or one of its descendants.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind.is_a(kind)
    }

    /// Check if this is a 4xx-family error.
    pub fn is_consumer(&self) -> bool {
        self.is(ErrorKind::Consumer)
    }

    /// Check if this is a service-family error.
    pub fn is_service(&self) -> bool {
        self.is(ErrorKind::Service)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Error", 3)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("data", &self.data)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_namespaced() {
        for kind in ErrorKind::ALL {
            assert!(kind.name().starts_with("Charon."));
            assert_eq!(Error::of(kind).name(), kind.name());
        }
        assert_eq!(
            ErrorKind::ResourceNotFound.name(),
            "Charon.ResourceNotFoundError"
        );
    }

    #[test]
    fn test_inheritance_chain() {
        let cases = [
            (ErrorKind::Consumer, vec![]),
            (ErrorKind::Service, vec![]),
            (ErrorKind::RequestForbidden, vec![ErrorKind::Consumer]),
            (ErrorKind::ResourceNotFound, vec![ErrorKind::Consumer]),
            (ErrorKind::ResourceConflict, vec![ErrorKind::Consumer]),
            (ErrorKind::Runtime, vec![ErrorKind::Service]),
            (ErrorKind::Parse, vec![ErrorKind::Service]),
            (ErrorKind::Timeout, vec![ErrorKind::Service]),
        ];

        for (kind, parents) in cases {
            let err = Error::of(kind);
            assert!(err.is(ErrorKind::Base));
            assert!(err.is(kind));
            for parent in parents {
                assert!(err.is(parent), "{kind} should descend from {parent}");
            }
        }

        assert!(!Error::of(ErrorKind::Runtime).is_consumer());
        assert!(!Error::of(ErrorKind::ResourceConflict).is_service());
    }

    #[test]
    fn test_message_alone() {
        let err = Error::from_args(ErrorKind::Parse, &[json!("testMessage")]);
        assert_eq!(err.message(), "testMessage");
        assert!(err.data().is_none());
    }

    #[test]
    fn test_data_alone() {
        let err = Error::from_args(ErrorKind::Consumer, &[json!({"unexpected": true})]);
        assert_eq!(err.message(), "");
        assert_eq!(err.data(), Some(&json!({"unexpected": true})));
    }

    #[test]
    fn test_message_and_data() {
        let err = Error::from_args(
            ErrorKind::Timeout,
            &[json!("testMessage"), json!({"unexpected": true})],
        );
        assert_eq!(err.message(), "testMessage");
        assert_eq!(err.data(), Some(&json!({"unexpected": true})));
    }

    #[test]
    fn test_invalid_data_type_degrades() {
        let err = Error::from_args(ErrorKind::Runtime, &[json!("oops"), json!(42)]);
        assert_eq!(err.message(), "oops");
        assert_eq!(
            err.data(),
            Some(&json!({
                "constructorError": "invalid error data type: number",
                "originalData": 42
            }))
        );
    }

    #[test]
    fn test_display_and_wire_shape() {
        let err = Error::runtime("HTTP client error").with_data(json!({"request": {}}));
        assert_eq!(err.to_string(), "Charon.RuntimeError: HTTP client error");
        assert_eq!(Error::of(ErrorKind::Consumer).to_string(), "Charon.ConsumerError");

        let wire = serde_json::to_value(&err).unwrap();
        assert_eq!(
            wire,
            json!({
                "name": "Charon.RuntimeError",
                "message": "HTTP client error",
                "data": {"request": {}}
            })
        );
    }

    #[test]
    fn test_source_is_exposed() {
        use std::error::Error as _;

        let io = std::io::Error::other("boom");
        let err = Error::runtime("HTTP client error").with_source(io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }
}
