// Mock transports and middleware spies

use async_trait::async_trait;
use charon_http_client::{Error, Next, Node, RequestSpec, ResponseSpec, Result, Step, Transport};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Reply {
    Response {
        status: i64,
        body: Value,
        headers: Map<String, Value>,
    },
    Error(Error),
}

impl Reply {
    fn to_result(&self, request: &RequestSpec) -> Result<ResponseSpec> {
        match self {
            Self::Response {
                status,
                body,
                headers,
            } => Ok(ResponseSpec {
                body: body.clone(),
                status_code: Some(*status),
                headers: headers.clone(),
                request_spec: request.clone(),
            }),
            Self::Error(error) => Err(error.clone()),
        }
    }
}

/// Transport that records requests and answers with canned replies.
///
/// Queued replies are used first, in order; after that every request gets
/// the fallback reply (200 with a `null` body unless changed).
#[derive(Clone)]
pub struct MockTransport {
    requests: Arc<Mutex<Vec<RequestSpec>>>,
    queue: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Arc<Mutex<Reply>>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(Reply::Response {
                status: 200,
                body: Value::Null,
                headers: Map::new(),
            })),
        }
    }

    /// Answer every request with `status` and `body`
    pub fn with_reply(self, status: i64, body: Value) -> Self {
        *self.fallback.lock() = Reply::Response {
            status,
            body,
            headers: Map::new(),
        };
        self
    }

    /// Fail every request with `error`
    pub fn with_error(self, error: Error) -> Self {
        *self.fallback.lock() = Reply::Error(error);
        self
    }

    /// Queue a one-off reply
    pub fn push_reply(&self, status: i64, body: Value) {
        self.queue.lock().push_back(Reply::Response {
            status,
            body,
            headers: Map::new(),
        });
    }

    /// Queue a one-off reply with headers
    pub fn push_reply_with_headers(&self, status: i64, body: Value, headers: Map<String, Value>) {
        self.queue.lock().push_back(Reply::Response {
            status,
            body,
            headers,
        });
    }

    /// Queue a one-off transport error
    pub fn push_error(&self, error: Error) {
        self.queue.lock().push_back(Reply::Error(error));
    }

    /// Get the number of transmitted requests
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Get all transmitted requests
    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.lock().clone()
    }

    /// Get the most recent request
    pub fn last_request(&self) -> Option<RequestSpec> {
        self.requests.lock().last().cloned()
    }

    /// Clear recorded requests and queued replies
    pub fn clear(&self) {
        self.requests.lock().clear();
        self.queue.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .field("queued", &self.queue.lock().len())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn transmit(&self, request: &RequestSpec) -> Result<ResponseSpec> {
        self.requests.lock().push(request.clone());
        let queued = self.queue.lock().pop_front();
        match queued {
            Some(reply) => reply.to_result(request),
            None => self.fallback.lock().to_result(request),
        }
    }
}

/// One recorded invocation of a [`StepSpy`].
#[derive(Debug, Clone)]
pub struct SpyCall<T> {
    pub owner: Node,
    pub error: Option<Error>,
    pub data: Option<T>,
}

/// Middleware step that records its invocations.
///
/// By default the spy forwards its inputs unchanged; [`StepSpy::wrapping`]
/// delegates to another step instead, and [`StepSpy::halting`] ends the
/// chain.
pub struct StepSpy<T> {
    inner: Option<Arc<dyn Step<T>>>,
    halt: bool,
    calls: Arc<Mutex<Vec<SpyCall<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> StepSpy<T> {
    /// Create a pass-through spy
    pub fn new() -> Self {
        Self {
            inner: None,
            halt: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a spy that delegates to `step`
    pub fn wrapping<S: Step<T> + 'static>(step: S) -> Self {
        Self {
            inner: Some(Arc::new(step)),
            ..Self::new()
        }
    }

    /// Create a spy that never calls `next`
    pub fn halting() -> Self {
        Self {
            halt: true,
            ..Self::new()
        }
    }

    /// Get the number of invocations
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Check if the spy was invoked at all
    pub fn called(&self) -> bool {
        self.call_count() > 0
    }

    /// Get all recorded invocations
    pub fn calls(&self) -> Vec<SpyCall<T>> {
        self.calls.lock().clone()
    }

    /// Get the first recorded invocation
    pub fn first_call(&self) -> Option<SpyCall<T>> {
        self.calls.lock().first().cloned()
    }

    /// Check if any invocation ran on behalf of `owner`
    pub fn called_on(&self, owner: &Node) -> bool {
        self.calls.lock().iter().any(|call| call.owner.ptr_eq(owner))
    }

    /// Clear recorded invocations
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl<T: Clone + Send + Sync + 'static> Default for StepSpy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for StepSpy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            halt: self.halt,
            calls: self.calls.clone(),
        }
    }
}

impl<T> fmt::Debug for StepSpy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpy")
            .field("calls", &self.calls.lock().len())
            .field("wrapping", &self.inner.is_some())
            .field("halt", &self.halt)
            .finish()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Step<T> for StepSpy<T> {
    async fn call(&self, owner: Node, error: Option<Error>, data: Option<T>, next: Next<T>) {
        self.calls.lock().push(SpyCall {
            owner: owner.clone(),
            error: error.clone(),
            data: data.clone(),
        });
        if self.halt {
            return;
        }
        match &self.inner {
            Some(step) => step.call(owner, error, data, next).await,
            None => next.run(error, data).await,
        }
    }
}
