//! Ordered middleware pipelines.
//!
//! A pipeline is a sequence of [`Step`]s. Each step receives the owning
//! [`Node`], the error and data produced so far, and a [`Next`] continuation.
//! Calling [`Next::run`] hands control to the following step; dropping `next`
//! ends the chain and the terminal callback never fires.
//!
//! The pipeline itself never short-circuits on errors. Steps that should be
//! skipped after a failure check `error` themselves, or are wrapped with
//! [`on_success`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::Error;
use crate::node::Node;

/// A single middleware step.
#[async_trait]
pub trait Step<T: Send + 'static>: Send + Sync {
    /// Process `(error, data)` and optionally continue with `next`.
    async fn call(&self, owner: Node, error: Option<Error>, data: Option<T>, next: Next<T>);
}

type Done<T> = Box<dyn FnOnce(Node, Option<Error>, Option<T>) -> BoxFuture<'static, ()> + Send>;

/// Continuation handed to each step.
pub struct Next<T> {
    owner: Node,
    steps: Arc<[Arc<dyn Step<T>>]>,
    index: usize,
    done: Done<T>,
}

impl<T: Send + 'static> Next<T> {
    /// The node the chain runs on behalf of.
    pub fn owner(&self) -> &Node {
        &self.owner
    }

    /// Continue with the next step, or the terminal callback at the end.
    pub fn run(self, error: Option<Error>, data: Option<T>) -> BoxFuture<'static, ()> {
        let Next {
            owner,
            steps,
            index,
            done,
        } = self;

        match steps.get(index).cloned() {
            None => {
                trace!(node = %owner.label(), "Middleware chain complete");
                done(owner, error, data)
            }
            Some(step) => {
                trace!(node = %owner.label(), step = index, "Executing middleware step");
                let next = Next {
                    owner: owner.clone(),
                    steps,
                    index: index + 1,
                    done,
                };
                Box::pin(async move { step.call(owner, error, data, next).await })
            }
        }
    }

    /// Continue with data and no error.
    pub fn ok(self, data: T) -> BoxFuture<'static, ()> {
        self.run(None, Some(data))
    }

    /// Continue with an error and no data.
    pub fn fail(self, error: Error) -> BoxFuture<'static, ()> {
        self.run(Some(error), None)
    }
}

impl<T> fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("owner", &self.owner.label())
            .field("index", &self.index)
            .field("remaining", &self.steps.len().saturating_sub(self.index))
            .finish()
    }
}

/// An ordered sequence of steps, usable as a single step.
pub struct Pipeline<T> {
    steps: Vec<Arc<dyn Step<T>>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create an empty pipeline. Running it calls the terminal callback
    /// with its inputs.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Create a pipeline from shared steps.
    pub fn from_steps<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Step<T>>>,
    {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Append a step.
    pub fn with<S: Step<T> + 'static>(mut self, step: S) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append a step in place.
    pub fn push<S: Step<T> + 'static>(&mut self, step: S) {
        self.steps.push(Arc::new(step));
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check if both pipelines run the very same step instances.
    pub fn ptr_eq(&self, other: &Pipeline<T>) -> bool {
        self.steps.len() == other.steps.len()
            && self
                .steps
                .iter()
                .zip(&other.steps)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    /// Copy of a sub-range of steps. Out-of-range bounds are clamped.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Self {
        let len = self.steps.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .min(len);

        let steps = if start < end {
            self.steps[start..end].to_vec()
        } else {
            Vec::new()
        };
        Self { steps }
    }

    /// New pipeline running `self` then `other`.
    pub fn concat(&self, other: &Pipeline<T>) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Self { steps }
    }

    /// Run the pipeline; `done` fires if the last step continues.
    pub fn run<F>(
        &self,
        owner: &Node,
        error: Option<Error>,
        data: Option<T>,
        done: F,
    ) -> BoxFuture<'static, ()>
    where
        F: FnOnce(Node, Option<Error>, Option<T>) + Send + 'static,
    {
        debug!(
            node = %owner.label(),
            middleware_count = self.steps.len(),
            has_error = error.is_some(),
            "Executing middleware chain"
        );
        self.start(
            owner.clone(),
            error,
            data,
            Box::new(move |owner, error, data| {
                done(owner, error, data);
                Box::pin(async {})
            }),
        )
    }

    /// Run the pipeline and collect what reached its end.
    ///
    /// Returns `None` when a step ended the chain without calling `next`.
    pub async fn complete(
        &self,
        owner: &Node,
        error: Option<Error>,
        data: Option<T>,
    ) -> Option<(Option<Error>, Option<T>)> {
        let (tx, rx) = oneshot::channel();
        self.run(owner, error, data, move |_, error, data| {
            let _ = tx.send((error, data));
        })
        .await;
        rx.await.ok()
    }

    fn start(
        &self,
        owner: Node,
        error: Option<Error>,
        data: Option<T>,
        done: Done<T>,
    ) -> BoxFuture<'static, ()> {
        Next {
            owner,
            steps: Arc::from(self.steps.clone()),
            index: 0,
            done,
        }
        .run(error, data)
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<T: Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl<T: Send + 'static> FromIterator<Arc<dyn Step<T>>> for Pipeline<T> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Step<T>>>>(iter: I) -> Self {
        Self::from_steps(iter)
    }
}

#[async_trait]
impl<T: Send + 'static> Step<T> for Pipeline<T> {
    async fn call(&self, owner: Node, error: Option<Error>, data: Option<T>, next: Next<T>) {
        self.start(
            owner,
            error,
            data,
            Box::new(move |_, error, data| next.run(error, data)),
        )
        .await
    }
}

/// Step backed by an async closure. See [`from_fn`].
pub struct FnStep<F> {
    f: F,
}

/// Adapt an async closure `(owner, error, data, next)` into a [`Step`].
pub fn from_fn<T, F, Fut>(f: F) -> FnStep<F>
where
    T: Send + 'static,
    F: Fn(Node, Option<Error>, Option<T>, Next<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnStep { f }
}

#[async_trait]
impl<T, F, Fut> Step<T> for FnStep<F>
where
    T: Send + 'static,
    F: Fn(Node, Option<Error>, Option<T>, Next<T>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn call(&self, owner: Node, error: Option<Error>, data: Option<T>, next: Next<T>) {
        (self.f)(owner, error, data, next).await
    }
}

/// Step that forwards its inputs unchanged, dropping data when an error is
/// pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeNext;

#[async_trait]
impl<T: Send + 'static> Step<T> for InvokeNext {
    async fn call(&self, _owner: Node, error: Option<Error>, data: Option<T>, next: Next<T>) {
        match error {
            Some(error) => next.fail(error).await,
            None => next.run(None, data).await,
        }
    }
}

/// Step that only runs `inner` when no error is pending.
pub struct OnSuccess<S> {
    inner: S,
}

/// Wrap `step` so that it is skipped while an error travels the chain.
pub fn on_success<S>(step: S) -> OnSuccess<S> {
    OnSuccess { inner: step }
}

#[async_trait]
impl<T, S> Step<T> for OnSuccess<S>
where
    T: Send + 'static,
    S: Step<T>,
{
    async fn call(&self, owner: Node, error: Option<Error>, data: Option<T>, next: Next<T>) {
        if error.is_some() {
            trace!(node = %owner.label(), "Skipping step after error");
            next.run(error, None).await
        } else {
            self.inner.call(owner, None, data, next).await
        }
    }
}
