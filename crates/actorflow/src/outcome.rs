//! Stages that route `Result` messages.
//!
//! A stage never unwinds on bad input: fallible steps return `Result` and the
//! error travels downstream like any other message until something decides
//! what to do with it. These helpers cover the common decisions.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::emitter::{Emitter, Flow, Handler, Stage};
use crate::error::{PipelineError, PipelineResult};
use crate::transform::Transform;

/// A closure passed to [`attempt`] panicked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stage panicked: {message}")]
pub struct Panicked {
    /// The panic payload if it was a string, otherwise a placeholder.
    pub message: String,
}

impl Panicked {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Runs `f`, turning a panic into an `Err` value.
///
/// Meant for wrapping third-party code inside a mapping. Has no effect when
/// the binary is built with `panic = "abort"`.
pub fn attempt<T, F>(f: F) -> Result<T, Panicked>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Panicked::from_payload(payload.as_ref()))
}

/// Unapplied `Result::and_then` over a flow of results, created by [`and_then`].
pub struct AndThenStage<F, T, U, E> {
    /// The fallible step applied to `Ok` values.
    pub step: F,
    _types: PhantomData<fn(T) -> Result<U, E>>,
}

/// Describes a stage that applies `step` to `Ok` values and passes `Err`
/// values through untouched.
pub fn and_then<T, U, E, F>(step: F) -> AndThenStage<F, T, U, E>
where
    F: Fn(T) -> Result<U, E> + 'static,
{
    AndThenStage {
        step,
        _types: PhantomData,
    }
}

impl<T, U, E, F> Stage<Result<T, E>> for AndThenStage<F, T, U, E>
where
    T: 'static,
    U: 'static,
    E: 'static,
    F: Fn(T) -> Result<U, E> + 'static,
{
    type Output = Flow<Result<U, E>>;

    fn attach(self, upstream: Flow<Result<T, E>>) -> Flow<Result<U, E>> {
        let step = self.step;
        Flow::new(Transform::new(upstream, move |message: Result<T, E>| {
            message.and_then(&step)
        }))
    }
}

/// Forwards the `Ok` payloads of an upstream of results and drops errors.
pub struct FilterOk<T: 'static, E: 'static> {
    upstream: Flow<Result<T, E>>,
    registered: bool,
}

impl<T: 'static, E: 'static> FilterOk<T, E> {
    /// Creates the stage behind `upstream`.
    pub fn new(upstream: Flow<Result<T, E>>) -> Self {
        Self {
            upstream,
            registered: false,
        }
    }
}

impl<T: 'static, E: fmt::Display + 'static> Emitter for FilterOk<T, E> {
    type Item = T;

    fn set_message_handler(&mut self, emit: Handler<T>) -> PipelineResult<()> {
        if self.registered {
            return Err(PipelineError::already_registered("filter_ok"));
        }
        self.registered = true;

        self.upstream
            .set_message_handler(Rc::new(move |message| match message {
                Ok(value) => emit(value),
                Err(error) => debug!(%error, "dropping failed message"),
            }))
    }

    fn is_exhausted(&self) -> bool {
        self.upstream.is_exhausted()
    }
}

/// Unapplied [`FilterOk`], created by [`filter_ok`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOkStage;

/// Describes a stage that unwraps `Ok` values and drops `Err` values.
pub fn filter_ok() -> FilterOkStage {
    FilterOkStage
}

impl<T: 'static, E: fmt::Display + 'static> Stage<Result<T, E>> for FilterOkStage {
    type Output = Flow<T>;

    fn attach(self, upstream: Flow<Result<T, E>>) -> Flow<T> {
        Flow::new(FilterOk::new(upstream))
    }
}

/// Unapplied error observer, created by [`inspect_err`].
pub struct InspectErrStage<F, E> {
    /// Called with a reference to every `Err` value.
    pub observer: F,
    _types: PhantomData<fn(&E)>,
}

/// Describes a pass-through stage that calls `observer` on every error.
pub fn inspect_err<E, F>(observer: F) -> InspectErrStage<F, E>
where
    F: Fn(&E) + 'static,
{
    InspectErrStage {
        observer,
        _types: PhantomData,
    }
}

impl<T, E, F> Stage<Result<T, E>> for InspectErrStage<F, E>
where
    T: 'static,
    E: 'static,
    F: Fn(&E) + 'static,
{
    type Output = Flow<Result<T, E>>;

    fn attach(self, upstream: Flow<Result<T, E>>) -> Flow<Result<T, E>> {
        let observer = self.observer;
        Flow::new(Transform::new(upstream, move |message: Result<T, E>| {
            message.inspect_err(&observer)
        }))
    }
}
