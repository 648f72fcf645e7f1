//! Terminal stage.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::emitter::{Emitter, Flow, Stage};
use crate::error::PipelineResult;

/// Terminal consumer. Owns the whole chain in front of it.
///
/// Creating a sink registers its function with the upstream, which in turn
/// wires every stage back to the source and starts it. Drop the sink and the
/// pipeline (including any listening source) goes with it.
pub struct Sink<T: 'static> {
    upstream: Flow<T>,
}

impl<T: 'static> Sink<T> {
    /// Attaches `function` to the end of `upstream`.
    pub fn new<F>(mut upstream: Flow<T>, function: F) -> PipelineResult<Self>
    where
        F: Fn(T) + 'static,
    {
        upstream.set_message_handler(Rc::new(function))?;
        Ok(Self { upstream })
    }

    /// Returns true once no more messages can reach the sink.
    pub fn is_exhausted(&self) -> bool {
        self.upstream.is_exhausted()
    }
}

impl<T: 'static> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("upstream", &self.upstream)
            .finish()
    }
}

/// Unapplied [`Sink`], created by [`sink`].
pub struct SinkStage<F, T> {
    /// The function called with each message.
    pub function: F,
    _types: PhantomData<fn(T)>,
}

impl<F: Clone, T> Clone for SinkStage<F, T> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            _types: PhantomData,
        }
    }
}

/// Describes a sink stage calling `function` for every message.
pub fn sink<T, F>(function: F) -> SinkStage<F, T>
where
    F: Fn(T) + 'static,
{
    SinkStage {
        function,
        _types: PhantomData,
    }
}

impl<T, F> Stage<T> for SinkStage<F, T>
where
    T: 'static,
    F: Fn(T) + 'static,
{
    type Output = PipelineResult<Sink<T>>;

    fn attach(self, upstream: Flow<T>) -> PipelineResult<Sink<T>> {
        Sink::new(upstream, self.function)
    }
}
