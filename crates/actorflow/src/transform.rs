//! Transform stage: one output per input.

use std::marker::PhantomData;
use std::rc::Rc;

use crate::emitter::{Emitter, Flow, Handler, Stage};
use crate::error::{PipelineError, PipelineResult};

/// Applies a mapping to every upstream message and re-emits the result.
///
/// There is no catch boundary: a mapping that can fail should return a
/// `Result` and let later stages route the error (see
/// [`and_then`](crate::and_then) and [`filter_ok`](crate::filter_ok)).
pub struct Transform<In: 'static, Out: 'static> {
    upstream: Flow<In>,
    mapping: Rc<dyn Fn(In) -> Out>,
    registered: bool,
}

impl<In: 'static, Out: 'static> Transform<In, Out> {
    /// Creates a transform behind `upstream`. Nothing flows until a handler
    /// is registered on the transform itself.
    pub fn new<F>(upstream: Flow<In>, mapping: F) -> Self
    where
        F: Fn(In) -> Out + 'static,
    {
        Self {
            upstream,
            mapping: Rc::new(mapping),
            registered: false,
        }
    }
}

impl<In: 'static, Out: 'static> Emitter for Transform<In, Out> {
    type Item = Out;

    fn set_message_handler(&mut self, emit: Handler<Out>) -> PipelineResult<()> {
        if self.registered {
            return Err(PipelineError::already_registered("transform"));
        }
        self.registered = true;

        let mapping = Rc::clone(&self.mapping);
        self.upstream
            .set_message_handler(Rc::new(move |message| emit(mapping(message))))
    }

    fn is_exhausted(&self) -> bool {
        self.upstream.is_exhausted()
    }
}

/// Unapplied [`Transform`], created by [`transform`].
pub struct TransformStage<F, In, Out> {
    /// The mapping applied to each message.
    pub mapping: F,
    _types: PhantomData<fn(In) -> Out>,
}

impl<F: Clone, In, Out> Clone for TransformStage<F, In, Out> {
    fn clone(&self) -> Self {
        Self {
            mapping: self.mapping.clone(),
            _types: PhantomData,
        }
    }
}

/// Describes a transform stage with the given mapping.
pub fn transform<In, Out, F>(mapping: F) -> TransformStage<F, In, Out>
where
    F: Fn(In) -> Out + 'static,
{
    TransformStage {
        mapping,
        _types: PhantomData,
    }
}

impl<In, Out, F> Stage<In> for TransformStage<F, In, Out>
where
    In: 'static,
    Out: 'static,
    F: Fn(In) -> Out + 'static,
{
    type Output = Flow<Out>;

    fn attach(self, upstream: Flow<In>) -> Flow<Out> {
        Flow::new(Transform::new(upstream, self.mapping))
    }
}
