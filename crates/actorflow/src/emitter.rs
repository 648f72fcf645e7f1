//! The emitter contract and the type-erased [`Flow`] stage.

use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

use crate::error::PipelineResult;

/// Downstream message handler.
///
/// Shared rather than owned: a listening source hands the same handler to
/// every session it accepts, and a join hands it to every nested stream.
pub type Handler<T> = Rc<dyn Fn(T)>;

/// Something that produces messages of type [`Emitter::Item`] to a single
/// registered handler.
///
/// Registering the handler is what starts the emitter: a source begins
/// producing, an intermediate stage registers itself with its own upstream.
pub trait Emitter {
    /// Message type pushed downstream.
    type Item: 'static;

    /// Registers the downstream handler.
    ///
    /// Fails with [`PipelineError::HandlerAlreadyRegistered`](crate::PipelineError)
    /// if a handler was registered before.
    fn set_message_handler(&mut self, handler: Handler<Self::Item>) -> PipelineResult<()>;

    /// Returns true once the emitter can never produce again.
    ///
    /// A finite source is exhausted after it has emitted everything; a
    /// listening source is never exhausted while it is bound.
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<E: Emitter + ?Sized> Emitter for Box<E> {
    type Item = E::Item;

    fn set_message_handler(&mut self, handler: Handler<Self::Item>) -> PipelineResult<()> {
        (**self).set_message_handler(handler)
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// An unapplied stage: configuration waiting for an upstream.
///
/// Attaching consumes both the factory and the upstream, so a stage always
/// owns the chain in front of it.
pub trait Stage<In: 'static> {
    /// What attaching produces: a [`Flow`] for intermediate stages, a
    /// [`Sink`](crate::Sink) result for terminal ones.
    type Output;

    /// Wires this stage behind `upstream`.
    fn attach(self, upstream: Flow<In>) -> Self::Output;
}

/// A boxed emitter of `T`.
///
/// Every composition step returns a `Flow`, so a pipeline has a uniform type
/// no matter how many stages it contains.
pub struct Flow<T: 'static> {
    inner: Box<dyn Emitter<Item = T>>,
}

impl<T: 'static> Flow<T> {
    /// Erases the concrete type of `emitter`.
    pub fn new<E>(emitter: E) -> Self
    where
        E: Emitter<Item = T> + 'static,
    {
        Self {
            inner: Box::new(emitter),
        }
    }

    /// Attaches `stage` behind this flow. Method form of `flow | stage`.
    pub fn pipe<S: Stage<T>>(self, stage: S) -> S::Output {
        stage.attach(self)
    }
}

impl<T: 'static> Emitter for Flow<T> {
    type Item = T;

    fn set_message_handler(&mut self, handler: Handler<T>) -> PipelineResult<()> {
        self.inner.set_message_handler(handler)
    }

    fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }
}

impl<T: 'static> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("item", &std::any::type_name::<T>())
            .field("exhausted", &self.inner.is_exhausted())
            .finish()
    }
}

impl<T: 'static, S: Stage<T>> BitOr<S> for Flow<T> {
    type Output = S::Output;

    fn bitor(self, stage: S) -> S::Output {
        stage.attach(self)
    }
}
