//! Filter stage: zero or one output per input.

use std::marker::PhantomData;
use std::rc::Rc;

use crate::emitter::{Emitter, Flow, Handler, Stage};
use crate::error::{PipelineError, PipelineResult};

/// Re-emits upstream messages for which the predicate holds and silently
/// drops the rest. Order is preserved.
pub struct Filter<T: 'static> {
    upstream: Flow<T>,
    predicate: Rc<dyn Fn(&T) -> bool>,
    registered: bool,
}

impl<T: 'static> Filter<T> {
    /// Creates a filter behind `upstream`.
    pub fn new<P>(upstream: Flow<T>, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + 'static,
    {
        Self {
            upstream,
            predicate: Rc::new(predicate),
            registered: false,
        }
    }
}

impl<T: 'static> Emitter for Filter<T> {
    type Item = T;

    fn set_message_handler(&mut self, emit: Handler<T>) -> PipelineResult<()> {
        if self.registered {
            return Err(PipelineError::already_registered("filter"));
        }
        self.registered = true;

        let predicate = Rc::clone(&self.predicate);
        self.upstream.set_message_handler(Rc::new(move |message| {
            if predicate(&message) {
                emit(message);
            }
        }))
    }

    fn is_exhausted(&self) -> bool {
        self.upstream.is_exhausted()
    }
}

/// Unapplied [`Filter`], created by [`filter`].
pub struct FilterStage<P, T> {
    /// The predicate deciding which messages pass.
    pub predicate: P,
    _types: PhantomData<fn(&T)>,
}

impl<P: Clone, T> Clone for FilterStage<P, T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            _types: PhantomData,
        }
    }
}

/// Describes a filter stage with the given predicate.
pub fn filter<T, P>(predicate: P) -> FilterStage<P, T>
where
    P: Fn(&T) -> bool + 'static,
{
    FilterStage {
        predicate,
        _types: PhantomData,
    }
}

impl<T, P> Stage<T> for FilterStage<P, T>
where
    T: 'static,
    P: Fn(&T) -> bool + 'static,
{
    type Output = Flow<T>;

    fn attach(self, upstream: Flow<T>) -> Flow<T> {
        Flow::new(Filter::new(upstream, self.predicate))
    }
}
