//! Fixed-list source.

use std::ops::BitOr;

use crate::emitter::{Emitter, Flow, Handler, Stage};
use crate::error::{PipelineError, PipelineResult};

/// Source that emits a predetermined list of values.
///
/// All values are pushed synchronously, in order, from inside
/// [`Emitter::set_message_handler`]. Afterwards the source is exhausted.
#[derive(Debug, Clone)]
pub struct Values<T> {
    values: Vec<T>,
    emitted: bool,
}

impl<T> Values<T> {
    /// Creates a source for `values`.
    pub fn new(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: values.into_iter().collect(),
            emitted: false,
        }
    }

    /// Number of values still waiting to be emitted.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there is nothing left to emit.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Creates a [`Values`] source as a [`Flow`].
pub fn values<T: 'static>(values: impl IntoIterator<Item = T>) -> Flow<T> {
    Flow::new(Values::new(values))
}

impl<T: 'static> Emitter for Values<T> {
    type Item = T;

    fn set_message_handler(&mut self, emit: Handler<T>) -> PipelineResult<()> {
        if self.emitted {
            return Err(PipelineError::already_registered("values"));
        }
        self.emitted = true;

        for value in self.values.drain(..) {
            emit(value);
        }
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.emitted
    }
}

impl<T: 'static> From<Values<T>> for Flow<T> {
    fn from(source: Values<T>) -> Self {
        Flow::new(source)
    }
}

impl<T: 'static, S: Stage<T>> BitOr<S> for Values<T> {
    type Output = S::Output;

    fn bitor(self, stage: S) -> S::Output {
        stage.attach(Flow::new(self))
    }
}
