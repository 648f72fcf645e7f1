//! Join stage: flattens a stream of streams.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::emitter::{Emitter, Flow, Handler, Stage};
use crate::error::{PipelineError, PipelineResult};

/// Consumes messages that are themselves emitters and splices every nested
/// stream into one output stream.
///
/// Each arriving nested emitter gets the join's own downstream handler. The
/// join keeps nested emitters alive while they can still produce and drops
/// them once they report [`Emitter::is_exhausted`].
///
/// Messages from different nested streams interleave in whatever order their
/// sources fire; only the order within one nested stream is preserved.
pub struct Join<S: Emitter + 'static> {
    upstream: Flow<S>,
    active: Rc<RefCell<Vec<S>>>,
    registered: bool,
}

impl<S: Emitter + 'static> Join<S> {
    /// Creates a join behind `upstream`.
    pub fn new(upstream: Flow<S>) -> Self {
        Self {
            upstream,
            active: Rc::new(RefCell::new(Vec::new())),
            registered: false,
        }
    }

    /// Number of nested emitters currently kept alive.
    pub fn active_streams(&self) -> usize {
        let mut active = self.active.borrow_mut();
        active.retain(|nested| !nested.is_exhausted());
        active.len()
    }
}

impl<S: Emitter + 'static> Emitter for Join<S> {
    type Item = S::Item;

    fn set_message_handler(&mut self, emit: Handler<S::Item>) -> PipelineResult<()> {
        if self.registered {
            return Err(PipelineError::already_registered("join"));
        }
        self.registered = true;

        let active = Rc::clone(&self.active);
        self.upstream.set_message_handler(Rc::new(move |mut nested: S| {
            if let Err(error) = nested.set_message_handler(Rc::clone(&emit)) {
                warn!(%error, "join dropped a nested stream that was already wired");
                return;
            }

            let mut active = active.borrow_mut();
            active.retain(|stream| !stream.is_exhausted());
            if !nested.is_exhausted() {
                active.push(nested);
            }
        }))
    }

    fn is_exhausted(&self) -> bool {
        self.upstream.is_exhausted() && self.active_streams() == 0
    }
}

/// Unapplied [`Join`], created by [`join`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinStage;

/// Describes a join stage.
pub fn join() -> JoinStage {
    JoinStage
}

impl<S: Emitter + 'static> Stage<S> for JoinStage {
    type Output = Flow<S::Item>;

    fn attach(self, upstream: Flow<S>) -> Flow<S::Item> {
        Flow::new(Join::new(upstream))
    }
}
