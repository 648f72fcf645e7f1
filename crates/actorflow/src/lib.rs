//! # actorflow: push-based message pipelines
//!
//! A pipeline is a static, acyclic chain of stages. Every stage is an
//! [`Emitter`]: it accepts exactly one downstream handler and then calls it
//! zero or more times with messages of a fixed type. Messages are moved from
//! producer to consumer on each push; nothing is buffered between stages.
//!
//! ```text
//! ┌────────┐   ┌───────────┐   ┌────────┐   ┌──────┐   ┌──────┐
//! │ Source │ → │ Transform │ → │ Filter │ → │ Join │ → │ Sink │
//! └────────┘   └───────────┘   └────────┘   └──────┘   └──────┘
//! ```
//!
//! Stages are described by unapplied factories ([`transform`], [`filter`],
//! [`join`], [`sink`], ...) and wired left to right with `|`:
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use actorflow::{filter, sink, transform, values};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let out = Rc::clone(&seen);
//!
//! let _pipeline = (values(vec![1, 2, 3])
//!     | filter(|x: &i32| *x != 2)
//!     | transform(|x: i32| x * 10)
//!     | sink(move |x: i32| out.borrow_mut().push(x)))
//! .expect("fresh pipeline");
//!
//! assert_eq!(*seen.borrow(), vec![10, 30]);
//! ```
//!
//! ## Execution model
//!
//! Everything runs on one thread. A source pushes a message and the whole
//! chain runs synchronously before the push returns, so no two messages are
//! ever processed concurrently and stage state needs no locking. Handlers are
//! therefore `Rc<dyn Fn(T)>` and pipelines are `!Send`.
//!
//! Nothing here performs I/O. Network sources live in `actorflow-server`,
//! which drives pipelines from a `mio` event loop.

mod emitter;
mod error;
mod filter;
mod join;
mod outcome;
mod sink;
mod transform;
mod values;


pub use emitter::{Emitter, Flow, Handler, Stage};
pub use error::{PipelineError, PipelineResult};
pub use filter::{Filter, FilterStage, filter};
pub use join::{Join, JoinStage, join};
pub use outcome::{
    AndThenStage, FilterOk, FilterOkStage, InspectErrStage, Panicked, and_then, attempt,
    filter_ok, inspect_err,
};
pub use sink::{Sink, SinkStage, sink};
pub use transform::{Transform, TransformStage, transform};
pub use values::{Values, values};
