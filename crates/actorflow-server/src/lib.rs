//! # actorflow-server: network sources for actorflow pipelines
//!
//! This crate drives [`actorflow`] pipelines from TCP connections. A
//! [`Service`] is a source stage: it listens on a port and emits one message
//! per newline-terminated line received on any accepted connection.
//!
//! ## Architecture
//!
//! The server uses `mio` for non-blocking I/O with a poll-based event loop.
//! There is no async runtime and no worker pool: every readiness event is
//! handled on the reactor thread, and the pipeline runs synchronously inside
//! that dispatch.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Reactor                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────┐  │
//! │  │  Service    │ → │  Sessions   │ → │   Pipeline    │  │
//! │  │  (listener) │   │ (mio poll)  │   │ (| stages)    │  │
//! │  └─────────────┘   └─────────────┘   └───────────────┘  │
//! │         ↑                  ↑                 │          │
//! │         └──── ReplyHandle ─┴─────────────────┘          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use actorflow::sink;
//! use actorflow_server::{Client, Reactor, ServerConfig, Service, transform_with_client};
//!
//! let mut reactor = Reactor::new(ServerConfig::default())?.with_signal_handling()?;
//! let service = Service::bind_with_client(reactor.handle(), "0.0.0.0:42042".parse()?)?;
//!
//! let _echo = (service
//!     | transform_with_client(|line: String| line.to_uppercase())
//!     | sink(|client: Client<String>| client.reply(format!("{}\n", client.value()))))?;
//!
//! reactor.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod client;
mod config;
mod error;
mod http;
pub mod metrics;
mod reactor;
mod service;
mod session;

pub use client::{
    Client, ReplyHandle, and_then_with_client, apply_with_client, filter_with_client,
    lift_with_client, transform_with_client,
};
pub use config::{DEFAULT_PORT, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use metrics::Metrics;
pub use reactor::{Reactor, ReactorHandle, ShutdownHandle};
pub use service::Service;
pub use session::SessionState;
