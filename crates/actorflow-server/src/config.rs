//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Port the reference pipelines listen on.
pub const DEFAULT_PORT: u16 = 42042;

/// Runtime configuration for a [`Reactor`](crate::Reactor) and the services
/// bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address a service binds to when none is given.
    pub bind_addr: SocketAddr,
    /// Sessions with no traffic for this long are closed. `None` disables
    /// the sweep.
    pub idle_timeout: Option<Duration>,
    /// Longest partial line a session buffers before it is closed.
    pub max_line_length: usize,
    /// Maximum concurrent sessions across all services on the reactor.
    pub max_sessions: usize,
    /// Initial capacity of per-session read and write buffers.
    pub read_buffer_size: usize,
    /// Bytes a session reads in one dispatch before yielding to other
    /// sources. The rest is read on the next turn.
    pub max_read_per_dispatch: usize,
    /// Upper bound on a single poll, and the idle sweep interval.
    pub tick: Duration,
    /// Address of the Prometheus scrape endpoint, if any.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            idle_timeout: Some(Duration::from_secs(300)),
            max_line_length: 64 * 1024,
            max_sessions: 1024,
            read_buffer_size: 4096,
            max_read_per_dispatch: 256 * 1024,
            tick: Duration::from_millis(100),
            metrics_addr: None,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration bound to `bind_addr` with default limits.
    pub fn new(bind_addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    /// Sets the idle timeout. `None` keeps idle sessions open forever.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the maximum buffered partial line length.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Sets the maximum number of concurrent sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Sets the initial per-session buffer capacity.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets how many bytes a session reads per dispatch.
    pub fn with_max_read_per_dispatch(mut self, max: usize) -> Self {
        self.max_read_per_dispatch = max;
        self
    }

    /// Sets the poll tick.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Serves `GET /metrics` on `addr`.
    pub fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }
}
