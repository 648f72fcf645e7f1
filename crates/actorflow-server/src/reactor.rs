//! Single-threaded readiness event loop.
//!
//! The reactor owns the `mio::Poll` and a table of event sources (listeners,
//! sessions, the metrics endpoint) keyed by token. Each readiness event is
//! dispatched to its source, which pushes whatever it produced through the
//! attached pipeline before the dispatch returns.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::MetricsEndpoint;

const WAKER_TOKEN: Token = Token(0);
#[cfg(unix)]
const SIGNAL_TOKEN: Token = Token(1);
const FIRST_SOURCE_TOKEN: usize = 2;

/// What a readiness event reported for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    fn from_event(event: &mio::event::Event) -> Self {
        Self {
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable() || event.is_write_closed(),
        }
    }
}

/// Something the reactor dispatches readiness events to.
pub(crate) trait EventSource {
    /// Handles a readiness event.
    fn ready(&self, readiness: Readiness);

    /// Closes the source if it has been idle for longer than `timeout`.
    fn sweep(&self, _timeout: Duration) {}

    /// Releases the source when the reactor stops.
    fn shutdown(&self) {}
}

struct Shared {
    registry: Registry,
    sources: RefCell<HashMap<Token, Rc<dyn EventSource>>>,
    next_token: Cell<usize>,
    sessions: Cell<usize>,
    deferred: RefCell<Vec<Token>>,
    config: ServerConfig,
}

/// Cheap, cloneable access to a reactor's registration table.
///
/// Services and sessions hold one of these. It does not keep the reactor
/// alive; once the reactor is dropped every operation fails with
/// [`ServerError::ReactorGone`].
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Weak<Shared>,
}

impl ReactorHandle {
    fn shared(&self) -> ServerResult<Rc<Shared>> {
        self.shared.upgrade().ok_or(ServerError::ReactorGone)
    }

    /// Returns the reactor configuration.
    pub fn config(&self) -> ServerResult<ServerConfig> {
        Ok(self.shared()?.config.clone())
    }

    /// Returns the number of open sessions on this reactor.
    pub fn session_count(&self) -> usize {
        self.shared
            .upgrade()
            .map_or(0, |shared| shared.sessions.get())
    }

    /// Registers `source` under a fresh token.
    pub(crate) fn register<S: Source + ?Sized>(
        &self,
        source: &mut S,
        interest: Interest,
    ) -> ServerResult<Token> {
        let shared = self.shared()?;
        let token = Token(shared.next_token.get());
        shared.next_token.set(token.0 + 1);
        shared.registry.register(source, token, interest)?;
        Ok(token)
    }

    pub(crate) fn reregister<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> ServerResult<()> {
        self.shared()?
            .registry
            .reregister(source, token, interest)
            .map_err(ServerError::from)
    }

    /// Routes events for `token` to `handler`.
    pub(crate) fn insert(&self, token: Token, handler: Rc<dyn EventSource>) -> ServerResult<()> {
        self.shared()?.sources.borrow_mut().insert(token, handler);
        Ok(())
    }

    /// Deregisters `source` and forgets its token.
    ///
    /// Tolerates a dropped reactor so it can be called from `Drop`.
    pub(crate) fn remove<S: Source + ?Sized>(&self, source: &mut S, token: Token) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if let Err(error) = shared.registry.deregister(source) {
            debug!(?token, %error, "deregister failed");
        }
        // Dropping the entry may drop the source itself, so release the
        // table borrow first.
        let removed = shared.sources.borrow_mut().remove(&token);
        drop(removed);
    }

    /// Dispatches `token` as readable again on the next turn.
    ///
    /// Readiness is edge-triggered, so a source that stops reading before the
    /// socket would block must ask to be called back.
    pub(crate) fn defer(&self, token: Token) {
        if let Some(shared) = self.shared.upgrade() {
            let mut deferred = shared.deferred.borrow_mut();
            if !deferred.contains(&token) {
                deferred.push(token);
            }
        }
    }

    /// Reserves a session slot. Returns false at the configured limit.
    pub(crate) fn acquire_session(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let open = shared.sessions.get();
        if open >= shared.config.max_sessions {
            return false;
        }
        shared.sessions.set(open + 1);
        true
    }

    pub(crate) fn release_session(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.sessions.set(shared.sessions.get().saturating_sub(1));
        }
    }
}

impl std::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Thread-safe handle that stops a running reactor.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Asks the reactor to stop after the current dispatch.
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Err(error) = self.waker.wake() {
            warn!(%error, "failed to wake reactor for shutdown");
        }
    }

    /// Returns true once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("requested", &self.is_shutdown())
            .finish()
    }
}

/// The event loop.
///
/// # Usage
///
/// ```no_run
/// use actorflow::{sink, transform};
/// use actorflow_server::{Reactor, ServerConfig, Service};
///
/// let mut reactor = Reactor::new(ServerConfig::default())?;
/// let service = Service::bind(reactor.handle(), "127.0.0.1:42042".parse()?)?;
/// let _pipeline = (service
///     | transform(|line: String| line.to_uppercase())
///     | sink(|line: String| println!("{line}")))?;
/// reactor.run()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Reactor {
    poll: Poll,
    events: Events,
    shared: Rc<Shared>,
    handle: ReactorHandle,
    shutdown: ShutdownHandle,
    last_sweep: Instant,
    #[cfg(unix)]
    signals: Option<signal_hook_mio::v1_0::Signals>,
}

impl Reactor {
    /// Creates a reactor. Serves metrics if `config.metrics_addr` is set.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let metrics_addr = config.metrics_addr;

        let shared = Rc::new(Shared {
            registry,
            sources: RefCell::new(HashMap::new()),
            next_token: Cell::new(FIRST_SOURCE_TOKEN),
            sessions: Cell::new(0),
            deferred: RefCell::new(Vec::new()),
            config,
        });
        let handle = ReactorHandle {
            shared: Rc::downgrade(&shared),
        };

        let reactor = Self {
            poll,
            events: Events::with_capacity(1024),
            shared,
            handle,
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            last_sweep: Instant::now(),
            #[cfg(unix)]
            signals: None,
        };

        if let Some(addr) = metrics_addr {
            reactor.serve_metrics(addr)?;
        }
        Ok(reactor)
    }

    /// Stops `run` on SIGINT or SIGTERM.
    #[cfg(unix)]
    pub fn with_signal_handling(mut self) -> ServerResult<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let mut signals = signal_hook_mio::v1_0::Signals::new([SIGINT, SIGTERM])?;
        self.poll
            .registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;
        self.signals = Some(signals);
        Ok(self)
    }

    /// Signals are not wired on this platform; use a [`ShutdownHandle`].
    #[cfg(not(unix))]
    pub fn with_signal_handling(self) -> ServerResult<Self> {
        Ok(self)
    }

    /// Serves the Prometheus text format on `addr` and returns the bound
    /// address.
    pub fn serve_metrics(&self, addr: SocketAddr) -> ServerResult<SocketAddr> {
        MetricsEndpoint::spawn(&self.handle, addr)
    }

    /// Returns a handle for binding services to this reactor.
    pub fn handle(&self) -> &ReactorHandle {
        &self.handle
    }

    /// Returns a handle that stops this reactor from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Returns the reactor configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Returns the number of open sessions.
    pub fn session_count(&self) -> usize {
        self.shared.sessions.get()
    }

    /// Runs until shutdown is requested, then closes every session.
    pub fn run(&mut self) -> ServerResult<()> {
        info!("reactor running");
        let tick = self.shared.config.tick;
        while !self.shutdown.is_shutdown() {
            self.turn(Some(tick))?;
        }
        self.close_all();
        info!("reactor stopped");
        Ok(())
    }

    /// Turns the loop until `done` returns true or `limit` elapses.
    ///
    /// Returns whether `done` was satisfied. Meant for tests and embedding.
    pub fn run_until<F>(&mut self, limit: Duration, mut done: F) -> ServerResult<bool>
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + limit;
        let tick = self.shared.config.tick;
        loop {
            if done() {
                return Ok(true);
            }
            if self.shutdown.is_shutdown() {
                return Err(ServerError::Shutdown);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            self.turn(Some(tick.min(deadline - now)))?;
        }
    }

    /// Polls once, dispatches every ready source and sweeps idle sessions.
    #[instrument(level = "trace", skip(self))]
    pub fn turn(&mut self, timeout: Option<Duration>) -> ServerResult<()> {
        let deferred = std::mem::take(&mut *self.shared.deferred.borrow_mut());
        let timeout = if deferred.is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                self.shared.deferred.borrow_mut().extend(deferred);
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }

        let mut ready: Vec<(Token, Readiness)> = self
            .events
            .iter()
            .map(|event| (event.token(), Readiness::from_event(event)))
            .collect();
        for token in deferred {
            if !ready.iter().any(|(ready_token, _)| *ready_token == token) {
                ready.push((
                    token,
                    Readiness {
                        readable: true,
                        writable: false,
                    },
                ));
            }
        }

        for (token, readiness) in ready {
            match token {
                WAKER_TOKEN => {}
                #[cfg(unix)]
                SIGNAL_TOKEN => self.drain_signals(),
                token => self.dispatch(token, readiness),
            }
        }

        self.sweep_idle();
        Ok(())
    }

    fn dispatch(&self, token: Token, readiness: Readiness) {
        // Clone out of the table: the source may add or remove entries.
        let source = self.shared.sources.borrow().get(&token).cloned();
        match source {
            Some(source) => source.ready(readiness),
            None => debug!(?token, "event for unknown token"),
        }
    }

    fn sweep_idle(&mut self) {
        let Some(timeout) = self.shared.config.idle_timeout else {
            return;
        };
        if self.last_sweep.elapsed() < self.shared.config.tick {
            return;
        }
        self.last_sweep = Instant::now();

        for source in self.snapshot() {
            source.sweep(timeout);
        }
    }

    fn close_all(&self) {
        for source in self.snapshot() {
            source.shutdown();
        }
    }

    fn snapshot(&self) -> Vec<Rc<dyn EventSource>> {
        self.shared.sources.borrow().values().cloned().collect()
    }

    #[cfg(unix)]
    fn drain_signals(&mut self) {
        let Some(signals) = self.signals.as_mut() else {
            return;
        };
        for signal in signals.pending() {
            info!(signal, "received shutdown signal");
            self.shutdown.requested.store(true, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("sources", &self.shared.sources.borrow().len())
            .field("sessions", &self.shared.sessions.get())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
