//! Listening source.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::ops::BitOr;
use std::rc::{Rc, Weak};

use actorflow::{Emitter, Flow, Handler, PipelineError, PipelineResult, Stage};
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};
use tracing::{info, warn};

use crate::client::{Client, ReplyHandle};
use crate::error::{ServerError, ServerResult};
use crate::metrics::Metrics;
use crate::reactor::{EventSource, ReactorHandle, Readiness};
use crate::session::{Session, SessionCore};

/// A TCP listener that emits one message per received line.
///
/// The socket is bound on construction, but nothing is accepted until a
/// handler is registered (usually by attaching a sink to the chain). Every
/// accepted connection becomes a session feeding that same handler, so
/// messages from all clients interleave in arrival order.
///
/// Dropping the service stops listening and closes its sessions.
pub struct Service<M: 'static> {
    listener: Rc<Listener<M>>,
}

struct Listener<M: 'static> {
    reactor: ReactorHandle,
    socket: RefCell<TcpListener>,
    local_addr: SocketAddr,
    token: Cell<Option<Token>>,
    handler: RefCell<Option<Handler<M>>>,
    frame: fn(String, ReplyHandle) -> M,
    sessions: RefCell<Vec<Weak<SessionCore>>>,
}

impl Service<String> {
    /// Binds `addr`. Emits each received line with its delimiter removed.
    pub fn bind(reactor: &ReactorHandle, addr: SocketAddr) -> ServerResult<Self> {
        Self::bind_framed(reactor, addr, |line, _| line)
    }
}

impl Service<Client<String>> {
    /// Binds `addr`. Emits each received line wrapped in a [`Client`] that
    /// can reply to the sender.
    pub fn bind_with_client(reactor: &ReactorHandle, addr: SocketAddr) -> ServerResult<Self> {
        Self::bind_framed(reactor, addr, Client::new)
    }
}

impl<M: 'static> Service<M> {
    fn bind_framed(
        reactor: &ReactorHandle,
        addr: SocketAddr,
        frame: fn(String, ReplyHandle) -> M,
    ) -> ServerResult<Self> {
        let socket =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "service listening");

        Ok(Self {
            listener: Rc::new(Listener {
                reactor: reactor.clone(),
                socket: RefCell::new(socket),
                local_addr,
                token: Cell::new(None),
                handler: RefCell::new(None),
                frame,
                sessions: RefCell::new(Vec::new()),
            }),
        })
    }

    /// The bound address. Useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr
    }

    /// Number of open sessions accepted by this service.
    pub fn session_count(&self) -> usize {
        self.listener.prune();
        self.listener.sessions.borrow().len()
    }
}

impl<M: 'static> Listener<M> {
    fn prune(&self) {
        self.sessions
            .borrow_mut()
            .retain(|session| session.upgrade().is_some_and(|core| !core.is_closed()));
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        let Some(handler) = self.handler.borrow().clone() else {
            return;
        };

        if !self.reactor.acquire_session() {
            Metrics::global().sessions_rejected.inc();
            warn!(%peer, "session limit reached, dropping connection");
            return;
        }

        match Session::open(&self.reactor, stream, peer, handler, self.frame) {
            Ok(core) => {
                self.prune();
                self.sessions.borrow_mut().push(Rc::downgrade(&core));
            }
            Err(error) => {
                self.reactor.release_session();
                warn!(%peer, %error, "failed to open session");
            }
        }
    }
}

impl<M: 'static> EventSource for Listener<M> {
    fn ready(&self, _readiness: Readiness) {
        loop {
            let accepted = self.socket.borrow().accept();
            match accepted {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    Metrics::global().accept_errors.inc();
                    warn!(local_addr = %self.local_addr, %error, "accept failed");
                    if !is_transient_accept_error(&error) {
                        break;
                    }
                }
            }
        }
    }
}

/// Errors that concern only the connection being accepted. The queue may
/// still hold other connections, so accepting continues.
fn is_transient_accept_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
    )
}

impl<M: 'static> Emitter for Service<M> {
    type Item = M;

    fn set_message_handler(&mut self, handler: Handler<M>) -> PipelineResult<()> {
        let listener = &self.listener;
        if listener.handler.borrow().is_some() {
            return Err(PipelineError::already_registered("service"));
        }
        *listener.handler.borrow_mut() = Some(handler);

        let token = listener
            .reactor
            .register(&mut *listener.socket.borrow_mut(), Interest::READABLE)
            .map_err(|error| PipelineError::source_unavailable("service", error))?;
        listener.token.set(Some(token));

        let source: Rc<dyn EventSource> = Rc::<Listener<M>>::clone(listener);
        listener
            .reactor
            .insert(token, source)
            .map_err(|error| PipelineError::source_unavailable("service", error))
    }
}

impl<M: 'static> Drop for Service<M> {
    fn drop(&mut self) {
        let sessions: Vec<_> = self.listener.sessions.borrow_mut().drain(..).collect();
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.close("service dropped");
        }
        if let Some(token) = self.listener.token.take() {
            let mut socket = self.listener.socket.borrow_mut();
            self.listener.reactor.remove(&mut *socket, token);
        }
    }
}

impl<M: 'static> From<Service<M>> for Flow<M> {
    fn from(service: Service<M>) -> Self {
        Flow::new(service)
    }
}

impl<M: 'static, S: Stage<M>> BitOr<S> for Service<M> {
    type Output = S::Output;

    fn bitor(self, stage: S) -> S::Output {
        stage.attach(Flow::new(self))
    }
}

impl<M: 'static> fmt::Debug for Service<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("local_addr", &self.listener.local_addr)
            .field("token", &self.listener.token.get())
            .field("sessions", &self.listener.sessions.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(io::ErrorKind::ConnectionAborted, true; "aborted")]
    #[test_case(io::ErrorKind::ConnectionReset, true; "reset")]
    #[test_case(io::ErrorKind::TimedOut, true; "timed out")]
    #[test_case(io::ErrorKind::OutOfMemory, false; "out of memory")]
    #[test_case(io::ErrorKind::PermissionDenied, false; "permission denied")]
    fn accept_error_classification(kind: io::ErrorKind, transient: bool) {
        assert_eq!(is_transient_accept_error(&io::Error::from(kind)), transient);
    }

    #[test]
    fn descriptor_exhaustion_stops_the_accept_loop() {
        // EMFILE
        let error = io::Error::from_raw_os_error(24);
        assert!(!is_transient_accept_error(&error));
    }
}
