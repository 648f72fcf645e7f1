//! Minimal HTTP endpoint for Prometheus scrapes.
//!
//! Runs on the reactor next to the pipeline services and answers
//! `GET /metrics` with the text exposition format. Every other request gets
//! a 404. Connections are not kept alive.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::rc::Rc;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::metrics::Metrics;
use crate::reactor::{EventSource, ReactorHandle, Readiness};

/// Requests larger than this are answered with 400.
const MAX_REQUEST: usize = 8 * 1024;

/// Listener half of the metrics endpoint.
pub(crate) struct MetricsEndpoint {
    reactor: ReactorHandle,
    listener: TcpListener,
}

impl MetricsEndpoint {
    /// Binds `addr` and hands the endpoint to the reactor, which owns it from
    /// then on.
    pub(crate) fn spawn(reactor: &ReactorHandle, addr: SocketAddr) -> ServerResult<SocketAddr> {
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        let token = reactor.register(&mut listener, Interest::READABLE)?;
        reactor.insert(
            token,
            Rc::new(Self {
                reactor: reactor.clone(),
                listener,
            }),
        )?;
        info!(%local_addr, "metrics endpoint listening");
        Ok(local_addr)
    }
}

impl EventSource for MetricsEndpoint {
    fn ready(&self, _readiness: Readiness) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "metrics scrape connection");
                    if let Err(error) = Scrape::start(&self.reactor, stream) {
                        warn!(%peer, %error, "failed to register scrape connection");
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    warn!(%error, "metrics accept failed");
                    break;
                }
            }
        }
    }
}

/// One scrape: read a request line, write one response, close.
struct Scrape {
    reactor: ReactorHandle,
    token: Token,
    stream: RefCell<TcpStream>,
    request: RefCell<Vec<u8>>,
}

impl Scrape {
    fn start(reactor: &ReactorHandle, mut stream: TcpStream) -> ServerResult<()> {
        let token = reactor.register(&mut stream, Interest::READABLE)?;
        reactor.insert(
            token,
            Rc::new(Self {
                reactor: reactor.clone(),
                token,
                stream: RefCell::new(stream),
                request: RefCell::new(Vec::new()),
            }),
        )
    }

    fn finish(&self) {
        let mut stream = self.stream.borrow_mut();
        let _ = stream.shutdown(Shutdown::Both);
        self.reactor.remove(&mut *stream, self.token);
    }
}

impl EventSource for Scrape {
    fn ready(&self, _readiness: Readiness) {
        let mut buf = [0u8; 1024];
        let open = loop {
            let read = self.stream.borrow_mut().read(&mut buf);
            match read {
                Ok(0) => break false,
                Ok(n) => self.request.borrow_mut().extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break true,
                Err(error) => {
                    debug!(%error, "metrics read failed");
                    break false;
                }
            }
        };

        let response = {
            let request = self.request.borrow();
            let text = String::from_utf8_lossy(&request);
            if text.contains('\n') {
                Some(match parse_request_path(&text) {
                    Some(path) => dispatch(path),
                    None => http_response(400, "text/plain", "Bad Request"),
                })
            } else if request.len() > MAX_REQUEST {
                Some(http_response(400, "text/plain", "Bad Request"))
            } else {
                None
            }
        };

        match response {
            Some(response) => {
                // Responses are small enough for the socket buffer.
                if let Err(error) = self.stream.borrow_mut().write_all(response.as_bytes()) {
                    debug!(%error, "metrics write failed");
                }
                self.finish();
            }
            None if !open => self.finish(),
            None => {}
        }
    }

    fn shutdown(&self) {
        self.finish();
    }
}

/// Parse the request path from an HTTP request line.
fn parse_request_path(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;

    if method != "GET" {
        return None;
    }

    Some(path)
}

fn dispatch(path: &str) -> String {
    match path {
        "/metrics" => http_response(
            200,
            "text/plain; version=0.0.4; charset=utf-8",
            &Metrics::global().render(),
        ),
        _ => http_response(404, "text/plain", "Not Found"),
    }
}

/// Build a minimal HTTP/1.1 response.
fn http_response(status: u16, content_type: &str, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    };

    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}
