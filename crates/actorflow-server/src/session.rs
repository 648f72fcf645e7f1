//! Per-connection session state.
//!
//! A session owns one accepted socket. It splits inbound bytes into
//! newline-terminated lines, pushes each line into the pipeline of the
//! service that accepted it, and flushes replies queued through a
//! [`ReplyHandle`].

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use actorflow::Handler;
use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Interest, Token};
use tracing::{debug, trace, warn};

use crate::client::ReplyHandle;
use crate::error::ServerResult;
use crate::metrics::Metrics;
use crate::reactor::{EventSource, ReactorHandle, Readiness};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, nothing read yet.
    Accepted,
    /// Reading lines.
    Reading,
    /// Peer closed its half; flushing queued replies before closing.
    Draining,
    /// Released. Nothing is emitted or written any more.
    Closed,
}

/// How a read pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStatus {
    /// The socket would block.
    Drained,
    /// The per-dispatch budget ran out with data possibly still queued.
    Yielded,
    /// The peer closed its write half.
    Eof,
    /// The unterminated tail grew past the line limit.
    Overflow,
}

/// Socket and buffers of one session.
struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    state: SessionState,
    interest: Interest,
    last_activity: Instant,
}

impl Connection {
    fn new(stream: TcpStream, buffer_size: usize) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(buffer_size),
            write_buf: BytesMut::with_capacity(buffer_size),
            state: SessionState::Accepted,
            interest: Interest::READABLE,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Reads until the socket would block, at most `budget` bytes.
    ///
    /// The read buffer holds only an unterminated tail on entry. Reading
    /// stops as soon as that tail exceeds `max_line_length`.
    fn read(&mut self, max_line_length: usize, budget: usize) -> io::Result<ReadStatus> {
        let mut temp_buf = [0u8; 4096];
        let mut tail = self.read_buf.len();
        let mut total = 0;

        while total < budget {
            let want = temp_buf.len().min(budget - total);
            match self.stream.read(&mut temp_buf[..want]) {
                Ok(0) => return Ok(ReadStatus::Eof),
                Ok(n) => {
                    let chunk = &temp_buf[..n];
                    self.read_buf.extend_from_slice(chunk);
                    total += n;
                    tail = match chunk.iter().rposition(|&b| b == b'\n') {
                        Some(end) => n - end - 1,
                        None => tail + n,
                    };
                    if tail > max_line_length {
                        return Ok(ReadStatus::Overflow);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::Drained);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(ReadStatus::Yielded)
    }

    /// Writes as much of the write buffer as the socket takes.
    ///
    /// Returns `true` if the buffer is now empty.
    fn write(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => {
                    let _ = self.write_buf.split_to(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    fn desired_interest(&self) -> Interest {
        match (self.state, self.write_buf.is_empty()) {
            (SessionState::Draining, _) => Interest::WRITABLE,
            (_, true) => Interest::READABLE,
            (_, false) => Interest::READABLE | Interest::WRITABLE,
        }
    }
}

/// Removes every complete line from `buf`.
///
/// The `\n` delimiter is stripped and invalid UTF-8 is replaced. Bytes after
/// the last delimiter stay in the buffer.
pub(crate) fn split_lines(buf: &mut BytesMut) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(end) = buf.iter().position(|&b| b == b'\n') {
        let line = buf.split_to(end + 1);
        lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
    }
    lines
}

/// The part of a session reachable from reply handles.
pub(crate) struct SessionCore {
    token: Token,
    peer: SocketAddr,
    reactor: ReactorHandle,
    conn: RefCell<Connection>,
}

impl SessionCore {
    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn state(&self) -> SessionState {
        self.conn.borrow().state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Appends `bytes` to the write buffer and tries to send them now.
    pub(crate) fn queue_reply(&self, bytes: &[u8]) {
        {
            let mut conn = self.conn.borrow_mut();
            if conn.state == SessionState::Closed {
                trace!(peer = %self.peer, "reply to closed session dropped");
                return;
            }
            conn.write_buf.extend_from_slice(bytes);
        }
        Metrics::global().replies_queued.inc();
        self.flush();
    }

    fn flush(&self) {
        let (result, state) = {
            let mut conn = self.conn.borrow_mut();
            if conn.state == SessionState::Closed {
                return;
            }
            let result = conn.write();
            if matches!(result, Ok(true)) {
                conn.touch();
            }
            (result, conn.state)
        };

        match result {
            Ok(true) if state == SessionState::Draining => self.close("drained"),
            Ok(_) => self.update_interest(),
            Err(error) => {
                trace!(peer = %self.peer, %error, "reply write failed");
                self.close("write failed");
            }
        }
    }

    /// Peer closed its write half.
    fn finish(&self) {
        let pending = {
            let mut conn = self.conn.borrow_mut();
            if conn.state == SessionState::Closed {
                return;
            }
            let pending = !conn.write_buf.is_empty();
            if pending {
                conn.state = SessionState::Draining;
                conn.read_buf.clear();
            }
            pending
        };

        if pending {
            self.update_interest();
        } else {
            self.close("peer closed");
        }
    }

    fn update_interest(&self) {
        let mut conn = self.conn.borrow_mut();
        let interest = conn.desired_interest();
        if interest == conn.interest {
            return;
        }
        match self.reactor.reregister(&mut conn.stream, self.token, interest) {
            Ok(()) => conn.interest = interest,
            Err(error) => {
                drop(conn);
                debug!(peer = %self.peer, %error, "reregister failed");
                self.close("reregister failed");
            }
        }
    }

    /// Releases the socket. Idempotent.
    pub(crate) fn close(&self, reason: &'static str) {
        let mut conn = self.conn.borrow_mut();
        if conn.state == SessionState::Closed {
            return;
        }
        conn.state = SessionState::Closed;
        conn.read_buf.clear();
        conn.write_buf.clear();
        let _ = conn.stream.shutdown(Shutdown::Both);
        self.reactor.remove(&mut conn.stream, self.token);
        drop(conn);

        self.reactor.release_session();
        Metrics::global().sessions_active.dec();
        debug!(peer = %self.peer, reason, "session closed");
    }
}

/// A session feeding messages of type `M` into a pipeline.
pub(crate) struct Session<M: 'static> {
    core: Rc<SessionCore>,
    handler: Handler<M>,
    frame: fn(String, ReplyHandle) -> M,
    max_line_length: usize,
    read_budget: usize,
}

impl<M: 'static> Session<M> {
    /// Registers `stream` with the reactor and starts reading.
    ///
    /// The caller has already reserved a session slot.
    pub(crate) fn open(
        reactor: &ReactorHandle,
        mut stream: TcpStream,
        peer: SocketAddr,
        handler: Handler<M>,
        frame: fn(String, ReplyHandle) -> M,
    ) -> ServerResult<Rc<SessionCore>> {
        let config = reactor.config()?;
        let token = reactor.register(&mut stream, Interest::READABLE)?;

        let core = Rc::new(SessionCore {
            token,
            peer,
            reactor: reactor.clone(),
            conn: RefCell::new(Connection::new(stream, config.read_buffer_size)),
        });
        let session: Rc<dyn EventSource> = Rc::new(Session {
            core: Rc::clone(&core),
            handler,
            frame,
            max_line_length: config.max_line_length,
            read_budget: config.max_read_per_dispatch.max(1),
        });
        reactor.insert(token, session)?;

        let metrics = Metrics::global();
        metrics.sessions_accepted.inc();
        metrics.sessions_active.inc();
        debug!(%peer, ?token, "session opened");
        Ok(core)
    }

    fn read(&self) {
        let (lines, outcome) = {
            let mut conn = self.core.conn.borrow_mut();
            match conn.state {
                SessionState::Accepted => conn.state = SessionState::Reading,
                SessionState::Reading => {}
                SessionState::Draining | SessionState::Closed => return,
            }
            let outcome = conn.read(self.max_line_length, self.read_budget);
            conn.touch();
            (split_lines(&mut conn.read_buf), outcome)
        };

        for line in lines {
            if self.core.is_closed() {
                return;
            }
            Metrics::global().lines_received.inc();
            let message = (self.frame)(line, ReplyHandle::new(&self.core));
            (self.handler)(message);
        }
        if self.core.is_closed() {
            return;
        }

        match outcome {
            Ok(ReadStatus::Drained) => {}
            Ok(ReadStatus::Yielded) => self.core.reactor.defer(self.core.token),
            Ok(ReadStatus::Eof) => self.core.finish(),
            Ok(ReadStatus::Overflow) => {
                warn!(
                    peer = %self.core.peer,
                    limit = self.max_line_length,
                    "line exceeds maximum length, closing session"
                );
                self.core.close("line too long");
            }
            Err(error) => {
                debug!(peer = %self.core.peer, %error, "read failed");
                self.core.close("read failed");
            }
        }
    }
}

impl<M: 'static> EventSource for Session<M> {
    fn ready(&self, readiness: Readiness) {
        if readiness.writable {
            self.core.flush();
        }
        if readiness.readable {
            self.read();
        }
    }

    fn sweep(&self, timeout: Duration) {
        let idle = {
            let conn = self.core.conn.borrow();
            conn.state != SessionState::Closed && conn.is_idle(timeout)
        };
        if idle {
            Metrics::global().idle_timeouts.inc();
            self.core.close("idle timeout");
        }
    }

    fn shutdown(&self) {
        self.core.close("shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;
    use test_case::test_case;

    /// A non-blocking server-side connection and the blocking client end.
    fn connected_pair() -> (Connection, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let client =
            std::net::TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        server.set_nonblocking(true).expect("nonblocking");
        (Connection::new(TcpStream::from_std(server), 4096), client)
    }

    /// Reads until the pass ends with something other than an empty drain.
    fn read_until_status(
        conn: &mut Connection,
        max_line_length: usize,
        budget: usize,
    ) -> ReadStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let before = conn.read_buf.len();
            let status = conn.read(max_line_length, budget).expect("read");
            if status != ReadStatus::Drained || conn.read_buf.len() > before {
                return status;
            }
            assert!(Instant::now() < deadline, "no data arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn unterminated_burst_stops_at_the_line_limit() {
        let (mut conn, client) = connected_pair();
        let writer = thread::spawn(move || {
            let mut client = client;
            // Fails with a reset once the server end goes away.
            let _ = client.write_all(&vec![b'x'; 8 * 1024 * 1024]);
        });

        let mut status = read_until_status(&mut conn, 64 * 1024, usize::MAX);
        while status == ReadStatus::Drained {
            status = read_until_status(&mut conn, 64 * 1024, usize::MAX);
        }

        assert_eq!(status, ReadStatus::Overflow);
        assert!(
            conn.read_buf.len() <= 64 * 1024 + 4096,
            "buffered {} bytes",
            conn.read_buf.len()
        );
        drop(conn);
        writer.join().expect("writer thread");
    }

    #[test]
    fn complete_lines_do_not_count_toward_the_line_limit() {
        let (mut conn, mut client) = connected_pair();
        let line = format!("{}\n", "y".repeat(60));
        for _ in 0..20 {
            client.write_all(line.as_bytes()).expect("write");
        }

        let mut lines = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while lines.len() < 20 && Instant::now() < deadline {
            let status = conn.read(64, usize::MAX).expect("read");
            assert_ne!(status, ReadStatus::Overflow);
            lines.extend(split_lines(&mut conn.read_buf));
        }

        assert_eq!(lines.len(), 20);
    }

    #[test]
    fn read_yields_after_the_budget() {
        let (mut conn, mut client) = connected_pair();
        client
            .write_all("z\n".repeat(16 * 1024).as_bytes())
            .expect("write");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut yielded = false;
        while !yielded && Instant::now() < deadline {
            let status = conn.read(1024, 8 * 1024).expect("read");
            assert!(conn.read_buf.len() <= 8 * 1024);
            yielded = status == ReadStatus::Yielded;
            split_lines(&mut conn.read_buf);
        }

        assert!(yielded);
    }

    #[test]
    fn read_reports_peer_close() {
        let (mut conn, client) = connected_pair();
        drop(client);

        assert_eq!(read_until_status(&mut conn, 1024, 1024), ReadStatus::Eof);
    }

    #[test_case(b"hello\n", &["hello"], b""; "single line")]
    #[test_case(b"a\nb\nc", &["a", "b"], b"c"; "keeps partial tail")]
    #[test_case(b"\n\n", &["", ""], b""; "empty lines")]
    #[test_case(b"no delimiter", &[], b"no delimiter"; "nothing complete")]
    #[test_case(b"caf\xc3\xa9\n", &["caf\u{e9}"], b""; "utf8 preserved")]
    #[test_case(b"bad\xff\n", &["bad\u{fffd}"], b""; "invalid utf8 replaced")]
    #[test_case(b"  spaced  \r\n", &["  spaced  \r"], b""; "only newline stripped")]
    fn split_lines_cases(input: &[u8], expected: &[&str], rest: &[u8]) {
        let mut buf = BytesMut::from(input);

        let lines = split_lines(&mut buf);

        assert_eq!(lines, expected);
        assert_eq!(&buf[..], rest);
    }

    proptest! {
        /// Property: splitting never loses or reorders complete lines, no
        /// matter how the bytes arrive.
        #[test]
        fn prop_split_lines_is_chunking_invariant(
            lines in proptest::collection::vec("[a-z ]{0,12}", 0..16),
            cut in 0usize..256,
        ) {
            let joined: String = lines.iter().map(|line| format!("{line}\n")).collect();
            let cut = cut.min(joined.len());

            let mut buf = BytesMut::new();
            buf.extend_from_slice(&joined.as_bytes()[..cut]);
            let mut out = split_lines(&mut buf);
            buf.extend_from_slice(&joined.as_bytes()[cut..]);
            out.extend(split_lines(&mut buf));

            prop_assert_eq!(out, lines);
            prop_assert!(buf.is_empty());
        }
    }
}
