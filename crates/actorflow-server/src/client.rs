//! Client correlation: carrying a reply path alongside a payload.
//!
//! A service bound with [`Service::bind_with_client`](crate::Service::bind_with_client)
//! emits [`Client<String>`] instead of bare lines. Ordinary mappings and
//! predicates written for the payload type are adapted with
//! [`lift_with_client`] and [`apply_with_client`], so the handle rides along
//! untouched until a sink calls [`Client::reply`].

use std::fmt;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};

use actorflow::{FilterStage, TransformStage, filter, transform};

use crate::session::{SessionCore, SessionState};

/// Reference back to the session a message came from.
///
/// Does not keep the session open. Once the session closes, replies are
/// dropped without error.
#[derive(Clone, Default)]
pub struct ReplyHandle {
    session: Weak<SessionCore>,
}

impl ReplyHandle {
    pub(crate) fn new(session: &Rc<SessionCore>) -> Self {
        Self {
            session: Rc::downgrade(session),
        }
    }

    /// A handle not attached to any session. Replies go nowhere.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Queues `bytes` on the session and tries to flush them immediately.
    ///
    /// Fire-and-forget: nothing is framed or appended, and write failures
    /// close the session instead of reaching the caller.
    pub fn reply(&self, bytes: impl AsRef<[u8]>) {
        if let Some(session) = self.session.upgrade() {
            session.queue_reply(bytes.as_ref());
        }
    }

    /// Returns the session state, or `None` once the session is gone.
    pub fn state(&self) -> Option<SessionState> {
        self.session.upgrade().map(|session| session.state())
    }

    /// Returns true while replies can still be delivered.
    pub fn is_open(&self) -> bool {
        self.state()
            .is_some_and(|state| state != SessionState::Closed)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.upgrade().map(|session| session.peer())
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("peer", &self.peer_addr())
            .field("state", &self.state())
            .finish()
    }
}

/// A payload paired with the handle of the session it arrived on.
#[derive(Clone)]
pub struct Client<T> {
    value: T,
    handle: ReplyHandle,
}

impl<T> Client<T> {
    /// Pairs `value` with `handle`.
    pub fn new(value: T, handle: ReplyHandle) -> Self {
        Self { value, handle }
    }

    /// The payload.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The reply path.
    pub fn handle(&self) -> &ReplyHandle {
        &self.handle
    }

    /// Replies to the originating session. See [`ReplyHandle::reply`].
    pub fn reply(&self, bytes: impl AsRef<[u8]>) {
        self.handle.reply(bytes);
    }

    /// Replaces the payload, keeping the handle.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Client<U> {
        Client {
            value: f(self.value),
            handle: self.handle,
        }
    }

    /// Splits into payload and handle.
    pub fn into_parts(self) -> (T, ReplyHandle) {
        (self.value, self.handle)
    }
}

impl<T: fmt::Debug> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("value", &self.value)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Adapts a payload mapping to operate on [`Client`]s.
pub fn lift_with_client<T, U, F>(f: F) -> impl Fn(Client<T>) -> Client<U>
where
    F: Fn(T) -> U,
{
    move |client: Client<T>| client.map(&f)
}

/// Adapts a payload observer or predicate to operate on [`Client`]s.
pub fn apply_with_client<T, R, F>(f: F) -> impl Fn(&Client<T>) -> R
where
    F: Fn(&T) -> R,
{
    move |client: &Client<T>| f(&client.value)
}

/// `transform(lift_with_client(f))`.
pub fn transform_with_client<T, U, F>(
    f: F,
) -> TransformStage<impl Fn(Client<T>) -> Client<U> + 'static, Client<T>, Client<U>>
where
    T: 'static,
    U: 'static,
    F: Fn(T) -> U + 'static,
{
    transform(lift_with_client(f))
}

/// `filter(apply_with_client(p))`.
pub fn filter_with_client<T, P>(
    predicate: P,
) -> FilterStage<impl Fn(&Client<T>) -> bool + 'static, Client<T>>
where
    T: 'static,
    P: Fn(&T) -> bool + 'static,
{
    filter(apply_with_client(predicate))
}

/// [`and_then`](actorflow::and_then) for client-wrapped results: applies
/// `step` to `Ok` payloads and passes errors through, keeping the handle.
pub fn and_then_with_client<T, U, E, F>(
    step: F,
) -> TransformStage<
    impl Fn(Client<Result<T, E>>) -> Client<Result<U, E>> + 'static,
    Client<Result<T, E>>,
    Client<Result<U, E>>,
>
where
    T: 'static,
    U: 'static,
    E: 'static,
    F: Fn(T) -> Result<U, E> + 'static,
{
    transform_with_client(move |message: Result<T, E>| message.and_then(&step))
}
