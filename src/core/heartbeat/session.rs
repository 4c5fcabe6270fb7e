// src/core/heartbeat/session.rs

//! The transport session bound to one heartbeat target.
//!
//! A session owns at most one socket at a time. The socket is allocated eagerly at
//! construction when possible, and otherwise (or after a disconnect) lazily on the
//! next probe: every probe goes through `open`, which is also the retry path for a
//! failed allocation.

use super::codec::PingCodec;
use super::handler::HbSessionHandler;
use super::selector::SelectorHandle;
use super::types::SessionId;
use crate::core::errors::HeartbeatError;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::{TcpSocket, TcpStream};
use tokio_util::codec::Framed;

/// The framed connection a probe talks over.
pub type HbStream = Framed<TcpStream, PingCodec>;

enum Channel {
    Closed,
    Allocated { socket: TcpSocket, v6: bool },
    Connected(HbStream),
}

fn new_socket(v6: bool) -> io::Result<TcpSocket> {
    if v6 {
        TcpSocket::new_v6()
    } else {
        TcpSocket::new_v4()
    }
}

/// A reusable, reactor-registered network session identified by its session id.
pub struct ClientSession {
    id: SessionId,
    remote: Mutex<Option<SocketAddr>>,
    channel: Mutex<Channel>,
    /// Bumped on every disconnect so that a probe holding a stale stream drops it.
    generation: AtomicU64,
    probing: AtomicBool,
    handler: Mutex<Arc<HbSessionHandler>>,
    selector: Mutex<Option<SelectorHandle>>,
}

impl ClientSession {
    /// Creates a session and binds it to `handler` in both directions.
    pub fn new(id: SessionId, handler: Arc<HbSessionHandler>) -> Arc<Self> {
        let session = Arc::new(Self {
            id,
            remote: Mutex::new(None),
            channel: Mutex::new(Channel::Closed),
            generation: AtomicU64::new(0),
            probing: AtomicBool::new(false),
            handler: Mutex::new(handler.clone()),
            selector: Mutex::new(None),
        });
        handler.set_session(Arc::downgrade(&session));
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn handler(&self) -> Arc<HbSessionHandler> {
        self.handler.lock().clone()
    }

    /// Replaces the bound handler, rebinding the back reference of the new one.
    pub fn set_handler(self: &Arc<Self>, handler: Arc<HbSessionHandler>) {
        handler.set_session(Arc::downgrade(self));
        *self.handler.lock() = handler;
    }

    pub fn set_selector(&self, selector: SelectorHandle) {
        *self.selector.lock() = Some(selector);
    }

    /// Nudges the associated selector, if any, to dispatch immediately.
    pub fn wake(&self) {
        if let Some(selector) = self.selector.lock().as_ref() {
            selector.wake();
        }
    }

    pub fn set_remote(&self, ip: IpAddr, port: u16) {
        *self.remote.lock() = Some(SocketAddr::new(ip, port));
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.lock()
    }

    /// Allocates socket resources for the remote address family (IPv4 if the remote
    /// is not known yet).
    pub fn create_channel(&self) -> io::Result<()> {
        let v6 = matches!(self.remote(), Some(SocketAddr::V6(_)));
        let socket = new_socket(v6)?;
        *self.channel.lock() = Channel::Allocated { socket, v6 };
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.channel.lock(), Channel::Connected(_))
    }

    pub fn has_channel(&self) -> bool {
        !matches!(*self.channel.lock(), Channel::Closed)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Releases socket-level resources. The session itself stays usable: the next
    /// probe allocates and connects a new socket.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.channel.lock() = Channel::Closed;
    }

    /// Takes the connected stream out of the session, connecting first if needed.
    /// The caller hands it back with `restore` once the exchange succeeded.
    pub async fn open(
        &self,
        codec: PingCodec,
        capacity: usize,
    ) -> Result<HbStream, HeartbeatError> {
        let addr = self.remote().ok_or(HeartbeatError::NoRemoteAddress)?;
        let channel = std::mem::replace(&mut *self.channel.lock(), Channel::Closed);

        let socket = match channel {
            Channel::Connected(stream) => return Ok(stream),
            Channel::Allocated { socket, v6 } if v6 == addr.is_ipv6() => socket,
            _ => new_socket(addr.is_ipv6())?,
        };

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Framed::with_capacity(stream, codec, capacity))
    }

    /// Returns a stream taken by `open`. It is dropped instead if the session was
    /// disconnected in the meantime.
    pub fn restore(&self, stream: HbStream, generation: u64) {
        let mut channel = self.channel.lock();
        if self.generation() == generation {
            *channel = Channel::Connected(stream);
        }
    }

    /// Marks a probe as in flight. Returns `None` if one already is.
    pub fn try_begin_probe(self: &Arc<Self>) -> Option<ProbeGuard> {
        self.probing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProbeGuard {
                session: self.clone(),
            })
    }

    pub fn is_probing(&self) -> bool {
        self.probing.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("remote", &self.remote())
            .field("generation", &self.generation())
            .field("probing", &self.is_probing())
            .finish_non_exhaustive()
    }
}

/// An RAII guard marking a probe in flight. Dropping it lets the selector schedule
/// the session's next probe.
pub struct ProbeGuard {
    session: Arc<ClientSession>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.session.probing.store(false, Ordering::Release);
    }
}
