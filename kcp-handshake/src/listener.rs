use std::{fmt, io, mem, net::SocketAddr, sync::Arc, time::Instant};

use proto::{DatagramEvent, ListenerConfig, SessionRegistry, HANDSHAKE_SIZE};
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::{mutex::Mutex, pool::BufferPool, udp::send_transmit};

/// An established session as seen by the [`Listener`]
///
/// Implemented by the reliable-delivery engine's session type.
pub trait SessionHandle: Send + Sync + 'static {
    /// Tear the session down because its peer disconnected
    ///
    /// May be called more than once for the same session if the peer repeats its disconnect.
    fn close(&self);
}

/// The server side of the handshake on one UDP socket
///
/// Answers connects with a freshly reserved conv and closes sessions whose peer disconnects. All
/// other datagrams are left to the caller, see [`Listener::recv`].
///
/// May be cloned to obtain another handle to the same listener.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Bind a listener to `addr`
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        config: Arc<ListenerConfig>,
        pool: Arc<BufferPool>,
    ) -> io::Result<Self> {
        Self::from_std(std::net::UdpSocket::bind(addr)?, config, pool)
    }

    /// Build a listener on an already bound socket
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_std(
        socket: std::net::UdpSocket,
        config: Arc<ListenerConfig>,
        pool: Arc<BufferPool>,
    ) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;
        Ok(Self {
            inner: Arc::new(ListenerInner {
                socket,
                pool,
                state: Mutex::new(State {
                    proto: proto::Listener::new(config),
                    sessions: Sessions::default(),
                }),
            }),
        })
    }

    /// Handle `datagram` if it is a handshake frame
    ///
    /// Returns `false` if the datagram is not the size of a handshake frame, in which case it is
    /// untouched and belongs to the reliable-delivery engine.
    pub fn try_handle_handshake(&self, datagram: &[u8], source: SocketAddr) -> bool {
        if datagram.len() != HANDSHAKE_SIZE {
            return false;
        }

        let (event, closing) = {
            let state = &mut *self.inner.state.lock("handle");
            let event = state
                .proto
                .handle(Instant::now(), source, datagram, &mut state.sessions);
            (event, mem::take(&mut state.sessions.closing))
        };

        // Closed outside the lock, since closing may call back into the listener
        for session in closing {
            session.close();
        }

        match event {
            None => false,
            Some(DatagramEvent::Respond(transmit)) => {
                send_transmit(&self.inner.socket, &self.inner.pool, &transmit);
                true
            }
            Some(DatagramEvent::Closed { conv }) => {
                debug!(%source, conv, "peer disconnected");
                true
            }
            Some(DatagramEvent::Dropped(reason)) => {
                trace!(%source, ?reason, "dropped handshake frame");
                true
            }
        }
    }

    /// Receive the next datagram that is not a handshake frame
    ///
    /// Handshake frames arriving in the meantime are handled as by
    /// [`Listener::try_handle_handshake`].
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let (len, remote) = match self.inner.socket.recv_from(buf).await {
                Ok(x) => x,
                // Ignore ECONNRESET, which may be injected by an attacker
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            };
            if !self.try_handle_handshake(&buf[..len], remote) {
                return Ok((len, remote));
            }
        }
    }

    /// Send a datagram to `destination` on the listener's socket
    pub async fn send_to(&self, datagram: &[u8], destination: SocketAddr) -> io::Result<usize> {
        self.inner.socket.send_to(datagram, destination).await
    }

    /// Register the established session for `conv`
    ///
    /// Releases the conv's pending attempt in the same critical section, so the conv stays
    /// reserved throughout. Returns the session previously registered under `conv`, if any.
    pub fn register_session(
        &self,
        conv: u64,
        session: Arc<dyn SessionHandle>,
    ) -> Option<Arc<dyn SessionHandle>> {
        let state = &mut *self.inner.state.lock("register");
        let prev = state.sessions.live.insert(conv, session);
        if let Some(waiter) = state.proto.session_established(conv) {
            trace!(conv, remote = %waiter.remote, "session established");
        }
        prev
    }

    /// Forget the session registered under `conv`, freeing the conv for reuse
    pub fn deregister_session(&self, conv: u64) -> Option<Arc<dyn SessionHandle>> {
        self.inner
            .state
            .lock("deregister")
            .sessions
            .live
            .remove(&conv)
    }

    /// Address of the peer that was given `conv` but has no established session yet
    pub fn pending_peer(&self, conv: u64) -> Option<SocketAddr> {
        self.inner
            .state
            .lock("pending_peer")
            .proto
            .pending(conv)
            .map(|w| w.remote)
    }

    /// Number of connection attempts that have a conv but no session yet
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock("pending_count").proto.pending_count()
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.inner.state.lock("session_count").sessions.live.len()
    }

    /// The pool transmit buffers are drawn from
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.inner.pool
    }

    /// Get the local `SocketAddr` the underlying socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("socket", &self.inner.socket)
            .finish_non_exhaustive()
    }
}

struct ListenerInner {
    socket: UdpSocket,
    pool: Arc<BufferPool>,
    // Covers the waiter cache together with the session registry
    state: Mutex<State>,
}

struct State {
    proto: proto::Listener,
    sessions: Sessions,
}

#[derive(Default)]
struct Sessions {
    live: FxHashMap<u64, Arc<dyn SessionHandle>>,
    // Sessions to close once the lock is released
    closing: Vec<Arc<dyn SessionHandle>>,
}

impl SessionRegistry for Sessions {
    fn contains(&self, conv: u64) -> bool {
        self.live.contains_key(&conv)
    }

    fn close(&mut self, conv: u64) -> bool {
        match self.live.get(&conv) {
            Some(session) => {
                self.closing.push(session.clone());
                true
            }
            None => false,
        }
    }
}
