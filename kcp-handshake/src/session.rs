use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use proto::{ConfigError, Initiator, InitiatorConfig, ReplyEvent};
use thiserror::Error;
use tokio::{
    net::UdpSocket,
    time::{timeout_at, Instant},
};
use tracing::{debug, trace};

use crate::{mutex::Mutex, pool::BufferPool, udp::send_transmit};

/// Receive buffer used while waiting for the listener's response
///
/// Anything that does not fit is not a handshake frame anyway.
const CONNECT_RECV_BUF: usize = 64;

/// Parameters governing the connect routine of a [`Session`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) initiator: InitiatorConfig,
    pub(crate) connect_interval: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) buffer_pool: Arc<BufferPool>,
}

impl SessionConfig {
    /// Frame contents used by the handshake
    pub fn initiator(&mut self, value: InitiatorConfig) -> &mut Self {
        self.initiator = value;
        self
    }

    /// How long to wait for a response before sending another connect
    ///
    /// Must be nonzero. Defaults to 200ms.
    pub fn connect_interval(&mut self, value: Duration) -> Result<&mut Self, ConfigError> {
        if value.is_zero() {
            return Err(ConfigError::OutOfBounds);
        }
        self.connect_interval = value;
        Ok(self)
    }

    /// How long to keep trying before giving up on the listener
    ///
    /// Defaults to 3s.
    pub fn connect_timeout(&mut self, value: Duration) -> &mut Self {
        self.connect_timeout = value;
        self
    }

    /// Pool to draw transmit buffers from
    ///
    /// Defaults to a pool private to the session.
    pub fn buffer_pool(&mut self, value: Arc<BufferPool>) -> &mut Self {
        self.buffer_pool = value;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initiator: InitiatorConfig::default(),
            connect_interval: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(3),
            buffer_pool: Arc::new(BufferPool::default()),
        }
    }
}

/// The client side of the handshake for one session
///
/// Created by [`Session::connect`], which returns once the listener has assigned a conv.
#[derive(Debug)]
pub struct Session {
    socket: UdpSocket,
    remote: SocketAddr,
    pool: Arc<BufferPool>,
    state: Mutex<Initiator>,
}

impl Session {
    /// Connect to the listener at `remote` using `socket`
    ///
    /// Sends a connect every `connect_interval` until a verified response arrives or
    /// `connect_timeout` elapses. Datagrams from other addresses, and anything but handshake
    /// frames, are discarded while waiting.
    pub async fn connect(
        socket: UdpSocket,
        remote: SocketAddr,
        config: SessionConfig,
    ) -> Result<Self, ConnectError> {
        let session = Self {
            socket,
            remote,
            pool: config.buffer_pool,
            state: Mutex::new(Initiator::new(remote, config.initiator)),
        };

        let deadline = Instant::now() + config.connect_timeout;
        let mut buf = [0; CONNECT_RECV_BUF];
        loop {
            session.send_connect();
            let retry_at = deadline.min(Instant::now() + config.connect_interval);
            loop {
                let received = timeout_at(retry_at, session.socket.recv_from(&mut buf)).await;
                let (len, from) = match received {
                    Err(_) => break,
                    Ok(Ok(x)) => x,
                    Ok(Err(ref e)) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                    Ok(Err(e)) => return Err(e.into()),
                };
                if from != remote {
                    trace!(%from, "ignoring datagram from unexpected peer");
                    continue;
                }
                if session.try_handle_handshake_reply(&buf[..len]) {
                    if let Some(conv) = session.conv() {
                        debug!(%remote, conv, "connected");
                        return Ok(session);
                    }
                }
            }
            if Instant::now() >= deadline {
                debug!(%remote, "connect timed out");
                return Err(ConnectError::TimedOut);
            }
        }
    }

    /// Send a connect to the listener
    pub fn send_connect(&self) {
        let transmit = self.state.lock("send_connect").connect();
        send_transmit(&self.socket, &self.pool, &transmit);
    }

    /// Handle `datagram` if it is a handshake frame
    ///
    /// A verified connect response installs its conv. Returns `false` if the datagram is not the
    /// size of a handshake frame, in which case it belongs to the reliable-delivery engine.
    pub fn try_handle_handshake_reply(&self, datagram: &[u8]) -> bool {
        let event = self.state.lock("handle_reply").handle(datagram);
        match event {
            None => false,
            Some(ReplyEvent::Installed { conv }) => {
                trace!(conv, "connect response");
                true
            }
            Some(ReplyEvent::Ignored(reason)) => {
                trace!(?reason, "ignored handshake reply");
                true
            }
        }
    }

    /// Tell the listener this session is going away
    ///
    /// Fire-and-forget; nothing confirms delivery.
    pub fn send_disconnect(&self) {
        let transmit = self.state.lock("send_disconnect").disconnect();
        send_transmit(&self.socket, &self.pool, &transmit);
    }

    /// Receive the next datagram from the listener that is not a handshake frame
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (len, from) = match self.socket.recv_from(buf).await {
                Ok(x) => x,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            };
            if from != self.remote {
                trace!(%from, "ignoring datagram from unexpected peer");
                continue;
            }
            if !self.try_handle_handshake_reply(&buf[..len]) {
                return Ok(len);
            }
        }
    }

    /// Send a datagram to the listener
    pub async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send_to(datagram, self.remote).await
    }

    /// Disconnect and drop the session
    pub fn close(self) {
        self.send_disconnect();
    }

    /// The conv assigned by the listener
    ///
    /// Always `Some` for a session returned by [`Session::connect`].
    pub fn conv(&self) -> Option<u64> {
        self.state.lock("conv").conv()
    }

    /// Address of the listener
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Get the local `SocketAddr` the underlying socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Errors in the connect routine of a [`Session`]
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The listener did not answer within the connect timeout
    #[error("timed out")]
    TimedOut,
    /// The socket failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
