use std::io;

use proto::Transmit;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::pool::BufferPool;

/// Encode `transmit` into a pooled buffer and send it without waiting
///
/// Handshake frames are fire-and-forget; peers retry, so a failed send is only logged.
pub(crate) fn send_transmit(socket: &UdpSocket, pool: &BufferPool, transmit: &Transmit) {
    let mut buf = pool.acquire();
    transmit.frame.encode(&mut *buf);
    match socket.try_send_to(&buf, transmit.destination) {
        Ok(_) => {
            trace!(
                destination = %transmit.destination,
                code = ?transmit.frame.code,
                conv = transmit.frame.conv,
                "sent handshake frame"
            );
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!(destination = %transmit.destination, "socket busy, dropping handshake frame");
        }
        Err(e) => {
            warn!(destination = %transmit.destination, "failed to send handshake frame: {}", e);
        }
    }
}
