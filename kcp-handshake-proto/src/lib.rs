//! Low-level protocol logic for the KCP conv handshake
//!
//! KCP multiplexes many sessions over one UDP socket, tagging every datagram with a 64-bit
//! connection identifier, the *conv*. Unlike TCP there is no session-birth protocol built into the
//! transport, so both peers agree on a conv through a tiny request/response exchange of fixed-size
//! 20 byte frames before the reliable-delivery engine accepts data for it.
//!
//! kcp-handshake-proto contains a fully deterministic implementation of that exchange. It contains
//! no networking code and does not get any relevant timestamps from the operating system. Most
//! users may want to use the tokio-based kcp-handshake API instead.
//!
//! The most important types are [`Listener`], which holds the server-side state for a single
//! socket (the bounded cache of half-open attempts and the conv generator), and [`Initiator`],
//! which holds the handshake state for one outgoing session. Both consume raw datagrams and emit
//! [`Transmit`]s for the caller to put on the wire.

#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

use std::net::SocketAddr;

mod config;
pub use crate::config::{ConfigError, InitiatorConfig, ListenerConfig};

mod conv;
pub use crate::conv::{AllocationExhausted, ConvGenerator, RandomConvGenerator};

mod enet;
pub use crate::enet::Enet;

mod frame;
pub use crate::frame::{
    Code, HandshakeFrame, MalformedFrame, HANDSHAKE_SIZE, NUM_CONNECT_RESPONSE, NUM_DISCONNECT,
};

mod initiator;
pub use crate::initiator::{Initiator, ReplyEvent};

mod listener;
pub use crate::listener::{DatagramEvent, DropReason, Listener, SessionRegistry};

mod waiter;
pub use crate::waiter::{Waiter, WaiterCache};


/// The conv value of a frame whose identifier has not been assigned yet
///
/// Never handed out by a [`Listener`].
pub const UNASSIGNED_CONV: u64 = 0;

/// An outgoing handshake frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmit {
    /// The socket this frame should be sent to
    pub destination: SocketAddr,
    /// The frame to encode
    pub frame: HandshakeFrame,
}
