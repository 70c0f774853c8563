//! Conv handshake for KCP sessions over a shared UDP socket
//!
//! A KCP listener multiplexes every session over one socket, telling them apart by a 64-bit
//! *conv*. Before a session may carry data, the client asks the listener for a conv with a
//! fixed-size connect frame and installs whatever the listener answers with. This crate runs that
//! exchange on tokio sockets; the protocol logic itself lives in kcp-handshake-proto, which
//! performs no I/O.
//!
//! The entry points of this crate are the [`Listener`], for the accepting side, and
//! [`Session::connect`], for the initiating side. Neither implements reliable delivery: datagrams
//! that are not handshake frames are returned to the caller, and established sessions are
//! registered with the listener through [`Listener::register_session`] by whatever engine the
//! caller runs on top.
//!
//! Handshake frames are never retransmitted by the listener. A client whose connect or response
//! was lost simply connects again, and the listener answers repeated connects from the same
//! address with the same conv until that conv's session is established.
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

mod listener;
mod mutex;
mod pool;
mod session;
mod udp;

pub use proto::{
    Code, ConfigError, ConvGenerator, DropReason, Enet, HandshakeFrame, InitiatorConfig,
    ListenerConfig, MalformedFrame, RandomConvGenerator, HANDSHAKE_SIZE, NUM_CONNECT_RESPONSE,
    NUM_DISCONNECT,
};

pub use crate::listener::{Listener, SessionHandle};
pub use crate::pool::{BufferPool, PooledBuf};
pub use crate::session::{ConnectError, Session, SessionConfig};
