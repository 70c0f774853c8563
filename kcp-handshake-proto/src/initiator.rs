use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::{
    config::InitiatorConfig,
    frame::{Code, HandshakeFrame, NUM_CONNECT_RESPONSE, NUM_DISCONNECT},
    listener::DropReason,
    Transmit, UNASSIGNED_CONV,
};

/// Client-side handshake state for one session
///
/// Emits connect and disconnect frames and recognizes the listener's response. Retrying a
/// connect that got no answer is up to the caller; every call to [`Initiator::connect`] yields a
/// fresh frame.
#[derive(Debug)]
pub struct Initiator {
    config: InitiatorConfig,
    remote: SocketAddr,
    conv: Option<u64>,
}

impl Initiator {
    /// Start a handshake with the listener at `remote`
    pub fn new(remote: SocketAddr, config: InitiatorConfig) -> Self {
        Self {
            config,
            remote,
            conv: None,
        }
    }

    /// Frame requesting a conv from the listener
    pub fn connect(&self) -> Transmit {
        Transmit {
            destination: self.remote,
            frame: HandshakeFrame {
                code: Code::CONNECT,
                conv: UNASSIGNED_CONV,
                enet: self.config.connect_key.0,
                num: 0,
            },
        }
    }

    /// Process a datagram received from the listener
    ///
    /// Returns `None` if `data` is not the size of a handshake frame. A verified response installs
    /// its conv, replacing any installed earlier.
    pub fn handle(&mut self, data: &[u8]) -> Option<ReplyEvent> {
        let Ok(frame) = HandshakeFrame::decode(data) else {
            return None;
        };
        trace!(remote = %self.remote, code = ?frame.code, conv = frame.conv, "handshake reply");

        if frame.code != Code::CONNECT_RESPONSE {
            return Some(ReplyEvent::Ignored(DropReason::UnknownCode(frame.code)));
        }
        if frame.num != NUM_CONNECT_RESPONSE {
            debug!(remote = %self.remote, num = frame.num, "ignoring unverified connect response");
            return Some(ReplyEvent::Ignored(DropReason::VerificationMismatch));
        }

        if self.conv.replace(frame.conv) != Some(frame.conv) {
            debug!(remote = %self.remote, conv = frame.conv, "installed conv");
        }
        Some(ReplyEvent::Installed { conv: frame.conv })
    }

    /// Frame telling the listener this session is going away
    ///
    /// Carries the installed conv, or zero if none was installed.
    pub fn disconnect(&self) -> Transmit {
        Transmit {
            destination: self.remote,
            frame: HandshakeFrame {
                code: Code::DISCONNECT,
                conv: self.conv.unwrap_or(UNASSIGNED_CONV),
                enet: self.config.disconnect_reason.0,
                num: NUM_DISCONNECT,
            },
        }
    }

    /// The conv assigned by the listener, once a response has been accepted
    pub fn conv(&self) -> Option<u64> {
        self.conv
    }

    /// Address of the listener
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

/// What became of a handshake frame passed to [`Initiator::handle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEvent {
    /// The listener assigned `conv` to this session
    Installed {
        /// The conv now used by the session
        conv: u64,
    },
    /// The frame was not a valid response and had no effect
    Ignored(DropReason),
}
