use std::{net::SocketAddr, sync::Arc, time::Instant};

use tracing::{debug, trace};

use crate::{
    config::ListenerConfig,
    conv::{reserve_conv, ConvGenerator},
    frame::{Code, HandshakeFrame, NUM_CONNECT_RESPONSE, NUM_DISCONNECT},
    waiter::{Waiter, WaiterCache},
    Transmit,
};

/// The listener's view of the sessions that are already established
///
/// Owned by the reliable-delivery engine; the listener only asks whether a conv is taken and asks
/// for a session to be closed when its peer says goodbye.
pub trait SessionRegistry {
    /// Whether a live session is registered under `conv`
    fn contains(&self, conv: u64) -> bool;
    /// Close the live session registered under `conv`, returning whether there was one
    fn close(&mut self, conv: u64) -> bool;
}

/// Server-side handshake state for a single socket
///
/// This object performs no I/O whatsoever. Incoming datagrams are fed to [`Listener::handle`],
/// which reports what became of them. Callers sharing a `Listener` between threads must hold one
/// lock across each `handle` call together with the [`SessionRegistry`] they pass in.
pub struct Listener {
    config: Arc<ListenerConfig>,
    waiters: WaiterCache,
    generator: Box<dyn ConvGenerator>,
}

impl Listener {
    /// Create a new listener
    pub fn new(config: Arc<ListenerConfig>) -> Self {
        Self {
            waiters: WaiterCache::new(config.max_waiters),
            generator: config.new_generator(),
            config,
        }
    }

    /// Process an incoming datagram
    ///
    /// Returns `None` if `data` is not the size of a handshake frame, in which case it belongs to
    /// the reliable-delivery engine.
    pub fn handle(
        &mut self,
        now: Instant,
        remote: SocketAddr,
        data: &[u8],
        sessions: &mut dyn SessionRegistry,
    ) -> Option<DatagramEvent> {
        let Ok(frame) = HandshakeFrame::decode(data) else {
            return None;
        };
        trace!(%remote, code = ?frame.code, conv = frame.conv, "handshake frame");

        Some(match frame.code {
            Code::CONNECT => self.handle_connect(now, remote, frame, sessions),
            Code::DISCONNECT => Self::handle_disconnect(remote, frame, sessions),
            code => {
                debug!(%remote, ?code, "ignoring handshake frame with unknown code");
                DatagramEvent::Dropped(DropReason::UnknownCode(code))
            }
        })
    }

    fn handle_connect(
        &mut self,
        now: Instant,
        remote: SocketAddr,
        mut frame: HandshakeFrame,
        sessions: &dyn SessionRegistry,
    ) -> DatagramEvent {
        if let Some(timeout) = self.config.waiter_timeout {
            let expired = self.waiters.expire(now, timeout);
            if expired > 0 {
                trace!(expired, "expired waiters");
            }
        }

        let conv = match reserve_conv(
            now,
            remote,
            &mut self.waiters,
            sessions,
            &mut *self.generator,
            self.config.max_conv_attempts,
        ) {
            Ok(conv) => conv,
            Err(e) => {
                debug!(%remote, "dropping connect: {}", e);
                return DatagramEvent::Dropped(DropReason::AllocationExhausted);
            }
        };

        frame.code = Code::CONNECT_RESPONSE;
        frame.conv = conv;
        frame.num = NUM_CONNECT_RESPONSE;
        DatagramEvent::Respond(Transmit {
            destination: remote,
            frame,
        })
    }

    fn handle_disconnect(
        remote: SocketAddr,
        frame: HandshakeFrame,
        sessions: &mut dyn SessionRegistry,
    ) -> DatagramEvent {
        if frame.num != NUM_DISCONNECT {
            debug!(%remote, num = frame.num, "ignoring unverified disconnect");
            return DatagramEvent::Dropped(DropReason::VerificationMismatch);
        }
        let conv = frame.conv;
        if !sessions.close(conv) {
            trace!(%remote, conv, "disconnect for unknown session");
            return DatagramEvent::Dropped(DropReason::UnknownSession { conv });
        }
        debug!(%remote, conv, "closed session on peer disconnect");
        DatagramEvent::Closed { conv }
    }

    /// Note that the session for `conv` has been established
    ///
    /// Releases the pending attempt holding `conv`, if any. Must be called once the session is
    /// visible through the [`SessionRegistry`], so that the conv stays reserved throughout.
    pub fn session_established(&mut self, conv: u64) -> Option<Waiter> {
        self.waiters.remove_by_conv(conv)
    }

    /// The pending attempt holding `conv`, if any
    pub fn pending(&self, conv: u64) -> Option<&Waiter> {
        self.waiters.find_by_conv(conv)
    }

    /// The pending attempt from `remote`, if any
    pub fn pending_from(&self, remote: SocketAddr) -> Option<&Waiter> {
        self.waiters.find_by_address(remote)
    }

    /// Number of attempts that have a conv but no session yet
    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }

    /// The configuration this listener was created with
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }
}

/// What became of a handshake frame passed to [`Listener::handle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramEvent {
    /// A response must be sent
    Respond(Transmit),
    /// The peer disconnected and the session for `conv` was closed
    Closed {
        /// The conv of the closed session
        conv: u64,
    },
    /// The frame was consumed without any effect
    Dropped(DropReason),
}

/// Why a handshake frame had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No free conv could be found for a connect
    AllocationExhausted,
    /// The frame's `num` does not match the constant for its code
    VerificationMismatch,
    /// A disconnect named a conv with no live session
    UnknownSession {
        /// The conv named by the frame
        conv: u64,
    },
    /// The frame's code is not one this side handles
    UnknownCode(Code),
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        collections::HashMap,
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    use crate::{Enet, HANDSHAKE_SIZE, UNASSIGNED_CONV};

    #[derive(Default)]
    struct Sessions {
        // conv -> number of times closed
        live: HashMap<u64, usize>,
    }

    impl SessionRegistry for Sessions {
        fn contains(&self, conv: u64) -> bool {
            self.live.contains_key(&conv)
        }

        fn close(&mut self, conv: u64) -> bool {
            match self.live.get_mut(&conv) {
                Some(closes) => {
                    *closes += 1;
                    true
                }
                None => false,
            }
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn connect() -> [u8; HANDSHAKE_SIZE] {
        HandshakeFrame {
            code: Code::CONNECT,
            conv: UNASSIGNED_CONV,
            enet: Enet::CLIENT_CONNECT_KEY.0,
            num: 0,
        }
        .to_bytes()
    }

    fn disconnect(conv: u64, num: u32) -> [u8; HANDSHAKE_SIZE] {
        HandshakeFrame {
            code: Code::DISCONNECT,
            conv,
            enet: Enet::SERVER_KICK.0,
            num,
        }
        .to_bytes()
    }

    fn listener() -> Listener {
        let mut config = ListenerConfig::default();
        config.rng_seed(Some([9; 32]));
        Listener::new(Arc::new(config))
    }

    fn respond(event: Option<DatagramEvent>) -> Transmit {
        match event {
            Some(DatagramEvent::Respond(t)) => t,
            x => panic!("expected a response, got {x:?}"),
        }
    }

    #[test]
    fn only_claims_handshake_size() {
        let mut listener = listener();
        let mut sessions = Sessions::default();
        let now = Instant::now();
        assert_eq!(listener.handle(now, addr(1), &[0; 24], &mut sessions), None);
        assert_eq!(listener.handle(now, addr(1), &[], &mut sessions), None);
        assert_eq!(listener.pending_count(), 0);
    }

    #[test]
    fn connect_response() {
        let mut listener = listener();
        let mut sessions = Sessions::default();
        let now = Instant::now();
        let t = respond(listener.handle(now, addr(1), &connect(), &mut sessions));
        assert_eq!(t.destination, addr(1));
        assert_eq!(t.frame.code, Code::CONNECT_RESPONSE);
        assert_eq!(t.frame.num, NUM_CONNECT_RESPONSE);
        assert_eq!(t.frame.enet, Enet::CLIENT_CONNECT_KEY.0);
        assert_ne!(t.frame.conv, UNASSIGNED_CONV);
        assert_eq!(listener.pending(t.frame.conv).map(|w| w.remote), Some(addr(1)));

        // A retransmitted connect yields the same conv without a second waiter
        let again = respond(listener.handle(now, addr(1), &connect(), &mut sessions));
        assert_eq!(again.frame.conv, t.frame.conv);
        assert_eq!(listener.pending_count(), 1);

        let other = respond(listener.handle(now, addr(2), &connect(), &mut sessions));
        assert_ne!(other.frame.conv, t.frame.conv);
        assert_eq!(listener.pending_count(), 2);
    }

    #[test]
    fn established_session_releases_waiter() {
        let mut listener = listener();
        let mut sessions = Sessions::default();
        let now = Instant::now();
        let conv = respond(listener.handle(now, addr(1), &connect(), &mut sessions))
            .frame
            .conv;
        sessions.live.insert(conv, 0);
        assert_eq!(listener.session_established(conv).map(|w| w.remote), Some(addr(1)));
        assert_eq!(listener.pending_count(), 0);

        // A later connect from the same address is a new attempt
        let next = respond(listener.handle(now, addr(1), &connect(), &mut sessions));
        assert_ne!(next.frame.conv, conv);
    }

    #[test]
    fn disconnect_gating() {
        let mut listener = listener();
        let mut sessions = Sessions::default();
        sessions.live.insert(77, 0);
        let now = Instant::now();

        assert_eq!(
            listener.handle(now, addr(1), &disconnect(77, 0x1234), &mut sessions),
            Some(DatagramEvent::Dropped(DropReason::VerificationMismatch))
        );
        assert_eq!(sessions.live[&77], 0);

        assert_eq!(
            listener.handle(now, addr(1), &disconnect(77, NUM_DISCONNECT), &mut sessions),
            Some(DatagramEvent::Closed { conv: 77 })
        );
        assert_eq!(sessions.live[&77], 1);

        assert_eq!(
            listener.handle(now, addr(1), &disconnect(78, NUM_DISCONNECT), &mut sessions),
            Some(DatagramEvent::Dropped(DropReason::UnknownSession { conv: 78 }))
        );
    }

    #[test]
    fn unknown_code() {
        let mut listener = listener();
        let mut sessions = Sessions::default();
        let frame = HandshakeFrame {
            code: Code::CONNECT_RESPONSE,
            conv: 5,
            enet: 0,
            num: NUM_CONNECT_RESPONSE,
        };
        assert_eq!(
            listener.handle(Instant::now(), addr(1), &frame.to_bytes(), &mut sessions),
            Some(DatagramEvent::Dropped(DropReason::UnknownCode(
                Code::CONNECT_RESPONSE
            )))
        );
        assert_eq!(listener.pending_count(), 0);
    }

    #[test]
    fn exhausted_connect_is_dropped() {
        struct Stuck;
        impl ConvGenerator for Stuck {
            fn generate_conv(&mut self) -> u64 {
                3
            }
        }

        let mut config = ListenerConfig::default();
        config.conv_generator(|| Box::new(Stuck));
        config.max_conv_attempts(16).unwrap();
        let mut listener = Listener::new(Arc::new(config));
        let mut sessions = Sessions::default();
        let now = Instant::now();

        let first = respond(listener.handle(now, addr(1), &connect(), &mut sessions));
        assert_eq!(first.frame.conv, 3);
        assert_eq!(
            listener.handle(now, addr(2), &connect(), &mut sessions),
            Some(DatagramEvent::Dropped(DropReason::AllocationExhausted))
        );
        assert_eq!(listener.pending_count(), 1);
    }

    #[test]
    fn bounded_waiters() {
        let mut listener = listener();
        let mut sessions = Sessions::default();
        let now = Instant::now();
        let first = respond(listener.handle(now, addr(1000), &connect(), &mut sessions));
        for port in 1001..1021 {
            respond(listener.handle(now, addr(port), &connect(), &mut sessions));
        }
        assert_eq!(listener.pending_count(), listener.config().max_waiters);
        assert!(listener.pending(first.frame.conv).is_none());
        assert!(listener.pending_from(addr(1000)).is_none());
        assert!(listener.pending_from(addr(1001)).is_some());
    }

    #[test]
    fn waiter_timeout() {
        let mut config = ListenerConfig::default();
        config
            .rng_seed(Some([1; 32]))
            .waiter_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let mut listener = Listener::new(Arc::new(config));
        let mut sessions = Sessions::default();
        let start = Instant::now();

        let a = respond(listener.handle(start, addr(1), &connect(), &mut sessions));
        let b = respond(listener.handle(
            start + Duration::from_secs(5),
            addr(1),
            &connect(),
            &mut sessions,
        ));
        assert_eq!(a.frame.conv, b.frame.conv);

        let c = respond(listener.handle(
            start + Duration::from_secs(11),
            addr(1),
            &connect(),
            &mut sessions,
        ));
        assert_ne!(c.frame.conv, a.frame.conv);
        assert_eq!(listener.pending_count(), 1);
    }
}
