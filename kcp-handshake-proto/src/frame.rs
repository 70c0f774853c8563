use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Size of every handshake frame on the wire
///
/// Datagrams of any other length are never treated as handshake traffic.
pub const HANDSHAKE_SIZE: usize = 20;

/// `num` carried by a [`Code::CONNECT_RESPONSE`] frame
pub const NUM_CONNECT_RESPONSE: u32 = 0x1451_4545;

/// `num` carried by a [`Code::DISCONNECT`] frame
pub const NUM_DISCONNECT: u32 = 0x1941_9494;

/// Discriminant of a handshake frame
///
/// Decoding preserves values outside the known set so that handlers can decide what to do with
/// them.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Code(pub u32);

macro_rules! codes {
    {$($name:ident($val:expr) $desc:expr;)*} => {
        impl Code {
            $(#[doc = $desc] pub const $name: Self = Self($val);)*
        }

        impl fmt::Debug for Code {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    x => write!(f, "Code({x})"),
                }
            }
        }
    }
}

codes! {
    CONNECT(255) "a request for a fresh conv";
    CONNECT_RESPONSE(325) "the listener's answer to a connect, carrying the assigned conv";
    DISCONNECT(404) "a best-effort notification that the sender has torn its session down";
}

impl From<Code> for u32 {
    fn from(x: Code) -> Self {
        x.0
    }
}

/// The fixed-size control message exchanged while a session is established or torn down
///
/// Layout, all fields little-endian: `code` at `[0, 4)`, `conv` at `[4, 12)`, `enet` at
/// `[12, 16)`, `num` at `[16, 20)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HandshakeFrame {
    /// What kind of frame this is
    pub code: Code,
    /// Connection identifier, zero until assigned by the listener
    pub conv: u64,
    /// Auxiliary reason or key code (see [`Enet`](crate::Enet))
    pub enet: u32,
    /// Verification constant specific to the frame's role
    pub num: u32,
}

impl HandshakeFrame {
    /// Decode a frame from a datagram of exactly [`HANDSHAKE_SIZE`] bytes
    ///
    /// Performs no semantic validation of the fields.
    pub fn decode(mut buf: &[u8]) -> Result<Self, MalformedFrame> {
        if buf.len() != HANDSHAKE_SIZE {
            return Err(MalformedFrame { len: buf.len() });
        }
        Ok(Self {
            code: Code(buf.get_u32_le()),
            conv: buf.get_u64_le(),
            enet: buf.get_u32_le(),
            num: buf.get_u32_le(),
        })
    }

    /// Append the encoded frame to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.code.0);
        buf.put_u64_le(self.conv);
        buf.put_u32_le(self.enet);
        buf.put_u32_le(self.num);
    }

    /// Encode into a fresh fixed-size array
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut bytes = [0; HANDSHAKE_SIZE];
        self.encode(&mut &mut bytes[..]);
        bytes
    }
}

/// A datagram could not be decoded as a handshake frame
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("malformed handshake frame: expected {HANDSHAKE_SIZE} bytes, got {len}")]
pub struct MalformedFrame {
    /// Length of the rejected buffer
    pub len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_strategy::proptest;

    #[test]
    fn layout() {
        let frame = HandshakeFrame {
            code: Code::CONNECT_RESPONSE,
            conv: 0x0102_0304_0506_0708,
            enet: 1234567890,
            num: NUM_CONNECT_RESPONSE,
        };
        let bytes = frame.to_bytes();
        assert_eq!(bytes[..4], 325u32.to_le_bytes());
        assert_eq!(bytes[4..12], [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(bytes[12..16], 1234567890u32.to_le_bytes());
        assert_eq!(bytes[16..], [0x45, 0x45, 0x51, 0x14]);
    }

    #[test]
    fn encode_appends() {
        let frame = HandshakeFrame {
            code: Code::DISCONNECT,
            conv: 7,
            enet: 5,
            num: NUM_DISCONNECT,
        };
        let mut buf = Vec::with_capacity(HANDSHAKE_SIZE);
        frame.encode(&mut buf);
        assert_eq!(buf.len(), HANDSHAKE_SIZE);
        assert_eq!(buf[..], frame.to_bytes()[..]);
    }

    #[test]
    fn unknown_code_survives_decode() {
        let frame = HandshakeFrame {
            code: Code(100),
            conv: 1000,
            enet: 10000,
            num: 100000,
        };
        let decoded = HandshakeFrame::decode(&frame.to_bytes()).unwrap();
        assert_eq!(decoded.code, Code(100));
        assert_eq!(format!("{:?}", decoded.code), "Code(100)");
        assert_eq!(format!("{:?}", Code::CONNECT), "CONNECT");
    }

    #[test]
    fn rejects_wrong_length() {
        for len in [0, 1, HANDSHAKE_SIZE - 1, HANDSHAKE_SIZE + 1, 1400] {
            let buf = vec![0; len];
            assert_eq!(HandshakeFrame::decode(&buf), Err(MalformedFrame { len }));
        }
    }

    #[proptest]
    fn round_trip(code: u32, conv: u64, enet: u32, num: u32) {
        let frame = HandshakeFrame {
            code: Code(code),
            conv,
            enet,
            num,
        };
        assert_eq!(HandshakeFrame::decode(&frame.to_bytes()), Ok(frame));
    }
}
