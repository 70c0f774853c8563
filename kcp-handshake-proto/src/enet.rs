use std::fmt;

/// Auxiliary reason or key code carried in the `enet` field of a handshake frame
///
/// On a connect this carries the client's capability key; on a disconnect it says why the session
/// went away. Values outside the known set are kept as-is.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Enet(pub u32);

macro_rules! enets {
    {$($name:ident($val:expr) $desc:expr;)*} => {
        impl Enet {
            $(#[doc = $desc] pub const $name: Self = Self($val);)*
        }

        impl fmt::Debug for Enet {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    x => write!(f, "Enet({x})"),
                }
            }
        }

        impl fmt::Display for Enet {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let x = match self.0 {
                    $($val => $desc,)*
                    _ => "unknown reason",
                };
                f.write_str(x)
            }
        }
    }
}

enets! {
    TIMEOUT(0) "the session timed out";
    CLIENT_CLOSE(1) "the client closed the session";
    CLIENT_REBIND_FAIL(2) "the client failed to rebind its socket";
    CLIENT_SHUTDOWN(3) "the client is shutting down";
    SERVER_RELOGIN(4) "the account logged in again elsewhere";
    SERVER_KICK(5) "the session was closed by its peer";
    SERVER_SHUTDOWN(6) "the server is shutting down";
    NOT_FOUND_SESSION(7) "no session exists for the conv";
    LOGIN_UNFINISHED(8) "the login did not complete";
    PACKET_FREQ_TOO_HIGH(9) "the peer sent packets too frequently";
    PING_TIMEOUT(10) "the peer stopped answering pings";
    TRANSFER_FAILED(11) "a transfer failed";
    SERVER_KILL_CLIENT(12) "the server killed the client";
    CHECK_MOVE_SPEED(13) "the client failed a movement speed check";
    ACCOUNT_PASSWORD_CHANGE(14) "the account password changed";
    CLIENT_EDITOR_CONNECT_KEY(987654321) "connect key of an editor client";
    CLIENT_CONNECT_KEY(1234567890) "connect key of a regular client";
}

impl From<Enet> for u32 {
    fn from(x: Enet) -> Self {
        x.0
    }
}

impl From<u32> for Enet {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(format!("{:?}", Enet(5)), "SERVER_KICK");
        assert_eq!(format!("{:?}", Enet(77)), "Enet(77)");
        assert_eq!(
            Enet::CLIENT_CONNECT_KEY.to_string(),
            "connect key of a regular client"
        );
        assert_eq!(Enet(77).to_string(), "unknown reason");
    }
}
