use std::{net::SocketAddr, time::Instant};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use thiserror::Error;
use tracing::trace;

use crate::{
    listener::SessionRegistry,
    waiter::{Waiter, WaiterCache},
    UNASSIGNED_CONV,
};

/// Generates candidate convs for incoming connections
pub trait ConvGenerator: Send {
    /// Generates a new candidate conv
    ///
    /// Candidates need not be unique; the listener discards any that collide with a conv in use.
    fn generate_conv(&mut self) -> u64;
}

/// Conv drawn uniformly from the full 64-bit range
#[derive(Debug)]
pub struct RandomConvGenerator {
    rng: StdRng,
}

impl RandomConvGenerator {
    /// Construct from an explicit seed, for reproducible conv sequences
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: StdRng::from_seed(seed),
        }
    }
}

impl Default for RandomConvGenerator {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl ConvGenerator for RandomConvGenerator {
    fn generate_conv(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

/// No free conv was found within the configured number of attempts
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no free conv found after {attempts} attempts")]
pub struct AllocationExhausted {
    /// How many candidates were drawn
    pub attempts: u32,
}

/// Find the conv reserved for `remote`, or reserve a fresh one
///
/// A conv is free if it is nonzero, not held by a waiter, and not registered to a live session.
/// Must be called with exclusive access to both `waiters` and `sessions` for the whole call.
pub(crate) fn reserve_conv(
    now: Instant,
    remote: SocketAddr,
    waiters: &mut WaiterCache,
    sessions: &dyn SessionRegistry,
    generator: &mut dyn ConvGenerator,
    max_attempts: u32,
) -> Result<u64, AllocationExhausted> {
    if let Some(w) = waiters.find_by_address(remote) {
        trace!(conv = w.conv, %remote, "reusing reserved conv");
        return Ok(w.conv);
    }

    for _ in 0..max_attempts {
        let conv = generator.generate_conv();
        if conv == UNASSIGNED_CONV
            || sessions.contains(conv)
            || waiters.find_by_conv(conv).is_some()
        {
            continue;
        }
        waiters.insert(Waiter {
            conv,
            remote,
            created: now,
        });
        trace!(conv, %remote, "reserved conv");
        return Ok(conv);
    }

    Err(AllocationExhausted {
        attempts: max_attempts,
    })
}
