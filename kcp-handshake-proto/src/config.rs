use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    conv::{ConvGenerator, RandomConvGenerator},
    Enet,
};

/// Parameters governing a [`Listener`](crate::Listener)
///
/// The defaults bound the listener to 20 half-open attempts, evicted oldest-first, and never expire
/// them by age.
#[derive(Clone)]
pub struct ListenerConfig {
    pub(crate) max_waiters: usize,
    pub(crate) max_conv_attempts: u32,
    pub(crate) waiter_timeout: Option<Duration>,
    /// Create a conv generator for the listener, `None` for [`RandomConvGenerator`]
    pub(crate) conv_generator_factory:
        Option<Arc<dyn Fn() -> Box<dyn ConvGenerator> + Send + Sync>>,
    /// Optional seed for the default conv generator
    pub(crate) rng_seed: Option<[u8; 32]>,
}

impl ListenerConfig {
    /// Maximum number of connection attempts that have a conv but no session yet
    ///
    /// When a connect from a new address arrives while this many are pending, the oldest pending
    /// attempt is forgotten. Must be nonzero. Defaults to 20.
    pub fn max_waiters(&mut self, value: usize) -> Result<&mut Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::OutOfBounds);
        }
        self.max_waiters = value;
        Ok(self)
    }

    /// How many random candidates to draw before giving up on a connect
    ///
    /// A connect that exhausts its attempts is dropped without a response; the peer's next retry
    /// tries again. Must be nonzero. Defaults to 1000.
    pub fn max_conv_attempts(&mut self, value: u32) -> Result<&mut Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::OutOfBounds);
        }
        self.max_conv_attempts = value;
        Ok(self)
    }

    /// Forget pending attempts older than this
    ///
    /// `None` bounds pending attempts by count alone. Defaults to `None`.
    pub fn waiter_timeout(&mut self, value: Option<Duration>) -> Result<&mut Self, ConfigError> {
        if value == Some(Duration::ZERO) {
            return Err(ConfigError::OutOfBounds);
        }
        self.waiter_timeout = value;
        Ok(self)
    }

    /// Supply a custom conv generator factory
    ///
    /// Called once by each `Listener` constructed from this configuration. Defaults to
    /// [`RandomConvGenerator`].
    pub fn conv_generator<F: Fn() -> Box<dyn ConvGenerator> + Send + Sync + 'static>(
        &mut self,
        factory: F,
    ) -> &mut Self {
        self.conv_generator_factory = Some(Arc::new(factory));
        self
    }

    /// Seed for the default conv generator
    ///
    /// Ignored when a custom generator is supplied through [`Self::conv_generator`]. Useful for
    /// reproducible tests; defaults to `None`, which seeds from the operating system.
    pub fn rng_seed(&mut self, seed: Option<[u8; 32]>) -> &mut Self {
        self.rng_seed = seed;
        self
    }

    pub(crate) fn new_generator(&self) -> Box<dyn ConvGenerator> {
        match (&self.conv_generator_factory, self.rng_seed) {
            (Some(factory), _) => factory(),
            (None, Some(seed)) => Box::new(RandomConvGenerator::from_seed(seed)),
            (None, None) => Box::<RandomConvGenerator>::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_waiters: 20,
            max_conv_attempts: 1000,
            waiter_timeout: None,
            conv_generator_factory: None,
            rng_seed: None,
        }
    }
}

impl fmt::Debug for ListenerConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ListenerConfig")
            .field("max_waiters", &self.max_waiters)
            .field("max_conv_attempts", &self.max_conv_attempts)
            .field("waiter_timeout", &self.waiter_timeout)
            .field("custom_conv_generator", &self.conv_generator_factory.is_some())
            .field("rng_seed", &self.rng_seed.is_some())
            .finish_non_exhaustive()
    }
}

/// Parameters governing an [`Initiator`](crate::Initiator)
#[derive(Debug, Clone, Copy)]
pub struct InitiatorConfig {
    pub(crate) connect_key: Enet,
    pub(crate) disconnect_reason: Enet,
}

impl InitiatorConfig {
    /// Capability key sent in the `enet` field of a connect
    ///
    /// Defaults to [`Enet::CLIENT_CONNECT_KEY`].
    pub fn connect_key(&mut self, value: Enet) -> &mut Self {
        self.connect_key = value;
        self
    }

    /// Reason sent in the `enet` field of a disconnect
    ///
    /// Defaults to [`Enet::SERVER_KICK`].
    pub fn disconnect_reason(&mut self, value: Enet) -> &mut Self {
        self.disconnect_reason = value;
        self
    }
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            connect_key: Enet::CLIENT_CONNECT_KEY,
            disconnect_reason: Enet::SERVER_KICK,
        }
    }
}

/// Errors in the configuration of a listener or session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Value exceeds supported bounds
    #[error("value exceeds supported bounds")]
    OutOfBounds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero() {
        let mut config = ListenerConfig::default();
        assert_eq!(config.max_waiters(0).err(), Some(ConfigError::OutOfBounds));
        assert_eq!(config.max_conv_attempts(0).err(), Some(ConfigError::OutOfBounds));
        assert_eq!(
            config.waiter_timeout(Some(Duration::ZERO)).err(),
            Some(ConfigError::OutOfBounds)
        );
        assert_eq!(config.max_waiters, 20);
        assert_eq!(config.max_conv_attempts, 1000);
        assert_eq!(config.waiter_timeout, None);
    }
}
