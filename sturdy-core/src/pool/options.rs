use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for [`Pool`][super::Pool].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub(crate) min_size: u32,
    pub(crate) max_size: u32,
    pub(crate) acquire_timeout: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) validation_on_acquire: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            min_size: 0,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            validation_on_acquire: true,
        }
    }
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections opened eagerly when the pool is created.
    pub fn min_size(mut self, min: u32) -> Self {
        self.min_size = min;
        self
    }

    /// Hard cap on live connections.
    pub fn max_size(mut self, max: u32) -> Self {
        self.max_size = max;
        self
    }

    /// Longest wait in [`Pool::acquire`][super::Pool::acquire] before
    /// [`PoolTimeout`][crate::error::Error::PoolTimeout].
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Idle connections older than this are closed instead of being reused.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Whether a liveness check precedes every handoff of a reused connection.
    pub fn validation_on_acquire(mut self, validate: bool) -> Self {
        self.validation_on_acquire = validate;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::config("pool max_size must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(Error::config(format!(
                "pool min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}
