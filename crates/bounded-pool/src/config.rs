//! Pool configuration.

use std::time::Duration;

use tokio::sync::Semaphore;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Configuration for a resource pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Hard cap on the number of resources that may exist at once.
    pub max_size: usize,

    /// Resources created eagerly when the pool is built.
    pub initial_size: usize,

    /// Default wait applied by [`Pool::acquire`](crate::Pool::acquire).
    ///
    /// `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,

    /// Whether idle resources are validated before being handed out again.
    pub validate_on_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            initial_size: 0,
            acquire_timeout: Some(Duration::from_secs(30)),
            validate_on_acquire: true,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings string into a configuration.
    ///
    /// The format mirrors ADO.NET connection strings:
    /// ```text
    /// Max Size=20;Initial Size=2;Acquire Timeout=500;Validate On Acquire=false;
    /// ```
    ///
    /// `Acquire Timeout` is in milliseconds, or `infinite` to wait forever.
    pub fn from_settings<E>(settings: &str) -> Result<Self, PoolError<E>> {
        let mut config = Self::default();

        for part in settings.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| PoolError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "max size" | "max_size" | "max pool size" => {
                    config.max_size = value
                        .parse()
                        .map_err(|_| PoolError::Config(format!("invalid max size: {value}")))?;
                }
                "initial size" | "initial_size" | "min pool size" => {
                    config.initial_size = value.parse().map_err(|_| {
                        PoolError::Config(format!("invalid initial size: {value}"))
                    })?;
                }
                "acquire timeout" | "acquire_timeout" => {
                    config.acquire_timeout = if value.eq_ignore_ascii_case("infinite")
                        || value.eq_ignore_ascii_case("none")
                    {
                        None
                    } else {
                        let millis: u64 = value
                            .parse()
                            .map_err(|_| PoolError::Config(format!("invalid timeout: {value}")))?;
                        Some(Duration::from_millis(millis))
                    };
                }
                "validate on acquire" | "validate_on_acquire" => {
                    config.validate_on_acquire = value.eq_ignore_ascii_case("true")
                        || value.eq_ignore_ascii_case("yes")
                        || value == "1";
                }
                _ => {
                    // Ignore unknown options for forward compatibility
                    tracing::debug!(key = key, value = value, "ignoring unknown pool setting");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the number of resources created up front.
    #[must_use]
    pub fn initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Set the default acquire timeout. `None` waits indefinitely.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Enable or disable validation of idle resources on acquire.
    #[must_use]
    pub fn validate_on_acquire(mut self, enabled: bool) -> Self {
        self.validate_on_acquire = enabled;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate<E>(&self) -> Result<(), PoolError<E>> {
        if self.max_size == 0 {
            return Err(PoolError::Config("max_size must be at least 1".into()));
        }
        if self.max_size > Semaphore::MAX_PERMITS {
            return Err(PoolError::Config(format!(
                "max_size ({}) exceeds the supported maximum ({})",
                self.max_size,
                Semaphore::MAX_PERMITS
            )));
        }
        if self.initial_size > self.max_size {
            return Err(PoolError::Config(format!(
                "initial_size ({}) exceeds max_size ({})",
                self.initial_size, self.max_size
            )));
        }
        Ok(())
    }
}
