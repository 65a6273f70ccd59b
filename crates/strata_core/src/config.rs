//! Engine configuration.

/// Tunables applied when opening a [`Store`](crate::Store).
///
/// # Example
///
/// ```
/// use strata_core::Config;
///
/// let config = Config::new().default_find_limit(50).reap_batch_limit(1000);
/// assert_eq!(config.default_find_limit, 50);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Result cap applied when a query sets no explicit limit.
    pub default_find_limit: usize,
    /// Maximum number of expiration entries processed per model in one
    /// reap run. Leftovers are picked up by the next run.
    pub reap_batch_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_find_limit: 100, // matches the documented query default
            reap_batch_limit: 256,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result cap used when a query has no explicit limit.
    #[must_use]
    pub const fn default_find_limit(mut self, limit: usize) -> Self {
        self.default_find_limit = limit;
        self
    }

    /// Sets the per-model cap on expiration entries per reap run.
    #[must_use]
    pub const fn reap_batch_limit(mut self, limit: usize) -> Self {
        self.reap_batch_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.default_find_limit, 100);
        assert_eq!(config.reap_batch_limit, 256);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().default_find_limit(10).reap_batch_limit(64);
        assert_eq!(config.default_find_limit, 10);
        assert_eq!(config.reap_batch_limit, 64);
    }
}
