//! Database configuration.

use crate::clock::{Clock, SystemClock};
use std::sync::Arc;

/// Default bound on nested reference resolution.
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 8;

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// How many levels of references a read resolves. References nested
    /// deeper stay bare ids; this also stops cyclic record types.
    pub max_reference_depth: usize,

    /// Time source for metadata timestamps and `current_date_time`.
    pub clock: Arc<dyn Clock>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
            clock: Arc::new(SystemClock),
        }
    }
}

impl DatabaseConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reference resolution depth.
    #[must_use]
    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{epoch, ManualClock};

    #[test]
    fn defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_reference_depth, DEFAULT_MAX_REFERENCE_DEPTH);
    }

    #[test]
    fn builder() {
        let config = DatabaseConfig::new()
            .with_max_reference_depth(2)
            .with_clock(Arc::new(ManualClock::new(epoch())));
        assert_eq!(config.max_reference_depth, 2);
        assert_eq!(config.clock.now(), epoch());
    }
}
