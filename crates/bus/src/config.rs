//! Bus configuration loaded from environment variables.

/// Default number of saga hops a chain of events and commands may take.
pub const DEFAULT_SAGA_HOP_LIMIT: usize = 32;

/// Runtime configuration for the dispatchers.
///
/// Reads from environment variables:
/// - `BUS_SAGA_HOP_LIMIT` — maximum saga hops per causal chain (default: `32`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub saga_hop_limit: usize,
}

impl BusConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            saga_hop_limit: lookup("BUS_SAGA_HOP_LIMIT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_SAGA_HOP_LIMIT),
        }
    }

    /// Returns a copy with a different hop limit.
    pub fn with_saga_hop_limit(mut self, limit: usize) -> Self {
        self.saga_hop_limit = limit;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            saga_hop_limit: DEFAULT_SAGA_HOP_LIMIT,
        }
    }
}
