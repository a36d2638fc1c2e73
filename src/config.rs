//! # Global pipeline configuration.
//!
//! [`Config`] defines the manager's tunables: per-handler channel
//! capacity, event bus capacity, and the producer's reservation backoff.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use seqpipe::Config;
//!
//! let mut cfg = Config::default();
//! cfg.channel_capacity = 128;
//! cfg.reserve_backoff = Duration::from_micros(100);
//!
//! assert_eq!(cfg.channel_capacity, 128);
//! ```

use std::time::Duration;

/// Global configuration for the pipeline manager.
///
/// Controls channel buffering between stages, event bus capacity, and how
/// long the producer sleeps between slot-reservation probes.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of each per-handler inbound/outbound channel.
    ///
    /// Bounds how many identifiers may be in flight between two stages.
    pub channel_capacity: usize,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Sleep between slot-reservation probes when the ring is full.
    pub reserve_backoff: Duration,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `channel_capacity = 256`
    /// - `bus_capacity = 1024`
    /// - `reserve_backoff = 50µs`
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            bus_capacity: 1024,
            reserve_backoff: Duration::from_micros(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.channel_capacity, 256);
        assert_eq!(cfg.bus_capacity, 1024);
        assert_eq!(cfg.reserve_backoff, Duration::from_micros(50));
    }
}
