//! Link timing and size configuration, with spec-matching defaults.

use std::time::Duration;

/// Tunable timing knobs for the telemetry monitor and codec limits. The
/// `Default` impl matches the reference implementation's constants.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Stats tick interval while not yet connected.
    pub stats_connect_period: Duration,
    /// Stats tick interval once connected.
    pub stats_update_period: Duration,
    /// How long without an inbound object before the watchdog trips.
    pub connection_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            stats_connect_period: Duration::from_millis(1000),
            stats_update_period: Duration::from_millis(4000),
            connection_timeout: Duration::from_millis(8000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_intervals() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.stats_connect_period, Duration::from_millis(1000));
        assert_eq!(cfg.stats_update_period, Duration::from_millis(4000));
        assert_eq!(cfg.connection_timeout, Duration::from_millis(8000));
    }
}
