use serde::{Deserialize, Serialize};

/// Link-level byte/object/error counters, reset atomically on every
/// telemetry monitor tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComStats {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_object_bytes: u64,
    pub rx_object_bytes: u64,
    pub tx_objects: u32,
    pub rx_objects: u32,
    pub tx_errors: u32,
    pub rx_errors: u32,
    pub tx_retries: u32,
}

impl ComStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the current counters and zeroes them in place.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}
