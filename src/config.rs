//! Node configuration parameters.
//!
//! Timing and debounce values are fixed at setup time and never changed
//! by the core at runtime.  A stored copy can be loaded from NVS through
//! [`ConfigPort`](crate::app::ports::ConfigPort); the pin map lives in
//! [`pins`](crate::pins) and is fixed at build time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Capacity of the measurement report buffer in bytes.
///
/// Fixed at build time so the report can live in a stack buffer.
pub const REPORT_CAPACITY: usize = 768;

/// Maximum length of the server base URL.
pub const MAX_URL_LEN: usize = 96;

/// Which electrical level means "button pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveLevel {
    /// Switch to ground with pull-up (the default wiring).
    Low,
    /// Switch to VCC with pull-down.
    High,
}

/// Core node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Reporting ---
    /// Interval between measurement reports (milliseconds).
    pub report_interval_ms: u32,
    /// Base URL of the telemetry server, e.g. `https://example.org`.
    pub server_url: heapless::String<MAX_URL_LEN>,

    // --- Factory reset ---
    /// Interval between reset-button polls (milliseconds).
    pub reset_poll_interval_ms: u32,
    /// Consecutive active polls required before a factory reset.
    pub reset_debounce_samples: u8,
    /// Electrical level of a pressed reset button.
    pub reset_active_level: ActiveLevel,

    // --- Sensors ---
    /// Settle time after powering the soil resistivity sensor (milliseconds).
    pub soil_settle_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut server_url = heapless::String::new();
        // Literal is shorter than MAX_URL_LEN.
        let _ = server_url.push_str("https://iop-monitor-server.tk:4001");
        Self {
            // Reporting
            report_interval_ms: 180 * 1000, // 3 min
            server_url,

            // Factory reset
            reset_poll_interval_ms: 1000, // 1 Hz
            reset_debounce_samples: 5,
            reset_active_level: ActiveLevel::Low,

            // Sensors
            soil_settle_ms: 100,
        }
    }
}

impl NodeConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<()> {
        if !(1_000..=86_400_000).contains(&self.report_interval_ms) {
            return Err(Error::Config("report_interval_ms out of range [1s, 24h]"));
        }
        if !(10..=10_000).contains(&self.reset_poll_interval_ms) {
            return Err(Error::Config("reset_poll_interval_ms out of range [10, 10000]"));
        }
        if self.reset_poll_interval_ms >= self.report_interval_ms {
            return Err(Error::Config("reset poll must be faster than the report cycle"));
        }
        if self.reset_debounce_samples == 0 {
            return Err(Error::Config("reset_debounce_samples must be at least 1"));
        }
        if self.soil_settle_ms > 2_000 {
            return Err(Error::Config("soil_settle_ms above 2000"));
        }
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(Error::Config("server_url must be http(s)"));
        }
        Ok(())
    }
}
