use serde::{Deserialize, Serialize};

use crate::radio::InvalidTokenPolicy;

/// Number of samples kept in the in-memory history ring
pub const HISTORY_CAPACITY: usize = 50;

/// Timing and policy knobs of the update pipeline
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// How long the indicator stays lit after activation
    pub indicator_hold_ms: u64,
    /// Heartbeat write interval
    pub persist_interval_ms: u64,
    /// Cadence of the periodic tick
    pub tick_interval_ms: u64,
    /// Offset applied to UTC for log file dates and row timestamps
    pub utc_offset_secs: i32,
    /// Minimum difference for a float field to count as changed. `0.0` is exact inequality.
    pub change_epsilon: f32,
    pub invalid_token_policy: InvalidTokenPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            indicator_hold_ms: 15_000,
            persist_interval_ms: 60_000,
            tick_interval_ms: 100,
            utc_offset_secs: -5 * 3600,
            change_epsilon: 0.0,
            invalid_token_policy: InvalidTokenPolicy::CoerceToZero,
        }
    }
}

/// RYLR998 network settings. Both ends of the link must agree on all of them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RadioConfig {
    pub address: u16,
    pub network_id: u8,
    /// Spreading factor, bandwidth, coding rate, preamble
    pub parameters: [u8; 4],
    pub baud_rate: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            address: 2,
            network_id: 18,
            parameters: [12, 4, 1, 7],
            baud_rate: 115_200,
        }
    }
}

/// Wi-Fi credentials compiled into the firmware as a fallback
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl InternetConfig<'_> {
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}
