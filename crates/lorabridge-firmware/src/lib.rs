//! ESP32 firmware-specific modules for the LoRaBridge gateway
//!
//! This crate holds the code that only builds for the device: the RYLR998
//! UART bring-up, the SD card log storage and settings file, Wi-Fi
//! association, SNTP and the dashboard HTTP server. The update pipeline itself
//! lives in `lorabridge_core`.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod http;
pub mod radio;
pub mod sd_card;
pub mod sntp;
pub mod wifi;

/// Milliseconds since boot, the time base of the core pipeline
pub fn uptime_ms() -> lorabridge_core::UptimeMs {
    embassy_time::Instant::now().as_millis()
}
