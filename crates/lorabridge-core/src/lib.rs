//! Hardware-independent core library for the LoRaBridge gateway
//!
//! This crate contains the sensor-update pipeline of the gateway: radio frame
//! and payload decoding, change detection, the bounded history ring, the range
//! indicator, the persistence gate and the orchestrator tying them together.
//! Collaborators that touch hardware (log storage, wall clock, settings store,
//! indicator pin) are expressed as traits so the whole pipeline runs on a
//! desktop host for the simulator and tests.
//!
//! It is `no_std` with `extern crate alloc` so it compiles on both the ESP32
//! firmware and desktop targets.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod api;
pub mod change;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod history;
pub mod indicator;
pub mod radio;
pub mod ranges;
pub mod reading;
pub mod settings;
pub mod storage;

pub use gateway::{Gateway, GatewayContext, TickReport, UpdateOutcome};
pub use reading::{CurrentReading, HistorySample, SensorField, SensorUpdate, UptimeMs};
