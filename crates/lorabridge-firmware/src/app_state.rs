//! Startup phases and firmware error type

use log::info;
use thiserror_no_std::Error;

/// Startup phase of the gateway, logged as it advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    RadioInit,
    WifiConnecting,
    WifiConnected,
    /// Wi-Fi could not be brought up; the gateway keeps running offline
    Offline,
    Running,
}

impl AppRunState {
    /// Move to `next`, logging the transition
    pub fn advance(&mut self, next: AppRunState) {
        if *self != next {
            info!(" App state {:?} -> {:?}", self, next);
            *self = next;
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Radio init failed: {0}")]
    Radio(heapless::String<64>),
    #[error("WiFi connection failed: {0}")]
    Wifi(heapless::String<64>),
    #[error("Time sync failed: {0}")]
    TimeSync(heapless::String<64>),
}

/// Build a bounded string, cutting `value` at the last character that fits
pub trait FromTruncated<T> {
    fn from_truncated(value: T) -> Self;
}

impl<const N: usize> FromTruncated<&str> for heapless::String<N> {
    fn from_truncated(value: &str) -> Self {
        let mut out = heapless::String::new();
        for c in value.chars() {
            if out.push(c).is_err() {
                break;
            }
        }
        out
    }
}

impl<const N: usize> FromTruncated<core::fmt::Arguments<'_>> for heapless::String<N> {
    fn from_truncated(value: core::fmt::Arguments<'_>) -> Self {
        use core::fmt::Write;

        let mut out = heapless::String::new();
        // Pieces that do not fit are dropped
        let _ = out.write_fmt(value);
        out
    }
}
