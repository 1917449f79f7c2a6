//! Report records and request handling for the dashboard API
//!
//! The firmware owns the sockets; everything here is pure so the exact JSON
//! the dashboard receives can be tested on the host.

pub mod http;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use log::warn;
use serde::Serialize;
use thiserror_no_std::Error;

use crate::clock::WallClock;
use crate::gateway::{Gateway, RangeUpdateError};
use crate::history::HistoryRing;
use crate::ranges::{RangeConfig, RangeError};
use crate::reading::{HistorySample, UptimeMs};
use crate::settings::SettingsStore;
use crate::storage::{LogDestination, LogStorage, PathString, count_entries};
use embedded_hal::digital::OutputPin;

/// `GET /api/data`
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub temperature: f32,
    pub humidity: f32,
    pub lux: f32,
    pub soil_moisture: i32,
    pub last_update: UptimeMs,
    pub valid: bool,
    pub uptime: UptimeMs,
    pub sd_available: bool,
    pub time_synchronized: bool,
    pub led_active: bool,
}

impl StatusReport {
    pub fn new<P, S, C, K>(gateway: &Gateway<P, S, C, K>, now: UptimeMs) -> Self
    where
        P: OutputPin,
        S: LogStorage,
        C: WallClock,
        K: SettingsStore,
    {
        let reading = gateway.reading();
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            lux: reading.lux,
            soil_moisture: reading.soil_moisture,
            last_update: reading.last_update,
            valid: reading.valid,
            uptime: now,
            sd_available: gateway.storage().is_available(),
            time_synchronized: gateway.clock().is_synchronized(),
            led_active: gateway.indicator_active(),
        }
    }
}

/// `GET /api/sd-info`
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub available: bool,
    /// Card size in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_size: Option<u64>,
    /// Space used in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_space: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<PathString>,
    pub total_entries: usize,
}

const MIB: u64 = 1024 * 1024;

impl StorageReport {
    /// Gather storage status, counting the rows of the current log by reading it back.
    ///
    /// Read errors are logged and reported as zero entries.
    pub fn new<S: LogStorage>(storage: &S, current: Option<&LogDestination>) -> Self {
        if !storage.is_available() {
            return Self {
                available: false,
                card_size: None,
                used_space: None,
                current_file: None,
                total_entries: 0,
            };
        }

        let total_entries = match current {
            Some(dest) => match storage.exists(dest) {
                Ok(true) => count_entries(storage, dest).unwrap_or_else(|e| {
                    warn!(" Failed to count entries in {}: {:?}", dest, e);
                    0
                }),
                Ok(false) => 0,
                Err(e) => {
                    warn!(" Failed to check {}: {:?}", dest, e);
                    0
                }
            },
            None => 0,
        };

        Self {
            available: true,
            card_size: storage.capacity_bytes().map(|b| b / MIB),
            used_space: storage.used_bytes().map(|b| b / MIB),
            current_file: current.map(LogDestination::path),
            total_entries,
        }
    }
}

/// `{"success":..,"message":..}` reply to `POST /api/ranges`
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiReply<'a> {
    pub success: bool,
    pub message: &'a str,
}

impl<'a> ApiReply<'a> {
    pub fn ok(message: &'a str) -> Self {
        Self {
            success: true,
            message,
        }
    }

    pub fn error(message: &'a str) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

/// `GET /api/history`: samples from oldest to newest
pub fn history_json<const N: usize>(history: &HistoryRing<N>) -> Result<String, serde_json::Error> {
    let samples: Vec<&HistorySample> = history.iter().collect();
    serde_json::to_string(&samples)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequestError {
    #[error("invalid JSON")]
    Json,
    #[error("{0}")]
    Invalid(RangeError),
}

/// Decode the body of `POST /api/ranges`. All eight bounds are required.
pub fn parse_range_update(body: &[u8]) -> Result<RangeConfig, RangeRequestError> {
    let ranges: RangeConfig = serde_json::from_slice(body).map_err(|_| RangeRequestError::Json)?;
    ranges.validate().map_err(RangeRequestError::Invalid)?;
    Ok(ranges)
}

/// Outcome of `POST /api/ranges`, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    pub status: http::Status,
    pub body: String,
}

/// Parse, validate, apply and save a range update, producing the HTTP reply
pub fn handle_range_update<P, S, C, K>(gateway: &mut Gateway<P, S, C, K>, body: &[u8]) -> RangeResponse
where
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    let mut message = String::new();
    let (status, success) = match parse_range_update(body) {
        Err(e) => {
            message = alloc::format!("{}", e);
            (http::Status::BadRequest, false)
        }
        Ok(ranges) => match gateway.update_ranges(ranges) {
            Ok(()) => {
                message.push_str("ranges updated");
                (http::Status::Ok, true)
            }
            Err(RangeUpdateError::Invalid(e)) => {
                message = alloc::format!("{}", e);
                (http::Status::BadRequest, false)
            }
            Err(RangeUpdateError::Store(_)) => {
                message.push_str("ranges applied but could not be saved");
                (http::Status::InternalError, false)
            }
        },
    };

    let reply = if success {
        ApiReply::ok(&message)
    } else {
        ApiReply::error(&message)
    };
    let body = to_json(&reply).unwrap_or_else(|_| String::from("{\"success\":false}"));
    RangeResponse { status, body }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadError<E: Debug> {
    #[error("storage is not available")]
    StorageUnavailable,
    #[error("no data file found on storage")]
    NoLogFound,
    #[error("storage error: {0:?}")]
    Storage(E),
}

/// Pick the log to send for `GET /api/download-data`.
///
/// Prefers `current`. When it is unset or missing, falls back to any log on
/// the medium without changing where new rows are written.
pub fn download_source<S: LogStorage>(
    storage: &S,
    current: Option<&LogDestination>,
) -> Result<LogDestination, DownloadError<S::Error>> {
    if !storage.is_available() {
        return Err(DownloadError::StorageUnavailable);
    }

    if let Some(dest) = current {
        if storage.exists(dest).map_err(DownloadError::Storage)? {
            return Ok(*dest);
        }
    }

    storage
        .find_any_log()
        .map_err(DownloadError::Storage)?
        .ok_or(DownloadError::NoLogFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_update() {
        let body = br#"{"tempMin":0,"tempMax":10,"humMin":20,"humMax":80,"luxMin":0,"luxMax":5000,"soilMin":10,"soilMax":90}"#;
        let ranges = parse_range_update(body).unwrap();
        assert_eq!(ranges.temp_max, 10.0);
        assert_eq!(ranges.soil_min, 10);
    }

    #[test]
    fn test_range_update_rejections() {
        assert_eq!(parse_range_update(b"{not json"), Err(RangeRequestError::Json));
        assert_eq!(
            parse_range_update(br#"{"tempMin":0}"#),
            Err(RangeRequestError::Json),
            "missing bounds are rejected"
        );

        let body = br#"{"tempMin":0,"tempMax":10,"humMin":-5,"humMax":80,"luxMin":0,"luxMax":5000,"soilMin":10,"soilMax":90}"#;
        assert!(matches!(
            parse_range_update(body),
            Err(RangeRequestError::Invalid(RangeError::NegativeMinimum { .. }))
        ));
    }

    #[test]
    fn test_reply_json() {
        assert_eq!(
            to_json(&ApiReply::ok("ranges updated")).unwrap(),
            r#"{"success":true,"message":"ranges updated"}"#
        );
    }

    #[test]
    fn test_unavailable_storage_report() {
        let report = StorageReport {
            available: false,
            card_size: None,
            used_space: None,
            current_file: None,
            total_entries: 0,
        };
        assert_eq!(
            to_json(&report).unwrap(),
            r#"{"available":false,"totalEntries":0}"#
        );
    }
}
