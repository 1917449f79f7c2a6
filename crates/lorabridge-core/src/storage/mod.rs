//! Durable CSV logging of sensor readings
//!
//! Readings are appended to one CSV file per local calendar day. The
//! [`PersistenceGate`] decides when a row is written and handles the daily
//! rollover; the actual file access is behind the [`LogStorage`] trait so the
//! SD card (firmware) and a host directory (simulator) share the same logic.

pub mod csv;
pub mod persistence;

pub use csv::{count_entries, format_row};
pub use persistence::{
    PersistFailure, PersistOutcome, PersistTrigger, PersistenceGate, PersistenceState, SkipReason,
};

use core::fmt::{Debug, Display, Write};

use chrono::{Datelike, NaiveDate};

/// Directory holding the daily logs
pub const LOG_DIR: &str = "data";

/// First line of every log file.
///
/// Soil comes before light here, unlike everywhere else in the gateway. Kept
/// that way so existing logs and the analysis scripts stay compatible.
pub const CSV_HEADER: &str = "timestamp,temperature,humidity,soil_moisture,lux";

/// Line terminator for header and rows
pub const LINE_ENDING: &str = "\r\n";

pub type PathString = heapless::String<32>;

/// The daily log file a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogDestination {
    pub date: NaiveDate,
}

impl LogDestination {
    pub const fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Destination for the local date of `epoch_secs`
    pub fn for_epoch(epoch_secs: u64, utc_offset_secs: i32) -> Option<Self> {
        crate::clock::local_date(epoch_secs, utc_offset_secs).map(Self::new)
    }

    /// `sensors_YYYY-MM-DD.csv`
    pub fn file_name(&self) -> PathString {
        let mut out = PathString::new();
        let _ = write!(
            out,
            "sensors_{:04}-{:02}-{:02}.csv",
            self.date.year(),
            self.date.month(),
            self.date.day()
        );
        out
    }

    /// `/data/sensors_YYYY-MM-DD.csv`, the name reported to clients
    pub fn path(&self) -> PathString {
        let mut out = PathString::new();
        let _ = write!(out, "/{}/{}", LOG_DIR, self.file_name());
        out
    }

    /// `YYYYMMDD.CSV`, for FAT volumes limited to 8.3 names
    pub fn short_name(&self) -> heapless::String<12> {
        let mut out = heapless::String::new();
        let _ = write!(
            out,
            "{:04}{:02}{:02}.CSV",
            self.date.year(),
            self.date.month(),
            self.date.day()
        );
        out
    }

    /// Recognise either the long or the short file name form
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.rsplit('/').next().unwrap_or(name);

        if let Some(date) = name
            .strip_prefix("sensors_")
            .and_then(|rest| rest.strip_suffix(".csv"))
        {
            let mut parts = date.split('-');
            let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
            if parts.next().is_some() || year.len() != 4 || month.len() != 2 || day.len() != 2 {
                return None;
            }
            return Self::from_parts(year, month, day);
        }

        let stem = name
            .strip_suffix(".CSV")
            .or_else(|| name.strip_suffix(".csv"))?;
        if stem.len() != 8 {
            return None;
        }
        Self::from_parts(stem.get(..4)?, stem.get(4..6)?, stem.get(6..)?)
    }

    fn from_parts(year: &str, month: &str, day: &str) -> Option<Self> {
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !(all_digits(year) && all_digits(month) && all_digits(day)) {
            return None;
        }
        NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
            .map(Self::new)
    }
}

impl Display for LogDestination {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.path())
    }
}

/// File-like storage for the daily logs
pub trait LogStorage {
    type Error: Debug;

    /// Whether the medium is mounted and usable
    fn is_available(&self) -> bool;

    fn exists(&self, dest: &LogDestination) -> Result<bool, Self::Error>;

    /// Append `data` to `dest`, creating it if needed
    fn append(&mut self, dest: &LogDestination, data: &[u8]) -> Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes starting at `offset`. Returns 0 at end of file.
    fn read_at(
        &self,
        dest: &LogDestination,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error>;

    /// Size of `dest` in bytes. The default reads the file through to the end.
    fn log_len(&self, dest: &LogDestination) -> Result<u64, Self::Error> {
        let mut buf = [0u8; 128];
        let mut len = 0u64;
        loop {
            let n = self.read_at(dest, len, &mut buf)?;
            if n == 0 {
                return Ok(len);
            }
            len += n as u64;
        }
    }

    /// Any log present on the medium, used when the current one is missing
    fn find_any_log(&self) -> Result<Option<LogDestination>, Self::Error>;

    /// Total size of the medium in bytes, when known
    fn capacity_bytes(&self) -> Option<u64> {
        None
    }

    /// Bytes in use on the medium, when known
    fn used_bytes(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> LogDestination {
        LogDestination::new(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
    }

    #[test]
    fn test_names() {
        assert_eq!(dest().file_name().as_str(), "sensors_2024-03-09.csv");
        assert_eq!(dest().path().as_str(), "/data/sensors_2024-03-09.csv");
        assert_eq!(dest().short_name().as_str(), "20240309.CSV");
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(
            LogDestination::from_file_name("/data/sensors_2024-03-09.csv"),
            Some(dest())
        );
        assert_eq!(LogDestination::from_file_name("20240309.CSV"), Some(dest()));
        assert_eq!(LogDestination::from_file_name("SETTINGS.BIN"), None);
        assert_eq!(LogDestination::from_file_name("20241399.CSV"), None);
    }

    #[test]
    fn test_destination_follows_local_date() {
        // 03:00 UTC on March 11th is still March 10th at UTC-5
        let utc = LogDestination::for_epoch(1_710_126_000, 0).unwrap();
        let local = LogDestination::for_epoch(1_710_126_000, -5 * 3600).unwrap();
        assert_eq!(utc.date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(local.date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }
}
