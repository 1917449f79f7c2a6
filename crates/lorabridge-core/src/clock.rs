//! Wall-clock access and SNTP packet handling
//!
//! The gateway keeps two notions of time. Uptime (`UptimeMs`) is monotonic and
//! drives every timer in the pipeline. Wall-clock time comes from an SNTP
//! server and is only used to name log files and stamp CSV rows; until it has
//! been synchronised those operations are skipped.

use core::fmt::Write;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use thiserror_no_std::Error;

/// Text written in place of a timestamp while the clock is not synchronised
pub const TIME_NOT_SET: &str = "TIME_NOT_SET";

pub const NTP_SERVER: &str = "pool.ntp.org";
pub const NTP_PORT: u16 = 123;
pub const NTP_PACKET_LEN: usize = 48;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Source of wall-clock time
pub trait WallClock {
    fn is_synchronized(&self) -> bool;

    /// Seconds since the Unix epoch, `None` while unsynchronised
    fn epoch_secs(&self) -> Option<u64>;

    /// Current epoch seconds, only when the clock is synchronised
    fn synced_epoch_secs(&self) -> Option<u64> {
        if self.is_synchronized() {
            self.epoch_secs()
        } else {
            None
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS`
pub type TimestampString = heapless::String<19>;

/// Local date-time for `epoch_secs` shifted by `utc_offset_secs`
pub fn local_datetime(epoch_secs: u64, utc_offset_secs: i32) -> Option<NaiveDateTime> {
    let secs = i64::try_from(epoch_secs).ok()? + i64::from(utc_offset_secs);
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

pub fn local_date(epoch_secs: u64, utc_offset_secs: i32) -> Option<NaiveDate> {
    local_datetime(epoch_secs, utc_offset_secs).map(|dt| dt.date())
}

/// Format a date-time as `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(dt: &NaiveDateTime) -> TimestampString {
    let mut out = TimestampString::new();
    // 19 bytes for any four-digit year
    let _ = write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    out
}

/// Local timestamp text for the clock, or [`TIME_NOT_SET`]
pub fn timestamp_or_unset<C: WallClock>(clock: &C, utc_offset_secs: i32) -> TimestampString {
    clock
        .synced_epoch_secs()
        .and_then(|secs| local_datetime(secs, utc_offset_secs))
        .map(|dt| format_timestamp(&dt))
        .unwrap_or_else(|| {
            let mut out = TimestampString::new();
            let _ = out.push_str(TIME_NOT_SET);
            out
        })
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpError {
    #[error("NTP reply shorter than 48 bytes")]
    TooShort,
    #[error("packet is not a server reply")]
    NotServerReply,
    #[error("server sent a kiss-of-death reply")]
    KissOfDeath,
    #[error("server transmit timestamp is before 1970")]
    InvalidTimestamp,
}

/// SNTP v3 client request
pub fn ntp_request() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    // LI = 0, VN = 3, Mode = 3 (client)
    packet[0] = 0x1B;
    packet
}

/// Extract the server transmit time as Unix seconds
pub fn parse_ntp_response(packet: &[u8]) -> Result<u64, NtpError> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(NtpError::TooShort);
    }

    let mode = packet[0] & 0x07;
    if mode != 4 {
        return Err(NtpError::NotServerReply);
    }
    if packet[1] == 0 {
        return Err(NtpError::KissOfDeath);
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    u64::from(seconds)
        .checked_sub(NTP_UNIX_OFFSET)
        .ok_or(NtpError::InvalidTimestamp)
}
