//! CSV row formatting and read-back

use core::fmt::Write;

use super::{LINE_ENDING, LogDestination, LogStorage};
use crate::reading::CurrentReading;

/// One formatted row including its line ending
pub type RowString = heapless::String<192>;

/// `<timestamp>,<temp:2dp>,<hum:2dp>,<soil>,<lux:1dp>\r\n`
pub fn format_row(timestamp: &str, reading: &CurrentReading) -> RowString {
    let mut row = RowString::new();
    // Sized for f32::MAX in every float column
    let _ = write!(
        row,
        "{},{:.2},{:.2},{},{:.1}{}",
        timestamp,
        reading.temperature,
        reading.humidity,
        reading.soil_moisture,
        reading.lux,
        LINE_ENDING
    );
    row
}

/// Number of data rows in `dest`: non-blank lines after the header
pub fn count_entries<S: LogStorage>(storage: &S, dest: &LogDestination) -> Result<usize, S::Error> {
    let mut buf = [0u8; 256];
    let mut offset = 0u64;
    let mut line = 0usize;
    let mut line_has_content = false;
    let mut entries = 0usize;

    loop {
        let read = storage.read_at(dest, offset, &mut buf)?;
        if read == 0 {
            break;
        }
        offset += read as u64;

        for &byte in &buf[..read] {
            match byte {
                b'\n' => {
                    if line > 0 && line_has_content {
                        entries += 1;
                    }
                    line += 1;
                    line_has_content = false;
                }
                b'\r' | b' ' | b'\t' => {}
                _ => line_has_content = true,
            }
        }
    }

    // Last line without a terminator
    if line > 0 && line_has_content {
        entries += 1;
    }

    Ok(entries)
}
