//! `+RCV=<addr>,<len>,<payload>,<rssi>,<snr>` envelope decoding
//!
//! The payload itself contains commas, so only the first two separators are
//! structural. The declared length is what bounds the payload; whatever
//! follows it is the `,<rssi>,<snr>` trailer.

use thiserror_no_std::Error;

/// Prefix the module puts in front of every received data frame
pub const RCV_PREFIX: &str = "+RCV=";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("line is not a +RCV data frame")]
    NotData,
    #[error("frame is missing the address/length separators")]
    MissingSeparator,
    #[error("frame length field is not a number")]
    InvalidLength,
    #[error("declared length {declared} exceeds the {available} bytes available")]
    LengthOutOfBounds { declared: usize, available: usize },
}

/// A structurally valid data frame borrowed from the received line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioFrame<'a> {
    /// Sender address, when it parses
    pub address: Option<u16>,
    /// Exactly `<len>` bytes of payload
    pub payload: &'a str,
    /// Received signal strength in dBm, when present
    pub rssi: Option<i16>,
    /// Signal-to-noise ratio in dB, when present
    pub snr: Option<i8>,
}

/// Validate the envelope of a received line and extract its payload.
///
/// Rejects lines without the `+RCV=` prefix, lines lacking either of the two
/// leading separators, a non-numeric length, and a length that does not fit
/// the bytes that follow the second separator.
pub fn parse_frame(line: &str) -> Result<RadioFrame<'_>, FrameError> {
    let start = line.find(RCV_PREFIX).ok_or(FrameError::NotData)? + RCV_PREFIX.len();
    let body = &line[start..];

    let (address, rest) = body.split_once(',').ok_or(FrameError::MissingSeparator)?;
    let (length, data) = rest.split_once(',').ok_or(FrameError::MissingSeparator)?;

    let declared: usize = length
        .trim()
        .parse()
        .map_err(|_| FrameError::InvalidLength)?;

    // `get` also refuses to split a multi-byte character
    let payload = data.get(..declared).ok_or(FrameError::LengthOutOfBounds {
        declared,
        available: data.len(),
    })?;

    let (rssi, snr) = parse_trailer(&data[declared..]);

    Ok(RadioFrame {
        address: address.trim().parse().ok(),
        payload,
        rssi,
        snr,
    })
}

fn parse_trailer(trailer: &str) -> (Option<i16>, Option<i8>) {
    let Some(trailer) = trailer.strip_prefix(',') else {
        return (None, None);
    };

    let mut parts = trailer.split(',');
    let rssi = parts.next().and_then(|v| v.trim().parse().ok());
    let snr = parts.next().and_then(|v| v.trim().parse().ok());
    (rssi, snr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame() {
        let frame = parse_frame("+RCV=1,22,T:23.5,H:60,L:300,S:40,-45,11").unwrap();
        assert_eq!(frame.address, Some(1));
        assert_eq!(frame.payload, "T:23.5,H:60,L:300,S:40");
        assert_eq!(frame.rssi, Some(-45));
        assert_eq!(frame.snr, Some(11));
    }

    #[test]
    fn test_frame_without_trailer() {
        let frame = parse_frame("+RCV=7,6,T:21.0").unwrap();
        assert_eq!(frame.payload, "T:21.0");
        assert_eq!(frame.rssi, None, "no trailer should leave rssi unset");
        assert_eq!(frame.snr, None);
    }

    #[test]
    fn test_diagnostic_line_is_not_data() {
        assert_eq!(parse_frame("+OK"), Err(FrameError::NotData));
        assert_eq!(parse_frame("+READY"), Err(FrameError::NotData));
    }

    #[test]
    fn test_missing_separators() {
        assert_eq!(parse_frame("+RCV=2"), Err(FrameError::MissingSeparator));
        assert_eq!(parse_frame("+RCV=2,10"), Err(FrameError::MissingSeparator));
    }

    #[test]
    fn test_non_numeric_length() {
        assert_eq!(
            parse_frame("+RCV=2,abc,T:1,10,-50"),
            Err(FrameError::InvalidLength)
        );
    }

    #[test]
    fn test_length_past_end() {
        assert_eq!(
            parse_frame("+RCV=2,40,T:1"),
            Err(FrameError::LengthOutOfBounds {
                declared: 40,
                available: 3
            })
        );
    }

    #[test]
    fn test_prefix_after_noise() {
        let frame = parse_frame("\0+RCV=3,3,S:9,-80,5").unwrap();
        assert_eq!(frame.payload, "S:9");
        assert_eq!(frame.address, Some(3));
    }
}
