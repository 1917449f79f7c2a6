//! Assembly of UART bytes into newline-terminated lines

use log::warn;

/// Bounded line accumulator for the radio UART.
///
/// `\r` is dropped, blank lines are skipped, and a line longer than `N` bytes
/// is discarded whole once its terminating `\n` arrives.
pub struct LineBuffer<const N: usize> {
    buf: heapless::Vec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Push received bytes, calling `on_line` for every complete line
    pub fn feed(&mut self, bytes: &[u8], mut on_line: impl FnMut(&str)) {
        for &byte in bytes {
            match byte {
                b'\r' => {}
                b'\n' => {
                    if self.overflowed {
                        warn!(" Discarding radio line longer than {} bytes", N);
                    } else if !self.buf.is_empty() {
                        match core::str::from_utf8(&self.buf) {
                            Ok(line) => on_line(line),
                            Err(_) => warn!(" Discarding radio line with invalid UTF-8"),
                        }
                    }
                    self.clear();
                }
                _ => {
                    if !self.overflowed && self.buf.push(byte).is_err() {
                        self.overflowed = true;
                    }
                }
            }
        }
    }

    /// Drop any partially received line
    pub fn clear(&mut self) {
        self.buf.clear();
        self.overflowed = false;
    }

    /// Bytes of the line currently being received
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;

    fn collect<const N: usize>(buffer: &mut LineBuffer<N>, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        buffer.feed(bytes, |line| lines.push(line.to_string()));
        lines
    }

    #[test]
    fn test_crlf_lines() {
        let mut buffer = LineBuffer::<64>::new();
        let lines = collect(&mut buffer, b"+OK\r\n+RCV=1,3,T:1,-40,9\r\n");
        assert_eq!(lines, ["+OK", "+RCV=1,3,T:1,-40,9"]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut buffer = LineBuffer::<64>::new();
        assert!(collect(&mut buffer, b"+RCV=1,3,").is_empty());
        assert_eq!(buffer.pending(), 9);
        let lines = collect(&mut buffer, b"S:5,-40,9\r\n");
        assert_eq!(lines, ["+RCV=1,3,S:5,-40,9"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut buffer = LineBuffer::<16>::new();
        assert!(collect(&mut buffer, b"\r\n\n\r\n").is_empty());
    }

    #[test]
    fn test_overflow_discards_whole_line() {
        let mut buffer = LineBuffer::<8>::new();
        let lines = collect(&mut buffer, b"0123456789abc\n+OK\n");
        assert_eq!(lines, ["+OK"], "overlong line must not be delivered in part");
    }
}
