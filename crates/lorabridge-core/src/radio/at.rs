//! AT command sequence that brings the RYLR998 module onto the sensor network

use core::fmt::Write;

use crate::config::RadioConfig;

/// One command line and how long to let the module settle after it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    /// Command text without the trailing `\r\n`
    pub text: heapless::String<32>,
    pub settle_ms: u64,
}

/// The module needs two seconds to come back after a reset
pub const RESET_SETTLE_MS: u64 = 2_000;
pub const COMMAND_SETTLE_MS: u64 = 500;

impl AtCommand {
    fn new(settle_ms: u64, args: core::fmt::Arguments<'_>) -> Self {
        let mut text = heapless::String::new();
        // The longest command is well under 32 bytes
        let _ = text.write_fmt(args);
        Self { text, settle_ms }
    }
}

/// Reset, address, network id and modem parameters, in the order they are sent
pub fn init_commands(config: &RadioConfig) -> [AtCommand; 4] {
    let [sf, bw, cr, preamble] = config.parameters;
    [
        AtCommand::new(RESET_SETTLE_MS, format_args!("AT+RESET")),
        AtCommand::new(
            COMMAND_SETTLE_MS,
            format_args!("AT+ADDRESS={}", config.address),
        ),
        AtCommand::new(
            COMMAND_SETTLE_MS,
            format_args!("AT+NETWORKID={}", config.network_id),
        ),
        AtCommand::new(
            COMMAND_SETTLE_MS,
            format_args!("AT+PARAMETER={},{},{},{}", sf, bw, cr, preamble),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let commands = init_commands(&RadioConfig::default());
        let texts: [&str; 4] = commands.each_ref().map(|c| c.text.as_str());
        assert_eq!(
            texts,
            [
                "AT+RESET",
                "AT+ADDRESS=2",
                "AT+NETWORKID=18",
                "AT+PARAMETER=12,4,1,7"
            ]
        );
        assert_eq!(commands[0].settle_ms, 2_000);
        assert!(commands[1..].iter().all(|c| c.settle_ms == 500));
    }
}
