//! Simulator script commands
//!
//! One command per line. Lines starting with `+` are fed to the gateway as if
//! the radio had received them; everything else is a simulator command.
//! Blank lines and `#` comments are ignored.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Raw line from the radio module
    Radio(&'a str),
    /// Advance simulated uptime, ticking on the configured cadence
    Wait(u64),
    Sync,
    Unsync,
    /// Mount or unmount the log storage
    Storage(bool),
    Status,
    History,
    Ranges,
    SetRanges(&'a str),
    StorageInfo,
    Download,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    UnknownCommand,
    BadArgument,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Result<Self, ScriptError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Self::Skip);
        }
        if line.starts_with('+') {
            return Ok(Self::Radio(line));
        }

        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        match (word, rest) {
            ("wait", ms) => ms
                .parse()
                .map(Self::Wait)
                .map_err(|_| ScriptError::BadArgument),
            ("sync", "") => Ok(Self::Sync),
            ("unsync", "") => Ok(Self::Unsync),
            ("storage", "on") => Ok(Self::Storage(true)),
            ("storage", "off") => Ok(Self::Storage(false)),
            ("storage", _) => Err(ScriptError::BadArgument),
            ("status", "") => Ok(Self::Status),
            ("history", "") => Ok(Self::History),
            ("ranges", "") => Ok(Self::Ranges),
            ("ranges", json) => Ok(Self::SetRanges(json)),
            ("sd-info", "") => Ok(Self::StorageInfo),
            ("download", "") => Ok(Self::Download),
            _ => Err(ScriptError::UnknownCommand),
        }
    }
}
