//! Stand-ins for the gateway's clock and indicator LED

use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};

use embedded_hal::digital::{ErrorType, OutputPin};
use log::info;
use lorabridge_core::clock::WallClock;

/// System time that only counts as synchronised once the script says so
#[derive(Debug, Default)]
pub struct SystemClock {
    synchronized: bool,
}

impl SystemClock {
    pub fn new(synchronized: bool) -> Self {
        Self { synchronized }
    }

    pub fn set_synchronized(&mut self, synchronized: bool) {
        self.synchronized = synchronized;
    }
}

impl WallClock for SystemClock {
    fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    fn epoch_secs(&self) -> Option<u64> {
        if !self.synchronized {
            return None;
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    }
}

/// Indicator LED that logs its level changes
#[derive(Debug, Default)]
pub struct ConsoleLed {
    lit: bool,
}

impl ErrorType for ConsoleLed {
    type Error = Infallible;
}

impl OutputPin for ConsoleLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.lit {
            info!(" [LED] off");
        }
        self.lit = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.lit {
            info!(" [LED] on");
        }
        self.lit = true;
        Ok(())
    }
}
