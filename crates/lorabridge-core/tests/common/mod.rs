//! In-memory collaborators for driving the gateway pipeline in tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::rc::Rc;

use chrono::NaiveDate;
use embedded_hal::digital::{ErrorType, OutputPin};
use lorabridge_core::Gateway;
use lorabridge_core::clock::WallClock;
use lorabridge_core::config::GatewayConfig;
use lorabridge_core::settings::SettingsBlob;
use lorabridge_core::storage::{CSV_HEADER, LogDestination, LogStorage};

/// 2024-03-10 12:45:30 at UTC-5
pub const EPOCH: u64 = 1_710_092_730;

pub type TestGateway = Gateway<RecordingPin, MemoryStorage, ManualClock, SettingsBlob>;

/// Log storage kept in a map, counting every append call
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pub files: BTreeMap<LogDestination, Vec<u8>>,
    pub available: bool,
    pub appends: usize,
}

impl MemoryStorage {
    pub fn available() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn contents(&self, dest: &LogDestination) -> String {
        self.files
            .get(dest)
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .unwrap_or_default()
    }

    /// Data rows of `dest`, without the header
    pub fn rows(&self, dest: &LogDestination) -> Vec<String> {
        let contents = self.contents(dest);
        let mut lines = contents.split("\r\n");
        assert_eq!(lines.next(), Some(CSV_HEADER), "log must start with the header");
        lines.filter(|l| !l.is_empty()).map(String::from).collect()
    }
}

impl LogStorage for MemoryStorage {
    type Error = &'static str;

    fn is_available(&self) -> bool {
        self.available
    }

    fn exists(&self, dest: &LogDestination) -> Result<bool, Self::Error> {
        Ok(self.files.contains_key(dest))
    }

    fn append(&mut self, dest: &LogDestination, data: &[u8]) -> Result<(), Self::Error> {
        self.appends += 1;
        self.files.entry(*dest).or_default().extend_from_slice(data);
        Ok(())
    }

    fn read_at(
        &self,
        dest: &LogDestination,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let data = self.files.get(dest).ok_or("no such file")?;
        let start = usize::try_from(offset).map_err(|_| "offset")?.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn find_any_log(&self) -> Result<Option<LogDestination>, Self::Error> {
        Ok(self.files.keys().next().copied())
    }

    fn capacity_bytes(&self) -> Option<u64> {
        Some(8 * 1024 * 1024 * 1024)
    }
}

/// Wall clock whose state the test sets directly
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    pub epoch: Option<u64>,
}

impl ManualClock {
    pub fn synced_at(epoch: u64) -> Self {
        Self { epoch: Some(epoch) }
    }

    pub fn unsynced() -> Self {
        Self::default()
    }
}

impl WallClock for ManualClock {
    fn is_synchronized(&self) -> bool {
        self.epoch.is_some()
    }

    fn epoch_secs(&self) -> Option<u64> {
        self.epoch
    }
}

/// Output pin that records every level it is driven to.
///
/// Clones share the record, so a test can keep one while the gateway owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }

    pub fn is_high(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

pub fn gateway(storage: MemoryStorage, clock: ManualClock) -> (TestGateway, RecordingPin) {
    let pin = RecordingPin::default();
    let gateway = Gateway::new(
        GatewayConfig::default(),
        pin.clone(),
        storage,
        clock,
        SettingsBlob::new(),
    );
    (gateway, pin)
}

/// Wrap a payload in a `+RCV` envelope from node 1
pub fn frame(payload: &str) -> String {
    format!("+RCV=1,{},{},-42,9", payload.len(), payload)
}

pub fn today() -> LogDestination {
    LogDestination::for_epoch(EPOCH, GatewayConfig::default().utc_offset_secs)
        .expect("test epoch has a date")
}

pub fn date(year: i32, month: u32, day: u32) -> LogDestination {
    LogDestination::new(NaiveDate::from_ymd_opt(year, month, day).expect("valid date"))
}
