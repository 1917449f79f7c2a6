//! Daily logs and settings on a FAT-formatted SD card
//!
//! The card is driven by `embedded_sdmmc` over blocking SPI. Logs live in
//! `DATA/` under their 8.3 short names (`YYYYMMDD.CSV`); settings are a single
//! postcard blob in `SETTINGS.BIN` at the root. Each operation opens the
//! volume, does its work and closes everything again, so a card pulled between
//! operations costs at most the operation in flight.

use alloc::vec;

use chrono::{Datelike, Timelike};
use embedded_sdmmc::{
    Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use log::{error, info, warn};
use lorabridge_core::clock::local_datetime;
use lorabridge_core::settings::{SettingValue, SettingsBlob, SettingsError, SettingsStore};
use lorabridge_core::storage::{LogDestination, LogStorage};
use thiserror_no_std::Error;

use crate::sntp;

/// FAT name of the log directory
const LOG_DIR_NAME: &str = "DATA";
const SETTINGS_FILE: &str = "SETTINGS.BIN";

pub type SdVolumeManager<S, D, T> = VolumeManager<SdCard<S, D>, T, 4, 4, 1>;
pub type SdError = embedded_sdmmc::Error<SdCardError>;

/// File timestamps from the SNTP clock, or the FAT epoch before the first sync
pub struct SntpTimeSource {
    utc_offset_secs: i32,
}

impl SntpTimeSource {
    pub fn new(utc_offset_secs: i32) -> Self {
        Self { utc_offset_secs }
    }
}

impl TimeSource for SntpTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        sntp::epoch_now()
            .and_then(|epoch| local_datetime(epoch, self.utc_offset_secs))
            .and_then(|dt| {
                Timestamp::from_calendar(
                    u16::try_from(dt.year()).ok()?,
                    dt.month() as u8,
                    dt.day() as u8,
                    dt.hour() as u8,
                    dt.minute() as u8,
                    dt.second() as u8,
                )
                .ok()
            })
            .unwrap_or(Timestamp {
                year_since_1970: 10,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            })
    }
}

/// [`LogStorage`] on the SD card
///
/// For NOW these operations block the executor while the SPI transfer runs.
/// Rows are small and infrequent, so in practice this has not mattered.
pub struct SdCardStorage<'a, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: &'a SdVolumeManager<S, D, T>,
    available: bool,
    capacity: Option<u64>,
}

impl<'a, S, D, T> SdCardStorage<'a, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Check the volume opens and make sure `DATA/` exists.
    ///
    /// A card that cannot be mounted leaves the storage unavailable; logging is
    /// then skipped for the rest of the session.
    pub fn mount(volume_mgr: &'a SdVolumeManager<S, D, T>, capacity: Option<u64>) -> Self {
        let available = match Self::prepare(volume_mgr) {
            Ok(()) => {
                info!(" SD card mounted");
                true
            }
            Err(e) => {
                error!(" SD card unavailable: {:?}", e);
                false
            }
        };

        Self {
            volume_mgr,
            available,
            capacity,
        }
    }

    fn prepare(volume_mgr: &SdVolumeManager<S, D, T>) -> Result<(), SdError> {
        let volume0 = volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        match root_dir.make_dir_in_dir(LOG_DIR_NAME) {
            Ok(()) => info!(" Created /{}", LOG_DIR_NAME),
            Err(embedded_sdmmc::Error::DirAlreadyExists) => {}
            Err(e) => return Err(e),
        }

        root_dir.close()?;
        volume0.close()?;
        Ok(())
    }
}

impl<S, D, T> LogStorage for SdCardStorage<'_, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = SdError;

    fn is_available(&self) -> bool {
        self.available
    }

    fn exists(&self, dest: &LogDestination) -> Result<bool, Self::Error> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let log_dir = root_dir.open_dir(LOG_DIR_NAME)?;

        let found = match log_dir.find_directory_entry(dest.short_name().as_str()) {
            Ok(_) => true,
            Err(embedded_sdmmc::Error::NotFound) => false,
            Err(e) => return Err(e),
        };

        log_dir.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(found)
    }

    fn append(&mut self, dest: &LogDestination, data: &[u8]) -> Result<(), Self::Error> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let log_dir = root_dir.open_dir(LOG_DIR_NAME)?;

        let file = log_dir.open_file_in_dir(dest.short_name().as_str(), Mode::ReadWriteCreateOrAppend)?;
        file.write(data)?;

        // Close explicitly so errors surface instead of being lost on drop
        file.close()?;
        log_dir.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(())
    }

    fn read_at(
        &self,
        dest: &LogDestination,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let log_dir = root_dir.open_dir(LOG_DIR_NAME)?;
        let file = log_dir.open_file_in_dir(dest.short_name().as_str(), Mode::ReadOnly)?;

        let read = match u32::try_from(offset) {
            Ok(offset) if offset < file.length() => {
                file.seek_from_start(offset)?;
                file.read(buf)?
            }
            // At or past the end
            _ => 0,
        };

        file.close()?;
        log_dir.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(read)
    }

    fn log_len(&self, dest: &LogDestination) -> Result<u64, Self::Error> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let log_dir = root_dir.open_dir(LOG_DIR_NAME)?;

        let entry = log_dir.find_directory_entry(dest.short_name().as_str())?;

        log_dir.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(u64::from(entry.size))
    }

    fn find_any_log(&self) -> Result<Option<LogDestination>, Self::Error> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let log_dir = root_dir.open_dir(LOG_DIR_NAME)?;

        let mut found: Option<LogDestination> = None;
        log_dir.iterate_dir(|entry| {
            if entry.attributes.is_directory() {
                return;
            }
            let name: heapless::String<12> = {
                use core::fmt::Write;
                let mut name = heapless::String::new();
                let _ = write!(name, "{}", entry.name);
                name
            };
            if let Some(dest) = LogDestination::from_file_name(&name) {
                // Directory order is arbitrary; report the oldest log
                if found.is_none_or(|current| dest < current) {
                    found = Some(dest);
                }
            }
        })?;

        log_dir.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(found)
    }

    fn capacity_bytes(&self) -> Option<u64> {
        self.capacity
    }
}

#[derive(Error, Debug)]
pub enum SdSettingsError {
    #[error("settings: {0}")]
    Settings(SettingsError),
    #[error("SD card: {0:?}")]
    Card(SdError),
}

/// [`SettingsStore`] backed by `SETTINGS.BIN`, rewritten on every change
pub struct SdSettings<'a, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: &'a SdVolumeManager<S, D, T>,
    blob: SettingsBlob,
}

impl<'a, S, D, T> SdSettings<'a, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Load the stored settings. A missing, unreadable or corrupt file starts
    /// from empty settings, so the gateway falls back to its defaults.
    pub fn open(volume_mgr: &'a SdVolumeManager<S, D, T>) -> Self {
        let blob = match Self::read_blob(volume_mgr) {
            Ok(Some(bytes)) => SettingsBlob::from_bytes(&bytes).unwrap_or_else(|e| {
                warn!(" {} is unreadable ({}), starting empty", SETTINGS_FILE, e);
                SettingsBlob::new()
            }),
            Ok(None) => SettingsBlob::new(),
            Err(e) => {
                warn!(" Failed to read {}: {:?}", SETTINGS_FILE, e);
                SettingsBlob::new()
            }
        };
        info!(" {} settings loaded", blob.len());

        Self { volume_mgr, blob }
    }

    fn read_blob(volume_mgr: &SdVolumeManager<S, D, T>) -> Result<Option<alloc::vec::Vec<u8>>, SdError> {
        let volume0 = volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let file = match root_dir.open_file_in_dir(SETTINGS_FILE, Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut bytes = vec![0u8; file.length() as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            let n = file.read(&mut bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        bytes.truncate(filled);

        file.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(Some(bytes))
    }

    fn flush(&self) -> Result<(), SdSettingsError> {
        let bytes = self.blob.to_bytes().map_err(SdSettingsError::Settings)?;
        self.write_blob(&bytes).map_err(SdSettingsError::Card)
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<(), SdError> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let file = root_dir.open_file_in_dir(SETTINGS_FILE, Mode::ReadWriteCreateOrTruncate)?;
        file.write(bytes)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(())
    }
}

impl<S, D, T> SettingsStore for SdSettings<'_, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = SdSettingsError;

    fn get(&self, key: &str) -> Result<Option<SettingValue>, Self::Error> {
        self.blob.get(key).map_err(SdSettingsError::Settings)
    }

    fn put(&mut self, key: &str, value: SettingValue) -> Result<(), Self::Error> {
        self.blob.put(key, value).map_err(SdSettingsError::Settings)?;
        self.flush()
    }
}
