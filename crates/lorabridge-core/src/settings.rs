//! Durable key-value settings
//!
//! Range bounds and Wi-Fi credentials survive a reboot through a
//! [`SettingsStore`]. The firmware and simulator both back it with a
//! [`SettingsBlob`], a postcard-encoded list of entries kept in one file.

use alloc::vec::Vec;
use core::fmt::Debug;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Keys under which settings are stored
pub mod keys {
    pub const TEMP_MIN: &str = "tempMin";
    pub const TEMP_MAX: &str = "tempMax";
    pub const HUM_MIN: &str = "humMin";
    pub const HUM_MAX: &str = "humMax";
    pub const LUX_MIN: &str = "luxMin";
    pub const LUX_MAX: &str = "luxMax";
    pub const SOIL_MIN: &str = "soilMin";
    pub const SOIL_MAX: &str = "soilMax";
    pub const SSID: &str = "ssid";
    pub const PASSWORD: &str = "password";
}

pub const MAX_KEY_LEN: usize = 16;
pub const MAX_TEXT_LEN: usize = 64;
pub const MAX_ENTRIES: usize = 16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings key is longer than 16 bytes")]
    KeyTooLong,
    #[error("settings value is longer than 64 bytes")]
    ValueTooLong,
    #[error("settings store is full")]
    Full,
    #[error("stored value has the wrong type")]
    TypeMismatch,
    #[error("settings blob is corrupt")]
    Corrupt,
    #[error("settings blob could not be encoded")]
    Encode,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum SettingValue {
    Float(f32),
    Int(i32),
    Text(heapless::String<MAX_TEXT_LEN>),
}

/// Persistent key-value storage for settings
pub trait SettingsStore {
    type Error: Debug;

    fn get(&self, key: &str) -> Result<Option<SettingValue>, Self::Error>;
    fn put(&mut self, key: &str, value: SettingValue) -> Result<(), Self::Error>;

    /// Read a float, returning `default` when the key is missing or not a float
    fn get_f32_or(&self, key: &str, default: f32) -> Result<f32, Self::Error> {
        Ok(match self.get(key)? {
            Some(SettingValue::Float(v)) => v,
            _ => default,
        })
    }

    /// Read an integer, returning `default` when the key is missing or not an integer
    fn get_i32_or(&self, key: &str, default: i32) -> Result<i32, Self::Error> {
        Ok(match self.get(key)? {
            Some(SettingValue::Int(v)) => v,
            _ => default,
        })
    }

    fn get_text(&self, key: &str) -> Result<Option<heapless::String<MAX_TEXT_LEN>>, Self::Error> {
        Ok(match self.get(key)? {
            Some(SettingValue::Text(v)) => Some(v),
            _ => None,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SettingEntry {
    pub key: heapless::String<MAX_KEY_LEN>,
    pub value: SettingValue,
}

/// In-memory settings table that serialises to a single postcard blob
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SettingsBlob {
    entries: heapless::Vec<SettingEntry, MAX_ENTRIES>,
}

impl SettingsBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a blob previously produced by [`to_bytes`](Self::to_bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SettingsError> {
        postcard::from_bytes(bytes).map_err(|_| SettingsError::Corrupt)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SettingsError> {
        postcard::to_allocvec(self).map_err(|_| SettingsError::Encode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SettingsStore for SettingsBlob {
    type Error = SettingsError;

    fn get(&self, key: &str) -> Result<Option<SettingValue>, Self::Error> {
        Ok(self
            .entries
            .iter()
            .find(|entry| entry.key.as_str() == key)
            .map(|entry| entry.value.clone()))
    }

    fn put(&mut self, key: &str, value: SettingValue) -> Result<(), Self::Error> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key.as_str() == key) {
            entry.value = value;
            return Ok(());
        }

        let key = heapless::String::try_from(key).map_err(|_| SettingsError::KeyTooLong)?;
        self.entries
            .push(SettingEntry { key, value })
            .map_err(|_| SettingsError::Full)
    }
}

/// Wi-Fi credentials kept in the settings store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, SettingsError> {
        Ok(Self {
            ssid: heapless::String::try_from(ssid).map_err(|_| SettingsError::ValueTooLong)?,
            password: heapless::String::try_from(password)
                .map_err(|_| SettingsError::ValueTooLong)?,
        })
    }

    /// Stored credentials, or `None` when no SSID has been saved
    pub fn load<S: SettingsStore>(store: &S) -> Result<Option<Self>, S::Error> {
        let Some(ssid) = store.get_text(keys::SSID)? else {
            return Ok(None);
        };
        if ssid.is_empty() {
            return Ok(None);
        }
        let password = store.get_text(keys::PASSWORD)?.unwrap_or_default();

        // An SSID longer than 32 bytes cannot have been saved by `save`
        Ok(Self::new(&ssid, &password).ok())
    }

    pub fn save<S: SettingsStore>(&self, store: &mut S) -> Result<(), S::Error> {
        store.put(keys::SSID, text(&self.ssid))?;
        store.put(keys::PASSWORD, text(&self.password))
    }
}

/// Wrap a string that is known to fit in a text setting
fn text(value: &str) -> SettingValue {
    let mut out = heapless::String::new();
    for c in value.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    SettingValue::Text(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_overwrite() {
        let mut blob = SettingsBlob::new();
        blob.put(keys::TEMP_MIN, SettingValue::Float(-5.0)).unwrap();
        blob.put(keys::TEMP_MIN, SettingValue::Float(2.5)).unwrap();

        assert_eq!(blob.len(), 1, "overwrite must not add an entry");
        assert_eq!(blob.get_f32_or(keys::TEMP_MIN, 0.0), Ok(2.5));
    }

    #[test]
    fn test_defaults_for_missing_or_mistyped() {
        let mut blob = SettingsBlob::new();
        blob.put(keys::SOIL_MIN, SettingValue::Float(3.0)).unwrap();

        assert_eq!(blob.get_i32_or(keys::SOIL_MAX, 100), Ok(100));
        assert_eq!(blob.get_i32_or(keys::SOIL_MIN, 0), Ok(0), "float is not an int");
    }

    #[test]
    fn test_blob_round_trip() {
        let mut blob = SettingsBlob::new();
        blob.put(keys::LUX_MAX, SettingValue::Float(5000.0)).unwrap();
        blob.put(keys::SOIL_MAX, SettingValue::Int(80)).unwrap();

        let decoded = SettingsBlob::from_bytes(&blob.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_corrupt_blob() {
        assert_eq!(
            SettingsBlob::from_bytes(&[0xFF, 0xFF, 0xFF]),
            Err(SettingsError::Corrupt)
        );
    }

    #[test]
    fn test_store_full() {
        let mut blob = SettingsBlob::new();
        for i in 0..MAX_ENTRIES {
            let key = alloc::format!("k{}", i);
            blob.put(&key, SettingValue::Int(i as i32)).unwrap();
        }
        assert_eq!(blob.put("extra", SettingValue::Int(0)), Err(SettingsError::Full));
    }

    #[test]
    fn test_credentials() {
        let mut blob = SettingsBlob::new();
        assert_eq!(Credentials::load(&blob), Ok(None));

        let creds = Credentials::new("greenhouse", "hunter22").unwrap();
        creds.save(&mut blob).unwrap();
        assert_eq!(Credentials::load(&blob), Ok(Some(creds)));
    }
}
