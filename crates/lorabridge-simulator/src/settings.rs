//! Settings persisted to a postcard file on the host

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use log::{info, warn};
use lorabridge_core::settings::{SettingValue, SettingsBlob, SettingsStore};

/// [`SettingsBlob`] written back to `path` after every change
pub struct FileSettings {
    path: PathBuf,
    blob: SettingsBlob,
}

impl FileSettings {
    /// Load `path`. A missing or corrupt file starts from empty settings.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let blob = match fs::read(&path) {
            Ok(bytes) => SettingsBlob::from_bytes(&bytes).unwrap_or_else(|e| {
                warn!(" {} is unreadable ({}), starting empty", path.display(), e);
                SettingsBlob::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => SettingsBlob::new(),
            Err(e) => {
                warn!(" Failed to read {}: {}", path.display(), e);
                SettingsBlob::new()
            }
        };
        info!(" {} settings loaded from {}", blob.len(), path.display());
        Self { path, blob }
    }

    fn flush(&self) -> anyhow::Result<()> {
        let bytes = self.blob.to_bytes().map_err(|e| anyhow!("{}", e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl SettingsStore for FileSettings {
    type Error = anyhow::Error;

    fn get(&self, key: &str) -> Result<Option<SettingValue>, Self::Error> {
        self.blob.get(key).map_err(|e| anyhow!("{}", e))
    }

    fn put(&mut self, key: &str, value: SettingValue) -> Result<(), Self::Error> {
        self.blob.put(key, value).map_err(|e| anyhow!("{}", e))?;
        self.flush()
    }
}
